use std::collections::BTreeSet;

use cbba_core::{AgentId, BidLedger, TaskId};

/// Everything one agent owns: its ledger, the tasks it holds in claim
/// order (bundle) and the order it will visit them (path).
///
/// Bundle and path always hold the same set of tasks.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    pub ledger: BidLedger,
    pub bundle: Vec<TaskId>,
    pub path: Vec<TaskId>,
    /// Tasks lost to a peer and reset locally. Not bid on again until
    /// another agent reports on them.
    pub awaiting: BTreeSet<TaskId>,
}

impl AgentState {
    pub fn new(task_count: usize) -> Self {
        Self {
            ledger: BidLedger::new(task_count),
            bundle: Vec::new(),
            path: Vec::new(),
            awaiting: BTreeSet::new(),
        }
    }

    pub fn holds(&self, task: TaskId) -> bool {
        self.bundle.contains(&task)
    }

    /// Bundle and path contain the same tasks, each once.
    pub fn is_consistent(&self) -> bool {
        if self.bundle.len() != self.path.len() {
            return false;
        }
        let mut bundle = self.bundle.clone();
        let mut path = self.path.clone();
        bundle.sort_unstable();
        path.sort_unstable();
        bundle.dedup();
        bundle == path
    }

    /// First bundle position whose task this agent no longer wins.
    pub fn first_lost(&self, me: AgentId) -> Option<usize> {
        self.bundle
            .iter()
            .position(|task| !self.ledger.get(*task).is_held_by(me))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_ignores_order() {
        let mut state = AgentState::new(4);
        state.bundle = vec![TaskId(2), TaskId(0)];
        state.path = vec![TaskId(0), TaskId(2)];
        assert!(state.is_consistent());

        state.path.push(TaskId(3));
        assert!(!state.is_consistent());
    }

    #[test]
    fn duplicates_are_inconsistent() {
        let mut state = AgentState::new(4);
        state.bundle = vec![TaskId(1), TaskId(1)];
        state.path = vec![TaskId(1), TaskId(1)];
        assert!(!state.is_consistent());
    }

    #[test]
    fn first_lost_scans_in_claim_order() {
        let me = AgentId(1);
        let mut state = AgentState::new(8);
        for t in [2, 5, 7] {
            state.ledger.claim(TaskId(t), me, 1.0, 1);
            state.bundle.push(TaskId(t));
        }
        assert_eq!(state.first_lost(me), None);

        state.ledger.claim(TaskId(7), AgentId(4), 2.0, 2);
        state.ledger.claim(TaskId(5), AgentId(4), 2.0, 2);
        assert_eq!(state.first_lost(me), Some(1));
    }
}
