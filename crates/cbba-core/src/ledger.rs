use crate::{AgentId, BidRecord, BidTime, TaskId};

/// Local view of who holds every task.
///
/// Owned by exactly one allocation engine; peers only ever see copies of
/// individual records through messages.
#[derive(Debug, Clone, Default)]
pub struct BidLedger {
    records: Vec<BidRecord>,
}

impl BidLedger {
    pub fn new(task_count: usize) -> Self {
        Self {
            records: vec![BidRecord::default(); task_count],
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Panics if `task` is outside the registry; callers validate inbound ids.
    pub fn get(&self, task: TaskId) -> &BidRecord {
        &self.records[task.0]
    }

    pub fn record(&mut self, task: TaskId, record: BidRecord) {
        debug_assert!(record.winning_agent.is_some() || record.winning_bid == 0.0);
        self.records[task.0] = record;
    }

    pub fn claim(&mut self, task: TaskId, agent: AgentId, bid: f64, now: BidTime) {
        self.records[task.0] = BidRecord::claimed(agent, bid, now);
    }

    /// Clear the holder and stamp the record with `now`.
    pub fn reset(&mut self, task: TaskId, now: BidTime) {
        self.records[task.0] = BidRecord::unassigned(now);
    }

    /// Bump the timestamp without touching holder or bid.
    pub fn refresh(&mut self, task: TaskId, now: BidTime) {
        self.records[task.0].bid_time = now;
    }

    pub fn winners(&self) -> Vec<Option<AgentId>> {
        self.records.iter().map(|r| r.winning_agent).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TaskId, &BidRecord)> {
        self.records.iter().enumerate().map(|(i, r)| (TaskId(i), r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unassigned() {
        let ledger = BidLedger::new(3);
        assert_eq!(ledger.len(), 3);
        assert!(ledger.iter().all(|(_, r)| *r == BidRecord::default()));
        assert_eq!(ledger.winners(), vec![None, None, None]);
    }

    #[test]
    fn claim_then_reset() {
        let mut ledger = BidLedger::new(2);
        ledger.claim(TaskId(1), AgentId(4), 2.5, 10);
        assert!(ledger.get(TaskId(1)).is_held_by(AgentId(4)));
        assert_eq!(ledger.get(TaskId(1)).winning_bid, 2.5);

        ledger.reset(TaskId(1), 20);
        assert_eq!(*ledger.get(TaskId(1)), BidRecord::unassigned(20));
    }

    #[test]
    fn refresh_only_touches_time() {
        let mut ledger = BidLedger::new(1);
        ledger.claim(TaskId(0), AgentId(1), 1.0, 5);
        ledger.refresh(TaskId(0), 9);
        assert_eq!(*ledger.get(TaskId(0)), BidRecord::claimed(AgentId(1), 1.0, 9));
    }
}
