use cbba_core::{quantize_bid, AgentId, BidRecord, Clock, Location, TaskId};
use tracing::{debug, info};

use crate::scoring::Scorer;
use crate::state::AgentState;

/// Greedy bundle growth.
#[derive(Debug, Clone)]
pub struct BundleBuilder {
    scorer: Scorer,
    max_assignments: usize,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    task: TaskId,
    bid: f64,
    position: usize,
}

impl BundleBuilder {
    pub fn new(scorer: Scorer, max_assignments: usize) -> Self {
        Self {
            scorer,
            max_assignments,
        }
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn max_assignments(&self) -> usize {
        self.max_assignments
    }

    /// Claim tasks until the bundle is full or nothing is worth outbidding.
    ///
    /// Returns the tasks claimed in this call, in claim order.
    pub fn grow(
        &self,
        me: AgentId,
        origin: Location,
        state: &mut AgentState,
        clock: &dyn Clock,
    ) -> Vec<TaskId> {
        let mut claimed = Vec::new();

        while state.bundle.len() < self.max_assignments {
            let Some(best) = self.best_candidate(me, origin, state) else {
                break;
            };

            state.path.insert(best.position, best.task);
            state.bundle.push(best.task);
            state.ledger.claim(best.task, me, best.bid, clock.now());
            debug!(agent = %me, task = %best.task, bid = best.bid, "claimed task");
            claimed.push(best.task);
        }

        if !claimed.is_empty() {
            info!(
                agent = %me,
                claimed = claimed.len(),
                bundle = ?state.bundle,
                path = ?state.path,
                "bundle grown"
            );
        }
        claimed
    }

    fn best_candidate(&self, me: AgentId, origin: Location, state: &AgentState) -> Option<Candidate> {
        let mut best: Option<Candidate> = None;

        for task in self.scorer.registry().ids() {
            if state.holds(task) || state.awaiting.contains(&task) {
                continue;
            }
            let (marginal, position) = self.scorer.best_insertion(origin, &state.path, task);
            let bid = quantize_bid(marginal.max(0.0));
            if !outbids(me, bid, state.ledger.get(task)) {
                continue;
            }
            if best.map_or(true, |b| bid > b.bid) {
                best = Some(Candidate {
                    task,
                    bid,
                    position,
                });
            }
        }

        best
    }
}

/// Whether a personal bid beats the recorded winner. Exact ties go to the
/// lower agent id; an unassigned record never wins a tie.
fn outbids(me: AgentId, bid: f64, current: &BidRecord) -> bool {
    if bid > current.winning_bid {
        return true;
    }
    bid == current.winning_bid && current.winning_agent.is_some_and(|w| me <= w)
}
