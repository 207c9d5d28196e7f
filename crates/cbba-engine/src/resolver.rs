//! Consensus pass: reconcile peer claims against the local ledger.
//!
//! Each inbound message is classified by who it says holds the task (`z2`)
//! and who the ledger says holds it (`z1`), relative to this agent (`i`) and
//! the sender (`k`). The pair selects one [`Action`]. After the batch, any
//! bundle task this agent no longer wins is released together with every
//! task claimed after it.

use cbba_concurrent::Mailbox;
use cbba_core::{AgentId, BidRecord, BidTime, Clock, Message, TaskId, TaskRegistry};
use metrics::counter;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::state::AgentState;

/// What to do with one inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Adopt the sender's record and relay the message.
    Update,
    /// Rebroadcast the local record, optionally stamped with the current
    /// time first.
    Reassert { refresh: bool },
    /// Clear the record to unassigned and broadcast it.
    Reset,
    /// Relay without adopting.
    Forward,
    Drop,
}

/// Per-action counts for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActionTally {
    pub updates: usize,
    pub reasserts: usize,
    pub resets: usize,
    pub forwards: usize,
    pub drops: usize,
}

impl ActionTally {
    fn count(&mut self, action: Action) {
        match action {
            Action::Update => self.updates += 1,
            Action::Reassert { .. } => self.reasserts += 1,
            Action::Reset => self.resets += 1,
            Action::Forward => self.forwards += 1,
            Action::Drop => self.drops += 1,
        }
    }

    /// Actions other than `Drop`.
    pub fn taken(&self) -> usize {
        self.updates + self.reasserts + self.resets + self.forwards
    }
}

/// Result of one resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOutcome {
    /// Messages left after preprocessing
    pub processed: usize,
    pub actions: ActionTally,
    /// Tasks dropped from the bundle by the cascade, in claim order
    pub released: Vec<TaskId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Party {
    Me,
    Sender,
    Other(AgentId),
    Nobody,
}

fn classify(agent: Option<AgentId>, me: AgentId, sender: AgentId) -> Party {
    match agent {
        None => Party::Nobody,
        Some(a) if a == me => Party::Me,
        Some(a) if a == sender => Party::Sender,
        Some(a) => Party::Other(a),
    }
}

/// Decide how agent `me` reacts to `msg` given its own record for the task.
pub fn decide(me: AgentId, msg: &Message, mine: &BidRecord) -> Action {
    if mine.matches(msg) {
        return Action::Drop;
    }

    let k = msg.sender;
    let (t2, y2) = (msg.bid_time, msg.winning_bid);
    let (t1, y1) = (mine.bid_time, mine.winning_bid);

    match (
        classify(msg.winning_agent, me, k),
        classify(mine.winning_agent, me, k),
    ) {
        // sender says I hold it
        (Party::Me, Party::Me) => Action::Reassert { refresh: t2 >= t1 },
        (Party::Me, Party::Sender) => Action::Reset,
        (Party::Me, Party::Other(_)) => Action::Reassert { refresh: false },
        (Party::Me, Party::Nobody) => Action::Reassert { refresh: true },

        // sender claims it for itself
        (Party::Sender, Party::Me) => outbid(k, y2, me, y1),
        (Party::Sender, Party::Sender) => by_recency(t2, t1),
        (Party::Sender, Party::Other(m)) => third_party(k, t2, y2, m, t1, y1),
        (Party::Sender, Party::Nobody) => Action::Update,

        // sender says a third agent holds it
        (Party::Other(m), Party::Me) => outbid(m, y2, me, y1),
        (Party::Other(_), Party::Sender) => Action::Update,
        (Party::Other(m), Party::Other(n)) if m == n => by_recency(t2, t1),
        (Party::Other(m), Party::Other(n)) => third_party(m, t2, y2, n, t1, y1),
        (Party::Other(_), Party::Nobody) => Action::Update,

        // sender says nobody holds it
        (Party::Nobody, Party::Me) => Action::Reassert { refresh: true },
        (Party::Nobody, Party::Sender) => by_recency(t2, t1),
        (Party::Nobody, Party::Nobody) if t2 > t1 => Action::Update,
        // an older empty slot never rolls back a newer reset
        (Party::Nobody, Party::Nobody) => Action::Drop,
        (Party::Nobody, Party::Other(_)) => Action::Forward,
    }
}

/// Claim `theirs` against my own claim; exact ties go to the lower id.
fn outbid(them: AgentId, y2: f64, me: AgentId, y1: f64) -> Action {
    if y2 > y1 || (y2 == y1 && them < me) {
        Action::Update
    } else {
        Action::Reassert { refresh: true }
    }
}

fn by_recency(t2: BidTime, t1: BidTime) -> Action {
    if t2 > t1 {
        Action::Update
    } else if t2 < t1 {
        Action::Reassert { refresh: false }
    } else {
        Action::Drop
    }
}

/// Two different non-local claimants: the stronger and not older claim
/// wins, equal bids go to the lower id, anything else is only relayed.
fn third_party(z2: AgentId, t2: BidTime, y2: f64, z1: AgentId, t1: BidTime, y1: f64) -> Action {
    if t2 <= t1 && y2 < y1 {
        Action::Reassert { refresh: false }
    } else if t2 >= t1 && y2 > y1 {
        Action::Update
    } else if y2 == y1 && z2 < z1 {
        Action::Update
    } else if y2 == y1 && z2 > z1 {
        Action::Reassert { refresh: false }
    } else {
        Action::Forward
    }
}

/// Keep the newest message per `(sender, task)`, discard tasks the registry
/// does not know, and order the rest oldest first.
pub fn preprocess<I>(batch: I, registry: &TaskRegistry) -> Vec<Message>
where
    I: IntoIterator<Item = Message>,
{
    let mut kept: Vec<Message> = Vec::new();
    let mut index: HashMap<(AgentId, TaskId), usize> = HashMap::new();

    for msg in batch {
        if !registry.contains(msg.task) {
            warn!(task = %msg.task, sender = %msg.sender, "dropping message for unknown task");
            continue;
        }
        match index.get(&(msg.sender, msg.task)) {
            Some(&slot) => {
                if msg.bid_time >= kept[slot].bid_time {
                    kept[slot] = msg;
                }
            }
            None => {
                index.insert((msg.sender, msg.task), kept.len());
                kept.push(msg);
            }
        }
    }

    kept.sort_by_key(|m| m.bid_time);
    kept
}

/// Applies [`decide`] to inbound batches for one agent.
///
/// Remembers the last message relayed for each task so an identical
/// message is never relayed twice.
#[derive(Debug)]
pub struct ConflictResolver {
    me: AgentId,
    relayed: HashMap<TaskId, Message>,
}

impl ConflictResolver {
    pub fn new(me: AgentId) -> Self {
        Self {
            me,
            relayed: HashMap::new(),
        }
    }

    pub fn agent(&self) -> AgentId {
        self.me
    }

    /// Resolve one drained batch against `state`, queueing replies on
    /// `mailbox`, then run the ownership-loss cascade.
    pub fn resolve<I>(
        &mut self,
        batch: I,
        registry: &TaskRegistry,
        state: &mut AgentState,
        mailbox: &Mailbox,
        clock: &dyn Clock,
    ) -> ResolveOutcome
    where
        I: IntoIterator<Item = Message>,
    {
        let batch = preprocess(batch, registry);
        let mut outcome = ResolveOutcome {
            processed: batch.len(),
            ..Default::default()
        };

        for msg in &batch {
            let mut action = decide(self.me, msg, state.ledger.get(msg.task));
            if matches!(action, Action::Update | Action::Forward)
                && self.relayed.get(&msg.task) == Some(msg)
            {
                action = Action::Drop;
            }
            debug!(agent = %self.me, %msg, ?action, "resolved");
            outcome.actions.count(action);
            self.apply(action, msg, state, mailbox, clock);
            if msg.sender != self.me {
                state.awaiting.remove(&msg.task);
            }
        }

        outcome.released = self.cascade(state, mailbox, clock);
        outcome
    }

    fn apply(
        &mut self,
        action: Action,
        msg: &Message,
        state: &mut AgentState,
        mailbox: &Mailbox,
        clock: &dyn Clock,
    ) {
        let task = msg.task;
        match action {
            Action::Update => {
                state.ledger.record(task, msg.record());
                self.relay(msg, mailbox);
            }
            Action::Reassert { refresh } => {
                if refresh {
                    state.ledger.refresh(task, clock.now());
                }
                self.announce(task, state, mailbox);
            }
            Action::Reset => {
                state.ledger.reset(task, clock.now());
                self.announce(task, state, mailbox);
            }
            Action::Forward => self.relay(msg, mailbox),
            Action::Drop => {}
        }
    }

    fn relay(&mut self, msg: &Message, mailbox: &Mailbox) {
        self.relayed.insert(msg.task, *msg);
        mailbox.enqueue_outbound(msg.task, *msg);
    }

    fn announce(&self, task: TaskId, state: &AgentState, mailbox: &Mailbox) {
        let msg = Message::new(self.me, task, state.ledger.get(task));
        mailbox.enqueue_outbound(task, msg);
    }

    /// Release the first lost bundle task and everything claimed after it.
    ///
    /// Every released task is reset and announced. The lost task is parked
    /// in `awaiting` so the next build does not bid on it before the
    /// winner's claim comes back.
    fn cascade(&self, state: &mut AgentState, mailbox: &Mailbox, clock: &dyn Clock) -> Vec<TaskId> {
        let Some(cut) = state.first_lost(self.me) else {
            return Vec::new();
        };

        let released = state.bundle.split_off(cut);
        for task in &released {
            state.ledger.reset(*task, clock.now());
            self.announce(*task, state, mailbox);
        }
        if let Some(lost) = released.first() {
            state.awaiting.insert(*lost);
        }
        state.path.retain(|t| !released.contains(t));

        counter!("cbba_tasks_released").increment(released.len() as u64);
        info!(
            agent = %self.me,
            released = ?released,
            bundle = ?state.bundle,
            path = ?state.path,
            "released tasks after losing a claim"
        );
        released
    }
}
