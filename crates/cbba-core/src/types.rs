use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of one agent in the fleet. Lower ids win exact bid ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u32);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for AgentId {
    fn from(id: u32) -> Self {
        AgentId(id)
    }
}

/// Index of a task in the [`TaskRegistry`](crate::TaskRegistry).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for TaskId {
    fn from(idx: usize) -> Self {
        TaskId(idx)
    }
}

/// Nanosecond timestamp attached to every bid.
pub type BidTime = i64;

/// Who holds a task, for how much, and as of when.
///
/// Invariant: `winning_agent == None` implies `winning_bid == 0.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BidRecord {
    pub winning_agent: Option<AgentId>,
    pub winning_bid: f64,
    pub bid_time: BidTime,
}

impl Default for BidRecord {
    fn default() -> Self {
        Self::unassigned(0)
    }
}

impl BidRecord {
    pub fn unassigned(bid_time: BidTime) -> Self {
        Self {
            winning_agent: None,
            winning_bid: 0.0,
            bid_time,
        }
    }

    pub fn claimed(agent: AgentId, bid: f64, bid_time: BidTime) -> Self {
        Self {
            winning_agent: Some(agent),
            winning_bid: bid,
            bid_time,
        }
    }

    pub fn is_held_by(&self, agent: AgentId) -> bool {
        self.winning_agent == Some(agent)
    }

    /// True when winner, bid and timestamp are all identical to the message.
    pub fn matches(&self, msg: &Message) -> bool {
        self.winning_agent == msg.winning_agent
            && self.winning_bid == msg.winning_bid
            && self.bid_time == msg.bid_time
    }
}

/// One agent's claim about one task, exchanged between agents.
///
/// `sender` is the agent that originated the message. Relayed messages keep
/// the original sender.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub sender: AgentId,
    pub task: TaskId,
    pub bid_time: BidTime,
    pub winning_bid: f64,
    pub winning_agent: Option<AgentId>,
}

impl Message {
    pub fn new(sender: AgentId, task: TaskId, record: &BidRecord) -> Self {
        Self {
            sender,
            task,
            bid_time: record.bid_time,
            winning_bid: record.winning_bid,
            winning_agent: record.winning_agent,
        }
    }

    pub fn record(&self) -> BidRecord {
        BidRecord {
            winning_agent: self.winning_agent,
            winning_bid: self.winning_bid,
            bid_time: self.bid_time,
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let winner = self
            .winning_agent
            .map(|a| a.to_string())
            .unwrap_or_else(|| "none".to_string());
        write!(
            f,
            "task {} from {}: winner={} bid={} t={}",
            self.task, self.sender, winner, self.winning_bid, self.bid_time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_record_is_unassigned() {
        let r = BidRecord::default();
        assert_eq!(r.winning_agent, None);
        assert_eq!(r.winning_bid, 0.0);
        assert_eq!(r.bid_time, 0);
    }

    #[test]
    fn message_carries_record() {
        let rec = BidRecord::claimed(AgentId(3), 4.5, 1_000);
        let msg = Message::new(AgentId(7), TaskId(2), &rec);
        assert_eq!(msg.sender, AgentId(7));
        assert_eq!(msg.record(), rec);
        assert!(rec.matches(&msg));
        assert!(!BidRecord::claimed(AgentId(3), 4.5, 1_001).matches(&msg));
    }

    #[test]
    fn agent_ids_order_numerically() {
        assert!(AgentId(1) < AgentId(2));
        assert!(AgentId(2) < AgentId(10));
    }
}
