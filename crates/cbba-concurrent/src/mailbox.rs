use cbba_core::{Message, TaskId};
use crossbeam_utils::CachePadded;
use metrics::counter;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MailboxError {
    #[error("inbox capacity must be > 0")]
    ZeroCapacity,
}

/// Result of one drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Messages handed to the consumer
    pub messages: usize,
    /// Messages discarded for overflow since the previous drain
    pub dropped: u64,
}

/// Mailbox shared by the network-receipt actor and the allocation loop.
///
/// Inbound side is double-buffered: producers append to the active buffer,
/// the consumer swaps its own (empty) buffer in and walks away with the
/// filled one. The lock covers only the append or the swap, never message
/// processing. When the active buffer reaches capacity the oldest message is
/// discarded.
///
/// Outbound side keeps at most one pending message per task; a later
/// enqueue for the same task replaces the earlier one.
#[derive(Debug)]
pub struct Mailbox {
    inbox: Mutex<VecDeque<Message>>,
    outbox: Mutex<BTreeMap<TaskId, Message>>,
    capacity: usize,
    delivered: CachePadded<AtomicU64>,
    dropped: CachePadded<AtomicU64>,
}

impl Mailbox {
    pub fn with_capacity(capacity: usize) -> Result<Self, MailboxError> {
        if capacity == 0 {
            return Err(MailboxError::ZeroCapacity);
        }
        Ok(Self {
            inbox: Mutex::new(VecDeque::new()),
            outbox: Mutex::new(BTreeMap::new()),
            capacity,
            delivered: CachePadded::new(AtomicU64::new(0)),
            dropped: CachePadded::new(AtomicU64::new(0)),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an inbound message. Never blocks beyond the append itself.
    pub fn deliver(&self, msg: Message) {
        let overflowed = {
            let mut inbox = self.inbox.lock();
            let overflowed = if inbox.len() >= self.capacity {
                inbox.pop_front();
                true
            } else {
                false
            };
            inbox.push_back(msg);
            overflowed
        };

        self.delivered.fetch_add(1, Ordering::Relaxed);
        if overflowed {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            counter!("cbba_inbox_dropped").increment(1);
        }
        trace!(task = %msg.task, sender = %msg.sender, "message delivered");
    }

    /// Swap `batch` with the active inbox buffer.
    ///
    /// `batch` is cleared first, so the consumer's previous batch is
    /// recycled as the next active buffer.
    pub fn drain_into(&self, batch: &mut VecDeque<Message>) -> DrainStats {
        batch.clear();
        {
            let mut inbox = self.inbox.lock();
            std::mem::swap(&mut *inbox, batch);
        }
        DrainStats {
            messages: batch.len(),
            dropped: self.dropped.swap(0, Ordering::Relaxed),
        }
    }

    /// Take everything currently buffered.
    pub fn drain(&self) -> Vec<Message> {
        let mut batch = VecDeque::new();
        self.drain_into(&mut batch);
        batch.into()
    }

    pub fn pending_inbound(&self) -> usize {
        self.inbox.lock().len()
    }

    /// Total messages ever delivered, including ones later dropped.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Queue `msg` for broadcast, replacing any pending message for `task`.
    pub fn enqueue_outbound(&self, task: TaskId, msg: Message) {
        self.outbox.lock().insert(task, msg);
    }

    /// Take all pending outbound messages in ascending task order.
    pub fn flush_outbound(&self) -> Vec<Message> {
        let pending = std::mem::take(&mut *self.outbox.lock());
        pending.into_values().collect()
    }

    pub fn pending_outbound(&self) -> usize {
        self.outbox.lock().len()
    }
}
