//! Concurrency boundary between message arrival and message consumption
//!
//! - `mailbox`: bounded double-buffered inbox plus a per-task coalescing outbox

pub mod mailbox;

pub use mailbox::{DrainStats, Mailbox, MailboxError};
