//! Core types for the CBBA fleet allocator
//!
//! - `geo`: great-circle distance between task and agent locations
//! - `types`: agent/task ids, bid records and gossip messages
//! - `registry`: immutable task list and the one-shot `TaskSource`
//! - `ledger`: per-task bid ledger owned by one agent
//! - `codec`: fixed-width ASCII wire format
//! - `traits`: collaborator interfaces (position, transport, path consumer)

pub mod clock;
pub mod codec;
pub mod config;
pub mod error;
pub mod geo;
pub mod ledger;
pub mod registry;
pub mod traits;
pub mod types;

pub use clock::*;
pub use codec::{decode, encode, quantize_bid, FRAME_LEN};
pub use config::*;
pub use error::*;
pub use geo::*;
pub use ledger::*;
pub use registry::*;
pub use traits::*;
pub use types::*;
