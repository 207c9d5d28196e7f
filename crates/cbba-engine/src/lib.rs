//! Allocation engine for the CBBA fleet allocator
//!
//! `builder` grows the bundle greedily, `resolver` reconciles peer claims,
//! `engine` glues both to the mailbox and transport, and `runner` paces the
//! engine on a tokio interval. `bus`, `route` and `sim` provide an
//! in-process fleet for local runs and tests.

pub mod builder;
pub mod bus;
pub mod engine;
pub mod receiver;
pub mod resolver;
pub mod route;
pub mod runner;
pub mod scoring;
pub mod sim;
pub mod state;

pub use builder::BundleBuilder;
pub use bus::{BusStats, BusTransport, LocalBus};
pub use engine::{AllocationEngine, Collaborators, CycleReport, EngineHandle, EngineSnapshot};
pub use receiver::{deliver_frame, drain_frames, pump_frames};
pub use resolver::{decide, preprocess, Action, ActionTally, ConflictResolver, ResolveOutcome};
pub use route::RouteTracker;
pub use runner::AllocationLoop;
pub use scoring::{Scorer, ScoringParams};
pub use sim::{AgentReport, AgentSpec, Conflict, Fleet, FleetReport, FleetSpec, RoundSummary};
pub use state::AgentState;
