use bytes::Bytes;

use crate::{AgentId, Location, TaskId};

/// Where the agent is and who it is. Polled by the bundle builder on every
/// scoring pass.
pub trait PositionProvider: Send + Sync {
    fn current_location(&self) -> Location;
    fn self_id(&self) -> AgentId;
}

/// Fire-and-forget broadcast to every peer. Delivery is the transport's
/// concern; the engine never waits on it.
pub trait Transport: Send + Sync {
    fn broadcast(&self, frame: Bytes);
}

/// Receives the agent's execution route whenever the builder or the
/// resolver changes it.
pub trait PathConsumer: Send + Sync {
    fn path_changed(&self, agent: AgentId, path: &[TaskId]);
}

/// A raw frame as handed over by the transport, before decoding.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub sender: AgentId,
    pub payload: Bytes,
}

/// Stationary agent, used when no live vehicle telemetry is attached.
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition {
    pub id: AgentId,
    pub location: Location,
}

impl FixedPosition {
    pub fn new(id: AgentId, location: Location) -> Self {
        Self { id, location }
    }
}

impl PositionProvider for FixedPosition {
    fn current_location(&self) -> Location {
        self.location
    }

    fn self_id(&self) -> AgentId {
        self.id
    }
}

/// Path consumer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPathConsumer;

impl PathConsumer for NullPathConsumer {
    fn path_changed(&self, _agent: AgentId, _path: &[TaskId]) {}
}
