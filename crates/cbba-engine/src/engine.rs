use arc_swap::ArcSwap;
use cbba_concurrent::Mailbox;
use cbba_core::{
    encode, AgentId, AllocationConfig, BidLedger, Clock, Message, PathConsumer, PositionProvider,
    Result, TaskId, TaskRegistry, TaskSource, Transport,
};
use metrics::{counter, gauge};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::builder::BundleBuilder;
use crate::resolver::{ActionTally, ConflictResolver, ResolveOutcome};
use crate::scoring::{Scorer, ScoringParams};
use crate::state::AgentState;

/// External capabilities handed to the engine at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub position: Arc<dyn PositionProvider>,
    pub transport: Arc<dyn Transport>,
    pub paths: Arc<dyn PathConsumer>,
    pub clock: Arc<dyn Clock>,
}

/// What one cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    pub claimed: usize,
    pub sent: usize,
    pub processed: usize,
    pub actions: ActionTally,
    pub released: usize,
    pub inbox_dropped: u64,
}

/// Read-only view of one engine, published after every cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub agent: AgentId,
    pub bundle: Vec<TaskId>,
    pub path: Vec<TaskId>,
    pub winners: Vec<Option<AgentId>>,
    pub cycles: u64,
}

/// Lock-free reader for the latest [`EngineSnapshot`].
#[derive(Debug, Clone)]
pub struct EngineHandle {
    snapshot: Arc<ArcSwap<EngineSnapshot>>,
}

impl EngineHandle {
    pub fn snapshot(&self) -> Arc<EngineSnapshot> {
        self.snapshot.load_full()
    }
}

/// One agent's allocation state machine.
///
/// Owns the ledger, bundle and path. The only state shared with other
/// threads is the mailbox.
pub struct AllocationEngine {
    id: AgentId,
    registry: TaskRegistry,
    builder: BundleBuilder,
    resolver: ConflictResolver,
    state: AgentState,
    mailbox: Arc<Mailbox>,
    parts: Collaborators,
    batch: VecDeque<Message>,
    cycles: u64,
    snapshot: Arc<ArcSwap<EngineSnapshot>>,
}

impl AllocationEngine {
    pub fn new(
        config: &AllocationConfig,
        registry: TaskRegistry,
        mailbox: Arc<Mailbox>,
        parts: Collaborators,
    ) -> Self {
        let id = parts.position.self_id();
        let state = AgentState::new(registry.len());
        let scorer = Scorer::new(registry.clone(), ScoringParams::from(config));
        let snapshot = Arc::new(ArcSwap::from_pointee(EngineSnapshot {
            agent: id,
            bundle: Vec::new(),
            path: Vec::new(),
            winners: state.ledger.winners(),
            cycles: 0,
        }));

        Self {
            id,
            builder: BundleBuilder::new(scorer, config.max_assignments),
            resolver: ConflictResolver::new(id),
            registry,
            state,
            mailbox,
            parts,
            batch: VecDeque::new(),
            cycles: 0,
            snapshot,
        }
    }

    /// Load the registry once from `source` and build the engine over it.
    pub fn from_source(
        config: &AllocationConfig,
        source: &dyn TaskSource,
        mailbox: Arc<Mailbox>,
        parts: Collaborators,
    ) -> Result<Self> {
        let registry = source.load_tasks()?;
        Ok(Self::new(config, registry, mailbox, parts))
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn state(&self) -> &AgentState {
        &self.state
    }

    pub fn ledger(&self) -> &BidLedger {
        &self.state.ledger
    }

    pub fn bundle(&self) -> &[TaskId] {
        &self.state.bundle
    }

    pub fn path(&self) -> &[TaskId] {
        &self.state.path
    }

    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            snapshot: self.snapshot.clone(),
        }
    }

    /// Grow the bundle, queue a claim per new task and report the new path.
    pub fn build_bundle(&mut self) -> usize {
        let origin = self.parts.position.current_location();
        let claimed = self.builder.grow(
            self.id,
            origin,
            &mut self.state,
            self.parts.clock.as_ref(),
        );

        for task in &claimed {
            self.announce(*task);
        }
        if !claimed.is_empty() {
            counter!("cbba_tasks_claimed").increment(claimed.len() as u64);
            self.parts.paths.path_changed(self.id, &self.state.path);
        }
        claimed.len()
    }

    /// Encode and broadcast everything pending in the outbox.
    pub fn flush_outbound(&self) -> usize {
        let pending = self.mailbox.flush_outbound();
        for msg in &pending {
            debug!(agent = %self.id, %msg, "broadcast");
            self.parts.transport.broadcast(encode(msg));
        }
        counter!("cbba_messages_sent").increment(pending.len() as u64);
        pending.len()
    }

    /// Drain the inbox and run one consensus pass over it.
    pub fn process_inbound(&mut self) -> (ResolveOutcome, u64) {
        let stats = self.mailbox.drain_into(&mut self.batch);
        if stats.dropped > 0 {
            warn!(agent = %self.id, dropped = stats.dropped, "inbox overflowed since last drain");
        }

        let outcome = self.resolver.resolve(
            self.batch.drain(..),
            &self.registry,
            &mut self.state,
            &self.mailbox,
            self.parts.clock.as_ref(),
        );
        if !outcome.released.is_empty() {
            self.parts.paths.path_changed(self.id, &self.state.path);
        }
        debug_assert!(self.state.is_consistent());
        (outcome, stats.dropped)
    }

    /// Build, broadcast, then resolve whatever arrived.
    pub fn run_cycle(&mut self) -> CycleReport {
        let claimed = self.build_bundle();
        let sent = self.flush_outbound();
        let (outcome, inbox_dropped) = self.process_inbound();

        self.cycles += 1;
        gauge!("cbba_bundle_size").set(self.state.bundle.len() as f64);
        self.publish();

        CycleReport {
            cycle: self.cycles,
            claimed,
            sent,
            processed: outcome.processed,
            actions: outcome.actions,
            released: outcome.released.len(),
            inbox_dropped,
        }
    }

    /// Queue the current record of every bundle task, unchanged.
    ///
    /// Lets peers that missed earlier claims catch up after message loss.
    /// Tasks parked after a lost claim become biddable again, since the
    /// reply that would have released them may have been lost too.
    pub fn announce_bundle(&mut self) -> usize {
        self.state.awaiting.clear();
        for task in &self.state.bundle {
            self.announce(*task);
        }
        self.state.bundle.len()
    }

    fn announce(&self, task: TaskId) {
        let msg = Message::new(self.id, task, self.state.ledger.get(task));
        self.mailbox.enqueue_outbound(task, msg);
    }

    fn publish(&self) {
        self.snapshot.store(Arc::new(EngineSnapshot {
            agent: self.id,
            bundle: self.state.bundle.clone(),
            path: self.state.path.clone(),
            winners: self.state.ledger.winners(),
            cycles: self.cycles,
        }));
    }
}

impl std::fmt::Debug for AllocationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocationEngine")
            .field("id", &self.id)
            .field("bundle", &self.state.bundle)
            .field("path", &self.state.path)
            .field("cycles", &self.cycles)
            .finish()
    }
}
