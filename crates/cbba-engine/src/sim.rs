//! Whole-fleet simulation over a [`LocalBus`].
//!
//! The synchronous driver runs agents round-robin with a deterministic
//! clock, which makes convergence reproducible. The async driver runs the
//! same fleet as independent tokio tasks.

use cbba_concurrent::Mailbox;
use cbba_core::{
    AgentId, CbbaConfig, CbbaError, Clock, ConfigError, FixedPosition, InboundFrame, Location,
    ManualClock, Result, TaskId, TaskRegistry, TaskSource,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::bus::{BusStats, LocalBus};
use crate::engine::{AllocationEngine, Collaborators, EngineSnapshot};
use crate::receiver::{drain_frames, pump_frames};
use crate::route::RouteTracker;
use crate::runner::AllocationLoop;
use crate::scoring::{Scorer, ScoringParams};

/// One agent of a scenario file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub id: AgentId,
    pub lat: f64,
    pub lon: f64,
}

impl AgentSpec {
    pub fn location(&self) -> Location {
        Location::new(self.lat, self.lon)
    }
}

/// Scenario: task locations and agent start positions.
///
/// ```toml
/// [[tasks]]
/// lat = 47.397
/// lon = 8.545
///
/// [[agents]]
/// id = 1
/// lat = 47.396
/// lon = 8.544
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetSpec {
    #[serde(default)]
    pub tasks: Vec<Location>,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

impl FleetSpec {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let spec: FleetSpec = toml::from_str(content)
            .map_err(|e| CbbaError::Config(ConfigError::ParseError(e.to_string())))?;
        spec.validate()?;
        Ok(spec)
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()).into());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.agents.is_empty() {
            return Err(invalid("scenario has no agents"));
        }
        let mut seen = HashSet::new();
        for agent in &self.agents {
            if !seen.insert(agent.id) {
                return Err(invalid(format!("duplicate agent id {}", agent.id)));
            }
        }
        let coords = self
            .tasks
            .iter()
            .copied()
            .chain(self.agents.iter().map(AgentSpec::location));
        for loc in coords {
            if !(loc.lat.abs() <= 90.0 && loc.lon.abs() <= 180.0) {
                return Err(invalid(format!("coordinate out of range: {loc}")));
            }
        }
        Ok(())
    }
}

impl TaskSource for FleetSpec {
    fn load_tasks(&self) -> Result<TaskRegistry> {
        Ok(TaskRegistry::new(self.tasks.clone()))
    }
}

fn invalid(msg: impl Into<String>) -> CbbaError {
    ConfigError::ValidationError(msg.into()).into()
}

/// Final state of one agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentReport {
    pub agent: AgentId,
    pub bundle: Vec<TaskId>,
    pub path: Vec<TaskId>,
    pub score: f64,
    pub cycles: u64,
}

/// A task held in more than one bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub task: TaskId,
    pub claimants: Vec<AgentId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FleetReport {
    pub rounds: usize,
    /// Synchronous runs: a quiescent round was reached. Async runs: the
    /// snapshots agree and hold no conflicts.
    pub converged: bool,
    /// Every agent's ledger names the same winners.
    pub consistent: bool,
    pub agents: Vec<AgentReport>,
    pub conflicts: Vec<Conflict>,
    pub unassigned: Vec<TaskId>,
    pub bus: BusStats,
}

impl FleetReport {
    fn from_snapshots(
        rounds: usize,
        quiescent: Option<bool>,
        snapshots: &[Arc<EngineSnapshot>],
        scorer: &Scorer,
        origins: &[Location],
        bus: BusStats,
    ) -> Self {
        let mut holders: BTreeMap<TaskId, Vec<AgentId>> = BTreeMap::new();
        for snap in snapshots {
            for task in &snap.bundle {
                holders.entry(*task).or_default().push(snap.agent);
            }
        }

        let conflicts: Vec<Conflict> = holders
            .iter()
            .filter(|(_, claimants)| claimants.len() > 1)
            .map(|(task, claimants)| Conflict {
                task: *task,
                claimants: claimants.clone(),
            })
            .collect();
        let unassigned = scorer
            .registry()
            .ids()
            .filter(|t| !holders.contains_key(t))
            .collect();
        let consistent = snapshots.windows(2).all(|w| w[0].winners == w[1].winners);

        let agents = snapshots
            .iter()
            .zip(origins)
            .map(|(snap, origin)| AgentReport {
                agent: snap.agent,
                bundle: snap.bundle.clone(),
                path: snap.path.clone(),
                score: scorer.score(*origin, &snap.path),
                cycles: snap.cycles,
            })
            .collect();

        let converged = quiescent.unwrap_or(consistent && conflicts.is_empty());
        Self {
            rounds,
            converged,
            consistent,
            agents,
            conflicts,
            unassigned,
            bus,
        }
    }

    pub fn total_score(&self) -> f64 {
        self.agents.iter().map(|a| a.score).sum()
    }
}

/// Totals for one synchronous round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundSummary {
    pub claimed: usize,
    pub sent: usize,
    pub processed: usize,
    pub released: usize,
}

struct Member {
    engine: AllocationEngine,
    rx: UnboundedReceiver<InboundFrame>,
    route: Arc<RouteTracker>,
}

/// A fleet of engines sharing one bus.
pub struct Fleet {
    bus: LocalBus,
    members: Vec<Member>,
    scorer: Scorer,
    origins: Vec<Location>,
    cycle_period: Duration,
    rounds: usize,
    quiescent: bool,
}

impl Fleet {
    /// Build a fleet driven by a shared deterministic clock.
    pub fn new(spec: &FleetSpec, config: &CbbaConfig) -> Result<Self> {
        Self::with_clock(spec, config, Arc::new(ManualClock::new(1)))
    }

    pub fn with_clock(spec: &FleetSpec, config: &CbbaConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        spec.validate()?;
        let registry = spec.load_tasks()?;
        let bus = LocalBus::new(config.simulation.loss, config.simulation.seed);

        let mut members = Vec::with_capacity(spec.agents.len());
        for agent in &spec.agents {
            let (transport, rx) = bus.join(agent.id);
            let mailbox = Mailbox::with_capacity(config.mailbox.inbox_capacity)
                .map_err(|e| CbbaError::InvalidOperation(e.to_string()))?;
            let route = Arc::new(RouteTracker::new());
            let parts = Collaborators {
                position: Arc::new(FixedPosition::new(agent.id, agent.location())),
                transport: Arc::new(transport),
                paths: route.clone(),
                clock: clock.clone(),
            };
            let engine =
                AllocationEngine::new(&config.allocation, registry.clone(), Arc::new(mailbox), parts);
            members.push(Member { engine, rx, route });
        }

        info!(
            agents = members.len(),
            tasks = registry.len(),
            loss = config.simulation.loss,
            "fleet assembled"
        );

        Ok(Self {
            bus,
            members,
            scorer: Scorer::new(registry, ScoringParams::from(&config.allocation)),
            origins: spec.agents.iter().map(AgentSpec::location).collect(),
            cycle_period: Duration::from_millis(config.allocation.cycle_interval_ms),
            rounds: 0,
            quiescent: false,
        })
    }

    pub fn bus(&self) -> &LocalBus {
        &self.bus
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn engines(&self) -> impl Iterator<Item = &AllocationEngine> {
        self.members.iter().map(|m| &m.engine)
    }

    pub fn route(&self, agent: AgentId) -> Option<Arc<RouteTracker>> {
        self.members
            .iter()
            .find(|m| m.engine.id() == agent)
            .map(|m| m.route.clone())
    }

    /// Every agent takes in its frames and runs one cycle.
    pub fn step(&mut self) -> RoundSummary {
        let mut round = RoundSummary::default();
        for member in &mut self.members {
            drain_frames(member.engine.mailbox(), &mut member.rx);
            let report = member.engine.run_cycle();
            round.claimed += report.claimed;
            round.sent += report.sent;
            round.processed += report.processed;
            round.released += report.released;
        }
        self.rounds += 1;
        round
    }

    /// Nothing buffered anywhere.
    pub fn is_idle(&self) -> bool {
        self.members.iter().all(|m| {
            let mailbox = m.engine.mailbox();
            mailbox.pending_inbound() == 0 && mailbox.pending_outbound() == 0
        })
    }

    /// Run rounds until one sends nothing and leaves nothing buffered, or
    /// `max_rounds` have run.
    pub fn run_until_quiescent(&mut self, max_rounds: usize) -> FleetReport {
        self.quiescent = false;
        for _ in 0..max_rounds {
            let round = self.step();
            if round.sent == 0 && self.is_idle() {
                self.quiescent = true;
                break;
            }
        }

        if self.quiescent {
            info!(rounds = self.rounds, "fleet quiescent");
        } else {
            warn!(rounds = self.rounds, "fleet still active after round limit");
        }
        self.report()
    }

    /// Have every agent rebroadcast its current claims.
    pub fn resync(&mut self) -> usize {
        self.quiescent = false;
        self.members.iter_mut().map(|m| m.engine.announce_bundle()).sum()
    }

    pub fn report(&self) -> FleetReport {
        let snapshots: Vec<_> = self.members.iter().map(|m| m.engine.handle().snapshot()).collect();
        FleetReport::from_snapshots(
            self.rounds,
            Some(self.quiescent),
            &snapshots,
            &self.scorer,
            &self.origins,
            self.bus.stats(),
        )
    }

    /// Run every agent as a receiver task plus an allocation loop task for
    /// `duration`, then abort them and report the last published state.
    pub async fn run_async(self, duration: Duration) -> FleetReport {
        let Fleet {
            bus,
            members,
            scorer,
            origins,
            cycle_period,
            ..
        } = self;

        let mut handles = Vec::with_capacity(members.len());
        let mut tasks = Vec::with_capacity(members.len() * 2);
        for member in members {
            handles.push(member.engine.handle());
            tasks.push(tokio::spawn(pump_frames(
                member.engine.mailbox().clone(),
                member.rx,
            )));
            tasks.push(tokio::spawn(
                AllocationLoop::new(member.engine, cycle_period).run(),
            ));
        }

        tokio::time::sleep(duration).await;
        for task in &tasks {
            task.abort();
        }

        let snapshots: Vec<_> = handles.iter().map(|h| h.snapshot()).collect();
        let rounds = snapshots.iter().map(|s| s.cycles as usize).max().unwrap_or(0);
        FleetReport::from_snapshots(rounds, None, &snapshots, &scorer, &origins, bus.stats())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
[[tasks]]
lat = 0.0
lon = 0.0

[[tasks]]
lat = 0.001
lon = 0.0

[[agents]]
id = 1
lat = 0.0
lon = 0.0

[[agents]]
id = 2
lat = 0.001
lon = 0.0
"#;

    #[test]
    fn parses_scenario() {
        let spec = FleetSpec::from_toml_str(SCENARIO).unwrap();
        assert_eq!(spec.tasks.len(), 2);
        assert_eq!(spec.agents[1].id, AgentId(2));
        assert_eq!(spec.load_tasks().unwrap().len(), 2);
    }

    #[test]
    fn rejects_bad_scenarios() {
        assert!(FleetSpec::from_toml_str("[[tasks]]\nlat = 0.0\nlon = 0.0\n").is_err());
        assert!(FleetSpec::from_toml_str("[[agents]]\nid = 1\nlat = 0.0\n").is_err());

        let dup = "[[agents]]\nid = 1\nlat = 0.0\nlon = 0.0\n\n[[agents]]\nid = 1\nlat = 1.0\nlon = 1.0\n";
        assert!(matches!(
            FleetSpec::from_toml_str(dup),
            Err(CbbaError::Config(ConfigError::ValidationError(_)))
        ));

        let far = "[[agents]]\nid = 1\nlat = 91.0\nlon = 0.0\n";
        assert!(FleetSpec::from_toml_str(far).is_err());
    }

    #[test]
    fn agents_split_nearby_tasks() {
        let spec = FleetSpec::from_toml_str(SCENARIO).unwrap();
        let config = CbbaConfig::default();
        let mut fleet = Fleet::new(&spec, &config).unwrap();

        let report = fleet.run_until_quiescent(100);
        assert!(report.converged);
        assert!(report.consistent);
        assert!(report.conflicts.is_empty());
        assert!(report.unassigned.is_empty());

        // each agent sits on one task
        let bundle_of = |id| {
            report
                .agents
                .iter()
                .find(|a| a.agent == AgentId(id))
                .map(|a| a.bundle.clone())
                .unwrap()
        };
        assert!(bundle_of(1).contains(&TaskId(0)));
        assert!(bundle_of(2).contains(&TaskId(1)));
        assert_eq!(fleet.route(AgentId(1)).unwrap().path(), report.agents[0].path);
    }
}
