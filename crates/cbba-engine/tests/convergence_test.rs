use cbba_core::{AgentId, CbbaConfig, Location, SystemClock, TaskId};
use cbba_engine::{AgentSpec, Fleet, FleetReport, FleetSpec};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

fn spec(tasks: &[(f64, f64)], agents: &[(u32, f64, f64)]) -> FleetSpec {
    FleetSpec {
        tasks: tasks.iter().map(|&(lat, lon)| Location::new(lat, lon)).collect(),
        agents: agents
            .iter()
            .map(|&(id, lat, lon)| AgentSpec {
                id: AgentId(id),
                lat,
                lon,
            })
            .collect(),
    }
}

fn config(capacity: usize) -> CbbaConfig {
    let mut config = CbbaConfig::default();
    config.allocation.max_assignments = capacity;
    config
}

fn assert_settled(report: &FleetReport) {
    assert!(report.converged, "fleet did not converge: {report:?}");
    assert!(report.conflicts.is_empty(), "double claims: {:?}", report.conflicts);
    for agent in &report.agents {
        let bundle: HashSet<_> = agent.bundle.iter().collect();
        let path: HashSet<_> = agent.path.iter().collect();
        assert_eq!(bundle, path);
    }
}

#[test]
fn test_two_agents_same_spot_tie_goes_to_lower_id() {
    let spec = spec(&[(0.0, 0.0)], &[(1, 0.0, 0.0), (2, 0.0, 0.0)]);
    let mut fleet = Fleet::new(&spec, &config(1)).unwrap();

    let report = fleet.run_until_quiescent(50);
    assert_settled(&report);
    assert!(report.consistent);
    assert_eq!(report.agents[0].bundle, vec![TaskId(0)]);
    assert!(report.agents[1].bundle.is_empty());
}

#[test]
fn test_three_agents_share_tasks_without_conflict() {
    let spec = spec(
        &[
            (0.0, 0.0),
            (0.0005, 0.0),
            (0.0, 0.0005),
            (0.001, 0.001),
            (-0.0005, 0.0),
        ],
        &[(1, 0.0, 0.0), (2, 0.001, 0.001), (3, -0.0005, 0.0)],
    );
    let mut fleet = Fleet::new(&spec, &config(2)).unwrap();

    let report = fleet.run_until_quiescent(500);
    assert_settled(&report);
    assert!(report.agents.iter().all(|a| a.bundle.len() <= 2));

    // every agent holds the task under its feet
    let holds = |id: u32, task: usize| {
        report
            .agents
            .iter()
            .find(|a| a.agent == AgentId(id))
            .is_some_and(|a| a.bundle.contains(&TaskId(task)))
    };
    assert!(holds(1, 0));
    assert!(holds(2, 3));
    assert!(holds(3, 4));
}

#[test]
fn test_quiescent_fleet_stays_quiet() {
    let spec = spec(&[(0.0, 0.0), (0.0005, 0.0)], &[(1, 0.0, 0.0), (2, 0.0005, 0.0)]);
    let mut fleet = Fleet::new(&spec, &config(2)).unwrap();
    let first = fleet.run_until_quiescent(100);
    assert_settled(&first);

    let round = fleet.step();
    assert_eq!(round.sent, 0);
    assert_eq!(round.claimed, 0);
    let bundles = |r: &FleetReport| r.agents.iter().map(|a| a.bundle.clone()).collect::<Vec<_>>();
    assert_eq!(bundles(&fleet.report()), bundles(&first));
}

#[test]
fn test_lossy_fleet_settles_once_loss_stops() {
    let spec = spec(
        &[(0.0, 0.0), (0.0005, 0.0), (0.0, 0.0005), (0.0005, 0.0005)],
        &[(1, 0.0, 0.0), (2, 0.0005, 0.0005)],
    );
    let mut config = config(2);
    config.simulation.loss = 0.4;
    config.simulation.seed = 11;
    let mut fleet = Fleet::new(&spec, &config).unwrap();

    for _ in 0..20 {
        fleet.step();
    }
    assert!(fleet.bus().stats().lost > 0);

    fleet.bus().set_loss(0.0);
    fleet.resync();
    let report = fleet.run_until_quiescent(500);
    assert_settled(&report);
}

#[test]
fn test_empty_registry_is_immediately_quiescent() {
    let spec = spec(&[], &[(1, 0.0, 0.0), (2, 1.0, 1.0)]);
    let mut fleet = Fleet::new(&spec, &config(3)).unwrap();
    let report = fleet.run_until_quiescent(10);
    assert!(report.converged);
    assert_eq!(report.rounds, 1);
    assert!(report.agents.iter().all(|a| a.bundle.is_empty()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_fleet_runs_loops_and_receivers() {
    let spec = spec(&[(0.0, 0.0), (0.0005, 0.0)], &[(1, 0.0, 0.0), (2, 0.0005, 0.0)]);
    let mut config = config(1);
    config.allocation.cycle_interval_ms = 5;
    let fleet = Fleet::with_clock(&spec, &config, Arc::new(SystemClock::new())).unwrap();

    let report = fleet.run_async(Duration::from_millis(400)).await;
    assert!(report.agents.iter().all(|a| a.cycles > 0));
    assert!(report.conflicts.is_empty(), "double claims: {:?}", report.conflicts);
    assert!(report.bus.delivered > 0);
}
