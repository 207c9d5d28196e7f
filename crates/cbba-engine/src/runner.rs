use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::engine::{AllocationEngine, EngineHandle};

/// Drives one engine forever at a bounded cycle rate.
///
/// There is no stop signal; the owning task is aborted on shutdown.
pub struct AllocationLoop {
    engine: AllocationEngine,
    period: Duration,
}

impl AllocationLoop {
    pub fn new(engine: AllocationEngine, period: Duration) -> Self {
        Self { engine, period }
    }

    pub fn handle(&self) -> EngineHandle {
        self.engine.handle()
    }

    pub async fn run(mut self) {
        info!(agent = %self.engine.id(), period_ms = self.period.as_millis() as u64, "allocation loop started");

        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let report = self.engine.run_cycle();
            if report.claimed > 0 || report.released > 0 {
                debug!(agent = %self.engine.id(), ?report, "cycle");
            }
        }
    }
}
