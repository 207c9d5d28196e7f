use cbba_core::{AllocationConfig, Location, TaskId, TaskRegistry};

/// Parameters of the time-discounted reward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringParams {
    pub reward: f64,
    pub time_discount_factor: f64,
    /// Metres per second
    pub max_speed: f64,
}

impl Default for ScoringParams {
    fn default() -> Self {
        Self::from(&AllocationConfig::default())
    }
}

impl From<&AllocationConfig> for ScoringParams {
    fn from(cfg: &AllocationConfig) -> Self {
        Self {
            reward: cfg.reward,
            time_discount_factor: cfg.time_discount_factor,
            max_speed: cfg.max_speed,
        }
    }
}

/// Scores execution routes over one task registry.
#[derive(Debug, Clone)]
pub struct Scorer {
    registry: TaskRegistry,
    params: ScoringParams,
}

impl Scorer {
    pub fn new(registry: TaskRegistry, params: ScoringParams) -> Self {
        Self { registry, params }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn params(&self) -> &ScoringParams {
        &self.params
    }

    /// Sum of `reward * discount^arrival` over the route, travelling from
    /// `origin` at constant speed. Arrival times accumulate along the path.
    pub fn score(&self, origin: Location, path: &[TaskId]) -> f64 {
        let mut here = origin;
        let mut elapsed = 0.0;
        let mut total = 0.0;

        for task in path {
            let Some(there) = self.registry.location(*task) else {
                continue;
            };
            elapsed += here.distance_to(&there) / self.params.max_speed;
            total += self.params.reward * self.params.time_discount_factor.powf(elapsed);
            here = there;
        }

        total
    }

    /// Best gain from inserting `task` anywhere into `path`.
    ///
    /// Returns `(marginal, position)`; the first position reaching the
    /// maximum wins.
    pub fn best_insertion(&self, origin: Location, path: &[TaskId], task: TaskId) -> (f64, usize) {
        let baseline = self.score(origin, path);
        let mut candidate = Vec::with_capacity(path.len() + 1);
        let mut best = (f64::NEG_INFINITY, 0);

        for pos in 0..=path.len() {
            candidate.clear();
            candidate.extend_from_slice(&path[..pos]);
            candidate.push(task);
            candidate.extend_from_slice(&path[pos..]);

            let marginal = self.score(origin, &candidate) - baseline;
            if marginal > best.0 {
                best = (marginal, pos);
            }
        }

        best
    }
}
