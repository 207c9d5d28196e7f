use cbba_core::{AgentId, PathConsumer, TaskId};
use parking_lot::Mutex;
use std::collections::HashSet;
use tracing::info;

#[derive(Debug, Default)]
struct RouteState {
    path: Vec<TaskId>,
    changes: u64,
    completed: HashSet<TaskId>,
}

/// Path consumer that keeps the latest route and which of its tasks have
/// been carried out.
#[derive(Debug, Default)]
pub struct RouteTracker {
    inner: Mutex<RouteState>,
}

impl RouteTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Vec<TaskId> {
        self.inner.lock().path.clone()
    }

    /// Number of path notifications received.
    pub fn changes(&self) -> u64 {
        self.inner.lock().changes
    }

    pub fn mark_completed(&self, task: TaskId) {
        self.inner.lock().completed.insert(task);
    }

    pub fn is_completed(&self, task: TaskId) -> bool {
        self.inner.lock().completed.contains(&task)
    }

    /// First task on the route not yet completed.
    pub fn current_target(&self) -> Option<TaskId> {
        let inner = self.inner.lock();
        inner
            .path
            .iter()
            .copied()
            .find(|t| !inner.completed.contains(t))
    }
}

impl PathConsumer for RouteTracker {
    fn path_changed(&self, agent: AgentId, path: &[TaskId]) {
        let mut inner = self.inner.lock();
        inner.path = path.to_vec();
        inner.changes += 1;
        info!(%agent, path = ?path, "route updated");
    }
}
