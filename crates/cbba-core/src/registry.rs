use crate::{Location, Result, TaskId};
use std::sync::Arc;

/// Immutable, ordered list of task locations shared by every component of
/// one agent. Loaded once before the allocation loop starts.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    locations: Arc<Vec<Location>>,
}

impl TaskRegistry {
    pub fn new(locations: Vec<Location>) -> Self {
        Self {
            locations: Arc::new(locations),
        }
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn contains(&self, task: TaskId) -> bool {
        task.0 < self.locations.len()
    }

    pub fn location(&self, task: TaskId) -> Option<Location> {
        self.locations.get(task.0).copied()
    }

    pub fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        (0..self.locations.len()).map(TaskId)
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }
}

/// One-shot provider of the task registry.
pub trait TaskSource {
    fn load_tasks(&self) -> Result<TaskRegistry>;
}

/// Task source backed by a fixed list of locations.
#[derive(Debug, Clone, Default)]
pub struct StaticTaskSource {
    locations: Vec<Location>,
}

impl StaticTaskSource {
    pub fn new(locations: Vec<Location>) -> Self {
        Self { locations }
    }
}

impl TaskSource for StaticTaskSource {
    fn load_tasks(&self) -> Result<TaskRegistry> {
        Ok(TaskRegistry::new(self.locations.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lookup() {
        let reg = TaskRegistry::new(vec![Location::new(1.0, 2.0), Location::new(3.0, 4.0)]);
        assert_eq!(reg.len(), 2);
        assert!(reg.contains(TaskId(1)));
        assert!(!reg.contains(TaskId(2)));
        assert_eq!(reg.location(TaskId(1)), Some(Location::new(3.0, 4.0)));
        assert_eq!(reg.location(TaskId(5)), None);
        assert_eq!(reg.ids().collect::<Vec<_>>(), vec![TaskId(0), TaskId(1)]);
    }

    #[test]
    fn static_source_loads_in_order() {
        let src = StaticTaskSource::new(vec![Location::new(0.5, 0.5)]);
        let reg = src.load_tasks().unwrap();
        assert_eq!(reg.locations(), &[Location::new(0.5, 0.5)]);
    }

    #[test]
    fn empty_registry() {
        let reg = TaskRegistry::default();
        assert!(reg.is_empty());
        assert_eq!(reg.ids().count(), 0);
    }
}
