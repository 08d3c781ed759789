//! Bounded history of deployment results.

use super::DeploymentUnitResult;

use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Number of units kept in the history.
pub const HISTORY_CAPACITY: usize = 10;

/// Fixed-capacity ring buffer of the most recent deployment units.
pub struct ExecutionHistory {
    capacity: usize,
    units: RwLock<VecDeque<DeploymentUnitResult>>,
}

impl Default for ExecutionHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl ExecutionHistory {
    /// A zero capacity is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            units: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append a batch unit by unit, evicting the oldest units.
    pub async fn append(&self, batch: &[DeploymentUnitResult]) {
        let mut units = self.units.write().await;
        for unit in batch {
            if units.len() >= self.capacity {
                units.pop_front();
            }
            units.push_back(unit.clone());
        }
    }

    /// Retained units, oldest first.
    pub async fn snapshot(&self) -> Vec<DeploymentUnitResult> {
        self.units.read().await.iter().cloned().collect()
    }
}
