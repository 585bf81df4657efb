//! Container lifecycle state and the persistence hook

use std::fmt;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{ContainerId, ContractError};

/// Container lifecycle state
///
/// `Inactive → Starting → Active → Stopping → Inactive`; `Error` is entered
/// from `Starting` or `Active` on unrecoverable transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerState {
    #[default]
    Inactive,
    Starting,
    Active,
    Stopping,
    Error,
}

impl ContainerState {
    /// `Error` counts as inactive for restart eligibility
    pub fn can_start(self) -> bool {
        matches!(self, ContainerState::Inactive | ContainerState::Error)
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContainerState::Inactive => "inactive",
            ContainerState::Starting => "starting",
            ContainerState::Active => "active",
            ContainerState::Stopping => "stopping",
            ContainerState::Error => "error",
        };
        f.write_str(s)
    }
}

/// Persisted view of a container's runtime fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSnapshot {
    pub container_id: ContainerId,
    pub name: String,
    pub state: ContainerState,
    pub is_active: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub message_count: u64,
    /// Activation counter; bumps on every start
    pub epoch: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Save hook invoked at every lifecycle transition
pub trait StateStore: Send + Sync {
    fn save(&self, snapshot: &ContainerSnapshot) -> Result<(), ContractError>;
}

/// Discards every snapshot
#[derive(Debug, Default, Clone, Copy)]
pub struct NullStore;

impl StateStore for NullStore {
    fn save(&self, _snapshot: &ContainerSnapshot) -> Result<(), ContractError> {
        Ok(())
    }
}

/// Keeps every saved snapshot in order
#[derive(Debug, Default)]
pub struct MemoryStore {
    history: Mutex<Vec<ContainerSnapshot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All snapshots saved so far
    pub fn history(&self) -> Vec<ContainerSnapshot> {
        self.history.lock().clone()
    }

    /// Most recent snapshot for a container
    pub fn latest(&self, container_id: ContainerId) -> Option<ContainerSnapshot> {
        self.history
            .lock()
            .iter()
            .rev()
            .find(|s| s.container_id == container_id)
            .cloned()
    }

    /// Saved state sequence for a container
    pub fn states(&self, container_id: ContainerId) -> Vec<ContainerState> {
        self.history
            .lock()
            .iter()
            .filter(|s| s.container_id == container_id)
            .map(|s| s.state)
            .collect()
    }
}

impl StateStore for MemoryStore {
    fn save(&self, snapshot: &ContainerSnapshot) -> Result<(), ContractError> {
        self.history.lock().push(snapshot.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(id: ContainerId, state: ContainerState) -> ContainerSnapshot {
        ContainerSnapshot {
            container_id: id,
            name: format!("c{id}"),
            state,
            is_active: state == ContainerState::Active,
            start_time: None,
            message_count: 0,
            epoch: 1,
            last_error: None,
        }
    }

    #[test]
    fn test_can_start() {
        assert!(ContainerState::Inactive.can_start());
        assert!(ContainerState::Error.can_start());
        assert!(!ContainerState::Active.can_start());
        assert!(!ContainerState::Stopping.can_start());
    }

    #[test]
    fn test_memory_store_history() {
        let store = MemoryStore::new();
        store.save(&snapshot(1, ContainerState::Starting)).unwrap();
        store.save(&snapshot(2, ContainerState::Starting)).unwrap();
        store.save(&snapshot(1, ContainerState::Active)).unwrap();

        assert_eq!(
            store.states(1),
            vec![ContainerState::Starting, ContainerState::Active]
        );
        assert_eq!(store.latest(2).unwrap().state, ContainerState::Starting);
        assert!(store.latest(3).is_none());
        assert_eq!(store.history().len(), 3);
    }
}
