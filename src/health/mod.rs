//! Replica lag monitoring
//!
//! Each replica configuration gets one [`ReplicaHealthStatus`]: a sticky
//! master/replica decision refreshed through a rate-limited [`Poller`] that
//! wraps a [`LagChecker`]. Lag checks fail open, so monitoring problems
//! degrade to "keep reading from the replica" instead of failing requests.

pub mod checker;
pub mod poller;
pub mod status;

pub use checker::{FixedLag, LagChecker, SqlReplicaLagChecker};
pub use poller::Poller;
pub use status::ReplicaHealthStatus;

use crate::connection::config::ConfigProvider;
use crate::core::{FabricError, Result, Role};
use crate::routing::SEPARATOR;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Health statuses keyed by replica connection name
#[derive(Debug, Default, Clone)]
pub struct HealthRegistry {
    statuses: BTreeMap<String, Arc<ReplicaHealthStatus>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One SQL-checked status per configuration whose last name segment is the replica role
    pub fn from_configurations(configs: &dyn ConfigProvider) -> Self {
        let mut registry = Self::new();
        let replica_role = Role::Slave.as_str();

        for name in configs
            .names()
            .into_iter()
            .filter(|n| n.rsplit(SEPARATOR).next() == Some(replica_role))
        {
            if let Some(config) = configs.lookup(&name) {
                let checker = Box::new(SqlReplicaLagChecker::new(&name));
                let poller = Poller::from_config(checker, &config);
                registry.insert(ReplicaHealthStatus::new(&name, poller));
            }
        }

        registry
    }

    /// Register a status under its own name, replacing any previous one
    pub fn insert(&mut self, status: ReplicaHealthStatus) {
        self.statuses.insert(status.name().to_string(), Arc::new(status));
    }

    pub fn status_for(&self, name: &str) -> Result<Arc<ReplicaHealthStatus>> {
        self.statuses
            .get(name)
            .cloned()
            .ok_or_else(|| FabricError::UnknownReplicaGroup(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.statuses.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ReplicaHealthStatus>> {
        self.statuses.values()
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}
