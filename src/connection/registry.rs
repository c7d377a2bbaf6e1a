use super::adapters::DriverRegistry;
use super::config::ConfigProvider;
use super::pool::ConnectionPool;
use crate::core::{FabricError, Result};
use log::info;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

type PoolSlot = Arc<OnceCell<Arc<ConnectionPool>>>;

/// Process-wide cache of connection pools keyed by resolved connection name
///
/// At most one pool is ever created per name: concurrent first requests for
/// the same name wait on a shared slot while requests for other names proceed.
/// Pools live until [`PoolRegistry::teardown`].
#[derive(Default)]
pub struct PoolRegistry {
    slots: Mutex<HashMap<String, PoolSlot>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the pool for `name`, creating it from its configuration on first use
    pub async fn get_or_create(
        &self,
        name: &str,
        configs: &dyn ConfigProvider,
        drivers: &DriverRegistry,
    ) -> Result<Arc<ConnectionPool>> {
        let slot = {
            let mut slots = self.slots.lock()?;
            Arc::clone(slots.entry(name.to_string()).or_default())
        };

        let init = slot
            .get_or_try_init(|| async move {
                let config = configs.lookup(name).ok_or_else(|| {
                    FabricError::UnknownConfiguration {
                        name: name.to_string(),
                        known: configs.names(),
                    }
                })?;
                let driver = drivers.load(&config.adapter)?;
                let pool = ConnectionPool::new(name, config, driver).await?;
                info!("Created connection pool for '{}' ({})", name, pool.adapter_name());
                Ok::<_, FabricError>(Arc::new(pool))
            })
            .await;

        match init {
            Ok(pool) => Ok(Arc::clone(pool)),
            Err(e) => {
                self.forget_failed(name, &slot);
                Err(e)
            }
        }
    }

    /// Drop an uninitialized slot nobody else is waiting on
    fn forget_failed(&self, name: &str, slot: &PoolSlot) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let unused = slots.get(name).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && !current.initialized() && Arc::strong_count(current) == 2
        });
        if unused {
            slots.remove(name);
        }
    }

    /// Existing pool for `name`, never creating one
    pub fn get(&self, name: &str) -> Option<Arc<ConnectionPool>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(name)?.get().cloned()
    }

    pub fn pools(&self) -> Vec<Arc<ConnectionPool>> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let mut pools: Vec<Arc<ConnectionPool>> =
            slots.values().filter_map(|slot| slot.get().cloned()).collect();
        pools.sort_by(|a, b| a.name().cmp(b.name()));
        pools
    }

    pub fn names(&self) -> Vec<String> {
        self.pools().iter().map(|p| p.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.pools().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close idle connections of every pool
    pub async fn disconnect_all(&self) -> usize {
        let mut closed = 0;
        for pool in self.pools() {
            closed += pool.disconnect().await;
        }
        closed
    }

    /// Shrink every pool back to its minimum idle size
    pub async fn release_all(&self) -> usize {
        let mut closed = 0;
        for pool in self.pools() {
            closed += pool.release_connections().await;
        }
        closed
    }

    pub async fn clear_stale_all(&self) -> usize {
        let mut closed = 0;
        for pool in self.pools() {
            closed += pool.clear_stale_connections().await;
        }
        closed
    }

    pub async fn verify_all(&self) -> usize {
        let mut closed = 0;
        for pool in self.pools() {
            closed += pool.verify_active_connections().await;
        }
        closed
    }

    /// Disconnect and forget every pool
    pub async fn teardown(&self) -> Result<usize> {
        let pools = self.pools();
        self.slots.lock()?.clear();

        let mut closed = 0;
        for pool in pools {
            closed += pool.disconnect().await;
        }
        Ok(closed)
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry").field("pools", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::config::{ConnectionConfig, DatabaseConfigurations};

    #[tokio::test]
    async fn test_failed_lookups_leave_no_slot_behind() {
        let registry = PoolRegistry::new();
        let configs = DatabaseConfigurations::new();
        let drivers = DriverRegistry::new();

        for n in 0..3 {
            let name = format!("tenant_{}_test", n);
            let err = registry.get_or_create(&name, &configs, &drivers).await.unwrap_err();
            assert!(matches!(err, FabricError::UnknownConfiguration { .. }));
        }

        assert!(registry.slots.lock().unwrap().is_empty());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_missing_adapter_slot_is_forgotten() {
        let registry = PoolRegistry::new();
        let configs = DatabaseConfigurations::new()
            .with("test_master", ConnectionConfig::new("mysql2", "test_master"));
        let drivers = DriverRegistry::new();

        let err = registry.get_or_create("test_master", &configs, &drivers).await.unwrap_err();
        assert!(matches!(err, FabricError::AdapterNotLoaded { .. }));
        assert!(!registry.slots.lock().unwrap().contains_key("test_master"));
    }
}
