use crate::connection::DatabaseDriver;
use crate::connection::adapters::DriverRegistry;
use crate::connection::config::{ConfigProvider, DatabaseConfigurations};
use crate::connection::registry::PoolRegistry;
use crate::context::{RoutingContext, ShardContext};
use crate::core::{FabricError, FabricOptions, Result};
use crate::health::{HealthRegistry, ReplicaHealthStatus};
use crate::routing::RoutingProxy;
use log::info;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Process-wide router
///
/// Owns everything shared between units of work: configurations, drivers,
/// the pool registry, replica health statuses and the proxy of every routed
/// model. Per-request state lives in the [`RoutingContext`] values handed out
/// by [`DataFabric::new_context`].
pub struct DataFabric {
    environment: String,
    default_shards: HashMap<String, String>,
    configs: Arc<dyn ConfigProvider>,
    drivers: Arc<DriverRegistry>,
    pools: Arc<PoolRegistry>,
    health: Arc<HealthRegistry>,
    proxies: RwLock<HashMap<String, Arc<RoutingProxy>>>,
}

impl DataFabric {
    pub fn builder(environment: &str) -> DataFabricBuilder {
        DataFabricBuilder::new(environment)
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn configs(&self) -> &Arc<dyn ConfigProvider> {
        &self.configs
    }

    pub fn pools(&self) -> &Arc<PoolRegistry> {
        &self.pools
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Register a routed model, replacing any earlier registration for it
    pub fn data_fabric(&self, model: &str, options: FabricOptions) -> Result<Arc<RoutingProxy>> {
        options.validate()?;
        info!("Creating data_fabric proxy for model {}", model);

        let proxy = Arc::new(RoutingProxy::new(
            model,
            options,
            &self.environment,
            Arc::clone(&self.pools),
            Arc::clone(&self.configs),
            Arc::clone(&self.drivers),
            Arc::clone(&self.health),
        ));

        self.proxies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(model.to_string(), Arc::clone(&proxy));
        Ok(proxy)
    }

    pub fn proxy(&self, model: &str) -> Option<Arc<RoutingProxy>> {
        self.proxies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
            .cloned()
    }

    pub fn models(&self) -> Vec<String> {
        let proxies = self.proxies.read().unwrap_or_else(PoisonError::into_inner);
        let mut models: Vec<String> = proxies.keys().cloned().collect();
        models.sort();
        models
    }

    /// Fresh routing state for a unit of work, seeded with the default shards
    pub fn new_context(&self) -> RoutingContext {
        RoutingContext::new(ShardContext::from_defaults(&self.default_shards))
    }

    /// Release idle connections beyond each pool's minimum
    pub async fn clear_active_connections(&self) -> usize {
        self.pools.release_all().await
    }

    pub async fn clear_stale_connections(&self) -> usize {
        self.pools.clear_stale_all().await
    }

    pub async fn verify_active_connections(&self) -> usize {
        self.pools.verify_all().await
    }

    pub async fn disconnect_all(&self) -> usize {
        self.pools.disconnect_all().await
    }

    /// Disconnect and forget every pool; they are recreated on next use
    ///
    /// Lag checkers let go of their replica pools too and rebind to the
    /// fresh pool on their next measurement.
    pub async fn teardown(&self) -> Result<usize> {
        let closed = self.pools.teardown().await?;
        for status in self.health.iter() {
            status.detach_replica();
        }
        Ok(closed)
    }
}

impl std::fmt::Debug for DataFabric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFabric")
            .field("environment", &self.environment)
            .field("default_shards", &self.default_shards)
            .field("drivers", &self.drivers)
            .field("pools", &self.pools)
            .field("models", &self.models())
            .finish()
    }
}

/// Setup-time configuration of a [`DataFabric`]
pub struct DataFabricBuilder {
    environment: String,
    configs: Option<Arc<dyn ConfigProvider>>,
    drivers: DriverRegistry,
    default_shards: HashMap<String, String>,
    statuses: Vec<ReplicaHealthStatus>,
}

impl DataFabricBuilder {
    pub fn new(environment: &str) -> Self {
        Self {
            environment: environment.to_string(),
            configs: None,
            drivers: DriverRegistry::new(),
            default_shards: HashMap::new(),
            statuses: Vec::new(),
        }
    }

    pub fn configurations(self, configs: impl ConfigProvider + 'static) -> Self {
        self.config_provider(Arc::new(configs))
    }

    pub fn config_provider(mut self, configs: Arc<dyn ConfigProvider>) -> Self {
        self.configs = Some(configs);
        self
    }

    pub fn driver(mut self, driver: Arc<dyn DatabaseDriver>) -> Self {
        self.drivers.register(driver);
        self
    }

    pub fn driver_alias(mut self, adapter: &str, driver: Arc<dyn DatabaseDriver>) -> Self {
        self.drivers.alias(adapter, driver);
        self
    }

    /// Shard active in every new context until deactivated
    pub fn default_shard(mut self, group: &str, value: &str) -> Self {
        self.default_shards.insert(group.to_string(), value.to_string());
        self
    }

    /// Use `status` for its replica group instead of the one derived from configuration
    pub fn health_status(mut self, status: ReplicaHealthStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn build(self) -> Result<DataFabric> {
        if self.environment.is_empty() {
            return Err(FabricError::InvalidOptions("environment cannot be empty".into()));
        }

        let configs = self
            .configs
            .unwrap_or_else(|| Arc::new(DatabaseConfigurations::new()));

        let mut health = HealthRegistry::from_configurations(configs.as_ref());
        for status in self.statuses {
            health.insert(status);
        }

        info!(
            "Loading data_fabric {} for environment '{}' ({} replica groups)",
            env!("CARGO_PKG_VERSION"),
            self.environment,
            health.len()
        );

        Ok(DataFabric {
            environment: self.environment,
            default_shards: self.default_shards,
            configs,
            drivers: Arc::new(self.drivers),
            pools: Arc::new(PoolRegistry::new()),
            health: Arc::new(health),
            proxies: RwLock::new(HashMap::new()),
        })
    }
}
