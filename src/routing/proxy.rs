use super::resolver::ConnectionNameResolver;
use crate::connection::adapters::DriverRegistry;
use crate::connection::config::ConfigProvider;
use crate::connection::pool::{ConnectionPool, PoolGuard, PoolStats};
use crate::connection::registry::PoolRegistry;
use crate::context::{RoleScope, RoutingContext};
use crate::core::{FabricOptions, Result, Role, Value};
use crate::health::{HealthRegistry, ReplicaHealthStatus};
use crate::result::QueryResult;
use futures::future::BoxFuture;
use log::{debug, warn};
use std::sync::Arc;

/// Per-model connection router
///
/// Picks the physical connection for every call from the caller's
/// [`RoutingContext`]: the active shard of the model's shard group and the
/// effective role. The role is, in order:
///
/// 1. the role pinned by an enclosing `with_role` scope for this model,
/// 2. the replica health decision, when dynamic toggling is enabled,
/// 3. the configured default role.
///
/// Writes, DDL and transactions always go to master.
///
/// Scoped operations take a callback returning a boxed future. Captures must
/// be owned, so clone the proxy `Arc` into the callback:
///
/// ```ignore
/// let orders = Arc::clone(&proxy);
/// let total = proxy
///     .with_master(&mut ctx, move |ctx| {
///         Box::pin(async move { orders.select(ctx, "SELECT SUM(total) FROM orders").await })
///     })
///     .await?;
/// ```
pub struct RoutingProxy {
    model: String,
    options: FabricOptions,
    resolver: ConnectionNameResolver,
    pools: Arc<PoolRegistry>,
    configs: Arc<dyn ConfigProvider>,
    drivers: Arc<DriverRegistry>,
    /// Present iff dynamic toggling is enabled
    health: Option<Arc<HealthRegistry>>,
}

impl RoutingProxy {
    pub(crate) fn new(
        model: &str,
        options: FabricOptions,
        environment: &str,
        pools: Arc<PoolRegistry>,
        configs: Arc<dyn ConfigProvider>,
        drivers: Arc<DriverRegistry>,
        health: Arc<HealthRegistry>,
    ) -> Self {
        let resolver = ConnectionNameResolver::new(&options, environment);
        let health = options.dynamic_toggle.then_some(health);
        Self {
            model: model.to_string(),
            options,
            resolver,
            pools,
            configs,
            drivers,
            health,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn options(&self) -> &FabricOptions {
        &self.options
    }

    pub fn resolver(&self) -> &ConnectionNameResolver {
        &self.resolver
    }

    /// Effective role for the next call made with `ctx`
    ///
    /// With dynamic toggling this gives the health status of the current
    /// replica group a chance to poll, so it may issue a lag query.
    pub async fn current_role(&self, ctx: &RoutingContext) -> Result<Role> {
        if let Some(role) = ctx.fixed_role(&self.model) {
            return Ok(role);
        }

        match &self.health {
            Some(health) => {
                let status = self.replica_status(ctx, health).await?;
                status.update_status().await;
                Ok(status.role())
            }
            None => Ok(self.options.default_role),
        }
    }

    async fn replica_status(
        &self,
        ctx: &RoutingContext,
        health: &HealthRegistry,
    ) -> Result<Arc<ReplicaHealthStatus>> {
        let replica = self.resolver.resolve(ctx.shards(), Role::Slave)?;
        let status = health.status_for(&replica)?;

        // Lag checks fail open, so an unusable replica pool only leaves the checker unbound
        match self.pool_named(&replica).await {
            Ok(pool) => status.attach_replica(pool),
            Err(e) => warn!("Replica lag checker for '{}' has no pool: {}", replica, e),
        }

        Ok(status)
    }

    /// Resolved connection name for the next call made with `ctx`
    pub async fn connection_name(&self, ctx: &RoutingContext) -> Result<String> {
        let role = self.current_role(ctx).await?;
        self.resolver.resolve(ctx.shards(), role)
    }

    async fn pool_named(&self, name: &str) -> Result<Arc<ConnectionPool>> {
        self.pools
            .get_or_create(name, self.configs.as_ref(), &self.drivers)
            .await
    }

    async fn pool_for(&self, ctx: &RoutingContext, role: Role) -> Result<Arc<ConnectionPool>> {
        let name = self.resolver.resolve(ctx.shards(), role)?;
        self.pool_named(&name).await
    }

    pub async fn current_pool(&self, ctx: &RoutingContext) -> Result<Arc<ConnectionPool>> {
        let name = self.connection_name(ctx).await?;
        self.pool_named(&name).await
    }

    /// Check out a connection from the current pool
    pub async fn connection(&self, ctx: &RoutingContext) -> Result<PoolGuard> {
        self.current_pool(ctx).await?.get_connection().await
    }

    /// Whether the current pool exists and holds open connections
    pub async fn is_connected(&self, ctx: &RoutingContext) -> Result<bool> {
        let name = self.connection_name(ctx).await?;
        Ok(match self.pools.get(&name) {
            Some(pool) => pool.stats().await.total_connections > 0,
            None => false,
        })
    }

    pub async fn pool_stats(&self, ctx: &RoutingContext) -> Result<PoolStats> {
        Ok(self.current_pool(ctx).await?.stats().await)
    }

    /// Pin this model to `role` until the returned scope is dropped
    pub fn pin<'a>(&self, ctx: &'a mut RoutingContext, role: Role) -> RoleScope<'a> {
        ctx.role_scope(&self.model, role)
    }

    /// Run `f` with this model pinned to `role`
    ///
    /// Scopes nest; leaving one restores whatever the enclosing scope had,
    /// including automatic role selection, whether `f` succeeded or not.
    pub async fn with_role<T, F>(&self, ctx: &mut RoutingContext, role: Role, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut RoutingContext) -> BoxFuture<'c, Result<T>>,
    {
        let mut scope = self.pin(ctx, role);
        let out = f(&mut *scope).await;
        drop(scope);
        out
    }

    pub async fn with_master<T, F>(&self, ctx: &mut RoutingContext, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut RoutingContext) -> BoxFuture<'c, Result<T>>,
    {
        self.with_role(ctx, Role::Master, f).await
    }

    pub async fn with_slave<T, F>(&self, ctx: &mut RoutingContext, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut RoutingContext) -> BoxFuture<'c, Result<T>>,
    {
        self.with_role(ctx, Role::Slave, f).await
    }

    /// Freeze the role resolved right now for the duration of `f`
    pub async fn with_current_role<T, F>(&self, ctx: &mut RoutingContext, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut RoutingContext) -> BoxFuture<'c, Result<T>>,
    {
        let role = self.current_role(ctx).await?;
        self.with_role(ctx, role, f).await
    }

    async fn run_on(&self, pool: &ConnectionPool, operation: &str, sql: &str) -> Result<QueryResult> {
        debug!("Calling {} on {}", operation, pool.name());
        let mut conn = pool.get_connection().await?;
        let result = conn.execute(sql).await;
        let closed = conn.close().await;
        let result = result?;
        closed?;
        Ok(result)
    }

    async fn write(&self, ctx: &RoutingContext, operation: &str, sql: &str) -> Result<QueryResult> {
        let pool = self.pool_for(ctx, Role::Master).await?;
        self.run_on(&pool, operation, sql).await
    }

    /// Read through the connection for the effective role
    pub async fn select(&self, ctx: &RoutingContext, sql: &str) -> Result<QueryResult> {
        let pool = self.current_pool(ctx).await?;
        self.run_on(&pool, "select", sql).await
    }

    /// Re-read a record from master, for fetch-after-write
    ///
    /// Only this read is pinned; the previous role applies again afterwards.
    pub async fn reload(&self, ctx: &mut RoutingContext, sql: &str) -> Result<QueryResult> {
        let scope = self.pin(ctx, Role::Master);
        self.select(&scope, sql).await
    }

    pub async fn execute(&self, ctx: &RoutingContext, sql: &str) -> Result<QueryResult> {
        self.write(ctx, "execute", sql).await
    }

    pub async fn insert(&self, ctx: &RoutingContext, sql: &str) -> Result<QueryResult> {
        self.write(ctx, "insert", sql).await
    }

    pub async fn update(&self, ctx: &RoutingContext, sql: &str) -> Result<QueryResult> {
        self.write(ctx, "update", sql).await
    }

    pub async fn delete(&self, ctx: &RoutingContext, sql: &str) -> Result<QueryResult> {
        self.write(ctx, "delete", sql).await
    }

    /// Schema changes: create/alter/drop tables, columns and indexes
    pub async fn schema(&self, ctx: &RoutingContext, sql: &str) -> Result<QueryResult> {
        self.write(ctx, "schema", sql).await
    }

    /// Bulk insert on a single master connection; returns total affected rows
    pub async fn insert_many(&self, ctx: &RoutingContext, statements: &[&str]) -> Result<u64> {
        let pool = self.pool_for(ctx, Role::Master).await?;
        debug!("Calling insert_many ({} statements) on {}", statements.len(), pool.name());

        let mut conn = pool.get_connection().await?;
        let mut affected = 0;
        for sql in statements {
            affected += conn.execute(sql).await?.affected_rows;
        }
        conn.close().await?;
        Ok(affected)
    }

    /// Run `f` inside a transaction on master
    ///
    /// The model stays pinned to master while `f` runs. Statements that must
    /// belong to the transaction go through the provided connection. The
    /// transaction commits when `f` returns `Ok` and rolls back otherwise.
    pub async fn transaction<T, F>(&self, ctx: &mut RoutingContext, f: F) -> Result<T>
    where
        F: for<'c> FnOnce(&'c mut RoutingContext, &'c mut PoolGuard) -> BoxFuture<'c, Result<T>>,
    {
        let mut scope = self.pin(ctx, Role::Master);
        let pool = self.current_pool(&scope).await?;
        debug!("Calling transaction on {}", pool.name());

        let mut conn = pool.get_connection().await?;
        conn.begin().await?;

        match f(&mut *scope, &mut conn).await {
            Ok(value) => {
                conn.commit().await?;
                conn.close().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = conn.rollback().await {
                    warn!("Rollback on {} failed: {}", pool.name(), rollback);
                }
                if let Err(close) = conn.close().await {
                    warn!("Returning connection to {} failed: {}", pool.name(), close);
                }
                Err(e)
            }
        }
    }

    /// Forward an operation the typed surface does not cover
    ///
    /// Whether the operation exists is up to the driver; unsupported
    /// operations fail with the driver's error.
    pub async fn call(&self, ctx: &RoutingContext, method: &str, args: &[Value]) -> Result<QueryResult> {
        let pool = self.current_pool(ctx).await?;
        warn!("Forwarding untyped call '{}' for {} to {}", method, self.model, pool.name());

        let mut conn = pool.get_connection().await?;
        let result = conn.call(method, args).await;
        let closed = conn.close().await;
        let result = result?;
        closed?;
        Ok(result)
    }

    /// Shards of this model's group configured for the current environment
    pub fn shard_names(&self) -> Result<Vec<String>> {
        self.resolver.shard_names(self.configs.names())
    }
}

impl std::fmt::Debug for RoutingProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingProxy")
            .field("model", &self.model)
            .field("options", &self.options)
            .finish()
    }
}
