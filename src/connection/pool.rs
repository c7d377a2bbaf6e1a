use super::{DatabaseDriver, DriverConnection, config::ConnectionConfig};
use crate::core::{FabricError, Result, Value};
use crate::result::QueryResult;
use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Connection pool
///
/// Manages the physical connections of one named configuration. Checkout
/// hands out a [`PoolGuard`] that returns its connection when dropped.
pub struct ConnectionPool {
    /// Resolved connection name this pool serves
    name: String,
    /// Pool configuration
    config: ConnectionConfig,
    driver: Arc<dyn DatabaseDriver>,
    /// Available connections
    available: Arc<Mutex<VecDeque<PooledConnection>>>,
    /// Total number of open connections, checked out or idle
    total_connections: Arc<AtomicUsize>,
    next_id: AtomicU64,
}

/// A connection from the pool
struct PooledConnection {
    id: u64,
    connection: Box<dyn DriverConnection>,
    created_at: Instant,
    last_used: Instant,
}

impl PooledConnection {
    fn new(id: u64, connection: Box<dyn DriverConnection>) -> Self {
        let now = Instant::now();
        Self {
            id,
            connection,
            created_at: now,
            last_used: now,
        }
    }

    fn is_expired(&self, max_lifetime: Option<Duration>) -> bool {
        if let Some(lifetime) = max_lifetime {
            self.created_at.elapsed() > lifetime
        } else {
            false
        }
    }

    fn is_idle_too_long(&self, idle_timeout: Option<Duration>) -> bool {
        if let Some(timeout) = idle_timeout {
            self.last_used.elapsed() > timeout
        } else {
            false
        }
    }

    fn is_stale(&self, config: &ConnectionConfig) -> bool {
        self.is_expired(config.max_lifetime_duration())
            || self.is_idle_too_long(config.idle_timeout_duration())
    }

    fn refresh_last_used(&mut self) {
        self.last_used = Instant::now();
    }
}

impl ConnectionPool {
    /// Create a pool bound to one configuration, opening `min_connections` eagerly
    pub async fn new(
        name: &str,
        config: ConnectionConfig,
        driver: Arc<dyn DatabaseDriver>,
    ) -> Result<Self> {
        config.validate()?;

        let pool = Self {
            name: name.to_string(),
            config,
            driver,
            available: Arc::new(Mutex::new(VecDeque::new())),
            total_connections: Arc::new(AtomicUsize::new(0)),
            next_id: AtomicU64::new(1),
        };

        // Pre-create minimum connections
        pool.ensure_min_connections().await?;

        Ok(pool)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn adapter_name(&self) -> &str {
        self.driver.adapter_name()
    }

    /// Get a connection from the pool
    pub async fn get_connection(&self) -> Result<PoolGuard> {
        let start = Instant::now();

        loop {
            // Try to get an available connection
            if let Some(mut pooled) = self.try_get_available().await {
                pooled.refresh_last_used();
                return Ok(self.guard(pooled));
            }

            // Try to create a new connection if under limit
            if let Some(pooled) = self.try_create_connection().await? {
                return Ok(self.guard(pooled));
            }

            // Check timeout
            if start.elapsed() > self.config.connect_timeout_duration() {
                return Err(FabricError::PoolTimeout(self.name.clone()));
            }

            // Wait a bit before retrying
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn guard(&self, pooled: PooledConnection) -> PoolGuard {
        PoolGuard {
            connection: Some(pooled),
            in_transaction: false,
            pool_name: self.name.clone(),
            pool: self.available.clone(),
            total_connections: self.total_connections.clone(),
        }
    }

    /// Pop the first usable idle connection, discarding stale ones on the way
    async fn try_get_available(&self) -> Option<PooledConnection> {
        let stale = {
            let mut available = self.available.lock().await;
            let mut stale = Vec::new();
            while let Some(pooled) = available.pop_front() {
                if pooled.is_stale(&self.config) {
                    stale.push(pooled);
                } else {
                    available.push_front(pooled);
                    break;
                }
            }
            stale
        };

        self.close_all(stale).await;

        self.available.lock().await.pop_front()
    }

    /// Try to create a new connection if under limit
    async fn try_create_connection(&self) -> Result<Option<PooledConnection>> {
        // Reserve a slot first so concurrent callers can't overshoot the limit
        let max = self.config.pool;
        let reserved = self
            .total_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |total| {
                (total < max).then_some(total + 1)
            })
            .is_ok();

        if !reserved {
            return Ok(None);
        }

        match self.driver.connect(&self.config).await {
            Ok(connection) => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                debug!("Opened connection #{} for '{}'", id, self.name);
                Ok(Some(PooledConnection::new(id, connection)))
            }
            Err(e) => {
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Ensure minimum number of connections
    async fn ensure_min_connections(&self) -> Result<()> {
        while self.total_connections.load(Ordering::SeqCst) < self.config.min_connections {
            match self.try_create_connection().await? {
                Some(pooled) => self.available.lock().await.push_back(pooled),
                None => break,
            }
        }

        Ok(())
    }

    async fn close_all(&self, connections: Vec<PooledConnection>) -> usize {
        let count = connections.len();
        for mut pooled in connections {
            if let Err(e) = pooled.connection.disconnect().await {
                warn!("Failed to disconnect connection #{} of '{}': {}", pooled.id, self.name, e);
            }
        }
        if count > 0 {
            self.total_connections.fetch_sub(count, Ordering::SeqCst);
        }
        count
    }

    async fn drain_where(&self, mut remove: impl FnMut(usize, &PooledConnection) -> bool) -> usize {
        let removed = {
            let mut available = self.available.lock().await;
            let mut kept = VecDeque::with_capacity(available.len());
            let mut removed = Vec::new();
            for (index, pooled) in available.drain(..).enumerate() {
                if remove(index, &pooled) {
                    removed.push(pooled);
                } else {
                    kept.push_back(pooled);
                }
            }
            *available = kept;
            removed
        };

        self.close_all(removed).await
    }

    /// Close every idle connection; checked-out connections are unaffected
    pub async fn disconnect(&self) -> usize {
        self.drain_where(|_, _| true).await
    }

    /// Close idle connections beyond `min_connections`
    pub async fn release_connections(&self) -> usize {
        let keep = self.config.min_connections;
        self.drain_where(|index, _| index >= keep).await
    }

    /// Close idle connections past their lifetime or idle timeout
    pub async fn clear_stale_connections(&self) -> usize {
        let config = self.config.clone();
        self.drain_where(move |_, pooled| pooled.is_stale(&config)).await
    }

    /// Ping every idle connection and close the ones that fail
    pub async fn verify_active_connections(&self) -> usize {
        let idle: Vec<PooledConnection> = self.available.lock().await.drain(..).collect();

        let mut healthy = Vec::with_capacity(idle.len());
        let mut broken = Vec::new();
        for mut pooled in idle {
            match pooled.connection.ping().await {
                Ok(()) => healthy.push(pooled),
                Err(e) => {
                    debug!("Connection #{} of '{}' failed verification: {}", pooled.id, self.name, e);
                    broken.push(pooled);
                }
            }
        }

        self.available.lock().await.extend(healthy);
        self.close_all(broken).await
    }

    /// Get pool statistics
    pub async fn stats(&self) -> PoolStats {
        let available = self.available.lock().await;
        let total = self.total_connections.load(Ordering::SeqCst);

        PoolStats {
            total_connections: total,
            available_connections: available.len(),
            active_connections: total.saturating_sub(available.len()),
            max_connections: self.config.pool,
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.name)
            .field("adapter", &self.config.adapter)
            .field("total_connections", &self.total_connections.load(Ordering::SeqCst))
            .finish()
    }
}

/// Connection pool statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// Returns the connection to the pool when dropped
pub struct PoolGuard {
    connection: Option<PooledConnection>,
    in_transaction: bool,
    pool_name: String,
    pool: Arc<Mutex<VecDeque<PooledConnection>>>,
    total_connections: Arc<AtomicUsize>,
}

impl PoolGuard {
    fn pooled(&mut self) -> Result<&mut PooledConnection> {
        self.connection.as_mut().ok_or(FabricError::ConnectionClosed)
    }

    /// Connection ID, unique within its pool
    pub fn id(&self) -> Option<u64> {
        self.connection.as_ref().map(|c| c.id)
    }

    /// Name of the pool this connection was checked out from
    pub fn pool_name(&self) -> &str {
        &self.pool_name
    }

    pub fn adapter_name(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.connection.adapter_name())
    }

    pub fn is_in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub async fn execute(&mut self, sql: &str) -> Result<QueryResult> {
        self.pooled()?.connection.execute(sql).await
    }

    pub async fn call(&mut self, method: &str, args: &[Value]) -> Result<QueryResult> {
        self.pooled()?.connection.call(method, args).await
    }

    pub async fn begin(&mut self) -> Result<()> {
        self.pooled()?.connection.begin().await?;
        self.in_transaction = true;
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<()> {
        self.pooled()?.connection.commit().await?;
        self.in_transaction = false;
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<()> {
        self.pooled()?.connection.rollback().await?;
        self.in_transaction = false;
        Ok(())
    }

    /// Explicitly close the guard and return the connection to the pool.
    ///
    /// This method allows for async cleanup (rollback) which is not possible in Drop.
    pub async fn close(mut self) -> Result<()> {
        if self.in_transaction {
            self.rollback().await?;
        }

        if let Some(mut pooled) = self.connection.take() {
            pooled.refresh_last_used();
            self.pool.lock().await.push_back(pooled);
        }
        Ok(())
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        if let Some(mut pooled) = self.connection.take() {
            // close() was not called; return it only if that is safe without awaiting
            if self.in_transaction {
                warn!(
                    "PoolGuard for '{}' dropped with active transaction; discarding connection #{}. Use close().await.",
                    self.pool_name, pooled.id
                );
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
                return;
            }

            pooled.refresh_last_used();
            if let Ok(mut pool) = self.pool.try_lock() {
                pool.push_back(pooled);
            } else {
                warn!(
                    "PoolGuard for '{}' dropped while pool lock busy; discarding connection #{}.",
                    self.pool_name, pooled.id
                );
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}
