use crate::connection::pool::ConnectionPool;
use crate::core::Value;
use async_trait::async_trait;
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use std::sync::{Arc, Mutex};
use std::time::Duration;

lazy_static! {
    static ref MYSQL_FAMILY: Regex = Regex::new("(?i)mysql").expect("valid adapter pattern");
}

/// Replication status statement of MySQL-family engines
pub const REPLICA_STATUS_SQL: &str = "SHOW SLAVE STATUS";

/// Column of the replication status row holding the lag in seconds
pub const SECONDS_BEHIND_COLUMN: &str = "Seconds_Behind_Master";

/// Source of replica lag measurements
///
/// Implementations never fail: anything that prevents a measurement is
/// reported as zero lag.
#[async_trait]
pub trait LagChecker: Send + Sync {
    async fn seconds_behind(&self) -> u64;

    async fn behind(&self, threshold: Duration) -> bool {
        Duration::from_secs(self.seconds_behind().await) > threshold
    }

    /// Bind the replica pool to measure, replacing any earlier binding
    fn attach(&self, _pool: Arc<ConnectionPool>) {}

    /// Drop the bound pool; measurements report zero lag until reattached
    fn detach(&self) {}
}

/// Measures lag by querying the replica's replication status
///
/// The bound pool is whatever the pool registry currently holds for the
/// replica name; it is released when the registry is torn down.
///
/// Fails open: with no replica bound, a non-MySQL engine, or any failure
/// while querying, the replica is reported as 0 seconds behind. A broken
/// health check is therefore indistinguishable from a healthy replica, and
/// reads keep going to it.
#[derive(Debug)]
pub struct SqlReplicaLagChecker {
    name: String,
    pool: Mutex<Option<Arc<ConnectionPool>>>,
}

impl SqlReplicaLagChecker {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pool: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_attached(&self) -> bool {
        self.bound_pool().is_some()
    }

    fn bound_pool(&self) -> Option<Arc<ConnectionPool>> {
        self.pool
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn parse_lag(value: Option<&Value>) -> u64 {
        value
            .and_then(Value::as_i64)
            .and_then(|secs| u64::try_from(secs).ok())
            .unwrap_or(0)
    }
}

#[async_trait]
impl LagChecker for SqlReplicaLagChecker {
    async fn seconds_behind(&self) -> u64 {
        let Some(pool) = self.bound_pool() else {
            return 0;
        };

        if !MYSQL_FAMILY.is_match(pool.adapter_name()) {
            return 0;
        }

        let mut conn = match pool.get_connection().await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Replica lag check for '{}' could not connect: {}", self.name, e);
                return 0;
            }
        };

        match conn.execute(REPLICA_STATUS_SQL).await {
            Ok(result) => {
                let lag = Self::parse_lag(result.last_value(SECONDS_BEHIND_COLUMN));
                debug!("Replica '{}' is {}s behind", self.name, lag);
                lag
            }
            Err(e) => {
                warn!("Replica lag check for '{}' failed: {}", self.name, e);
                0
            }
        }
    }

    fn attach(&self, pool: Arc<ConnectionPool>) {
        let mut bound = self
            .pool
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !bound.as_ref().is_some_and(|current| Arc::ptr_eq(current, &pool)) {
            debug!("Replica lag checker '{}' bound to pool '{}'", self.name, pool.name());
            *bound = Some(pool);
        }
    }

    fn detach(&self) {
        let mut bound = self
            .pool
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if bound.take().is_some() {
            debug!("Replica lag checker '{}' released its pool", self.name);
        }
    }
}

/// Checker reporting a fixed lag, for setups without a measurable replica
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedLag(pub u64);

#[async_trait]
impl LagChecker for FixedLag {
    async fn seconds_behind(&self) -> u64 {
        self.0
    }
}
