pub mod adapters;
pub mod config;
pub mod pool;
pub mod registry;

use crate::core::{FabricError, Result, Value};
use crate::result::QueryResult;
use async_trait::async_trait;
use config::ConnectionConfig;

/// Live connection produced by a driver
///
/// The capability surface the router forwards to. Drivers own the wire
/// protocol; every error they return is surfaced unchanged to the caller.
#[async_trait]
pub trait DriverConnection: Send {
    /// Adapter name as reported by the driver, e.g. "mysql2"
    fn adapter_name(&self) -> &str;

    /// Execute a SQL statement and return its rows
    async fn execute(&mut self, sql: &str) -> Result<QueryResult>;

    async fn begin(&mut self) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;

    /// Round-trip to the server, failing if the connection is unusable
    async fn ping(&mut self) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;

    /// Untyped escape hatch for driver-specific operations
    async fn call(&mut self, method: &str, _args: &[Value]) -> Result<QueryResult> {
        Err(FabricError::Unsupported(format!(
            "{} connection does not support '{}'",
            self.adapter_name(),
            method
        )))
    }
}

/// Connection factory for one database engine
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Adapter name configurations select this driver by
    fn adapter_name(&self) -> &str;

    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn DriverConnection>>;
}
