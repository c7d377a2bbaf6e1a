// ============================================================================
// ShardFabric Library
// ============================================================================

//! Shard- and replica-aware connection routing.
//!
//! Models opt into routing with [`DataFabric::data_fabric`]. Each call picks
//! a named connection configuration from the active shard of the model's
//! shard group and from its role: writes always go to master, reads go to the
//! replica unless a `with_master` scope or the replica lag monitor says
//! otherwise.
//!
//! Configuration names follow `{prefix}_{group}_{shard}_{environment}_{role}`
//! with unused segments left out:
//!
//! ```
//! use shardfabric::{ConnectionConfig, DataFabric, DatabaseConfigurations, FabricOptions};
//!
//! # tokio_test::block_on(async {
//! let configs = DatabaseConfigurations::new()
//!     .with("fiveruns_city_dallas_production_master", ConnectionConfig::new("mysql2", "dallas"))
//!     .with("fiveruns_city_dallas_production_slave", ConnectionConfig::new("mysql2", "dallas_ro"));
//!
//! let fabric = DataFabric::builder("production").configurations(configs).build()?;
//! let enchilada = fabric.data_fabric(
//!     "TheWholeEnchilada",
//!     FabricOptions::new().prefix("fiveruns").replicated().shard_by("city"),
//! )?;
//!
//! let mut ctx = fabric.new_context();
//! ctx.activate_shard([("city", "dallas")]);
//! assert_eq!(
//!     enchilada.connection_name(&ctx).await?,
//!     "fiveruns_city_dallas_production_slave"
//! );
//! # Ok::<(), shardfabric::FabricError>(())
//! # }).unwrap();
//! ```

pub mod core;
pub mod result;
pub mod connection;
pub mod context;
pub mod routing;
pub mod health;
pub mod fabric;

// Re-export main types for convenience
pub use crate::core::{FabricError, FabricOptions, Result, Role, Value};
pub use result::QueryResult;

// Re-export connection API
pub use connection::{
    DatabaseDriver, DriverConnection,
    adapters::DriverRegistry,
    config::{ConfigProvider, ConnectionConfig, DatabaseConfigurations},
    pool::{ConnectionPool, PoolGuard, PoolStats},
    registry::PoolRegistry,
};

pub use context::{RoleScope, RoutingContext, ShardContext, ShardScope};
pub use fabric::{DataFabric, DataFabricBuilder};
pub use health::{
    FixedLag, HealthRegistry, LagChecker, Poller, ReplicaHealthStatus, SqlReplicaLagChecker,
};
pub use routing::{ConnectionNameResolver, RoutingProxy};

/// Boxed future returned by scoped-operation callbacks
pub use futures::future::BoxFuture;
