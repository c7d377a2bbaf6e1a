use thiserror::Error;

#[derive(Error, Debug)]
pub enum FabricError {
    #[error("No active shard for {group}")]
    NotActive { group: String },

    #[error("Unknown database config: {name}, have [{}]", known.join(", "))]
    UnknownConfiguration { name: String, known: Vec<String> },

    #[error(
        "Please install the {adapter} adapter: no driver is registered for '{adapter}', \
         add one with DataFabricBuilder::driver before routing to it"
    )]
    AdapterNotLoaded { adapter: String },

    #[error("Bad DB configuration {0}: no replica health status is registered for it")]
    UnknownReplicaGroup(String),

    #[error("Invalid data_fabric options: {0}")]
    InvalidOptions(String),

    #[error("Invalid connection config: {0}")]
    InvalidConfig(String),

    #[error("Connection pool timeout: no connections available for '{0}'")]
    PoolTimeout(String),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("{0}")]
    Driver(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, FabricError>;

impl<T> From<std::sync::PoisonError<T>> for FabricError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<std::io::Error> for FabricError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
