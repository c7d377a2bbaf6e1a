pub mod error;
pub mod types;
pub mod value;

pub use error::{FabricError, Result};
pub use types::{FabricOptions, Role};
pub use value::Value;
