pub mod proxy;
pub mod resolver;

pub use proxy::RoutingProxy;
pub use resolver::{ConnectionNameResolver, SEPARATOR};
