use super::DatabaseDriver;
use crate::core::{FabricError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Drivers available to the process, keyed by adapter name
#[derive(Default, Clone)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DatabaseDriver>>,
}

impl DriverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a driver under its adapter name, replacing any previous one
    pub fn register(&mut self, driver: Arc<dyn DatabaseDriver>) {
        let adapter = driver.adapter_name().to_string();
        log::debug!("Registered database driver for adapter '{}'", adapter);
        self.drivers.insert(adapter, driver);
    }

    /// Register the same driver under an additional adapter name
    pub fn alias(&mut self, adapter: &str, driver: Arc<dyn DatabaseDriver>) {
        self.drivers.insert(adapter.to_string(), driver);
    }

    pub fn load(&self, adapter: &str) -> Result<Arc<dyn DatabaseDriver>> {
        self.drivers
            .get(adapter)
            .cloned()
            .ok_or_else(|| FabricError::AdapterNotLoaded {
                adapter: adapter.to_string(),
            })
    }

    pub fn adapters(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("adapters", &self.adapters())
            .finish()
    }
}
