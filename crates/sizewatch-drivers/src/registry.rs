//! Driver registry for managing available database drivers

use std::collections::HashMap;
use std::sync::Arc;
use sizewatch_core::{ConnectionConfig, DatabaseDriver, Result, SessionSource, SizewatchError};

/// Registry of available database drivers
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DatabaseDriver>>,
}

/// Alternative spellings accepted in configuration files
fn canonical_name(name: &str) -> String {
    match name.to_lowercase().as_str() {
        "postgresql" | "pg" => "postgres".to_string(),
        "mongo" => "mongodb".to_string(),
        other => other.to_string(),
    }
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
        }
    }

    /// Create a registry with all built-in drivers registered
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "postgres")]
        registry.register(Arc::new(crate::postgres::PostgresDriver::new()));
        #[cfg(feature = "mongodb")]
        registry.register(Arc::new(crate::mongodb::MongoDbDriver::new()));

        registry
    }

    /// Register a new driver
    pub fn register(&mut self, driver: Arc<dyn DatabaseDriver>) {
        let name = driver.name().to_string();
        tracing::info!(driver = %name, "registering database driver");
        self.drivers.insert(name, driver);
    }

    /// Get a driver by name or alias
    pub fn get(&self, name: &str) -> Option<Arc<dyn DatabaseDriver>> {
        let driver = self.drivers.get(&canonical_name(name)).cloned();
        if driver.is_none() {
            tracing::warn!(driver = %name, "driver not found in registry");
        }
        driver
    }

    /// List all registered driver names, sorted
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Check if a driver is registered
    pub fn has(&self, name: &str) -> bool {
        self.drivers.contains_key(&canonical_name(name))
    }

    /// Open a session source with the driver named by `config.driver`
    pub async fn open(&self, config: &ConnectionConfig) -> Result<Arc<dyn SessionSource>> {
        let driver = self.get(&config.driver).ok_or_else(|| {
            SizewatchError::Configuration(format!(
                "unknown driver {:?} (available: {})",
                config.driver,
                self.list().join(", ")
            ))
        })?;
        driver.open(config).await
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
