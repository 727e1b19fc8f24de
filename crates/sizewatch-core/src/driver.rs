//! Database driver trait and connection configuration

use crate::{Result, SessionSource};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// A database driver able to open session sources
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Registry key (e.g., "postgres", "mongodb")
    fn name(&self) -> &'static str;

    /// Human-readable name
    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// Default port when the configuration leaves it at 0
    fn default_port(&self) -> Option<u16> {
        None
    }

    /// Open a session source for the configured database
    async fn open(&self, config: &ConnectionConfig) -> Result<Arc<dyn SessionSource>>;
}

/// Connection parameters for a monitored database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Driver ID (e.g., "postgres", "mongodb")
    pub driver: String,
    /// Host address
    #[serde(default)]
    pub host: String,
    /// Port number (0 for the driver default)
    #[serde(default)]
    pub port: u16,
    /// Database name
    #[serde(default)]
    pub database: Option<String>,
    /// Username
    #[serde(default)]
    pub username: Option<String>,
    /// Password
    #[serde(default)]
    pub password: Option<String>,
    /// Additional driver parameters (e.g. `ssl_mode`, `uri`)
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl ConnectionConfig {
    /// Create a new configuration with default values
    pub fn new(driver: &str) -> Self {
        Self {
            driver: driver.to_string(),
            host: String::new(),
            port: 0,
            database: None,
            username: None,
            password: None,
            params: HashMap::new(),
        }
    }

    /// Create a PostgreSQL configuration
    pub fn new_postgres(host: &str, port: u16, database: &str, username: &str) -> Self {
        let mut config = Self::new("postgres");
        config.host = host.to_string();
        config.port = port;
        config.database = Some(database.to_string());
        config.username = Some(username.to_string());
        config
    }

    /// Create a MongoDB configuration
    pub fn new_mongodb(host: &str, port: u16, database: &str) -> Self {
        let mut config = Self::new("mongodb");
        config.host = host.to_string();
        config.port = port;
        config.database = Some(database.to_string());
        config
    }

    /// Builder method: set the password
    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    /// Set a connection parameter
    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        let str_val = match value.into() {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        self.params.insert(key.to_string(), str_val);
        self
    }

    /// Get a string parameter, falling back to the well-known fields
    pub fn get_string(&self, key: &str) -> Option<String> {
        if let Some(val) = self.params.get(key) {
            return Some(val.clone());
        }
        match key {
            "host" if !self.host.is_empty() => Some(self.host.clone()),
            "database" => self.database.clone(),
            "username" | "user" => self.username.clone(),
            "password" => self.password.clone(),
            _ => None,
        }
    }

    /// Port, or `default` when unset
    pub fn port_or(&self, default: u16) -> u16 {
        if self.port > 0 { self.port } else { default }
    }
}
