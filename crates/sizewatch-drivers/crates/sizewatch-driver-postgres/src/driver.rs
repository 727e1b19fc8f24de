//! PostgreSQL driver implementation

use async_trait::async_trait;
use sizewatch_core::{ConnectionConfig, DatabaseDriver, Result, SessionSource, SizewatchError};
use std::sync::Arc;

use crate::PostgresSource;

/// PostgreSQL database driver
pub struct PostgresDriver;

impl PostgresDriver {
    /// Create a new PostgreSQL driver instance
    pub fn new() -> Self {
        tracing::debug!("PostgreSQL driver initialized");
        Self
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn display_name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn default_port(&self) -> Option<u16> {
        Some(5432)
    }

    /// Build the source and prove it can reach the server with one
    /// short-lived session
    #[tracing::instrument(skip(self, config), fields(host = config.get_string("host").as_deref(), database = config.get_string("database").as_deref()))]
    async fn open(&self, config: &ConnectionConfig) -> Result<Arc<dyn SessionSource>> {
        let source = PostgresSource::from_config(config)?;

        let probe = source.copy_session().await.map_err(|e| {
            tracing::error!(error = %e, "failed to connect to PostgreSQL database");
            SizewatchError::Connection(format!("Failed to connect to PostgreSQL database: {}", e))
        })?;
        let probed = probe.query("SELECT 1", &[]).await;
        probe.close().await?;
        probed?;

        tracing::info!(source = ?source, "PostgreSQL session source opened");
        Ok(Arc::new(source))
    }
}
