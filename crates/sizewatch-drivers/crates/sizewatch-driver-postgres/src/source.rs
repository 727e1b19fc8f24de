//! Session source that opens one backend connection per copy

use async_trait::async_trait;
use postgres_native_tls::MakeTlsConnector;
use sizewatch_core::{Connection, ConnectionConfig, Result, SessionSource, SizewatchError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::PostgresConnection;
use crate::tls::TlsSettings;

const DEFAULT_PORT: u16 = 5432;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_APPLICATION_NAME: &str = "sizewatch";

/// PostgreSQL session source
///
/// PostgreSQL sessions cannot be shared between concurrent callers, so each
/// `copy_session` opens a fresh connection from the stored settings.
/// Closing the source only stops it from handing out further copies.
pub struct PostgresSource {
    config: tokio_postgres::Config,
    tls_settings: TlsSettings,
    tls: Option<MakeTlsConnector>,
    closed: AtomicBool,
}

impl PostgresSource {
    /// Build a source from connection settings without connecting
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        let host = config
            .get_string("host")
            .unwrap_or_else(|| "localhost".to_string());
        let database = config
            .get_string("database")
            .unwrap_or_else(|| "postgres".to_string());
        let application_name = config
            .get_string("application_name")
            .unwrap_or_else(|| DEFAULT_APPLICATION_NAME.to_string());
        let connect_timeout = match config.get_string("connect_timeout") {
            Some(secs) => secs.trim().parse::<u64>().map_err(|_| {
                SizewatchError::Configuration(format!("invalid connect_timeout: {:?}", secs))
            })?,
            None => DEFAULT_CONNECT_TIMEOUT_SECS,
        };
        let tls_settings = TlsSettings::from_config(config)?;

        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&host)
            .port(config.port_or(DEFAULT_PORT))
            .dbname(&database)
            .application_name(&application_name)
            .connect_timeout(Duration::from_secs(connect_timeout))
            .ssl_mode(tls_settings.mode.to_client_mode());

        if let Some(user) = config.get_string("user") {
            pg_config.user(&user);
        }
        if let Some(password) = config.get_string("password") {
            pg_config.password(password);
        }

        let tls = tls_settings.build_connector()?;
        Ok(Self {
            config: pg_config,
            tls_settings,
            tls,
            closed: AtomicBool::new(false),
        })
    }

    /// Client configuration used for every copy
    pub fn pg_config(&self) -> &tokio_postgres::Config {
        &self.config
    }

    pub fn tls_settings(&self) -> &TlsSettings {
        &self.tls_settings
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for PostgresSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresSource")
            .field("hosts", &self.config.get_hosts())
            .field("dbname", &self.config.get_dbname())
            .field("ssl_mode", &self.tls_settings.mode)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl SessionSource for PostgresSource {
    fn driver_name(&self) -> &str {
        "postgresql"
    }

    async fn copy_session(&self) -> Result<Arc<dyn Connection>> {
        if self.is_closed() {
            return Err(SizewatchError::Connection(
                "PostgreSQL session source is closed".into(),
            ));
        }
        let conn = PostgresConnection::connect(&self.config, self.tls.clone()).await?;
        Ok(Arc::new(conn))
    }

    async fn duplicate(&self) -> Result<Arc<dyn SessionSource>> {
        if self.is_closed() {
            return Err(SizewatchError::Connection(
                "PostgreSQL session source is closed".into(),
            ));
        }
        Ok(Arc::new(Self {
            config: self.config.clone(),
            tls_settings: self.tls_settings.clone(),
            tls: self.tls.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            tracing::info!(dbname = ?self.config.get_dbname(), "PostgreSQL session source closed");
        }
        Ok(())
    }
}
