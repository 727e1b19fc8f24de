//! Core test fixtures for running scenarios against real servers.
//!
//! Tests identify the server with [`TestDriver`] and get a [`TestDatabase`]
//! that owns an open session source. PostgreSQL tests share the container's
//! `postgres` database and create uniquely named tables; MongoDB tests get a
//! database of their own, so database-wide passes only see their own
//! collections.
//!
//! Set SIZEWATCH_TEST_MANUAL_CONTAINERS=1 to use servers that are already
//! running instead of testcontainers:
//!
//! - PostgreSQL on 127.0.0.1:5433 (postgres/postgres)
//! - MongoDB on 127.0.0.1:27018 (no auth)
//!
//! ```rust,ignore
//! use sizewatch_driver_tests::fixtures::{TestDatabase, TestDriver};
//!
//! let db = TestDatabase::open(TestDriver::Postgres).await?;
//! db.execute("CREATE TABLE t (n INT)").await?;
//! let handle = db.handle().await?;
//! ```

use anyhow::{Context, Result};
use sizewatch_core::{Connection, ConnectionConfig, SessionSource};
use sizewatch_drivers::DriverRegistry;
use sizewatch_monitor::ResourceHandle;
use std::env;
use std::sync::{Arc, Once};
use std::time::Duration;

use crate::test_containers::{ContainerInfo, mongo_container, postgres_container};

static TRACING: Once = Once::new();

/// Test driver identifier for parameterized testing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestDriver {
    /// PostgreSQL, row counts and relation sizes
    Postgres,
    /// MongoDB, collection stats
    MongoDb,
}

impl TestDriver {
    /// Driver name reported by sessions of this driver
    pub fn name(&self) -> &'static str {
        match self {
            TestDriver::Postgres => "postgresql",
            TestDriver::MongoDb => "mongodb",
        }
    }

    /// Get the display name
    pub fn display_name(&self) -> &'static str {
        match self {
            TestDriver::Postgres => "PostgreSQL",
            TestDriver::MongoDb => "MongoDB",
        }
    }

    /// Check if this driver supports SQL statements
    pub fn is_sql_driver(&self) -> bool {
        matches!(self, TestDriver::Postgres)
    }
}

/// Install a test subscriber once per process; RUST_LOG controls the level
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Check if tests should use manually managed servers instead of testcontainers
fn use_manual_containers() -> bool {
    env::var("SIZEWATCH_TEST_MANUAL_CONTAINERS")
        .ok()
        .and_then(|v| v.parse::<u8>().ok())
        .map(|v| v != 0)
        .unwrap_or(false)
}

async fn container_info(driver: TestDriver) -> Result<ContainerInfo> {
    if use_manual_containers() {
        return Ok(match driver {
            TestDriver::Postgres => ContainerInfo {
                host: "127.0.0.1".to_string(),
                port: 5433,
                database: Some("postgres".to_string()),
                username: Some("postgres".to_string()),
                password: Some("postgres".to_string()),
            },
            TestDriver::MongoDb => ContainerInfo {
                host: "127.0.0.1".to_string(),
                port: 27018,
                database: None,
                username: None,
                password: None,
            },
        });
    }

    match driver {
        TestDriver::Postgres => postgres_container().await,
        TestDriver::MongoDb => mongo_container().await,
    }
}

/// A unique, lowercase identifier safe for table, collection and database names
pub fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..12])
}

/// Connection configuration for `driver`
pub async fn connection_config(driver: TestDriver) -> Result<ConnectionConfig> {
    let info = container_info(driver).await?;

    let mut config = match driver {
        TestDriver::Postgres => ConnectionConfig::new_postgres(
            &info.host,
            info.port,
            info.database.as_deref().unwrap_or("postgres"),
            info.username.as_deref().unwrap_or("postgres"),
        )
        .with_param("ssl_mode", "disable"),
        TestDriver::MongoDb => {
            ConnectionConfig::new_mongodb(&info.host, info.port, &unique_name("sizewatch"))
        }
    };
    config.password = info.password;
    Ok(config)
}

/// Open a session source, retrying while the server finishes starting up
async fn open_with_retry(config: &ConnectionConfig, max_attempts: u32) -> Result<Arc<dyn SessionSource>> {
    let registry = DriverRegistry::with_defaults();
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match registry.open(config).await {
            Ok(source) => return Ok(source),
            Err(e) => {
                if attempt < max_attempts {
                    let delay = Duration::from_millis(250 * 2u64.pow(attempt.min(4)));
                    tracing::warn!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "connection failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(e);
            }
        }
    }

    Err(anyhow::anyhow!(
        "failed to open {} after {} attempts: {}",
        config.driver,
        max_attempts,
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

/// An open test database
pub struct TestDatabase {
    /// Which server this is
    pub driver: TestDriver,
    /// Configuration the source was opened with
    pub config: ConnectionConfig,
    /// Source owned by the test; handles are made from duplicates of it
    pub source: Arc<dyn SessionSource>,
}

impl TestDatabase {
    /// Open a fresh source against `driver`'s server
    pub async fn open(driver: TestDriver) -> Result<Self> {
        init_tracing();

        let config = connection_config(driver).await?;
        let source = open_with_retry(&config, 8)
            .await
            .with_context(|| format!("failed to open {} test database", driver.display_name()))?;

        Ok(Self {
            driver,
            config,
            source,
        })
    }

    /// Name of the database the sessions are bound to
    pub fn database(&self) -> &str {
        self.config.database.as_deref().unwrap_or_default()
    }

    /// A new session owned by the caller
    pub async fn connection(&self) -> Result<Arc<dyn Connection>> {
        self.source
            .copy_session()
            .await
            .context("failed to copy test session")
    }

    /// A resource handle over a duplicate of the test source
    pub async fn handle(&self) -> Result<Arc<ResourceHandle>> {
        let handle = ResourceHandle::dedicated(self.source.as_ref())
            .await
            .context("failed to create resource handle")?;
        Ok(Arc::new(handle))
    }

    /// Run a statement (SQL or a JSON command document) on a throwaway session
    pub async fn execute(&self, statement: &str) -> Result<u64> {
        let conn = self.connection().await?;
        let result = conn
            .execute(statement, &[])
            .await
            .with_context(|| format!("failed to execute: {}", statement));
        conn.close().await?;
        Ok(result?.affected_rows)
    }

    /// Drop whatever the test created and close the source
    pub async fn teardown(self, statements: &[&str]) -> Result<()> {
        for statement in statements {
            if let Err(e) = self.execute(statement).await {
                tracing::warn!(statement = %statement, error = %e, "cleanup failed");
            }
        }
        self.source.close().await?;
        Ok(())
    }
}
