//! Docker container management for integration tests.
//!
//! Containers are started lazily the first time a test asks for one and are
//! cached for the rest of the test process. Every test works in its own
//! table or database, so sharing a server between tests is safe.
//!
//! ```rust,ignore
//! use crate::test_containers::postgres_container;
//!
//! let info = postgres_container().await?;
//! // Connect to info.host:info.port...
//! ```

use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::{mongo::Mongo, postgres::Postgres};

/// Information about a running test container
#[derive(Debug, Clone)]
pub struct ContainerInfo {
    /// Host address (typically 127.0.0.1)
    pub host: String,
    /// Port number (randomly assigned by testcontainers)
    pub port: u16,
    /// Database name
    pub database: Option<String>,
    /// Username for authentication
    pub username: Option<String>,
    /// Password for authentication
    pub password: Option<String>,
}

struct PostgresContainer {
    #[allow(dead_code)]
    inner: ContainerAsync<Postgres>,
    info: ContainerInfo,
}

struct MongoContainer {
    #[allow(dead_code)]
    inner: ContainerAsync<Mongo>,
    info: ContainerInfo,
}

static POSTGRES_CONTAINER: Lazy<Arc<Mutex<Option<PostgresContainer>>>> =
    Lazy::new(|| Arc::new(Mutex::new(None)));

static MONGO_CONTAINER: Lazy<Arc<Mutex<Option<MongoContainer>>>> =
    Lazy::new(|| Arc::new(Mutex::new(None)));

/// Get or start the shared PostgreSQL container
pub async fn postgres_container() -> anyhow::Result<ContainerInfo> {
    {
        let guard = POSTGRES_CONTAINER
            .lock()
            .map_err(|e| anyhow::anyhow!("failed to lock postgres container: {}", e))?;

        if let Some(ref container) = *guard {
            return Ok(container.info.clone());
        }
    }

    tracing::info!("starting PostgreSQL test container");

    let container = Postgres::default()
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start postgres container: {}", e))?;

    let host_port = container
        .get_host_port_ipv4(5432)
        .await
        .map_err(|e| anyhow::anyhow!("failed to get postgres port: {}", e))?;

    // testcontainers-modules Postgres defaults: postgres user/password with "postgres" database
    let info = ContainerInfo {
        host: "127.0.0.1".to_string(),
        port: host_port,
        database: Some("postgres".to_string()),
        username: Some("postgres".to_string()),
        password: Some("postgres".to_string()),
    };

    tracing::info!(port = host_port, "PostgreSQL test container started");

    let mut guard = POSTGRES_CONTAINER
        .lock()
        .map_err(|e| anyhow::anyhow!("failed to lock postgres container: {}", e))?;

    // Another test may have won the race; keep the first container
    if let Some(ref existing) = *guard {
        return Ok(existing.info.clone());
    }
    *guard = Some(PostgresContainer {
        inner: container,
        info: info.clone(),
    });

    Ok(info)
}

/// Get or start the shared MongoDB container
pub async fn mongo_container() -> anyhow::Result<ContainerInfo> {
    {
        let guard = MONGO_CONTAINER
            .lock()
            .map_err(|e| anyhow::anyhow!("failed to lock mongo container: {}", e))?;

        if let Some(ref container) = *guard {
            return Ok(container.info.clone());
        }
    }

    tracing::info!("starting MongoDB test container");

    let container = Mongo::default()
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start mongo container: {}", e))?;

    let host_port = container
        .get_host_port_ipv4(27017)
        .await
        .map_err(|e| anyhow::anyhow!("failed to get mongo port: {}", e))?;

    // No authentication; each test picks its own database
    let info = ContainerInfo {
        host: "127.0.0.1".to_string(),
        port: host_port,
        database: None,
        username: None,
        password: None,
    };

    tracing::info!(port = host_port, "MongoDB test container started");

    let mut guard = MONGO_CONTAINER
        .lock()
        .map_err(|e| anyhow::anyhow!("failed to lock mongo container: {}", e))?;

    if let Some(ref existing) = *guard {
        return Ok(existing.info.clone());
    }
    *guard = Some(MongoContainer {
        inner: container,
        info: info.clone(),
    });

    Ok(info)
}
