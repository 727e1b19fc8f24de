//! MongoDB driver implementation

use async_trait::async_trait;
use bson::doc;
use mongodb::{Client, options::ClientOptions};
use sizewatch_core::{ConnectionConfig, DatabaseDriver, Result, SessionSource, SizewatchError};
use std::sync::Arc;

use crate::MongoSource;

const DEFAULT_PORT: u16 = 27017;
const DEFAULT_DATABASE: &str = "admin";

/// MongoDB database driver
pub struct MongoDbDriver;

impl MongoDbDriver {
    /// Create a new MongoDB driver instance
    pub fn new() -> Self {
        tracing::debug!("MongoDB driver initialized");
        Self
    }

    /// Connection string for `config`
    ///
    /// An explicit `uri` parameter wins over the individual fields.
    pub fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        if let Some(uri) = config.get_string("uri").filter(|u| !u.trim().is_empty()) {
            return uri;
        }

        let host = config
            .get_string("host")
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "localhost".to_string());
        let port = config.port_or(DEFAULT_PORT);
        let database = database_name(config);
        let username = config.username.clone().filter(|s| !s.is_empty());
        let password = config.password.clone().filter(|s| !s.is_empty());

        let auth_source = config
            .get_string("authSource")
            .unwrap_or_else(|| "admin".to_string());
        let replica_set = config.get_string("replicaSet");
        let use_tls = config
            .get_string("tls")
            .or_else(|| config.get_string("ssl"))
            .map(|s| s == "true" || s == "1")
            .unwrap_or(false);

        let mut conn_str = String::from("mongodb://");

        if let (Some(user), Some(pass)) = (&username, &password) {
            conn_str.push_str(&urlencoding::encode(user));
            conn_str.push(':');
            conn_str.push_str(&urlencoding::encode(pass));
            conn_str.push('@');
        }

        conn_str.push_str(&format!("{}:{}/{}", host, port, database));

        let mut options = Vec::new();
        if username.is_some() {
            options.push(format!("authSource={}", auth_source));
        }
        if let Some(rs) = replica_set {
            options.push(format!("replicaSet={}", rs));
        }
        if use_tls {
            options.push("tls=true".to_string());
        }
        if let Some(app_name) = config.get_string("appName") {
            options.push(format!("appName={}", urlencoding::encode(&app_name)));
        }

        if !options.is_empty() {
            conn_str.push('?');
            conn_str.push_str(&options.join("&"));
        }

        conn_str
    }
}

impl Default for MongoDbDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Database the sessions are bound to; the configured `database` field
/// wins, then the path of `uri`, then `admin`
pub(crate) fn database_name(config: &ConnectionConfig) -> String {
    if let Some(database) = config.database.clone().filter(|d| !d.is_empty()) {
        return database;
    }
    config
        .get_string("uri")
        .and_then(|uri| database_from_uri(&uri))
        .unwrap_or_else(|| DEFAULT_DATABASE.to_string())
}

fn database_from_uri(uri: &str) -> Option<String> {
    let rest = uri.split_once("://")?.1;
    let path = rest.split_once('/')?.1;
    let database = path.split('?').next().unwrap_or_default();
    (!database.is_empty()).then(|| database.to_string())
}

/// URL encoding helper for credentials in connection strings
pub(crate) mod urlencoding {
    pub fn encode(s: &str) -> String {
        let mut result = String::with_capacity(s.len() * 3);
        for c in s.chars() {
            match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' | '~' => result.push(c),
                _ => {
                    for b in c.to_string().as_bytes() {
                        result.push_str(&format!("%{:02X}", b));
                    }
                }
            }
        }
        result
    }
}

#[async_trait]
impl DatabaseDriver for MongoDbDriver {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    fn display_name(&self) -> &'static str {
        "MongoDB"
    }

    fn default_port(&self) -> Option<u16> {
        Some(DEFAULT_PORT)
    }

    #[tracing::instrument(skip(self, config), fields(host = config.get_string("host").as_deref()))]
    async fn open(&self, config: &ConnectionConfig) -> Result<Arc<dyn SessionSource>> {
        tracing::debug!("connecting to MongoDB");

        let connection_string = self.build_connection_string(config);
        let client_options = ClientOptions::parse(&connection_string)
            .await
            .map_err(|e| {
                SizewatchError::Configuration(format!("Failed to parse MongoDB options: {}", e))
            })?;
        let client = Client::with_options(client_options).map_err(|e| {
            SizewatchError::Driver(format!("Failed to create MongoDB client: {}", e))
        })?;

        let database = database_name(config);
        client
            .database(&database)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to connect to MongoDB");
                SizewatchError::Connection(format!("Failed to connect to MongoDB: {}", e))
            })?;

        tracing::info!(database = %database, "MongoDB session source opened");
        Ok(Arc::new(MongoSource::new(client, database)))
    }
}
