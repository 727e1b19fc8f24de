//! PostgreSQL TLS support
//!
//! Builds the `MakeTlsConnector` handed to tokio-postgres from the `ssl_*`
//! connection parameters. Every session copy reuses the same connector.

use native_tls::{Certificate, Identity, TlsConnector as NativeTlsConnector, TlsConnectorBuilder};
use postgres_native_tls::MakeTlsConnector;
use sizewatch_core::{ConnectionConfig, SizewatchError};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Error types for TLS operations
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    /// Failed to load CA certificate
    #[error("Failed to load CA certificate from {path}: {source}")]
    CaCertLoadFailed {
        path: String,
        source: std::io::Error,
    },

    /// Invalid CA certificate format
    #[error("Invalid CA certificate format: {0}")]
    InvalidCaCert(String),

    /// Failed to load client certificate or key
    #[error("Failed to load client identity from {path}: {source}")]
    ClientIdentityLoadFailed {
        path: String,
        source: std::io::Error,
    },

    /// Invalid client identity format
    #[error("Invalid client identity (cert + key): {0}")]
    InvalidClientIdentity(String),

    #[error("Unknown ssl_mode: {0}")]
    UnknownMode(String),

    /// TLS configuration error
    #[error("TLS configuration error: {0}")]
    ConfigurationError(String),
}

impl From<TlsError> for SizewatchError {
    fn from(error: TlsError) -> Self {
        match error {
            TlsError::UnknownMode(_) => SizewatchError::Configuration(error.to_string()),
            other => SizewatchError::Connection(other.to_string()),
        }
    }
}

/// `sslmode` values understood by libpq
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    Disable,
    Allow,
    #[default]
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn parse(mode: &str) -> Result<Self, TlsError> {
        match mode.to_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "allow" => Ok(SslMode::Allow),
            "prefer" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" | "verify_ca" => Ok(SslMode::VerifyCa),
            "verify-full" | "verify_full" => Ok(SslMode::VerifyFull),
            other => Err(TlsError::UnknownMode(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SslMode::Disable => "disable",
            SslMode::Allow => "allow",
            SslMode::Prefer => "prefer",
            SslMode::Require => "require",
            SslMode::VerifyCa => "verify-ca",
            SslMode::VerifyFull => "verify-full",
        }
    }

    /// tokio-postgres only distinguishes disable/prefer/require; certificate
    /// checks are configured on the connector instead
    pub fn to_client_mode(self) -> tokio_postgres::config::SslMode {
        match self {
            SslMode::Disable => tokio_postgres::config::SslMode::Disable,
            SslMode::Allow | SslMode::Prefer => tokio_postgres::config::SslMode::Prefer,
            SslMode::Require | SslMode::VerifyCa | SslMode::VerifyFull => {
                tokio_postgres::config::SslMode::Require
            }
        }
    }
}

/// TLS parameters of a PostgreSQL connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsSettings {
    pub mode: SslMode,
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
}

impl TlsSettings {
    /// Read `ssl_mode`, `ssl_ca_cert`, `ssl_client_cert` and `ssl_client_key`
    pub fn from_config(config: &ConnectionConfig) -> Result<Self, TlsError> {
        let path = |key: &str| {
            config
                .get_string(key)
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from)
        };
        let mode = match config.get_string("ssl_mode") {
            Some(mode) => SslMode::parse(&mode)?,
            None => SslMode::default(),
        };

        Ok(Self {
            mode,
            ca_cert: path("ssl_ca_cert"),
            client_cert: path("ssl_client_cert"),
            client_key: path("ssl_client_key"),
        })
    }

    /// Build the connector, or `None` when TLS is disabled
    pub fn build_connector(&self) -> Result<Option<MakeTlsConnector>, TlsError> {
        if self.mode == SslMode::Disable {
            return Ok(None);
        }

        info!(mode = self.mode.as_str(), "building PostgreSQL TLS connector");

        let mut builder = NativeTlsConnector::builder();
        self.configure_verification(&mut builder);

        if let Some(ca_cert) = &self.ca_cert {
            apply_ca_cert(&mut builder, ca_cert)?;
        }
        if let (Some(cert), Some(key)) = (&self.client_cert, &self.client_key) {
            apply_client_cert(&mut builder, cert, key)?;
        }

        let connector = builder
            .build()
            .map_err(|e| TlsError::ConfigurationError(e.to_string()))?;
        Ok(Some(MakeTlsConnector::new(connector)))
    }

    fn configure_verification(&self, builder: &mut TlsConnectorBuilder) {
        match self.mode {
            SslMode::Disable | SslMode::VerifyFull => {}
            SslMode::VerifyCa => {
                debug!("enabling CA verification only");
                builder.danger_accept_invalid_hostnames(true);
            }
            SslMode::Allow | SslMode::Prefer | SslMode::Require => {
                // libpq semantics: without a root certificate these modes encrypt only
                if self.ca_cert.is_none() {
                    builder.danger_accept_invalid_certs(true);
                }
                builder.danger_accept_invalid_hostnames(true);
            }
        }
    }
}

fn apply_ca_cert(builder: &mut TlsConnectorBuilder, path: &Path) -> Result<(), TlsError> {
    debug!(path = %path.display(), "loading CA certificate");

    let pem = fs::read(path).map_err(|e| TlsError::CaCertLoadFailed {
        path: path.display().to_string(),
        source: e,
    })?;
    let cert = Certificate::from_pem(&pem).map_err(|e| TlsError::InvalidCaCert(e.to_string()))?;
    builder.add_root_certificate(cert);
    Ok(())
}

fn apply_client_cert(
    builder: &mut TlsConnectorBuilder,
    cert_path: &Path,
    key_path: &Path,
) -> Result<(), TlsError> {
    let read = |path: &Path| {
        fs::read(path).map_err(|e| TlsError::ClientIdentityLoadFailed {
            path: path.display().to_string(),
            source: e,
        })
    };
    let cert_pem = read(cert_path)?;
    let key_pem = read(key_path)?;

    let identity = Identity::from_pkcs8(&cert_pem, &key_pem)
        .map_err(|e| TlsError::InvalidClientIdentity(e.to_string()))?;
    builder.identity(identity);
    Ok(())
}
