//! PostgreSQL driver implementation

mod connection;
mod driver;
mod source;
mod tls;

pub use connection::PostgresConnection;
pub use driver::PostgresDriver;
pub use source::PostgresSource;
pub use tls::{SslMode, TlsError, TlsSettings};
