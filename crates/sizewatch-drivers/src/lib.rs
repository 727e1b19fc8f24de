//! sizewatch drivers - session sources for the monitored databases
//!
//! Concrete implementations of the `DatabaseDriver` and `SessionSource`
//! traits defined in `sizewatch-core`.

#[cfg(feature = "postgres")]
pub use sizewatch_driver_postgres as postgres;

#[cfg(feature = "mongodb")]
pub use sizewatch_driver_mongodb as mongodb;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from sizewatch-core
pub use sizewatch_core::{
    Connection, ConnectionConfig, DatabaseDriver, QueryResult, Result, Row, SessionSource,
    SizewatchError, Value,
};
