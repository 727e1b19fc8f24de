//! MongoDB driver for sizewatch
//!
//! Sessions take JSON command documents (`{"collStats": "models"}`) and
//! return one row per result document. Cursor replies are flattened from
//! `cursor.firstBatch`.
//!
//! # Example
//!
//! ```ignore
//! use sizewatch_core::{ConnectionConfig, DatabaseDriver};
//! use sizewatch_driver_mongodb::MongoDbDriver;
//!
//! let config = ConnectionConfig::new_mongodb("localhost", 27017, "juju");
//! let source = MongoDbDriver::new().open(&config).await?;
//! let session = source.copy_session().await?;
//! let stats = session.query(r#"{"collStats": "models"}"#, &[]).await?;
//! ```

mod driver;
#[cfg(test)]
mod driver_tests;
mod source;

pub use driver::*;
pub use source::*;
