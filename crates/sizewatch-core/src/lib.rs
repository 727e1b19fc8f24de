//! Sizewatch Core - collaborator abstractions for the size monitor
//!
//! This crate defines the seams between the sampling core and the database
//! drivers it talks to:
//!
//! - `Connection` - a single session able to run statements and commands
//! - `SessionSource` - something that hands out independent session copies
//! - `DatabaseDriver` - opens a `SessionSource` from a `ConnectionConfig`
//! - Common types like `Value`, `Row` and `QueryResult`

mod connection;
mod driver;
mod error;
mod types;

#[cfg(test)]
mod tests;

pub use connection::*;
pub use driver::*;
pub use error::*;
pub use types::*;
