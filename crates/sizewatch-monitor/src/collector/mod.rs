//! Metrics collectors
//!
//! Each collector implements the pull contract of [`MetricsCollector`]:
//! a fixed set of descriptors and a `collect` pass that emits whatever could
//! be sampled. Sampling failures are logged and the affected series omitted;
//! a pass never returns an error.

mod collection_size;
mod database_size;
mod registry;
mod table_size;
mod traits;
mod uptime;

#[cfg(test)]
mod tests;

pub use collection_size::*;
pub use database_size::*;
pub use registry::*;
pub use table_size::*;
pub use traits::*;
pub use uptime::*;
