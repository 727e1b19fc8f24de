//! Sizewatch Monitor - collection and table size metrics
//!
//! This crate samples the byte footprint and row/document count of named
//! collections or tables and exposes the samples to a pull-based metrics
//! system:
//! - `ResourceHandle`: closable, fault-containing access to session copies
//! - `SizeSampler` / `RowCountSampler`: fixed-name and two-phase sampling
//! - Collectors implementing `MetricsCollector`, plus a `CollectorRegistry`
//!   that gathers a pass and renders the Prometheus text format

pub mod collector;
pub mod config;
pub mod handle;
pub mod metrics;
pub mod sampler;

#[cfg(test)]
pub(crate) mod testing;

pub use collector::*;
pub use config::*;
pub use handle::*;
pub use metrics::*;
pub use sampler::*;
