//! Metric descriptors, samples and sinks
//!
//! Collectors describe their series once with a [`MetricDescriptor`] and emit
//! [`MetricSample`]s into a caller supplied [`MetricSink`] on every pass.

mod descriptor;
mod exposition;
mod sink;


pub use descriptor::*;
pub use exposition::*;
pub use sink::*;
