//! Collector trait

use crate::metrics::{MetricDescriptor, MetricSample, MetricSink};
use async_trait::async_trait;
use std::sync::Arc;

/// A pull-based metrics collector
#[async_trait]
pub trait MetricsCollector: Send + Sync {
    /// Descriptors of every series the collector can emit
    ///
    /// Fixed at construction; the same on every call.
    fn describe(&self) -> Vec<Arc<MetricDescriptor>>;

    /// Sample now and emit the values into `sink`
    async fn collect(&self, sink: &mut dyn MetricSink);
}

/// Build and emit one sample, logging instead of failing
pub(crate) fn emit(sink: &mut dyn MetricSink, descriptor: &Arc<MetricDescriptor>, value: f64, label_values: &[&str]) {
    match descriptor.sample(value, label_values) {
        Ok(sample) => {
            tracing::debug!(metric = %descriptor.fq_name(), labels = ?label_values, value, "emitting sample");
            sink.emit(sample);
        }
        Err(e) => {
            tracing::error!(metric = %descriptor.fq_name(), error = %e, "failed to build metric sample");
        }
    }
}

/// Collect one pass of a single collector into a vector
pub async fn collect_once(collector: &dyn MetricsCollector) -> Vec<MetricSample> {
    let mut samples = Vec::new();
    collector.collect(&mut samples).await;
    samples
}
