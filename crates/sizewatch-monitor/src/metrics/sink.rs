//! Destinations for emitted samples

use super::MetricSample;
use tokio::sync::mpsc::UnboundedSender;

/// Receives the samples of a collection pass
pub trait MetricSink: Send {
    fn emit(&mut self, sample: MetricSample);
}

impl MetricSink for Vec<MetricSample> {
    fn emit(&mut self, sample: MetricSample) {
        self.push(sample);
    }
}

impl MetricSink for UnboundedSender<MetricSample> {
    fn emit(&mut self, sample: MetricSample) {
        if let Err(e) = self.send(sample) {
            tracing::debug!(metric = %e.0.fq_name(), "metric receiver dropped, sample discarded");
        }
    }
}
