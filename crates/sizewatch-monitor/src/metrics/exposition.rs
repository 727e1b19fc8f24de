//! Prometheus text exposition of a collection pass

use super::{MetricKind, MetricSample};
use prometheus::{CounterVec, Encoder, GaugeVec, Opts, Registry, TextEncoder};
use sizewatch_core::{Result, SizewatchError};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Encode `samples` in the Prometheus text format
///
/// Samples are grouped into one family per descriptor; families with no
/// samples are not written, so an empty pass encodes to an empty string.
pub fn encode_text(samples: &[MetricSample]) -> Result<String> {
    let registry = Registry::new();
    let mut gauges: HashMap<&str, GaugeVec> = HashMap::new();
    let mut counters: HashMap<&str, CounterVec> = HashMap::new();

    for sample in samples {
        let descriptor = sample.descriptor.as_ref();
        let label_values: Vec<&str> = sample.label_values.iter().map(String::as_str).collect();

        match descriptor.kind() {
            MetricKind::Gauge => {
                let vec = match gauges.entry(descriptor.fq_name()) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => {
                        let vec = GaugeVec::new(opts(sample), &label_names(sample))
                            .map_err(metric_error)?;
                        registry.register(Box::new(vec.clone())).map_err(metric_error)?;
                        e.insert(vec)
                    }
                };
                vec.get_metric_with_label_values(&label_values)
                    .map_err(metric_error)?
                    .set(sample.value);
            }
            MetricKind::Counter => {
                if sample.value < 0.0 {
                    return Err(SizewatchError::Metric(format!(
                        "{}: counter value {} is negative",
                        descriptor.fq_name(),
                        sample.value
                    )));
                }
                let vec = match counters.entry(descriptor.fq_name()) {
                    Entry::Occupied(e) => e.into_mut(),
                    Entry::Vacant(e) => {
                        let vec = CounterVec::new(opts(sample), &label_names(sample))
                            .map_err(metric_error)?;
                        registry.register(Box::new(vec.clone())).map_err(metric_error)?;
                        e.insert(vec)
                    }
                };
                let counter = vec
                    .get_metric_with_label_values(&label_values)
                    .map_err(metric_error)?;
                counter.reset();
                counter.inc_by(sample.value);
            }
        }
    }

    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(metric_error)?;
    String::from_utf8(buffer).map_err(|e| SizewatchError::Metric(e.to_string()))
}

fn opts(sample: &MetricSample) -> Opts {
    Opts::new(sample.descriptor.fq_name(), sample.descriptor.help())
}

fn label_names(sample: &MetricSample) -> Vec<&str> {
    sample
        .descriptor
        .label_names()
        .iter()
        .map(String::as_str)
        .collect()
}

fn metric_error(e: prometheus::Error) -> SizewatchError {
    SizewatchError::Metric(e.to_string())
}
