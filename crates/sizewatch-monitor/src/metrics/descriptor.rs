//! Metric descriptors and samples

use prometheus::core::Desc;
use serde::{Deserialize, Serialize};
use sizewatch_core::{Result, SizewatchError};
use std::collections::HashMap;
use std::sync::Arc;

/// Metric value type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Value that can go up and down
    Gauge,
    /// Monotonic value
    Counter,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Gauge => "gauge",
            MetricKind::Counter => "counter",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Namespace and subsystem shared by the series of one collector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricNamespace {
    /// Leading name component, e.g. the application name
    #[serde(default)]
    pub namespace: String,
    /// Second name component, e.g. the monitored component
    #[serde(default)]
    pub subsystem: String,
}

impl MetricNamespace {
    pub fn new(namespace: impl Into<String>, subsystem: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            subsystem: subsystem.into(),
        }
    }

    /// Fully-qualified name for `name` inside this namespace
    pub fn fq_name(&self, name: &str) -> String {
        fq_name(&self.namespace, &self.subsystem, name)
    }
}

/// Join the non-empty parts of a metric name with `_`
///
/// `fq_name("juju", "", "uptime")` yields `juju_uptime`; an empty `name`
/// yields an empty string.
pub fn fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    if name.is_empty() {
        return String::new();
    }
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// Replace every character not allowed in a metric name with `_`
///
/// Used for name components derived from runtime data such as a database
/// name. A leading digit is prefixed with `_`.
pub fn sanitize_metric_component(component: &str) -> String {
    let mut out: String = component
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Name, help text and label names of one metric series
///
/// Fixed for the lifetime of a collector.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDescriptor {
    fq_name: String,
    help: String,
    label_names: Vec<String>,
    kind: MetricKind,
}

impl MetricDescriptor {
    /// Build a validated descriptor
    ///
    /// Returns `SizewatchError::Metric` when the name, the help text or a
    /// label name is rejected by the Prometheus naming rules.
    pub fn new(
        kind: MetricKind,
        fq_name: impl Into<String>,
        help: impl Into<String>,
        label_names: &[&str],
    ) -> Result<Self> {
        let fq_name = fq_name.into();
        let help = help.into();
        let label_names: Vec<String> = label_names.iter().map(|l| l.to_string()).collect();

        Desc::new(
            fq_name.clone(),
            help.clone(),
            label_names.clone(),
            HashMap::new(),
        )
        .map_err(|e| SizewatchError::Metric(format!("invalid metric {:?}: {}", fq_name, e)))?;

        Ok(Self {
            fq_name,
            help,
            label_names,
            kind,
        })
    }

    pub fn gauge(fq_name: impl Into<String>, help: impl Into<String>, label_names: &[&str]) -> Result<Self> {
        Self::new(MetricKind::Gauge, fq_name, help, label_names)
    }

    pub fn counter(fq_name: impl Into<String>, help: impl Into<String>, label_names: &[&str]) -> Result<Self> {
        Self::new(MetricKind::Counter, fq_name, help, label_names)
    }

    pub fn fq_name(&self) -> &str {
        &self.fq_name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Create a sample of this series
    ///
    /// `label_values` must match the descriptor's label names one to one.
    pub fn sample(self: &Arc<Self>, value: f64, label_values: &[&str]) -> Result<MetricSample> {
        if label_values.len() != self.label_names.len() {
            return Err(SizewatchError::Metric(format!(
                "{}: expected {} label values, got {}",
                self.fq_name,
                self.label_names.len(),
                label_values.len()
            )));
        }
        if self.kind == MetricKind::Counter && value < 0.0 {
            return Err(SizewatchError::Metric(format!(
                "{}: counter value {} is negative",
                self.fq_name, value
            )));
        }
        Ok(MetricSample {
            descriptor: Arc::clone(self),
            label_values: label_values.iter().map(|v| v.to_string()).collect(),
            value,
        })
    }
}

/// One observed value of a described series
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub descriptor: Arc<MetricDescriptor>,
    pub label_values: Vec<String>,
    pub value: f64,
}

impl MetricSample {
    pub fn fq_name(&self) -> &str {
        self.descriptor.fq_name()
    }

    /// Value of the label called `name`
    pub fn label(&self, name: &str) -> Option<&str> {
        self.descriptor
            .label_names()
            .iter()
            .position(|l| l == name)
            .and_then(|idx| self.label_values.get(idx))
            .map(String::as_str)
    }
}
