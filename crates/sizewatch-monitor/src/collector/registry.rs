//! Collector registry

use super::{
    CollectionSizeCollector, DatabaseSizeCollector, MetricsCollector, TableSizeCollector,
    UptimeCollector,
};
use crate::config::{CollectorSpec, MonitorConfig};
use crate::handle::ResourceHandle;
use crate::metrics::{MetricDescriptor, MetricNamespace, MetricSample, encode_text};
use sizewatch_core::{Result, SizewatchError};
use std::collections::HashSet;
use std::sync::Arc;

/// Set of collectors gathered together on every scrape
///
/// Fully-qualified metric names are unique across the registry.
#[derive(Default)]
pub struct CollectorRegistry {
    collectors: Vec<Box<dyn MetricsCollector>>,
    names: HashSet<String>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collector
    ///
    /// Fails with `Configuration` if one of its metric names is already
    /// registered; the registry is unchanged in that case.
    pub fn register(&mut self, collector: impl MetricsCollector + 'static) -> Result<()> {
        self.register_boxed(Box::new(collector))
    }

    pub fn register_boxed(&mut self, collector: Box<dyn MetricsCollector>) -> Result<()> {
        let descriptors = collector.describe();
        let mut incoming = HashSet::new();
        for desc in &descriptors {
            let name = desc.fq_name();
            if self.names.contains(name) || !incoming.insert(name.to_string()) {
                return Err(SizewatchError::Configuration(format!(
                    "duplicate metric name: {}",
                    name
                )));
            }
        }

        tracing::debug!(metrics = ?incoming, "registered collector");
        self.names.extend(incoming);
        self.collectors.push(collector);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Descriptors of every registered collector, in registration order
    pub fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
        self.collectors.iter().flat_map(|c| c.describe()).collect()
    }

    /// Run one collection pass over every collector
    pub async fn gather(&self) -> Vec<MetricSample> {
        let mut samples = Vec::new();
        for collector in &self.collectors {
            collector.collect(&mut samples).await;
        }
        samples
    }

    /// Run one pass and encode it in the Prometheus text format
    pub async fn render_text(&self) -> Result<String> {
        let samples = self.gather().await;
        encode_text(&samples)
    }

    /// Build the collectors listed in `config`, all sharing `handle`
    pub async fn from_config(config: &MonitorConfig, handle: Arc<ResourceHandle>) -> Result<Self> {
        config.validate()?;
        let mut registry = Self::new();

        for spec in &config.collectors {
            match spec {
                CollectorSpec::CollectionSize {
                    subsystem,
                    prefix,
                    collections,
                } => {
                    let namespace =
                        MetricNamespace::new(&config.namespace, config.subsystem_for(subsystem));
                    registry.register(CollectionSizeCollector::new(
                        &namespace,
                        prefix,
                        Arc::clone(&handle),
                        collections.clone(),
                    )?)?;
                }
                CollectorSpec::TableSize { .. } => {
                    let sampler_config = spec.sampler_config().unwrap_or_default();
                    registry.register(
                        TableSizeCollector::new(&config.namespace, Arc::clone(&handle), sampler_config)
                            .await?,
                    )?;
                }
                CollectorSpec::DatabaseSize { subsystem } => {
                    let namespace =
                        MetricNamespace::new(&config.namespace, config.subsystem_for(subsystem));
                    registry.register(DatabaseSizeCollector::new(&namespace, Arc::clone(&handle)).await?)?;
                }
                CollectorSpec::Uptime { subsystem, name } => {
                    let namespace =
                        MetricNamespace::new(&config.namespace, config.subsystem_for(subsystem));
                    registry.register(UptimeCollector::new(&namespace, name, chrono::Utc::now)?)?;
                }
            }
            tracing::info!(kind = spec.kind(), "collector configured");
        }

        Ok(registry)
    }
}

impl std::fmt::Debug for CollectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectorRegistry")
            .field("collectors", &self.collectors.len())
            .field("names", &self.names)
            .finish()
    }
}
