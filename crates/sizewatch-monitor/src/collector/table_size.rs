//! Two-phase table row-count collector

use super::traits::{MetricsCollector, emit};
use crate::config::SamplerConfig;
use crate::handle::ResourceHandle;
use crate::metrics::{MetricDescriptor, MetricSink, fq_name, sanitize_metric_component};
use crate::sampler::{CatalogQuery, RowCountSampler, SizeSampler};
use async_trait::async_trait;
use sizewatch_core::{Result, SizewatchError};
use std::sync::Arc;

/// Reports row counts of the tables of one database
///
/// The series is `<namespace>_database_<db>_table_row_count{table}`, where
/// `<db>` is the database the handle is bound to, read once here.
#[derive(Debug)]
pub struct TableSizeCollector {
    sampler: RowCountSampler,
    database: String,
    count_desc: Arc<MetricDescriptor>,
}

impl TableSizeCollector {
    pub async fn new(namespace: &str, handle: Arc<ResourceHandle>, config: SamplerConfig) -> Result<Self> {
        config.validate()?;
        let catalog = CatalogQuery::for_driver(handle.driver_name())?;
        if !catalog.supports_estimates() {
            return Err(SizewatchError::NotSupported(format!(
                "table row counts not available for driver: {}",
                handle.driver_name()
            )));
        }

        let database = SizeSampler::new(Arc::clone(&handle)).current_database().await?;
        let metric = format!("{}_table_row_count", sanitize_metric_component(&database));
        let count_desc = Arc::new(MetricDescriptor::gauge(
            fq_name(namespace, "database", &metric),
            "table row count",
            &["table"],
        )?);

        Ok(Self {
            sampler: RowCountSampler::new(handle, config),
            database,
            count_desc,
        })
    }

    /// Database the row counts belong to
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn config(&self) -> &SamplerConfig {
        self.sampler.config()
    }

    pub async fn close(&self) {
        self.sampler.handle().close().await;
    }
}

#[async_trait]
impl MetricsCollector for TableSizeCollector {
    fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
        vec![Arc::clone(&self.count_desc)]
    }

    async fn collect(&self, sink: &mut dyn MetricSink) {
        let pass = match self.sampler.sample_pass().await {
            Ok(pass) => pass,
            Err(SizewatchError::NoTargetsFound(reason)) => {
                tracing::warn!(database = %self.database, "{}", reason);
                return;
            }
            Err(e) if e.is_closed() => {
                tracing::debug!(database = %self.database, "resource handle closed, skipping row count pass");
                return;
            }
            Err(e) => {
                tracing::error!(database = %self.database, error = %e, "failed to query table row counts");
                return;
            }
        };

        for sample in &pass.samples {
            emit(sink, &self.count_desc, sample.row_count.as_f64(), &[sample.name.as_str()]);
        }
        for (table, e) in &pass.failures {
            tracing::error!(database = %self.database, table = %table, error = %e, "failed to query table size");
        }
        if pass.aborted {
            tracing::warn!(
                database = %self.database,
                reported = pass.samples.len(),
                "row count pass aborted after exact count failure"
            );
        }
    }
}
