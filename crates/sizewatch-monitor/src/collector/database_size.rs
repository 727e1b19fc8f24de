//! Database-wide collection size collector

use super::traits::{MetricsCollector, emit};
use crate::config::TargetSet;
use crate::handle::ResourceHandle;
use crate::metrics::{MetricDescriptor, MetricNamespace, MetricSink};
use crate::sampler::SizeSampler;
use async_trait::async_trait;
use sizewatch_core::Result;
use std::sync::Arc;

/// Reports size and count of every collection in the database
///
/// Collection names are discovered again on every pass, so collections
/// created or dropped between passes are picked up. Series carry
/// `database` and `collection` labels.
#[derive(Debug)]
pub struct DatabaseSizeCollector {
    sampler: SizeSampler,
    database: String,
    size_desc: Arc<MetricDescriptor>,
    count_desc: Arc<MetricDescriptor>,
}

impl DatabaseSizeCollector {
    pub async fn new(namespace: &MetricNamespace, handle: Arc<ResourceHandle>) -> Result<Self> {
        let sampler = SizeSampler::new(handle);
        let database = sampler.current_database().await?;

        Ok(Self {
            sampler,
            database,
            size_desc: Arc::new(MetricDescriptor::gauge(
                namespace.fq_name("collection_size_bytes"),
                "collection size in bytes",
                &["database", "collection"],
            )?),
            count_desc: Arc::new(MetricDescriptor::gauge(
                namespace.fq_name("collection_count"),
                "collection object count",
                &["database", "collection"],
            )?),
        })
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub async fn close(&self) {
        self.sampler.handle().close().await;
    }
}

#[async_trait]
impl MetricsCollector for DatabaseSizeCollector {
    fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
        vec![Arc::clone(&self.size_desc), Arc::clone(&self.count_desc)]
    }

    async fn collect(&self, sink: &mut dyn MetricSink) {
        let names = match self.sampler.discover(&TargetSet::DiscoverAll).await {
            Ok(names) => names,
            Err(e) if e.is_closed() => return,
            Err(e) => {
                tracing::error!(database = %self.database, error = %e, "failed to list collections");
                return;
            }
        };
        if names.is_empty() {
            tracing::warn!(database = %self.database, "no collections found");
            return;
        }

        let database = self.database.as_str();
        for name in &names {
            match self.sampler.sample(name).await {
                Ok(sample) => {
                    if let Some(size) = sample.size_bytes {
                        emit(sink, &self.size_desc, size as f64, &[database, name.as_str()]);
                    }
                    emit(sink, &self.count_desc, sample.row_count.as_f64(), &[database, name.as_str()]);
                }
                Err(e) if e.is_closed() => {
                    tracing::debug!(database = %database, "resource handle closed, skipping collection pass");
                    return;
                }
                Err(e) => {
                    tracing::error!(database = %database, collection = %name, error = %e, "failed to get collection stats");
                }
            }
        }
    }
}
