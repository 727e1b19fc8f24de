//! Fixed-name collection size collector

use super::traits::{MetricsCollector, emit};
use crate::config::unique_names;
use crate::handle::ResourceHandle;
use crate::metrics::{MetricDescriptor, MetricNamespace, MetricSink};
use crate::sampler::SizeSampler;
use async_trait::async_trait;
use sizewatch_core::Result;
use std::sync::Arc;

/// Reports size and object count of a fixed list of collections
///
/// Series: `<namespace>_<subsystem>_[<prefix>_]collection_size_bytes` and
/// `..._collection_count`, both labelled by `collection`.
#[derive(Debug)]
pub struct CollectionSizeCollector {
    sampler: SizeSampler,
    collections: Vec<String>,
    size_desc: Arc<MetricDescriptor>,
    count_desc: Arc<MetricDescriptor>,
}

impl CollectionSizeCollector {
    pub fn new(
        namespace: &MetricNamespace,
        prefix: &str,
        handle: Arc<ResourceHandle>,
        collections: Vec<String>,
    ) -> Result<Self> {
        let metric = |suffix: &str| {
            if prefix.is_empty() {
                namespace.fq_name(suffix)
            } else {
                namespace.fq_name(&format!("{}_{}", prefix, suffix))
            }
        };

        Ok(Self {
            sampler: SizeSampler::new(handle),
            collections: unique_names(collections),
            size_desc: Arc::new(MetricDescriptor::gauge(
                metric("collection_size_bytes"),
                "collection size in bytes",
                &["collection"],
            )?),
            count_desc: Arc::new(MetricDescriptor::gauge(
                metric("collection_count"),
                "collection object count",
                &["collection"],
            )?),
        })
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    /// Close the underlying handle; later passes emit nothing
    pub async fn close(&self) {
        self.sampler.handle().close().await;
    }
}

#[async_trait]
impl MetricsCollector for CollectionSizeCollector {
    fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
        vec![Arc::clone(&self.size_desc), Arc::clone(&self.count_desc)]
    }

    async fn collect(&self, sink: &mut dyn MetricSink) {
        for name in &self.collections {
            match self.sampler.sample(name).await {
                Ok(sample) => {
                    if let Some(size) = sample.size_bytes {
                        emit(sink, &self.size_desc, size as f64, &[name.as_str()]);
                    }
                    emit(sink, &self.count_desc, sample.row_count.as_f64(), &[name.as_str()]);
                }
                Err(e) if e.is_closed() => {
                    tracing::debug!(collection = %name, "resource handle closed, skipping collection pass");
                    return;
                }
                Err(e) => {
                    tracing::error!(collection = %name, error = %e, "failed to get collection stats");
                }
            }
        }
    }
}
