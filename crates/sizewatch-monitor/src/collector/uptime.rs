//! Process start time collector

use super::traits::{MetricsCollector, emit};
use crate::metrics::{MetricDescriptor, MetricNamespace, MetricSink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sizewatch_core::Result;
use std::sync::Arc;

/// Reports when the process started, in Unix seconds
///
/// Counter `<namespace>_<subsystem>_<name>_uptime`. The clock is read once,
/// at construction.
#[derive(Debug)]
pub struct UptimeCollector {
    desc: Arc<MetricDescriptor>,
    started_at: DateTime<Utc>,
}

impl UptimeCollector {
    pub fn new(namespace: &MetricNamespace, name: &str, now: impl FnOnce() -> DateTime<Utc>) -> Result<Self> {
        let desc = MetricDescriptor::counter(
            namespace.fq_name(&format!("{}_uptime", name)),
            format!("{} start time in seconds since the Unix epoch", name),
            &[],
        )?;
        Ok(Self {
            desc: Arc::new(desc),
            started_at: now(),
        })
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

#[async_trait]
impl MetricsCollector for UptimeCollector {
    fn describe(&self) -> Vec<Arc<MetricDescriptor>> {
        vec![Arc::clone(&self.desc)]
    }

    async fn collect(&self, sink: &mut dyn MetricSink) {
        emit(sink, &self.desc, self.started_at.timestamp() as f64, &[]);
    }
}
