//! Two-phase row-count sampler
//!
//! Phase one reads planner estimates for every target in one batched query.
//! Tables whose estimate is above the cutoff report the estimate; the rest
//! get an exact `COUNT(*)`. The whole pass runs on one session copy.

use super::{CatalogQuery, Sample};
use crate::config::{ExactCountFailure, SamplerConfig, TargetSet};
use crate::handle::ResourceHandle;
use sizewatch_core::{Result, SizewatchError};
use std::sync::Arc;

/// Outcome of one two-phase pass
#[derive(Debug, Default)]
pub struct RowCountPass {
    /// Successfully sampled tables, in target order
    pub samples: Vec<Sample>,
    /// Tables whose exact count failed
    pub failures: Vec<(String, SizewatchError)>,
    /// Whether the pass ended early on a failure
    pub aborted: bool,
}

#[derive(Debug)]
pub struct RowCountSampler {
    handle: Arc<ResourceHandle>,
    config: SamplerConfig,
}

impl RowCountSampler {
    pub fn new(handle: Arc<ResourceHandle>, config: SamplerConfig) -> Self {
        Self { handle, config }
    }

    pub fn handle(&self) -> &Arc<ResourceHandle> {
        &self.handle
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Run one pass over the configured (or discovered) tables
    ///
    /// Returns `NoTargetsFound` when there is nothing to sample. Per-table
    /// exact-count failures are reported in the pass, not as an error.
    pub async fn sample_pass(&self) -> Result<RowCountPass> {
        let catalog = CatalogQuery::for_driver(self.handle.driver_name())?;
        let config = &self.config;

        self.handle
            .run(|conn| async move {
                let conn = conn.as_ref();
                let names = match config.targets() {
                    TargetSet::Fixed(names) => names.clone(),
                    TargetSet::DiscoverAll => catalog.base_tables(conn).await?,
                };
                if names.is_empty() {
                    return Err(SizewatchError::NoTargetsFound(
                        "no tables configured or found in the active schema".to_string(),
                    ));
                }

                let estimates = catalog.estimates(conn, &names).await?;
                let mut pass = RowCountPass::default();

                for (name, estimate) in estimates {
                    if config.trusts_estimate(estimate) {
                        tracing::debug!(table = %name, estimate, "estimate above cutoff, skipping exact count");
                        pass.samples.push(Sample::estimated(name, estimate));
                        continue;
                    }

                    match catalog.exact_count(conn, &name).await {
                        Ok(count) => {
                            tracing::debug!(table = %name, estimate, count, "exact count");
                            pass.samples.push(Sample::exact(name, count));
                        }
                        Err(e) if e.is_closed() => return Err(e),
                        Err(e) => {
                            pass.failures.push((name, e));
                            if config.exact_count_failure() == ExactCountFailure::AbortPass {
                                pass.aborted = true;
                                break;
                            }
                        }
                    }
                }

                Ok(pass)
            })
            .await
    }
}
