//! Fixed-name size sampler

use super::{CatalogQuery, Sample, StatsQuery};
use crate::config::TargetSet;
use crate::handle::ResourceHandle;
use sizewatch_core::Result;
use std::sync::Arc;

/// Samples the size and count of named collections or tables
///
/// Every call runs on a freshly acquired session copy that is released when
/// the call returns. Failures are returned as-is; nothing is retried.
#[derive(Debug, Clone)]
pub struct SizeSampler {
    handle: Arc<ResourceHandle>,
}

impl SizeSampler {
    pub fn new(handle: Arc<ResourceHandle>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &Arc<ResourceHandle> {
        &self.handle
    }

    /// Sample one collection or table
    pub async fn sample(&self, name: &str) -> Result<Sample> {
        let query = StatsQuery::for_driver(self.handle.driver_name())?;
        self.handle
            .run(|conn| async move { query.sample(conn.as_ref(), name).await })
            .await
    }

    /// Resolve a target set to concrete names
    pub async fn discover(&self, targets: &TargetSet) -> Result<Vec<String>> {
        match targets {
            TargetSet::Fixed(names) => Ok(names.clone()),
            TargetSet::DiscoverAll => {
                let catalog = CatalogQuery::for_driver(self.handle.driver_name())?;
                self.handle
                    .run(|conn| async move { catalog.base_tables(conn.as_ref()).await })
                    .await
            }
        }
    }

    /// Name of the database the handle's sessions are bound to
    pub async fn current_database(&self) -> Result<String> {
        let catalog = CatalogQuery::for_driver(self.handle.driver_name())?;
        self.handle
            .run(|conn| async move { catalog.current_database(conn.as_ref()).await })
            .await
    }
}
