//! Sample types

use serde::{Deserialize, Serialize};

/// Row or document count of a sampled name
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "snake_case")]
pub enum RowCount {
    /// Authoritative count
    Exact(i64),
    /// Planner statistics estimate
    Estimated(f64),
}

impl RowCount {
    pub fn as_f64(&self) -> f64 {
        match self {
            RowCount::Exact(n) => *n as f64,
            RowCount::Estimated(n) => *n,
        }
    }

    pub fn is_estimate(&self) -> bool {
        matches!(self, RowCount::Estimated(_))
    }
}

/// Size of one collection or table at sampling time
///
/// Produced fresh on every call and never cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Collection or table name
    pub name: String,
    /// Byte footprint, when the engine reports one
    pub size_bytes: Option<i64>,
    /// Row or document count
    pub row_count: RowCount,
}

impl Sample {
    pub fn new(name: impl Into<String>, size_bytes: Option<i64>, row_count: RowCount) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            row_count,
        }
    }

    /// Row count from an exact count, without a byte size
    pub fn exact(name: impl Into<String>, count: i64) -> Self {
        Self::new(name, None, RowCount::Exact(count))
    }

    /// Row count from a planner estimate, without a byte size
    pub fn estimated(name: impl Into<String>, estimate: f64) -> Self {
        Self::new(name, None, RowCount::Estimated(estimate))
    }
}
