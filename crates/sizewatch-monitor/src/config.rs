//! Sampler and monitor configuration
//!
//! `SamplerConfig` is built in code and immutable once handed to a sampler.
//! `MonitorConfig` is the TOML document the `sizewatch` binary reads: one
//! connection and a list of collectors to register.

use serde::{Deserialize, Serialize};
use sizewatch_core::{ConnectionConfig, Result, SizewatchError};
use std::collections::HashSet;
use std::path::Path;

/// Estimate above which the exact count is skipped
pub const DEFAULT_CUTOFF_THRESHOLD: f64 = 10_000.0;

/// Names a sampler covers
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TargetSet {
    /// An ordered, fixed list of names
    Fixed(Vec<String>),
    /// Every base table or collection found in the catalog at sampling time
    #[default]
    DiscoverAll,
}

impl TargetSet {
    /// Fixed list of names; an empty list means "discover all"
    ///
    /// Repeated names are kept once, at their first position.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names = unique_names(names);
        if names.is_empty() {
            TargetSet::DiscoverAll
        } else {
            TargetSet::Fixed(names)
        }
    }

    /// Configured names, `None` in discovery mode
    pub fn names(&self) -> Option<&[String]> {
        match self {
            TargetSet::Fixed(names) => Some(names),
            TargetSet::DiscoverAll => None,
        }
    }

    pub fn is_discover_all(&self) -> bool {
        matches!(self, TargetSet::DiscoverAll)
    }
}

/// What a two-phase pass does when an exact count fails
/// Names in first-seen order with repeats dropped
pub(crate) fn unique_names<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    names
        .into_iter()
        .map(Into::into)
        .filter(|name: &String| seen.insert(name.clone()))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExactCountFailure {
    /// Log the failure, skip the table and keep sampling the rest
    #[default]
    SkipTable,
    /// End the pass at the first failure; earlier tables are still reported
    AbortPass,
}

/// Configuration of a two-phase row-count sampler
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerConfig {
    targets: TargetSet,
    cutoff_threshold: f64,
    exact_count_failure: ExactCountFailure,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            targets: TargetSet::DiscoverAll,
            cutoff_threshold: DEFAULT_CUTOFF_THRESHOLD,
            exact_count_failure: ExactCountFailure::default(),
        }
    }
}

impl SamplerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: sample a fixed list of tables
    pub fn with_targets<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = TargetSet::from_names(names);
        self
    }

    /// Builder method: set the target set
    pub fn with_target_set(mut self, targets: TargetSet) -> Self {
        self.targets = match targets {
            TargetSet::Fixed(names) => TargetSet::from_names(names),
            TargetSet::DiscoverAll => TargetSet::DiscoverAll,
        };
        self
    }

    /// Builder method: set the cutoff threshold
    pub fn with_cutoff_threshold(mut self, threshold: f64) -> Self {
        self.cutoff_threshold = threshold;
        self
    }

    /// Builder method: set the exact-count failure policy
    pub fn with_exact_count_failure(mut self, policy: ExactCountFailure) -> Self {
        self.exact_count_failure = policy;
        self
    }

    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }

    pub fn cutoff_threshold(&self) -> f64 {
        self.cutoff_threshold
    }

    pub fn exact_count_failure(&self) -> ExactCountFailure {
        self.exact_count_failure
    }

    /// Whether an estimate is trusted without an exact count
    ///
    /// Negative estimates mean "never analysed" and are never trusted.
    pub fn trusts_estimate(&self, estimate: f64) -> bool {
        estimate >= 0.0 && estimate > self.cutoff_threshold
    }

    pub fn validate(&self) -> Result<()> {
        if !self.cutoff_threshold.is_finite() || self.cutoff_threshold < 0.0 {
            return Err(SizewatchError::Configuration(format!(
                "cutoff threshold must be a non-negative number, got {}",
                self.cutoff_threshold
            )));
        }
        Ok(())
    }
}

fn default_namespace() -> String {
    "sizewatch".to_string()
}

fn default_cutoff_threshold() -> f64 {
    DEFAULT_CUTOFF_THRESHOLD
}

/// Monitor configuration file
///
/// ```toml
/// namespace = "jimm"
/// subsystem = "mongo"
///
/// [connection]
/// driver = "mongodb"
/// host = "localhost"
/// database = "jimm"
///
/// [[collectors]]
/// kind = "collection_size"
/// collections = ["models", "controllers"]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Leading component of every metric name
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Default subsystem for collectors that do not set their own
    #[serde(default)]
    pub subsystem: String,
    /// Monitored database
    pub connection: ConnectionConfig,
    /// Collectors to register, in order
    #[serde(default)]
    pub collectors: Vec<CollectorSpec>,
}

/// One collector entry of a [`MonitorConfig`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CollectorSpec {
    /// Size and count of a fixed list of collections
    CollectionSize {
        #[serde(default)]
        subsystem: Option<String>,
        #[serde(default)]
        prefix: String,
        collections: Vec<String>,
    },
    /// Two-phase row counts of tables
    TableSize {
        #[serde(default)]
        tables: Vec<String>,
        #[serde(default = "default_cutoff_threshold")]
        cutoff_threshold: f64,
        #[serde(default)]
        on_exact_count_failure: ExactCountFailure,
    },
    /// Size and count of every collection in the database
    DatabaseSize {
        #[serde(default)]
        subsystem: Option<String>,
    },
    /// Process start time
    Uptime {
        #[serde(default)]
        subsystem: Option<String>,
        name: String,
    },
}

impl CollectorSpec {
    /// Short kind name, as written in the config file
    pub fn kind(&self) -> &'static str {
        match self {
            CollectorSpec::CollectionSize { .. } => "collection_size",
            CollectorSpec::TableSize { .. } => "table_size",
            CollectorSpec::DatabaseSize { .. } => "database_size",
            CollectorSpec::Uptime { .. } => "uptime",
        }
    }

    /// Sampler configuration of a `table_size` entry
    pub fn sampler_config(&self) -> Option<SamplerConfig> {
        match self {
            CollectorSpec::TableSize {
                tables,
                cutoff_threshold,
                on_exact_count_failure,
            } => Some(
                SamplerConfig::new()
                    .with_targets(tables.iter().cloned())
                    .with_cutoff_threshold(*cutoff_threshold)
                    .with_exact_count_failure(*on_exact_count_failure),
            ),
            _ => None,
        }
    }
}

impl MonitorConfig {
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            namespace: default_namespace(),
            subsystem: String::new(),
            connection,
            collectors: Vec::new(),
        }
    }

    /// Builder method: set the namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Builder method: set the default subsystem
    pub fn with_subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.subsystem = subsystem.into();
        self
    }

    /// Builder method: append a collector
    pub fn with_collector(mut self, spec: CollectorSpec) -> Self {
        self.collectors.push(spec);
        self
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SizewatchError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            SizewatchError::Configuration(msg) => {
                SizewatchError::Configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Subsystem for a collector, falling back to the global one
    pub fn subsystem_for<'a>(&'a self, spec_subsystem: &'a Option<String>) -> &'a str {
        spec_subsystem.as_deref().unwrap_or(&self.subsystem)
    }

    pub fn validate(&self) -> Result<()> {
        if self.connection.driver.is_empty() {
            return Err(SizewatchError::Configuration(
                "connection.driver must be set".to_string(),
            ));
        }
        if self.collectors.is_empty() {
            return Err(SizewatchError::Configuration(
                "at least one [[collectors]] entry is required".to_string(),
            ));
        }

        for (idx, spec) in self.collectors.iter().enumerate() {
            let invalid = |msg: &str| {
                SizewatchError::Configuration(format!("collectors[{}] ({}): {}", idx, spec.kind(), msg))
            };
            match spec {
                CollectorSpec::CollectionSize { collections, .. } => {
                    if collections.is_empty() {
                        return Err(invalid("collections must not be empty"));
                    }
                    if collections.iter().any(|c| c.is_empty()) {
                        return Err(invalid("collection names must not be empty"));
                    }
                }
                CollectorSpec::TableSize { .. } => {
                    if let Some(sampler) = spec.sampler_config() {
                        sampler.validate().map_err(|e| invalid(&e.to_string()))?;
                    }
                }
                CollectorSpec::DatabaseSize { .. } => {}
                CollectorSpec::Uptime { name, .. } => {
                    if name.is_empty() {
                        return Err(invalid("name must not be empty"));
                    }
                }
            }
        }
        Ok(())
    }
}
