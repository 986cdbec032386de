//! # Cache Configuration
//!
//! Explicit configuration object handed to the cache at construction.
//! There is no process-wide state: two caches with different configurations
//! can coexist.
//!
//! All fields have defaults, so a partial TOML table deserializes into a
//! usable configuration. Values are checked by [`RelcountConfig::validate`];
//! invalid values are rejected, never clamped.

use crate::primitives::{
    DEFAULT_AGGREGATE_LIMIT, DEFAULT_COMPACTION_THRESHOLD, DEFAULT_PROPERTY_PREFIX, SEPARATOR,
};
use crate::RelcountError;
use serde::{Deserialize, Serialize};

/// Which entries compete for the compaction threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompactionScope {
    /// One budget per label and direction.
    #[default]
    LabelDirection,
    /// One budget for the whole vertex.
    Vertex,
}

/// Which tag combinations the maintainer keeps counters for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Materialization {
    /// Only the literal combination of each edge; aggregates are summed at
    /// read time.
    #[default]
    Literal,
    /// Also every subset of each edge's tags, for `O(1)` aggregate reads.
    PowerSet,
}

/// How a vertex cache is written into host vertex properties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceFormat {
    /// One integer property per entry, keyed by prefix + canonical string.
    #[default]
    PerEntry,
    /// One binary property holding the whole cache.
    SingleProperty,
}

/// Configuration of a count cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RelcountConfig {
    /// Entry count per group at which compaction kicks in.
    pub compaction_threshold: usize,
    pub compaction_scope: CompactionScope,
    pub materialization: Materialization,
    /// Maximum aggregate entries per label/direction in power-set mode.
    pub aggregate_limit: usize,
    pub persistence: PersistenceFormat,
    /// Prefix of the vertex properties owned by the cache.
    pub property_prefix: String,
}

impl Default for RelcountConfig {
    fn default() -> Self {
        Self {
            compaction_threshold: DEFAULT_COMPACTION_THRESHOLD,
            compaction_scope: CompactionScope::default(),
            materialization: Materialization::default(),
            aggregate_limit: DEFAULT_AGGREGATE_LIMIT,
            persistence: PersistenceFormat::default(),
            property_prefix: DEFAULT_PROPERTY_PREFIX.to_string(),
        }
    }
}

impl RelcountConfig {
    /// Check every field.
    pub fn validate(&self) -> Result<(), RelcountError> {
        if self.compaction_threshold == 0 {
            return Err(RelcountError::InvalidConfig(
                "compaction_threshold must be at least 1".to_string(),
            ));
        }
        if self.aggregate_limit == 0 {
            return Err(RelcountError::InvalidConfig(
                "aggregate_limit must be at least 1".to_string(),
            ));
        }
        if self.property_prefix.is_empty() {
            return Err(RelcountError::InvalidConfig(
                "property_prefix must not be empty".to_string(),
            ));
        }
        if self.property_prefix.contains(SEPARATOR) {
            return Err(RelcountError::InvalidConfig(format!(
                "property_prefix must not contain '{}'",
                SEPARATOR
            )));
        }
        Ok(())
    }

    pub fn with_compaction_threshold(mut self, threshold: usize) -> Result<Self, RelcountError> {
        self.compaction_threshold = threshold;
        self.validate()?;
        Ok(self)
    }

    #[must_use]
    pub fn with_compaction_scope(mut self, scope: CompactionScope) -> Self {
        self.compaction_scope = scope;
        self
    }

    #[must_use]
    pub fn with_materialization(mut self, materialization: Materialization) -> Self {
        self.materialization = materialization;
        self
    }

    pub fn with_aggregate_limit(mut self, limit: usize) -> Result<Self, RelcountError> {
        self.aggregate_limit = limit;
        self.validate()?;
        Ok(self)
    }

    #[must_use]
    pub fn with_persistence(mut self, persistence: PersistenceFormat) -> Self {
        self.persistence = persistence;
        self
    }

    pub fn with_property_prefix(mut self, prefix: impl Into<String>) -> Result<Self, RelcountError> {
        self.property_prefix = prefix.into();
        self.validate()?;
        Ok(self)
    }
}
