//! Optimizer, cache and analysis settings.

use serde::{Deserialize, Serialize};
use specweave_core::{CompressionLevel, Priority};

/// Compression pipeline settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizerSettings {
    /// Model profile used when the caller names none.
    pub default_model: String,
    /// Compression level used when the caller names none.
    pub compression_level: CompressionLevel,
    /// Rules below this priority are dropped at `high` compression.
    pub min_rule_priority: Priority,
    /// Elements kept per kind by the last `high` compression step.
    pub max_elements_per_kind: usize,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            default_model: "gpt-4".to_string(),
            compression_level: CompressionLevel::Medium,
            min_rule_priority: Priority::Medium,
            max_elements_per_kind: 10,
        }
    }
}

/// Context manager cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// Whether contexts and fragment lists are cached at all.
    pub enabled: bool,
    /// Maximum cached entries before LRU eviction.
    pub max_entries: usize,
    /// Entry lifetime in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 100,
            ttl_secs: 60 * 60,
        }
    }
}

/// Thresholds below which context analysis emits suggestions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisThresholds {
    /// Quality score threshold.
    pub min_quality: f64,
    /// Token efficiency threshold (only checked when optimization ran).
    pub min_token_efficiency: f64,
    /// Relationship preservation threshold.
    pub min_relationship_preservation: f64,
}

impl Default for AnalysisThresholds {
    fn default() -> Self {
        Self {
            min_quality: 0.8,
            min_token_efficiency: 0.1,
            min_relationship_preservation: 0.9,
        }
    }
}
