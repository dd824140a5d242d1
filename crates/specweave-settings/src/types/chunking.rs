//! Chunking and adaptive-strategy settings.

use serde::{Deserialize, Serialize};
use specweave_core::{BoundaryDetection, ElementKind};

/// Fragment sizing and strategy defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChunkingSettings {
    /// Maximum elements per fragment when the caller does not specify one.
    pub default_chunk_size: usize,
    /// Token budget per fragment when the strategy does not specify one.
    pub fragment_token_budget: usize,
    /// Overlap (in tokens) between consecutive streamed fragments.
    pub default_overlap: usize,
    /// How oversized ordered groups are cut.
    pub boundary_detection: BoundaryDetection,
    /// Order in which element kinds are chunked by the semantic strategy.
    pub priority_fields: Vec<ElementKind>,
    /// Merge adjacent fragments that reference the same outside elements.
    pub preserve_relationships: bool,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            default_chunk_size: 8,
            fragment_token_budget: 4_000,
            default_overlap: 0,
            boundary_detection: BoundaryDetection::Semantic,
            priority_fields: ElementKind::ALL.to_vec(),
            preserve_relationships: true,
        }
    }
}

/// Element counts above which the adaptive strategy picks a per-kind strategy.
///
/// Checked in order: workflow steps, data structures, API endpoints, business
/// rules. These are tunable policy defaults, not correctness requirements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdaptiveThresholds {
    /// More business rules than this selects the rule strategy.
    pub business_rules: usize,
    /// More data structures than this selects the structure strategy.
    pub data_structures: usize,
    /// More endpoints than this selects the endpoint strategy.
    pub api_endpoints: usize,
    /// More workflow steps than this selects the workflow strategy.
    pub workflow_steps: usize,
}

impl Default for AdaptiveThresholds {
    fn default() -> Self {
        Self {
            business_rules: 10,
            data_structures: 15,
            api_endpoints: 20,
            workflow_steps: 10,
        }
    }
}
