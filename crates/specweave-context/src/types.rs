//! Fragment and strategy types.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specweave_core::{BoundaryDetection, ElementKind, FragmentId, SpecDocument};
use specweave_settings::ChunkingSettings;

use crate::errors::{ContextError, Result};

// =============================================================================
// Strategy
// =============================================================================

/// Name of a chunking strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyName {
    /// Dependency clusters of business rules.
    BusinessRules,
    /// Composition hierarchies of data structures.
    DataStructures,
    /// Endpoints grouped by path domain.
    ApiEndpoints,
    /// Execution-ordered workflow sequences.
    Workflow,
    /// Every kind in priority order, adjacent related fragments merged.
    Semantic,
    /// One strategy chosen from element counts.
    Adaptive,
}

impl StrategyName {
    /// Wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BusinessRules => "business_rules",
            Self::DataStructures => "data_structures",
            Self::ApiEndpoints => "api_endpoints",
            Self::Workflow => "workflow",
            Self::Semantic => "semantic",
            Self::Adaptive => "adaptive",
        }
    }

    /// Element kind a per-kind strategy is scoped to.
    pub fn kind(&self) -> Option<ElementKind> {
        match self {
            Self::BusinessRules => Some(ElementKind::BusinessRules),
            Self::DataStructures => Some(ElementKind::DataStructures),
            Self::ApiEndpoints => Some(ElementKind::ApiEndpoints),
            Self::Workflow => Some(ElementKind::WorkflowSteps),
            Self::Semantic | Self::Adaptive => None,
        }
    }

    /// Per-kind strategy for `kind`.
    pub fn for_kind(kind: ElementKind) -> Self {
        match kind {
            ElementKind::BusinessRules => Self::BusinessRules,
            ElementKind::DataStructures => Self::DataStructures,
            ElementKind::ApiEndpoints => Self::ApiEndpoints,
            ElementKind::WorkflowSteps => Self::Workflow,
        }
    }
}

impl fmt::Display for StrategyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyName {
    type Err = ContextError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "business_rules" | "by_business_rules" => Ok(Self::BusinessRules),
            "data_structures" | "by_data_structures" => Ok(Self::DataStructures),
            "api_endpoints" | "by_api_endpoints" => Ok(Self::ApiEndpoints),
            "workflow" | "by_workflow" => Ok(Self::Workflow),
            "semantic" => Ok(Self::Semantic),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(ContextError::UnknownStrategy(other.to_owned())),
        }
    }
}

/// Parameters of one chunking call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkingStrategy {
    /// Strategy to run.
    pub name: StrategyName,
    /// Maximum elements per fragment.
    pub max_chunk_size: usize,
    /// Token budget per fragment; the configured budget when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
    /// Merge adjacent fragments that reference the same outside elements.
    #[serde(default)]
    pub preserve_relationships: bool,
    /// Kind order for composite strategies.
    #[serde(default = "default_priority_fields")]
    pub priority_fields: Vec<ElementKind>,
    /// Overlap in tokens between consecutive streamed fragments.
    #[serde(default)]
    pub overlap_size: usize,
    /// How oversized ordered groups are cut.
    #[serde(default)]
    pub boundary_detection: BoundaryDetection,
}

fn default_priority_fields() -> Vec<ElementKind> {
    ElementKind::ALL.to_vec()
}

impl ChunkingStrategy {
    /// Strategy `name` with the configured defaults.
    pub fn from_settings(name: StrategyName, settings: &ChunkingSettings) -> Self {
        Self {
            name,
            max_chunk_size: settings.default_chunk_size,
            max_tokens: Some(settings.fragment_token_budget),
            preserve_relationships: settings.preserve_relationships,
            priority_fields: settings.priority_fields.clone(),
            overlap_size: settings.default_overlap,
            boundary_detection: settings.boundary_detection,
        }
    }

    /// Same strategy with a different element cap.
    #[must_use]
    pub fn with_chunk_size(mut self, max_chunk_size: usize) -> Self {
        self.max_chunk_size = max_chunk_size;
        self
    }

    /// Same strategy with a different token budget.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Reject parameters that cannot produce fragments.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 {
            return Err(ContextError::InvalidStrategy("max_chunk_size must be > 0".into()));
        }
        if self.max_tokens == Some(0) {
            return Err(ContextError::InvalidStrategy("max_tokens must be > 0".into()));
        }
        if self.priority_fields.is_empty() {
            return Err(ContextError::InvalidStrategy(
                "priority_fields must name at least one element kind".into(),
            ));
        }
        Ok(())
    }
}

/// Options for streamed chunking.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamingOptions {
    /// Maximum elements per fragment (configured default when absent).
    pub chunk_size: Option<usize>,
    /// Overlap in tokens (configured default when absent).
    pub overlap: Option<usize>,
    /// Token budget per fragment (configured default when absent).
    pub max_tokens: Option<usize>,
    /// Kind order (configured default when absent).
    pub priority_fields: Option<Vec<ElementKind>>,
}

impl StreamingOptions {
    /// Options with an element cap and overlap.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size: Some(chunk_size),
            overlap: Some(overlap),
            ..Self::default()
        }
    }

    /// Semantic strategy built from these options over `settings`.
    pub fn to_strategy(&self, settings: &ChunkingSettings) -> ChunkingStrategy {
        let mut strategy = ChunkingStrategy::from_settings(StrategyName::Semantic, settings);
        if let Some(size) = self.chunk_size {
            strategy.max_chunk_size = size;
        }
        if let Some(overlap) = self.overlap {
            strategy.overlap_size = overlap;
        }
        if let Some(tokens) = self.max_tokens {
            strategy.max_tokens = Some(tokens);
        }
        if let Some(fields) = &self.priority_fields {
            strategy.priority_fields.clone_from(fields);
        }
        strategy
    }
}

// =============================================================================
// Fragment
// =============================================================================

/// What a fragment holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentType {
    /// Business rules only.
    BusinessRules,
    /// Data structures only.
    DataStructures,
    /// API endpoints only.
    ApiEndpoints,
    /// Workflow steps only.
    WorkflowSteps,
    /// More than one kind, after relationship merging.
    Mixed,
}

impl FragmentType {
    /// Wire label, also the middle segment of fragment ids.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BusinessRules => "business_rules",
            Self::DataStructures => "data_structures",
            Self::ApiEndpoints => "api_endpoints",
            Self::WorkflowSteps => "workflow_steps",
            Self::Mixed => "mixed",
        }
    }

    /// Element kind, unless mixed.
    pub fn kind(&self) -> Option<ElementKind> {
        match self {
            Self::BusinessRules => Some(ElementKind::BusinessRules),
            Self::DataStructures => Some(ElementKind::DataStructures),
            Self::ApiEndpoints => Some(ElementKind::ApiEndpoints),
            Self::WorkflowSteps => Some(ElementKind::WorkflowSteps),
            Self::Mixed => None,
        }
    }

    /// Type of a fragment combining `self` and `other`.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        if self == other { self } else { Self::Mixed }
    }
}

impl From<ElementKind> for FragmentType {
    fn from(kind: ElementKind) -> Self {
        match kind {
            ElementKind::BusinessRules => Self::BusinessRules,
            ElementKind::DataStructures => Self::DataStructures,
            ElementKind::ApiEndpoints => Self::ApiEndpoints,
            ElementKind::WorkflowSteps => Self::WorkflowSteps,
        }
    }
}

impl fmt::Display for FragmentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position and provenance of a fragment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentMetadata {
    /// Zero-based position in the sequence.
    pub index: usize,
    /// Sequence length; absent while streaming.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    /// Name of the source document.
    pub source_document_id: String,
    /// What the fragment holds.
    pub fragment_type: FragmentType,
    /// When the fragment was built.
    pub created_at: DateTime<Utc>,
    /// Dependency targets outside the fragment, including unresolved ids.
    pub dependencies: BTreeSet<String>,
    /// Cohesion heuristic in `[0, 1]`.
    pub quality_score: f64,
    /// The token estimate is above the budget.
    pub exceeds_budget: bool,
}

/// Edges of a fragment within its sequence.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FragmentBoundaries {
    /// First element in planned order.
    pub first_element_id: Option<String>,
    /// Last element in planned order.
    pub last_element_id: Option<String>,
    /// Fragment whose trailing elements were copied into this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlap_with: Option<FragmentId>,
    /// Elements copied from `overlap_with`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub overlap_element_ids: Vec<String>,
}

/// A token-budgeted, relationship-tagged part of a document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextFragment {
    /// `<document>:<fragment_type>:<index>`.
    pub id: FragmentId,
    /// Partial document holding only this fragment's elements.
    pub content: SpecDocument,
    /// Estimated tokens of `content`.
    pub token_count: usize,
    /// Ids outside the fragment that its elements reference.
    pub relationships: BTreeSet<String>,
    /// Element count plus a bonus for high and critical rules.
    pub priority: u32,
    /// Position and provenance.
    pub metadata: FragmentMetadata,
    /// Boundary elements and overlap.
    pub boundaries: FragmentBoundaries,
}

impl ContextFragment {
    /// Ids of every element in the fragment, overlap included.
    pub fn element_ids(&self) -> Vec<&str> {
        self.content.all_element_ids()
    }

    /// Ids of the elements the fragment owns (overlap excluded).
    pub fn own_element_ids(&self) -> Vec<&str> {
        let overlap: BTreeSet<&str> = self
            .boundaries
            .overlap_element_ids
            .iter()
            .map(String::as_str)
            .collect();
        self.element_ids()
            .into_iter()
            .filter(|id| !overlap.contains(id))
            .collect()
    }

    /// Number of elements, overlap included.
    pub fn element_count(&self) -> usize {
        self.content.total_elements()
    }
}

// =============================================================================
// Tests
// =============================================================================
