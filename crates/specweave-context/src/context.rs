//! Processing contexts: a document plus its relationship map, metrics and
//! optimization record.
//!
//! Contexts are values. Every transformation returns a new context that keeps
//! the id, the original token count, the original element counts and the
//! original relationships, so quality can always be measured against the
//! document the context started from.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use specweave_core::{ContextId, ElementKind, SpecDocument};
use specweave_settings::AnalysisThresholds;
use specweave_tokens::CompressionTechnique;

use crate::constants::Preservation;
use crate::relationships::{EdgeKind, Relationship, RelationshipGraph};

// =============================================================================
// Types
// =============================================================================

/// Token and element counts of a context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextMetrics {
    /// Tokens of the document the context was created from.
    pub original_tokens: usize,
    /// Tokens of the current document.
    pub final_tokens: usize,
    /// Element counts of the original document.
    pub original_counts: BTreeMap<ElementKind, usize>,
    /// Element counts of the current document.
    pub final_counts: BTreeMap<ElementKind, usize>,
    /// Wall time spent building the context.
    pub processing_time_ms: u64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// One step of the compression pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationStep {
    /// Technique applied.
    pub technique: CompressionTechnique,
    /// What the step stripped (group labels or element ids).
    pub removed: Vec<String>,
    /// Top-level groups still present afterwards.
    pub preserved: Vec<String>,
    /// Estimated tokens after the step.
    pub tokens_after: usize,
}

/// Outcome of an optimization pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRecord {
    /// Whether any step ran.
    pub applied: bool,
    /// Budget the pass aimed for.
    pub target_tokens: usize,
    /// Tokens before the pass.
    pub original_tokens: usize,
    /// Tokens after the pass.
    pub final_tokens: usize,
    /// Techniques in the order they ran.
    pub techniques_used: Vec<CompressionTechnique>,
    /// Per-step details.
    pub steps: Vec<OptimizationStep>,
    /// The pipeline ran out of steps above budget.
    pub exceeds_budget: bool,
}

/// A document prepared for a model context window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingContext {
    /// Context id (UUID v7).
    pub id: ContextId,
    /// Current document.
    pub document: SpecDocument,
    /// Element id → existing ids it references.
    pub relationships: BTreeMap<String, BTreeSet<String>>,
    /// Element id → ids it depends on, resolved or not.
    pub dependencies: BTreeMap<String, BTreeSet<String>>,
    /// Resolvable edges of the original document.
    pub original_relationships: Vec<Relationship>,
    /// Token and element counts.
    pub metrics: ContextMetrics,
    /// Last optimization pass, if one ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimization: Option<OptimizationRecord>,
    /// Model the context was shaped for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_model: Option<String>,
}

impl ProcessingContext {
    /// Fresh context over `document` estimated at `tokens`.
    pub fn new(document: SpecDocument, tokens: usize) -> Self {
        let graph = RelationshipGraph::for_document(&document);
        let (relationships, dependencies) = relationship_maps(&graph);
        let original_relationships = graph
            .edges()
            .iter()
            .filter(|e| graph.contains(&e.target_id))
            .cloned()
            .collect();
        let counts = document.element_counts();
        Self {
            id: ContextId::new(),
            relationships,
            dependencies,
            original_relationships,
            metrics: ContextMetrics {
                original_tokens: tokens,
                final_tokens: tokens,
                original_counts: counts.clone(),
                final_counts: counts,
                processing_time_ms: 0,
                created_at: Utc::now(),
            },
            optimization: None,
            target_model: None,
            document,
        }
    }

    /// Same context over a transformed document estimated at `tokens`.
    #[must_use]
    pub fn with_document(&self, document: SpecDocument, tokens: usize) -> Self {
        let graph = RelationshipGraph::for_document(&document);
        let (relationships, dependencies) = relationship_maps(&graph);
        let mut metrics = self.metrics.clone();
        metrics.final_tokens = tokens;
        metrics.final_counts = document.element_counts();
        Self {
            id: self.id.clone(),
            document,
            relationships,
            dependencies,
            original_relationships: self.original_relationships.clone(),
            metrics,
            optimization: self.optimization.clone(),
            target_model: self.target_model.clone(),
        }
    }

    /// Whether the last optimization pass changed anything.
    pub fn is_optimized(&self) -> bool {
        self.optimization.as_ref().is_some_and(|o| o.applied)
    }
}

fn relationship_maps(
    graph: &RelationshipGraph,
) -> (BTreeMap<String, BTreeSet<String>>, BTreeMap<String, BTreeSet<String>>) {
    let mut relationships: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut dependencies: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for edge in graph.edges() {
        if graph.contains(&edge.target_id) {
            let _ = relationships
                .entry(edge.source_id.clone())
                .or_default()
                .insert(edge.target_id.clone());
        }
        if edge.kind == EdgeKind::Dependency {
            let _ = dependencies
                .entry(edge.source_id.clone())
                .or_default()
                .insert(edge.target_id.clone());
        }
    }
    (relationships, dependencies)
}

// =============================================================================
// Scores
// =============================================================================

/// Preservation score from element counts before and after a transformation.
///
/// Starts at [`Preservation::BASE`] and adds a bonus for each of rules,
/// structures and endpoints whose retained fraction reaches its threshold. A
/// kind with no original elements counts as fully retained.
pub fn preservation_score(
    original: &BTreeMap<ElementKind, usize>,
    current: &BTreeMap<ElementKind, usize>,
) -> f64 {
    let retained = |kind: ElementKind| {
        let before = original.get(&kind).copied().unwrap_or(0);
        if before == 0 {
            return 1.0;
        }
        let after = current.get(&kind).copied().unwrap_or(0);
        #[allow(clippy::cast_precision_loss)]
        let ratio = after as f64 / before as f64;
        ratio
    };

    let mut score = Preservation::BASE;
    if retained(ElementKind::BusinessRules) >= Preservation::RULES_MIN {
        score += Preservation::RULES_BONUS;
    }
    if retained(ElementKind::DataStructures) >= Preservation::STRUCTURES_MIN {
        score += Preservation::STRUCTURES_BONUS;
    }
    if retained(ElementKind::ApiEndpoints) >= Preservation::ENDPOINTS_MIN {
        score += Preservation::ENDPOINTS_BONUS;
    }
    score.min(1.0)
}

/// Quality report for a context.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextAnalysis {
    /// Preservation score of the current element counts.
    pub quality_score: f64,
    /// `1 - final/original` tokens, never negative.
    pub token_efficiency: f64,
    /// Fraction of original edges whose endpoints both remain.
    pub relationship_preservation: f64,
    /// Actionable hints for scores under the configured thresholds.
    pub suggestions: Vec<String>,
}

/// Score `context` and suggest changes where it falls short of `thresholds`.
pub fn analyze(context: &ProcessingContext, thresholds: &AnalysisThresholds) -> ContextAnalysis {
    let metrics = &context.metrics;
    let quality_score = preservation_score(&metrics.original_counts, &metrics.final_counts);

    let token_efficiency = if metrics.original_tokens == 0 {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        let ratio = metrics.final_tokens as f64 / metrics.original_tokens as f64;
        (1.0 - ratio).max(0.0)
    };

    let relationship_preservation = if context.original_relationships.is_empty() {
        1.0
    } else {
        let present: BTreeSet<&str> = context.document.all_element_ids().into_iter().collect();
        let kept = context
            .original_relationships
            .iter()
            .filter(|e| present.contains(e.source_id.as_str()) && present.contains(e.target_id.as_str()))
            .count();
        #[allow(clippy::cast_precision_loss)]
        let fraction = kept as f64 / context.original_relationships.len() as f64;
        fraction
    };

    let mut suggestions = Vec::new();
    if quality_score < thresholds.min_quality {
        suggestions.push(format!(
            "quality score {quality_score:.2} is below {:.2}: try a different chunking strategy or a lower compression level",
            thresholds.min_quality
        ));
    }
    if context.is_optimized() && token_efficiency < thresholds.min_token_efficiency {
        suggestions.push(format!(
            "token efficiency {token_efficiency:.2} is below {:.2}: raise the compression level or lower max_tokens",
            thresholds.min_token_efficiency
        ));
    }
    if relationship_preservation < thresholds.min_relationship_preservation {
        suggestions.push(format!(
            "relationship preservation {relationship_preservation:.2} is below {:.2}: enable preserve_relationships or raise max_chunk_size",
            thresholds.min_relationship_preservation
        ));
    }

    ContextAnalysis {
        quality_score,
        token_efficiency,
        relationship_preservation,
        suggestions,
    }
}

// =============================================================================
// Tests
// =============================================================================
