//! Context optimizer: fits documents into a model's token budget.
//!
//! ## Pipeline
//!
//! `optimize_context` leaves a context alone when it already fits. Otherwise
//! it runs the techniques of the chosen [`CompressionLevel`] in order,
//! re-estimating after each one and stopping as soon as the budget holds.
//! Techniques the target model does not support are skipped. Running out of
//! techniques above budget is not an error: the record is flagged
//! `exceeds_budget` instead.

mod pipeline;

pub use pipeline::techniques_for;

use serde::{Deserialize, Serialize};
use specweave_core::{CompressionLevel, SpecDocument};
use specweave_settings::OptimizerSettings;
use specweave_tokens::{CompressionTechnique, ModelProfile, ModelRegistry, TokenEstimator};
use tracing::{debug, info, warn};

use crate::constants::{REDUNDANCY_REMOVAL_ABOVE, SEMANTIC_COMPRESSION_ABOVE};
use crate::context::{OptimizationRecord, OptimizationStep, ProcessingContext, preservation_score};
use crate::errors::{ContextError, Result};

// =============================================================================
// Types
// =============================================================================

/// Caller overrides for one optimization pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OptimizationOptions {
    /// Token budget (the model's `max_tokens` when absent).
    pub max_tokens: Option<usize>,
    /// Target model (the context's model, then the configured default, when absent).
    pub model: Option<String>,
    /// Compression level (configured default when absent).
    pub compression_level: Option<CompressionLevel>,
}

/// Outcome of [`ContextOptimizer::compress_content`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionResult {
    /// Compressed document.
    pub document: SpecDocument,
    /// Technique applied.
    pub technique: CompressionTechnique,
    /// Tokens before.
    pub original_tokens: usize,
    /// Tokens after.
    pub compressed_tokens: usize,
    /// `compressed / original`, clamped to `[0, 1]`.
    pub compression_ratio: f64,
    /// Top-level groups still present.
    pub preserved: Vec<String>,
    /// Top-level groups emptied by the technique.
    pub removed: Vec<String>,
}

/// Before/after comparison of two documents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationMetrics {
    /// Tokens before.
    pub original_tokens: usize,
    /// Tokens after.
    pub optimized_tokens: usize,
    /// `optimized / original`, clamped to `[0, 1]`.
    pub compression_ratio: f64,
    /// Tokens saved (never negative).
    pub token_savings: usize,
    /// Preservation score of the element counts.
    pub semantic_preservation: f64,
}

// =============================================================================
// ContextOptimizer
// =============================================================================

/// Budget-fitting and model shaping over immutable contexts.
#[derive(Clone, Debug, Default)]
pub struct ContextOptimizer {
    registry: ModelRegistry,
    settings: OptimizerSettings,
}

impl ContextOptimizer {
    /// Optimizer over `registry` with `settings`.
    pub fn new(registry: ModelRegistry, settings: OptimizerSettings) -> Self {
        Self { registry, settings }
    }

    /// Model profiles known to this optimizer.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Optimizer settings in use.
    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    /// Profile for `model`, or for the configured default model.
    ///
    /// Unknown names resolve to the fallback profile with a warning.
    pub fn profile(&self, model: Option<&str>) -> &ModelProfile {
        self.registry
            .get_or_default(model.unwrap_or(&self.settings.default_model))
    }

    /// Estimated tokens of `content` for `model`; the default ratio when `None`.
    pub fn estimate_tokens<T: Serialize + ?Sized>(
        &self,
        content: &T,
        model: Option<&str>,
    ) -> Result<usize> {
        let estimator = match model {
            Some(name) => TokenEstimator::for_profile(self.registry.get_or_default(name)),
            None => TokenEstimator::default(),
        };
        Ok(estimator.estimate(content)?)
    }

    /// Fit `context` into its token budget.
    pub fn optimize_context(
        &self,
        context: &ProcessingContext,
        options: &OptimizationOptions,
    ) -> Result<ProcessingContext> {
        let profile = self.profile(options.model.as_deref().or(context.target_model.as_deref()));
        let estimator = TokenEstimator::for_profile(profile);
        let budget = options.max_tokens.unwrap_or(profile.max_tokens);
        let level = options
            .compression_level
            .unwrap_or(self.settings.compression_level);
        let original_tokens = estimator.estimate(&context.document)?;

        let mut record = OptimizationRecord {
            applied: false,
            target_tokens: budget,
            original_tokens,
            final_tokens: original_tokens,
            techniques_used: Vec::new(),
            steps: Vec::new(),
            exceeds_budget: false,
        };
        if original_tokens <= budget {
            debug!(context_id = %context.id, tokens = original_tokens, budget, "context within budget");
            let mut unchanged = context.with_document(context.document.clone(), original_tokens);
            unchanged.optimization = Some(record);
            return Ok(unchanged);
        }

        let mut document = context.document.clone();
        let mut tokens = original_tokens;
        for &technique in techniques_for(level) {
            if !profile.supports(technique) {
                debug!(model = %profile.name, %technique, "technique not supported, skipping");
                continue;
            }
            let outcome = pipeline::apply(technique, &document, &self.settings);
            document = outcome.document;
            tokens = estimator.estimate(&document)?;
            record.techniques_used.push(technique);
            record.steps.push(OptimizationStep {
                technique,
                removed: outcome.removed,
                preserved: pipeline::present_groups(&document),
                tokens_after: tokens,
            });
            if tokens <= budget {
                break;
            }
        }

        record.applied = !record.steps.is_empty();
        record.final_tokens = tokens;
        record.exceeds_budget = tokens > budget;
        if record.exceeds_budget {
            warn!(
                context_id = %context.id,
                tokens,
                budget,
                level = ?level,
                "compression pipeline exhausted above budget"
            );
        } else {
            info!(
                context_id = %context.id,
                original_tokens,
                final_tokens = tokens,
                steps = record.steps.len(),
                "context optimized"
            );
        }

        let mut optimized = context.with_document(document, tokens);
        optimized.optimization = Some(record);
        optimized.target_model = Some(profile.name.clone());
        Ok(optimized)
    }

    /// Single-technique compression picked by `target_ratio`.
    ///
    /// Above 0.5 strips every free-text annotation, above 0.3 removes
    /// redundancy, otherwise prunes tags and optional-field annotations.
    pub fn compress_content(
        &self,
        document: &SpecDocument,
        target_ratio: f64,
    ) -> Result<CompressionResult> {
        if !target_ratio.is_finite() {
            return Err(ContextError::InvalidInput(format!(
                "target ratio must be finite, got {target_ratio}"
            )));
        }
        let technique = if target_ratio > SEMANTIC_COMPRESSION_ABOVE {
            CompressionTechnique::SemanticCompression
        } else if target_ratio > REDUNDANCY_REMOVAL_ABOVE {
            CompressionTechnique::RedundancyRemoval
        } else {
            CompressionTechnique::FieldPrioritization
        };

        let estimator = TokenEstimator::for_profile(self.profile(None));
        let original_tokens = estimator.estimate(document)?;
        let outcome = pipeline::apply(technique, document, &self.settings);
        let compressed_tokens = estimator.estimate(&outcome.document)?;
        let (preserved, removed) = pipeline::group_delta(document, &outcome.document);
        debug!(%technique, original_tokens, compressed_tokens, "content compressed");

        Ok(CompressionResult {
            technique,
            original_tokens,
            compressed_tokens,
            compression_ratio: ratio(compressed_tokens, original_tokens),
            preserved,
            removed,
            document: outcome.document,
        })
    }

    /// Re-shape `context` for `model`'s preferred density.
    pub fn optimize_for_model(
        &self,
        context: &ProcessingContext,
        model: &str,
    ) -> Result<ProcessingContext> {
        let profile = self.registry.get_or_default(model);
        let document = pipeline::reshape(&context.document, profile.preferred_density);
        let tokens = TokenEstimator::for_profile(profile).estimate(&document)?;
        debug!(
            context_id = %context.id,
            model = %profile.name,
            density = ?profile.preferred_density,
            tokens,
            "context shaped for model"
        );
        let mut shaped = context.with_document(document, tokens);
        shaped.target_model = Some(profile.name.clone());
        Ok(shaped)
    }

    /// Compare two versions of a document.
    pub fn measure_optimization(
        &self,
        before: &SpecDocument,
        after: &SpecDocument,
    ) -> Result<OptimizationMetrics> {
        let original_tokens = self.estimate_tokens(before, None)?;
        let optimized_tokens = self.estimate_tokens(after, None)?;
        Ok(OptimizationMetrics {
            original_tokens,
            optimized_tokens,
            compression_ratio: ratio(optimized_tokens, original_tokens),
            token_savings: original_tokens.saturating_sub(optimized_tokens),
            semantic_preservation: preservation_score(
                &before.element_counts(),
                &after.element_counts(),
            ),
        })
    }
}

/// `part / whole` clamped to `[0, 1]`; 1 for an empty whole.
fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let r = part as f64 / whole as f64;
    r.clamp(0.0, 1.0)
}

// =============================================================================
// Tests
// =============================================================================
