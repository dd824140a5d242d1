//! # Model Profiles
//!
//! Static per-model configuration: token budget, chars-per-token ratio and
//! preferred serialization density. Values are tunable defaults, not
//! vendor-exact limits.
//!
//! A [`ModelRegistry`] starts with the built-in table; callers may register
//! extra profiles before handing it to a context manager. Nothing is persisted.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use specweave_core::Density;
use tracing::warn;

use crate::errors::{Result, TokenError};
use crate::estimator::DEFAULT_CHARS_PER_TOKEN;

/// Name of the profile used for unknown models.
pub const DEFAULT_PROFILE_NAME: &str = "default";

/// A compression technique the optimizer can apply.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionTechnique {
    /// Drop free-form tags and document metadata.
    FieldPruning,
    /// Drop per-element examples and notes.
    AnnotationPruning,
    /// Drop descriptions that repeat the element name, and duplicate ids.
    RedundancyRemoval,
    /// Drop business rules below the priority threshold.
    PriorityFiltering,
    /// Keep only the top elements of each kind.
    StructuralOptimization,
    /// Drop every free-text field that is not the element's contract.
    SemanticCompression,
    /// Drop tags and optional-field annotations, listing required fields first.
    FieldPrioritization,
}

impl CompressionTechnique {
    /// Every technique, in pipeline order.
    pub const ALL: [Self; 7] = [
        Self::FieldPruning,
        Self::AnnotationPruning,
        Self::RedundancyRemoval,
        Self::PriorityFiltering,
        Self::StructuralOptimization,
        Self::SemanticCompression,
        Self::FieldPrioritization,
    ];

    /// Wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FieldPruning => "field_pruning",
            Self::AnnotationPruning => "annotation_pruning",
            Self::RedundancyRemoval => "redundancy_removal",
            Self::PriorityFiltering => "priority_filtering",
            Self::StructuralOptimization => "structural_optimization",
            Self::SemanticCompression => "semantic_compression",
            Self::FieldPrioritization => "field_prioritization",
        }
    }
}

impl std::fmt::Display for CompressionTechnique {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-model budgeting configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelProfile {
    /// Model name used for lookup.
    pub name: String,
    /// Context window budget in tokens.
    pub max_tokens: usize,
    /// Approximate characters per token.
    pub token_ratio: f64,
    /// Serialization density the model prefers.
    pub preferred_density: Density,
    /// Techniques the optimizer may use for this model.
    pub supported_techniques: Vec<CompressionTechnique>,
}

impl ModelProfile {
    /// Profile supporting every technique.
    pub fn new(
        name: impl Into<String>,
        max_tokens: usize,
        token_ratio: f64,
        preferred_density: Density,
    ) -> Self {
        Self {
            name: name.into(),
            max_tokens,
            token_ratio,
            preferred_density,
            supported_techniques: CompressionTechnique::ALL.to_vec(),
        }
    }

    /// Fallback profile for unknown models.
    pub fn fallback() -> Self {
        Self::new(DEFAULT_PROFILE_NAME, 8_000, DEFAULT_CHARS_PER_TOKEN, Density::Structured)
    }

    /// Whether the optimizer may apply `technique` for this model.
    pub fn supports(&self, technique: CompressionTechnique) -> bool {
        self.supported_techniques.contains(&technique)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| TokenError::InvalidProfile {
            name: self.name.clone(),
            reason: reason.to_string(),
        };
        if self.name.is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.max_tokens == 0 {
            return Err(invalid("max_tokens must be > 0"));
        }
        if !(self.token_ratio.is_finite() && self.token_ratio > 0.0) {
            return Err(TokenError::InvalidRatio(self.token_ratio));
        }
        Ok(())
    }
}

fn builtin_profiles() -> Vec<ModelProfile> {
    vec![
        ModelProfile::new("gpt-4", 8_192, 4.0, Density::Structured),
        ModelProfile::new("gpt-4-turbo", 128_000, 4.0, Density::Compact),
        ModelProfile::new("gpt-3.5-turbo", 16_385, 4.0, Density::Compact),
        ModelProfile::new("claude-2", 100_000, 3.5, Density::Verbose),
        ModelProfile::new("claude-3", 200_000, 3.5, Density::Verbose),
    ]
}

/// Name → profile lookup table.
#[derive(Clone, Debug)]
pub struct ModelRegistry {
    profiles: HashMap<String, ModelProfile>,
    fallback: ModelProfile,
}

impl Default for ModelRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl ModelRegistry {
    /// Registry holding only the fallback profile.
    pub fn empty() -> Self {
        Self {
            profiles: HashMap::new(),
            fallback: ModelProfile::fallback(),
        }
    }

    /// Registry preloaded with the built-in table.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        for profile in builtin_profiles() {
            let _ = registry.profiles.insert(profile.name.clone(), profile);
        }
        registry
    }

    /// Add or replace a profile. Returns the previous profile of that name.
    pub fn register(&mut self, profile: ModelProfile) -> Result<Option<ModelProfile>> {
        profile.validate()?;
        Ok(self.profiles.insert(profile.name.clone(), profile))
    }

    /// Exact lookup.
    pub fn get(&self, name: &str) -> Option<&ModelProfile> {
        self.profiles.get(name)
    }

    /// Lookup falling back to the default profile (with a warning).
    pub fn get_or_default(&self, name: &str) -> &ModelProfile {
        self.profiles.get(name).unwrap_or_else(|| {
            warn!(model = name, fallback = DEFAULT_PROFILE_NAME, "unknown model, using default profile");
            &self.fallback
        })
    }

    /// Profile used for unknown models.
    pub fn fallback(&self) -> &ModelProfile {
        &self.fallback
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered profiles (the fallback is not counted).
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Whether no profile is registered.
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
