//! Fragment quality heuristic weights.
//!
//! A fragment scores [`DEFAULT_BASE_SCORE`], plus [`DEFAULT_SELF_CONTAINED_BONUS`]
//! when none of its edges leave it, plus [`DEFAULT_BALANCED_BONUS`] when its
//! element count is inside the kind's balanced range, capped at 1.0.

use serde::{Deserialize, Serialize};
use specweave_core::ElementKind;

use super::ensure_unit_interval;
use crate::errors::{Result, SettingsError};

/// Score every fragment starts from.
pub const DEFAULT_BASE_SCORE: f64 = 0.5;
/// Bonus when the fragment has no outgoing edges.
pub const DEFAULT_SELF_CONTAINED_BONUS: f64 = 0.3;
/// Bonus when the element count is in the balanced range.
pub const DEFAULT_BALANCED_BONUS: f64 = 0.2;
/// Mean quality below which validation warns.
pub const DEFAULT_MIN_AVERAGE_QUALITY: f64 = 0.7;

/// Inclusive element-count range considered balanced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancedRange {
    /// Smallest balanced count.
    pub min: usize,
    /// Largest balanced count.
    pub max: usize,
}

impl BalancedRange {
    /// Whether `count` lies within the range.
    pub fn contains(&self, count: usize) -> bool {
        (self.min..=self.max).contains(&count)
    }
}

/// Balanced ranges per element kind.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BalancedRanges {
    /// Business rules (default 3–8).
    pub business_rules: BalancedRange,
    /// Data structures (default 2–10).
    pub data_structures: BalancedRange,
    /// API endpoints (default 2–10).
    pub api_endpoints: BalancedRange,
    /// Workflow steps (default 2–8).
    pub workflow_steps: BalancedRange,
}

impl Default for BalancedRanges {
    fn default() -> Self {
        Self {
            business_rules: BalancedRange { min: 3, max: 8 },
            data_structures: BalancedRange { min: 2, max: 10 },
            api_endpoints: BalancedRange { min: 2, max: 10 },
            workflow_steps: BalancedRange { min: 2, max: 8 },
        }
    }
}

impl BalancedRanges {
    /// Range for `kind`.
    pub fn for_kind(&self, kind: ElementKind) -> BalancedRange {
        match kind {
            ElementKind::BusinessRules => self.business_rules,
            ElementKind::DataStructures => self.data_structures,
            ElementKind::ApiEndpoints => self.api_endpoints,
            ElementKind::WorkflowSteps => self.workflow_steps,
        }
    }
}

/// Quality heuristic configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringSettings {
    /// Starting score.
    pub base_score: f64,
    /// Bonus for fragments whose edges are all internal.
    pub self_contained_bonus: f64,
    /// Bonus for fragments of balanced size.
    pub balanced_bonus: f64,
    /// Mean quality below which validation emits a warning.
    pub min_average_quality: f64,
    /// Balanced ranges per kind.
    pub balanced_ranges: BalancedRanges,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        Self {
            base_score: DEFAULT_BASE_SCORE,
            self_contained_bonus: DEFAULT_SELF_CONTAINED_BONUS,
            balanced_bonus: DEFAULT_BALANCED_BONUS,
            min_average_quality: DEFAULT_MIN_AVERAGE_QUALITY,
            balanced_ranges: BalancedRanges::default(),
        }
    }
}

impl ScoringSettings {
    pub(crate) fn validate(&self) -> Result<()> {
        ensure_unit_interval("scoring.baseScore", self.base_score)?;
        ensure_unit_interval("scoring.selfContainedBonus", self.self_contained_bonus)?;
        ensure_unit_interval("scoring.balancedBonus", self.balanced_bonus)?;
        ensure_unit_interval("scoring.minAverageQuality", self.min_average_quality)?;
        for kind in ElementKind::ALL {
            let range = self.balanced_ranges.for_kind(kind);
            if range.min > range.max {
                return Err(SettingsError::InvalidValue(format!(
                    "scoring.balancedRanges.{kind}: min {} > max {}",
                    range.min, range.max
                )));
            }
        }
        Ok(())
    }
}
