//! Context pipeline constants.
//!
//! Edge strengths, preservation thresholds and compression cut-offs. Scoring
//! weights and size policies are configuration and live in
//! `specweave_settings`.

// =============================================================================
// Relationship strengths
// =============================================================================

/// A rule's condition or action mentions another rule, or a step depends on another.
pub const STRENGTH_DEPENDENCY: f64 = 1.0;

/// A rule declares an exception to another rule.
pub const STRENGTH_EXCEPTION: f64 = 0.9;

/// A field or endpoint body references a structure.
pub const STRENGTH_REFERENCE: f64 = 0.8;

/// A field's type is another structure.
pub const STRENGTH_COMPOSITION: f64 = 0.7;

/// Two endpoints share their first path segment.
pub const STRENGTH_SHARED_PATH: f64 = 0.5;

// =============================================================================
// Semantic preservation
// =============================================================================

/// Weights and per-kind retention thresholds of the preservation score.
///
/// `score = BASE + RULES_BONUS·[rules ≥ RULES_MIN] + STRUCTURES_BONUS·[structures ≥ STRUCTURES_MIN]
/// + ENDPOINTS_BONUS·[endpoints ≥ ENDPOINTS_MIN]`, where each ratio is the
/// fraction of the original elements of that kind still present.
pub struct Preservation;

impl Preservation {
    /// Score with nothing retained.
    pub const BASE: f64 = 0.5;
    /// Bonus when enough business rules remain.
    pub const RULES_BONUS: f64 = 0.2;
    /// Fraction of business rules that must remain.
    pub const RULES_MIN: f64 = 0.8;
    /// Bonus when enough data structures remain.
    pub const STRUCTURES_BONUS: f64 = 0.2;
    /// Fraction of data structures that must remain.
    pub const STRUCTURES_MIN: f64 = 0.9;
    /// Bonus when enough endpoints remain.
    pub const ENDPOINTS_BONUS: f64 = 0.1;
    /// Fraction of endpoints that must remain.
    pub const ENDPOINTS_MIN: f64 = 0.85;
}

// =============================================================================
// Single-shot compression
// =============================================================================

/// Target ratios above this use semantic compression.
pub const SEMANTIC_COMPRESSION_ABOVE: f64 = 0.5;

/// Target ratios above this (and not above the semantic cut-off) use redundancy removal.
pub const REDUNDANCY_REMOVAL_ABOVE: f64 = 0.3;

// =============================================================================
// Cache
// =============================================================================

/// Cache key namespace for whole-document contexts.
pub const CACHE_OP_CONTEXT: &str = "context";

/// Cache key namespace for fragment lists.
pub const CACHE_OP_CHUNKS: &str = "chunks";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strengths_are_ordered() {
        assert!(STRENGTH_DEPENDENCY > STRENGTH_EXCEPTION);
        assert!(STRENGTH_EXCEPTION > STRENGTH_REFERENCE);
        assert!(STRENGTH_REFERENCE > STRENGTH_COMPOSITION);
        assert!(STRENGTH_COMPOSITION > STRENGTH_SHARED_PATH);
    }

    #[test]
    fn full_preservation_scores_one() {
        let total = Preservation::BASE
            + Preservation::RULES_BONUS
            + Preservation::STRUCTURES_BONUS
            + Preservation::ENDPOINTS_BONUS;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn compression_cutoffs_are_ordered() {
        assert!(SEMANTIC_COMPRESSION_ABOVE > REDUNDANCY_REMOVAL_ABOVE);
    }
}
