//! Character-ratio token estimation.
//!
//! ## Formula
//!
//! `tokens = ceil(serialized_json_len / chars_per_token)`
//!
//! Always rounds up so a caller is never promised more budget than exists.

use serde::Serialize;

use crate::errors::{Result, TokenError};
use crate::profiles::ModelProfile;

/// Ratio used when no model profile is known.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 4.0;

/// Estimates token counts from serialized length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TokenEstimator {
    chars_per_token: f64,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }
}

impl TokenEstimator {
    /// Estimator with an explicit chars-per-token ratio.
    pub fn new(chars_per_token: f64) -> Result<Self> {
        if chars_per_token.is_finite() && chars_per_token > 0.0 {
            Ok(Self { chars_per_token })
        } else {
            Err(TokenError::InvalidRatio(chars_per_token))
        }
    }

    /// Estimator using a profile's ratio.
    ///
    /// Registered profiles are validated, so the ratio is always usable.
    pub fn for_profile(profile: &ModelProfile) -> Self {
        Self::new(profile.token_ratio).unwrap_or_default()
    }

    /// Chars-per-token ratio in use.
    #[must_use]
    pub fn ratio(&self) -> f64 {
        self.chars_per_token
    }

    /// Tokens for `len` characters of serialized content.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn estimate_len(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        (len as f64 / self.chars_per_token).ceil() as usize
    }

    /// Tokens for the compact JSON serialization of `value`.
    pub fn estimate<T: Serialize + ?Sized>(&self, value: &T) -> Result<usize> {
        let json = serde_json::to_string(value)?;
        Ok(self.estimate_len(json.len()))
    }

    /// Tokens for already-rendered text.
    #[must_use]
    pub fn estimate_text(&self, text: &str) -> usize {
        self.estimate_len(text.len())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn rounds_up() {
        let est = TokenEstimator::default();
        assert_eq!(est.estimate_len(0), 0);
        assert_eq!(est.estimate_len(1), 1);
        assert_eq!(est.estimate_len(4), 1);
        assert_eq!(est.estimate_len(5), 2);
        assert_eq!(est.estimate_len(400), 100);
    }

    #[test]
    fn fractional_ratio_rounds_up() {
        let est = TokenEstimator::new(3.5).unwrap();
        assert_eq!(est.estimate_len(7), 2);
        assert_eq!(est.estimate_len(8), 3);
    }

    #[test]
    fn estimate_uses_compact_json() {
        let est = TokenEstimator::default();
        // {"a":1} is 7 characters.
        assert_eq!(est.estimate(&serde_json::json!({"a": 1})).unwrap(), 2);
        assert_eq!(est.estimate_text("abcdefgh"), 2);
    }

    #[test]
    fn rejects_non_positive_ratio() {
        assert_matches!(TokenEstimator::new(0.0), Err(TokenError::InvalidRatio(_)));
        assert_matches!(TokenEstimator::new(-1.0), Err(TokenError::InvalidRatio(_)));
        assert_matches!(TokenEstimator::new(f64::NAN), Err(TokenError::InvalidRatio(_)));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn estimate_never_undercounts(len in 0usize..1_000_000, ratio in 1.0f64..8.0) {
                let est = TokenEstimator::new(ratio).unwrap();
                let tokens = est.estimate_len(len);
                #[allow(clippy::cast_precision_loss)]
                let covered = tokens as f64 * ratio;
                prop_assert!(covered + 1e-6 >= len as f64);
            }

            #[test]
            fn estimate_is_monotone(a in 0usize..100_000, b in 0usize..100_000) {
                let est = TokenEstimator::default();
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                prop_assert!(est.estimate_len(lo) <= est.estimate_len(hi));
            }
        }
    }
}
