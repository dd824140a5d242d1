//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may hold any subset of fields; missing fields keep their compiled
//! default.

mod chunking;
mod optimizer;
mod scoring;

pub use chunking::*;
pub use optimizer::*;
pub use scoring::*;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "chunking": { "defaultChunkSize": 6 },
///   "optimizer": { "defaultModel": "claude-3" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SpecweaveSettings {
    /// Settings schema version.
    pub version: String,
    /// Fragment sizing and strategy defaults.
    pub chunking: ChunkingSettings,
    /// Fragment quality heuristic weights.
    pub scoring: ScoringSettings,
    /// Element-count thresholds for the adaptive strategy.
    pub adaptive: AdaptiveThresholds,
    /// Compression pipeline settings.
    pub optimizer: OptimizerSettings,
    /// Context manager cache settings.
    pub cache: CacheSettings,
    /// Thresholds below which context analysis emits suggestions.
    pub analysis: AnalysisThresholds,
    /// Logging settings for embedding applications.
    pub logging: LoggingSettings,
}

impl Default for SpecweaveSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            chunking: ChunkingSettings::default(),
            scoring: ScoringSettings::default(),
            adaptive: AdaptiveThresholds::default(),
            optimizer: OptimizerSettings::default(),
            cache: CacheSettings::default(),
            analysis: AnalysisThresholds::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl SpecweaveSettings {
    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.default_chunk_size == 0 {
            return Err(SettingsError::InvalidValue(
                "chunking.defaultChunkSize must be > 0".into(),
            ));
        }
        if self.chunking.fragment_token_budget == 0 {
            return Err(SettingsError::InvalidValue(
                "chunking.fragmentTokenBudget must be > 0".into(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(SettingsError::InvalidValue("cache.maxEntries must be > 0".into()));
        }
        self.scoring.validate()?;
        for (name, value) in [
            ("analysis.minQuality", self.analysis.min_quality),
            ("analysis.minTokenEfficiency", self.analysis.min_token_efficiency),
            (
                "analysis.minRelationshipPreservation",
                self.analysis.min_relationship_preservation,
            ),
        ] {
            ensure_unit_interval(name, value)?;
        }
        Ok(())
    }
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

pub(crate) fn ensure_unit_interval(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::InvalidValue(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn partial_json_keeps_defaults() {
        let json = serde_json::json!({"chunking": {"defaultChunkSize": 3}});
        let settings: SpecweaveSettings = serde_json::from_value(json).unwrap();
        assert_eq!(settings.chunking.default_chunk_size, 3);
        assert_eq!(settings.chunking.fragment_token_budget, 4_000);
        assert_eq!(settings.cache.max_entries, 100);
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let mut settings = SpecweaveSettings::default();
        settings.chunking.default_chunk_size = 0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut settings = SpecweaveSettings::default();
        settings.analysis.min_quality = 1.5;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("analysis.minQuality"));
    }
}
