//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SpecweaveSettings::default()`]
//! 2. If `~/.specweave/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `SPECWEAVE_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use specweave_core::CompressionLevel;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::SpecweaveSettings;

/// Resolve the path to the settings file (`~/.specweave/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".specweave").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SpecweaveSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. Invalid JSON or values that
/// fail [`SpecweaveSettings::validate`] are errors.
pub fn load_settings_from_path(path: &Path) -> Result<SpecweaveSettings> {
    let defaults = serde_json::to_value(SpecweaveSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SpecweaveSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `SPECWEAVE_*` environment variable overrides.
pub fn apply_env_overrides(settings: &mut SpecweaveSettings) {
    apply_overrides_with(settings, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup` instead of the process environment.
///
/// Invalid values are ignored with a warning and the file/default value is
/// kept. Integers must parse and fall within the documented range; booleans
/// accept `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn apply_overrides_with<F>(settings: &mut SpecweaveSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Chunking ────────────────────────────────────────────────────
    if let Some(v) = env.usize("SPECWEAVE_CHUNK_SIZE", 1, 10_000) {
        settings.chunking.default_chunk_size = v;
    }
    if let Some(v) = env.usize("SPECWEAVE_TOKEN_BUDGET", 1, 10_000_000) {
        settings.chunking.fragment_token_budget = v;
    }
    if let Some(v) = env.usize("SPECWEAVE_OVERLAP", 0, 1_000_000) {
        settings.chunking.default_overlap = v;
    }

    // ── Optimizer ───────────────────────────────────────────────────
    if let Some(v) = env.string("SPECWEAVE_DEFAULT_MODEL") {
        settings.optimizer.default_model = v;
    }
    if let Some(v) = env.string("SPECWEAVE_COMPRESSION_LEVEL") {
        match v.parse::<CompressionLevel>() {
            Ok(level) => settings.optimizer.compression_level = level,
            Err(_) => {
                warn!(key = "SPECWEAVE_COMPRESSION_LEVEL", value = %v, "invalid compression level env var, ignoring");
            }
        }
    }

    // ── Cache ───────────────────────────────────────────────────────
    if let Some(v) = env.bool("SPECWEAVE_CACHE_ENABLED") {
        settings.cache.enabled = v;
    }
    if let Some(v) = env.usize("SPECWEAVE_CACHE_MAX_ENTRIES", 1, 1_000_000) {
        settings.cache.max_entries = v;
    }
    if let Some(v) = env.u64("SPECWEAVE_CACHE_TTL_SECS", 1, 30 * 24 * 60 * 60) {
        settings.cache.ttl_secs = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("SPECWEAVE_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within an inclusive range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within an inclusive range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"chunking": {"defaultChunkSize": 8, "defaultOverlap": 0}});
        let source = serde_json::json!({"chunking": {"defaultChunkSize": 4}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["chunking"]["defaultChunkSize"], 4);
        assert_eq!(merged["chunking"]["defaultOverlap"], 0);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        assert_eq!(deep_merge(target, source)["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1, "b": 2});
        let source = serde_json::json!({"a": null});
        let merged = deep_merge(target, source);
        assert_eq!(merged["a"], 1);
        assert_eq!(merged["b"], 2);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = load_settings_from_path(&dir.path().join("missing.json")).unwrap();
        assert_eq!(settings.chunking.default_chunk_size, 8);
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"chunking": {"defaultChunkSize": 5}, "scoring": {"balancedRanges": {"workflowSteps": {"min": 1, "max": 4}}}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.chunking.default_chunk_size, 5);
        assert_eq!(settings.chunking.fragment_token_budget, 4_000);
        assert_eq!(settings.scoring.balanced_ranges.workflow_steps.max, 4);
        assert_eq!(settings.scoring.balanced_ranges.business_rules.min, 3);
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert_matches!(load_settings_from_path(&path), Err(SettingsError::Json(_)));
    }

    #[test]
    fn load_invalid_value_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"scoring": {"baseScore": 2.0}}"#).unwrap();
        assert_matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        );
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn overrides_apply_valid_values() {
        let mut settings = SpecweaveSettings::default();
        apply_overrides_with(
            &mut settings,
            lookup_from(&[
                ("SPECWEAVE_CHUNK_SIZE", "3"),
                ("SPECWEAVE_TOKEN_BUDGET", "1200"),
                ("SPECWEAVE_DEFAULT_MODEL", "claude-3"),
                ("SPECWEAVE_COMPRESSION_LEVEL", "high"),
                ("SPECWEAVE_CACHE_ENABLED", "off"),
                ("SPECWEAVE_CACHE_TTL_SECS", "60"),
            ]),
        );
        assert_eq!(settings.chunking.default_chunk_size, 3);
        assert_eq!(settings.chunking.fragment_token_budget, 1_200);
        assert_eq!(settings.optimizer.default_model, "claude-3");
        assert_eq!(settings.optimizer.compression_level, CompressionLevel::High);
        assert!(!settings.cache.enabled);
        assert_eq!(settings.cache.ttl_secs, 60);
    }

    #[test]
    fn overrides_ignore_invalid_values() {
        let mut settings = SpecweaveSettings::default();
        apply_overrides_with(
            &mut settings,
            lookup_from(&[
                ("SPECWEAVE_CHUNK_SIZE", "0"),
                ("SPECWEAVE_CACHE_ENABLED", "maybe"),
                ("SPECWEAVE_COMPRESSION_LEVEL", "extreme"),
                ("SPECWEAVE_DEFAULT_MODEL", ""),
            ]),
        );
        assert_eq!(settings.chunking.default_chunk_size, 8);
        assert!(settings.cache.enabled);
        assert_eq!(settings.optimizer.compression_level, CompressionLevel::Medium);
        assert_eq!(settings.optimizer.default_model, "gpt-4");
    }

    #[test]
    fn invalid_override_is_logged() {
        let (logs, _guard) = specweave_core::logging::capture_logs();
        let mut settings = SpecweaveSettings::default();
        apply_overrides_with(&mut settings, lookup_from(&[("SPECWEAVE_OVERLAP", "lots")]));
        assert!(logs.has_event(tracing::Level::WARN, "invalid usize env var"));
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for v in ["true", "TRUE", "1", "yes", "on"] {
            assert_eq!(parse_bool(v), Some(true), "{v}");
        }
        for v in ["false", "0", "No", "off"] {
            assert_eq!(parse_bool(v), Some(false), "{v}");
        }
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn parse_ranges() {
        assert_eq!(parse_usize_range("5", 1, 10), Some(5));
        assert_eq!(parse_usize_range("11", 1, 10), None);
        assert_eq!(parse_usize_range("-1", 0, 10), None);
        assert_eq!(parse_u64_range("3600", 1, 86_400), Some(3_600));
        assert_eq!(parse_u64_range("abc", 1, 10), None);
    }
}
