//! # specweave-settings
//!
//! Configuration for the context pipeline, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults**: [`SpecweaveSettings::default()`]
//! 2. **User file**: `~/.specweave/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SPECWEAVE_*` overrides (highest priority)
//!
//! There is no global settings instance: callers load a value and hand it to
//! the components that need it, so differently-configured managers can live
//! side by side.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides_with, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
