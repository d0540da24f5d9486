//! # wirebench-settings
//!
//! Configuration with layered sources:
//! 1. **Compiled defaults**: [`WorkbenchSettings::default()`]
//! 2. **User file**: `~/.wirebench/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `WIREBENCH_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{config_dir, deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
