//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`WorkbenchSettings::default()`]
//! 2. If `~/.wirebench/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `WIREBENCH_*` environment variable overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::WorkbenchSettings;

/// Directory holding the settings file and default log file.
pub fn config_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".wirebench")
}

/// Resolve the path to the settings file (`~/.wirebench/settings.json`).
pub fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<WorkbenchSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or out-of-range values
/// are errors.
pub fn load_settings_from_path(path: &Path) -> Result<WorkbenchSettings> {
    let defaults = serde_json::to_value(WorkbenchSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: WorkbenchSettings = serde_json::from_value(merged)?;
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

/// Apply `WIREBENCH_*` environment overrides.
///
/// Integers must parse and fall inside their range; booleans accept
/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`. Anything else is
/// ignored with a warning.
pub fn apply_env_overrides(settings: &mut WorkbenchSettings) {
    // ── HTTP ────────────────────────────────────────────────────────
    if let Some(v) = read_env_u64("WIREBENCH_HTTP_TIMEOUT_MS", 100, 3_600_000) {
        settings.http.timeout_ms = v;
    }
    if let Some(v) = read_env_u64("WIREBENCH_HTTP_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.http.connect_timeout_ms = v;
    }
    if let Some(v) = read_env_string("WIREBENCH_USER_AGENT") {
        settings.http.user_agent = v;
    }

    // ── WebSocket ───────────────────────────────────────────────────
    if let Some(v) = read_env_u64("WIREBENCH_WS_CONNECT_TIMEOUT_MS", 100, 600_000) {
        settings.websocket.connect_timeout_ms = v;
    }
    if let Some(v) = read_env_u64("WIREBENCH_WS_CLOSE_TIMEOUT_MS", 100, 600_000) {
        settings.websocket.close_timeout_ms = v;
    }
    if let Some(v) = read_env_bool("WIREBENCH_WS_ECHO") {
        settings.websocket.echo_sent = v;
    }

    // ── Engine ──────────────────────────────────────────────────────
    if let Some(v) = read_env_usize("WIREBENCH_EVENT_QUEUE_CAPACITY", 1, 1_000_000) {
        settings.engine.event_queue_capacity = v;
    }
    if let Some(v) = read_env_usize("WIREBENCH_ADAPTER_QUEUE_CAPACITY", 1, 100_000) {
        settings.engine.adapter_queue_capacity = v;
    }
    if let Some(v) = read_env_u64("WIREBENCH_MAX_EMIT_BLOCK_MS", 0, 60_000) {
        settings.engine.max_emit_block_ms = v;
    }
    if let Some(v) = read_env_usize("WIREBENCH_LOG_CAPACITY", 1, 10_000_000) {
        settings.engine.log_capacity = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_env_string("WIREBENCH_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_env_string("WIREBENCH_LOG_FILE") {
        settings.logging.file = Some(v);
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers ─────────────────────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
