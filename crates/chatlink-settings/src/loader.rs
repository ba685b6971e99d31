//! Settings loading: file over defaults, then `CHATLINK_*` overrides, then validation.
//!
//! Merge rules for the user file:
//! - Objects are merged recursively, key by key
//! - Arrays and primitives from the file replace the default
//! - `null` in the file keeps the default

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chatlink_core::logging::LogFormat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::ChatlinkSettings;

/// Path of the user settings file (`~/.chatlink/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".chatlink").join("settings.json")
}

/// Load settings from [`settings_path`].
pub fn load_settings() -> Result<ChatlinkSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from `path`, apply env overrides and validate the result.
///
/// A missing file yields the defaults. Malformed JSON and values that break
/// a cross-field rule are errors.
pub fn load_settings_from_path(path: &Path) -> Result<ChatlinkSettings> {
    let defaults = serde_json::to_value(ChatlinkSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "no settings file, using defaults");
        defaults
    };

    let mut settings: ChatlinkSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of `source` over `target`.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CHATLINK_*` overrides read through `lookup`.
///
/// Out-of-range or unparseable values are logged and skipped.
pub fn apply_env_overrides<F>(settings: &mut ChatlinkSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Client ──────────────────────────────────────────────────────
    let client = &mut settings.client;
    if let Some(v) = env.string("CHATLINK_SERVER_URL") {
        client.server_url = v;
    }
    if let Some(v) = env.ranged("CHATLINK_DEBOUNCE_MS", 0_u64, 60_000) {
        client.debounce_ms = v;
    }
    if let Some(v) = env.ranged("CHATLINK_CONNECT_TIMEOUT_MS", 100_u64, 300_000) {
        client.connect_timeout_ms = v;
    }
    if let Some(v) = env.ranged("CHATLINK_HEARTBEAT_INTERVAL_MS", 100_u64, 3_600_000) {
        client.heartbeat.interval_ms = v;
    }
    if let Some(v) = env.ranged("CHATLINK_HEARTBEAT_BACKGROUND_INTERVAL_MS", 200_u64, 7_200_000) {
        client.heartbeat.background_interval_ms = v;
    }
    if let Some(v) = env.ranged("CHATLINK_ACK_TIMEOUT_MS", 10_u64, 600_000) {
        client.heartbeat.ack_timeout_ms = v;
    }
    if let Some(v) = env.ranged("CHATLINK_RECONNECT_BASE_MS", 1_u64, 600_000) {
        client.reconnect.base_delay_ms = v;
    }
    if let Some(v) = env.ranged("CHATLINK_RECONNECT_MAX_MS", 1_u64, 3_600_000) {
        client.reconnect.max_delay_ms = v;
    }
    if let Some(v) = env.ranged("CHATLINK_RECONNECT_MAX_ATTEMPTS", 0_u32, 1_000) {
        client.reconnect.max_attempts = v;
    }

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.string("CHATLINK_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.ranged("CHATLINK_PORT", 0_u16, u16::MAX) {
        settings.server.port = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("CHATLINK_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("CHATLINK_LOG_FORMAT") {
        match parse_log_format(&v) {
            Some(format) => settings.logging.format = format,
            None => warn!(key = "CHATLINK_LOG_FORMAT", value = %v, "unknown log format, ignoring"),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse `val` as a number within `min..=max`.
pub fn parse_in_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a log format name (`compact` or `json`, case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.trim().to_ascii_lowercase().as_str() {
        "compact" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn ranged<T>(&self, name: &str, min: T, max: T) -> Option<T>
    where
        T: FromStr + PartialOrd,
    {
        let val = self.string(name)?;
        let result = parse_in_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid numeric env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
