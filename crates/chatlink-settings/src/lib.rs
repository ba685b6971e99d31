//! # chatlink-settings
//!
//! Configuration management with layered sources.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`ChatlinkSettings::default()`]
//! 2. **User file**: `~/.chatlink/settings.json`, deep-merged over defaults
//! 3. **Environment variables**: `CHATLINK_*` overrides (highest priority)
//!
//! The connection core never reads the global: it receives an explicit
//! config built from [`ClientSettings`]. [`get_settings`] exists for the
//! binary's convenience.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<ChatlinkSettings> = OnceLock::new();

/// Get the process-wide settings instance.
///
/// On first call, loads `~/.chatlink/settings.json` with env var overrides.
/// If loading or validation fails, the failure is logged and compiled
/// defaults are used.
pub fn get_settings() -> &'static ChatlinkSettings {
    SETTINGS.get_or_init(|| match load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            tracing::warn!(error = %e, "failed to load settings, using defaults");
            ChatlinkSettings::default()
        }
    })
}

/// Initialize the process-wide settings with a specific value.
///
/// Returns `Err(settings)` if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: ChatlinkSettings) -> std::result::Result<(), ChatlinkSettings> {
    SETTINGS.set(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = ChatlinkSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.client.server_url, "ws://127.0.0.1:5001/ws");
        assert_eq!(settings.client.debounce_ms, 300);
        assert_eq!(settings.client.heartbeat.interval_ms, 30_000);
        assert_eq!(settings.client.heartbeat.background_interval_ms, 60_000);
        assert_eq!(settings.client.heartbeat.ack_timeout_ms, 5_000);
        assert_eq!(settings.client.reconnect.max_attempts, 10);
        assert_eq!(settings.server.port, 5001);
    }

    #[test]
    fn settings_path_is_under_home_dir() {
        let path = settings_path();
        assert!(path.ends_with(".chatlink/settings.json"));
    }
}
