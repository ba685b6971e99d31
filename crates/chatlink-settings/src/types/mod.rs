//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a partial
//! JSON file only needs the keys it changes.

mod client;
mod server;

pub use client::*;
pub use server::*;

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Root settings type.
///
/// # JSON Format
///
/// ```json
/// {
///   "client": { "serverUrl": "wss://chat.example.com/ws", "heartbeat": { "intervalMs": 20000 } },
///   "server": { "port": 8080 },
///   "logging": { "level": "debug", "format": "json" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatlinkSettings {
    /// Settings schema version.
    pub version: String,
    /// Connection-lifecycle settings for the client core.
    pub client: ClientSettings,
    /// Relay server settings.
    pub server: ServerSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for ChatlinkSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            client: ClientSettings::default(),
            server: ServerSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl ChatlinkSettings {
    /// Check cross-field invariants of every section.
    pub fn validate(&self) -> Result<()> {
        self.client.validate()?;
        self.server.validate()
    }
}
