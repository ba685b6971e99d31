//! Connection status and host-page visibility.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The single, always-current connection status published to collaborators.
///
/// Initial value is [`ConnectionState::Disconnected`]. Changes go through
/// [`ConnectionState::can_transition_to`]; anything outside the table is
/// refused by the publisher.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No transport, no pending retry.
    #[default]
    Disconnected,
    /// An open attempt is in flight.
    Connecting,
    /// The transport is open and the heartbeat is running.
    Connected,
    /// A reconnect timer is armed.
    Reconnecting,
}

impl ConnectionState {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// ```text
    /// disconnected --requestConnect-------------> connecting
    /// disconnected --scheduler (after remote close)--> reconnecting
    /// connecting   --success--------------------> connected
    /// connecting   --failure--------------------> reconnecting | disconnected
    /// connected    --heartbeat timeout / error--> reconnecting | disconnected
    /// connected    --remote close / explicit----> disconnected
    /// reconnecting --timer fires / requestConnect--> connecting
    /// reconnecting --explicit disconnect--------> disconnected
    /// ```
    ///
    /// Writing the current value again is always allowed (a no-op).
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{Connected, Connecting, Disconnected, Reconnecting};

        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Disconnected, Connecting | Reconnecting)
                | (Connecting | Reconnecting, Disconnected)
                | (Connecting, Connected | Reconnecting)
                | (Connected, Reconnecting | Disconnected)
                | (Reconnecting, Connecting)
        )
    }

    /// Whether an open attempt is already in flight or complete.
    ///
    /// Used to refuse duplicate opens: a half-open (`Connecting`) transport
    /// counts as busy, not just a fully open one.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// Lower-case name, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the host page is currently visible to the user.
///
/// Drives the heartbeat probe interval: promptness while foreground, reduced
/// resource use while backgrounded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Page visible.
    #[default]
    Foreground,
    /// Page hidden (other tab, minimized window).
    Background,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Foreground => f.write_str("foreground"),
            Self::Background => f.write_str("background"),
        }
    }
}
