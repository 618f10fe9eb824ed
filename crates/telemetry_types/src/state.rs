use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the single streaming connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Result of a liveness probe, shown as the server status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    /// The streaming socket is open.
    Linked,
    /// The server answers HTTP but the socket is not open.
    AliveNotLinked,
    /// The server could not be reached.
    Unreachable,
}

impl Liveness {
    /// Short badge text for the status bar.
    pub fn badge(&self) -> &'static str {
        match self {
            Liveness::Linked => "LINK",
            Liveness::AliveNotLinked => "LIVE",
            Liveness::Unreachable => "Dead",
        }
    }
}
