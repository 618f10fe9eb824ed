//! Error types for the dashboard components
//!
//! None of these are fatal to the process. Each is resolved at the component
//! boundary where it occurs and surfaced to the user as status text.

use std::path::PathBuf;
use telemetry_types::StreamIdError;
use thiserror::Error;

/// Transport-level failures. Always recoverable by reconnecting.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConnectionError {
    #[error("not connected")]
    NotConnected,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to encode message: {0}")]
    Encode(String),

    #[error("presence probe failed: {0}")]
    Probe(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for ConnectionError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ConnectionError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for ConnectionError {
    fn from(err: serde_json::Error) -> Self {
        ConnectionError::Encode(err.to_string())
    }
}

/// Malformed or unknown inbound envelopes. Dropped with a diagnostic.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("undecodable payload: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("envelope has no 'type' field")]
    MissingKind,

    #[error("unknown message type '{0}'")]
    UnknownKind(String),

    #[error("invalid '{kind}' body: {source}")]
    InvalidBody {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures to bind a stream to a layout cell.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BindingError {
    #[error("cell '{0}' not found")]
    CellNotFound(String),

    #[error("cell '{0}' has no content region")]
    MissingContentRegion(String),

    #[error("invalid stream id: {0}")]
    InvalidStream(#[from] StreamIdError),

    #[error("widget type \"{0}\" not found")]
    WidgetNotFound(String),

    #[error("widget '{widget_type}' failed to mount: {message}")]
    Widget { widget_type: String, message: String },
}

/// A single plugin's manifest could not be loaded.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid manifest {path}: {message}")]
    Invalid { path: PathBuf, message: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
