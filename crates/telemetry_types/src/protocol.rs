//! JSON envelopes exchanged with the telemetry server.
//!
//! Every envelope is a JSON object whose `type` field selects the variant.
//! Inbound envelopes may carry extra fields (timestamps, status flags); they
//! are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::data::ModuleMap;
use crate::stream_id::StreamId;

/// Inbound `type` tags understood by the dashboard.
pub const INBOUND_KINDS: &[&str] = &[
    "active_streams",
    "negotiation",
    "update",
    "control_response",
    "config_response",
];

/// Messages received from the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// The catalog of streams currently published, by module.
    ActiveStreams { data: ModuleMap },
    /// Full snapshot; replaces the whole value tree.
    Negotiation { data: ModuleMap },
    /// Incremental change; merged stream by stream.
    Update { data: ModuleMap },
    ControlResponse { module_id: String, status: String },
    ConfigResponse { module_id: String, status: String },
}

impl Inbound {
    pub fn kind(&self) -> &'static str {
        match self {
            Inbound::ActiveStreams { .. } => "active_streams",
            Inbound::Negotiation { .. } => "negotiation",
            Inbound::Update { .. } => "update",
            Inbound::ControlResponse { .. } => "control_response",
            Inbound::ConfigResponse { .. } => "config_response",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    ActiveStreams,
}

/// Messages sent to the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    Query { query_type: QueryType },
    Subscribe { stream_id: StreamId },
    Control { module_id: String, command: Value },
    ConfigUpdate { module_id: String, config: Value },
}

impl Outbound {
    pub fn query_active_streams() -> Self {
        Outbound::Query {
            query_type: QueryType::ActiveStreams,
        }
    }

    pub fn subscribe(stream_id: &StreamId) -> Self {
        Outbound::Subscribe {
            stream_id: stream_id.clone(),
        }
    }

    pub fn control(module_id: impl Into<String>, command: impl Into<Value>) -> Self {
        Outbound::Control {
            module_id: module_id.into(),
            command: command.into(),
        }
    }

    pub fn config_update(module_id: impl Into<String>, patch: Value) -> Self {
        Outbound::ConfigUpdate {
            module_id: module_id.into(),
            config: patch,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Outbound::Query { .. } => "query",
            Outbound::Subscribe { .. } => "subscribe",
            Outbound::Control { .. } => "control",
            Outbound::ConfigUpdate { .. } => "config_update",
        }
    }
}
