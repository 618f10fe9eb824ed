//! User-visible status reporting.
//!
//! Components never raise errors across their boundaries; they publish status
//! text here instead. Every event is mirrored to `tracing`.

use serde::Serialize;
use telemetry_types::{Liveness, StreamId};
use tokio::sync::broadcast;
use tracing::{info, warn};

const STATUS_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Control,
    Config,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    /// The scrolling status line.
    Message { text: String },
    /// The server badge.
    Liveness { liveness: Liveness },
    /// The active-stream list was refreshed.
    Catalog { streams: Vec<StreamId> },
    /// A reply addressed to the module that a command was sent to.
    ModuleReply {
        module_id: String,
        kind: ReplyKind,
        status: String,
    },
}

/// Cloneable publisher for status events.
#[derive(Clone)]
pub struct StatusSink {
    tx: broadcast::Sender<StatusEvent>,
}

impl Default for StatusSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(STATUS_BUFFER_SIZE);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn message(&self, text: impl Into<String>) {
        let text = text.into();
        info!(status = %text, "status");
        self.publish(StatusEvent::Message { text });
    }

    pub fn liveness(&self, liveness: Liveness) {
        match liveness {
            Liveness::Unreachable => warn!(badge = liveness.badge(), "server liveness"),
            _ => info!(badge = liveness.badge(), "server liveness"),
        }
        self.publish(StatusEvent::Liveness { liveness });
    }

    pub fn catalog(&self, streams: Vec<StreamId>) {
        info!(count = streams.len(), "active streams updated");
        self.publish(StatusEvent::Catalog { streams });
    }

    pub fn module_reply(&self, module_id: &str, kind: ReplyKind, status: &str) {
        let label = match kind {
            ReplyKind::Control => "Control",
            ReplyKind::Config => "Config",
        };
        self.message(format!("{} response from {}: {}", label, module_id, status));
        self.publish(StatusEvent::ModuleReply {
            module_id: module_id.to_string(),
            kind,
            status: status.to_string(),
        });
    }

    fn publish(&self, event: StatusEvent) {
        // No receivers is normal for a headless run.
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_receivers_is_silent() {
        let status = StatusSink::new();
        status.message("nobody listening");
        status.liveness(Liveness::Unreachable);
    }

    #[test]
    fn test_module_reply_emits_line_and_addressed_event() {
        let status = StatusSink::new();
        let mut rx = status.subscribe();
        status.module_reply("relay", ReplyKind::Control, "ok");

        assert_eq!(
            rx.try_recv().unwrap(),
            StatusEvent::Message {
                text: "Control response from relay: ok".to_string()
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            StatusEvent::ModuleReply {
                module_id: "relay".to_string(),
                kind: ReplyKind::Control,
                status: "ok".to_string()
            }
        );
    }
}
