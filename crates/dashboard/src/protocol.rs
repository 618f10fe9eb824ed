//! Message protocol dispatcher.
//!
//! Turns raw inbound text frames into typed [`Inbound`] envelopes and routes
//! them to the data store or the status channel. Outbound envelopes are built
//! with the constructors on [`Outbound`] and handed to a [`MessageSink`].

use serde_json::Value;
use telemetry_types::{Inbound, Outbound, INBOUND_KINDS};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, ProtocolError};
use crate::status::{ReplyKind, StatusSink};
use crate::store::{flatten_catalog, DataStore};

/// Anything that can put an outbound envelope on the wire.
pub trait MessageSink: Send + Sync {
    fn send(&self, message: &Outbound) -> Result<(), ConnectionError>;

    /// Fire-and-forget send. A missing connection is not worth reporting.
    fn send_best_effort(&self, message: &Outbound) {
        match self.send(message) {
            Ok(()) => {}
            Err(ConnectionError::NotConnected) => {
                debug!(kind = message.kind(), "Dropped outbound message, not connected");
            }
            Err(e) => warn!(kind = message.kind(), "Failed to send message: {}", e),
        }
    }
}

/// Routes inbound envelopes. The only writer of the [`DataStore`].
#[derive(Clone)]
pub struct Dispatcher {
    store: DataStore,
    status: StatusSink,
}

impl Dispatcher {
    pub fn new(store: DataStore, status: StatusSink) -> Self {
        Self { store, status }
    }

    /// Decodes and applies one frame, reporting what went wrong.
    pub fn try_dispatch(&self, raw: &str) -> Result<(), ProtocolError> {
        let message = decode(raw)?;
        debug!(kind = message.kind(), "Dispatching inbound message");
        self.apply(message);
        Ok(())
    }

    /// Decodes and applies one frame. Malformed frames are dropped with a warning.
    pub fn dispatch(&self, raw: &str) {
        if let Err(e) = self.try_dispatch(raw) {
            warn!("Dropping inbound message: {}", e);
        }
    }

    fn apply(&self, message: Inbound) {
        match message {
            Inbound::Negotiation { data } => {
                info!(modules = data.len(), "Negotiation snapshot received");
                self.status
                    .message(format!("Received broadcast: {} modules", data.len()));
                self.store.replace_all(telemetry_types::GlobalDataTree::new(data));
            }
            Inbound::Update { data } => {
                for (module_id, module) in data {
                    debug!(module_id = %module_id, streams = module.streams.len(), "Merging update");
                    self.store.merge_module_streams(&module_id, module.streams);
                }
            }
            Inbound::ActiveStreams { data } => {
                let streams = flatten_catalog(&data);
                self.store.set_catalog(data);
                self.status.catalog(streams);
            }
            Inbound::ControlResponse { module_id, status } => {
                self.status.module_reply(&module_id, ReplyKind::Control, &status);
            }
            Inbound::ConfigResponse { module_id, status } => {
                self.status.module_reply(&module_id, ReplyKind::Config, &status);
            }
        }
    }

    /// Drains inbound frames until the channel closes or shutdown is requested.
    pub async fn run(self, inbound: flume::Receiver<String>, shutdown: CancellationToken) {
        info!("Dispatcher started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Dispatcher shutting down");
                    break;
                }
                frame = inbound.recv_async() => match frame {
                    Ok(raw) => self.dispatch(&raw),
                    Err(_) => {
                        info!("Inbound channel closed, dispatcher stopping");
                        break;
                    }
                },
            }
        }
    }
}

fn decode(raw: &str) -> Result<Inbound, ProtocolError> {
    let value: Value = serde_json::from_str(raw).map_err(ProtocolError::Decode)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(ProtocolError::MissingKind)?
        .to_string();
    if !INBOUND_KINDS.contains(&kind.as_str()) {
        return Err(ProtocolError::UnknownKind(kind));
    }
    serde_json::from_value(value).map_err(|source| ProtocolError::InvalidBody { kind, source })
}
