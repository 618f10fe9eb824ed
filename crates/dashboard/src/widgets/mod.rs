//! Built-in widgets and the plugin widget adapter.

pub mod graph;
pub mod plugin;
pub mod sensor;
pub mod slider;
pub mod toggle;

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::binding::{WidgetContext, WidgetRegistry};
use crate::config::WidgetConfig;
use crate::status::{ReplyKind, StatusEvent, StatusSink};

pub use graph::GraphDisplay;
pub use plugin::{register_catalog, ComponentHost, LoggingComponentHost, PluginWidget, PluginWidgetFactory};
pub use sensor::SensorDisplay;
pub use slider::SliderControl;
pub use toggle::ToggleControl;

/// Registers every built-in widget type.
pub fn register_builtin_widgets(registry: &WidgetRegistry, config: &WidgetConfig) {
    let history = config.graph_history;
    registry.register(GraphDisplay::TYPE, move |context: WidgetContext| GraphDisplay::create(context, history));
    registry.register(SensorDisplay::TYPE, SensorDisplay::create);
    registry.register(SliderControl::TYPE, SliderControl::create);
    registry.register(ToggleControl::TYPE, ToggleControl::create);
}

/// Tracks the latest reply of one kind addressed to one module.
pub(crate) struct ReplyWatcher {
    module_id: String,
    kind: ReplyKind,
    events: broadcast::Receiver<StatusEvent>,
    latest: Option<String>,
}

impl ReplyWatcher {
    pub(crate) fn new(status: &StatusSink, module_id: &str, kind: ReplyKind) -> Self {
        Self {
            module_id: module_id.to_string(),
            kind,
            events: status.subscribe(),
            latest: None,
        }
    }

    /// Drains pending status events and returns the latest matching reply.
    pub(crate) fn poll(&mut self) -> Option<&str> {
        loop {
            match self.events.try_recv() {
                Ok(StatusEvent::ModuleReply { module_id, kind, status })
                    if module_id == self.module_id && kind == self.kind =>
                {
                    self.latest = Some(status);
                }
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        self.latest.as_deref()
    }

    pub(crate) fn latest(&self) -> Option<&str> {
        self.latest.as_deref()
    }
}
