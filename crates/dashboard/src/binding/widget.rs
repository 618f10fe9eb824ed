//! The widget contract shared by built-in and plugin widgets.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use telemetry_types::{StreamId, StreamValue};
use uuid::Uuid;

use crate::error::BindingError;
use crate::protocol::MessageSink;
use crate::status::StatusSink;

/// Everything a factory gets to build one mounted instance.
#[derive(Clone)]
pub struct WidgetContext {
    pub cell_id: String,
    /// Fresh for every mount.
    pub container: Uuid,
    pub stream: StreamId,
    pub outbound: Arc<dyn MessageSink>,
    pub status: StatusSink,
}

/// One sample kept by a graph widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphPoint {
    pub at: DateTime<Utc>,
    pub value: f64,
}

/// Renderable state of a mounted widget.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WidgetView {
    Graph {
        points: Vec<GraphPoint>,
        unit: Option<String>,
    },
    Readout {
        text: String,
    },
    Slider {
        value: f64,
        unit: Option<String>,
        min: f64,
        max: f64,
        step: f64,
        reply: Option<String>,
    },
    Toggle {
        on: bool,
        reply: Option<String>,
    },
    Component {
        component_ref: String,
        last_value: Option<StreamValue>,
    },
}

/// User interaction routed to a mounted widget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WidgetInput {
    SetValue(f64),
    Toggle,
}

/// A mounted widget instance.
///
/// `on_tick` is driven by the binder's polling task with the latest value in
/// the store, or `None` while the stream has no value.
pub trait Widget: Send {
    fn widget_type(&self) -> &str;

    fn on_tick(&mut self, value: Option<&StreamValue>);

    fn view(&self) -> WidgetView;

    fn on_input(&mut self, input: WidgetInput) -> Result<(), BindingError> {
        Err(BindingError::Widget {
            widget_type: self.widget_type().to_string(),
            message: format!("does not accept {:?}", input),
        })
    }

    /// Called once when the instance is torn down.
    fn unmount(&mut self) {}
}

/// Builds widget instances of one type.
pub trait WidgetFactory: Send + Sync {
    fn create(&self, context: WidgetContext) -> Result<Box<dyn Widget>, BindingError>;
}

impl<F> WidgetFactory for F
where
    F: Fn(WidgetContext) -> Result<Box<dyn Widget>, BindingError> + Send + Sync,
{
    fn create(&self, context: WidgetContext) -> Result<Box<dyn Widget>, BindingError> {
        self(context)
    }
}
