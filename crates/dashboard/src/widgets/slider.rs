//! Slider that writes a module configuration value.

use std::sync::Arc;

use serde_json::json;
use telemetry_types::{Outbound, StreamId, StreamValue};
use tracing::info;

use super::ReplyWatcher;
use crate::binding::{Widget, WidgetContext, WidgetInput, WidgetView};
use crate::error::BindingError;
use crate::protocol::MessageSink;
use crate::status::ReplyKind;

const DEFAULT_MIN: f64 = 0.0;
const DEFAULT_MAX: f64 = 100.0;
const DEFAULT_STEP: f64 = 1.0;

pub struct SliderControl {
    stream: StreamId,
    outbound: Arc<dyn MessageSink>,
    replies: ReplyWatcher,
    value: f64,
    unit: Option<String>,
    min: f64,
    max: f64,
    step: f64,
}

impl SliderControl {
    pub const TYPE: &'static str = "SliderControl";

    pub fn create(context: WidgetContext) -> Result<Box<dyn Widget>, BindingError> {
        let replies = ReplyWatcher::new(&context.status, context.stream.module_id(), ReplyKind::Config);
        Ok(Box::new(Self {
            stream: context.stream,
            outbound: context.outbound,
            replies,
            value: 0.0,
            unit: None,
            min: DEFAULT_MIN,
            max: DEFAULT_MAX,
            step: DEFAULT_STEP,
        }))
    }

    /// Sends `{"<stream>_value": value}` to the stream's module.
    ///
    /// The value is clamped to the advertised range and shown right away; the
    /// next tick replaces it with whatever the module reports.
    pub fn set_value(&mut self, value: f64) {
        let value = value.clamp(self.min, self.max);
        self.value = value;
        let key = format!("{}_value", self.stream.stream_name());
        info!(module_id = %self.stream.module_id(), %key, value, "Sending value update");
        self.outbound
            .send_best_effort(&Outbound::config_update(self.stream.module_id(), json!({ key: value })));
    }
}

impl Widget for SliderControl {
    fn widget_type(&self) -> &str {
        Self::TYPE
    }

    fn on_tick(&mut self, value: Option<&StreamValue>) {
        self.replies.poll();
        let Some(value) = value else {
            return;
        };
        if let Some(number) = value.value.as_f64() {
            self.value = number;
        }
        self.unit = value.unit.clone();
        if let Some(metadata) = &value.metadata {
            if let Some(range) = metadata.range {
                // Modules occasionally advertise the bounds swapped.
                self.min = range.min.min(range.max);
                self.max = range.min.max(range.max);
            }
            if let Some(step) = metadata.step {
                self.step = step;
            }
        }
    }

    fn view(&self) -> WidgetView {
        WidgetView::Slider {
            value: self.value,
            unit: self.unit.clone(),
            min: self.min,
            max: self.max,
            step: self.step,
            reply: self.replies.latest().map(|status| format!("Last update: {}", status)),
        }
    }

    fn on_input(&mut self, input: WidgetInput) -> Result<(), BindingError> {
        match input {
            WidgetInput::SetValue(value) => {
                self.set_value(value);
                Ok(())
            }
            other => Err(BindingError::Widget {
                widget_type: Self::TYPE.to_string(),
                message: format!("does not accept {:?}", other),
            }),
        }
    }
}
