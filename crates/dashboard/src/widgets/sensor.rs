use telemetry_types::{StreamId, StreamValue};

use crate::binding::{Widget, WidgetContext, WidgetView};
use crate::error::BindingError;

/// Shows the latest value of a stream as text.
pub struct SensorDisplay {
    stream: StreamId,
    latest: Option<StreamValue>,
}

impl SensorDisplay {
    pub const TYPE: &'static str = "SensorDisplay";

    pub fn create(context: WidgetContext) -> Result<Box<dyn Widget>, BindingError> {
        Ok(Box::new(Self {
            stream: context.stream,
            latest: None,
        }))
    }
}

impl Widget for SensorDisplay {
    fn widget_type(&self) -> &str {
        Self::TYPE
    }

    fn on_tick(&mut self, value: Option<&StreamValue>) {
        // Keep showing the last value if the stream goes quiet.
        if let Some(value) = value {
            self.latest = Some(value.clone());
        }
    }

    fn view(&self) -> WidgetView {
        let text = match &self.latest {
            Some(StreamValue { value, unit: Some(unit), .. }) => format!("{}: {} {}", self.stream, value, unit),
            Some(StreamValue { value, .. }) => format!("{}: {}", self.stream, value),
            None => format!("{}: No data", self.stream),
        };
        WidgetView::Readout { text }
    }
}
