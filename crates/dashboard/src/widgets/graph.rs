//! Rolling line graph of a numeric stream.

use std::collections::VecDeque;

use chrono::Utc;
use telemetry_types::{StreamId, StreamValue};
use tracing::trace;

use crate::binding::{GraphPoint, Widget, WidgetContext, WidgetView};
use crate::error::BindingError;

pub struct GraphDisplay {
    stream: StreamId,
    history: usize,
    points: VecDeque<GraphPoint>,
    unit: Option<String>,
}

impl GraphDisplay {
    pub const TYPE: &'static str = "GraphDisplay";

    pub fn new(stream: StreamId, history: usize) -> Self {
        Self {
            stream,
            history: history.max(1),
            points: VecDeque::with_capacity(history.max(1)),
            unit: None,
        }
    }

    pub fn create(context: WidgetContext, history: usize) -> Result<Box<dyn Widget>, BindingError> {
        Ok(Box::new(Self::new(context.stream, history)))
    }

    pub fn points(&self) -> impl Iterator<Item = &GraphPoint> {
        self.points.iter()
    }
}

impl Widget for GraphDisplay {
    fn widget_type(&self) -> &str {
        Self::TYPE
    }

    /// Appends one point per tick while the stream has a numeric value.
    fn on_tick(&mut self, value: Option<&StreamValue>) {
        let Some(value) = value else {
            trace!(stream_id = %self.stream, "No data");
            return;
        };
        let Some(number) = value.value.as_f64() else {
            return;
        };
        if self.points.len() == self.history {
            self.points.pop_front();
        }
        self.points.push_back(GraphPoint {
            at: Utc::now(),
            value: number,
        });
        self.unit = value.unit.clone();
    }

    fn view(&self) -> WidgetView {
        WidgetView::Graph {
            points: self.points.iter().cloned().collect(),
            unit: self.unit.clone(),
        }
    }
}
