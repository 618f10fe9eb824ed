//! On/off switch driving a module through control commands.

use std::sync::Arc;

use telemetry_types::{Outbound, StreamId, StreamValue};
use tracing::info;

use super::ReplyWatcher;
use crate::binding::{Widget, WidgetContext, WidgetInput, WidgetView};
use crate::error::BindingError;
use crate::protocol::MessageSink;
use crate::status::ReplyKind;

pub const COMMAND_ON: &str = "set_high";
pub const COMMAND_OFF: &str = "set_low";

pub struct ToggleControl {
    stream: StreamId,
    outbound: Arc<dyn MessageSink>,
    replies: ReplyWatcher,
    on: bool,
}

impl ToggleControl {
    pub const TYPE: &'static str = "ToggleControl";

    pub fn create(context: WidgetContext) -> Result<Box<dyn Widget>, BindingError> {
        let replies = ReplyWatcher::new(&context.status, context.stream.module_id(), ReplyKind::Control);
        Ok(Box::new(Self {
            stream: context.stream,
            outbound: context.outbound,
            replies,
            on: false,
        }))
    }

    /// Flips the switch and sends the matching command.
    pub fn toggle(&mut self) {
        self.on = !self.on;
        let command = if self.on { COMMAND_ON } else { COMMAND_OFF };
        info!(module_id = %self.stream.module_id(), command, "Sending command");
        self.outbound
            .send_best_effort(&Outbound::control(self.stream.module_id(), command));
    }
}

impl Widget for ToggleControl {
    fn widget_type(&self) -> &str {
        Self::TYPE
    }

    fn on_tick(&mut self, value: Option<&StreamValue>) {
        self.replies.poll();
        if let Some(value) = value {
            self.on = value.value.as_f64() == Some(1.0);
        }
    }

    fn view(&self) -> WidgetView {
        WidgetView::Toggle {
            on: self.on,
            reply: self.replies.latest().map(|status| format!("Last command: {}", status)),
        }
    }

    fn on_input(&mut self, input: WidgetInput) -> Result<(), BindingError> {
        match input {
            WidgetInput::Toggle => {
                self.toggle();
                Ok(())
            }
            other => Err(BindingError::Widget {
                widget_type: Self::TYPE.to_string(),
                message: format!("does not accept {:?}", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::tests::context;

    #[test]
    fn test_toggle_follows_stream_and_sends_commands() {
        let (context, sink, status) = context("relay.state");
        let mut toggle = ToggleControl::create(context).unwrap();

        toggle.on_tick(Some(&StreamValue::new(1.0)));
        assert_eq!(toggle.view(), WidgetView::Toggle { on: true, reply: None });

        toggle.on_input(WidgetInput::Toggle).unwrap();
        toggle.on_input(WidgetInput::Toggle).unwrap();
        assert_eq!(
            sink.sent.lock().unwrap().as_slice(),
            &[
                Outbound::control("relay", "set_low"),
                Outbound::control("relay", "set_high"),
            ]
        );

        status.module_reply("relay", ReplyKind::Control, "ok");
        toggle.on_tick(Some(&StreamValue::new(0.0)));
        assert_eq!(
            toggle.view(),
            WidgetView::Toggle {
                on: false,
                reply: Some("Last command: ok".to_string()),
            }
        );
    }
}
