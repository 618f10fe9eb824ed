//! Widgets provided by plugins.
//!
//! Plugin components are rendered by an external host. The dashboard only
//! tells the host where to mount which component, feeds it stream values and
//! unmounts it again.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use telemetry_types::{StreamId, StreamValue, WidgetDescriptor};
use tracing::{debug, info};
use uuid::Uuid;

use crate::binding::{Widget, WidgetContext, WidgetFactory, WidgetRegistry, WidgetView};
use crate::error::BindingError;

/// Mount primitive for plugin components.
pub trait ComponentHost: Send + Sync {
    fn mount(&self, container: Uuid, component_ref: &Path, props: &Value) -> Result<(), BindingError>;

    /// Delivers the latest value of the bound stream.
    fn push(&self, container: Uuid, value: &StreamValue);

    fn unmount(&self, container: Uuid);
}

/// Host used when no renderer is attached: records lifecycle in the log.
#[derive(Debug, Default, Clone)]
pub struct LoggingComponentHost;

impl ComponentHost for LoggingComponentHost {
    fn mount(&self, container: Uuid, component_ref: &Path, props: &Value) -> Result<(), BindingError> {
        info!(%container, component = %component_ref.display(), %props, "Mounting component");
        Ok(())
    }

    fn push(&self, container: Uuid, value: &StreamValue) {
        debug!(%container, value = %value.value, "Component update");
    }

    fn unmount(&self, container: Uuid) {
        info!(%container, "Unmounting component");
    }
}

/// Builds [`PluginWidget`]s for one catalog entry.
pub struct PluginWidgetFactory {
    descriptor: WidgetDescriptor,
    host: Arc<dyn ComponentHost>,
}

impl PluginWidgetFactory {
    pub fn new(descriptor: WidgetDescriptor, host: Arc<dyn ComponentHost>) -> Self {
        Self { descriptor, host }
    }

    fn component_path(&self) -> PathBuf {
        self.descriptor.mod_path.join(&self.descriptor.component_ref)
    }

    fn props(&self, stream: &StreamId) -> Value {
        json!({
            "streamId": stream.to_string(),
            "moduleId": stream.module_id(),
            "streamName": stream.stream_name(),
            "options": self.descriptor.options,
            "dependencies": self.descriptor.dependencies,
        })
    }
}

impl WidgetFactory for PluginWidgetFactory {
    fn create(&self, context: WidgetContext) -> Result<Box<dyn Widget>, BindingError> {
        let component = self.component_path();
        self.host
            .mount(context.container, &component, &self.props(&context.stream))?;
        Ok(Box::new(PluginWidget {
            name: self.descriptor.name.clone(),
            component_ref: component.display().to_string(),
            container: context.container,
            host: self.host.clone(),
            last_value: None,
        }))
    }
}

/// A mounted plugin component.
pub struct PluginWidget {
    name: String,
    component_ref: String,
    container: Uuid,
    host: Arc<dyn ComponentHost>,
    last_value: Option<StreamValue>,
}

impl Widget for PluginWidget {
    fn widget_type(&self) -> &str {
        &self.name
    }

    /// Pushes only values that differ from the last one delivered.
    fn on_tick(&mut self, value: Option<&StreamValue>) {
        let Some(value) = value else {
            return;
        };
        if self.last_value.as_ref() == Some(value) {
            return;
        }
        self.host.push(self.container, value);
        self.last_value = Some(value.clone());
    }

    fn view(&self) -> WidgetView {
        WidgetView::Component {
            component_ref: self.component_ref.clone(),
            last_value: self.last_value.clone(),
        }
    }

    fn unmount(&mut self) {
        self.host.unmount(self.container);
    }
}

/// Registers every catalog entry under its name.
///
/// Entries are registered in catalog order, so of two entries sharing a name
/// the later one wins.
pub fn register_catalog(registry: &WidgetRegistry, catalog: &[WidgetDescriptor], host: Arc<dyn ComponentHost>) {
    for descriptor in catalog {
        registry.register(
            &descriptor.name,
            PluginWidgetFactory::new(descriptor.clone(), host.clone()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::tests::context;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHost {
        calls: Mutex<Vec<String>>,
    }

    impl ComponentHost for RecordingHost {
        fn mount(&self, _container: Uuid, component_ref: &Path, props: &Value) -> Result<(), BindingError> {
            self.calls.lock().unwrap().push(format!(
                "mount {} {}",
                component_ref.display(),
                props["streamId"].as_str().unwrap()
            ));
            Ok(())
        }

        fn push(&self, _container: Uuid, value: &StreamValue) {
            self.calls.lock().unwrap().push(format!("push {}", value.value));
        }

        fn unmount(&self, _container: Uuid) {
            self.calls.lock().unwrap().push("unmount".to_string());
        }
    }

    fn descriptor(name: &str, component: &str) -> WidgetDescriptor {
        WidgetDescriptor {
            name: name.to_string(),
            widget_type: "widget".to_string(),
            description: String::new(),
            component_ref: component.to_string(),
            mod_name: "gauges".to_string(),
            mod_path: PathBuf::from("mods/gauges"),
            dependencies: vec![],
            options: json!({}),
        }
    }

    #[test]
    fn test_plugin_widget_lifecycle() {
        let host = Arc::new(RecordingHost::default());
        let registry = WidgetRegistry::new();
        register_catalog(&registry, &[descriptor("Dial", "dial.js")], host.clone());

        let (context, _, _) = context("imu.pitch");
        let mut widget = registry.create("Dial", context).unwrap();
        assert_eq!(widget.widget_type(), "Dial");

        widget.on_tick(Some(&StreamValue::new(1.0)));
        widget.on_tick(Some(&StreamValue::new(1.0)));
        widget.on_tick(None);
        widget.on_tick(Some(&StreamValue::new(2.0)));
        widget.unmount();

        let calls = host.calls.lock().unwrap().clone();
        let expected_mount = format!("mount {} imu.pitch", Path::new("mods/gauges").join("dial.js").display());
        assert_eq!(calls, vec![expected_mount, "push 1".into(), "push 2".into(), "unmount".into()]);
    }

    #[test]
    fn test_later_catalog_entry_wins() {
        let host = Arc::new(RecordingHost::default());
        let registry = WidgetRegistry::new();
        register_catalog(
            &registry,
            &[descriptor("Dial", "old.js"), descriptor("Dial", "new.js")],
            host.clone(),
        );

        let (context, _, _) = context("imu.pitch");
        let widget = registry.create("Dial", context).unwrap();
        match widget.view() {
            WidgetView::Component { component_ref, .. } => assert!(component_ref.ends_with("new.js")),
            other => panic!("unexpected view {:?}", other),
        }
    }
}
