//! Widget registry: type tag to factory.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::binder::MIN_POLL_INTERVAL;
use super::widget::{Widget, WidgetContext, WidgetFactory};
use crate::error::BindingError;

/// Registered widget factories.
///
/// Built-in types are registered at startup, plugin types after the manifest
/// scan; either may arrive after a cell already asked for them. Registering a
/// name twice replaces the earlier factory.
pub struct WidgetRegistry {
    factories: DashMap<String, Arc<dyn WidgetFactory>>,
    changes: watch::Sender<u64>,
}

impl Default for WidgetRegistry {
    fn default() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            factories: DashMap::new(),
            changes,
        }
    }
}

impl WidgetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, widget_type: &str, factory: F)
    where
        F: WidgetFactory + 'static,
    {
        self.register_arc(widget_type, Arc::new(factory));
    }

    pub fn register_arc(&self, widget_type: &str, factory: Arc<dyn WidgetFactory>) {
        if self.factories.insert(widget_type.to_string(), factory).is_some() {
            warn!(widget_type = %widget_type, "Replacing registered widget factory");
        } else {
            info!(widget_type = %widget_type, "Registered widget type");
        }
        self.changes.send_modify(|version| *version += 1);
    }

    pub fn unregister(&self, widget_type: &str) -> bool {
        let removed = self.factories.remove(widget_type).is_some();
        if removed {
            self.changes.send_modify(|version| *version += 1);
        }
        removed
    }

    pub fn get(&self, widget_type: &str) -> Option<Arc<dyn WidgetFactory>> {
        self.factories
            .get(widget_type)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, widget_type: &str) -> bool {
        self.factories.contains_key(widget_type)
    }

    /// Registered type tags, sorted.
    pub fn widget_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.iter().map(|entry| entry.key().clone()).collect();
        types.sort();
        types
    }

    pub fn create(&self, widget_type: &str, context: WidgetContext) -> Result<Box<dyn Widget>, BindingError> {
        self.get(widget_type)
            .ok_or_else(|| BindingError::WidgetNotFound(widget_type.to_string()))?
            .create(context)
    }

    /// Waits until `widget_type` is registered.
    ///
    /// Re-checks every `poll` and on every registration, and gives up with
    /// `WidgetNotFound` once `deadline` has elapsed.
    pub async fn wait_for(
        &self,
        widget_type: &str,
        poll: Duration,
        deadline: Duration,
    ) -> Result<Arc<dyn WidgetFactory>, BindingError> {
        let mut changes = self.changes.subscribe();
        let resolve = async {
            let mut ticker = tokio::time::interval(poll.max(MIN_POLL_INTERVAL));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                if let Some(factory) = self.get(widget_type) {
                    return factory;
                }
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = changes.changed() => {}
                }
            }
        };

        match tokio::time::timeout(deadline, resolve).await {
            Ok(factory) => Ok(factory),
            Err(_) => {
                debug!(widget_type = %widget_type, ?deadline, "Gave up waiting for widget type");
                Err(BindingError::WidgetNotFound(widget_type.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::widget::WidgetView;
    use telemetry_types::StreamValue;

    struct Blank;

    impl Widget for Blank {
        fn widget_type(&self) -> &str {
            "Blank"
        }

        fn on_tick(&mut self, _value: Option<&StreamValue>) {}

        fn view(&self) -> WidgetView {
            WidgetView::Readout { text: String::new() }
        }
    }

    fn blank_factory(_context: WidgetContext) -> Result<Box<dyn Widget>, BindingError> {
        Ok(Box::new(Blank))
    }

    #[test]
    fn test_register_and_list() {
        let registry = WidgetRegistry::new();
        registry.register("Zeta", blank_factory);
        registry.register("Alpha", blank_factory);
        assert!(registry.contains("Alpha"));
        assert_eq!(registry.widget_types(), vec!["Alpha", "Zeta"]);
        assert!(registry.unregister("Zeta"));
        assert!(!registry.unregister("Zeta"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_resolves_late_registration() {
        let registry = Arc::new(WidgetRegistry::new());
        let late = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            late.register("Late", blank_factory);
        });

        let started = tokio::time::Instant::now();
        let result = registry
            .wait_for("Late", Duration::from_millis(100), Duration::from_secs(5))
            .await;
        assert!(result.is_ok());
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_gives_up_at_deadline() {
        let registry = WidgetRegistry::new();
        let started = tokio::time::Instant::now();
        let result = registry
            .wait_for("Never", Duration::from_millis(100), Duration::from_secs(5))
            .await;
        assert!(matches!(result, Err(BindingError::WidgetNotFound(name)) if name == "Never"));
        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(6));
    }
}
