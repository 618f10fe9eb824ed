//! Binds a live stream to a widget mounted in a layout cell.
//!
//! `attach` validates the target, replaces whatever the cell showed before and
//! resolves the widget type through the registry. Registered types mount
//! immediately; unknown types get a placeholder and a bounded wait, ending in
//! a terminal "not found" state. Every mounted widget owns a polling task that
//! reads its stream from the store. The task is cancelled as soon as the widget
//! is unmounted, either because the cell was rebound or because it was removed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use telemetry_types::{Outbound, StreamId};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::layout::{CellCallback, ContentRegion, LayoutEngine, RegionContent};
use super::registry::WidgetRegistry;
use super::widget::{Widget, WidgetContext, WidgetFactory, WidgetInput, WidgetView};
use crate::config::BindingConfig;
use crate::error::BindingError;
use crate::protocol::MessageSink;
use crate::status::StatusSink;
use crate::store::StreamSource;

#[derive(Debug, Clone)]
pub struct BinderSettings {
    pub resolve_poll: Duration,
    pub resolve_timeout: Duration,
    pub value_poll: Duration,
    pub default_widget: String,
}

impl From<&BindingConfig> for BinderSettings {
    fn from(config: &BindingConfig) -> Self {
        Self {
            resolve_poll: config.resolve_poll(),
            resolve_timeout: config.resolve_timeout(),
            value_poll: config.value_poll(),
            default_widget: config.default_widget.clone(),
        }
    }
}

/// Floor for every polling interval; `tokio::time::interval` rejects zero.
pub(crate) const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

type SharedWidget = Arc<Mutex<Box<dyn Widget>>>;

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A widget instance together with the task feeding it.
struct MountedWidget {
    widget: SharedWidget,
    poll: JoinHandle<()>,
    cancel: CancellationToken,
}

impl Drop for MountedWidget {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.poll.abort();
        lock(&self.widget).unmount();
    }
}

struct Binding {
    generation: u64,
    stream: StreamId,
    widget_type: String,
    container: Uuid,
    region: Arc<dyn ContentRegion>,
    mounted: Option<MountedWidget>,
    resolution: Option<JoinHandle<()>>,
}

impl Drop for Binding {
    fn drop(&mut self) {
        if let Some(resolution) = self.resolution.take() {
            resolution.abort();
        }
    }
}

/// Public view of one binding.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingInfo {
    pub cell_id: String,
    pub stream: StreamId,
    pub widget_type: String,
    pub container: Uuid,
    pub mounted: bool,
}

struct BinderInner {
    layout: Arc<dyn LayoutEngine>,
    registry: Arc<WidgetRegistry>,
    source: Arc<dyn StreamSource>,
    outbound: Arc<dyn MessageSink>,
    status: StatusSink,
    settings: BinderSettings,
    bindings: Mutex<HashMap<String, Binding>>,
    next_generation: AtomicU64,
}

/// Owns every stream-to-cell binding.
#[derive(Clone)]
pub struct WidgetBinder {
    inner: Arc<BinderInner>,
}

impl WidgetBinder {
    pub fn new(
        layout: Arc<dyn LayoutEngine>,
        registry: Arc<WidgetRegistry>,
        source: Arc<dyn StreamSource>,
        outbound: Arc<dyn MessageSink>,
        status: StatusSink,
        settings: BinderSettings,
    ) -> Self {
        Self {
            inner: Arc::new(BinderInner {
                layout,
                registry,
                source,
                outbound,
                status,
                settings,
                bindings: Mutex::new(HashMap::new()),
                next_generation: AtomicU64::new(0),
            }),
        }
    }

    /// Attaches `stream_id` to the cell, showing it with `widget_type`.
    ///
    /// An empty `widget_type` selects the configured default. Fails without
    /// touching the cell when the stream id is malformed or the cell cannot be
    /// found. Must be called from within a tokio runtime.
    pub fn attach(&self, cell_id: &str, stream_id: &str, widget_type: &str) -> Result<(), BindingError> {
        let (stream, region) = match self.resolve_target(cell_id, stream_id) {
            Ok(target) => target,
            Err(e) => {
                warn!(cell_id = %cell_id, stream_id = %stream_id, "Attach rejected: {}", e);
                self.inner.status.message(format!("Cannot attach {}: {}", stream_id, e));
                return Err(e);
            }
        };
        let widget_type = if widget_type.is_empty() {
            self.inner.settings.default_widget.clone()
        } else {
            widget_type.to_string()
        };

        self.detach(cell_id);
        let container = Uuid::new_v4();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        info!(
            cell_id = %cell_id,
            stream_id = %stream,
            widget_type = %widget_type,
            %container,
            "Attaching stream"
        );

        let factory = self.inner.registry.get(&widget_type);
        {
            let mut bindings = lock(&self.inner.bindings);
            let resolution = match factory {
                Some(_) => None,
                None => {
                    region.set(RegionContent::Placeholder {
                        widget_type: widget_type.clone(),
                    });
                    Some(self.spawn_resolution(cell_id, &widget_type, generation))
                }
            };
            bindings.insert(
                cell_id.to_string(),
                Binding {
                    generation,
                    stream,
                    widget_type,
                    container,
                    region,
                    mounted: None,
                    resolution,
                },
            );
        }

        match factory {
            Some(factory) => self.mount(cell_id, generation, factory),
            None => Ok(()),
        }
    }

    /// Unmounts whatever is bound to the cell. Returns whether anything was.
    pub fn detach(&self, cell_id: &str) -> bool {
        let removed = lock(&self.inner.bindings).remove(cell_id);
        match removed {
            Some(binding) => {
                debug!(cell_id = %cell_id, stream_id = %binding.stream, "Detaching");
                binding.region.clear();
                drop(binding);
                true
            }
            None => false,
        }
    }

    /// Listener for layout removals. Holds the binder weakly so the layout
    /// can keep it without forming a cycle.
    pub fn removal_listener(&self) -> CellCallback {
        let inner = Arc::downgrade(&self.inner);
        Arc::new(move |cell_id: &str| {
            if let Some(inner) = inner.upgrade() {
                WidgetBinder { inner }.detach(cell_id);
            }
        })
    }

    /// Detaches every cell.
    pub fn detach_all(&self) {
        let drained: Vec<Binding> = lock(&self.inner.bindings).drain().map(|(_, b)| b).collect();
        for binding in drained {
            binding.region.clear();
        }
    }

    pub fn binding(&self, cell_id: &str) -> Option<BindingInfo> {
        lock(&self.inner.bindings).get(cell_id).map(|binding| BindingInfo {
            cell_id: cell_id.to_string(),
            stream: binding.stream.clone(),
            widget_type: binding.widget_type.clone(),
            container: binding.container,
            mounted: binding.mounted.is_some(),
        })
    }

    /// Ids of bound cells, sorted.
    pub fn bound_cells(&self) -> Vec<String> {
        let mut cells: Vec<String> = lock(&self.inner.bindings).keys().cloned().collect();
        cells.sort();
        cells
    }

    /// Number of cells still waiting for their widget type.
    pub fn pending_resolutions(&self) -> usize {
        lock(&self.inner.bindings)
            .values()
            .filter(|binding| {
                binding
                    .resolution
                    .as_ref()
                    .map_or(false, |handle| !handle.is_finished())
            })
            .count()
    }

    pub fn view(&self, cell_id: &str) -> Option<WidgetView> {
        let widget = self.mounted_widget(cell_id)?;
        let view = lock(&widget).view();
        Some(view)
    }

    /// Routes user input to the widget mounted in the cell.
    pub fn input(&self, cell_id: &str, input: WidgetInput) -> Result<(), BindingError> {
        let widget = {
            let bindings = lock(&self.inner.bindings);
            let binding = bindings
                .get(cell_id)
                .ok_or_else(|| BindingError::CellNotFound(cell_id.to_string()))?;
            binding
                .mounted
                .as_ref()
                .map(|mounted| mounted.widget.clone())
                .ok_or_else(|| BindingError::WidgetNotFound(binding.widget_type.clone()))?
        };
        let result = lock(&widget).on_input(input);
        result
    }

    fn mounted_widget(&self, cell_id: &str) -> Option<SharedWidget> {
        lock(&self.inner.bindings)
            .get(cell_id)?
            .mounted
            .as_ref()
            .map(|mounted| mounted.widget.clone())
    }

    fn resolve_target(
        &self,
        cell_id: &str,
        stream_id: &str,
    ) -> Result<(StreamId, Arc<dyn ContentRegion>), BindingError> {
        let stream: StreamId = stream_id.parse()?;
        let cell = self
            .inner
            .layout
            .find_cell(cell_id)
            .ok_or_else(|| BindingError::CellNotFound(cell_id.to_string()))?;
        let region = cell
            .content_region()
            .ok_or_else(|| BindingError::MissingContentRegion(cell_id.to_string()))?;
        Ok((stream, region))
    }

    fn spawn_resolution(&self, cell_id: &str, widget_type: &str, generation: u64) -> JoinHandle<()> {
        let binder = self.clone();
        let cell_id = cell_id.to_string();
        let widget_type = widget_type.to_string();
        let poll = self.inner.settings.resolve_poll;
        let timeout = self.inner.settings.resolve_timeout;

        tokio::spawn(async move {
            debug!(cell_id = %cell_id, widget_type = %widget_type, "Waiting for widget type");
            match binder.inner.registry.wait_for(&widget_type, poll, timeout).await {
                Ok(factory) => {
                    if let Err(e) = binder.mount(&cell_id, generation, factory) {
                        warn!(cell_id = %cell_id, "Late mount failed: {}", e);
                    }
                }
                Err(e) => binder.resolution_failed(&cell_id, generation, e),
            }
            binder.finish_resolution(&cell_id, generation);
        })
    }

    fn resolution_failed(&self, cell_id: &str, generation: u64, error: BindingError) {
        let bindings = lock(&self.inner.bindings);
        let Some(binding) = bindings.get(cell_id).filter(|b| b.generation == generation) else {
            return;
        };
        warn!(cell_id = %cell_id, "{}", error);
        binding.region.set(RegionContent::NotFound {
            widget_type: binding.widget_type.clone(),
        });
        self.inner.status.message(error.to_string());
    }

    fn finish_resolution(&self, cell_id: &str, generation: u64) {
        let mut bindings = lock(&self.inner.bindings);
        if let Some(binding) = bindings.get_mut(cell_id).filter(|b| b.generation == generation) {
            // Dropping our own handle detaches it; it does not abort this task.
            binding.resolution.take();
        }
    }

    /// Creates the widget and starts feeding it. A no-op if the cell has been
    /// rebound or detached since `generation` was issued.
    fn mount(&self, cell_id: &str, generation: u64, factory: Arc<dyn WidgetFactory>) -> Result<(), BindingError> {
        let Some((context, widget_type)) = self.context_for(cell_id, generation) else {
            debug!(cell_id = %cell_id, "Binding superseded before mount");
            return Ok(());
        };
        let stream = context.stream.clone();
        let container = context.container;

        let widget = match factory.create(context) {
            Ok(widget) => widget,
            Err(e) => {
                self.mount_failed(cell_id, generation, &e);
                return Err(e);
            }
        };
        let widget: SharedWidget = Arc::new(Mutex::new(widget));

        {
            let mut bindings = lock(&self.inner.bindings);
            let Some(binding) = bindings.get_mut(cell_id).filter(|b| b.generation == generation) else {
                lock(&widget).unmount();
                return Ok(());
            };
            let cancel = CancellationToken::new();
            let poll = spawn_value_poll(
                self.inner.source.clone(),
                stream.clone(),
                widget.clone(),
                self.inner.settings.value_poll,
                cancel.clone(),
            );
            binding.mounted = Some(MountedWidget { widget, poll, cancel });
            binding.region.set(RegionContent::Mounted {
                widget_type: widget_type.clone(),
                container,
            });
        }

        info!(cell_id = %cell_id, widget_type = %widget_type, stream_id = %stream, "Widget mounted");
        self.inner.outbound.send_best_effort(&Outbound::subscribe(&stream));
        Ok(())
    }

    fn context_for(&self, cell_id: &str, generation: u64) -> Option<(WidgetContext, String)> {
        let bindings = lock(&self.inner.bindings);
        let binding = bindings.get(cell_id).filter(|b| b.generation == generation)?;
        Some((
            WidgetContext {
                cell_id: cell_id.to_string(),
                container: binding.container,
                stream: binding.stream.clone(),
                outbound: self.inner.outbound.clone(),
                status: self.inner.status.clone(),
            },
            binding.widget_type.clone(),
        ))
    }

    fn mount_failed(&self, cell_id: &str, generation: u64, error: &BindingError) {
        warn!(cell_id = %cell_id, "{}", error);
        if let Some(binding) = lock(&self.inner.bindings)
            .get(cell_id)
            .filter(|b| b.generation == generation)
        {
            binding.region.set(RegionContent::Error {
                message: error.to_string(),
            });
        }
        self.inner.status.message(error.to_string());
    }
}

fn spawn_value_poll(
    source: Arc<dyn StreamSource>,
    stream: StreamId,
    widget: SharedWidget,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let value = source.get(stream.module_id(), stream.stream_name());
                    lock(&widget).on_tick(value.as_ref());
                }
            }
        }
        debug!(stream_id = %stream, "Value polling stopped");
    })
}
