//! Wires the dashboard components together.

use std::sync::Arc;

use telemetry_types::WidgetDescriptor;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::binding::{BinderSettings, GridLayout, LayoutEngine, WidgetBinder, WidgetRegistry};
use crate::config::DashboardConfig;
use crate::connection::{
    ConnectionManager, ConnectionSettings, Connector, HttpPresenceProbe, PresenceProbe, WebSocketConnector,
};
use crate::error::{BindingError, ConnectionError};
use crate::manifest;
use crate::protocol::Dispatcher;
use crate::status::StatusSink;
use crate::store::DataStore;
use crate::widgets::{self, ComponentHost, LoggingComponentHost};

/// One dashboard instance and everything it owns.
pub struct Dashboard {
    pub config: DashboardConfig,
    pub store: DataStore,
    pub status: StatusSink,
    pub connection: ConnectionManager,
    pub registry: Arc<WidgetRegistry>,
    pub layout: Arc<GridLayout>,
    pub binder: WidgetBinder,
    host: Arc<dyn ComponentHost>,
    dispatcher: Dispatcher,
    inbound: flume::Receiver<String>,
    shutdown: CancellationToken,
    catalog: Vec<WidgetDescriptor>,
}

impl Dashboard {
    /// Builds a dashboard talking to a real server.
    pub fn new(config: DashboardConfig) -> Result<Self, ConnectionError> {
        let probe = HttpPresenceProbe::new(config.probe_timeout())?;
        Ok(Self::with_parts(
            config,
            Arc::new(WebSocketConnector),
            Arc::new(probe),
            Arc::new(LoggingComponentHost),
        ))
    }

    /// Builds a dashboard over the given transport, probe and component host.
    pub fn with_parts(
        config: DashboardConfig,
        connector: Arc<dyn Connector>,
        probe: Arc<dyn PresenceProbe>,
        host: Arc<dyn ComponentHost>,
    ) -> Self {
        let store = DataStore::new();
        let status = StatusSink::new();
        let (inbound_tx, inbound) = flume::unbounded();

        let connection = ConnectionManager::new(
            ConnectionSettings::from(&config),
            connector,
            probe,
            inbound_tx,
            status.clone(),
        );
        let dispatcher = Dispatcher::new(store.clone(), status.clone());

        let registry = Arc::new(WidgetRegistry::new());
        widgets::register_builtin_widgets(&registry, &config.widgets);

        let layout = Arc::new(GridLayout::new());
        let binder = WidgetBinder::new(
            layout.clone(),
            registry.clone(),
            Arc::new(store.clone()),
            Arc::new(connection.clone()),
            status.clone(),
            BinderSettings::from(&config.binding),
        );

        layout.on_removed(binder.removal_listener());
        layout.on_dropped(Arc::new(|cell_id: &str| {
            debug!(cell_id = %cell_id, "Cell dropped onto grid");
        }));

        Self {
            config,
            store,
            status,
            connection,
            registry,
            layout,
            binder,
            host,
            dispatcher,
            inbound,
            shutdown: CancellationToken::new(),
            catalog: Vec::new(),
        }
    }

    /// Scans the plugin directory and registers every widget it declares.
    pub fn load_plugins(&mut self) -> usize {
        let catalog = manifest::load_catalog(&self.config.mods_dir);
        widgets::register_catalog(&self.registry, &catalog, self.host.clone());
        info!(widgets = catalog.len(), "Plugin widgets registered");
        self.catalog = catalog;
        self.catalog.len()
    }

    pub fn catalog(&self) -> &[WidgetDescriptor] {
        &self.catalog
    }

    /// Starts the dispatcher and opens the connection.
    pub async fn start(&self) -> JoinHandle<()> {
        let dispatcher = self
            .dispatcher
            .clone()
            .run(self.inbound.clone(), self.shutdown.clone());
        let handle = tokio::spawn(dispatcher);
        self.connection.connect().await;
        handle
    }

    /// Attaches a stream to a cell, creating the cell if needed.
    pub fn attach(&self, cell_id: &str, stream_id: &str, widget_type: &str) -> Result<(), BindingError> {
        let cell_id = self.layout.drop_cell(Some(cell_id));
        self.binder.attach(&cell_id, stream_id, widget_type)
    }

    pub fn shutdown(&self) {
        info!("Shutting down dashboard");
        self.connection.shutdown();
        self.binder.detach_all();
        self.shutdown.cancel();
    }
}
