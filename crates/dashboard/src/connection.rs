//! Connection manager: owns the single streaming socket to the telemetry server.
//!
//! Transient failures never reach callers. A failed attempt or a dropped
//! connection moves the state back to `Disconnected`, reports it on the status
//! channel, probes the server's HTTP endpoint for the liveness badge and, while
//! auto-reconnect is enabled, schedules exactly one new attempt after a fixed
//! delay. Inbound text frames are forwarded over a `flume` channel to the
//! dispatcher.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use telemetry_types::{ConnectionState, Liveness, Outbound};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DashboardConfig;
use crate::error::ConnectionError;
use crate::protocol::MessageSink;
use crate::status::StatusSink;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = ConnectionError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ConnectionError>> + Send>>;

/// Both halves of an open message-oriented connection, carrying text frames.
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens streaming connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Transport, ConnectionError>;
}

/// Checks whether the server answers on its HTTP endpoint.
#[async_trait]
pub trait PresenceProbe: Send + Sync {
    /// `Ok` when the server is alive.
    async fn probe(&self, url: &str) -> Result<(), ConnectionError>;
}

/// WebSocket transport over `tokio-tungstenite`. Only text frames are surfaced.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Transport, ConnectionError> {
        let (socket, _response) = tokio_tungstenite::connect_async(url).await?;
        let (sink, stream) = socket.split();

        let sink = sink.with(|text: String| future::ready(Ok::<_, ConnectionError>(Message::Text(text))));
        let stream = stream.filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(_) => None,
                Err(e) => Some(Err(ConnectionError::from(e))),
            })
        });

        Ok(Transport {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

/// Plain HTTP `GET` against the server base address; any 2xx means alive.
#[derive(Debug, Clone)]
pub struct HttpPresenceProbe {
    client: reqwest::Client,
}

impl HttpPresenceProbe {
    pub fn new(timeout: Duration) -> Result<Self, ConnectionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectionError::Probe(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PresenceProbe for HttpPresenceProbe {
    async fn probe(&self, url: &str) -> Result<(), ConnectionError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ConnectionError::Probe(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(ConnectionError::Probe(format!("HTTP {}", response.status())))
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub ws_url: String,
    pub http_url: String,
    pub reconnect_delay: Duration,
    pub probe_timeout: Duration,
    pub auto_reconnect: bool,
}

impl From<&DashboardConfig> for ConnectionSettings {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            ws_url: config.server.ws_url.clone(),
            http_url: config.server.http_url.clone(),
            reconnect_delay: config.reconnect_delay(),
            probe_timeout: config.probe_timeout(),
            auto_reconnect: config.reconnect.auto_reconnect,
        }
    }
}

/// The live socket as seen from outside its session task.
struct Link {
    id: u64,
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

struct Shared {
    settings: ConnectionSettings,
    connector: Arc<dyn Connector>,
    probe: Arc<dyn PresenceProbe>,
    inbound: flume::Sender<String>,
    status: StatusSink,
    state: watch::Sender<ConnectionState>,
    auto_reconnect: AtomicBool,
    link: Mutex<Option<Link>>,
    pending_reconnect: Mutex<Option<JoinHandle<()>>>,
    /// Bumped by `disconnect` so an attempt already in flight is discarded.
    epoch: AtomicU64,
    next_link_id: AtomicU64,
}

/// Cloneable handle to the single supervised connection.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ConnectionManager {
    pub fn new(
        settings: ConnectionSettings,
        connector: Arc<dyn Connector>,
        probe: Arc<dyn PresenceProbe>,
        inbound: flume::Sender<String>,
        status: StatusSink,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let auto_reconnect = AtomicBool::new(settings.auto_reconnect);
        Self {
            shared: Arc::new(Shared {
                settings,
                connector,
                probe,
                inbound,
                status,
                state,
                auto_reconnect,
                link: Mutex::new(None),
                pending_reconnect: Mutex::new(None),
                epoch: AtomicU64::new(0),
                next_link_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn auto_reconnect(&self) -> bool {
        self.shared.auto_reconnect.load(Ordering::SeqCst)
    }

    /// Enables or disables automatic reconnection. Disabling also cancels a
    /// reconnection that is already scheduled.
    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.shared.auto_reconnect.store(enabled, Ordering::SeqCst);
        info!(enabled, "Auto-reconnect changed");
        if !enabled {
            self.cancel_pending_reconnect();
        }
    }

    /// Opens the connection. Does nothing unless currently `Disconnected`.
    ///
    /// Never fails: errors become a state transition plus a status line.
    pub async fn connect(&self) {
        let shared = &self.shared;
        let started = shared.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !started {
            debug!(state = %self.state(), "Connect ignored");
            return;
        }
        self.cancel_pending_reconnect();

        let epoch = shared.epoch.load(Ordering::SeqCst);
        let url = shared.settings.ws_url.clone();
        info!(url = %url, "Connecting");
        shared.status.message(format!("Connecting to {}", url));

        let result = shared.connector.connect(&url).await;

        if shared.epoch.load(Ordering::SeqCst) != epoch {
            info!(url = %url, "Connection attempt abandoned after disconnect");
            return;
        }

        match result {
            Ok(transport) => self.start_session(transport),
            Err(e) => {
                warn!(url = %url, "Connection failed: {}", e);
                self.on_closed(None, format!("Connection to {} failed: {}", url, e));
            }
        }
    }

    /// Closes the connection without scheduling a reconnection.
    pub fn disconnect(&self) {
        self.cancel_pending_reconnect();
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(link) = lock(&self.shared.link).take() {
            link.cancel.cancel();
        }
        let previous = self.shared.state.send_replace(ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            info!("Disconnected by user");
            self.shared.status.message("Disconnected");
            // Refresh the badge; the probe only touches the HTTP endpoint.
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let manager = self.clone();
                runtime.spawn(async move {
                    manager.probe_liveness().await;
                });
            }
        }
    }

    /// Disables auto-reconnect and closes the connection.
    pub fn shutdown(&self) {
        self.set_auto_reconnect(false);
        self.disconnect();
    }

    /// Reports the server badge. Touches the network only when not connected,
    /// and then only the HTTP endpoint, never the streaming socket.
    pub async fn probe_liveness(&self) -> Liveness {
        let liveness = if self.state() == ConnectionState::Connected {
            Liveness::Linked
        } else {
            let settings = &self.shared.settings;
            let probe = self.shared.probe.probe(&settings.http_url);
            match tokio::time::timeout(settings.probe_timeout, probe).await {
                Ok(Ok(())) => Liveness::AliveNotLinked,
                Ok(Err(e)) => {
                    debug!(url = %settings.http_url, "Presence probe failed: {}", e);
                    Liveness::Unreachable
                }
                Err(_) => {
                    debug!(url = %settings.http_url, "Presence probe timed out");
                    Liveness::Unreachable
                }
            }
        };

        // The socket may have come up while the probe was out.
        let liveness = if self.state() == ConnectionState::Connected {
            Liveness::Linked
        } else {
            liveness
        };
        self.shared.status.liveness(liveness);
        liveness
    }

    fn start_session(&self, transport: Transport) {
        let shared = &self.shared;
        let id = shared.next_link_id.fetch_add(1, Ordering::SeqCst);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        *lock(&shared.link) = Some(Link {
            id,
            outbound: outbound_tx,
            cancel: cancel.clone(),
        });
        shared.state.send_replace(ConnectionState::Connected);
        info!(url = %shared.settings.ws_url, link_id = id, "Connected");
        shared
            .status
            .message(format!("Connected to {}", shared.settings.ws_url));
        shared.status.liveness(Liveness::Linked);

        // Queued ahead of anything else the session will carry.
        self.send_best_effort(&Outbound::query_active_streams());

        let manager = self.clone();
        tokio::spawn(async move {
            manager.run_session(id, transport, outbound_rx, cancel).await;
        });
    }

    async fn run_session(
        self,
        id: u64,
        transport: Transport,
        mut outbound: mpsc::UnboundedReceiver<String>,
        cancel: CancellationToken,
    ) {
        let Transport { mut sink, mut stream } = transport;

        let reason = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    if let Err(e) = sink.close().await {
                        debug!(link_id = id, "Error closing socket: {}", e);
                    }
                    debug!(link_id = id, "Session cancelled");
                    return;
                }
                Some(text) = outbound.recv() => {
                    if let Err(e) = sink.send(text).await {
                        break format!("Send failed: {}", e);
                    }
                }
                frame = stream.next() => match frame {
                    Some(Ok(text)) => {
                        if self.shared.inbound.send(text).is_err() {
                            debug!(link_id = id, "Inbound receiver gone, dropping frame");
                        }
                    }
                    Some(Err(e)) => break format!("Connection error: {}", e),
                    None => break "Connection closed by server".to_string(),
                },
            }
        };

        self.on_closed(Some(id), reason);
    }

    /// Common path for a failed attempt and for a session that ended on its own.
    fn on_closed(&self, link_id: Option<u64>, reason: String) {
        if let Some(id) = link_id {
            let mut link = lock(&self.shared.link);
            if link.as_ref().map(|l| l.id) != Some(id) {
                debug!(link_id = id, "Ignoring close of a superseded session");
                return;
            }
            *link = None;
        }

        self.shared.state.send_replace(ConnectionState::Disconnected);
        warn!("{}", reason);
        self.shared.status.message(reason);

        let manager = self.clone();
        tokio::spawn(async move {
            manager.probe_liveness().await;
        });

        self.schedule_reconnect();
    }

    fn schedule_reconnect(&self) {
        if !self.auto_reconnect() {
            info!("Auto-reconnect disabled, staying disconnected");
            return;
        }

        let delay = self.shared.settings.reconnect_delay;
        info!(delay_ms = delay.as_millis() as u64, "Scheduling reconnection");
        self.shared
            .status
            .message(format!("Reconnecting in {} ms", delay.as_millis()));

        let manager = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            lock(&manager.shared.pending_reconnect).take();
            if !manager.auto_reconnect() || manager.state() != ConnectionState::Disconnected {
                return;
            }
            manager.connect().await;
        });

        if let Some(previous) = lock(&self.shared.pending_reconnect).replace(handle) {
            previous.abort();
        }
    }

    fn cancel_pending_reconnect(&self) {
        if let Some(handle) = lock(&self.shared.pending_reconnect).take() {
            debug!("Cancelling scheduled reconnection");
            handle.abort();
        }
    }
}

impl MessageSink for ConnectionManager {
    fn send(&self, message: &Outbound) -> Result<(), ConnectionError> {
        if self.state() != ConnectionState::Connected {
            return Err(ConnectionError::NotConnected);
        }
        let text = serde_json::to_string(message)?;
        let link = lock(&self.shared.link);
        let link = link.as_ref().ok_or(ConnectionError::NotConnected)?;
        link.outbound.send(text).map_err(|_| {
            error!(link_id = link.id, "Session task is gone");
            ConnectionError::NotConnected
        })?;
        debug!(kind = message.kind(), "Queued outbound message");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::status::StatusEvent;
    use futures::channel::mpsc as fmpsc;
    use std::sync::atomic::AtomicUsize;

    /// Server side of an in-memory transport.
    pub(crate) struct FakeServer {
        pub from_client: fmpsc::UnboundedReceiver<String>,
        pub to_client: fmpsc::UnboundedSender<Result<String, ConnectionError>>,
    }

    #[derive(Default)]
    pub(crate) struct FakeConnector {
        pub attempts: AtomicUsize,
        pub refuse: AtomicBool,
        pub latency: Mutex<Duration>,
        pub servers: Mutex<Vec<FakeServer>>,
    }

    impl FakeConnector {
        pub fn refusing() -> Arc<Self> {
            let connector = Self::default();
            connector.refuse.store(true, Ordering::SeqCst);
            Arc::new(connector)
        }

        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        pub fn take_server(&self) -> FakeServer {
            self.servers.lock().unwrap().pop().expect("no open connection")
        }
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, _url: &str) -> Result<Transport, ConnectionError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let latency = *self.latency.lock().unwrap();
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            if self.refuse.load(Ordering::SeqCst) {
                return Err(ConnectionError::Transport("connection refused".into()));
            }
            let (client_tx, from_client) = fmpsc::unbounded::<String>();
            let (to_client, client_rx) = fmpsc::unbounded::<Result<String, ConnectionError>>();
            self.servers.lock().unwrap().push(FakeServer { from_client, to_client });
            Ok(Transport {
                sink: Box::pin(client_tx.sink_map_err(|e| ConnectionError::Transport(e.to_string()))),
                stream: Box::pin(client_rx),
            })
        }
    }

    pub(crate) struct FakeProbe {
        pub alive: bool,
        pub calls: AtomicUsize,
    }

    impl FakeProbe {
        pub fn new(alive: bool) -> Arc<Self> {
            Arc::new(Self {
                alive,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PresenceProbe for FakeProbe {
        async fn probe(&self, _url: &str) -> Result<(), ConnectionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.alive {
                Ok(())
            } else {
                Err(ConnectionError::Probe("connection refused".into()))
            }
        }
    }

    pub(crate) fn settings() -> ConnectionSettings {
        ConnectionSettings {
            ws_url: "ws://test".into(),
            http_url: "http://test".into(),
            reconnect_delay: Duration::from_millis(5000),
            probe_timeout: Duration::from_millis(2000),
            auto_reconnect: true,
        }
    }

    fn manager(
        connector: Arc<FakeConnector>,
        probe: Arc<FakeProbe>,
    ) -> (ConnectionManager, flume::Receiver<String>, StatusSink) {
        let (tx, rx) = flume::unbounded();
        let status = StatusSink::new();
        let manager = ConnectionManager::new(settings(), connector, probe, tx, status.clone());
        (manager, rx, status)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_queries_catalog_and_reports_link() {
        let connector = Arc::new(FakeConnector::default());
        let (manager, _rx, status) = manager(connector.clone(), FakeProbe::new(true));
        let mut events = status.subscribe();

        manager.connect().await;
        assert_eq!(manager.state(), ConnectionState::Connected);

        let mut server = connector.take_server();
        let first = server.from_client.next().await.unwrap();
        assert_eq!(first, r#"{"type":"query","query_type":"active_streams"}"#);

        let mut saw_link = false;
        while let Ok(event) = events.try_recv() {
            if event == (StatusEvent::Liveness { liveness: Liveness::Linked }) {
                saw_link = true;
            }
        }
        assert!(saw_link);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbound_frames_are_forwarded() {
        let connector = Arc::new(FakeConnector::default());
        let (manager, rx, _) = manager(connector.clone(), FakeProbe::new(true));
        manager.connect().await;

        let server = connector.take_server();
        server.to_client.unbounded_send(Ok("{\"type\":\"update\"}".into())).unwrap();
        assert_eq!(rx.recv_async().await.unwrap(), "{\"type\":\"update\"}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_retries_once_after_delay() {
        let connector = FakeConnector::refusing();
        let (manager, _rx, _) = manager(connector.clone(), FakeProbe::new(false));

        manager.connect().await;
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(connector.attempts(), 1);

        tokio::time::sleep(Duration::from_millis(4999)).await;
        assert_eq!(connector.attempts(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(connector.attempts(), 2);

        // The second failure schedules exactly one more attempt, not a burst.
        tokio::time::sleep(Duration::from_millis(4990)).await;
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabling_auto_reconnect_cancels_pending_attempt() {
        let connector = FakeConnector::refusing();
        let (manager, _rx, _) = manager(connector.clone(), FakeProbe::new(false));

        manager.connect().await;
        manager.set_auto_reconnect(false);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_close_triggers_reconnect() {
        let connector = Arc::new(FakeConnector::default());
        let (manager, _rx, _) = manager(connector.clone(), FakeProbe::new(true));
        manager.connect().await;

        let server = connector.take_server();
        drop(server);
        let mut state = manager.subscribe_state();
        state
            .wait_for(|s| *s == ConnectionState::Disconnected)
            .await
            .unwrap();
        assert_eq!(connector.attempts(), 1);

        tokio::time::sleep(Duration::from_millis(5001)).await;
        assert_eq!(connector.attempts(), 2);
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_disconnect_suppresses_reconnect() {
        let connector = Arc::new(FakeConnector::default());
        let (manager, _rx, _) = manager(connector.clone(), FakeProbe::new(true));
        manager.connect().await;
        let mut server = connector.take_server();

        manager.disconnect();
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(manager.auto_reconnect());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(connector.attempts(), 1);
        // The session closed its end of the socket.
        while server.from_client.next().await.is_some() {}
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_disconnect_refreshes_liveness_badge() {
        let connector = Arc::new(FakeConnector::default());
        let probe = FakeProbe::new(true);
        let (manager, _rx, status) = manager(connector.clone(), probe.clone());
        let mut events = status.subscribe();
        manager.connect().await;

        manager.disconnect();
        tokio::time::sleep(Duration::from_secs(10)).await;

        let mut last_badge = None;
        while let Ok(event) = events.try_recv() {
            if let StatusEvent::Liveness { liveness } = event {
                last_badge = Some(liveness);
            }
        }
        assert_eq!(last_badge, Some(Liveness::AliveNotLinked));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_attempt_discards_late_transport() {
        let connector = Arc::new(FakeConnector::default());
        *connector.latency.lock().unwrap() = Duration::from_millis(100);
        let (manager, _rx, _) = manager(connector.clone(), FakeProbe::new(true));

        let pending = manager.clone();
        tokio::spawn(async move { pending.connect().await });
        settle().await;
        assert_eq!(manager.state(), ConnectionState::Connecting);

        manager.disconnect();
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(connector.attempts(), 1);
        assert_eq!(
            manager.send(&Outbound::query_active_streams()),
            Err(ConnectionError::NotConnected)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_requires_connection() {
        let connector = Arc::new(FakeConnector::default());
        let (manager, _rx, _) = manager(connector.clone(), FakeProbe::new(true));
        let id = "imu.pitch".parse().unwrap();

        assert_eq!(
            manager.send(&Outbound::subscribe(&id)),
            Err(ConnectionError::NotConnected)
        );

        manager.connect().await;
        manager.send(&Outbound::subscribe(&id)).unwrap();
        let mut server = connector.take_server();
        let _query = server.from_client.next().await.unwrap();
        assert_eq!(
            server.from_client.next().await.unwrap(),
            r#"{"type":"subscribe","stream_id":"imu.pitch"}"#
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_liveness() {
        let probe = FakeProbe::new(true);
        let connector = Arc::new(FakeConnector::default());
        let (manager, _rx, _) = manager(connector.clone(), probe.clone());

        assert_eq!(manager.probe_liveness().await, Liveness::AliveNotLinked);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);

        manager.connect().await;
        assert_eq!(manager.probe_liveness().await, Liveness::Linked);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        // Probing never opens the socket.
        assert_eq!(connector.attempts(), 1);

        let (dead, _rx, _) = self::manager(FakeConnector::refusing(), FakeProbe::new(false));
        assert_eq!(dead.probe_liveness().await, Liveness::Unreachable);
    }
}
