//! Self-healing reverse WebSocket client.
//!
//! The driver keeps at most one live session. A session that ends for any
//! reason other than [`WsClientDriver::stop`] schedules exactly one reconnect
//! after the configured interval.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use matcha_core::{
    ActionRequest, ConnectionHandle, ConnectionHandler, Frame, MessageFormat, Notifier,
};

use crate::connector::{Connector, Inbound};

// =============================================================================
// Configuration
// =============================================================================

/// Driver settings.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub url: String,
    pub reconnect_interval: Duration,
    pub heartbeat_interval: Duration,
    pub auto_reconnect: bool,
    /// Notify on every failed attempt instead of once per failure streak.
    pub notify_every_failure: bool,
    /// Encoding of pushed events.
    pub event_format: MessageFormat,
}

impl DriverConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_interval: Duration::from_secs(3),
            heartbeat_interval: Duration::from_secs(3),
            auto_reconnect: true,
            notify_every_failure: true,
            event_format: MessageFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Disconnected,
    Connecting,
    Connected,
}

// =============================================================================
// Driver
// =============================================================================

struct Session {
    generation: u64,
    shutdown: CancellationToken,
    link: ConnectionHandle,
}

struct PendingReconnect {
    id: u64,
    task: JoinHandle<()>,
}

struct DriverInner {
    config: DriverConfig,
    connector: Arc<dyn Connector>,
    handler: Arc<dyn ConnectionHandler>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<DriverState>,
    explicitly_closed: AtomicBool,
    /// Bumped by every connect attempt and every disconnect; stale attempts
    /// and sessions compare against it.
    generation: AtomicU64,
    session: Mutex<Option<Session>>,
    reconnect: Mutex<Option<PendingReconnect>>,
    reconnects_scheduled: AtomicU64,
    failure_notified: AtomicBool,
}

/// Reverse WebSocket client driver.
#[derive(Clone)]
pub struct WsClientDriver {
    inner: Arc<DriverInner>,
}

impl WsClientDriver {
    pub fn new(
        config: DriverConfig,
        connector: Arc<dyn Connector>,
        handler: Arc<dyn ConnectionHandler>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            inner: Arc::new(DriverInner {
                config,
                connector,
                handler,
                notifier,
                state: Mutex::new(DriverState::Disconnected),
                explicitly_closed: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                session: Mutex::new(None),
                reconnect: Mutex::new(None),
                reconnects_scheduled: AtomicU64::new(0),
                failure_notified: AtomicBool::new(false),
            }),
        }
    }

    /// Drops any stale session and connects.
    pub async fn run(&self) {
        disconnect(&self.inner).await;
        self.inner.explicitly_closed.store(false, Ordering::SeqCst);
        connect(self.inner.clone()).await;
    }

    /// Closes the session for good. Pending reconnects are cancelled.
    pub async fn stop(&self) {
        self.inner.explicitly_closed.store(true, Ordering::SeqCst);
        cancel_reconnect(&self.inner);
        disconnect(&self.inner).await;
        info!(url = %self.inner.config.url, "Driver stopped");
    }

    pub fn state(&self) -> DriverState {
        *self.inner.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == DriverState::Connected
    }

    /// Outbound handle of the live session.
    pub fn link(&self) -> Option<ConnectionHandle> {
        self.inner.session.lock().as_ref().map(|s| s.link.clone())
    }

    /// Number of reconnects scheduled so far.
    pub fn reconnects_scheduled(&self) -> u64 {
        self.inner.reconnects_scheduled.load(Ordering::SeqCst)
    }

    pub fn has_pending_reconnect(&self) -> bool {
        self.inner.reconnect.lock().is_some()
    }
}

// =============================================================================
// Connection lifecycle
// =============================================================================

fn connect(inner: Arc<DriverInner>) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if inner.explicitly_closed.load(Ordering::SeqCst) || inner.config.url.is_empty() {
            return;
        }
        {
            let mut state = inner.state.lock();
            if *state != DriverState::Disconnected {
                return;
            }
            *state = DriverState::Connecting;
        }
        cancel_reconnect(&inner);
        let attempt = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let url = inner.config.url.clone();

        info!(url = %url, "Connecting to bot program");
        let headers = inner.handler.connect_headers();
        let shutdown = CancellationToken::new();
        let result = inner.connector.connect(&url, &headers, shutdown.clone()).await;

        if inner.generation.load(Ordering::SeqCst) != attempt
            || inner.explicitly_closed.load(Ordering::SeqCst)
        {
            debug!(url = %url, "Discarding superseded connect attempt");
            shutdown.cancel();
            return;
        }

        let wire = match result {
            Ok(wire) => wire,
            Err(e) => {
                *inner.state.lock() = DriverState::Disconnected;
                warn!(url = %url, error = %e, "Connection attempt failed");
                let first = !inner.failure_notified.swap(true, Ordering::SeqCst);
                if first || inner.config.notify_every_failure {
                    inner.notifier.connect_failed(&url, &e);
                }
                schedule_reconnect(&inner);
                return;
            }
        };

        let link = ConnectionHandle::new(wire.outgoing, inner.config.event_format);
        *inner.session.lock() = Some(Session {
            generation: attempt,
            shutdown: shutdown.clone(),
            link: link.clone(),
        });
        *inner.state.lock() = DriverState::Connected;
        inner.failure_notified.store(false, Ordering::SeqCst);

        tokio::spawn(read_loop(
            inner.clone(),
            wire.incoming,
            link.clone(),
            shutdown.clone(),
            attempt,
        ));
        inner.handler.on_connect(link.clone()).await;
        tokio::spawn(heartbeat_loop(
            inner.handler.clone(),
            link,
            shutdown,
            inner.config.heartbeat_interval,
        ));
        info!(url = %url, "Connected to bot program");
        inner.notifier.connected(&url);
    })
}

async fn disconnect(inner: &DriverInner) {
    inner.generation.fetch_add(1, Ordering::SeqCst);
    let session = inner.session.lock().take();
    *inner.state.lock() = DriverState::Disconnected;
    if let Some(session) = session {
        session.shutdown.cancel();
        inner.handler.on_disconnect().await;
    }
}

/// Tears down the session `generation` after a failure and schedules a
/// reconnect. Ignored when that session is no longer current.
async fn connection_lost(inner: &Arc<DriverInner>, generation: u64) {
    let current = inner
        .session
        .lock()
        .as_ref()
        .is_some_and(|s| s.generation == generation);
    if !current {
        return;
    }
    disconnect(inner).await;
    schedule_reconnect(inner);
}

fn schedule_reconnect(inner: &Arc<DriverInner>) {
    if inner.explicitly_closed.load(Ordering::SeqCst) || !inner.config.auto_reconnect {
        return;
    }
    let id = inner.reconnects_scheduled.fetch_add(1, Ordering::SeqCst) + 1;
    let delay = inner.config.reconnect_interval;
    info!(url = %inner.config.url, delay = ?delay, "Scheduling reconnect");

    let next = inner.clone();
    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        {
            let mut slot = next.reconnect.lock();
            if slot.as_ref().is_none_or(|p| p.id != id) {
                return;
            }
            // Detach from the slot so the connect below does not abort us.
            slot.take();
        }
        connect(next).await;
    });

    let mut slot = inner.reconnect.lock();
    if let Some(previous) = slot.replace(PendingReconnect { id, task }) {
        previous.task.abort();
    }
}

fn cancel_reconnect(inner: &DriverInner) {
    if let Some(pending) = inner.reconnect.lock().take() {
        pending.task.abort();
    }
}

// =============================================================================
// Session tasks
// =============================================================================

async fn read_loop(
    inner: Arc<DriverInner>,
    mut incoming: mpsc::Receiver<Inbound>,
    link: ConnectionHandle,
    shutdown: CancellationToken,
    generation: u64,
) {
    loop {
        let inbound = tokio::select! {
            _ = shutdown.cancelled() => return,
            inbound = incoming.recv() => inbound,
        };
        match inbound {
            Some(Inbound::Frame(frame)) => {
                tokio::spawn(handle_frame(inner.handler.clone(), frame, link.clone()));
            }
            Some(Inbound::Close(reason)) => {
                info!(reason = ?reason, "Bot program closed the connection");
                break;
            }
            Some(Inbound::Unknown) => {
                warn!("Unrecognized frame, dropping connection");
                break;
            }
            Some(Inbound::Error(e)) => {
                warn!(error = %e, "WebSocket error");
                break;
            }
            None => {
                info!("WebSocket stream ended");
                break;
            }
        }
    }
    connection_lost(&inner, generation).await;
}

async fn handle_frame(handler: Arc<dyn ConnectionHandler>, frame: Frame, link: ConnectionHandle) {
    let format = frame.format();
    let request: ActionRequest = match frame.decode() {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Undecodable action request");
            return;
        }
    };
    let echo = request.echo.clone();
    let response = handler.on_action(request, &link).await.with_echo(echo);
    match Frame::encode(&response, format) {
        Ok(frame) => {
            if let Err(e) = link.send(frame).await {
                warn!(error = %e, "Failed to send action response");
            }
        }
        Err(e) => error!(error = %e, "Failed to encode action response"),
    }
}

async fn heartbeat_loop(
    handler: Arc<dyn ConnectionHandler>,
    link: ConnectionHandle,
    shutdown: CancellationToken,
    period: Duration,
) {
    if period.is_zero() {
        return;
    }
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => handler.on_heartbeat(&link).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use matcha_core::{ActionResponse, Payload, TransportError, TransportResult};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    use crate::connector::WireSession;

    /// Peer side of one mock connection.
    struct Peer {
        to_driver: mpsc::Sender<Inbound>,
        from_driver: mpsc::Receiver<Frame>,
        shutdown: CancellationToken,
    }

    #[derive(Default)]
    struct MockConnector {
        fail: AtomicBool,
        attempts: AtomicUsize,
        headers: Mutex<Vec<(String, String)>>,
        peers: Mutex<Vec<Peer>>,
    }

    impl MockConnector {
        fn failing() -> Self {
            let connector = Self::default();
            connector.fail.store(true, Ordering::SeqCst);
            connector
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        fn take_peer(&self) -> Peer {
            self.peers.lock().remove(0)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(
            &self,
            url: &str,
            headers: &[(String, String)],
            shutdown: CancellationToken,
        ) -> TransportResult<WireSession> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            *self.headers.lock() = headers.to_vec();
            if self.fail.load(Ordering::SeqCst) {
                return Err(TransportError::ConnectionFailed {
                    url: url.to_owned(),
                    reason: "refused".into(),
                });
            }
            let (out_tx, out_rx) = mpsc::channel(16);
            let (in_tx, in_rx) = mpsc::channel(16);
            self.peers.lock().push(Peer {
                to_driver: in_tx,
                from_driver: out_rx,
                shutdown,
            });
            Ok(WireSession {
                outgoing: out_tx,
                incoming: in_rx,
            })
        }
    }

    #[derive(Default)]
    struct EchoHandler {
        connects: AtomicUsize,
        heartbeats: AtomicUsize,
        disconnects: AtomicUsize,
    }

    #[async_trait]
    impl ConnectionHandler for EchoHandler {
        fn connect_headers(&self) -> Vec<(String, String)> {
            vec![("X-Self-ID".into(), "10000".into())]
        }

        async fn on_connect(&self, _link: ConnectionHandle) {
            self.connects.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_heartbeat(&self, _link: &ConnectionHandle) {
            self.heartbeats.fetch_add(1, Ordering::SeqCst);
        }

        async fn on_action(&self, request: ActionRequest, _link: &ConnectionHandle) -> ActionResponse {
            if request.action == "get_status" {
                ActionResponse::ok(Payload::from(json!({"online": true})))
            } else {
                ActionResponse::failed(1404)
            }
        }

        async fn on_disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct CountingNotifier {
        connected: AtomicUsize,
        failed: AtomicUsize,
    }

    impl Notifier for CountingNotifier {
        fn connected(&self, _url: &str) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }

        fn connect_failed(&self, _url: &str, _error: &TransportError) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        driver: WsClientDriver,
        connector: Arc<MockConnector>,
        handler: Arc<EchoHandler>,
        notifier: Arc<CountingNotifier>,
    }

    fn fixture(connector: MockConnector, configure: impl FnOnce(&mut DriverConfig)) -> Fixture {
        let mut config = DriverConfig::new("ws://127.0.0.1:8120/onebot/v11/ws");
        configure(&mut config);
        let connector = Arc::new(connector);
        let handler = Arc::new(EchoHandler::default());
        let notifier = Arc::new(CountingNotifier::default());
        let driver = WsClientDriver::new(config, connector.clone(), handler.clone(), notifier.clone());
        Fixture {
            driver,
            connector,
            handler,
            notifier,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_sends_handler_headers() {
        let f = fixture(MockConnector::default(), |_| {});
        f.driver.run().await;
        assert!(f.driver.is_connected());
        assert_eq!(f.handler.connects.load(Ordering::SeqCst), 1);
        assert_eq!(f.notifier.connected.load(Ordering::SeqCst), 1);
        assert_eq!(
            f.connector.headers.lock().clone(),
            vec![("X-Self-ID".to_owned(), "10000".to_owned())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_frame_schedules_one_reconnect() {
        let f = fixture(MockConnector::default(), |_| {});
        f.driver.run().await;
        let peer = f.connector.take_peer();
        let stale_link = f.driver.link().unwrap();

        peer.to_driver.send(Inbound::Close(None)).await.unwrap();
        settle().await;

        assert_eq!(f.driver.state(), DriverState::Disconnected);
        assert_eq!(f.driver.reconnects_scheduled(), 1);
        assert!(f.driver.link().is_none());
        assert!(peer.shutdown.is_cancelled());
        assert_eq!(f.handler.disconnects.load(Ordering::SeqCst), 1);

        drop(peer);
        assert!(stale_link.send(Frame::Text("{}".into())).await.is_err());

        tokio::time::sleep(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(f.connector.attempts(), 2);
        assert!(f.driver.is_connected());
        assert_eq!(f.driver.reconnects_scheduled(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_frame_is_connection_loss() {
        let f = fixture(MockConnector::default(), |_| {});
        f.driver.run().await;
        let peer = f.connector.take_peer();
        peer.to_driver.send(Inbound::Unknown).await.unwrap();
        settle().await;
        assert_eq!(f.driver.state(), DriverState::Disconnected);
        assert_eq!(f.driver.reconnects_scheduled(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_waits_full_interval() {
        let f = fixture(MockConnector::failing(), |c| {
            c.reconnect_interval = Duration::from_secs(5)
        });
        f.driver.run().await;
        assert_eq!(f.connector.attempts(), 1);
        assert!(f.driver.has_pending_reconnect());

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert_eq!(f.connector.attempts(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(f.connector.attempts(), 2);
        assert!(f.driver.has_pending_reconnect());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_twice_keeps_one_pending_reconnect() {
        let f = fixture(MockConnector::failing(), |_| {});
        f.driver.run().await;
        f.driver.run().await;
        assert_eq!(f.connector.attempts(), 2);

        tokio::time::sleep(Duration::from_millis(3100)).await;
        assert_eq!(f.connector.attempts(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_reconnect() {
        let f = fixture(MockConnector::failing(), |_| {});
        f.driver.run().await;
        f.driver.stop().await;
        assert!(!f.driver.has_pending_reconnect());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(f.connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_reconnect_when_disabled() {
        let f = fixture(MockConnector::failing(), |c| c.auto_reconnect = false);
        f.driver.run().await;
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(f.connector.attempts(), 1);
        assert_eq!(f.driver.reconnects_scheduled(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_notified_once_per_streak() {
        let f = fixture(MockConnector::failing(), |c| {
            c.notify_every_failure = false;
            c.reconnect_interval = Duration::from_secs(1);
        });
        f.driver.run().await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(f.connector.attempts(), 3);
        assert_eq!(f.notifier.failed.load(Ordering::SeqCst), 1);

        f.connector.fail.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(f.driver.is_connected());
        assert_eq!(f.notifier.connected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_failure_notified_when_configured() {
        let f = fixture(MockConnector::failing(), |c| c.reconnect_interval = Duration::from_secs(1));
        f.driver.run().await;
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(f.notifier.failed.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_echo_and_framing() {
        let f = fixture(MockConnector::default(), |_| {});
        f.driver.run().await;
        let mut peer = f.connector.take_peer();

        let text = json!({"action": "get_status", "params": {}, "echo": "X"}).to_string();
        peer.to_driver.send(Inbound::Frame(Frame::Text(text))).await.unwrap();
        let reply = peer.from_driver.recv().await.unwrap();
        let Frame::Text(body) = reply else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["echo"], "X");
        assert_eq!(value["status"], "ok");

        let request = ActionRequest {
            echo: Some(Payload::from("Y")),
            ..ActionRequest::new("nope", json!({}))
        };
        let binary = Frame::encode(&request, MessageFormat::Msgpack).unwrap();
        peer.to_driver.send(Inbound::Frame(binary)).await.unwrap();
        let reply = peer.from_driver.recv().await.unwrap();
        assert_eq!(reply.format(), MessageFormat::Msgpack);
        let response: ActionResponse = reply.decode().unwrap();
        assert_eq!(response.retcode, 1404);
        assert_eq!(response.echo, Some(Payload::from("Y")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_runs_only_while_connected() {
        let f = fixture(MockConnector::default(), |c| {
            c.heartbeat_interval = Duration::from_secs(1);
            c.auto_reconnect = false;
        });
        f.driver.run().await;
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(f.handler.heartbeats.load(Ordering::SeqCst), 3);

        f.driver.stop().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(f.handler.heartbeats.load(Ordering::SeqCst), 3);
    }
}
