//! Binds one protocol to one driver and publishes scenes.
//!
//! Lifecycle: `idle → starting → running → stopping → idle`. The adapter
//! owns a single driver slot; `startup`, `shutdown` and `reboot` are
//! serialized so two drivers are never alive at once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use matcha_core::{
    ActionRequest, ActionResponse, Behav, ConnectionHandle, ConnectionHandler, Notifier, Protocol,
    Scene,
};
use matcha_transport::{Connector, WsClientDriver};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ConnectConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl std::fmt::Display for AdapterState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

// =============================================================================
// Connection handler
// =============================================================================

/// The driver-facing half: answers actions and pushes events.
struct Binding {
    protocol: Arc<dyn Protocol>,
    behav: Arc<Behav>,
    access_token: Option<String>,
    heartbeat: Duration,
    post_self_events: bool,
    link: Mutex<Option<ConnectionHandle>>,
}

impl Binding {
    async fn publish(&self, scene: Scene) {
        let event = match self.protocol.render(&scene).await {
            Ok(event) => event,
            Err(e) => {
                warn!(protocol = self.protocol.name(), scene = %scene.key(), error = %e, "Failed to render scene");
                None
            }
        };

        let bot_id = self.behav.bot().id();
        let from_self = scene.actor_id() == Some(bot_id.as_str());
        let mut pushed = false;
        if let Some(event) = &event
            && (self.post_self_events || !from_self)
        {
            let link = self.link.lock().clone();
            if let Some(link) = link {
                match link.send_event(event).await {
                    Ok(()) => pushed = true,
                    Err(e) => warn!(scene = %scene.key(), error = %e, "Failed to push event"),
                }
            }
        }
        debug!(scene = %scene.key(), pushed, "Scene published");
        self.behav.chat().append(scene, event, pushed);
    }
}

#[async_trait]
impl ConnectionHandler for Binding {
    fn connect_headers(&self) -> Vec<(String, String)> {
        self.protocol.connect_headers(self.access_token.as_deref())
    }

    async fn on_connect(&self, link: ConnectionHandle) {
        *self.link.lock() = Some(link.clone());
        for event in self.protocol.connect_events(self.heartbeat) {
            if let Err(e) = link.send_event(&event).await {
                warn!(error = %e, "Failed to send connect event");
            }
        }
    }

    async fn on_heartbeat(&self, link: &ConnectionHandle) {
        let event = self.protocol.heartbeat_event(self.heartbeat);
        if let Err(e) = link.send_event(&event).await {
            debug!(error = %e, "Failed to send heartbeat");
        }
    }

    async fn on_action(&self, request: ActionRequest, _link: &ConnectionHandle) -> ActionResponse {
        let (response, scenes) = self.protocol.dispatch(&request).await;
        for scene in scenes {
            self.publish(scene).await;
        }
        response
    }

    async fn on_disconnect(&self) {
        self.link.lock().take();
    }
}

// =============================================================================
// Adapter
// =============================================================================

struct DriverSlot {
    driver: WsClientDriver,
    run: JoinHandle<()>,
}

pub struct Adapter {
    binding: Arc<Binding>,
    connect: ConnectConfig,
    connector: Arc<dyn Connector>,
    notifier: Arc<dyn Notifier>,
    state: Mutex<AdapterState>,
    slot: Mutex<Option<DriverSlot>>,
    lifecycle: tokio::sync::Mutex<()>,
}

impl Adapter {
    pub fn new(
        protocol: Arc<dyn Protocol>,
        behav: Arc<Behav>,
        connect: ConnectConfig,
        connector: Arc<dyn Connector>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            binding: Arc::new(Binding {
                protocol,
                behav,
                access_token: connect.access_token.clone(),
                heartbeat: connect.heartbeat(),
                post_self_events: connect.post_self_events,
                link: Mutex::new(None),
            }),
            connect,
            connector,
            notifier,
            state: Mutex::new(AdapterState::Idle),
            slot: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn protocol_name(&self) -> &'static str {
        self.binding.protocol.name()
    }

    pub fn state(&self) -> AdapterState {
        *self.state.lock()
    }

    /// The live driver, if any.
    pub fn driver(&self) -> Option<WsClientDriver> {
        self.slot.lock().as_ref().map(|s| s.driver.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.driver().is_some_and(|d| d.is_connected())
    }

    /// Renders `scene`, pushes it when connected and appends it to the chat log.
    ///
    /// Scenes caused by the bot itself are only pushed with `post_self_events`.
    pub async fn publish(&self, scene: Scene) {
        self.binding.publish(scene).await;
    }

    /// Runs an action as if it arrived from the bot program.
    pub async fn handle_action(&self, request: ActionRequest) -> ActionResponse {
        let echo = request.echo.clone();
        let (response, scenes) = self.binding.protocol.dispatch(&request).await;
        for scene in scenes {
            self.binding.publish(scene).await;
        }
        response.with_echo(echo)
    }

    /// Starts the driver. No-op when already running or no bot is assigned.
    pub async fn startup(&self) {
        let _guard = self.lifecycle.lock().await;
        self.start_locked();
    }

    /// Stops and discards the driver.
    pub async fn shutdown(&self) {
        let _guard = self.lifecycle.lock().await;
        self.stop_locked().await;
    }

    /// Shutdown followed by startup, as one step.
    pub async fn reboot(&self) {
        let _guard = self.lifecycle.lock().await;
        info!(protocol = self.protocol_name(), "Rebooting adapter");
        self.stop_locked().await;
        self.start_locked();
    }

    fn start_locked(&self) {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            debug!(protocol = self.protocol_name(), "Adapter already running");
            return;
        }
        if !self.binding.behav.bot().is_assigned() {
            debug!(protocol = self.protocol_name(), "No bot assigned, adapter stays idle");
            return;
        }
        *self.state.lock() = AdapterState::Starting;

        let driver = WsClientDriver::new(
            self.connect.to_driver_config(),
            self.connector.clone(),
            self.binding.clone(),
            self.notifier.clone(),
        );
        let runner = driver.clone();
        let run = tokio::spawn(async move { runner.run().await });
        *slot = Some(DriverSlot { driver, run });

        *self.state.lock() = AdapterState::Running;
        info!(protocol = self.protocol_name(), url = %self.connect.url, "Adapter started");
    }

    async fn stop_locked(&self) {
        let Some(DriverSlot { driver, run }) = self.slot.lock().take() else {
            return;
        };
        *self.state.lock() = AdapterState::Stopping;
        // a connect still in flight must not outlive the driver
        run.abort();
        driver.stop().await;
        *self.state.lock() = AdapterState::Idle;
        info!(protocol = self.protocol_name(), "Adapter stopped");
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use matcha_adapter_onebot::{OneBotConfig, OneBotContext, OneBotV11};
    use matcha_core::{
        ActiveBot, BotIdentity, ChatLog, Content, FileCache, Frame, Group, LogNotifier, Member,
        MemoryBlobs, MemoryStore, Role, Store, TransportResult, User,
    };
    use matcha_transport::WireSession;
    use serde_json::{Value, json};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use matcha_transport::Inbound;

    /// Bot program side of one in-memory connection.
    pub(crate) struct Peer {
        pub to_driver: mpsc::Sender<Inbound>,
        pub from_driver: mpsc::Receiver<Frame>,
        pub shutdown: CancellationToken,
        pub headers: Vec<(String, String)>,
    }

    impl Peer {
        /// Next JSON frame from the simulator.
        pub async fn recv_json(&mut self) -> Value {
            match self.from_driver.recv().await {
                Some(Frame::Text(text)) => serde_json::from_str(&text).unwrap(),
                other => panic!("expected a text frame, got {other:?}"),
            }
        }

        pub async fn send_json(&self, value: Value) {
            self.to_driver
                .send(Inbound::Frame(Frame::Text(value.to_string())))
                .await
                .unwrap();
        }
    }

    #[derive(Default)]
    pub(crate) struct MemoryConnector {
        pub attempts: AtomicUsize,
        pub peers: parking_lot::Mutex<Vec<Peer>>,
    }

    impl MemoryConnector {
        pub fn take_peer(&self) -> Peer {
            self.peers.lock().remove(0)
        }

        pub fn live_peers(&self) -> usize {
            self.peers.lock().iter().filter(|p| !p.shutdown.is_cancelled()).count()
        }
    }

    #[async_trait]
    impl Connector for MemoryConnector {
        async fn connect(
            &self,
            _url: &str,
            headers: &[(String, String)],
            shutdown: CancellationToken,
        ) -> TransportResult<WireSession> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let (out_tx, out_rx) = mpsc::channel(64);
            let (in_tx, in_rx) = mpsc::channel(64);
            self.peers.lock().push(Peer {
                to_driver: in_tx,
                from_driver: out_rx,
                shutdown,
                headers: headers.to_vec(),
            });
            Ok(WireSession {
                outgoing: out_tx,
                incoming: in_rx,
            })
        }
    }

    /// Lets spawned tasks run until they block.
    pub(crate) async fn settle() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    async fn world() -> (Arc<Behav>, Arc<FileCache>) {
        let store = Arc::new(MemoryStore::new());
        store.put_user(User::new("10000", "bot")).await.unwrap();
        store.put_user(User::new("10001", "alice")).await.unwrap();
        store.put_group(Group::new("123", "tea")).await.unwrap();
        store.put_member(Member::new("123", "10000", Role::Member)).await.unwrap();
        store.put_member(Member::new("123", "10001", Role::Member)).await.unwrap();
        let bot = ActiveBot::new(Some(BotIdentity::new("10000", "bot")));
        let behav = Arc::new(Behav::new(store.clone(), Arc::new(ChatLog::new()), bot));
        let files = Arc::new(FileCache::new(store, Arc::new(MemoryBlobs::new()), "http://cache"));
        (behav, files)
    }

    async fn adapter(connect: ConnectConfig) -> (Adapter, Arc<MemoryConnector>, Arc<Behav>) {
        let (behav, files) = world().await;
        let ctx = OneBotContext::new(behav.clone(), files, OneBotConfig::default());
        let connector = Arc::new(MemoryConnector::default());
        let adapter = Adapter::new(
            Arc::new(OneBotV11::new(ctx)),
            behav.clone(),
            connect,
            connector.clone(),
            Arc::new(LogNotifier),
        );
        (adapter, connector, behav)
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_sends_lifecycle_event() {
        let connect = ConnectConfig {
            access_token: Some("tok".into()),
            ..Default::default()
        };
        let (adapter, connector, _) = adapter(connect).await;
        adapter.startup().await;
        settle().await;

        assert_eq!(adapter.state(), AdapterState::Running);
        assert!(adapter.is_connected());
        let mut peer = connector.take_peer();
        assert!(peer.headers.contains(&("X-Self-ID".to_owned(), "10000".to_owned())));
        assert!(peer.headers.contains(&("Authorization".to_owned(), "Bearer tok".to_owned())));

        let event = peer.recv_json().await;
        assert_eq!(event["meta_event_type"], "lifecycle");
        assert_eq!(event["sub_type"], "connect");
    }

    #[tokio::test(start_paused = true)]
    async fn test_startup_without_bot_stays_idle() {
        let (adapter, connector, behav) = adapter(ConnectConfig::default()).await;
        behav.bot().assign(None);
        adapter.startup().await;
        settle().await;
        assert_eq!(adapter.state(), AdapterState::Idle);
        assert!(adapter.driver().is_none());
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_over_the_wire() {
        let (adapter, connector, behav) = adapter(ConnectConfig::default()).await;
        adapter.startup().await;
        settle().await;
        let mut peer = connector.take_peer();
        let _lifecycle = peer.recv_json().await;

        peer.send_json(json!({
            "action": "send_group_msg",
            "params": {"group_id": 123, "message": [{"type": "text", "data": {"text": "hi"}}]},
            "echo": "e1"
        }))
        .await;
        let response = peer.recv_json().await;
        assert_eq!(response["status"], "ok");
        assert_eq!(response["retcode"], 0);
        assert_eq!(response["echo"], "e1");
        assert!(response["data"]["message_id"].is_number());

        let entries = behav.chat().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].scene.detail_type(), "group");
        // the bot's own message is not echoed back without post_self_events
        assert!(!entries[0].pushed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_pushes_foreign_scenes() {
        let (adapter, connector, behav) = adapter(ConnectConfig::default()).await;
        adapter.startup().await;
        settle().await;
        let mut peer = connector.take_peer();
        let _lifecycle = peer.recv_json().await;

        let alice = behav.require_user("10001").await.unwrap();
        let group = behav.require_group("123").await.unwrap();
        let scene = behav
            .send_group_message(&alice, &group, vec![Content::text("hello bot")], None, None)
            .await
            .unwrap();
        adapter.publish(scene).await;

        let event = peer.recv_json().await;
        assert_eq!(event["post_type"], "message");
        assert_eq!(event["raw_message"], "hello bot");
        assert!(behav.chat().entries()[0].pushed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_while_disconnected_only_logs() {
        let (adapter, _, behav) = adapter(ConnectConfig::default()).await;
        let alice = behav.require_user("10001").await.unwrap();
        let group = behav.require_group("123").await.unwrap();
        let scene = behav
            .send_group_message(&alice, &group, vec![Content::text("anyone?")], None, None)
            .await
            .unwrap();
        adapter.publish(scene).await;

        let entries = behav.chat().entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].event.is_some());
        assert!(!entries[0].pushed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reboots_leave_one_driver() {
        let (adapter, connector, _) = adapter(ConnectConfig::default()).await;
        adapter.startup().await;
        settle().await;

        tokio::join!(adapter.reboot(), adapter.reboot());
        settle().await;

        assert_eq!(adapter.state(), AdapterState::Running);
        assert_eq!(connector.live_peers(), 1);
        assert!(adapter.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_discards_driver() {
        let (adapter, connector, _) = adapter(ConnectConfig::default()).await;
        adapter.startup().await;
        settle().await;
        let driver = adapter.driver().unwrap();

        adapter.shutdown().await;
        assert_eq!(adapter.state(), AdapterState::Idle);
        assert!(adapter.driver().is_none());
        assert!(!driver.is_connected());
        assert_eq!(connector.live_peers(), 0);

        // no reconnect after an intentional stop
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(connector.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_action_keeps_echo() {
        let (adapter, _, _) = adapter(ConnectConfig::default()).await;
        let mut request = ActionRequest::new("get_login_info", json!({}));
        request.echo = Some("x".into());
        let response = adapter.handle_action(request).await;
        assert_eq!(response.retcode, 0);
        assert_eq!(response.echo, Some("x".into()));
    }
}
