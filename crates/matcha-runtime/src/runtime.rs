//! Runtime orchestration.
//!
//! ```rust,ignore
//! use matcha_runtime::MatchaRuntime;
//!
//! // config from matcha.toml / MATCHA_* in the current directory
//! let runtime = MatchaRuntime::builder().build().await?;
//! runtime.run().await?;
//! ```

use std::path::Path;
use std::sync::Arc;

use matcha_adapter_onebot::OneBotContext;
use matcha_core::{
    ActiveBot, Behav, BlobStore, BotIdentity, ChatLog, FileCache, LogNotifier, MemoryStore,
    Notifier, Scene, Store,
};
use matcha_transport::Connector;
use parking_lot::RwLock;
use tokio::signal;
use tracing::{error, info};

use crate::adapter::Adapter;
use crate::blobs::DiskBlobs;
use crate::config::{ConfigLoader, MatchaConfig, ProtocolKind, validate_config};
use crate::error::RuntimeResult;
use crate::factory::{create_connector, create_protocol};
use crate::logging;

/// Owns the simulated world and the adapter bound to the active protocol.
pub struct MatchaRuntime {
    config: RwLock<MatchaConfig>,
    store: Arc<dyn Store>,
    behav: Arc<Behav>,
    files: Arc<FileCache>,
    connector: Arc<dyn Connector>,
    notifier: Arc<dyn Notifier>,
    adapter: tokio::sync::RwLock<Arc<Adapter>>,
}

impl MatchaRuntime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// A snapshot of the current configuration.
    pub fn config(&self) -> MatchaConfig {
        self.config.read().clone()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn behav(&self) -> &Arc<Behav> {
        &self.behav
    }

    pub fn chat(&self) -> &Arc<ChatLog> {
        self.behav.chat()
    }

    pub fn files(&self) -> &Arc<FileCache> {
        &self.files
    }

    pub fn protocol(&self) -> ProtocolKind {
        self.config.read().connect.protocol
    }

    pub async fn adapter(&self) -> Arc<Adapter> {
        self.adapter.read().await.clone()
    }

    fn build_adapter(&self, config: &MatchaConfig) -> Adapter {
        let ctx = OneBotContext::new(self.behav.clone(), self.files.clone(), config.onebot());
        Adapter::new(
            create_protocol(config.connect.protocol, ctx),
            self.behav.clone(),
            config.connect.clone(),
            self.connector.clone(),
            self.notifier.clone(),
        )
    }

    pub async fn start(&self) {
        self.adapter().await.startup().await;
    }

    pub async fn stop(&self) {
        self.adapter().await.shutdown().await;
    }

    /// Publishes a scene through the active adapter.
    pub async fn publish(&self, scene: Scene) {
        self.adapter().await.publish(scene).await;
    }

    /// Shuts down the current adapter and starts one for `kind`.
    pub async fn switch_protocol(&self, kind: ProtocolKind) {
        let mut adapter = self.adapter.write().await;
        if self.protocol() == kind {
            return;
        }
        info!(from = %self.protocol(), to = %kind, "Switching protocol");
        adapter.shutdown().await;

        let config = {
            let mut config = self.config.write();
            config.connect.protocol = kind;
            config.clone()
        };
        let next = Arc::new(self.build_adapter(&config));
        next.startup().await;
        *adapter = next;
    }

    /// Logs in as another bot (or none) and reboots the adapter.
    pub async fn assign_bot(&self, identity: Option<BotIdentity>) {
        let previous = self.behav.bot().assign(identity.clone());
        if previous == identity {
            return;
        }
        info!(
            bot = identity.as_ref().map(|b| b.id.as_str()).unwrap_or("-"),
            "Bot assignment changed"
        );
        self.adapter().await.reboot().await;
    }

    /// Starts, waits for Ctrl+C or SIGTERM, then stops.
    pub async fn run(&self) -> RuntimeResult<()> {
        self.run_until(wait_for_shutdown()).await
    }

    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await;
        info!(protocol = %self.protocol(), "Matcha runtime is running");
        shutdown.await;
        self.stop().await;
        info!("Matcha runtime stopped");
        Ok(())
    }
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => error!(error = %e, "Failed to register SIGTERM handler"),
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`MatchaRuntime`].
///
/// Collaborators left unset default to an in-memory store, a disk blob
/// store under `files.cache_dir`, the configured transport and a logging
/// notifier.
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<MatchaConfig>,
    store: Option<Arc<dyn Store>>,
    blobs: Option<Arc<dyn BlobStore>>,
    connector: Option<Arc<dyn Connector>>,
    notifier: Option<Arc<dyn Notifier>>,
    init_logging: bool,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            config: None,
            store: None,
            blobs: None,
            connector: None,
            notifier: None,
            init_logging: true,
        }
    }

    /// Uses `config` as is instead of loading one.
    pub fn config(mut self, config: MatchaConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Whether `build` installs the global subscriber (default: true).
    pub fn init_logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    pub async fn build(self) -> RuntimeResult<MatchaRuntime> {
        let config = match self.config {
            Some(config) => {
                validate_config(&config)?;
                config
            }
            None => self.config_loader.load()?,
        };
        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let store = self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let blobs: Arc<dyn BlobStore> = match self.blobs {
            Some(blobs) => blobs,
            None => Arc::new(DiskBlobs::open(config.files.resolve_cache_dir()).await?),
        };
        let connector = match self.connector {
            Some(connector) => connector,
            None => create_connector(config.connect.transport)?,
        };
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));

        let bot = ActiveBot::new(config.bot.as_ref().map(BotIdentity::from));
        let behav = Arc::new(Behav::new(store.clone(), Arc::new(ChatLog::new()), bot));
        let files = Arc::new(FileCache::new(
            store.clone(),
            blobs,
            config.files.assets_base_url.clone(),
        ));

        info!(
            protocol = %config.connect.protocol,
            transport = %config.connect.transport,
            url = %config.connect.url,
            "Runtime initialized from configuration"
        );

        let ctx = OneBotContext::new(behav.clone(), files.clone(), config.onebot());
        let adapter = Adapter::new(
            create_protocol(config.connect.protocol, ctx),
            behav.clone(),
            config.connect.clone(),
            connector.clone(),
            notifier.clone(),
        );

        Ok(MatchaRuntime {
            config: RwLock::new(config),
            store,
            behav,
            files,
            connector,
            notifier,
            adapter: tokio::sync::RwLock::new(Arc::new(adapter)),
        })
    }
}
