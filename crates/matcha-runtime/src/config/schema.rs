//! Configuration schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use matcha_adapter_onebot::{OneBotConfig, SegmentFormat};
use matcha_core::{BotIdentity, MessageFormat};
use matcha_transport::DriverConfig;
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchaConfig {
    /// Connection to the bot program.
    #[serde(default)]
    pub connect: ConnectConfig,

    /// The bot identity the simulator logs in as. Without one the adapter
    /// stays idle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot: Option<BotConfig>,

    /// File cache settings.
    #[serde(default)]
    pub files: FilesConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MatchaConfig {
    /// Settings handed to the OneBot bindings.
    pub fn onebot(&self) -> OneBotConfig {
        OneBotConfig {
            message_format: self.connect.message_format,
            fragment_ttl_secs: self.files.fragment_ttl,
            max_upload_size: self.files.max_upload_size,
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// Protocol spoken with the bot program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolKind {
    #[default]
    OnebotV11,
    OnebotV12,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnebotV11 => "onebot-v11",
            Self::OnebotV12 => "onebot-v12",
        }
    }
}

impl std::fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the simulator reaches the bot program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Reverse WebSocket: the simulator dials out.
    #[default]
    WsClient,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WsClient => f.write_str("ws-client"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectConfig {
    #[serde(default)]
    pub protocol: ProtocolKind,

    #[serde(default)]
    pub transport: TransportKind,

    #[serde(default = "default_url")]
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,

    /// Seconds between reconnect attempts.
    #[serde(default = "default_interval")]
    pub reconnect_interval: u64,

    /// Seconds between heartbeat events.
    #[serde(default = "default_interval")]
    pub heartbeat_interval: u64,

    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Push events caused by the bot itself.
    #[serde(default)]
    pub post_self_events: bool,

    /// Notify on every failed attempt instead of once per failure streak.
    #[serde(default = "default_true")]
    pub notify_every_failure: bool,

    /// V11 only.
    #[serde(default)]
    pub message_format: SegmentFormat,

    /// Frame encoding of pushed events.
    #[serde(default)]
    pub event_format: MessageFormat,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolKind::default(),
            transport: TransportKind::default(),
            url: default_url(),
            access_token: None,
            reconnect_interval: default_interval(),
            heartbeat_interval: default_interval(),
            auto_reconnect: true,
            post_self_events: false,
            notify_every_failure: true,
            message_format: SegmentFormat::default(),
            event_format: MessageFormat::default(),
        }
    }
}

impl ConnectConfig {
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }

    pub fn to_driver_config(&self) -> DriverConfig {
        DriverConfig {
            url: self.url.clone(),
            reconnect_interval: Duration::from_secs(self.reconnect_interval),
            heartbeat_interval: self.heartbeat(),
            auto_reconnect: self.auto_reconnect,
            notify_every_failure: self.notify_every_failure,
            event_format: self.event_format,
        }
    }
}

fn default_url() -> String {
    "ws://127.0.0.1:8120/onebot/v11/ws".to_string()
}

fn default_interval() -> u64 {
    3
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Bot
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

impl From<&BotConfig> for BotIdentity {
    fn from(bot: &BotConfig) -> Self {
        BotIdentity::new(bot.id.clone(), bot.name.clone())
    }
}

// =============================================================================
// Files
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Where cached blobs live. Defaults to the user cache dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Base of the URLs handed out for cached files.
    #[serde(default = "default_assets_base_url")]
    pub assets_base_url: String,

    /// Seconds an unfinished fragmented upload is kept.
    #[serde(default = "default_fragment_ttl")]
    pub fragment_ttl: u64,

    /// Largest file, in bytes, a fragmented upload may declare.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            assets_base_url: default_assets_base_url(),
            fragment_ttl: default_fragment_ttl(),
            max_upload_size: default_max_upload_size(),
        }
    }
}

impl FilesConfig {
    /// The configured cache dir, else `<user cache dir>/matcha`, else `./.matcha-cache`.
    pub fn resolve_cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .map(|dir| dir.join("matcha"))
                .unwrap_or_else(|| PathBuf::from(".matcha-cache"))
        })
    }
}

fn default_assets_base_url() -> String {
    "http://127.0.0.1:8121/matcha/cache".to_string()
}

fn default_fragment_ttl() -> u64 {
    600
}

fn default_max_upload_size() -> u64 {
    64 * 1024 * 1024
}

// =============================================================================
// Logging
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature; falls back to compact otherwise.
    Json,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Required when `output` is `file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    /// Per-target levels, e.g. `matcha_transport = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,

    #[serde(default)]
    pub thread_ids: bool,

    /// Include file and line of the call site.
    #[serde(default)]
    pub file_location: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: MatchaConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.connect.protocol, ProtocolKind::OnebotV11);
        assert_eq!(config.connect.url, "ws://127.0.0.1:8120/onebot/v11/ws");
        assert_eq!(config.connect.reconnect_interval, 3);
        assert!(config.connect.auto_reconnect);
        assert!(!config.connect.post_self_events);
        assert!(config.bot.is_none());
        assert_eq!(config.files.fragment_ttl, 600);
        assert_eq!(config.files.max_upload_size, 64 * 1024 * 1024);
        assert_eq!(config.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_parse_full_document() {
        let yaml = r#"
connect:
  protocol: onebot-v12
  url: ws://localhost:9000/ws
  access_token: secret
  heartbeat_interval: 5
  message_format: string
  event_format: msgpack
bot:
  id: "10000"
  name: tea
files:
  fragment_ttl: 30
  max_upload_size: 1024
logging:
  level: debug
  filters:
    matcha_transport: trace
"#;
        let config: MatchaConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.connect.protocol, ProtocolKind::OnebotV12);
        assert_eq!(config.connect.access_token.as_deref(), Some("secret"));
        assert_eq!(config.connect.heartbeat(), Duration::from_secs(5));
        assert_eq!(config.connect.event_format, MessageFormat::Msgpack);
        assert_eq!(BotIdentity::from(config.bot.as_ref().unwrap()), BotIdentity::new("10000", "tea"));
        assert_eq!(config.logging.filters["matcha_transport"], LogLevel::Trace);

        let onebot = config.onebot();
        assert_eq!(onebot.message_format, SegmentFormat::String);
        assert_eq!(onebot.fragment_ttl(), Duration::from_secs(30));
        assert_eq!(onebot.max_upload_size, 1024);
    }

    #[test]
    fn test_driver_config_mapping() {
        let connect = ConnectConfig {
            reconnect_interval: 7,
            notify_every_failure: false,
            ..Default::default()
        };
        let driver = connect.to_driver_config();
        assert_eq!(driver.reconnect_interval, Duration::from_secs(7));
        assert_eq!(driver.heartbeat_interval, Duration::from_secs(3));
        assert!(!driver.notify_every_failure);
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let result: Result<MatchaConfig, _> = serde_yaml::from_str("logging:\n  level: loud\n");
        assert!(result.is_err());
    }
}
