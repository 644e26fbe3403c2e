//! Connection seam between the wire driver and a protocol adapter.
//!
//! The driver owns the socket; adapters see a [`ConnectionHandle`] for
//! outbound traffic and implement [`ConnectionHandler`] for inbound traffic.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::action::{ActionRequest, ActionResponse};
use crate::error::{TransportError, TransportResult};

// =============================================================================
// Frames
// =============================================================================

/// Encoding used for events pushed by the simulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    #[default]
    Json,
    #[serde(alias = "messagepack")]
    Msgpack,
}

/// A single data frame. Text frames carry JSON, binary frames MessagePack.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    pub fn encode<T: Serialize>(value: &T, format: MessageFormat) -> TransportResult<Self> {
        match format {
            MessageFormat::Json => Ok(Self::Text(serde_json::to_string(value)?)),
            MessageFormat::Msgpack => rmp_serde::to_vec_named(value)
                .map(Self::Binary)
                .map_err(|e| TransportError::Codec(e.to_string())),
        }
    }

    pub fn decode<T: DeserializeOwned>(&self) -> TransportResult<T> {
        match self {
            Self::Text(text) => Ok(serde_json::from_str(text)?),
            Self::Binary(bytes) => {
                rmp_serde::from_slice(bytes).map_err(|e| TransportError::Codec(e.to_string()))
            }
        }
    }

    /// Format a reply to this frame must use.
    pub fn format(&self) -> MessageFormat {
        match self {
            Self::Text(_) => MessageFormat::Json,
            Self::Binary(_) => MessageFormat::Msgpack,
        }
    }
}

// =============================================================================
// Handles
// =============================================================================

/// Outbound side of a live session.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    tx: mpsc::Sender<Frame>,
    format: MessageFormat,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::Sender<Frame>, format: MessageFormat) -> Self {
        Self { tx, format }
    }

    pub async fn send(&self, frame: Frame) -> TransportResult<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    /// Pushes an event using the session's event format.
    pub async fn send_event<T: Serialize>(&self, event: &T) -> TransportResult<()> {
        self.send(Frame::encode(event, self.format)?).await
    }

    pub fn format(&self) -> MessageFormat {
        self.format
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Inbound side of a session, implemented by protocol adapters.
#[async_trait]
pub trait ConnectionHandler: Send + Sync {
    /// Extra handshake headers.
    fn connect_headers(&self) -> Vec<(String, String)>;

    /// Called once the handshake succeeded.
    async fn on_connect(&self, _link: ConnectionHandle) {}

    /// Called on every heartbeat tick while connected.
    async fn on_heartbeat(&self, _link: &ConnectionHandle) {}

    /// Executes one action request. The driver attaches the echo.
    async fn on_action(&self, request: ActionRequest, link: &ConnectionHandle) -> ActionResponse;

    /// Called when the session ends for any reason.
    async fn on_disconnect(&self) {}
}

// =============================================================================
// Notifications
// =============================================================================

/// Surface for connection outcome notifications.
pub trait Notifier: Send + Sync {
    fn connected(&self, url: &str);

    fn connect_failed(&self, url: &str, error: &TransportError);
}

/// Notifier that writes to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn connected(&self, url: &str) {
        info!(url = %url, "Connected to bot program");
    }

    fn connect_failed(&self, url: &str, error: &TransportError) {
        warn!(url = %url, error = %error, "Failed to connect to bot program");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;

    #[test]
    fn test_frame_format_follows_request() {
        let request = ActionRequest::new("get_status", serde_json::json!({}));
        let text = Frame::encode(&request, MessageFormat::Json).unwrap();
        let binary = Frame::encode(&request, MessageFormat::Msgpack).unwrap();
        assert!(matches!(text, Frame::Text(_)));
        assert!(matches!(binary, Frame::Binary(_)));
        assert_eq!(binary.format(), MessageFormat::Msgpack);

        let decoded: ActionRequest = binary.decode().unwrap();
        assert_eq!(decoded.action, "get_status");
    }

    #[test]
    fn test_binary_frame_keeps_bytes() {
        let response = ActionResponse::ok(Payload::Bytes(vec![1, 2, 3]));
        let frame = Frame::encode(&response, MessageFormat::Msgpack).unwrap();
        let decoded: ActionResponse = frame.decode().unwrap();
        assert_eq!(decoded.data, Payload::Bytes(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_handle_reports_closed() {
        let (tx, rx) = mpsc::channel(1);
        let link = ConnectionHandle::new(tx, MessageFormat::Json);
        assert!(!link.is_closed());
        drop(rx);
        assert!(link.is_closed());
        assert!(link.send(Frame::Text("x".into())).await.is_err());
    }
}
