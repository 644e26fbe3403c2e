//! Physical connection establishment.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use matcha_core::{Frame, TransportResult};

/// Something received from the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Frame(Frame),
    /// Peer closed the connection or the stream ended.
    Close(Option<String>),
    /// A frame kind the driver does not understand.
    Unknown,
    Error(String),
}

/// Channel pair of an established connection.
///
/// Frames sent on `outgoing` are written to the socket. The connection is
/// closed once the shutdown token passed to [`Connector::connect`] fires.
#[derive(Debug)]
pub struct WireSession {
    pub outgoing: mpsc::Sender<Frame>,
    pub incoming: mpsc::Receiver<Inbound>,
}

/// Opens outbound connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        url: &str,
        headers: &[(String, String)],
        shutdown: CancellationToken,
    ) -> TransportResult<WireSession>;
}
