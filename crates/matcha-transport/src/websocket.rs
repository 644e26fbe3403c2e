//! tokio-tungstenite backed [`Connector`].

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use matcha_core::{Frame, TransportError, TransportResult};

use crate::connector::{Connector, Inbound, WireSession};

/// Buffered frames per direction.
const CHANNEL_CAPACITY: usize = 256;

/// WebSocket client connector.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Binary(bytes) => Message::Binary(bytes.into()),
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        url: &str,
        headers: &[(String, String)],
        shutdown: CancellationToken,
    ) -> TransportResult<WireSession> {
        let failed = |reason: String| TransportError::ConnectionFailed {
            url: url.to_owned(),
            reason,
        };

        let mut request = url
            .into_client_request()
            .map_err(|e| failed(format!("invalid request: {e}")))?;
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| failed(format!("invalid header name {name}: {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| failed(format!("invalid header value: {e}")))?;
            request.headers_mut().insert(name, value);
        }

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| failed(format!("WebSocket connection failed: {e}")))?;
        let (mut sink, mut source) = stream.split();

        let (out_tx, mut out_rx) = mpsc::channel::<Frame>(CHANNEL_CAPACITY);
        let (in_tx, in_rx) = mpsc::channel::<Inbound>(CHANNEL_CAPACITY);

        let writer_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = writer_shutdown.cancelled() => {
                        let _ = sink.send(Message::Close(None)).await;
                        let _ = sink.close().await;
                        break;
                    }
                    frame = out_rx.recv() => match frame {
                        Some(frame) => {
                            if let Err(e) = sink.send(to_message(frame)).await {
                                warn!(error = %e, "Failed to send frame");
                            }
                        }
                        None => break,
                    }
                }
            }
        });

        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = shutdown.cancelled() => break,
                    message = source.next() => message,
                };
                let inbound = match message {
                    Some(Ok(Message::Text(text))) => Inbound::Frame(Frame::Text(text.as_str().to_owned())),
                    Some(Ok(Message::Binary(bytes))) => Inbound::Frame(Frame::Binary(bytes.to_vec())),
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        trace!("Received ping/pong");
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        Inbound::Close(frame.map(|f| f.reason.as_str().to_owned()))
                    }
                    Some(Ok(Message::Frame(_))) => Inbound::Unknown,
                    Some(Err(e)) => Inbound::Error(e.to_string()),
                    None => Inbound::Close(None),
                };
                let terminal = !matches!(inbound, Inbound::Frame(_));
                if in_tx.send(inbound).await.is_err() || terminal {
                    break;
                }
            }
        });

        Ok(WireSession {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}
