//! WebSocket Transport
//!
//! [`Transport`] implementation over tokio-tungstenite.
//!
//! Each session gets one pump task that owns the socket. The task forwards
//! queued outbound text, answers pings and turns everything it reads into
//! [`TransportFrame`]s. It ends, closing the socket, when the peer closes,
//! when the socket fails, when every outbound sender is dropped, or when the
//! inbound receiver is dropped.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::application::ports::{Transport, TransportError, TransportFrame, TransportLink};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Gateway transport over `ws://` or `wss://`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    /// Create a transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<TransportLink, TransportError> {
        let (socket, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;
        tracing::debug!(url, status = %response.status(), "WebSocket handshake complete");

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        tokio::spawn(pump(socket, outbound_rx, inbound_tx));

        Ok(TransportLink { outbound, inbound })
    }
}

async fn pump(
    socket: Socket,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<TransportFrame>,
) {
    let (mut write, mut read) = socket.split();

    loop {
        tokio::select! {
            queued = outbound.recv() => {
                let Some(text) = queued else {
                    tracing::debug!("Outbound queue dropped, closing socket");
                    let _ = write.send(Message::Close(None)).await;
                    return;
                };
                if let Err(e) = write.send(Message::Text(text.into())).await {
                    let _ = inbound.send(TransportFrame::Error(e.to_string()));
                    let _ = inbound.send(TransportFrame::Closed { reason: None });
                    return;
                }
            }
            msg = read.next() => {
                let frame = match msg {
                    Some(Ok(Message::Text(text))) => TransportFrame::Message(text.as_str().to_owned()),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                        continue;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.as_str().to_owned())
                            .filter(|r| !r.is_empty());
                        tracing::info!(reason = reason.as_deref().unwrap_or("none"), "Gateway sent close frame");
                        let _ = inbound.send(TransportFrame::Closed { reason });
                        return;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        let _ = inbound.send(TransportFrame::Error(e.to_string()));
                        let _ = inbound.send(TransportFrame::Closed { reason: None });
                        return;
                    }
                    None => {
                        let _ = inbound.send(TransportFrame::Closed { reason: None });
                        return;
                    }
                };

                if inbound.send(frame).is_err() {
                    tracing::debug!("Session receiver dropped, closing socket");
                    let _ = write.send(Message::Close(None)).await;
                    return;
                }
            }
        }
    }
}
