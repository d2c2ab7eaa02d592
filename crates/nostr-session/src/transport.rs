//! Transport seam between the session and a relay.
//!
//! [`WsConnector`] opens real websocket connections; [`MemoryConnector`] hands
//! out an in-process pipe whose far end ([`MemoryPeer`]) plays the relay.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

use crate::SessionError;

/// One connection to a relay carrying whole text messages.
#[async_trait]
pub trait RelayTransport: Send {
    async fn send(&mut self, text: String) -> Result<(), SessionError>;

    /// Waits for the next complete message.
    ///
    /// `Ok(None)` means the relay closed the connection. Fragmented frames are
    /// reassembled before this returns; binary payloads must be UTF-8.
    async fn recv(&mut self) -> Result<Option<String>, SessionError>;

    async fn close(&mut self) -> Result<(), SessionError>;
}

#[async_trait]
pub trait RelayConnector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Box<dyn RelayTransport>, SessionError>;
}

#[derive(Debug, Clone)]
pub struct WsConnector {
    pub connect_timeout: Duration,
    pub max_message_bytes: usize,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration, max_message_bytes: usize) -> Self {
        Self {
            connect_timeout,
            max_message_bytes,
        }
    }
}

#[async_trait]
impl RelayConnector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn RelayTransport>, SessionError> {
        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(self.max_message_bytes);
        ws_config.max_frame_size = Some(self.max_message_bytes);

        let (stream, response) = timeout(
            self.connect_timeout,
            connect_async_with_config(url.as_str(), Some(ws_config), false),
        )
        .await
        .map_err(|_| {
            SessionError::Transport(format!(
                "connect to {url} timed out after {:?}",
                self.connect_timeout
            ))
        })?
        .map_err(|e| SessionError::Transport(format!("connect to {url} failed: {e}")))?;

        debug!(relay = %url, status = %response.status(), "Websocket connected");
        Ok(Box::new(WsTransport { stream }))
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl RelayTransport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), SessionError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| SessionError::Transport(format!("send failed: {e}")))
    }

    async fn recv(&mut self) -> Result<Option<String>, SessionError> {
        loop {
            let message = match self.stream.next().await {
                None => return Ok(None),
                Some(Err(e)) => {
                    return Err(SessionError::Transport(format!("receive failed: {e}")))
                }
                Some(Ok(message)) => message,
            };

            match message {
                Message::Text(text) => return Ok(Some(text.as_str().to_owned())),
                Message::Binary(bytes) => {
                    return String::from_utf8(bytes.to_vec())
                        .map(Some)
                        .map_err(|_| SessionError::Protocol("binary message is not UTF-8".to_string()));
                }
                Message::Close(frame) => {
                    debug!(?frame, "Relay sent close frame");
                    return Ok(None);
                }
                // tungstenite queues the pong reply itself.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.stream
            .close(None)
            .await
            .map_err(|e| SessionError::Transport(format!("close failed: {e}")))
    }
}

/// What the relay end of a memory pipe can deliver to the client.
#[derive(Debug, Clone)]
pub enum MemoryFrame {
    Text(String),
    Binary(Vec<u8>),
    Close,
    Error(String),
}

/// Client end of an in-memory relay connection.
pub struct MemoryTransport {
    outgoing: mpsc::UnboundedSender<String>,
    incoming: mpsc::UnboundedReceiver<MemoryFrame>,
    closed: bool,
}

/// Relay end of an in-memory connection, driven by tests and tools.
pub struct MemoryPeer {
    to_client: mpsc::UnboundedSender<MemoryFrame>,
    from_client: mpsc::UnboundedReceiver<String>,
}

pub fn memory_pair() -> (MemoryTransport, MemoryPeer) {
    let (to_client, incoming) = mpsc::unbounded_channel();
    let (outgoing, from_client) = mpsc::unbounded_channel();
    (
        MemoryTransport {
            outgoing,
            incoming,
            closed: false,
        },
        MemoryPeer {
            to_client,
            from_client,
        },
    )
}

#[async_trait]
impl RelayTransport for MemoryTransport {
    async fn send(&mut self, text: String) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Transport("memory transport closed".to_string()));
        }
        self.outgoing
            .send(text)
            .map_err(|_| SessionError::Transport("memory peer dropped".to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>, SessionError> {
        if self.closed {
            return Ok(None);
        }
        match self.incoming.recv().await {
            Some(MemoryFrame::Text(text)) => Ok(Some(text)),
            Some(MemoryFrame::Binary(bytes)) => String::from_utf8(bytes)
                .map(Some)
                .map_err(|_| SessionError::Protocol("binary message is not UTF-8".to_string())),
            Some(MemoryFrame::Error(reason)) => Err(SessionError::Transport(reason)),
            Some(MemoryFrame::Close) | None => {
                self.closed = true;
                Ok(None)
            }
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.closed = true;
        Ok(())
    }
}

impl MemoryPeer {
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.to_client.send(MemoryFrame::Text(text.into())).is_ok()
    }

    pub fn send_frame(&self, frame: MemoryFrame) -> bool {
        self.to_client.send(frame).is_ok()
    }

    pub fn close(&self) -> bool {
        self.send_frame(MemoryFrame::Close)
    }

    /// Makes the client's next receive fail with a transport error.
    pub fn fail(&self, reason: impl Into<String>) -> bool {
        self.send_frame(MemoryFrame::Error(reason.into()))
    }

    /// Next message written by the client, `None` once it is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }
}

/// Connector that yields one prepared [`MemoryTransport`].
pub struct MemoryConnector {
    transport: Mutex<Option<MemoryTransport>>,
    refuse: Option<String>,
}

impl MemoryConnector {
    pub fn pair() -> (Self, MemoryPeer) {
        let (transport, peer) = memory_pair();
        (
            Self {
                transport: Mutex::new(Some(transport)),
                refuse: None,
            },
            peer,
        )
    }

    /// A connector whose connect attempt always fails.
    pub fn refusing(reason: impl Into<String>) -> Self {
        Self {
            transport: Mutex::new(None),
            refuse: Some(reason.into()),
        }
    }
}

#[async_trait]
impl RelayConnector for MemoryConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn RelayTransport>, SessionError> {
        if let Some(reason) = &self.refuse {
            return Err(SessionError::Transport(format!(
                "connect to {url} failed: {reason}"
            )));
        }
        let transport = self
            .transport
            .lock()
            .map_err(|_| SessionError::Transport("memory connector poisoned".to_string()))?
            .take()
            .ok_or_else(|| SessionError::Transport("memory transport already used".to_string()))?;
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_pair_carries_text_both_ways() {
        let (mut transport, mut peer) = memory_pair();
        transport.send("hello relay".to_string()).await.unwrap();
        assert_eq!(peer.recv().await.as_deref(), Some("hello relay"));

        assert!(peer.send_text("hello client"));
        assert_eq!(
            transport.recv().await.unwrap().as_deref(),
            Some("hello client")
        );
    }

    #[tokio::test]
    async fn test_memory_binary_must_be_utf8() {
        let (mut transport, peer) = memory_pair();
        peer.send_frame(MemoryFrame::Binary(b"[\"EOSE\",\"x\"]".to_vec()));
        peer.send_frame(MemoryFrame::Binary(vec![0xff, 0xfe]));
        assert_eq!(
            transport.recv().await.unwrap().as_deref(),
            Some("[\"EOSE\",\"x\"]")
        );
        assert!(matches!(
            transport.recv().await,
            Err(SessionError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_close_and_failure() {
        let (mut transport, peer) = memory_pair();
        peer.fail("connection reset");
        assert!(matches!(
            transport.recv().await,
            Err(SessionError::Transport(_))
        ));

        peer.close();
        assert!(transport.recv().await.unwrap().is_none());
        assert!(transport.send("late".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_peer_reads_as_closed() {
        let (mut transport, peer) = memory_pair();
        drop(peer);
        assert!(transport.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ws_transport_answers_ping_once() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let relay = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Ping(b"hb".to_vec().into())).await.unwrap();
            ws.send(Message::Text("[\"EOSE\",\"notes\"]".into()))
                .await
                .unwrap();

            let mut frames = Vec::new();
            while let Some(Ok(message)) = ws.next().await {
                match message {
                    Message::Close(_) => break,
                    other => frames.push(other),
                }
            }
            frames
        });

        let url = Url::parse(&format!("ws://{addr}")).unwrap();
        let connector = WsConnector::new(Duration::from_secs(5), 1 << 20);
        let mut transport = connector.connect(&url).await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap().as_deref(),
            Some("[\"EOSE\",\"notes\"]")
        );
        transport.send("done".to_string()).await.unwrap();
        transport.close().await.unwrap();

        let frames = relay.await.unwrap();
        let pongs = frames
            .iter()
            .filter(|m| matches!(m, Message::Pong(_)))
            .count();
        assert_eq!(pongs, 1);
        assert!(frames
            .iter()
            .any(|m| matches!(m, Message::Text(t) if t.as_str() == "done")));
    }

    #[tokio::test]
    async fn test_memory_connector_hands_out_once() {
        let url = Url::parse("ws://memory.test").unwrap();
        let (connector, _peer) = MemoryConnector::pair();
        assert!(connector.connect(&url).await.is_ok());
        assert!(matches!(
            connector.connect(&url).await,
            Err(SessionError::Transport(_))
        ));

        let refusing = MemoryConnector::refusing("connection refused");
        assert!(matches!(
            refusing.connect(&url).await,
            Err(SessionError::Transport(_))
        ));
    }
}
