use std::sync::Arc;

use nostr_crypto::SecretKey;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use crate::config::PublisherConfig;
use crate::events::{sign_text_note, NostrEvent};
use crate::message::{ClientMessage, RelayMessage};
use crate::transport::{RelayConnector, RelayTransport, WsConnector};
use crate::SessionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishResult {
    pub event_id: String,
    pub accepted: bool,
    pub message: String,
}

/// Signs notes and sends each one over its own short-lived connection.
///
/// Shares nothing with a running [`crate::RelaySession`] except the key.
/// A failed or unacknowledged publish is reported, never retried.
pub struct NotePublisher {
    config: PublisherConfig,
    key: SecretKey,
    connector: Arc<dyn RelayConnector>,
}

impl NotePublisher {
    pub fn new(config: PublisherConfig, key: SecretKey) -> Self {
        let connector = Arc::new(WsConnector::new(
            config.connect_timeout,
            crate::config::DEFAULT_MAX_MESSAGE_BYTES,
        ));
        Self::with_connector(config, key, connector)
    }

    pub fn with_connector(
        config: PublisherConfig,
        key: SecretKey,
        connector: Arc<dyn RelayConnector>,
    ) -> Self {
        Self {
            config,
            key,
            connector,
        }
    }

    pub fn compose_note(
        &self,
        content: &str,
        tags: Vec<Vec<String>>,
    ) -> Result<NostrEvent, SessionError> {
        if content.trim().is_empty() {
            return Err(SessionError::Validation("note content is empty".to_string()));
        }
        sign_text_note(&self.key, content, tags)
    }

    pub async fn publish_note(&self, content: &str) -> Result<PublishResult, SessionError> {
        let event = self.compose_note(content, Vec::new())?;
        self.publish_event(event).await
    }

    /// Sends `event` and waits up to `ack_timeout` for the matching `OK`.
    pub async fn publish_event(&self, event: NostrEvent) -> Result<PublishResult, SessionError> {
        let url = self.config.relay_url()?;
        let mut transport = self.connector.connect(&url).await?;

        let event_id = event.id.clone();
        let result = self.send_and_wait(transport.as_mut(), event).await;
        if let Err(e) = transport.close().await {
            debug!(error = %e, "Failed to close publish connection");
        }

        let result = result?;
        if result.accepted {
            info!(event_id = %event_id, relay = %url, "Published note");
        } else {
            warn!(event_id = %event_id, relay = %url, reason = %result.message, "Relay rejected note");
        }
        Ok(result)
    }

    async fn send_and_wait(
        &self,
        transport: &mut dyn RelayTransport,
        event: NostrEvent,
    ) -> Result<PublishResult, SessionError> {
        let event_id = event.id.clone();
        transport.send(ClientMessage::Event(event).to_json()?).await?;

        let deadline = Instant::now() + self.config.ack_timeout;
        loop {
            let text = match timeout_at(deadline, transport.recv()).await {
                Err(_) => return Err(SessionError::Timeout),
                Ok(Ok(Some(text))) => text,
                Ok(Ok(None)) => {
                    return Err(SessionError::Transport(
                        "relay closed the connection before acknowledging".to_string(),
                    ))
                }
                Ok(Err(e)) if e.is_transport() => return Err(e),
                Ok(Err(e)) => {
                    debug!(error = %e, "Ignoring undecodable message while awaiting OK");
                    continue;
                }
            };

            match RelayMessage::from_json(&text) {
                Ok(Some(RelayMessage::Ok {
                    event_id: acked,
                    accepted,
                    message,
                })) if acked == event_id => {
                    return Ok(PublishResult {
                        event_id,
                        accepted,
                        message,
                    })
                }
                Ok(Some(RelayMessage::Notice { message })) => {
                    warn!(notice = %message, "Relay notice while publishing");
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "Dropping malformed relay message"),
            }
        }
    }
}
