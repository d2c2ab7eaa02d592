//! Relay session: one connection, several subscriptions, one receive loop.
//!
//! ```text
//! Disconnected -> Connecting -> Subscribed -> Receiving -> Disconnected (stop)
//!                     |             |             |
//!                     +-------------+-------------+-----> Faulted (transport error)
//! ```
//!
//! There is no reconnection. A caller that wants to retry starts a new
//! session.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use nostr_crypto::resolve_pubkey;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::SessionConfig;
use crate::events::{unix_timestamp, NostrEvent};
use crate::message::{ClientMessage, Filter, RelayMessage, Subscription};
use crate::observer::SessionObserver;
use crate::router::{EventRouter, RouteOutcome};
use crate::transport::{RelayConnector, RelayTransport, WsConnector};
use crate::SessionError;

pub const SUB_CONTACTS: &str = "contacts";
pub const SUB_MUTES: &str = "mutes";
pub const SUB_NOTES: &str = "notes";
pub const SUB_RELAYS: &str = "relays";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Subscribed,
    Receiving,
    Faulted,
}

/// Counters kept by the receive loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub messages_received: u64,
    pub events_received: u64,
    pub notes_accepted: u64,
    pub notes_dropped: u64,
    pub list_updates: u64,
    pub empty_updates_ignored: u64,
    pub protocol_errors: u64,
    pub unknown_messages: u64,
    pub eose_received: u64,
    pub notices: u64,
    pub events_published: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub state: SessionState,
    pub stats: SessionStats,
    pub fault: Option<String>,
}

pub struct RelaySession {
    config: SessionConfig,
    relay_url: Url,
    author: String,
    observer: Arc<dyn SessionObserver>,
    connector: Arc<dyn RelayConnector>,
}

impl RelaySession {
    /// Session over a websocket connection.
    pub fn new(
        config: SessionConfig,
        observer: Arc<dyn SessionObserver>,
    ) -> Result<Self, SessionError> {
        let connector = Arc::new(WsConnector::new(
            config.connect_timeout,
            config.max_message_bytes,
        ));
        Self::with_connector(config, observer, connector)
    }

    /// Validates the config and resolves the author (hex or npub) up front,
    /// so a bad identity fails here rather than after connecting.
    pub fn with_connector(
        config: SessionConfig,
        observer: Arc<dyn SessionObserver>,
        connector: Arc<dyn RelayConnector>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let relay_url = config.relay_url()?;
        let author = resolve_pubkey(&config.author).map_err(|e| {
            SessionError::Validation(format!("invalid author {}: {e}", config.author))
        })?;

        Ok(Self {
            config,
            relay_url,
            author,
            observer,
            connector,
        })
    }

    /// Author pubkey as lowercase hex.
    pub fn author(&self) -> &str {
        &self.author
    }

    /// Subscriptions issued after connecting. Lists are unbounded in time;
    /// notes only flow forward from `since`.
    pub fn subscriptions(&self, since: u64) -> Vec<Subscription> {
        let kinds = self.config.kinds;
        let mut subs = vec![
            Subscription::new(
                SUB_CONTACTS,
                Filter::new().kind(kinds.contact_list).author(&self.author),
            ),
            Subscription::new(
                SUB_MUTES,
                Filter::new().kind(kinds.mute_list).author(&self.author),
            ),
            Subscription::new(SUB_NOTES, Filter::new().kind(kinds.text_note).since(since)),
        ];
        if self.config.subscribe_relay_list {
            subs.push(Subscription::new(
                SUB_RELAYS,
                Filter::new().kind(kinds.relay_list).author(&self.author),
            ));
        }
        subs
    }

    /// Runs the session on a background task.
    pub fn spawn(self) -> SessionHandle {
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(cancel.clone(), outbox_rx, state_tx));

        SessionHandle {
            cancel,
            state: state_rx,
            outbox: outbox_tx,
            task,
        }
    }

    pub async fn run(
        self,
        cancel: CancellationToken,
        mut outbox: mpsc::UnboundedReceiver<NostrEvent>,
        state_tx: watch::Sender<SessionState>,
    ) -> SessionReport {
        let mut driver = Driver {
            router: EventRouter::from_config(&self.config),
            observer: Arc::clone(&self.observer),
            recv_timeout: self.config.recv_timeout,
            state_tx,
            stats: SessionStats::default(),
            active: HashSet::new(),
        };

        driver.set_state(SessionState::Connecting);
        let connected = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.connector.connect(&self.relay_url) => Some(result),
        };
        let mut transport = match connected {
            None => return driver.finish(SessionState::Disconnected, None),
            Some(Err(e)) => return driver.fault(e.to_string()),
            Some(Ok(transport)) => transport,
        };
        info!(relay = %self.relay_url, author = %self.author, "Connected to relay");

        let since = unix_timestamp();
        for sub in self.subscriptions(since) {
            let json = match sub.to_req().to_json() {
                Ok(json) => json,
                Err(e) => return driver.fault(format!("failed to encode REQ {}: {e}", sub.id)),
            };
            if let Err(e) = transport.send(json).await {
                return driver.fault(e.to_string());
            }
            debug!(subscription = %sub.id, kinds = ?sub.filter.kinds, "Subscription sent");
            driver.active.insert(sub.id);
        }
        driver.set_state(SessionState::Subscribed);

        driver.set_state(SessionState::Receiving);
        match driver.receive(transport.as_mut(), &cancel, &mut outbox).await {
            Ok(()) => {
                driver.close_subscriptions(transport.as_mut()).await;
                driver.finish(SessionState::Disconnected, None)
            }
            Err(reason) => driver.fault(reason),
        }
    }
}

enum Step {
    Stop,
    Outbox(Option<NostrEvent>),
    Received(Result<Result<Option<String>, SessionError>, tokio::time::error::Elapsed>),
}

struct Driver {
    router: EventRouter,
    observer: Arc<dyn SessionObserver>,
    recv_timeout: Duration,
    state_tx: watch::Sender<SessionState>,
    stats: SessionStats,
    active: HashSet<String>,
}

impl Driver {
    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
        debug!(?state, "Session state");
    }

    fn finish(self, state: SessionState, fault: Option<String>) -> SessionReport {
        self.set_state(state);
        info!(?state, stats = ?self.stats, "Session ended");
        SessionReport {
            state,
            stats: self.stats,
            fault,
        }
    }

    fn fault(self, reason: String) -> SessionReport {
        warn!(reason = %reason, "Relay session faulted");
        self.observer.on_connection_fault(&reason);
        self.finish(SessionState::Faulted, Some(reason))
    }

    /// Returns `Ok` on stop and `Err(reason)` when the transport fails.
    async fn receive(
        &mut self,
        transport: &mut dyn RelayTransport,
        cancel: &CancellationToken,
        outbox: &mut mpsc::UnboundedReceiver<NostrEvent>,
    ) -> Result<(), String> {
        let mut outbox_open = true;
        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Stop,
                event = outbox.recv(), if outbox_open => Step::Outbox(event),
                received = timeout(self.recv_timeout, transport.recv()) => Step::Received(received),
            };

            match step {
                Step::Stop => {
                    info!("Stop requested");
                    return Ok(());
                }
                Step::Outbox(Some(event)) => self.publish(transport, event).await?,
                Step::Outbox(None) => outbox_open = false,
                // Poll interval elapsed with nothing to read.
                Step::Received(Err(_)) => {}
                Step::Received(Ok(Ok(Some(text)))) => self.handle_text(&text),
                Step::Received(Ok(Ok(None))) => {
                    return Err("relay closed the connection".to_string())
                }
                Step::Received(Ok(Err(e))) if e.is_transport() => return Err(e.to_string()),
                Step::Received(Ok(Err(e))) => {
                    self.stats.protocol_errors += 1;
                    debug!(error = %e, "Dropping undecodable relay message");
                }
            }
        }
    }

    async fn publish(
        &mut self,
        transport: &mut dyn RelayTransport,
        event: NostrEvent,
    ) -> Result<(), String> {
        let event_id = event.id.clone();
        let json = match ClientMessage::Event(event).to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(event_id = %event_id, error = %e, "Failed to encode outgoing event");
                return Ok(());
            }
        };
        transport.send(json).await.map_err(|e| e.to_string())?;
        self.stats.events_published += 1;
        info!(event_id = %event_id, "Sent event to relay");
        Ok(())
    }

    fn handle_text(&mut self, text: &str) {
        self.stats.messages_received += 1;
        let message = match RelayMessage::from_json(text) {
            Ok(Some(message)) => message,
            Ok(None) => {
                self.stats.unknown_messages += 1;
                debug!("Ignoring unhandled relay message");
                return;
            }
            Err(e) => {
                self.stats.protocol_errors += 1;
                debug!(error = %e, "Dropping malformed relay message");
                return;
            }
        };

        match message {
            RelayMessage::Event {
                subscription_id,
                event,
            } => {
                self.stats.events_received += 1;
                if !self.active.contains(&subscription_id) {
                    debug!(subscription = %subscription_id, "Event for inactive subscription");
                }
                let outcome = self.router.route(&event);
                match &outcome {
                    RouteOutcome::NoteAccepted(_) => self.stats.notes_accepted += 1,
                    RouteOutcome::NoteDropped { pubkey, reason } => {
                        self.stats.notes_dropped += 1;
                        debug!(pubkey = %pubkey, ?reason, "Dropped note");
                    }
                    RouteOutcome::FollowListReplaced(_)
                    | RouteOutcome::MuteListReplaced(_)
                    | RouteOutcome::RelayListReplaced(_) => self.stats.list_updates += 1,
                    RouteOutcome::EmptyListIgnored { .. } => self.stats.empty_updates_ignored += 1,
                    RouteOutcome::Ignored { kind } => debug!(kind, "Ignoring event kind"),
                }
                outcome.notify(self.observer.as_ref());
            }
            RelayMessage::Eose { subscription_id } => {
                self.stats.eose_received += 1;
                debug!(subscription = %subscription_id, "End of stored events");
            }
            RelayMessage::Ok {
                event_id,
                accepted,
                message,
            } => {
                if accepted {
                    info!(event_id = %event_id, "Relay accepted event");
                } else {
                    warn!(event_id = %event_id, reason = %message, "Relay rejected event");
                }
            }
            RelayMessage::Notice { message } => {
                self.stats.notices += 1;
                warn!(notice = %message, "Relay notice");
            }
            RelayMessage::Closed {
                subscription_id,
                message,
            } => {
                self.active.remove(&subscription_id);
                warn!(subscription = %subscription_id, reason = %message, "Relay closed subscription");
            }
        }
    }

    /// Best effort: the session is ending either way.
    async fn close_subscriptions(&mut self, transport: &mut dyn RelayTransport) {
        for subscription_id in self.active.drain() {
            let close = ClientMessage::Close { subscription_id };
            if let Ok(json) = close.to_json() {
                if let Err(e) = transport.send(json).await {
                    debug!(error = %e, "Failed to send CLOSE");
                    break;
                }
            }
        }
        if let Err(e) = transport.close().await {
            debug!(error = %e, "Failed to close transport");
        }
    }
}

/// Control surface for a spawned session.
///
/// Dropping the handle does not stop the session; call [`SessionHandle::stop`].
pub struct SessionHandle {
    cancel: CancellationToken,
    state: watch::Receiver<SessionState>,
    outbox: mpsc::UnboundedSender<NostrEvent>,
    task: JoinHandle<SessionReport>,
}

impl SessionHandle {
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn state_receiver(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Queues a signed event to be written on the session's socket.
    pub fn publish(&self, event: NostrEvent) -> Result<(), SessionError> {
        self.outbox
            .send(event)
            .map_err(|_| SessionError::Transport("session has ended".to_string()))
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<SessionReport, SessionError> {
        Ok(self.task.await?)
    }

    pub async fn shutdown(self) -> Result<SessionReport, SessionError> {
        self.stop();
        self.join().await
    }
}
