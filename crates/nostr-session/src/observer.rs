//! Outbound notifications from a running session.
//!
//! Observer methods run on the receive loop and must return quickly.
//! [`ChannelObserver`] forwards everything into an unbounded channel so a
//! slow consumer never holds up event intake.

use tokio::sync::mpsc;
use tracing::debug;

/// A text note that passed the follow/mute predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedNote {
    pub event_id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub content: String,
    pub is_followed: bool,
}

pub trait SessionObserver: Send + Sync {
    fn on_follow_list_updated(&self, count: usize);

    fn on_mute_list_updated(&self, count: usize);

    fn on_relay_list_updated(&self, _relays: &[String]) {}

    fn on_note_accepted(&self, note: &AcceptedNote);

    /// Called once when the session ends in `Faulted`.
    fn on_connection_fault(&self, reason: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    FollowListUpdated(usize),
    MuteListUpdated(usize),
    RelayListUpdated(Vec<String>),
    NoteAccepted(AcceptedNote),
    ConnectionFault(String),
}

#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            debug!("Session event receiver dropped");
        }
    }
}

impl SessionObserver for ChannelObserver {
    fn on_follow_list_updated(&self, count: usize) {
        self.emit(SessionEvent::FollowListUpdated(count));
    }

    fn on_mute_list_updated(&self, count: usize) {
        self.emit(SessionEvent::MuteListUpdated(count));
    }

    fn on_relay_list_updated(&self, relays: &[String]) {
        self.emit(SessionEvent::RelayListUpdated(relays.to_vec()));
    }

    fn on_note_accepted(&self, note: &AcceptedNote) {
        self.emit(SessionEvent::NoteAccepted(note.clone()));
    }

    fn on_connection_fault(&self, reason: &str) {
        self.emit(SessionEvent::ConnectionFault(reason.to_string()));
    }
}
