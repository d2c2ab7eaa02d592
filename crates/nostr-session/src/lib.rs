//! Relay session, event routing and note publishing for the Nostr note reader.
//!
//! A [`RelaySession`] holds one websocket connection to a relay, subscribes to
//! an author's follow list, mute list and the live text-note stream, and feeds
//! every incoming event through an [`EventRouter`]. Notes that pass the
//! follow/mute predicate are handed to a [`SessionObserver`].
//!
//! # Architecture
//!
//! ```text
//!   SessionHandle ──stop / publish──┐
//!                                   ▼
//! ┌──────────────┐  REQ/CLOSE  ┌──────────────┐  text   ┌──────────────┐
//! │    Relay     │◄────────────│ RelaySession │◄────────│RelayTransport│
//! │  (ws / wss)  │────────────►│  (receive    │         │ ws or memory │
//! └──────────────┘ EVENT/EOSE  │    loop)     │         └──────────────┘
//!                              └──────┬───────┘
//!                                     │ NostrEvent
//!                                     ▼
//!                              ┌──────────────┐        ┌──────────────┐
//!                              │ EventRouter  │───────►│   Session    │
//!                              │ follows/mutes│ notes, │   Observer   │
//!                              └──────────────┘ lists  └──────────────┘
//! ```
//!
//! [`NotePublisher`] is independent of the session: it signs a note, opens its
//! own connection, waits for the relay's `OK` and closes.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use nostr_session::{ChannelObserver, RelaySession, SessionConfig, SessionEvent};
//!
//! let config = SessionConfig::from_env()?;
//! let (observer, mut events) = ChannelObserver::new();
//! let handle = RelaySession::new(config, Arc::new(observer))?.spawn();
//!
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::NoteAccepted(note) = event {
//!         println!("{}: {}", note.pubkey, note.content);
//!     }
//! }
//! handle.shutdown().await?;
//! ```

mod config;
mod error;
mod events;
mod message;
mod observer;
mod publish;
mod router;
mod session;
mod transport;

pub use config::{
    EventKinds, PublisherConfig, SessionConfig, DEFAULT_ACK_TIMEOUT, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_RECV_TIMEOUT,
};
pub use error::SessionError;
pub use events::{
    sign_text_note, tag_values, unix_timestamp, NostrEvent, UnsignedEvent, KIND_CONTACT_LIST,
    KIND_MUTE_LIST, KIND_RELAY_LIST, KIND_TEXT_NOTE, TAG_PUBKEY, TAG_RELAY,
};
pub use message::{ClientMessage, Filter, RelayMessage, Subscription};
pub use observer::{AcceptedNote, ChannelObserver, SessionEvent, SessionObserver};
pub use publish::{NotePublisher, PublishResult};
pub use router::{
    extract_pubkeys, extract_relays, normalize_pubkey, DropReason, EventRouter, RouteOutcome,
};
pub use session::{
    RelaySession, SessionHandle, SessionReport, SessionState, SessionStats, SUB_CONTACTS,
    SUB_MUTES, SUB_NOTES, SUB_RELAYS,
};
pub use transport::{
    memory_pair, MemoryConnector, MemoryFrame, MemoryPeer, MemoryTransport, RelayConnector,
    RelayTransport, WsConnector, WsTransport,
};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
