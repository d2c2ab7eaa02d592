//! Configuration for the relay session and the note publisher.

use std::env;
use std::time::Duration;

use url::Url;

use crate::events::{KIND_CONTACT_LIST, KIND_MUTE_LIST, KIND_RELAY_LIST, KIND_TEXT_NOTE};
use crate::SessionError;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RECV_TIMEOUT: Duration = Duration::from_millis(500);
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Event kinds the session subscribes to and routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventKinds {
    pub contact_list: u16,
    pub mute_list: u16,
    pub text_note: u16,
    pub relay_list: u16,
}

impl Default for EventKinds {
    fn default() -> Self {
        Self {
            contact_list: KIND_CONTACT_LIST,
            mute_list: KIND_MUTE_LIST,
            text_note: KIND_TEXT_NOTE,
            relay_list: KIND_RELAY_LIST,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Relay websocket URL (`ws://` or `wss://`).
    pub relay_url: String,

    /// Author whose follow/mute lists drive filtering, as hex or npub.
    pub author: String,

    /// Accept notes from authors that are neither followed nor muted.
    pub allow_others: bool,

    pub connect_timeout: Duration,

    /// Longest single wait on the socket before the loop re-checks for stop.
    pub recv_timeout: Duration,

    pub max_message_bytes: usize,

    /// Also subscribe to the author's relay list.
    pub subscribe_relay_list: bool,

    /// Keep the current list when an update arrives with no entries.
    pub ignore_empty_list_updates: bool,

    pub kinds: EventKinds,
}

impl SessionConfig {
    pub fn new(relay_url: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            author: author.into(),
            allow_others: false,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            recv_timeout: DEFAULT_RECV_TIMEOUT,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            subscribe_relay_list: false,
            ignore_empty_list_updates: false,
            kinds: EventKinds::default(),
        }
    }

    /// Create configuration from environment variables.
    ///
    /// Required environment variables:
    /// - `NOSTR_RELAY_URL` - relay websocket URL
    /// - `NOSTR_AUTHOR` - author pubkey (hex or npub)
    ///
    /// Optional environment variables:
    /// - `NOSTR_ALLOW_OTHERS` - accept notes from unfollowed authors (default: false)
    /// - `NOSTR_CONNECT_TIMEOUT_SECS` - connect timeout (default: 10)
    /// - `NOSTR_RECV_TIMEOUT_MS` - receive poll interval (default: 500)
    /// - `NOSTR_MAX_MESSAGE_BYTES` - largest accepted relay message (default: 4 MiB)
    /// - `NOSTR_SUBSCRIBE_RELAY_LIST` - subscribe to the relay list (default: false)
    /// - `NOSTR_IGNORE_EMPTY_LISTS` - ignore empty list updates (default: false)
    pub fn from_env() -> Result<Self, SessionError> {
        let relay_url =
            env::var("NOSTR_RELAY_URL").map_err(|_| SessionError::MissingEnv("NOSTR_RELAY_URL"))?;
        let author =
            env::var("NOSTR_AUTHOR").map_err(|_| SessionError::MissingEnv("NOSTR_AUTHOR"))?;

        let mut config = Self::new(relay_url, author);
        config.allow_others = env_flag("NOSTR_ALLOW_OTHERS").unwrap_or(false);
        config.connect_timeout = env::var("NOSTR_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        config.recv_timeout = env::var("NOSTR_RECV_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_RECV_TIMEOUT);
        config.max_message_bytes = env::var("NOSTR_MAX_MESSAGE_BYTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_MESSAGE_BYTES);
        config.subscribe_relay_list = env_flag("NOSTR_SUBSCRIBE_RELAY_LIST").unwrap_or(false);
        config.ignore_empty_list_updates = env_flag("NOSTR_IGNORE_EMPTY_LISTS").unwrap_or(false);

        Ok(config)
    }

    /// Parses and checks the relay URL scheme.
    pub fn relay_url(&self) -> Result<Url, SessionError> {
        parse_relay_url(&self.relay_url)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        self.relay_url()?;
        if self.recv_timeout.is_zero() {
            return Err(SessionError::Config("recv_timeout must be non-zero".to_string()));
        }
        if self.max_message_bytes == 0 {
            return Err(SessionError::Config(
                "max_message_bytes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub relay_url: String,
    pub connect_timeout: Duration,
    /// How long to wait for the relay's `OK` before giving up.
    pub ack_timeout: Duration,
}

impl PublisherConfig {
    pub fn new(relay_url: impl Into<String>) -> Self {
        Self {
            relay_url: relay_url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }

    pub fn relay_url(&self) -> Result<Url, SessionError> {
        parse_relay_url(&self.relay_url)
    }
}

pub(crate) fn parse_relay_url(value: &str) -> Result<Url, SessionError> {
    let url = Url::parse(value)
        .map_err(|e| SessionError::Config(format!("invalid relay url {value}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(SessionError::Config(format!(
            "relay url must use ws or wss, got {other}"
        ))),
    }
}

fn env_flag(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v.to_lowercase() == "true" || v == "1")
}
