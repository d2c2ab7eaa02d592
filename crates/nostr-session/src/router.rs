//! Classifies incoming events and keeps the follow, mute and relay lists.
//!
//! The router is owned by the session's receive loop: a single writer, so the
//! registries need no locking. Every list update replaces the previous list
//! entirely; there is no `created_at` ordering check between updates.

use std::collections::HashSet;

use nostr_crypto::bech32;
use nostr_crypto::NPUB_HRP;
use tracing::{debug, warn};
use url::Url;

use crate::config::{EventKinds, SessionConfig};
use crate::events::{tag_values, NostrEvent, TAG_PUBKEY, TAG_RELAY};
use crate::observer::{AcceptedNote, SessionObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Muted,
    NotFollowed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    FollowListReplaced(usize),
    MuteListReplaced(usize),
    RelayListReplaced(Vec<String>),
    /// An empty list update was skipped because a non-empty list exists.
    EmptyListIgnored { kind: u16 },
    NoteAccepted(AcceptedNote),
    NoteDropped { pubkey: String, reason: DropReason },
    /// Kind the router has no handling for.
    Ignored { kind: u16 },
}

impl RouteOutcome {
    /// Forwards the outcome to the observer. Drops and ignores stay silent.
    pub fn notify(&self, observer: &dyn SessionObserver) {
        match self {
            RouteOutcome::FollowListReplaced(count) => observer.on_follow_list_updated(*count),
            RouteOutcome::MuteListReplaced(count) => observer.on_mute_list_updated(*count),
            RouteOutcome::RelayListReplaced(relays) => observer.on_relay_list_updated(relays),
            RouteOutcome::NoteAccepted(note) => observer.on_note_accepted(note),
            RouteOutcome::EmptyListIgnored { .. }
            | RouteOutcome::NoteDropped { .. }
            | RouteOutcome::Ignored { .. } => {}
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventRouter {
    kinds: EventKinds,
    allow_others: bool,
    ignore_empty_updates: bool,
    follows: HashSet<String>,
    mutes: HashSet<String>,
    relays: Vec<String>,
}

impl EventRouter {
    pub fn new(kinds: EventKinds, allow_others: bool) -> Self {
        Self {
            kinds,
            allow_others,
            ignore_empty_updates: false,
            follows: HashSet::new(),
            mutes: HashSet::new(),
            relays: Vec::new(),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.kinds, config.allow_others)
            .with_ignore_empty_updates(config.ignore_empty_list_updates)
    }

    pub fn with_ignore_empty_updates(mut self, ignore: bool) -> Self {
        self.ignore_empty_updates = ignore;
        self
    }

    pub fn follows(&self) -> &HashSet<String> {
        &self.follows
    }

    pub fn mutes(&self) -> &HashSet<String> {
        &self.mutes
    }

    pub fn relays(&self) -> &[String] {
        &self.relays
    }

    /// Dispatches on `event.kind` alone; the subscription it arrived on is
    /// irrelevant.
    pub fn route(&mut self, event: &NostrEvent) -> RouteOutcome {
        let kind = event.kind;
        if kind == self.kinds.contact_list {
            let follows = extract_pubkeys(event);
            if self.skip_empty(kind, follows.is_empty(), self.follows.is_empty()) {
                return RouteOutcome::EmptyListIgnored { kind };
            }
            self.follows = follows;
            debug!(count = self.follows.len(), "Follow list replaced");
            RouteOutcome::FollowListReplaced(self.follows.len())
        } else if kind == self.kinds.mute_list {
            let mutes = extract_pubkeys(event);
            if self.skip_empty(kind, mutes.is_empty(), self.mutes.is_empty()) {
                return RouteOutcome::EmptyListIgnored { kind };
            }
            self.mutes = mutes;
            debug!(count = self.mutes.len(), "Mute list replaced");
            RouteOutcome::MuteListReplaced(self.mutes.len())
        } else if kind == self.kinds.relay_list {
            let relays = extract_relays(event);
            if self.skip_empty(kind, relays.is_empty(), self.relays.is_empty()) {
                return RouteOutcome::EmptyListIgnored { kind };
            }
            self.relays = relays;
            debug!(count = self.relays.len(), "Relay list replaced");
            RouteOutcome::RelayListReplaced(self.relays.clone())
        } else if kind == self.kinds.text_note {
            self.route_note(event)
        } else {
            RouteOutcome::Ignored { kind }
        }
    }

    /// Accept iff not muted and (followed or others allowed).
    pub fn decide(&self, pubkey: &str) -> Result<bool, DropReason> {
        let is_followed = self.follows.contains(pubkey);
        if self.mutes.contains(pubkey) {
            Err(DropReason::Muted)
        } else if is_followed || self.allow_others {
            Ok(is_followed)
        } else {
            Err(DropReason::NotFollowed)
        }
    }

    fn route_note(&self, event: &NostrEvent) -> RouteOutcome {
        let pubkey = event.pubkey.to_lowercase();
        match self.decide(&pubkey) {
            Ok(is_followed) => RouteOutcome::NoteAccepted(AcceptedNote {
                event_id: event.id.clone(),
                pubkey,
                created_at: event.created_at,
                content: event.content.clone(),
                is_followed,
            }),
            Err(reason) => RouteOutcome::NoteDropped { pubkey, reason },
        }
    }

    fn skip_empty(&self, kind: u16, update_empty: bool, current_empty: bool) -> bool {
        if !update_empty || current_empty {
            return false;
        }
        if self.ignore_empty_updates {
            debug!(kind, "Ignoring empty list update");
            true
        } else {
            warn!(kind, "Empty list update replaces a non-empty list");
            false
        }
    }
}

/// Pubkeys referenced by a contact or mute list.
///
/// Reads `"p"` tags. When the event has no tags, tries `content` as a JSON
/// array of tag arrays, then as free text split on whitespace and commas.
/// Invalid entries are skipped.
pub fn extract_pubkeys(event: &NostrEvent) -> HashSet<String> {
    if !event.tags.is_empty() {
        return tag_values(&event.tags, TAG_PUBKEY)
            .filter_map(normalize_pubkey)
            .collect();
    }

    if let Ok(tags) = serde_json::from_str::<Vec<Vec<String>>>(&event.content) {
        return tag_values(&tags, TAG_PUBKEY)
            .filter_map(normalize_pubkey)
            .collect();
    }

    event
        .content
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|token| token.trim_matches(|c: char| matches!(c, '"' | '\'' | '[' | ']')))
        .filter(|token| !token.is_empty())
        .filter_map(normalize_pubkey)
        .collect()
}

/// Lowercase 64-hex form of a hex or npub reference, `None` if invalid.
pub fn normalize_pubkey(value: &str) -> Option<String> {
    let value = value.trim();
    if value.len() == 64 && value.chars().all(|c| c.is_ascii_hexdigit()) {
        return Some(value.to_ascii_lowercase());
    }
    if !value.to_ascii_lowercase().starts_with("npub1") {
        return None;
    }
    match bech32::decode_bytes(value) {
        Ok((hrp, bytes)) if hrp == NPUB_HRP && bytes.len() == 32 => Some(hex::encode(bytes)),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "Skipping invalid npub reference");
            None
        }
    }
}

/// Websocket URLs from `"r"` tags, deduplicated in order.
pub fn extract_relays(event: &NostrEvent) -> Vec<String> {
    let mut seen = HashSet::new();
    tag_values(&event.tags, TAG_RELAY)
        .filter_map(|value| Url::parse(value.trim()).ok())
        .filter(|url| matches!(url.scheme(), "ws" | "wss"))
        .map(|url| url.to_string())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
