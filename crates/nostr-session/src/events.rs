use std::time::{SystemTime, UNIX_EPOCH};

use nostr_crypto::{PublicKey, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::SessionError;

pub const KIND_TEXT_NOTE: u16 = 1;
pub const KIND_CONTACT_LIST: u16 = 3;
pub const KIND_MUTE_LIST: u16 = 10000;
pub const KIND_RELAY_LIST: u16 = 10002;

pub const TAG_PUBKEY: &str = "p";
pub const TAG_RELAY: &str = "r";

/// An event as carried on the wire.
///
/// A missing `tags` field deserializes as an empty list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NostrEvent {
    pub id: String,
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    #[serde(default)]
    pub tags: Vec<Vec<String>>,
    #[serde(default)]
    pub content: String,
    pub sig: String,
}

impl NostrEvent {
    /// Values at index 1 of every tag named `name`.
    pub fn tag_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        tag_values(&self.tags, name)
    }

    /// Recomputes the id and checks the Schnorr signature against `pubkey`.
    ///
    /// Incoming events are routed without calling this.
    pub fn verify(&self) -> bool {
        let unsigned = UnsignedEvent {
            pubkey: self.pubkey.clone(),
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags.clone(),
            content: self.content.clone(),
        };
        let Ok(id) = unsigned.compute_id() else {
            return false;
        };
        if hex::encode(id) != self.id.to_lowercase() {
            return false;
        }
        let (Ok(pubkey), Ok(sig)) = (PublicKey::parse(&self.pubkey), hex::decode(&self.sig)) else {
            return false;
        };
        pubkey.verify(&id, &sig)
    }
}

/// Event fields covered by the id, before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEvent {
    pub pubkey: String,
    pub created_at: u64,
    pub kind: u16,
    pub tags: Vec<Vec<String>>,
    pub content: String,
}

impl UnsignedEvent {
    pub fn new(
        pubkey: &PublicKey,
        kind: u16,
        tags: Vec<Vec<String>>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            pubkey: pubkey.to_hex(),
            created_at: unix_timestamp(),
            kind,
            tags,
            content: content.into(),
        }
    }

    pub fn created_at(mut self, created_at: u64) -> Self {
        self.created_at = created_at;
        self
    }

    /// `[0,<pubkey>,<created_at>,<kind>,<tags>,<content>]` with no whitespace.
    pub fn canonical_json(&self) -> Result<String, SessionError> {
        let value = serde_json::json!([
            0,
            self.pubkey,
            self.created_at,
            self.kind,
            self.tags,
            self.content
        ]);
        Ok(serde_json::to_string(&value)?)
    }

    /// SHA-256 of the canonical serialization.
    pub fn compute_id(&self) -> Result<[u8; 32], SessionError> {
        let canonical = self.canonical_json()?;
        Ok(Sha256::digest(canonical.as_bytes()).into())
    }

    /// Signs with `key`. The key must own `pubkey`.
    pub fn sign(self, key: &SecretKey) -> Result<NostrEvent, SessionError> {
        let signer = key.public_key()?.to_hex();
        if signer != self.pubkey {
            return Err(SessionError::Validation(format!(
                "event pubkey {} does not match signing key {}",
                self.pubkey, signer
            )));
        }

        let id = self.compute_id()?;
        let sig = key.sign(&id)?;
        Ok(NostrEvent {
            id: hex::encode(id),
            pubkey: self.pubkey,
            created_at: self.created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig: hex::encode(sig),
        })
    }
}

/// Builds and signs a text note authored by `key`.
pub fn sign_text_note(
    key: &SecretKey,
    content: impl Into<String>,
    tags: Vec<Vec<String>>,
) -> Result<NostrEvent, SessionError> {
    let pubkey = key.public_key()?;
    UnsignedEvent::new(&pubkey, KIND_TEXT_NOTE, tags, content).sign(key)
}

pub fn tag_values<'a>(tags: &'a [Vec<String>], name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
    tags.iter()
        .filter(move |tag| tag.first().map(String::as_str) == Some(name))
        .filter_map(|tag| tag.get(1).map(String::as_str))
}

pub fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
