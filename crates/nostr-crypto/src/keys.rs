//! Key material: secret scalars and x-only public keys, with NIP-19 forms.

use std::fmt;
use std::str::FromStr;

use rand_core::{OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::bech32;
use crate::error::CryptoError;
use crate::nip04;
use crate::schnorr;

pub const NSEC_HRP: &str = "nsec";
pub const NPUB_HRP: &str = "npub";

/// 32-byte secret key in `[1, n)`. Wiped on drop, never printed.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; 32]);

impl SecretKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        schnorr::parse_secret(bytes)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        Ok(Self(out))
    }

    /// Accepts `nsec1...` or hex, optionally prefixed with `hex:`.
    pub fn parse(value: &str) -> Result<Self, CryptoError> {
        let value = value.trim();
        let value = value.strip_prefix("hex:").unwrap_or(value);
        let mut bytes = if is_hex(value) {
            hex::decode(value)?
        } else {
            decode_with_prefix(value, NSEC_HRP)?
        };
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        loop {
            OsRng.fill_bytes(&mut bytes);
            if let Ok(key) = Self::from_bytes(&bytes) {
                bytes.zeroize();
                return key;
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn public_key(&self) -> Result<PublicKey, CryptoError> {
        schnorr::get_public_key(&self.0).map(PublicKey)
    }

    pub fn to_nsec(&self) -> Result<String, CryptoError> {
        Ok(bech32::encode_bytes(NSEC_HRP, &self.0)?)
    }

    /// Schnorr signature over a 32-byte digest.
    pub fn sign(&self, digest: &[u8; 32]) -> Result<[u8; 64], CryptoError> {
        schnorr::sign(digest, &self.0)
    }

    pub fn shared_secret(&self, peer: &PublicKey) -> Result<[u8; 32], CryptoError> {
        schnorr::get_shared_secret(&peer.0, &self.0)
    }

    /// Decrypts a NIP-04 payload from `sender`.
    pub fn decrypt_from(&self, sender: &PublicKey, payload: &str) -> Result<String, CryptoError> {
        nip04::decrypt(payload, &sender.0, &self.0)
    }

    pub fn encrypt_to(&self, recipient: &PublicKey, plaintext: &str) -> Result<String, CryptoError> {
        nip04::encrypt(plaintext, &recipient.0, &self.0)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

impl FromStr for SecretKey {
    type Err = CryptoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

/// X-only public key, the identity of a Nostr author.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    /// Rejects X coordinates that are not on the curve.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let x: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::length("public key", 32, bytes.len()))?;
        crate::curve::Point::lift_x(&x).ok_or(CryptoError::InvalidPublicKey)?;
        Ok(Self(x))
    }

    /// Accepts `npub1...` or hex.
    pub fn parse(value: &str) -> Result<Self, CryptoError> {
        let value = value.trim();
        if is_hex(value) {
            Self::from_bytes(&hex::decode(value)?)
        } else {
            Self::from_bytes(&decode_with_prefix(value, NPUB_HRP)?)
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase 64-character hex, the form used on the wire.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn to_npub(&self) -> Result<String, CryptoError> {
        Ok(bech32::encode_bytes(NPUB_HRP, &self.0)?)
    }

    pub fn verify(&self, digest: &[u8; 32], signature: &[u8]) -> bool {
        schnorr::verify(digest, &self.0, signature)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

fn is_hex(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_hexdigit())
}

fn decode_with_prefix(value: &str, expected: &'static str) -> Result<Vec<u8>, CryptoError> {
    let (hrp, bytes) = bech32::decode_bytes(value)?;
    if hrp != expected {
        return Err(CryptoError::UnexpectedPrefix {
            expected,
            actual: hrp,
        });
    }
    Ok(bytes)
}

/// Resolves an author given as npub or hex into lowercase hex.
pub fn resolve_pubkey(value: &str) -> Result<String, CryptoError> {
    PublicKey::parse(value).map(|key| key.to_hex())
}

/// Resolves an nsec or hex secret key.
pub fn resolve_private_key(value: &str) -> Result<SecretKey, CryptoError> {
    SecretKey::parse(value)
}
