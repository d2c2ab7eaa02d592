//! Key and signature primitives for the Nostr note reader.
//!
//! Everything here is self-contained arithmetic over secp256k1: no external
//! curve library is involved.
//!
//! # Layers
//!
//! ```text
//! uint      256-bit unsigned integers (4 x u64 limbs)
//!   │
//! field     FieldElement (mod p) and Scalar (mod n)
//!   │
//! curve     affine points, double-and-add, lift_x
//!   │
//! schnorr   BIP-340 sign / verify, ECDH shared secret
//!   │
//! keys      SecretKey / PublicKey with nsec / npub forms (bech32)
//! nip04     AES-256-CBC direct-message payloads
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use nostr_crypto::{resolve_pubkey, SecretKey};
//!
//! let author = resolve_pubkey("npub1...")?;
//! let key = SecretKey::parse("nsec1...")?;
//! let sig = key.sign(&event_id)?;
//! ```

pub mod bech32;
mod curve;
mod error;
mod field;
mod keys;
pub mod nip04;
pub mod schnorr;
mod uint;

pub use bech32::Bech32Error;
pub use curve::Point;
pub use error::CryptoError;
pub use field::{FieldElement, Scalar};
pub use keys::{resolve_private_key, resolve_pubkey, PublicKey, SecretKey, NPUB_HRP, NSEC_HRP};
pub use schnorr::{get_public_key, get_shared_secret, sign, sign_with_aux, tagged_hash, verify};
pub use uint::U256;

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
