//! BIP-340 Schnorr signatures over secp256k1 with x-only public keys.
//!
//! [`sign`] draws its nonce from the operating system RNG instead of the
//! BIP-340 aux-randomness derivation. That is sound only while the RNG never
//! repeats a nonce for two different messages under the same key: a reused
//! nonce reveals the private key. [`sign_with_aux`] implements the
//! deterministic derivation and reproduces the published test vectors.

use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::curve::Point;
use crate::error::CryptoError;
use crate::field::Scalar;
use crate::uint::U256;

pub const SIGNATURE_LEN: usize = 64;

const TAG_AUX: &str = "BIP0340/aux";
const TAG_NONCE: &str = "BIP0340/nonce";
const TAG_CHALLENGE: &str = "BIP0340/challenge";

/// SHA-256(SHA-256(tag) || SHA-256(tag) || data...).
pub fn tagged_hash(tag: &str, data: &[&[u8]]) -> [u8; 32] {
    let tag_hash = Sha256::digest(tag.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(&tag_hash);
    hasher.update(&tag_hash);
    for chunk in data {
        hasher.update(chunk);
    }
    hasher.finalize().into()
}

pub(crate) fn parse_secret(secret: &[u8]) -> Result<Scalar, CryptoError> {
    let value = U256::from_be_slice(secret)
        .ok_or_else(|| CryptoError::length("secret key", 32, secret.len()))?;
    Scalar::new_nonzero(value).ok_or(CryptoError::InvalidSecretKey)
}

fn as_array32<'a>(what: &'static str, bytes: &'a [u8]) -> Result<&'a [u8; 32], CryptoError> {
    bytes
        .try_into()
        .map_err(|_| CryptoError::length(what, 32, bytes.len()))
}

/// Returns the scalar whose public point has an even Y, and that point's X.
fn even_y_keypair(d0: &Scalar) -> Result<(Scalar, [u8; 32]), CryptoError> {
    let point = Point::generator().mul_scalar(d0);
    let x = point.x_bytes().ok_or(CryptoError::InvalidSecretKey)?;
    let d = if point.has_even_y() { *d0 } else { d0.neg() };
    Ok((d, x))
}

/// X-only public key (32 bytes, big endian) for a secret scalar.
pub fn get_public_key(secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    let d = parse_secret(secret)?;
    let (_, x) = even_y_keypair(&d)?;
    Ok(x)
}

/// Signs a 32-byte message hash using a fresh random nonce.
pub fn sign(message: &[u8], secret: &[u8]) -> Result<[u8; SIGNATURE_LEN], CryptoError> {
    let message = as_array32("message", message)?;
    let d0 = parse_secret(secret)?;
    let k = random_nonce();
    sign_with_nonce(message, &d0, &k)
}

/// Signs with the BIP-340 deterministic nonce derived from `aux`.
pub fn sign_with_aux(
    message: &[u8],
    secret: &[u8],
    aux: &[u8; 32],
) -> Result<[u8; SIGNATURE_LEN], CryptoError> {
    let message = as_array32("message", message)?;
    let d0 = parse_secret(secret)?;
    let (d, px) = even_y_keypair(&d0)?;

    let aux_hash = tagged_hash(TAG_AUX, &[aux]);
    let mut masked = d.to_be_bytes();
    for (byte, mask) in masked.iter_mut().zip(aux_hash.iter()) {
        *byte ^= mask;
    }
    let nonce_hash = tagged_hash(TAG_NONCE, &[&masked, &px, message]);
    let k = Scalar::from_be_bytes_reduced(&nonce_hash);
    if k.is_zero() {
        return Err(CryptoError::ZeroNonce);
    }
    sign_with_nonce(message, &d0, &k)
}

fn random_nonce() -> Scalar {
    let mut bytes = [0u8; 32];
    loop {
        OsRng.fill_bytes(&mut bytes);
        if let Some(k) = Scalar::new_nonzero(U256::from_be_bytes(&bytes)) {
            return k;
        }
    }
}

pub(crate) fn sign_with_nonce(
    message: &[u8; 32],
    d0: &Scalar,
    k0: &Scalar,
) -> Result<[u8; SIGNATURE_LEN], CryptoError> {
    let (d, px) = even_y_keypair(d0)?;

    let r_point = Point::generator().mul_scalar(k0);
    let rx = r_point.x_bytes().ok_or(CryptoError::ZeroNonce)?;
    // Negating k flips R to its even-Y twin without changing R.x.
    let k = if r_point.has_even_y() { *k0 } else { k0.neg() };

    let e = challenge(&rx, &px, message);
    let s = k.add(&e.mul(&d));

    let mut sig = [0u8; SIGNATURE_LEN];
    sig[..32].copy_from_slice(&rx);
    sig[32..].copy_from_slice(&s.to_be_bytes());
    Ok(sig)
}

fn challenge(rx: &[u8; 32], px: &[u8; 32], message: &[u8; 32]) -> Scalar {
    Scalar::from_be_bytes_reduced(&tagged_hash(TAG_CHALLENGE, &[rx, px, message]))
}

/// BIP-340 verification of `signature` over a 32-byte `message`.
pub fn verify(message: &[u8], public_key: &[u8], signature: &[u8]) -> bool {
    let (Ok(message), Ok(px)) = (
        as_array32("message", message),
        as_array32("public key", public_key),
    ) else {
        return false;
    };
    if signature.len() != SIGNATURE_LEN {
        return false;
    }

    let Some(p_point) = Point::lift_x(px) else {
        return false;
    };
    let Some(r) = U256::from_be_slice(&signature[..32]) else {
        return false;
    };
    if r >= crate::field::field_prime() {
        return false;
    }
    let Some(s) = U256::from_be_slice(&signature[32..]) else {
        return false;
    };
    if s >= Scalar::order() {
        return false;
    }

    let rx = r.to_be_bytes();
    let e = challenge(&rx, px, message);
    let r_point = Point::generator()
        .multiply(&s)
        .add(&p_point.mul_scalar(&e).negate());

    r_point.has_even_y() && r_point.x_bytes() == Some(rx)
}

/// ECDH as used by NIP-04: X coordinate of `d * lift_x(peer)`.
pub fn get_shared_secret(peer_public_key: &[u8], secret: &[u8]) -> Result<[u8; 32], CryptoError> {
    let px = as_array32("public key", peer_public_key)?;
    let d = parse_secret(secret)?;
    let peer = Point::lift_x(px).ok_or(CryptoError::InvalidPublicKey)?;
    peer.mul_scalar(&d)
        .x_bytes()
        .ok_or(CryptoError::SharedSecretAtInfinity)
}
