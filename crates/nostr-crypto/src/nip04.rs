//! NIP-04 direct-message payloads: `<base64 ciphertext>?iv=<base64 iv>`.
//!
//! The key is the raw X coordinate of the ECDH point, used as an AES-256 key
//! without a KDF. The scheme has no authentication tag; a wrong key usually
//! surfaces as a padding failure but is not guaranteed to.

use aes::Aes256;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand_core::{OsRng, RngCore};

use crate::error::CryptoError;
use crate::schnorr::get_shared_secret;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const IV_SEPARATOR: &str = "?iv=";
const IV_LEN: usize = 16;

/// Decrypts a payload sent by `sender_public_key` to the holder of `secret`.
pub fn decrypt(
    payload: &str,
    sender_public_key: &[u8],
    secret: &[u8],
) -> Result<String, CryptoError> {
    let (ciphertext_b64, iv_b64) = payload
        .split_once(IV_SEPARATOR)
        .ok_or(CryptoError::MalformedPayload("missing ?iv= separator"))?;
    if ciphertext_b64.is_empty() {
        return Err(CryptoError::MalformedPayload("empty ciphertext"));
    }

    let ciphertext = STANDARD.decode(ciphertext_b64)?;
    let iv = STANDARD.decode(iv_b64)?;
    if iv.len() != IV_LEN {
        return Err(CryptoError::length("iv", IV_LEN, iv.len()));
    }

    let key = get_shared_secret(sender_public_key, secret)?;
    let cipher = Aes256CbcDec::new_from_slices(&key, &iv)
        .map_err(|_| CryptoError::length("iv", IV_LEN, iv.len()))?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CryptoError::Decrypt)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
}

/// Encrypts `plaintext` for `recipient_public_key` with a random IV.
pub fn encrypt(
    plaintext: &str,
    recipient_public_key: &[u8],
    secret: &[u8],
) -> Result<String, CryptoError> {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    encrypt_with_iv(plaintext, recipient_public_key, secret, &iv)
}

pub(crate) fn encrypt_with_iv(
    plaintext: &str,
    recipient_public_key: &[u8],
    secret: &[u8],
    iv: &[u8; IV_LEN],
) -> Result<String, CryptoError> {
    let key = get_shared_secret(recipient_public_key, secret)?;
    let cipher = Aes256CbcEnc::new_from_slices(&key, iv)
        .map_err(|_| CryptoError::length("iv", IV_LEN, iv.len()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    Ok(format!(
        "{}{}{}",
        STANDARD.encode(ciphertext),
        IV_SEPARATOR,
        STANDARD.encode(iv)
    ))
}
