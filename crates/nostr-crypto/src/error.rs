use thiserror::Error;

use crate::bech32::Bech32Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid {what} length: expected {expected}, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("secret key out of range")]
    InvalidSecretKey,
    #[error("public key is not a valid x-only point")]
    InvalidPublicKey,
    #[error("hex error: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("bech32 error: {0}")]
    Bech32(#[from] Bech32Error),
    #[error("unexpected bech32 prefix: expected {expected}, got {actual}")]
    UnexpectedPrefix {
        expected: &'static str,
        actual: String,
    },
    #[error("nonce derivation produced zero")]
    ZeroNonce,
    #[error("shared secret is the point at infinity")]
    SharedSecretAtInfinity,
    #[error("malformed encrypted payload: {0}")]
    MalformedPayload(&'static str),
    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decryption failed")]
    Decrypt,
}

impl CryptoError {
    pub(crate) fn length(what: &'static str, expected: usize, actual: usize) -> Self {
        CryptoError::InvalidLength {
            what,
            expected,
            actual,
        }
    }
}
