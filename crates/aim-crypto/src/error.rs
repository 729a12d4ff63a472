//! # Crypto Errors
//!
//! Every way a token or key can be rejected. The verifier records these as
//! report data; nothing in this crate panics on bad input.

use thiserror::Error;

/// Why a key or token was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// The authentication tag did not match. Wrong key, or the token was
    /// altered after it was issued.
    #[error("token signature does not verify")]
    InvalidSignature,

    /// The first byte was not the Fernet version marker.
    #[error("unsupported token version 0x{found:02x}")]
    InvalidVersion {
        /// The byte that was found instead.
        found: u8,
    },

    /// The tag verified but the decrypted block padding was wrong.
    #[error("token ciphertext has invalid padding")]
    InvalidPadding,

    /// No key in the ring produced a valid signature.
    #[error("no key in the ring could decrypt the token ({tried} tried)")]
    KeyExhausted {
        /// How many keys were attempted.
        tried: usize,
    },

    /// The token text is not valid base64 or is too short to be a token.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// A key did not decode to exactly 32 bytes of URL-safe base64.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Decryption succeeded but the plaintext is not UTF-8.
    #[error("decrypted plaintext is not valid UTF-8")]
    InvalidUtf8,

    /// A key ring was built with no keys.
    #[error("key ring must contain at least one key")]
    EmptyKeyRing,
}

impl CryptoError {
    /// True for failures that depend on which key was tried.
    ///
    /// Key rotation moves on to the next key only for these.
    pub fn is_key_dependent(&self) -> bool {
        matches!(self, Self::InvalidSignature)
    }
}
