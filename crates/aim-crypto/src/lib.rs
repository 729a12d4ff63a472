//! # aim-crypto — Fernet Token Codec
//!
//! Authenticated encryption for secret fields of the configuration store.
//! Tokens produced here are byte-for-byte the tokens Python's
//! `cryptography.fernet` produces for the same key, timestamp, and IV, and
//! each side decrypts the other's output.
//!
//! - **`FernetKey`**: 32-byte key, split into signing and encryption halves.
//! - **`KeyRing`**: ordered keys for rotation; decoding reports which key
//!   succeeded.
//! - **`token`**: `encode`, `decode`, and key-less `TokenHeader` inspection.
//!
//! ## Crate Policy
//!
//! - Depends only on `aim-core` internally.
//! - No mocking of cryptographic operations in tests; every test runs real
//!   AES, real HMAC, real base64.
//! - The OS RNG (IV and key generation) is the only impurity.

pub mod error;
pub mod key;
pub mod token;

pub use error::CryptoError;
pub use key::{Decrypted, FernetKey, KeyRing, ENCODED_KEY_LEN};
pub use token::{decode, decode_str, encode, encode_at, TokenHeader};
