//! # Fernet Tokens
//!
//! Encoding and decoding of Fernet tokens, bit-compatible with Python's
//! `cryptography.fernet`.
//!
//! ## Layout
//!
//! ```text
//! 0x80 | timestamp (u64 BE) | IV (16) | AES-128-CBC/PKCS7 ciphertext | HMAC-SHA256 (32)
//! ```
//!
//! The tag covers every byte before it. The whole token is URL-safe base64
//! with padding.
//!
//! ## Security Invariant
//!
//! - The tag is compared in constant time, and the ciphertext is never
//!   decrypted before the tag has verified.
//! - The embedded timestamp is parsed but never enforced: stored secrets
//!   have no time-to-live.

use aes::Aes128;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::digest::{Key, KeyInit};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use aim_core::Timestamp;

use crate::error::CryptoError;
use crate::key::FernetKey;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type HmacSha256 = Hmac<Sha256>;

/// Version marker, first byte of every token.
pub const VERSION: u8 = 0x80;

const TIMESTAMP_LEN: usize = 8;
const IV_LEN: usize = 16;
const TAG_LEN: usize = 32;
const BLOCK_LEN: usize = 16;
const HEADER_LEN: usize = 1 + TIMESTAMP_LEN + IV_LEN;

/// Shortest byte length that can hold a header and a tag.
pub const MIN_TOKEN_LEN: usize = HEADER_LEN + TAG_LEN;

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encrypt `plaintext` under `key` at the current time with a random IV.
pub fn encode(plaintext: &[u8], key: &FernetKey) -> String {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    let now = u64::try_from(Timestamp::now().epoch_secs()).unwrap_or(0);
    encode_at(plaintext, key, now, iv)
}

/// Encrypt with a fixed timestamp and IV.
///
/// Deterministic; used for reproducing published test vectors. Never reuse
/// an IV with the same key outside of tests.
pub fn encode_at(plaintext: &[u8], key: &FernetKey, issued_at: u64, iv: [u8; IV_LEN]) -> String {
    let ciphertext = Aes128CbcEnc::new(key.encryption_key().into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
    seal(key, issued_at, &iv, &ciphertext)
}

/// Assemble and sign a token around an already-encrypted body.
fn seal(key: &FernetKey, issued_at: u64, iv: &[u8; IV_LEN], ciphertext: &[u8]) -> String {
    let mut data = Vec::with_capacity(HEADER_LEN + ciphertext.len() + TAG_LEN);
    data.push(VERSION);
    data.extend_from_slice(&issued_at.to_be_bytes());
    data.extend_from_slice(iv);
    data.extend_from_slice(ciphertext);
    let tag = compute_tag(key, &data);
    data.extend_from_slice(&tag);
    URL_SAFE.encode(data)
}

fn compute_tag(key: &FernetKey, signed: &[u8]) -> [u8; TAG_LEN] {
    // HMAC zero-pads short keys to the hash block size (RFC 2104 §2), so
    // building the padded block directly is exact and cannot fail.
    let mut block = Key::<HmacSha256>::default();
    block[..key.signing_key().len()].copy_from_slice(key.signing_key());
    let mut mac = <HmacSha256 as KeyInit>::new(&block);
    block.as_mut_slice().zeroize();
    mac.update(signed);
    mac.finalize().into_bytes().into()
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Decrypt a token under one key.
pub fn decode(token: &str, key: &FernetKey) -> Result<Vec<u8>, CryptoError> {
    let data = unpack(token)?;
    open(&data, key)
}

/// Decrypt a token under one key and require UTF-8 plaintext.
pub fn decode_str(token: &str, key: &FernetKey) -> Result<String, CryptoError> {
    String::from_utf8(decode(token, key)?).map_err(|_| CryptoError::InvalidUtf8)
}

/// Base64-decode a token and run the key-independent checks: minimum
/// length and version byte.
pub(crate) fn unpack(token: &str) -> Result<Vec<u8>, CryptoError> {
    if token.is_empty() {
        return Err(CryptoError::Malformed("empty token".to_string()));
    }
    let data = URL_SAFE
        .decode(token)
        .map_err(|e| CryptoError::Malformed(format!("not URL-safe base64: {e}")))?;
    if data.len() < MIN_TOKEN_LEN {
        return Err(CryptoError::Malformed(format!(
            "{} bytes is shorter than the {MIN_TOKEN_LEN}-byte minimum",
            data.len()
        )));
    }
    if data[0] != VERSION {
        return Err(CryptoError::InvalidVersion { found: data[0] });
    }
    Ok(data)
}

/// Verify the tag of unpacked token bytes under `key`, then decrypt.
pub(crate) fn open(data: &[u8], key: &FernetKey) -> Result<Vec<u8>, CryptoError> {
    let (signed, tag) = data.split_at(data.len() - TAG_LEN);
    let expected = compute_tag(key, signed);
    if !bool::from(expected.as_slice().ct_eq(tag)) {
        return Err(CryptoError::InvalidSignature);
    }

    let iv = &signed[1 + TIMESTAMP_LEN..HEADER_LEN];
    let ciphertext = &signed[HEADER_LEN..];
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(CryptoError::InvalidPadding);
    }
    let iv: &[u8; IV_LEN] = iv
        .try_into()
        .map_err(|_| CryptoError::Malformed("truncated IV".to_string()))?;
    Aes128CbcDec::new(key.encryption_key().into(), iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::InvalidPadding)
}

// ---------------------------------------------------------------------------
// Header inspection
// ---------------------------------------------------------------------------

/// The unauthenticated header of a token, readable without a key.
///
/// Parsing succeeds when the text is well-formed base64, long enough, starts
/// with the version byte, and carries a block-aligned ciphertext. That is
/// the strongest "looks like a token" check available without key material.
/// Nothing here is authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenHeader {
    pub version: u8,
    /// Unix seconds at which the token claims to have been issued.
    pub issued_at: u64,
    #[serde(skip)]
    pub iv: [u8; IV_LEN],
    pub ciphertext_len: usize,
}

impl TokenHeader {
    pub fn parse(token: &str) -> Result<Self, CryptoError> {
        let data = unpack(token)?;
        let mut ts = [0u8; TIMESTAMP_LEN];
        ts.copy_from_slice(&data[1..1 + TIMESTAMP_LEN]);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&data[1 + TIMESTAMP_LEN..HEADER_LEN]);
        let ciphertext_len = data.len() - MIN_TOKEN_LEN;
        if ciphertext_len == 0 || ciphertext_len % BLOCK_LEN != 0 {
            return Err(CryptoError::Malformed(format!(
                "ciphertext of {ciphertext_len} bytes is not a whole number of blocks"
            )));
        }
        Ok(Self {
            version: data[0],
            issued_at: u64::from_be_bytes(ts),
            iv,
            ciphertext_len,
        })
    }

    /// Issue time as a [`Timestamp`], if it is representable.
    pub fn issued_at_timestamp(&self) -> Option<Timestamp> {
        Timestamp::from_epoch_secs(self.issued_at).ok()
    }
}
