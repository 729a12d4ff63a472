//! # Fernet Keys and Key Rings
//!
//! A Fernet key is 32 random bytes, exchanged as 44 characters of URL-safe
//! base64 with padding. The first 16 bytes key the HMAC-SHA256 tag, the last
//! 16 bytes key AES-128-CBC.
//!
//! ## Security Invariant
//!
//! - Key bytes are zeroized on drop.
//! - `Debug` never prints key material; it prints a short SHA-256
//!   fingerprint so logs can say *which* key was used.
//! - `FernetKey` does not implement `Serialize`.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::token;

/// Length of a key in its text form.
pub const ENCODED_KEY_LEN: usize = 44;

/// A 256-bit Fernet key, split into its signing and encryption halves.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct FernetKey {
    signing: [u8; 16],
    encryption: [u8; 16],
}

impl FernetKey {
    /// Generate a fresh key from the operating system RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let key = Self::from_bytes(&bytes);
        bytes.zeroize();
        key
    }

    /// Build a key from its 32 raw bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let mut signing = [0u8; 16];
        let mut encryption = [0u8; 16];
        signing.copy_from_slice(&bytes[..16]);
        encryption.copy_from_slice(&bytes[16..]);
        Self {
            signing,
            encryption,
        }
    }

    /// Parse the 44-character URL-safe base64 form.
    ///
    /// Surrounding whitespace is ignored so keys pasted from environment
    /// files with a trailing newline still load.
    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let encoded = encoded.trim();
        if encoded.len() != ENCODED_KEY_LEN {
            return Err(CryptoError::InvalidKey(format!(
                "expected {ENCODED_KEY_LEN} characters, got {}",
                encoded.len()
            )));
        }
        let mut decoded = URL_SAFE
            .decode(encoded)
            .map_err(|e| CryptoError::InvalidKey(format!("not URL-safe base64: {e}")))?;
        let bytes: Result<&[u8; 32], _> = decoded.as_slice().try_into();
        let key = match bytes {
            Ok(b) => Ok(Self::from_bytes(b)),
            Err(_) => Err(CryptoError::InvalidKey(format!(
                "expected 32 bytes, got {}",
                decoded.len()
            ))),
        };
        decoded.zeroize();
        key
    }

    /// Render the 44-character URL-safe base64 form.
    pub fn to_base64(&self) -> String {
        let mut bytes = [0u8; 32];
        bytes[..16].copy_from_slice(&self.signing);
        bytes[16..].copy_from_slice(&self.encryption);
        let encoded = URL_SAFE.encode(bytes);
        bytes.zeroize();
        encoded
    }

    /// First 8 hex characters of SHA-256 over the key bytes.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.signing);
        hasher.update(self.encryption);
        hasher.finalize()[..4]
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    pub(crate) fn signing_key(&self) -> &[u8; 16] {
        &self.signing
    }

    pub(crate) fn encryption_key(&self) -> &[u8; 16] {
        &self.encryption
    }
}

impl std::fmt::Debug for FernetKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FernetKey({})", self.fingerprint())
    }
}

// ---------------------------------------------------------------------------
// KeyRing
// ---------------------------------------------------------------------------

/// A successful decryption and the ring position of the key that did it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Decrypted {
    plaintext: Vec<u8>,
    #[zeroize(skip)]
    key_index: usize,
}

impl Decrypted {
    pub fn plaintext(&self) -> &[u8] {
        &self.plaintext
    }

    /// Index into the ring; `0` is the primary key.
    pub fn key_index(&self) -> usize {
        self.key_index
    }

    /// True when a rotated (non-primary) key was needed.
    pub fn used_fallback(&self) -> bool {
        self.key_index > 0
    }

    /// The plaintext as UTF-8.
    pub fn as_str(&self) -> Result<&str, CryptoError> {
        std::str::from_utf8(&self.plaintext).map_err(|_| CryptoError::InvalidUtf8)
    }
}

impl std::fmt::Debug for Decrypted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decrypted")
            .field("plaintext", &format_args!("<{} bytes>", self.plaintext.len()))
            .field("key_index", &self.key_index)
            .finish()
    }
}

/// An ordered, non-empty list of keys.
///
/// The first key is primary: it is used for encoding and tried first when
/// decoding. Later keys are previous keys kept for rotation.
#[derive(Clone, Debug)]
pub struct KeyRing {
    keys: Vec<FernetKey>,
}

impl KeyRing {
    /// Build a ring from keys in priority order.
    pub fn new(keys: Vec<FernetKey>) -> Result<Self, CryptoError> {
        if keys.is_empty() {
            return Err(CryptoError::EmptyKeyRing);
        }
        Ok(Self { keys })
    }

    /// A ring holding one key.
    pub fn single(key: FernetKey) -> Self {
        Self { keys: vec![key] }
    }

    /// Parse every key from its base64 form, in order.
    pub fn from_base64_keys<I, S>(encoded: I) -> Result<Self, CryptoError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = encoded
            .into_iter()
            .map(|s| FernetKey::from_base64(s.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(keys)
    }

    pub fn primary(&self) -> &FernetKey {
        &self.keys[0]
    }

    pub fn keys(&self) -> &[FernetKey] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Always false; a ring cannot be constructed empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Encode under the primary key.
    pub fn encode(&self, plaintext: &[u8]) -> String {
        token::encode(plaintext, self.primary())
    }

    /// Decode, trying each key in order.
    ///
    /// A signature failure moves on to the next key. Any failure that does
    /// not depend on the key (bad base64, bad version byte) is returned
    /// immediately, as is a padding failure under a key whose signature
    /// verified.
    pub fn decode(&self, token_text: &str) -> Result<Decrypted, CryptoError> {
        let data = token::unpack(token_text)?;
        for (key_index, key) in self.keys.iter().enumerate() {
            match token::open(&data, key) {
                Ok(plaintext) => {
                    return Ok(Decrypted {
                        plaintext,
                        key_index,
                    })
                }
                Err(e) if e.is_key_dependent() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(CryptoError::KeyExhausted {
            tried: self.keys.len(),
        })
    }
}
