//! # Token Subcommand
//!
//! Fernet utilities for working with store secrets by hand:
//!
//! - `aim token generate-key`: print a fresh key.
//! - `aim token encrypt --key K [TEXT]`: encrypt TEXT (or stdin).
//! - `aim token decrypt --key K1 --key K2 TOKEN`: decrypt, trying keys in
//!   order, and report which key matched.
//! - `aim token inspect TOKEN`: show the token header without a key.
//!
//! ## Security Invariant
//!
//! Keys are never echoed. Decrypted plaintext goes to stdout only; the key
//! report goes to stderr.

use std::io::Read as _;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use aim_crypto::{FernetKey, KeyRing, TokenHeader};

use crate::config::{key_ring, shared_keys_from_env};

/// Arguments for the `aim token` subcommand.
#[derive(Args, Debug)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Generate a new random key.
    GenerateKey,

    /// Encrypt text with the given key.
    Encrypt {
        /// Key to encrypt with (default: FERNET_KEY).
        #[arg(long)]
        key: Option<String>,
        /// Text to encrypt; read from stdin when omitted.
        text: Option<String>,
    },

    /// Decrypt a token, trying each key in order.
    Decrypt {
        /// Candidate key. Repeat for rotated keys, newest first.
        /// Defaults to FERNET_KEY then OLD_FERNET_KEY.
        #[arg(long = "key", value_name = "KEY")]
        keys: Vec<String>,
        token: String,
    },

    /// Show the header fields of a token without decrypting it.
    Inspect { token: String },
}

#[derive(Serialize)]
struct Inspected<'a> {
    #[serde(flatten)]
    header: &'a TokenHeader,
    issued_at_iso: Option<String>,
}

/// Execute the token subcommand.
pub fn run_token(args: &TokenArgs) -> Result<u8> {
    match &args.command {
        TokenCommand::GenerateKey => {
            println!("{}", FernetKey::generate().to_base64());
            Ok(0)
        }
        TokenCommand::Encrypt { key, text } => {
            let ring = resolve_keys(key.iter().cloned().collect())?;
            let plaintext = match text {
                Some(t) => t.clone(),
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("failed to read stdin")?;
                    buf.trim_end_matches(['\r', '\n']).to_string()
                }
            };
            println!("{}", ring.encode(plaintext.as_bytes()));
            Ok(0)
        }
        TokenCommand::Decrypt { keys, token } => {
            let ring = resolve_keys(keys.clone())?;
            match ring.decode(token.trim()) {
                Ok(decrypted) => {
                    let fingerprint = ring
                        .keys()
                        .get(decrypted.key_index())
                        .map(FernetKey::fingerprint)
                        .unwrap_or_default();
                    eprintln!(
                        "decrypted with key #{} ({fingerprint}){}",
                        decrypted.key_index() + 1,
                        if decrypted.used_fallback() { ", a rotated key" } else { "" }
                    );
                    println!("{}", String::from_utf8_lossy(decrypted.plaintext()));
                    Ok(0)
                }
                Err(e) => {
                    eprintln!("cannot decrypt: {e}");
                    Ok(1)
                }
            }
        }
        TokenCommand::Inspect { token } => match TokenHeader::parse(token.trim()) {
            Ok(header) => {
                let inspected = Inspected {
                    issued_at_iso: header.issued_at_timestamp().map(|t| t.to_iso8601()),
                    header: &header,
                };
                println!("{}", serde_json::to_string_pretty(&inspected)?);
                Ok(0)
            }
            Err(e) => {
                eprintln!("not a Fernet token: {e}");
                Ok(1)
            }
        },
    }
}

fn resolve_keys(given: Vec<String>) -> Result<KeyRing> {
    let keys = if given.is_empty() {
        shared_keys_from_env(|var| std::env::var(var).ok())
    } else {
        given
    };
    key_ring("token", &keys).context("no usable key")
}
