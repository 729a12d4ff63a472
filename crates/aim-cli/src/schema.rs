//! # Schema Subcommand
//!
//! `aim schema <path>`: structural and integrity checks of a single store,
//! without a counterpart to compare against. Useful before a migration, or
//! to see why one side of a failed verification is broken.
//!
//! Secrets are decrypted when keys are available (`--key`, or `FERNET_KEY`
//! and `OLD_FERNET_KEY`); otherwise they are checked for token shape only.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use aim_schema::SchemaRevision;
use aim_verify::MigrationVerifier;

use crate::config::{key_ring, shared_keys_from_env};
use crate::render::{emit, render_inspection, OutputFormat};
use crate::verify::parse_revision;

/// Arguments for the `aim schema` subcommand.
#[derive(Args, Debug)]
pub struct SchemaArgs {
    /// Store to inspect (JSON export or SQLite file).
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Schema revision (default: detect).
    #[arg(long, value_parser = parse_revision)]
    pub revision: Option<SchemaRevision>,

    /// Fernet key for secrets. Repeat for rotated keys, newest first.
    #[arg(long = "key", value_name = "KEY")]
    pub keys: Vec<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

/// Execute the schema subcommand.
pub fn run_schema(args: &SchemaArgs) -> Result<u8> {
    let keys = if args.keys.is_empty() {
        shared_keys_from_env(|var| std::env::var(var).ok())
    } else {
        args.keys.clone()
    };
    let ring = if keys.is_empty() {
        tracing::warn!("no keys given; secrets are checked for token shape only");
        None
    } else {
        Some(key_ring("dataset", &keys).context("invalid key")?)
    };

    let runtime = crate::loader_runtime()?;
    let raw = runtime.block_on(aim_store::load(&args.path))?;

    let mut verifier = MigrationVerifier::new();
    if let Some(revision) = args.revision {
        verifier = verifier.with_revision(revision);
    }
    let inspection = verifier.inspect(&raw, ring.as_ref())?;

    let format = if args.output.is_some() {
        OutputFormat::Json
    } else {
        args.format
    };
    emit(&render_inspection(&inspection, format)?, args.output.as_deref())?;

    Ok(if inspection.success { 0 } else { 1 })
}
