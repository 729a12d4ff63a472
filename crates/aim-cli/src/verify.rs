//! # Verify Subcommand
//!
//! `aim verify --source <path> --migrated <path>`: loads both stores,
//! runs the full verification, and renders the report.
//!
//! Returns exit code 0 when the migration verifies and 1 when it does not.
//! Unreadable inputs and bad configuration are errors (exit code 2).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use aim_schema::SchemaRevision;
use aim_verify::MigrationVerifier;

use crate::config::{FlagOverrides, VerifyConfig};
use crate::render::{emit, render_report, OutputFormat};

/// Arguments for the `aim verify` subcommand.
#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Source store (JSON export or SQLite file).
    #[arg(long)]
    pub source: Option<PathBuf>,

    /// Migrated store (JSON export or SQLite file).
    #[arg(long)]
    pub migrated: Option<PathBuf>,

    /// Fernet key for source secrets. Repeat for rotated keys, newest first.
    #[arg(long = "source-key", value_name = "KEY")]
    pub source_keys: Vec<String>,

    /// Fernet key for migrated secrets. Repeat for rotated keys, newest first.
    #[arg(long = "migrated-key", value_name = "KEY")]
    pub migrated_keys: Vec<String>,

    /// Also require surrogate ids to match.
    #[arg(long)]
    pub include_ids: bool,

    /// Do not compare created_at / updated_at.
    #[arg(long)]
    pub ignore_timestamps: bool,

    /// Schema revision of both stores (default: detect).
    #[arg(long, value_parser = parse_revision)]
    pub revision: Option<SchemaRevision>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Write the report to a file instead of stdout.
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

pub fn parse_revision(s: &str) -> Result<SchemaRevision, String> {
    s.parse()
}

/// Execute the verify subcommand.
pub fn run_verify(args: &VerifyArgs, config: Option<&Path>) -> Result<u8> {
    let flags = FlagOverrides {
        source: args.source.clone(),
        migrated: args.migrated.clone(),
        source_keys: args.source_keys.clone(),
        migrated_keys: args.migrated_keys.clone(),
        include_ids: args.include_ids,
        ignore_timestamps: args.ignore_timestamps,
        revision: args.revision,
    };
    let cfg = VerifyConfig::resolve(config, flags).context("invalid configuration")?;
    tracing::debug!(config = ?cfg, "resolved configuration");

    let runtime = crate::loader_runtime()?;
    let (source, migrated) = runtime.block_on(async {
        let source = aim_store::load(&cfg.source).await?;
        let migrated = aim_store::load(&cfg.migrated).await?;
        Ok::<_, aim_store::StoreError>((source, migrated))
    })?;

    let mut verifier = MigrationVerifier::new().with_options(cfg.compare);
    if let Some(revision) = cfg.revision {
        verifier = verifier.with_revision(revision);
    }
    let report = verifier.verify(&source, &cfg.source_keys, &migrated, &cfg.migrated_keys)?;

    let format = if args.output.is_some() {
        OutputFormat::Json
    } else {
        args.format
    };
    emit(&render_report(&report, format)?, args.output.as_deref())?;

    Ok(if report.overall_success { 0 } else { 1 })
}
