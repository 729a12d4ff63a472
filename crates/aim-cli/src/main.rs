//! # aim CLI entry point
//!
//! Parses command-line arguments, installs logging, and dispatches to
//! subcommand handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use aim_cli::schema::{run_schema, SchemaArgs};
use aim_cli::token::{run_token, TokenArgs};
use aim_cli::verify::{run_verify, VerifyArgs};

/// Configuration-store migration verifier.
///
/// Proves that a store migrated between implementations holds the same
/// records, satisfies the same invariants, and that every encrypted secret
/// decrypts under the migrated side's keys.
#[derive(Parser, Debug)]
#[command(name = "aim", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Log line format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Path to configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Verify a migrated store against its source.
    Verify(VerifyArgs),

    /// Check a single store's structure and record integrity.
    Schema(SchemaArgs),

    /// Fernet key and token utilities.
    Token(TokenArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over -v.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    match cli.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "aim starting");

    let result = match &cli.command {
        Commands::Verify(args) => run_verify(args, cli.config.as_deref()),
        Commands::Schema(args) => run_schema(args),
        Commands::Token(args) => run_token(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}
