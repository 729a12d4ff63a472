//! # aim-cli — Migration Verifier CLI
//!
//! Provides the `aim` command-line interface.
//!
//! ## Subcommands
//!
//! - `aim verify`: Verify a migrated store against its source.
//! - `aim schema`: Structural and integrity checks of one store.
//! - `aim token`: Fernet key generation, encryption, decryption, inspection.
//!
//! ```bash
//! FERNET_KEY=... aim verify --source old/config.db --migrated new/config.db
//! aim verify --config aim.yaml --format json --output report.json
//! aim schema export.json --revision legacy
//! aim token decrypt --key "$NEW" --key "$OLD" gAAAAAB...
//! ```
//!
//! ## Exit Codes
//!
//! `0` success, `1` validation failure, `2` operational error.

pub mod config;
pub mod render;
pub mod schema;
pub mod token;
pub mod verify;

use anyhow::{Context, Result};

/// Single-threaded runtime for the dataset loaders.
pub fn loader_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")
}
