//! # aim-core — Domain Model for the Migration Verifier
//!
//! Typed records for the five tables of the configuration store, the raw and
//! typed dataset forms, and the small primitives shared by every other crate
//! in the workspace. Depends on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **One struct per table.** `ClaudeProvider`, `CodexProvider`,
//!    `AgentGuide`, `McpServer`, `CommonConfig` behind the `Entity` trait.
//!    No dictionary lookups once a row is typed.
//!
//! 2. **Two-stage datasets.** Loaders produce a `RawDataset`; structural
//!    checks run on it. `Dataset::from_raw` converts fail-soft and hands back
//!    the rows it could not convert.
//!
//! 3. **Boolean-domain values stay integers.** `Flag` keeps the stored
//!    integer so a `2` in an `enabled` column is visible to the checks.
//!
//! ## Crate Policy
//!
//! - No I/O.
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod dataset;
pub mod entity;
pub mod error;
pub mod temporal;

pub use dataset::{Collected, Dataset, RawDataset, RawTable, RejectedRow, Row};
pub use entity::{
    AgentGuide, ClaudeProvider, CodexProvider, CommonConfig, Entity, EntityKind, Flag, McpServer,
    DEFAULT_CATEGORY, DEFAULT_MCP_TYPE, DEFAULT_PROVIDER_TYPE, DEFAULT_TIMEOUT_MS,
};
pub use error::CoreError;
pub use temporal::Timestamp;
