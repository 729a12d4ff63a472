//! # aim-verify — Migration Verification
//!
//! Certifies that a configuration store migrated from one implementation to
//! another is a faithful copy:
//!
//! - **Integrity** (`integrity.rs`): per-record business rules (non-empty
//!   names, parseable URLs, 0/1 flags, positive timeouts) and per-collection
//!   rules (at most one enabled provider, unique natural keys), with secret
//!   fields checked for decryptability.
//!
//! - **Equivalence** (`equivalence.rs`): pairs source and migrated records
//!   by natural key and compares them field by field. Secrets are compared
//!   by decrypted plaintext, each side under its own key ring.
//!
//! - **Report** (`report.rs`): folds everything into a serializable
//!   [`ValidationReport`] with a single `overall_success` verdict.
//!
//! - **Pipeline** (`pipeline.rs`): [`MigrationVerifier`] runs all phases in
//!   order over two raw datasets.
//!
//! ## Crate Policy
//!
//! - Depends on `aim-core`, `aim-crypto`, and `aim-schema` internally.
//! - No I/O. Datasets arrive already loaded.
//! - Data problems are report entries, never errors. Every detectable
//!   problem is collected; nothing short-circuits the run.
//! - Plaintext secrets never leave this crate in any report or log line.

pub mod equivalence;
pub mod integrity;
pub mod pipeline;
pub mod report;

pub use equivalence::{
    CollectionComparison, CompareOptions, EquivalenceComparator, EquivalenceIssue,
    EquivalenceReport, Side,
};
pub use integrity::{
    DatasetIntegrityReport, IntegrityChecker, IntegrityIssue, IntegrityIssueKind,
    IntegrityReport, IntegrityRules,
};
pub use pipeline::{Inspection, MigrationVerifier, VerifyError};
pub use report::{IntegritySection, ReportSummary, SchemaSection, ValidationReport};
