use thiserror::Error;

use aim_core::EntityKind;

/// Failure to run structural validation at all.
///
/// Data problems are reported as [`crate::SchemaIssue`]s, never as errors.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// A catalog entry did not compile into a row validator.
    #[error("validator build error for table '{table}': {reason}")]
    ValidatorBuild {
        /// Table whose catalog entry failed.
        table: EntityKind,
        /// Compiler message.
        reason: String,
    },
}
