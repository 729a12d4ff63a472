//! # Error Types
//!
//! Errors raised while building the in-memory model. These are the only
//! faults `aim-core` produces; everything that goes wrong with an individual
//! record is captured as data by the layers above.

use thiserror::Error;

use crate::entity::EntityKind;

/// Top-level error type for the domain model.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A timestamp string could not be parsed.
    #[error("invalid timestamp {input:?}: {reason}")]
    InvalidTimestamp {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A table name did not correspond to any known entity kind.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// The raw dataset document had the wrong overall shape.
    #[error("malformed dataset document: {0}")]
    MalformedDocument(String),

    /// A single row could not be converted into its typed record.
    #[error("cannot convert {kind} row: {reason}")]
    RecordConversion {
        /// The entity kind being converted.
        kind: EntityKind,
        /// The serde error text.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_timestamp_display() {
        let err = CoreError::InvalidTimestamp {
            input: "yesterday".to_string(),
            reason: "not RFC 3339".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("yesterday"));
        assert!(msg.contains("not RFC 3339"));
    }

    #[test]
    fn test_record_conversion_names_table() {
        let err = CoreError::RecordConversion {
            kind: EntityKind::McpServer,
            reason: "missing field `command`".to_string(),
        };
        assert!(err.to_string().contains("mcp_servers"));
    }
}
