//! JSON export files.

use std::path::Path;

use aim_core::{EntityKind, RawDataset};

use crate::error::StoreError;

/// Load an export document (`{"version": ..., "claude_providers": [...], ...}`).
pub async fn load_json(path: &Path) -> Result<RawDataset, StoreError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let dataset = RawDataset::from_json_str(&text).map_err(|source| StoreError::Document {
        path: path.to_path_buf(),
        source,
    })?;

    for kind in EntityKind::ALL {
        match dataset.table(kind) {
            Some(table) => {
                tracing::debug!(table = %kind, rows = table.row_count(), "loaded table")
            }
            None => tracing::debug!(table = %kind, "table absent from export"),
        }
    }
    tracing::info!(path = %path.display(), version = ?dataset.version, "loaded JSON export");
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_export_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"version": "1.2.0", "common_configs": [{{"id": 1, "key": "version", "value": "1.2.0"}}], "agent_guides": []}}"#
        )
        .unwrap();

        let raw = load_json(file.path()).await.unwrap();
        assert_eq!(raw.version.as_deref(), Some("1.2.0"));
        assert_eq!(raw.table(EntityKind::CommonConfig).unwrap().row_count(), 1);
        assert!(raw.has_table(EntityKind::AgentGuide));
        assert!(!raw.has_table(EntityKind::McpServer));
    }

    #[tokio::test]
    async fn test_malformed_export_is_document_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"claude_providers": {{}}}}"#).unwrap();
        let err = load_json(file.path()).await.unwrap_err();
        assert!(matches!(err, StoreError::Document { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_json(&dir.path().join("absent.json")).await.unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
