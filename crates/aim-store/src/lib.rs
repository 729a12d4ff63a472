//! # aim-store — Dataset Loaders
//!
//! Reads one implementation's configuration store into a
//! [`aim_core::RawDataset`]:
//!
//! - **JSON** (`json.rs`): export documents as written by either
//!   implementation's export command.
//! - **SQLite** (`sqlite.rs`): the live store file, opened read-only.
//!
//! [`load`] picks the loader from the file extension, falling back to the
//! SQLite file header.
//!
//! ## Crate Policy
//!
//! - Depends only on `aim-core` internally.
//! - Loaders never interpret rows. Typing and checking belong to the
//!   verification crates, so a malformed row still loads.
//! - No connection outlives the call that opened it.

pub mod error;
pub mod json;
pub mod sqlite;

use std::path::Path;

use aim_core::RawDataset;

pub use error::StoreError;
pub use json::load_json;
pub use sqlite::load_sqlite;

/// Leading bytes of every SQLite 3 database file.
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// On-disk dataset format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetFormat {
    Json,
    Sqlite,
}

impl DatasetFormat {
    /// Determine the format of the file at `path`.
    pub async fn detect(path: &Path) -> Result<Self, StoreError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("json") => return Ok(Self::Json),
            Some("db" | "sqlite" | "sqlite3") => return Ok(Self::Sqlite),
            _ => {}
        }

        let bytes = tokio::fs::read(path).await.map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if bytes.starts_with(SQLITE_HEADER) {
            Ok(Self::Sqlite)
        } else if bytes.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'{') {
            Ok(Self::Json)
        } else {
            Err(StoreError::UnknownFormat(path.to_path_buf()))
        }
    }
}

/// Load the dataset at `path`, whichever format it is in.
pub async fn load(path: &Path) -> Result<RawDataset, StoreError> {
    match DatasetFormat::detect(path).await? {
        DatasetFormat::Json => load_json(path).await,
        DatasetFormat::Sqlite => load_sqlite(path).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_detect_by_extension_without_reading() {
        let missing = Path::new("/nonexistent/store.db");
        assert_eq!(DatasetFormat::detect(missing).await.unwrap(), DatasetFormat::Sqlite);
        let missing = Path::new("/nonexistent/export.JSON");
        assert_eq!(DatasetFormat::detect(missing).await.unwrap(), DatasetFormat::Json);
    }

    #[tokio::test]
    async fn test_detect_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let json = dir.path().join("export.bak");
        std::fs::write(&json, "  \n{\"version\": \"1\"}").unwrap();
        assert_eq!(DatasetFormat::detect(&json).await.unwrap(), DatasetFormat::Json);

        let other = dir.path().join("notes.txt");
        std::fs::write(&other, "hello").unwrap();
        assert!(matches!(
            DatasetFormat::detect(&other).await,
            Err(StoreError::UnknownFormat(_))
        ));
    }
}
