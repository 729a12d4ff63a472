use std::path::PathBuf;

use thiserror::Error;

use aim_core::CoreError;

/// A dataset could not be loaded.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The file could not be read.
    #[error("cannot read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a well-formed export document.
    #[error("invalid export document {}: {source}", .path.display())]
    Document {
        path: PathBuf,
        #[source]
        source: CoreError,
    },

    /// The SQLite store could not be opened or queried.
    #[error("sqlite error in {}: {source}", .path.display())]
    Sqlite {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    /// The file is neither a JSON export nor a SQLite database.
    #[error("cannot determine dataset format of {}", .0.display())]
    UnknownFormat(PathBuf),
}
