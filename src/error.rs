//! Error types for the media library

use std::path::PathBuf;
use thiserror::Error;

/// Result type for library operations
pub type Result<T> = std::result::Result<T, LibraryError>;

/// Errors surfaced by the catalog store, the tag hierarchy and their collaborators
#[derive(Error, Debug)]
pub enum LibraryError {
    /// A store operation was attempted before the database was opened
    #[error("Library database is not connected")]
    NotConnected,

    /// The database location could not be opened or initialized
    #[error("Failed to open library database at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A tag mutation referenced a parent tag that does not exist
    #[error("Parent tag {parent_id} does not exist")]
    ForeignKeyViolation { parent_id: i64 },

    /// Rename, delete or association targeted a missing row
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// The existence check itself failed (e.g. permission denied)
    #[error("Could not probe {path}: {source}")]
    IoProbe {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Re-parenting would make a tag its own ancestor
    #[error("Moving tag {tag_id} under {parent_id} would create a cycle")]
    CycleDetected { tag_id: i64, parent_id: i64 },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A background task panicked or was cancelled
    #[error("Background task failed: {0}")]
    Task(String),
}

impl LibraryError {
    pub(crate) fn tag_not_found(id: i64) -> Self {
        LibraryError::NotFound { entity: "Tag", id }
    }

    pub(crate) fn item_not_found(id: i64) -> Self {
        LibraryError::NotFound { entity: "Item", id }
    }
}
