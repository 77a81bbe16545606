//! Error types for the event store and directory.

use flow_ids::IdError;

/// Errors that can occur during store and directory operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A database operation failed.
    #[error("store database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No record exists for the given key.
    #[error("not found: {0}")]
    NotFound(String),

    /// An event or organization with this identifier already exists.
    #[error("identifier already exists: {0}")]
    DuplicateId(String),

    /// An identifier or prefix was malformed, either on input or in a
    /// stored row.
    #[error(transparent)]
    Id(#[from] IdError),
}

impl StoreError {
    /// Maps a unique-constraint violation to [`StoreError::DuplicateId`].
    pub(crate) fn from_insert(err: rusqlite::Error, key: &str) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => Self::DuplicateId(key.to_string()),
            _ => Self::Database(err),
        }
    }
}
