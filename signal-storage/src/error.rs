use common::UnknownVariant;

/// Error types for storage operations
///
/// A missing signal is not an error: lookups return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Migration {file} failed: {source}")]
    Migration {
        file: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<UnknownVariant> for StorageError {
    fn from(e: UnknownVariant) -> Self {
        StorageError::InvalidRecord(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorageError>;
