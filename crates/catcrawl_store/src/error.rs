//! Error types for the metadata store.

use thiserror::Error;

/// Store operation result type.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Metadata store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLx error (connection, query, etc.)
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data that cannot be represented (e.g. a negative size)
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl StoreError {
    /// Create an invalid data error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }
}
