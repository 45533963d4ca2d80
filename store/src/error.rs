use thiserror::Error;

/// Failures of a storage backend.
///
/// None of these are business outcomes; the engine surfaces them as internal
/// errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record an operation depends on does not exist.
    #[error("record not found: {0}")]
    NotFound(String),

    /// An insert collided with an existing record.
    #[error("record already exists: {0}")]
    Duplicate(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("record encoding error: {0}")]
    Serialization(String),

    /// Indexes disagree with the records they point at.
    #[error("store is corrupted: {0}")]
    Corruption(String),
}
