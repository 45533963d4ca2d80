use affirm_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LmdbError {
    #[error("LMDB error: {0}")]
    Heed(#[from] heed::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("key not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("corrupted record: {0}")]
    Corruption(String),

    #[error("database schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: u32, supported: u32 },
}

impl From<LmdbError> for StoreError {
    fn from(e: LmdbError) -> Self {
        match e {
            LmdbError::NotFound(what) => StoreError::NotFound(what),
            LmdbError::Serialization(e) => StoreError::Serialization(e.to_string()),
            LmdbError::Corruption(what) => StoreError::Corruption(what),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
