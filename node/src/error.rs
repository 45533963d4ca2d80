use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("verification error: {0}")]
    Verification(#[from] affirm_verification::VerificationError),

    #[error("store error: {0}")]
    Store(#[from] affirm_store::StoreError),

    #[error("LMDB error: {0}")]
    Lmdb(#[from] affirm_store_lmdb::LmdbError),

    #[error("invalid address: {0}")]
    InvalidAddress(#[from] affirm_types::TypesError),

    #[error("invalid public URL: {0}")]
    PublicUrl(#[from] url::ParseError),

    #[error("mail error: {0}")]
    Mail(#[from] affirm_verification::MailError),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
