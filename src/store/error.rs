use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no Signal session for {0}")]
    NoSession(String),
    #[error("no sender key state")]
    NoSenderKey,
    #[error("invalid pre-key bundle: {0}")]
    InvalidBundle(String),
    #[error("untrusted identity for {0}")]
    UntrustedIdentity(String),
    #[error("no transaction in progress")]
    NoTransaction,
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("backend failure: {0}")]
    Backend(String),
}
