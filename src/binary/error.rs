use thiserror::Error;

pub type Result<T> = std::result::Result<T, BinaryError>;

#[derive(Debug, Clone, Error)]
pub enum BinaryError {
    #[error("required attribute '{0}' not found")]
    MissingAttr(String),
    #[error("failed to parse attribute: {0}")]
    AttrParse(String),
    #[error("multiple attribute errors: {0:?}")]
    AttrList(Vec<BinaryError>),
    #[error("invalid JID: {0}")]
    InvalidJid(String),
}
