use thiserror::Error;

use crate::binary::{BinaryError, Jid};
use crate::store::StoreError;
use crate::transport::TransportError;

pub type Result<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("not authenticated: missing {0}")]
    NotAuthenticated(&'static str),
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("session assertion failed ({context}): {source}")]
    SessionAssert {
        context: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("encryption failed for {jid}: {source}")]
    Encrypt {
        jid: Jid,
        #[source]
        source: StoreError,
    },
    #[error("group metadata fetch failed for {group}: {source}")]
    MetadataFetch {
        group: Jid,
        #[source]
        source: anyhow::Error,
    },
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    #[error("invalid JID: {0}")]
    InvalidJid(#[from] BinaryError),
    #[error("malformed server response: {0}")]
    MalformedResponse(#[source] anyhow::Error),
    #[error("cannot relay to {0}")]
    UnroutableDestination(Jid),
}

impl RelayError {
    /// An HTTP-ish status code for failures that map onto one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::NotAuthenticated(_) => Some(401),
            Self::Transport(TransportError::ServerError { code, .. }) => Some(*code),
            Self::Transport(TransportError::Timeout) => Some(408),
            _ => None,
        }
    }
}
