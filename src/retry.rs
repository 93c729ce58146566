//! Retention of recently sent messages for retry-receipt re-encryption.
//!
//! Retry *orchestration* (deciding when to resend) lives with the caller's
//! receipt handling; the relay only keeps plaintexts around so a resend can
//! be encrypted for the requesting device.

use moka::sync::Cache;

use crate::binary::{Jid, MessageId};
use crate::proto::wa;

/// Bounded LRU of `(chat, message id) → message`.
pub struct RecentMessages {
    cache: Cache<(String, MessageId), wa::Message>,
}

impl RecentMessages {
    pub fn new(capacity: u64) -> Self {
        Self {
            cache: Cache::new(capacity),
        }
    }

    pub fn insert(&self, chat: &Jid, id: &str, message: wa::Message) {
        self.cache.insert((chat.to_string(), id.to_string()), message);
    }

    pub fn get(&self, chat: &Jid, id: &str) -> Option<wa::Message> {
        self.cache.get(&(chat.to_string(), id.to_string()))
    }
}

/// Result classes reported by the server for a media re-upload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaRetryResult {
    Success,
    NotFound,
    DecryptionError,
    GeneralError,
}

impl MediaRetryResult {
    /// The status code surfaced to callers for each result class.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Success => 200,
            Self::NotFound => 404,
            Self::DecryptionError => 412,
            Self::GeneralError => 418,
        }
    }

    pub fn from_wire(value: i32) -> Self {
        match value {
            1 => Self::Success,
            3 => Self::NotFound,
            4 => Self::DecryptionError,
            _ => Self::GeneralError,
        }
    }
}
