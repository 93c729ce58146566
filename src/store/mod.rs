//! External collaborator boundary: key storage and the Signal engine.
//!
//! The relay core never touches ratchet state or persistence engines
//! directly; everything flows through the traits defined here.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{Result as StoreResult, StoreError};
pub use traits::{
    EncType, EncryptedPayload, KeyStore, PreKeyBundle, SignalRepository, NS_DEVICE_LIST,
    NS_LID_MAPPING, NS_SENDER_KEY_MEMORY,
};
