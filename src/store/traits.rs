use std::collections::HashMap;

use async_trait::async_trait;

use crate::binary::SignalAddress;

use super::error::Result;

/// Namespace for LID↔PN identity mappings.
pub const NS_LID_MAPPING: &str = "lid-mapping";
/// Namespace for per-group sender-key distribution memory.
pub const NS_SENDER_KEY_MEMORY: &str = "sender-key-memory";
/// Namespace for per-user resolved device lists.
pub const NS_DEVICE_LIST: &str = "device-list";

/// Namespaced key-value store with a re-entrant scoped transaction.
///
/// All relay state changes for one send (mapping writes, session installs,
/// sender-key-memory updates) are made while a transaction is open and become
/// durable only on commit. `tx_begin` while a transaction is already open
/// joins the outer transaction; the matching `tx_commit` is a no-op until the
/// outermost level commits.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn get(&self, namespace: &str, keys: &[String]) -> Result<HashMap<String, Vec<u8>>>;

    async fn set(&self, namespace: &str, entries: HashMap<String, Vec<u8>>) -> Result<()>;

    async fn tx_begin(&self, scope: &str) -> Result<()>;

    async fn tx_commit(&self) -> Result<()>;

    async fn tx_abort(&self) -> Result<()>;
}

/// Pairwise ciphertext class: `pkmsg` carries pre-key material for session
/// establishment, `msg` is a plain ratchet message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncType {
    Msg,
    Pkmsg,
}

impl EncType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Msg => "msg",
            Self::Pkmsg => "pkmsg",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncryptedPayload {
    pub enc_type: EncType,
    pub ciphertext: Vec<u8>,
}

/// A parsed X3DH pre-key bundle as returned by the `encrypt` IQ namespace.
#[derive(Debug, Clone)]
pub struct PreKeyBundle {
    pub registration_id: u32,
    pub device_id: u32,
    pub identity_key: [u8; 32],
    pub pre_key: Option<(u32, [u8; 32])>,
    pub signed_pre_key_id: u32,
    pub signed_pre_key: [u8; 32],
    pub signed_pre_key_signature: [u8; 64],
}

/// The Signal protocol engine owned by the key store.
///
/// Sessions, identities and sender keys never cross this boundary; the relay
/// core only asks for ciphertext and session facts.
#[async_trait]
pub trait SignalRepository: Send + Sync {
    /// Whether a live session exists for this address.
    async fn validate_session(&self, address: &SignalAddress) -> Result<bool>;

    /// Run X3DH over a fetched bundle, installing a fresh session.
    /// Idempotent for an already-processed bundle.
    async fn install_prekey_bundle(
        &self,
        address: &SignalAddress,
        bundle: &PreKeyBundle,
    ) -> Result<()>;

    /// Double-Ratchet encrypt one pairwise payload. Callers must serialize
    /// invocations per address; ratchet steps do not commute.
    async fn encrypt_message(
        &self,
        address: &SignalAddress,
        plaintext: &[u8],
    ) -> Result<EncryptedPayload>;

    /// Sender-key encrypt one group payload. Fails with
    /// [`super::StoreError::NoSenderKey`] when no sender key state exists yet.
    async fn encrypt_group_message(
        &self,
        group_id: &str,
        sender: &SignalAddress,
        plaintext: &[u8],
    ) -> Result<Vec<u8>>;

    /// Serialize the current sender-key distribution message for the group,
    /// creating sender key state on first use.
    async fn create_sender_key_distribution(
        &self,
        group_id: &str,
        sender: &SignalAddress,
    ) -> Result<Vec<u8>>;

    async fn has_sender_key(&self, group_id: &str, sender: &SignalAddress) -> Result<bool>;
}
