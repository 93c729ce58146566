//! In-memory backend: a transactional KV store and a deterministic Signal
//! repository. Useful as a scaffold for new deployments and as the backing
//! store for this crate's tests.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::binary::SignalAddress;

use super::error::{Result, StoreError};
use super::traits::{EncType, EncryptedPayload, KeyStore, PreKeyBundle, SignalRepository};

#[derive(Default)]
struct MemoryStoreInner {
    committed: HashMap<(String, String), Vec<u8>>,
    /// Buffered writes while a transaction is open; `None` outside one.
    tx_buffer: Option<HashMap<(String, String), Vec<u8>>>,
    tx_depth: u32,
}

/// Namespaced KV store holding everything in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct read of committed state, bypassing any open transaction.
    /// Test helper for atomicity assertions.
    pub async fn committed_get(&self, namespace: &str, key: &str) -> Option<Vec<u8>> {
        let inner = self.inner.lock().await;
        inner
            .committed
            .get(&(namespace.to_string(), key.to_string()))
            .cloned()
    }
}

#[async_trait]
impl KeyStore for MemoryStore {
    async fn get(&self, namespace: &str, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        let inner = self.inner.lock().await;
        let mut out = HashMap::new();
        for key in keys {
            let lookup = (namespace.to_string(), key.clone());
            let value = inner
                .tx_buffer
                .as_ref()
                .and_then(|buffer| buffer.get(&lookup))
                .or_else(|| inner.committed.get(&lookup));
            if let Some(value) = value {
                out.insert(key.clone(), value.clone());
            }
        }
        Ok(out)
    }

    async fn set(&self, namespace: &str, entries: HashMap<String, Vec<u8>>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let target_is_tx = inner.tx_buffer.is_some();
        let target = if target_is_tx {
            inner.tx_buffer.as_mut().unwrap()
        } else {
            &mut inner.committed
        };
        for (key, value) in entries {
            target.insert((namespace.to_string(), key), value);
        }
        Ok(())
    }

    async fn tx_begin(&self, _scope: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.tx_buffer.is_none() {
            inner.tx_buffer = Some(HashMap::new());
        }
        inner.tx_depth += 1;
        Ok(())
    }

    async fn tx_commit(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.tx_depth == 0 {
            return Err(StoreError::NoTransaction);
        }
        inner.tx_depth -= 1;
        if inner.tx_depth == 0 {
            if let Some(buffer) = inner.tx_buffer.take() {
                inner.committed.extend(buffer);
            }
        }
        Ok(())
    }

    async fn tx_abort(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.tx_depth == 0 {
            return Err(StoreError::NoTransaction);
        }
        inner.tx_depth = 0;
        inner.tx_buffer = None;
        Ok(())
    }
}

#[derive(Default)]
struct SignalState {
    /// Addresses with a session; members are `fresh` until acknowledged.
    sessions: HashMap<String, bool>,
    sender_keys: HashSet<String>,
}

/// Deterministic Signal repository: ciphertext is a tagged copy of the
/// plaintext, sessions are plain presence flags. Sufficient to exercise every
/// relay path without real ratchet state.
#[derive(Default)]
pub struct MemorySignalRepository {
    state: Mutex<SignalState>,
}

impl MemorySignalRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-install an acknowledged session, as if prior traffic existed.
    pub async fn seed_session(&self, address: &SignalAddress) {
        let mut state = self.state.lock().await;
        state.sessions.insert(address.to_string(), false);
    }

    fn sender_key_id(group_id: &str, sender: &SignalAddress) -> String {
        format!("{group_id}::{sender}")
    }
}

#[async_trait]
impl SignalRepository for MemorySignalRepository {
    async fn validate_session(&self, address: &SignalAddress) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state.sessions.contains_key(&address.to_string()))
    }

    async fn install_prekey_bundle(
        &self,
        address: &SignalAddress,
        bundle: &PreKeyBundle,
    ) -> Result<()> {
        if bundle.device_id != address.device_id() {
            return Err(StoreError::InvalidBundle(format!(
                "bundle device {} does not match address {address}",
                bundle.device_id
            )));
        }
        let mut state = self.state.lock().await;
        state.sessions.entry(address.to_string()).or_insert(true);
        Ok(())
    }

    async fn encrypt_message(
        &self,
        address: &SignalAddress,
        plaintext: &[u8],
    ) -> Result<EncryptedPayload> {
        let state = self.state.lock().await;
        let fresh = state
            .sessions
            .get(&address.to_string())
            .ok_or_else(|| StoreError::NoSession(address.to_string()))?;
        let enc_type = if *fresh { EncType::Pkmsg } else { EncType::Msg };
        let mut ciphertext = Vec::with_capacity(plaintext.len() + 4);
        ciphertext.extend_from_slice(match enc_type {
            EncType::Pkmsg => b"pk::",
            EncType::Msg => b"mg::",
        });
        ciphertext.extend_from_slice(plaintext);
        Ok(EncryptedPayload {
            enc_type,
            ciphertext,
        })
    }

    async fn encrypt_group_message(
        &self,
        group_id: &str,
        sender: &SignalAddress,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        let state = self.state.lock().await;
        if !state
            .sender_keys
            .contains(&Self::sender_key_id(group_id, sender))
        {
            return Err(StoreError::NoSenderKey);
        }
        let mut ciphertext = Vec::with_capacity(plaintext.len() + 4);
        ciphertext.extend_from_slice(b"sk::");
        ciphertext.extend_from_slice(plaintext);
        Ok(ciphertext)
    }

    async fn create_sender_key_distribution(
        &self,
        group_id: &str,
        sender: &SignalAddress,
    ) -> Result<Vec<u8>> {
        let mut state = self.state.lock().await;
        state
            .sender_keys
            .insert(Self::sender_key_id(group_id, sender));
        Ok(format!("skdm::{group_id}::{sender}").into_bytes())
    }

    async fn has_sender_key(&self, group_id: &str, sender: &SignalAddress) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .sender_keys
            .contains(&Self::sender_key_id(group_id, sender)))
    }
}
