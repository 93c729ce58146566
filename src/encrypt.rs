use std::sync::Arc;

use futures_util::{stream, StreamExt};

use crate::binary::{Attrs, Jid, Node, NodeBuilder};
use crate::error::{RelayError, Result};
use crate::keyed_mutex::KeyedMutex;
use crate::store::{EncryptedPayload, SignalRepository, StoreResult};

/// SKMSG ciphertext plus the distribution message that unlocks it.
#[derive(Debug, Clone)]
pub struct GroupCiphertext {
    pub skmsg: Vec<u8>,
    pub skdm: Vec<u8>,
}

/// Wraps Signal pairwise and group encryption, enforcing per-peer
/// serialization: the Double Ratchet does not commute, so two concurrent
/// encryptions for one wire JID must never interleave.
pub struct Encryptor {
    signal: Arc<dyn SignalRepository>,
    peer_locks: KeyedMutex,
    compat_v6: bool,
}

impl Encryptor {
    pub fn new(signal: Arc<dyn SignalRepository>, compat_v6: bool) -> Self {
        Self {
            signal,
            peer_locks: KeyedMutex::new(),
            compat_v6,
        }
    }

    /// Pairwise encrypt one payload for one wire JID.
    ///
    /// In V6-compat mode the per-peer mutex is bypassed: throughput over
    /// ratchet safety, matching legacy behavior.
    pub async fn encrypt(&self, wire_jid: &Jid, plaintext: &[u8]) -> StoreResult<EncryptedPayload> {
        let address = wire_jid.to_protocol_address();
        if self.compat_v6 {
            return self.signal.encrypt_message(&address, plaintext).await;
        }
        let key = wire_jid.to_string();
        let _guard = self.peer_locks.lock(&key).await;
        self.signal.encrypt_message(&address, plaintext).await
    }

    /// Group encrypt: one SKMSG blob for all members plus the current
    /// sender-key distribution message. `me_id` must match the group's
    /// addressing mode (LID-addressed groups sign as the caller's LID).
    pub async fn encrypt_group(
        &self,
        group_jid: &Jid,
        plaintext: &[u8],
        me_id: &Jid,
    ) -> StoreResult<GroupCiphertext> {
        let group_id = group_jid.to_string();
        let sender = me_id.to_protocol_address();

        // Creating the distribution message also creates sender key state on
        // first use, so the encrypt below cannot race an empty record.
        let skdm = self
            .signal
            .create_sender_key_distribution(&group_id, &sender)
            .await?;
        let skmsg = self
            .signal
            .encrypt_group_message(&group_id, &sender, plaintext)
            .await?;

        Ok(GroupCiphertext { skmsg, skdm })
    }

    /// Fan one payload out to many devices, producing `<to><enc …/></to>`
    /// envelopes. Returns the envelopes and whether any was a `pkmsg`.
    ///
    /// Strict mode fails on the first device error; V6-compat drops the
    /// failing device with a warning and keeps going.
    pub async fn encrypt_for_devices(
        &self,
        jobs: Vec<(Jid, Arc<Vec<u8>>)>,
        enc_extra_attrs: &Attrs,
    ) -> Result<(Vec<Node>, bool)> {
        let concurrency = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .clamp(1, 16);

        let results: Vec<(Jid, StoreResult<EncryptedPayload>)> = stream::iter(jobs)
            .map(|(device_jid, plaintext)| async move {
                let result = self.encrypt(&device_jid, &plaintext).await;
                (device_jid, result)
            })
            .buffered(concurrency)
            .collect()
            .await;

        let mut participant_nodes = Vec::new();
        let mut includes_prekey = false;

        for (device_jid, result) in results {
            let payload = match result {
                Ok(payload) => payload,
                Err(e) if self.compat_v6 => {
                    log::warn!(
                        target: "encrypt",
                        "dropping {device_jid} from fan-out after encrypt failure: {e}"
                    );
                    continue;
                }
                Err(e) => {
                    return Err(RelayError::Encrypt {
                        jid: device_jid,
                        source: e,
                    })
                }
            };

            includes_prekey |= payload.enc_type == crate::store::EncType::Pkmsg;

            let mut enc_attrs = Attrs::new();
            enc_attrs.insert("v".to_string(), "2".to_string());
            enc_attrs.insert("type".to_string(), payload.enc_type.as_str().to_string());
            for (k, v) in enc_extra_attrs {
                enc_attrs.insert(k.clone(), v.clone());
            }

            let enc_node = NodeBuilder::new("enc")
                .attrs(enc_attrs)
                .bytes(payload.ciphertext)
                .build();
            participant_nodes.push(
                NodeBuilder::new("to")
                    .attr("jid", device_jid.to_string())
                    .children([enc_node])
                    .build(),
            );
        }

        Ok((participant_nodes, includes_prekey))
    }
}
