use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use prost::Message as ProtoMessage;

use crate::binary::{Jid, MessageId, Node, NodeBuilder};
use crate::config::{PatchOutcome, RelayConfig};
use crate::encrypt::Encryptor;
use crate::error::{RelayError, Result};
use crate::group::GroupState;
use crate::identity::IdentityMap;
use crate::mediaconn::{MediaConn, MediaConnManager};
use crate::messages::MessageUtils;
use crate::proto::wa;
use crate::resolver::DeviceResolver;
use crate::retry::RecentMessages;
use crate::session::SessionGuard;
use crate::stanza::{self, MessageStanza};
use crate::store::{EncType, KeyStore, SignalRepository, StoreError};
use crate::transport::{RequestUtils, Transport};
use crate::types::message::{AddressingMode, EditAttribute};

/// Who we are on the wire: the phone-number wire JID of this device, the
/// LID counterpart once known, and the signed device identity distributed
/// with pre-key messages.
#[derive(Clone)]
pub struct SenderIdentity {
    pub pn: Jid,
    pub lid: Option<Jid>,
    pub account: Option<wa::AdvSignedDeviceIdentity>,
}

/// Retry-resend target supplied by the receipts subsystem.
#[derive(Debug, Clone)]
pub struct RetryParticipant {
    pub jid: Jid,
    pub count: u32,
}

#[derive(Default, Clone)]
pub struct RelayOptions {
    pub message_id: Option<MessageId>,
    /// Present on retry-resends: encrypt pairwise exactly once to this
    /// participant instead of fanning out.
    pub participant: Option<RetryParticipant>,
    /// Recipients of a status broadcast; the group cache is not consulted.
    pub status_jid_list: Vec<Jid>,
    pub edit: EditAttribute,
    pub additional_attributes: Vec<(String, String)>,
    pub additional_nodes: Vec<Node>,
}

impl RelayOptions {
    /// Peer data operations ride to our own devices with high push priority
    /// and a default-appdata meta marker.
    pub fn peer_data_operation() -> Self {
        Self {
            additional_attributes: vec![
                ("category".to_string(), "peer".to_string()),
                ("push_priority".to_string(), "high_force".to_string()),
            ],
            additional_nodes: vec![NodeBuilder::new("meta").attr("appdata", "default").build()],
            ..Default::default()
        }
    }

    fn is_peer(&self) -> bool {
        self.additional_attributes
            .iter()
            .any(|(k, v)| k == "category" && v == "peer")
    }
}

/// Top-level orchestrator: turns one application message into the encrypted
/// stanza(s) for every recipient device and ships them.
pub struct Relay {
    config: RelayConfig,
    me: SenderIdentity,
    transport: Arc<dyn Transport>,
    requests: Arc<RequestUtils>,
    store: Arc<dyn KeyStore>,
    identity: Arc<IdentityMap>,
    resolver: DeviceResolver,
    sessions: SessionGuard,
    groups: GroupState,
    encryptor: Encryptor,
    recent: RecentMessages,
    media: MediaConnManager,
}

impl Relay {
    pub fn new(
        config: RelayConfig,
        me: SenderIdentity,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyStore>,
        signal: Arc<dyn SignalRepository>,
    ) -> Self {
        let requests = Arc::new(RequestUtils::new());
        let identity = Arc::new(IdentityMap::new(store.clone()));
        let resolver = DeviceResolver::new(
            transport.clone(),
            requests.clone(),
            identity.clone(),
            store.clone(),
            config.user_devices_cache.clone(),
        );
        let sessions = SessionGuard::new(
            transport.clone(),
            requests.clone(),
            identity.clone(),
            signal.clone(),
            config.group_assert_chunk,
            config.group_assert_delay,
        );
        let groups = GroupState::new(
            transport.clone(),
            requests.clone(),
            store.clone(),
            identity.clone(),
            config.cached_group_metadata.clone(),
        );
        let encryptor = Encryptor::new(signal, config.compat_v6_group_send);
        let recent = RecentMessages::new(config.recent_messages_cache_size);
        let media = MediaConnManager::new(transport.clone(), requests.clone());

        Self {
            config,
            me,
            transport,
            requests,
            store,
            identity,
            resolver,
            sessions,
            groups,
            encryptor,
            recent,
            media,
        }
    }

    pub fn identity_map(&self) -> &Arc<IdentityMap> {
        &self.identity
    }

    pub fn group_state(&self) -> &GroupState {
        &self.groups
    }

    pub fn recent_messages(&self) -> &RecentMessages {
        &self.recent
    }

    pub async fn media_conn(&self, force: bool) -> Result<MediaConn> {
        self.media.get(force).await
    }

    /// Compose and send one `<receipt>` stanza.
    pub async fn send_receipt(
        &self,
        target: &crate::receipt::ReceiptTarget,
        receipt_type: crate::receipt::ReceiptType,
    ) -> Result<()> {
        if let Some(node) = crate::receipt::build_receipt(target, receipt_type) {
            self.transport.send_node(node).await?;
        }
        Ok(())
    }

    /// Relay one message to a destination, returning the message id.
    ///
    /// All keystore side effects (mapping writes, session installs,
    /// sender-key-memory updates) commit atomically with the send: the
    /// stanza goes out inside the transaction and a transport failure aborts
    /// it.
    pub async fn relay_message(
        &self,
        to: &Jid,
        message: wa::Message,
        opts: RelayOptions,
    ) -> Result<MessageId> {
        let message_id = match &opts.message_id {
            Some(id) => id.clone(),
            None => self.requests.generate_message_id(Some(&self.me.pn)),
        };

        // Newsletters carry plaintext payloads and touch no keystore state,
        // so no transaction is opened for them.
        if to.is_newsletter() {
            let node = stanza::newsletter_stanza(to, &message_id, &message);
            self.transport.send_node(node).await?;
            if self.config.enable_recent_message_cache {
                self.recent.insert(to, &message_id, message);
            }
            return Ok(message_id);
        }

        self.store.tx_begin(&self.me.pn.user).await?;
        match self.relay_in_transaction(to, &message, &opts, &message_id).await {
            Ok(()) => {
                self.store.tx_commit().await?;
            }
            Err(e) => {
                if let Err(abort_err) = self.store.tx_abort().await {
                    log::warn!(target: "relay", "transaction abort failed: {abort_err}");
                }
                return Err(e);
            }
        }

        if self.config.enable_recent_message_cache && opts.participant.is_none() {
            self.recent.insert(to, &message_id, message);
        }
        if self.config.emit_own_events {
            log::debug!(target: "relay", "relayed {message_id} to {to}");
        }
        Ok(message_id)
    }

    async fn relay_in_transaction(
        &self,
        to: &Jid,
        message: &wa::Message,
        opts: &RelayOptions,
        message_id: &str,
    ) -> Result<()> {
        if opts.is_peer() {
            let node = self.prepare_peer_stanza(to, message, opts, message_id).await?;
            self.transport.send_node(node).await?;
            return Ok(());
        }
        if let Some(participant) = &opts.participant {
            let node = self
                .prepare_retry_stanza(to, message, participant, opts, message_id)
                .await?;
            self.transport.send_node(node).await?;
            return Ok(());
        }
        if to.is_group() || to.is_status_broadcast() {
            let (node, mark_after_send) =
                self.prepare_group_stanza(to, message, opts, message_id).await?;
            self.transport.send_node(node).await?;
            // Strict mode records key distribution only once the stanza is
            // actually on the wire; the surrounding transaction still makes
            // the write atomic with everything else.
            if !mark_after_send.is_empty() {
                self.groups.mark_sent(to, &mark_after_send).await?;
            }
            return Ok(());
        }
        let node = self.prepare_dm_stanza(to, message, opts, message_id).await?;
        self.transport.send_node(node).await?;
        Ok(())
    }

    async fn prepare_group_stanza(
        &self,
        to: &Jid,
        message: &wa::Message,
        opts: &RelayOptions,
        message_id: &str,
    ) -> Result<(Node, Vec<Jid>)> {
        let v6 = self.config.compat_v6_group_send;
        let is_status = to.is_status_broadcast();

        let (addressing_mode, mut participants, expiration) = if is_status {
            let users: Vec<Jid> = opts
                .status_jid_list
                .iter()
                .map(Jid::to_non_ad)
                .collect();
            (AddressingMode::Pn, users, None)
        } else {
            let meta = self.groups.get_or_fetch(to).await?;
            (
                meta.addressing_mode,
                meta.addressing_jids(),
                meta.ephemeral_duration,
            )
        };

        let own_sending = match addressing_mode {
            AddressingMode::Lid => self
                .me
                .lid
                .clone()
                .ok_or(RelayError::NotAuthenticated("LID identity"))?,
            AddressingMode::Pn => self.me.pn.clone(),
        };
        let own_base = own_sending.to_non_ad();
        if !participants.iter().any(|p| p.is_same_user_as(&own_base)) {
            participants.push(own_base.clone());
        }

        let mut devices = self.resolver.resolve_devices(&participants, true, false).await?;
        let own_primary = own_base.with_device(0);
        if !devices.contains(&own_primary) {
            devices.push(own_primary);
        }
        // The exact sender device never receives its own fan-out.
        devices.retain(|d| *d != own_sending);

        let (patched, overrides) = self.apply_patch(message, &devices);
        if !overrides.is_empty() {
            log::warn!(
                target: "relay",
                "per-recipient patching is not applicable to sender-key sends; using the base message"
            );
        }

        let plaintext = MessageUtils::pad_message_v2(patched.encode_to_vec());
        let group_ct = match self.encryptor.encrypt_group(to, &plaintext, &own_sending).await {
            Ok(ct) => ct,
            Err(StoreError::NoSenderKey) => {
                // Sender key state vanished (e.g. rotated underneath us):
                // forget who had the old key and distribute fresh.
                log::warn!(target: "relay", "no sender key state for {to}, forcing redistribution");
                self.groups.clear_sender_key_memory(to).await?;
                self.encryptor
                    .encrypt_group(to, &plaintext, &own_sending)
                    .await?
            }
            Err(e) => return Err(e.into()),
        };

        let memory = if v6 {
            HashSet::new()
        } else {
            self.groups.sender_key_memory(to).await?
        };
        let skdm_targets: Vec<Jid> = devices
            .iter()
            .filter(|d| !memory.contains(&d.to_string()))
            .cloned()
            .collect();

        let mut participant_nodes = Vec::new();
        let mut includes_prekey = false;
        if !skdm_targets.is_empty() {
            self.sessions.assert_sessions(&skdm_targets, v6).await?;

            let skdm_message = wa::Message {
                sender_key_distribution_message: Some(wa::SenderKeyDistributionMessage {
                    group_id: Some(to.to_string()),
                    axolotl_sender_key_distribution_message: Some(group_ct.skdm.clone()),
                }),
                ..Default::default()
            };
            let skdm_plaintext =
                Arc::new(MessageUtils::pad_message_v2(skdm_message.encode_to_vec()));
            let jobs: Vec<(Jid, Arc<Vec<u8>>)> = skdm_targets
                .iter()
                .map(|jid| (jid.clone(), skdm_plaintext.clone()))
                .collect();
            let (nodes, prekey) = self
                .encryptor
                .encrypt_for_devices(jobs, &crate::binary::Attrs::new())
                .await?;
            participant_nodes = nodes;
            includes_prekey = prekey;
        }

        if v6 {
            // Legacy behavior: memory is recorded up front for the whole
            // distribution list, deferring correctness to retry receipts.
            self.groups.mark_sent(to, &devices).await?;
        }

        let enc_extra = stanza::enc_extra_attrs(message, &opts.edit, None);
        let group_enc = stanza::group_enc_node(group_ct.skmsg, &enc_extra);

        let distributed = !skdm_targets.is_empty();
        let mut out = MessageStanza::new(to, message_id, message, &opts.edit);
        out.addressing_mode = Some(addressing_mode);
        out.expiration = expiration;
        if distributed {
            out.phash = Some(MessageUtils::participant_list_hash(&devices));
        }
        out.additional_attributes = &opts.additional_attributes;
        out.participants = participant_nodes;
        out.group_enc = Some(group_enc);
        if includes_prekey {
            out.device_identity = self.me.account.as_ref().map(stanza::device_identity_node);
        }
        out.biz = stanza::biz_node(message);
        out.additional_nodes = opts.additional_nodes.clone();

        let mark_after_send = if v6 { Vec::new() } else { skdm_targets };
        Ok((out.build(), mark_after_send))
    }

    async fn prepare_dm_stanza(
        &self,
        to: &Jid,
        message: &wa::Message,
        opts: &RelayOptions,
        message_id: &str,
    ) -> Result<Node> {
        let peer = to.to_non_ad();
        let own_base = self.me.pn.to_non_ad();

        let devices = self
            .resolver
            .resolve_devices(&[peer, own_base], true, false)
            .await?;
        let devices: Vec<Jid> = devices
            .into_iter()
            .filter(|d| *d != self.me.pn)
            .collect();

        let is_own_device = |jid: &Jid| {
            jid.user == self.me.pn.user
                || self
                    .me
                    .lid
                    .as_ref()
                    .is_some_and(|lid| lid.user == jid.user)
        };
        let (me_recipients, other_recipients): (Vec<Jid>, Vec<Jid>) =
            devices.iter().cloned().partition(|d| is_own_device(d));

        self.sessions.assert_sessions(&devices, false).await?;

        let (patched, overrides) = self.apply_patch(message, &devices);

        // Our other devices receive the original wrapped as a
        // device-sent message so they can render the outgoing side.
        let dsm = wa::Message {
            device_sent_message: Some(Box::new(wa::DeviceSentMessage {
                destination_jid: Some(to.to_string()),
                message: Some(Box::new(patched.clone())),
                phash: Some(String::new()),
            })),
            ..Default::default()
        };

        let peer_plaintext = Arc::new(MessageUtils::pad_message_v2(patched.encode_to_vec()));
        let dsm_plaintext = Arc::new(MessageUtils::pad_message_v2(dsm.encode_to_vec()));

        let mut jobs: Vec<(Jid, Arc<Vec<u8>>)> = Vec::new();
        for device in &other_recipients {
            let plaintext = match overrides.get(&device.to_string()) {
                Some(patched_for_device) => Arc::new(MessageUtils::pad_message_v2(
                    patched_for_device.encode_to_vec(),
                )),
                None => peer_plaintext.clone(),
            };
            jobs.push((device.clone(), plaintext));
        }
        for device in &me_recipients {
            jobs.push((device.clone(), dsm_plaintext.clone()));
        }

        let enc_extra = stanza::enc_extra_attrs(message, &opts.edit, None);
        let (participant_nodes, includes_prekey) =
            self.encryptor.encrypt_for_devices(jobs, &enc_extra).await?;

        let mut out = MessageStanza::new(to, message_id, message, &opts.edit);
        out.phash = Some(MessageUtils::participant_list_hash(&devices));
        out.additional_attributes = &opts.additional_attributes;
        out.participants = participant_nodes;
        if includes_prekey {
            out.device_identity = self.me.account.as_ref().map(stanza::device_identity_node);
        }
        out.biz = stanza::biz_node(message);
        out.additional_nodes = opts.additional_nodes.clone();
        Ok(out.build())
    }

    async fn prepare_retry_stanza(
        &self,
        to: &Jid,
        message: &wa::Message,
        participant: &RetryParticipant,
        opts: &RelayOptions,
        message_id: &str,
    ) -> Result<Node> {
        if participant.count > u32::from(self.config.max_msg_retry_count) {
            log::warn!(
                target: "relay",
                "retry count {} for {message_id} exceeds the configured bound",
                participant.count
            );
        }

        self.sessions
            .assert_sessions(std::slice::from_ref(&participant.jid), false)
            .await?;

        let plaintext = MessageUtils::pad_message_v2(message.encode_to_vec());
        let payload = self
            .encryptor
            .encrypt(&participant.jid, &plaintext)
            .await
            .map_err(|e| RelayError::Encrypt {
                jid: participant.jid.clone(),
                source: e,
            })?;

        let enc_extra = stanza::enc_extra_attrs(message, &opts.edit, Some(participant.count));
        let enc = stanza::inline_enc_node(payload.enc_type.as_str(), payload.ciphertext, &enc_extra);

        let own_base = self.me.pn.to_non_ad();
        let participant_is_self = participant.jid.user == own_base.user;

        let mut out = if to.is_group() {
            let mut out = MessageStanza::new(to, message_id, message, &opts.edit);
            out.participant = Some(&participant.jid);
            out
        } else if participant_is_self {
            let mut out = MessageStanza::new(&own_base, message_id, message, &opts.edit);
            out.recipient = Some(to);
            out
        } else {
            MessageStanza::new(&participant.jid, message_id, message, &opts.edit)
        };
        out.device_fanout = Some(false);
        out.additional_attributes = &opts.additional_attributes;
        out.inline_enc = Some(enc);
        // Retry-resends always carry the signed device identity: the
        // receiver may be rebuilding the session from scratch.
        out.device_identity = self.me.account.as_ref().map(stanza::device_identity_node);
        out.additional_nodes = opts.additional_nodes.clone();
        Ok(out.build())
    }

    async fn prepare_peer_stanza(
        &self,
        to: &Jid,
        message: &wa::Message,
        opts: &RelayOptions,
        message_id: &str,
    ) -> Result<Node> {
        let wire = if to.device > 0 {
            to.clone()
        } else {
            to.to_non_ad().with_device(0)
        };

        self.sessions
            .assert_sessions(std::slice::from_ref(&wire), false)
            .await?;

        let plaintext = MessageUtils::pad_message_v2(message.encode_to_vec());
        let payload = self
            .encryptor
            .encrypt(&wire, &plaintext)
            .await
            .map_err(|e| RelayError::Encrypt {
                jid: wire.clone(),
                source: e,
            })?;

        let enc_extra = stanza::enc_extra_attrs(message, &opts.edit, None);
        let includes_prekey = payload.enc_type == EncType::Pkmsg;
        let enc = stanza::inline_enc_node(payload.enc_type.as_str(), payload.ciphertext, &enc_extra);

        let mut out = MessageStanza::new(to, message_id, message, &opts.edit);
        out.additional_attributes = &opts.additional_attributes;
        out.inline_enc = Some(enc);
        if includes_prekey {
            out.device_identity = self.me.account.as_ref().map(stanza::device_identity_node);
        }
        out.additional_nodes = opts.additional_nodes.clone();
        Ok(out.build())
    }

    fn apply_patch(
        &self,
        message: &wa::Message,
        devices: &[Jid],
    ) -> (wa::Message, HashMap<String, wa::Message>) {
        let Some(patch) = &self.config.patch_message_before_sending else {
            return (message.clone(), HashMap::new());
        };
        match patch(message, devices) {
            PatchOutcome::Uniform(patched) => (patched, HashMap::new()),
            PatchOutcome::PerRecipient(list) => {
                let overrides = list
                    .into_iter()
                    .map(|(jid, patched)| (jid.to_string(), patched))
                    .collect();
                (message.clone(), overrides)
            }
        }
    }
}
