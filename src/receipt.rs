//! Receipt stanza composition.
//!
//! Receipts acknowledge inbound messages; the relay composes them but the
//! decision of when to send belongs to the caller's receipts subsystem.

use crate::binary::{Jid, MessageId, Node, NodeBuilder};
use crate::proto::wa;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptType {
    /// Plain delivery receipt; serialized as an absent `type` attribute.
    Delivery,
    Read,
    /// Read acknowledgment kept private: used when the user's privacy
    /// settings disable read receipts.
    ReadSelf,
    Played,
    PlayedSelf,
    Sender,
    Inactive,
}

impl ReceiptType {
    pub fn as_str(&self) -> Option<&'static str> {
        match self {
            Self::Delivery => None,
            Self::Read => Some("read"),
            Self::ReadSelf => Some("read-self"),
            Self::Played => Some("played"),
            Self::PlayedSelf => Some("played-self"),
            Self::Sender => Some("sender"),
            Self::Inactive => Some("inactive"),
        }
    }

    /// The read receipt class to emit given the user's privacy setting.
    pub fn effective_read(read_receipts_enabled: bool) -> Self {
        if read_receipts_enabled {
            Self::Read
        } else {
            Self::ReadSelf
        }
    }
}

/// One receipt stanza's worth of acknowledgments: all ids share a chat and
/// (for groups) a participant.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptTarget {
    pub chat: Jid,
    pub participant: Option<Jid>,
    pub ids: Vec<MessageId>,
}

/// Group message keys into receipt targets. Keys sent by ourselves are
/// skipped; the remainder aggregate per `(chat, participant)` preserving
/// first-seen order.
pub fn aggregate_message_keys(keys: &[wa::MessageKey]) -> Vec<ReceiptTarget> {
    let mut targets: Vec<ReceiptTarget> = Vec::new();

    for key in keys {
        if key.from_me() {
            continue;
        }
        let Some(chat) = key.remote_jid.as_deref().and_then(|j| j.parse::<Jid>().ok()) else {
            log::warn!(target: "receipt", "skipping key with unparseable chat jid");
            continue;
        };
        let participant = key
            .participant
            .as_deref()
            .and_then(|j| j.parse::<Jid>().ok());
        let Some(id) = key.id.clone() else {
            continue;
        };

        match targets
            .iter_mut()
            .find(|t| t.chat == chat && t.participant == participant)
        {
            Some(target) => target.ids.push(id),
            None => targets.push(ReceiptTarget {
                chat,
                participant,
                ids: vec![id],
            }),
        }
    }

    targets
}

/// Compose one `<receipt>` stanza. The first id rides on the stanza itself;
/// any remainder goes into a `<list>` of `<item>` children.
pub fn build_receipt(target: &ReceiptTarget, receipt_type: ReceiptType) -> Option<Node> {
    let (first, rest) = target.ids.split_first()?;

    let mut builder = NodeBuilder::new("receipt")
        .attr("id", first.clone())
        .attr("to", target.chat.to_string());
    if let Some(type_str) = receipt_type.as_str() {
        builder = builder.attr("type", type_str);
    }
    if let Some(participant) = &target.participant {
        builder = builder.attr("participant", participant.to_string());
    }

    if !rest.is_empty() {
        let items = rest
            .iter()
            .map(|id| NodeBuilder::new("item").attr("id", id.clone()).build());
        builder = builder.children([NodeBuilder::new("list").children(items).build()]);
    }

    Some(builder.build())
}
