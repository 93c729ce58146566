//! Final `<message>` stanza assembly.
//!
//! The relay prepares routing facts and encrypted envelopes; this module owns
//! the exact child layout and attribute grammar of every stanza shape.

use prost::Message as ProtoMessage;

use crate::binary::{Attrs, Jid, Node, NodeBuilder};
use crate::proto::helpers::MessageExt;
use crate::proto::wa;
use crate::types::message::{AddressingMode, EditAttribute};

/// Everything the final assembly step needs. Children are laid out as:
/// `<participants>`, inline/group `<enc>`, `device-identity`, `<biz>`,
/// caller-supplied additional nodes.
pub struct MessageStanza<'a> {
    pub to: &'a Jid,
    pub id: &'a str,
    pub message: &'a wa::Message,
    pub edit: &'a EditAttribute,
    pub addressing_mode: Option<AddressingMode>,
    pub expiration: Option<u64>,
    pub phash: Option<String>,
    /// Retry-resend routing: the participant this stanza re-targets.
    pub participant: Option<&'a Jid>,
    pub recipient: Option<&'a Jid>,
    pub device_fanout: Option<bool>,
    pub additional_attributes: &'a [(String, String)],
    pub participants: Vec<Node>,
    pub inline_enc: Option<Node>,
    pub group_enc: Option<Node>,
    pub device_identity: Option<Node>,
    pub biz: Option<Node>,
    pub additional_nodes: Vec<Node>,
}

impl<'a> MessageStanza<'a> {
    pub fn new(to: &'a Jid, id: &'a str, message: &'a wa::Message, edit: &'a EditAttribute) -> Self {
        Self {
            to,
            id,
            message,
            edit,
            addressing_mode: None,
            expiration: None,
            phash: None,
            participant: None,
            recipient: None,
            device_fanout: None,
            additional_attributes: &[],
            participants: Vec::new(),
            inline_enc: None,
            group_enc: None,
            device_identity: None,
            biz: None,
            additional_nodes: Vec::new(),
        }
    }

    pub fn build(self) -> Node {
        let mut attrs = Attrs::new();
        attrs.insert("to".to_string(), self.to.to_string());
        attrs.insert("id".to_string(), self.id.to_string());
        attrs.insert("type".to_string(), self.message.stanza_type().to_string());
        if let Some(participant) = self.participant {
            attrs.insert("participant".to_string(), participant.to_string());
        }
        if let Some(recipient) = self.recipient {
            attrs.insert("recipient".to_string(), recipient.to_string());
        }
        if let Some(mode) = self.addressing_mode {
            attrs.insert("addressing_mode".to_string(), mode.as_str().to_string());
        }
        if let Some(expiration) = self.expiration {
            attrs.insert("expiration".to_string(), expiration.to_string());
        }
        if *self.edit != EditAttribute::Empty {
            attrs.insert("edit".to_string(), self.edit.to_string_val().to_string());
        }
        if let Some(phash) = self.phash {
            attrs.insert("phash".to_string(), phash);
        }
        if let Some(fanout) = self.device_fanout {
            attrs.insert("device_fanout".to_string(), fanout.to_string());
        }
        for (key, value) in self.additional_attributes {
            attrs.insert(key.clone(), value.clone());
        }

        let mut children: Vec<Node> = Vec::new();
        if !self.participants.is_empty() {
            children.push(
                NodeBuilder::new("participants")
                    .children(self.participants)
                    .build(),
            );
        }
        if let Some(enc) = self.inline_enc {
            children.push(enc);
        }
        if let Some(enc) = self.group_enc {
            children.push(enc);
        }
        if let Some(identity) = self.device_identity {
            children.push(identity);
        }
        if let Some(biz) = self.biz {
            children.push(biz);
        }
        children.extend(self.additional_nodes);

        NodeBuilder::new("message")
            .attrs(attrs)
            .children(children)
            .build()
    }
}

/// Newsletter sends skip per-device encryption entirely: the payload rides
/// in a `<plaintext>` child.
pub fn newsletter_stanza(to: &Jid, id: &str, message: &wa::Message) -> Node {
    let mut plaintext = NodeBuilder::new("plaintext");
    if let Some(media) = message.media_type() {
        plaintext = plaintext.attr("mediatype", media.as_str());
    }
    let plaintext = plaintext.bytes(message.encode_to_vec()).build();

    NodeBuilder::new("message")
        .attrs([
            ("to", to.to_string()),
            ("id", id.to_string()),
            ("type", message.stanza_type().to_string()),
        ])
        .children([plaintext])
        .build()
}

/// Extra attributes shared by every `<enc>` node of a stanza: media type,
/// pin-in-chat decrypt suppression, retry count.
pub fn enc_extra_attrs(
    message: &wa::Message,
    edit: &EditAttribute,
    retry_count: Option<u32>,
) -> Attrs {
    let mut attrs = Attrs::new();
    if let Some(media) = message.media_type() {
        attrs.insert("mediatype".to_string(), media.as_str().to_string());
    }
    let base = message.get_base_message();
    if base.pin_in_chat_message.is_some() || edit.hides_decrypt_failure() {
        attrs.insert("decrypt-fail".to_string(), "hide".to_string());
    }
    if let Some(count) = retry_count {
        attrs.insert("count".to_string(), count.to_string());
    }
    attrs
}

/// The `<enc type="skmsg">` child carrying the group ciphertext.
pub fn group_enc_node(skmsg: Vec<u8>, extra_attrs: &Attrs) -> Node {
    let mut attrs = Attrs::new();
    attrs.insert("v".to_string(), "2".to_string());
    attrs.insert("type".to_string(), "skmsg".to_string());
    for (k, v) in extra_attrs {
        attrs.insert(k.clone(), v.clone());
    }
    NodeBuilder::new("enc").attrs(attrs).bytes(skmsg).build()
}

/// A single inline `<enc>` child (peer and retry-resend shapes).
pub fn inline_enc_node(enc_type: &str, ciphertext: Vec<u8>, extra_attrs: &Attrs) -> Node {
    let mut attrs = Attrs::new();
    attrs.insert("v".to_string(), "2".to_string());
    attrs.insert("type".to_string(), enc_type.to_string());
    for (k, v) in extra_attrs {
        attrs.insert(k.clone(), v.clone());
    }
    NodeBuilder::new("enc").attrs(attrs).bytes(ciphertext).build()
}

pub fn device_identity_node(account: &wa::AdvSignedDeviceIdentity) -> Node {
    NodeBuilder::new("device-identity")
        .bytes(account.encode_to_vec())
        .build()
}

/// Business node for interactive payloads. Lists declare a product list;
/// buttons and interactive payloads declare a native flow.
pub fn biz_node(message: &wa::Message) -> Option<Node> {
    let base = message.get_base_message();
    if base.list_message.is_some() {
        let list = NodeBuilder::new("list")
            .attr("v", "2")
            .attr("type", "product_list")
            .build();
        return Some(NodeBuilder::new("biz").children([list]).build());
    }
    if base.buttons_message.is_some() || base.interactive_message.is_some() {
        let native_flow = NodeBuilder::new("native_flow")
            .attr("v", "9")
            .attr("name", "quick_reply")
            .build();
        let interactive = NodeBuilder::new("interactive")
            .attr("type", "native_flow")
            .attr("v", "1")
            .children([native_flow])
            .build();
        return Some(NodeBuilder::new("biz").children([interactive]).build());
    }
    None
}
