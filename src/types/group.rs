use anyhow::{anyhow, Result};

use crate::binary::jid::GROUP_SERVER;
use crate::binary::{Jid, Node, NodeBuilder};

use super::message::AddressingMode;

/// A group member. `jid` is the phone-number form for frontend
/// compatibility; `lid` carries the opaque form when the server advertises
/// one.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupParticipant {
    pub jid: Jid,
    pub lid: Option<Jid>,
    pub is_admin: bool,
}

impl GroupParticipant {
    /// The JID this participant is addressed by, given the group's mode.
    pub fn addressing_jid(&self, mode: AddressingMode) -> &Jid {
        match mode {
            AddressingMode::Lid => self.lid.as_ref().unwrap_or(&self.jid),
            AddressingMode::Pn => &self.jid,
        }
    }
}

/// Cached group state used to drive fan-out. Participants have set
/// semantics keyed by user.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupMetadata {
    pub id: Jid,
    pub subject: String,
    pub addressing_mode: AddressingMode,
    pub participants: Vec<GroupParticipant>,
    pub ephemeral_duration: Option<u64>,
    pub owner_pn: Option<Jid>,
    pub owner_lid: Option<Jid>,
}

impl GroupMetadata {
    /// Participant JIDs in the group's addressing space, deduplicated by user.
    pub fn addressing_jids(&self) -> Vec<Jid> {
        let mut seen = std::collections::HashSet::new();
        self.participants
            .iter()
            .map(|p| p.addressing_jid(self.addressing_mode).to_non_ad())
            .filter(|jid| seen.insert((jid.user.clone(), jid.server.clone())))
            .collect()
    }
}

/// Build the `<group>` metadata node from parsed metadata.
pub fn build_group_metadata_node(meta: &GroupMetadata) -> Node {
    let participant_nodes = meta.participants.iter().map(|p| {
        let mut builder = NodeBuilder::new("participant").attr("jid", p.jid.to_string());
        if let Some(lid) = &p.lid {
            builder = builder.attr("lid", lid.to_string());
        }
        if p.is_admin {
            builder = builder.attr("type", "admin");
        }
        builder.build()
    });

    let mut children: Vec<Node> = participant_nodes.collect();
    if let Some(expiration) = meta.ephemeral_duration {
        children.push(
            NodeBuilder::new("ephemeral")
                .attr("expiration", expiration.to_string())
                .build(),
        );
    }

    let mut builder = NodeBuilder::new("group")
        .attr("id", meta.id.user.clone())
        .attr("subject", meta.subject.clone())
        .attr("addressing_mode", meta.addressing_mode.as_str());
    if let Some(owner) = &meta.owner_pn {
        builder = builder.attr("creator", owner.to_string());
    }
    if let Some(owner_lid) = &meta.owner_lid {
        builder = builder.attr("creator_lid", owner_lid.to_string());
    }
    builder.children(children).build()
}

/// Parse a `<group>` metadata node into [`GroupMetadata`].
///
/// Inverse of [`build_group_metadata_node`] over the documented fields.
pub fn extract_group_metadata(node: &Node) -> Result<GroupMetadata> {
    if node.tag != "group" {
        return Err(anyhow!("expected <group>, got <{}>", node.tag));
    }

    let mut attrs = node.attrs();
    let id_raw = attrs.string("id");
    let id = if id_raw.contains('@') {
        id_raw
            .parse()
            .map_err(|e| anyhow!("invalid group id: {e}"))?
    } else {
        Jid::new(&id_raw, GROUP_SERVER)
    };
    let subject = attrs.optional_string("subject").unwrap_or_default().to_string();
    let addressing_mode = attrs
        .optional_string("addressing_mode")
        .and_then(AddressingMode::parse)
        .unwrap_or(AddressingMode::Pn);
    let owner_pn = attrs.optional_jid("creator");
    let owner_lid = attrs.optional_jid("creator_lid");
    attrs.finish().map_err(|e| anyhow!("group attrs: {e}"))?;

    let mut participants = Vec::new();
    for child in node.get_children_by_tag("participant") {
        let mut attrs = child.attrs();
        let jid = attrs.jid("jid");
        let lid = attrs.optional_jid("lid");
        let is_admin = matches!(
            attrs.optional_string("type"),
            Some("admin") | Some("superadmin")
        );
        attrs
            .finish()
            .map_err(|e| anyhow!("participant attrs: {e}"))?;
        // Set semantics: the server occasionally repeats a participant across
        // membership change races.
        if !participants
            .iter()
            .any(|p: &GroupParticipant| p.jid.is_same_user_as(&jid))
        {
            participants.push(GroupParticipant { jid, lid, is_admin });
        }
    }

    let ephemeral_duration = node
        .get_optional_child("ephemeral")
        .and_then(|e| e.attrs().optional_u64("expiration"));

    Ok(GroupMetadata {
        id,
        subject,
        addressing_mode,
        participants,
        ephemeral_duration,
        owner_pn,
        owner_lid,
    })
}
