//! USync: the batched user-directory query protocol.
//!
//! Device resolution issues one query per batch with the `devices` and `lid`
//! sub-protocols; responses carry per-user device lists and opt-in LID
//! mappings.

use anyhow::{anyhow, Result};

use crate::binary::jid::{DEFAULT_USER_SERVER, HIDDEN_USER_SERVER};
use crate::binary::{Jid, Node, NodeBuilder};

/// A LID mapping learned from a usync response.
#[derive(Debug, Clone)]
pub struct UsyncLidMapping {
    pub phone_number: String,
    pub lid: String,
}

/// Device list for one user, with the optional participant hash the server
/// attaches for cache validation.
#[derive(Debug, Clone)]
pub struct UserDeviceList {
    pub user: Jid,
    pub devices: Vec<Jid>,
    pub phash: Option<String>,
}

pub fn build_get_user_devices_query(jids: &[Jid], sid: &str) -> Node {
    let user_nodes = jids
        .iter()
        .map(|jid| {
            NodeBuilder::new("user")
                .attr("jid", jid.to_non_ad().to_string())
                .build()
        })
        .collect::<Vec<_>>();

    let query_node = NodeBuilder::new("query")
        .children([
            NodeBuilder::new("devices").attr("version", "2").build(),
            NodeBuilder::new("lid").build(),
        ])
        .build();

    let list_node = NodeBuilder::new("list").children(user_nodes).build();

    NodeBuilder::new("usync")
        .attrs([
            ("context", "message"),
            ("index", "0"),
            ("last", "true"),
            ("mode", "query"),
            ("sid", sid),
        ])
        .children([query_node, list_node])
        .build()
}

/// Parse a usync response into per-user device lists.
///
/// Device wire JIDs default to `(user, server, id)` from the enclosing user
/// node; a `jid` attribute on the `<device>` node (the server's original JID
/// for migrated identities) overrides user and server while keeping the
/// advertised device id.
pub fn parse_get_user_devices_response(resp_node: &Node) -> Result<Vec<UserDeviceList>> {
    let list_node = resp_node
        .get_optional_child_by_tag(&["usync", "list"])
        .ok_or_else(|| anyhow!("<usync> or <list> not found in usync response"))?;

    let mut result = Vec::new();

    for user_node in list_node.get_children_by_tag("user") {
        let user_jid = user_node.attrs().jid("jid");
        let device_list_node = user_node
            .get_optional_child_by_tag(&["devices", "device-list"])
            .ok_or_else(|| anyhow!("<device-list> not found for user {user_jid}"))?;

        let phash = device_list_node
            .attrs()
            .optional_string("hash")
            .map(|s| s.to_string());

        let mut devices = Vec::new();
        for device_node in device_list_node.get_children_by_tag("device") {
            let mut attrs = device_node.attrs();
            let Some(device_id_str) = attrs.optional_string("id") else {
                log::warn!(target: "usync", "device node missing 'id' attribute, skipping");
                continue;
            };
            let device_id: u16 = match device_id_str.parse() {
                Ok(id) => id,
                Err(_) => {
                    log::warn!(
                        target: "usync",
                        "invalid device id '{device_id_str}' for user {user_jid}, skipping"
                    );
                    continue;
                }
            };

            let mut device_jid = match attrs.optional_jid("jid") {
                Some(original) => original.to_non_ad(),
                None => user_jid.to_non_ad(),
            };
            device_jid.device = device_id;
            devices.push(device_jid);
        }

        result.push(UserDeviceList {
            user: user_jid.to_non_ad(),
            devices,
            phash,
        });
    }

    Ok(result)
}

/// Extract phone→LID mappings from a usync response.
pub fn parse_lid_mappings(resp_node: &Node) -> Vec<UsyncLidMapping> {
    let mut mappings = Vec::new();

    let Some(list_node) = resp_node.get_optional_child_by_tag(&["usync", "list"]) else {
        return mappings;
    };

    for user_node in list_node.get_children_by_tag("user") {
        let Some(user_jid) = user_node.attrs().optional_jid("jid") else {
            continue;
        };
        // Mappings are only learned against phone-number identities.
        if user_jid.server != DEFAULT_USER_SERVER {
            continue;
        }

        let Some(lid_node) = user_node.get_optional_child("lid") else {
            continue;
        };
        let Some(lid_val) = lid_node.attrs().optional_string("val") else {
            continue;
        };
        if lid_val.is_empty() {
            continue;
        }
        if let Ok(lid_jid) = lid_val.parse::<Jid>() {
            if lid_jid.server == HIDDEN_USER_SERVER {
                mappings.push(UsyncLidMapping {
                    phone_number: user_jid.user.clone(),
                    lid: lid_jid.user,
                });
            }
        }
    }

    mappings
}
