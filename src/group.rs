use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use moka::future::Cache;

use crate::binary::{Jid, NodeContent, NodeBuilder};
use crate::config::GroupMetadataCache;
use crate::error::{RelayError, Result};
use crate::identity::IdentityMap;
use crate::store::{KeyStore, NS_SENDER_KEY_MEMORY};
use crate::transport::{InfoQuery, RequestUtils, Transport};
use crate::types::group::{extract_group_metadata, GroupMetadata};

pub const GROUP_IQ_NAMESPACE: &str = "w:g2";

const METADATA_TTL: Duration = Duration::from_secs(5 * 60);
const METADATA_CAPACITY: u64 = 2_000;

/// Per-group state: cached metadata and durable sender-key-memory.
///
/// This is the only writer of the `sender-key-memory` namespace in the core.
pub struct GroupState {
    transport: Arc<dyn Transport>,
    requests: Arc<RequestUtils>,
    store: Arc<dyn KeyStore>,
    identity: Arc<IdentityMap>,
    metadata: Cache<String, GroupMetadata>,
    user_cache: Option<Arc<dyn GroupMetadataCache>>,
}

impl GroupState {
    pub fn new(
        transport: Arc<dyn Transport>,
        requests: Arc<RequestUtils>,
        store: Arc<dyn KeyStore>,
        identity: Arc<IdentityMap>,
        user_cache: Option<Arc<dyn GroupMetadataCache>>,
    ) -> Self {
        Self {
            transport,
            requests,
            store,
            identity,
            metadata: Cache::builder()
                .max_capacity(METADATA_CAPACITY)
                .time_to_live(METADATA_TTL)
                .build(),
            user_cache,
        }
    }

    /// Group metadata, from the user-supplied cache, the internal cache, or
    /// a fresh fetch (in that order). Entries older than the freshness
    /// window have already been evicted; a fetch failure is fatal, stale
    /// state is never served past the window.
    pub async fn get_or_fetch(&self, group_jid: &Jid) -> Result<GroupMetadata> {
        if let Some(cache) = &self.user_cache {
            if let Some(meta) = cache.get(group_jid).await {
                return Ok(meta);
            }
        }
        if let Some(meta) = self.metadata.get(&group_jid.to_string()).await {
            return Ok(meta);
        }
        self.fetch(group_jid).await
    }

    /// Drop cached metadata, forcing the next read to refetch. Called on
    /// membership-change notifications.
    pub async fn invalidate(&self, group_jid: &Jid) {
        self.metadata.invalidate(&group_jid.to_string()).await;
    }

    async fn fetch(&self, group_jid: &Jid) -> Result<GroupMetadata> {
        let query = NodeBuilder::new("query").attr("request", "interactive").build();
        let iq = self.requests.build_iq_node(
            &InfoQuery::get(
                GROUP_IQ_NAMESPACE,
                group_jid.clone(),
                Some(NodeContent::Nodes(vec![query])),
            ),
            None,
        );
        let response = self
            .transport
            .send_iq(iq)
            .await
            .map_err(|e| RelayError::MetadataFetch {
                group: group_jid.clone(),
                source: e.into(),
            })?;

        let group_node = response
            .get_optional_child("group")
            .ok_or_else(|| RelayError::MetadataFetch {
                group: group_jid.clone(),
                source: anyhow!("<group> missing from metadata response"),
            })?;
        let meta = extract_group_metadata(group_node).map_err(|e| RelayError::MetadataFetch {
            group: group_jid.clone(),
            source: e,
        })?;

        // Metadata is one of the two sources identity mappings are learned
        // from; store them before anyone resolves devices for this group.
        let pairs: Vec<(Jid, Jid)> = meta
            .participants
            .iter()
            .filter_map(|p| p.lid.as_ref().map(|lid| (p.jid.clone(), lid.clone())))
            .collect();
        if !pairs.is_empty() {
            self.identity.store_mappings(&pairs).await?;
        }

        self.metadata
            .insert(group_jid.to_string(), meta.clone())
            .await;
        Ok(meta)
    }

    /// The set of wire JIDs that already hold the current sender key.
    pub async fn sender_key_memory(&self, group_jid: &Jid) -> Result<HashSet<String>> {
        let key = group_jid.to_string();
        let found = self
            .store
            .get(NS_SENDER_KEY_MEMORY, std::slice::from_ref(&key))
            .await?;
        let Some(raw) = found.get(&key) else {
            return Ok(HashSet::new());
        };
        let jids: Vec<String> = serde_json::from_slice(raw).unwrap_or_else(|e| {
            log::warn!(target: "group", "corrupt sender-key-memory for {key}: {e}");
            Vec::new()
        });
        Ok(jids.into_iter().collect())
    }

    /// Record that these wire JIDs received the current sender key.
    pub async fn mark_sent(&self, group_jid: &Jid, wire_jids: &[Jid]) -> Result<()> {
        if wire_jids.is_empty() {
            return Ok(());
        }
        let mut memory = self.sender_key_memory(group_jid).await?;
        for jid in wire_jids {
            memory.insert(jid.to_string());
        }
        self.write_memory(group_jid, &memory).await
    }

    /// Forget all recipients of the previous sender key. Called when the key
    /// is rotated (e.g. on participant removal).
    pub async fn clear_sender_key_memory(&self, group_jid: &Jid) -> Result<()> {
        self.write_memory(group_jid, &HashSet::new()).await
    }

    async fn write_memory(&self, group_jid: &Jid, memory: &HashSet<String>) -> Result<()> {
        let mut ordered: Vec<&String> = memory.iter().collect();
        ordered.sort();
        let serialized = serde_json::to_vec(&ordered)
            .map_err(|e| RelayError::MalformedResponse(e.into()))?;
        self.store
            .set(
                NS_SENDER_KEY_MEMORY,
                [(group_jid.to_string(), serialized)].into_iter().collect(),
            )
            .await?;
        Ok(())
    }
}
