use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use moka::future::Cache;

use crate::binary::jid::DEFAULT_USER_SERVER;
use crate::binary::{Jid, Node, NodeBuilder, NodeContent};
use crate::error::{RelayError, Result};
use crate::identity::IdentityMap;
use crate::store::{PreKeyBundle, SignalRepository};
use crate::transport::{InfoQuery, RequestUtils, Transport};

const PEER_SESSIONS_TTL: Duration = Duration::from_secs(5 * 60);
const PEER_SESSIONS_CAPACITY: u64 = 50_000;

/// Guarantees a live Signal session exists for every wire JID before
/// encryption, fetching and installing pre-key bundles on demand.
///
/// Runs under the relay's keystore transaction and therefore never opens one
/// itself. Concurrent callers for the same peer are not serialized here;
/// session installation is idempotent and the encryption step owns the
/// per-peer mutex.
pub struct SessionGuard {
    transport: Arc<dyn Transport>,
    requests: Arc<RequestUtils>,
    identity: Arc<IdentityMap>,
    signal: Arc<dyn SignalRepository>,
    /// Presence cache keyed by Signal address.
    known_sessions: Cache<String, ()>,
    assert_chunk: usize,
    assert_delay: Duration,
}

impl SessionGuard {
    pub fn new(
        transport: Arc<dyn Transport>,
        requests: Arc<RequestUtils>,
        identity: Arc<IdentityMap>,
        signal: Arc<dyn SignalRepository>,
        assert_chunk: usize,
        assert_delay: Duration,
    ) -> Self {
        Self {
            transport,
            requests,
            identity,
            signal,
            known_sessions: Cache::builder()
                .max_capacity(PEER_SESSIONS_CAPACITY)
                .time_to_live(PEER_SESSIONS_TTL)
                .build(),
            assert_chunk: assert_chunk.max(1),
            assert_delay,
        }
    }

    /// Ensure sessions exist for every JID, returning whether any were
    /// freshly installed.
    ///
    /// With `lenient` set (V6-compat group sends), assertion failures are
    /// downgraded to warnings and the caller proceeds, relying on retry
    /// receipts for the stragglers.
    pub async fn assert_sessions(&self, jids: &[Jid], lenient: bool) -> Result<bool> {
        let mut deduped: Vec<Jid> = Vec::new();
        {
            let mut seen = std::collections::HashSet::new();
            for jid in jids {
                if seen.insert(jid.to_string()) {
                    deduped.push(jid.clone());
                }
            }
        }

        let mut missing: Vec<Jid> = Vec::new();
        for jid in &deduped {
            let address = jid.to_protocol_address().to_string();
            if self.known_sessions.get(&address).await.is_some() {
                continue;
            }
            if self.signal.validate_session(&jid.to_protocol_address()).await? {
                self.known_sessions.insert(address, ()).await;
                continue;
            }
            missing.push(jid.clone());
        }

        if missing.is_empty() {
            return Ok(false);
        }

        // The wire prefers LID once a mapping is known: fetch pre-keys for the
        // LID counterpart of PN entries, preserving the device component.
        let pn_entries: Vec<Jid> = missing.iter().filter(|j| j.is_pn()).cloned().collect();
        let mappings = self.identity.lids_for_pns(&pn_entries).await?;
        let lid_by_user: HashMap<String, Jid> = mappings
            .into_iter()
            .filter_map(|(pn, lid)| lid.map(|l| (pn.user, l)))
            .collect();
        // (requested, fetched-as) pairs; both addresses are cached on success
        // so a later assertion under either form is a hit.
        let pairs: Vec<(Jid, Jid)> = missing
            .iter()
            .map(|jid| {
                let fetch = match lid_by_user.get(&jid.user) {
                    Some(lid) => lid.with_device(jid.device),
                    None => jid.clone(),
                };
                (jid.clone(), fetch)
            })
            .collect();

        let total_chunks = pairs.len().div_ceil(self.assert_chunk);
        let mut chunk_errors: Vec<anyhow::Error> = Vec::new();
        let mut installed_any = false;

        for (index, chunk) in pairs.chunks(self.assert_chunk).enumerate() {
            if index > 0 && !self.assert_delay.is_zero() {
                tokio::time::sleep(self.assert_delay).await;
            }
            let fetch_jids: Vec<Jid> = chunk.iter().map(|(_, fetch)| fetch.clone()).collect();
            match self.fetch_and_install(&fetch_jids).await {
                Ok(installed) => {
                    installed_any |= installed > 0;
                    for (requested, fetched) in chunk {
                        self.known_sessions
                            .insert(requested.to_protocol_address().to_string(), ())
                            .await;
                        self.known_sessions
                            .insert(fetched.to_protocol_address().to_string(), ())
                            .await;
                    }
                }
                Err(e) => {
                    log::warn!(
                        target: "session",
                        "pre-key chunk {index} failed for {} devices: {e:?}",
                        chunk.len()
                    );
                    chunk_errors.push(e);
                }
            }
        }

        if !chunk_errors.is_empty() {
            if lenient {
                log::warn!(
                    target: "session",
                    "proceeding despite {} failed assertion chunk(s); retry receipts will recover",
                    chunk_errors.len()
                );
            } else {
                let failed = chunk_errors.len();
                let source = chunk_errors.remove(0);
                return Err(RelayError::SessionAssert {
                    context: format!("{failed} of {total_chunks} chunk(s) failed"),
                    source,
                });
            }
        }

        Ok(installed_any)
    }

    async fn fetch_and_install(&self, jids: &[Jid]) -> anyhow::Result<usize> {
        let key_node = build_fetch_prekeys_request(jids);
        let iq = self.requests.build_iq_node(
            &InfoQuery::get(
                "encrypt",
                Jid::new("", DEFAULT_USER_SERVER),
                Some(NodeContent::Nodes(vec![key_node])),
            ),
            None,
        );
        let response = self.transport.send_iq(iq).await?;
        let bundles = parse_prekeys_response(&response)?;

        let mut installed = 0usize;
        for jid in jids {
            let Some(bundle) = bundles.get(jid) else {
                return Err(anyhow!("missing pre-key bundle for {jid}"));
            };
            self.signal
                .install_prekey_bundle(&jid.to_protocol_address(), bundle)
                .await?;
            installed += 1;
        }
        Ok(installed)
    }
}

pub fn build_fetch_prekeys_request(jids: &[Jid]) -> Node {
    let user_nodes = jids
        .iter()
        .map(|jid| NodeBuilder::new("user").attr("jid", jid.to_string()).build());
    NodeBuilder::new("key").children(user_nodes).build()
}

pub fn parse_prekeys_response(resp_node: &Node) -> anyhow::Result<HashMap<Jid, PreKeyBundle>> {
    let list_node = resp_node
        .get_optional_child("list")
        .ok_or_else(|| anyhow!("<list> not found in pre-key response"))?;

    let mut bundles = HashMap::new();
    for user_node in list_node.get_children_by_tag("user") {
        let jid = user_node.attrs().jid("jid");
        match node_to_prekey_bundle(&jid, user_node) {
            Ok(bundle) => {
                bundles.insert(jid, bundle);
            }
            Err(e) => {
                log::warn!(target: "session", "discarding bundle for {jid}: {e}");
            }
        }
    }
    Ok(bundles)
}

fn node_to_prekey_bundle(jid: &Jid, node: &Node) -> anyhow::Result<PreKeyBundle> {
    if let Some(error_node) = node.get_optional_child("error") {
        return Err(anyhow!("server error in bundle: {error_node}"));
    }

    let reg_id_bytes = child_bytes(node, "registration")?;
    if reg_id_bytes.len() != 4 {
        return Err(anyhow!("invalid registration id length"));
    }
    let registration_id = u32::from_be_bytes(reg_id_bytes.try_into().unwrap());

    let keys_node = node.get_optional_child("keys").unwrap_or(node);

    let identity_key: [u8; 32] = child_bytes(keys_node, "identity")?
        .try_into()
        .map_err(|v: Vec<u8>| anyhow!("invalid identity key length: {}", v.len()))?;

    let pre_key = match keys_node.get_optional_child("key") {
        Some(key_node) => node_to_one_time_key(key_node)?,
        None => None,
    };

    let skey_node = keys_node
        .get_optional_child("skey")
        .ok_or_else(|| anyhow!("missing signed pre-key"))?;
    let (signed_pre_key_id, signed_pre_key) = node_to_one_time_key(skey_node)?
        .ok_or_else(|| anyhow!("signed pre-key missing id or value"))?;
    let signature: [u8; 64] = child_bytes(skey_node, "signature")?
        .try_into()
        .map_err(|v: Vec<u8>| anyhow!("invalid signature length: {}", v.len()))?;

    Ok(PreKeyBundle {
        registration_id,
        device_id: u32::from(jid.device),
        identity_key,
        pre_key,
        signed_pre_key_id,
        signed_pre_key,
        signed_pre_key_signature: signature,
    })
}

/// Parse an `<id>`/`<value>` pair. Ids arrive as 3-byte big-endian integers
/// or hex text; a malformed id yields `None` so the bundle can proceed
/// without the one-time key.
fn node_to_one_time_key(node: &Node) -> anyhow::Result<Option<(u32, [u8; 32])>> {
    let id = match node.get_optional_child("id").and_then(Node::bytes) {
        Some(b) if b.len() == 3 => Some(u32::from_be_bytes([0, b[0], b[1], b[2]])),
        Some(b) => std::str::from_utf8(b)
            .ok()
            .and_then(|s| u32::from_str_radix(s.trim(), 16).ok()),
        None => None,
    };
    let Some(id) = id else {
        return Ok(None);
    };

    let value = node
        .get_optional_child("value")
        .and_then(Node::bytes)
        .ok_or_else(|| anyhow!("missing key value"))?;
    let value: [u8; 32] = value
        .to_vec()
        .try_into()
        .map_err(|v: Vec<u8>| anyhow!("invalid key value length: {}", v.len()))?;
    Ok(Some((id, value)))
}

fn child_bytes(node: &Node, tag: &str) -> anyhow::Result<Vec<u8>> {
    node.get_optional_child(tag)
        .and_then(Node::bytes)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| anyhow!("expected bytes in <{tag}>"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::memory::{MemorySignalRepository, MemoryStore};
    use crate::transport::mock::MockTransport;

    /// Build a pre-key IQ response for the given wire JIDs.
    pub(crate) fn build_prekey_response(jids: &[Jid]) -> Node {
        let user_nodes: Vec<Node> = jids
            .iter()
            .map(|jid| {
                NodeBuilder::new("user")
                    .attr("jid", jid.to_string())
                    .children([
                        NodeBuilder::new("registration")
                            .bytes(7u32.to_be_bytes().to_vec())
                            .build(),
                        NodeBuilder::new("identity").bytes(vec![1u8; 32]).build(),
                        NodeBuilder::new("key")
                            .children([
                                NodeBuilder::new("id").bytes(vec![0, 0, 1]).build(),
                                NodeBuilder::new("value").bytes(vec![2u8; 32]).build(),
                            ])
                            .build(),
                        NodeBuilder::new("skey")
                            .children([
                                NodeBuilder::new("id").bytes(vec![0, 0, 2]).build(),
                                NodeBuilder::new("value").bytes(vec![3u8; 32]).build(),
                                NodeBuilder::new("signature").bytes(vec![4u8; 64]).build(),
                            ])
                            .build(),
                    ])
                    .build()
            })
            .collect();
        let list = NodeBuilder::new("list").children(user_nodes).build();
        NodeBuilder::new("iq").children([list]).build()
    }

    struct Fixture {
        guard: SessionGuard,
        transport: Arc<MockTransport>,
        signal: Arc<MemorySignalRepository>,
    }

    fn fixture(chunk: usize) -> Fixture {
        let transport = Arc::new(MockTransport::new());
        let store = Arc::new(MemoryStore::new());
        let identity = Arc::new(IdentityMap::new(store));
        let signal = Arc::new(MemorySignalRepository::new());
        let guard = SessionGuard::new(
            transport.clone(),
            Arc::new(RequestUtils::new()),
            identity,
            signal.clone(),
            chunk,
            Duration::ZERO,
        );
        Fixture {
            guard,
            transport,
            signal,
        }
    }

    #[tokio::test]
    async fn existing_sessions_need_no_fetch() {
        let f = fixture(10);
        let jid: Jid = "559980000001:0@s.whatsapp.net".parse().unwrap();
        f.signal.seed_session(&jid.to_protocol_address()).await;

        let fetched = f
            .guard
            .assert_sessions(std::slice::from_ref(&jid), false)
            .await
            .unwrap();
        assert!(!fetched);
        assert!(f.transport.sent_nodes().await.is_empty());
    }

    #[tokio::test]
    async fn missing_session_triggers_prekey_fetch() {
        let f = fixture(10);
        let jid: Jid = "559980000001:0@s.whatsapp.net".parse().unwrap();
        let expected = jid.clone();
        f.transport
            .expect_iq(move |iq| {
                assert_eq!(iq.attrs.get("xmlns").unwrap(), "encrypt");
                assert_eq!(iq.attrs.get("type").unwrap(), "get");
                Ok(build_prekey_response(std::slice::from_ref(&expected)))
            })
            .await;

        let fetched = f
            .guard
            .assert_sessions(std::slice::from_ref(&jid), false)
            .await
            .unwrap();
        assert!(fetched);
        assert!(f
            .signal
            .validate_session(&jid.to_protocol_address())
            .await
            .unwrap());

        // Now cached: a second assertion does not consume another IQ.
        let fetched = f
            .guard
            .assert_sessions(std::slice::from_ref(&jid), false)
            .await
            .unwrap();
        assert!(!fetched);
    }

    #[tokio::test]
    async fn large_batches_are_chunked() {
        let f = fixture(2);
        let jids: Vec<Jid> = (0..5)
            .map(|i| format!("55998000000{i}:0@s.whatsapp.net").parse().unwrap())
            .collect();
        for chunk in jids.chunks(2) {
            let chunk = chunk.to_vec();
            f.transport
                .expect_iq(move |_| Ok(build_prekey_response(&chunk)))
                .await;
        }

        let fetched = f.guard.assert_sessions(&jids, false).await.unwrap();
        assert!(fetched);
        // 3 chunks of at most 2.
        assert_eq!(f.transport.sent_nodes().await.len(), 3);
    }

    #[tokio::test]
    async fn strict_mode_propagates_chunk_failure() {
        let f = fixture(10);
        let jid: Jid = "559980000001:0@s.whatsapp.net".parse().unwrap();
        f.transport
            .expect_iq(|_| {
                Err(crate::transport::TransportError::Network(
                    "scripted failure".into(),
                ))
            })
            .await;

        let err = f
            .guard
            .assert_sessions(std::slice::from_ref(&jid), false)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::SessionAssert { .. }));
    }

    #[tokio::test]
    async fn lenient_mode_swallows_chunk_failure() {
        let f = fixture(10);
        let jid: Jid = "559980000001:0@s.whatsapp.net".parse().unwrap();
        f.transport
            .expect_iq(|_| {
                Err(crate::transport::TransportError::Network(
                    "scripted failure".into(),
                ))
            })
            .await;

        let fetched = f
            .guard
            .assert_sessions(std::slice::from_ref(&jid), true)
            .await
            .unwrap();
        assert!(!fetched);
    }

    #[test]
    fn bundle_parse_handles_missing_one_time_key() {
        let jid: Jid = "559980000001:0@s.whatsapp.net".parse().unwrap();
        let user = NodeBuilder::new("user")
            .attr("jid", jid.to_string())
            .children([
                NodeBuilder::new("registration")
                    .bytes(1u32.to_be_bytes().to_vec())
                    .build(),
                NodeBuilder::new("identity").bytes(vec![1u8; 32]).build(),
                NodeBuilder::new("skey")
                    .children([
                        NodeBuilder::new("id").bytes(vec![0, 0, 2]).build(),
                        NodeBuilder::new("value").bytes(vec![3u8; 32]).build(),
                        NodeBuilder::new("signature").bytes(vec![4u8; 64]).build(),
                    ])
                    .build(),
            ])
            .build();
        let resp = NodeBuilder::new("iq")
            .children([NodeBuilder::new("list").children([user]).build()])
            .build();

        let bundles = parse_prekeys_response(&resp).unwrap();
        let bundle = bundles.values().next().unwrap();
        assert!(bundle.pre_key.is_none());
        assert_eq!(bundle.signed_pre_key_id, 2);
    }
}
