use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::binary::jid::DEFAULT_USER_SERVER;
use crate::binary::{Jid, Node, NodeContent};
use crate::config::UserDevicesCache;
use crate::error::{RelayError, Result};
use crate::identity::IdentityMap;
use crate::store::{KeyStore, NS_DEVICE_LIST};
use crate::transport::{InfoQuery, RequestUtils, Transport};
use crate::usync;

const USER_DEVICES_TTL: Duration = Duration::from_secs(5 * 60);
const USER_DEVICES_CAPACITY: u64 = 10_000;

/// Expands user JIDs into the set of wire JIDs the server currently
/// advertises for them, one USync round-trip per cache-missing batch.
pub struct DeviceResolver {
    transport: Arc<dyn Transport>,
    requests: Arc<RequestUtils>,
    identity: Arc<IdentityMap>,
    store: Arc<dyn KeyStore>,
    /// Keyed by user-level JID string; values are full wire-JID lists.
    user_devices: Cache<String, Vec<Jid>>,
    injected_cache: Option<Arc<dyn UserDevicesCache>>,
}

impl DeviceResolver {
    pub fn new(
        transport: Arc<dyn Transport>,
        requests: Arc<RequestUtils>,
        identity: Arc<IdentityMap>,
        store: Arc<dyn KeyStore>,
        injected_cache: Option<Arc<dyn UserDevicesCache>>,
    ) -> Self {
        Self {
            transport,
            requests,
            identity,
            store,
            user_devices: Cache::builder()
                .max_capacity(USER_DEVICES_CAPACITY)
                .time_to_live(USER_DEVICES_TTL)
                .build(),
            injected_cache,
        }
    }

    /// Resolve every active device for the given users.
    ///
    /// Inputs that already carry a device pass through verbatim; the rest are
    /// normalized to user level and expanded. `ignore_zero_devices` drops the
    /// primary device from expanded lists (explicit inputs are never
    /// filtered).
    pub async fn resolve_devices(
        &self,
        jids: &[Jid],
        use_cache: bool,
        ignore_zero_devices: bool,
    ) -> Result<Vec<Jid>> {
        let mut output: Vec<Jid> = Vec::new();
        let mut to_expand: Vec<Jid> = Vec::new();
        let mut seen_users = HashSet::new();

        for jid in jids {
            if jid.device > 0 {
                output.push(jid.clone());
                continue;
            }
            let base = jid.to_non_ad();
            if seen_users.insert((base.user.clone(), base.server.clone())) {
                to_expand.push(base);
            }
        }

        if to_expand.is_empty() {
            return Ok(dedup_wire_jids(output));
        }

        let mut resolved: HashMap<String, Vec<Jid>> = HashMap::new();
        let mut misses: Vec<Jid> = Vec::new();

        if use_cache {
            let users: Vec<String> = to_expand.iter().map(|j| j.to_string()).collect();
            let injected = match &self.injected_cache {
                Some(cache) => cache.mget(&users).await,
                None => vec![None; users.len()],
            };
            for (jid, injected_hit) in to_expand.iter().zip(injected) {
                let key = jid.to_string();
                if let Some(devices) = injected_hit {
                    resolved.insert(key, devices);
                } else if let Some(devices) = self.user_devices.get(&key).await {
                    resolved.insert(key, devices);
                } else {
                    misses.push(jid.clone());
                }
            }
        } else {
            misses = to_expand.clone();
        }

        if !misses.is_empty() {
            let fetched = self.query_devices(&misses).await?;
            resolved.extend(fetched);
        }

        for jid in &to_expand {
            if let Some(devices) = resolved.get(&jid.to_string()) {
                for device in devices {
                    if ignore_zero_devices && device.device == 0 {
                        continue;
                    }
                    output.push(device.clone());
                }
            }
        }

        Ok(dedup_wire_jids(output))
    }

    /// One USync query for all missing users. LID mappings piggy-backed on
    /// the response are stored before device extraction so later session
    /// assertion sees them.
    async fn query_devices(&self, users: &[Jid]) -> Result<HashMap<String, Vec<Jid>>> {
        let sid = self.requests.generate_request_id();
        let usync_node = usync::build_get_user_devices_query(users, &sid);

        let iq = self.requests.build_iq_node(
            &InfoQuery::get(
                "usync",
                Jid::new("", DEFAULT_USER_SERVER),
                Some(NodeContent::Nodes(vec![usync_node])),
            ),
            None,
        );
        let response: Node = self.transport.send_iq(iq).await?;

        let mappings = usync::parse_lid_mappings(&response);
        if !mappings.is_empty() {
            let pairs: Vec<(Jid, Jid)> = mappings
                .iter()
                .map(|m| (Jid::pn(&m.phone_number), Jid::lid(&m.lid)))
                .collect();
            self.identity.store_mappings(&pairs).await?;
        }

        let device_lists = usync::parse_get_user_devices_response(&response)
            .map_err(RelayError::MalformedResponse)?;

        let mut resolved = HashMap::new();
        let mut persisted: HashMap<String, Vec<u8>> = HashMap::new();
        let mut injected_entries = Vec::new();

        for list in device_lists {
            let key = list.user.to_string();
            self.user_devices
                .insert(key.clone(), list.devices.clone())
                .await;
            if self.injected_cache.is_some() {
                injected_entries.push((key.clone(), list.devices.clone()));
            }
            let serialized = serde_json::to_vec(&list.devices)
                .map_err(|e| RelayError::MalformedResponse(e.into()))?;
            persisted.insert(key.clone(), serialized);
            resolved.insert(key, list.devices);
        }

        if let Some(cache) = &self.injected_cache {
            cache.mset(injected_entries).await;
        }

        // Bulk device lists are persisted for migration by other components.
        self.store.set(NS_DEVICE_LIST, persisted).await?;

        Ok(resolved)
    }
}

fn dedup_wire_jids(jids: Vec<Jid>) -> Vec<Jid> {
    let mut seen = HashSet::new();
    jids.into_iter()
        .filter(|jid| seen.insert(jid.to_string()))
        .collect()
}
