use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::binary::Jid;
use crate::store::{KeyStore, StoreResult, NS_LID_MAPPING};

const MAPPING_CACHE_IDLE: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const MAPPING_CACHE_CAPACITY: u64 = 10_000;

/// Suffix distinguishing the reverse (LID→PN) persistence keys.
const REVERSE_SUFFIX: &str = "_reverse";

/// Bidirectional LID↔PN user mapping.
///
/// Lookups always resolve at user level: the returned JIDs never carry a
/// device suffix, so conversations stay a single thread no matter which
/// device produced the traffic.
pub struct IdentityMap {
    store: Arc<dyn KeyStore>,
    pn_to_lid: Cache<String, String>,
    lid_to_pn: Cache<String, String>,
}

impl IdentityMap {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        let build = || {
            Cache::builder()
                .max_capacity(MAPPING_CACHE_CAPACITY)
                .time_to_idle(MAPPING_CACHE_IDLE)
                .build()
        };
        Self {
            store,
            pn_to_lid: build(),
            lid_to_pn: build(),
        }
    }

    /// Store a batch of mappings. Each pair may arrive in either order; the
    /// LID and PN sides are deduced from their servers. Pairs where neither
    /// rule holds are skipped with a warning, never an error. Writes to the
    /// cache and the keystore happen inside one `lid-mapping`-scoped
    /// transaction and are idempotent.
    pub async fn store_mappings(&self, pairs: &[(Jid, Jid)]) -> StoreResult<()> {
        let mut writes: HashMap<String, Vec<u8>> = HashMap::new();
        let mut cache_updates: Vec<(String, String)> = Vec::new();

        for (a, b) in pairs {
            let (lid, pn) = if a.is_lid() && b.is_pn() {
                (a, b)
            } else if b.is_lid() && a.is_pn() {
                (b, a)
            } else {
                log::warn!(
                    target: "identity",
                    "skipping mapping pair with unrecognized servers: {a} / {b}"
                );
                continue;
            };

            let pn_user = pn.user.clone();
            let lid_user = lid.user.clone();

            match self.lid_user_for_pn_user(&pn_user).await? {
                Some(existing) if existing == lid_user => continue,
                Some(existing) => {
                    log::warn!(
                        target: "identity",
                        "mapping conflict for {pn_user}: {existing} superseded by {lid_user}"
                    );
                }
                None => {}
            }

            writes.insert(pn_user.clone(), lid_user.clone().into_bytes());
            writes.insert(
                format!("{lid_user}{REVERSE_SUFFIX}"),
                pn_user.clone().into_bytes(),
            );
            cache_updates.push((pn_user, lid_user));
        }

        if writes.is_empty() {
            return Ok(());
        }

        self.store.tx_begin(NS_LID_MAPPING).await?;
        match self.store.set(NS_LID_MAPPING, writes).await {
            Ok(()) => self.store.tx_commit().await?,
            Err(e) => {
                self.store.tx_abort().await?;
                return Err(e);
            }
        }

        for (pn_user, lid_user) in cache_updates {
            self.pn_to_lid.insert(pn_user.clone(), lid_user.clone()).await;
            self.lid_to_pn.insert(lid_user, pn_user).await;
        }
        Ok(())
    }

    /// The user-level LID JID for a PN identity, if one is known.
    pub async fn lid_for_pn(&self, pn: &Jid) -> StoreResult<Option<Jid>> {
        Ok(self
            .lid_user_for_pn_user(&pn.user)
            .await?
            .map(|user| Jid::lid(&user)))
    }

    /// The user-level PN JID for a LID identity, if one is known.
    pub async fn pn_for_lid(&self, lid: &Jid) -> StoreResult<Option<Jid>> {
        if let Some(user) = self.lid_to_pn.get(&lid.user).await {
            return Ok(Some(Jid::pn(&user)));
        }
        let key = format!("{}{REVERSE_SUFFIX}", lid.user);
        let found = self.store.get(NS_LID_MAPPING, &[key.clone()]).await?;
        let Some(pn_user) = found.get(&key).and_then(|v| decode_user(v)) else {
            return Ok(None);
        };
        self.lid_to_pn.insert(lid.user.clone(), pn_user.clone()).await;
        Ok(Some(Jid::pn(&pn_user)))
    }

    /// Batched PN→LID lookup used before session assertion. Preserves input
    /// order; unknown identities map to `None`.
    pub async fn lids_for_pns(&self, pns: &[Jid]) -> StoreResult<Vec<(Jid, Option<Jid>)>> {
        let mut resolved: HashMap<String, String> = HashMap::new();
        let mut misses: Vec<String> = Vec::new();

        for pn in pns {
            if resolved.contains_key(&pn.user) || misses.contains(&pn.user) {
                continue;
            }
            match self.pn_to_lid.get(&pn.user).await {
                Some(lid_user) => {
                    resolved.insert(pn.user.clone(), lid_user);
                }
                None => misses.push(pn.user.clone()),
            }
        }

        if !misses.is_empty() {
            let found = self.store.get(NS_LID_MAPPING, &misses).await?;
            for (pn_user, value) in found {
                if let Some(lid_user) = decode_user(&value) {
                    self.pn_to_lid
                        .insert(pn_user.clone(), lid_user.clone())
                        .await;
                    resolved.insert(pn_user, lid_user);
                }
            }
        }

        Ok(pns
            .iter()
            .map(|pn| {
                let lid = resolved.get(&pn.user).map(|user| Jid::lid(user));
                (pn.clone(), lid)
            })
            .collect())
    }

    async fn lid_user_for_pn_user(&self, pn_user: &str) -> StoreResult<Option<String>> {
        if let Some(lid_user) = self.pn_to_lid.get(pn_user).await {
            return Ok(Some(lid_user));
        }
        let found = self
            .store
            .get(NS_LID_MAPPING, &[pn_user.to_string()])
            .await?;
        let Some(lid_user) = found.get(pn_user).and_then(|v| decode_user(v)) else {
            return Ok(None);
        };
        self.pn_to_lid
            .insert(pn_user.to_string(), lid_user.clone())
            .await;
        Ok(Some(lid_user))
    }
}

fn decode_user(bytes: &[u8]) -> Option<String> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Some(s.to_string()),
        Err(_) => {
            log::warn!(target: "identity", "discarding non-utf8 mapping value");
            None
        }
    }
}
