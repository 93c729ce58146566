use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::binary::Jid;
use crate::proto::wa;
use crate::types::group::GroupMetadata;

/// Outcome of the pre-send patch callback: one message for every recipient,
/// or a distinct message per recipient device.
pub enum PatchOutcome {
    Uniform(wa::Message),
    PerRecipient(Vec<(Jid, wa::Message)>),
}

pub type PatchMessageFn = dyn Fn(&wa::Message, &[Jid]) -> PatchOutcome + Send + Sync;

/// Application-supplied group metadata cache consulted before the internal
/// one. Entries returned from here are trusted as fresh.
#[async_trait]
pub trait GroupMetadataCache: Send + Sync {
    async fn get(&self, jid: &Jid) -> Option<GroupMetadata>;
}

/// Application-supplied user-devices cache with batched get/set.
#[async_trait]
pub trait UserDevicesCache: Send + Sync {
    async fn mget(&self, users: &[String]) -> Vec<Option<Vec<Jid>>>;
    async fn mset(&self, entries: Vec<(String, Vec<Jid>)>);
}

/// Relay behavior knobs. Defaults implement the strict semantics; the
/// legacy lenient group-send path stays available behind a flag.
#[derive(Clone)]
pub struct RelayConfig {
    /// Legacy lenient group-send mode: session-assert failures downgrade to
    /// warnings, per-device encrypt failures drop the device, the per-peer
    /// encryption mutex is bypassed and the sender-key distribution ignores
    /// sender-key-memory.
    pub compat_v6_group_send: bool,
    /// Chunk size for progressive session assertion on large groups.
    pub group_assert_chunk: usize,
    /// Delay between assertion chunks.
    pub group_assert_delay: Duration,
    /// Retain sent messages for retry-receipt re-encryption.
    pub enable_recent_message_cache: bool,
    /// Capacity of the recent-messages LRU.
    pub recent_messages_cache_size: u64,
    /// Upper bound accepted on incoming retry receipt counts.
    pub max_msg_retry_count: u8,
    /// Whether the relay reports its own sends back to the caller's event
    /// handler.
    pub emit_own_events: bool,
    pub patch_message_before_sending: Option<Arc<PatchMessageFn>>,
    pub cached_group_metadata: Option<Arc<dyn GroupMetadataCache>>,
    pub user_devices_cache: Option<Arc<dyn UserDevicesCache>>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            compat_v6_group_send: false,
            group_assert_chunk: 10,
            group_assert_delay: Duration::from_millis(250),
            enable_recent_message_cache: true,
            recent_messages_cache_size: 20_000,
            max_msg_retry_count: 5,
            emit_own_events: true,
            patch_message_before_sending: None,
            cached_group_metadata: None,
            user_devices_cache: None,
        }
    }
}
