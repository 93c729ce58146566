//! Media connection management: upload endpoint discovery with a memoized,
//! race-coalescing refresh.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};

use crate::binary::jid::DEFAULT_USER_SERVER;
use crate::binary::{Jid, Node, NodeBuilder, NodeContent};
use crate::error::{RelayError, Result};
use crate::transport::{InfoQuery, RequestUtils, Transport};

#[derive(Debug, Clone, PartialEq)]
pub struct MediaConnHost {
    pub hostname: String,
}

#[derive(Debug, Clone)]
pub struct MediaConn {
    pub auth: String,
    pub ttl: u64,
    pub hosts: Vec<MediaConnHost>,
    pub fetched_at: Instant,
}

impl MediaConn {
    pub fn is_expired(&self) -> bool {
        self.fetched_at.elapsed() > Duration::from_secs(self.ttl)
    }
}

/// Holds the current media connection and refreshes it when absent, forced,
/// or expired. Concurrent refreshes collapse onto one request: the refresh
/// lock is held across the round-trip and late arrivals re-check the slot.
pub struct MediaConnManager {
    transport: Arc<dyn Transport>,
    requests: Arc<RequestUtils>,
    current: RwLock<Option<MediaConn>>,
    refresh_lock: Mutex<()>,
}

impl MediaConnManager {
    pub fn new(transport: Arc<dyn Transport>, requests: Arc<RequestUtils>) -> Self {
        Self {
            transport,
            requests,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub async fn get(&self, force: bool) -> Result<MediaConn> {
        if !force {
            let guard = self.current.read().await;
            if let Some(conn) = guard.as_ref() {
                if !conn.is_expired() {
                    return Ok(conn.clone());
                }
            }
        }

        let _refresh = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited for the lock.
        if !force {
            let guard = self.current.read().await;
            if let Some(conn) = guard.as_ref() {
                if !conn.is_expired() {
                    return Ok(conn.clone());
                }
            }
        }

        let iq = self.requests.build_iq_node(
            &InfoQuery::set(
                "w:m",
                Jid::new("", DEFAULT_USER_SERVER),
                Some(NodeContent::Nodes(vec![
                    NodeBuilder::new("media_conn").build(),
                ])),
            ),
            None,
        );
        let response = self.transport.send_iq(iq).await?;
        let conn = parse_media_conn(&response)?;

        *self.current.write().await = Some(conn.clone());
        Ok(conn)
    }
}

fn parse_media_conn(response: &Node) -> Result<MediaConn> {
    let conn_node = response
        .get_optional_child("media_conn")
        .ok_or_else(|| RelayError::MalformedResponse(anyhow::anyhow!("<media_conn> missing")))?;

    let mut attrs = conn_node.attrs();
    let auth = attrs.string("auth");
    let ttl = attrs.optional_u64("ttl").unwrap_or(0);
    attrs
        .finish()
        .map_err(|e| RelayError::MalformedResponse(e.into()))?;

    let hosts = conn_node
        .get_children_by_tag("host")
        .into_iter()
        .filter_map(|host| {
            host.attrs()
                .optional_string("hostname")
                .map(|hostname| MediaConnHost {
                    hostname: hostname.to_string(),
                })
        })
        .collect();

    Ok(MediaConn {
        auth,
        ttl,
        hosts,
        fetched_at: Instant::now(),
    })
}
