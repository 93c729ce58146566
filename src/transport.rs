use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::binary::jid::LEGACY_USER_SERVER;
use crate::binary::{Jid, Node, NodeBuilder, NodeContent};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("not connected")]
    NotConnected,
    #[error("server error response: code={code}, text='{text}'")]
    ServerError { code: u16, text: String },
    #[error("network error: {0}")]
    Network(String),
}

/// The framed binary-node transport. Implementations own framing, noise
/// encryption and response correlation; the relay core only hands over
/// finished node trees.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fire-and-forget send. The single point of no return for a relay call.
    async fn send_node(&self, node: Node) -> Result<(), TransportError>;

    /// Send an `<iq>` and await the correlated response node. The timeout is
    /// the caller's; no internal retry.
    async fn send_iq(&self, node: Node) -> Result<Node, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoQueryType {
    Get,
    Set,
}

impl InfoQueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
        }
    }
}

/// An `<iq>` request shape.
#[derive(Debug, Clone)]
pub struct InfoQuery<'a> {
    pub namespace: &'a str,
    pub query_type: InfoQueryType,
    pub to: Jid,
    pub content: Option<NodeContent>,
    pub timeout: Option<Duration>,
}

impl<'a> InfoQuery<'a> {
    pub fn get(namespace: &'a str, to: Jid, content: Option<NodeContent>) -> Self {
        Self {
            namespace,
            query_type: InfoQueryType::Get,
            to,
            content,
            timeout: None,
        }
    }

    pub fn set(namespace: &'a str, to: Jid, content: Option<NodeContent>) -> Self {
        Self {
            namespace,
            query_type: InfoQueryType::Set,
            to,
            content,
            timeout: None,
        }
    }
}

/// Request/message id generation, shared by every component that issues IQs.
pub struct RequestUtils {
    unique_id: String,
    id_counter: AtomicU64,
}

impl RequestUtils {
    pub fn new() -> Self {
        let mut tag = [0u8; 2];
        rand::thread_rng().fill_bytes(&mut tag);
        Self {
            unique_id: format!("{}.{}", tag[0], tag[1]),
            id_counter: AtomicU64::new(0),
        }
    }

    pub fn generate_request_id(&self) -> String {
        let count = self.id_counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.unique_id, count)
    }

    /// Derive an outbound message id: SHA-256 over timestamp, the sender's
    /// legacy-form JID and fresh entropy, truncated and tagged.
    pub fn generate_message_id(&self, own_jid: Option<&Jid>) -> String {
        let mut data = Vec::with_capacity(8 + 20 + 16);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        data.extend_from_slice(&timestamp.to_be_bytes());

        if let Some(jid) = own_jid {
            data.extend_from_slice(jid.user.as_bytes());
            data.extend_from_slice(b"@");
            data.extend_from_slice(LEGACY_USER_SERVER.as_bytes());
        }

        let mut random_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut random_bytes);
        data.extend_from_slice(&random_bytes);

        let hash = Sha256::digest(&data);
        format!("3EB0{}", hex::encode_upper(&hash[..9]))
    }

    pub fn build_iq_node(&self, query: &InfoQuery<'_>, req_id: Option<String>) -> Node {
        let id = req_id.unwrap_or_else(|| self.generate_request_id());

        let mut builder = NodeBuilder::new("iq")
            .attr("id", id)
            .attr("xmlns", query.namespace)
            .attr("type", query.query_type.as_str())
            .attr("to", query.to.to_string());

        if let Some(content) = &query.content {
            builder = match content {
                NodeContent::Nodes(children) => builder.children(children.clone()),
                NodeContent::Bytes(bytes) => builder.bytes(bytes.clone()),
                NodeContent::String(s) => builder.string_content(s.clone()),
            };
        }
        builder.build()
    }
}

impl Default for RequestUtils {
    fn default() -> Self {
        Self::new()
    }
}

pub mod mock {
    //! Scriptable transport for tests and offline development.

    use std::collections::VecDeque;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use crate::binary::Node;

    use super::{Transport, TransportError};

    type IqHandler = Box<dyn Fn(&Node) -> Result<Node, TransportError> + Send + Sync>;

    /// Records every sent node; answers IQs from a FIFO of scripted handlers.
    #[derive(Default)]
    pub struct MockTransport {
        pub sent: Mutex<Vec<Node>>,
        handlers: Mutex<VecDeque<IqHandler>>,
        fail_sends: Mutex<bool>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub async fn expect_iq(
            &self,
            handler: impl Fn(&Node) -> Result<Node, TransportError> + Send + Sync + 'static,
        ) {
            self.handlers.lock().await.push_back(Box::new(handler));
        }

        /// Make subsequent `send_node` calls fail with a network error.
        pub async fn fail_sends(&self, fail: bool) {
            *self.fail_sends.lock().await = fail;
        }

        pub async fn sent_nodes(&self) -> Vec<Node> {
            self.sent.lock().await.clone()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send_node(&self, node: Node) -> Result<(), TransportError> {
            if *self.fail_sends.lock().await {
                return Err(TransportError::Network("simulated send failure".into()));
            }
            self.sent.lock().await.push(node);
            Ok(())
        }

        async fn send_iq(&self, node: Node) -> Result<Node, TransportError> {
            let handler = self.handlers.lock().await.pop_front().ok_or_else(|| {
                TransportError::Network(format!("unexpected iq: {node}"))
            })?;
            self.sent.lock().await.push(node.clone());
            handler(&node)
        }
    }
}
