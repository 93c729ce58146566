//! The untyped binary-node tree shared by every stanza this crate produces.
//!
//! Encoding/decoding to the compressed wire framing belongs to the transport
//! collaborator; the relay core only builds and inspects node trees.

pub mod attrs;
pub mod builder;
pub mod error;
pub mod jid;
pub mod node;

pub use builder::NodeBuilder;
pub use error::BinaryError;
pub use jid::{Jid, MessageId, SignalAddress};
pub use node::{Attrs, Node, NodeContent};
