//! `warelay` — the outbound message relay core of a WhatsApp-protocol
//! client.
//!
//! The relay accepts one application-level message for a direct peer, a
//! group, a newsletter or the status feed, and produces the signed,
//! encrypted `<message>` stanza addressed to every recipient device:
//! addressing resolution across the PN and LID identity spaces, Signal
//! session management with on-demand pre-key fetches, sender-key fan-out
//! with durable distribution memory, and bit-exact stanza assembly.
//!
//! Persistence, the framed socket transport and the Signal ratchet engine
//! are external collaborators behind the [`store`] and [`transport`]
//! traits.

pub mod binary;
pub mod config;
pub mod encrypt;
pub mod error;
pub mod group;
pub mod identity;
pub mod keyed_mutex;
pub mod mediaconn;
pub mod messages;
pub mod proto;
pub mod receipt;
pub mod relay;
pub mod resolver;
pub mod retry;
pub mod session;
pub mod stanza;
pub mod store;
pub mod transport;
pub mod types;
pub mod usync;

pub use binary::{Jid, MessageId, Node};
pub use config::RelayConfig;
pub use error::{RelayError, Result};
pub use relay::{Relay, RelayOptions, RetryParticipant, SenderIdentity};
