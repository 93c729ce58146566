use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::BinaryError;

pub const DEFAULT_USER_SERVER: &str = "s.whatsapp.net";
pub const GROUP_SERVER: &str = "g.us";
pub const LEGACY_USER_SERVER: &str = "c.us";
pub const BROADCAST_SERVER: &str = "broadcast";
pub const HIDDEN_USER_SERVER: &str = "lid";
pub const NEWSLETTER_SERVER: &str = "newsletter";
pub const HOSTED_SERVER: &str = "hosted";
pub const HOSTED_LID_SERVER: &str = "hosted.lid";
pub const STATUS_BROADCAST_USER: &str = "status";

pub type MessageId = String;

/// A jabber-style identifier `user@server[:device]`.
///
/// The same user can exist in two identity spaces at once: the phone-number
/// space (`@s.whatsapp.net`) and the opaque LID space (`@lid`). A JID that
/// carries a device component is a *wire JID* and addresses one concrete
/// Signal endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Jid {
    pub user: String,
    pub server: String,
    pub agent: u8,
    pub device: u16,
}

impl Jid {
    pub fn new(user: &str, server: &str) -> Self {
        Self {
            user: user.to_string(),
            server: server.to_string(),
            ..Default::default()
        }
    }

    pub fn pn(user: &str) -> Self {
        Self::new(user, DEFAULT_USER_SERVER)
    }

    pub fn lid(user: &str) -> Self {
        Self::new(user, HIDDEN_USER_SERVER)
    }

    pub fn group(id: &str) -> Self {
        Self::new(id, GROUP_SERVER)
    }

    pub fn status_broadcast() -> Self {
        Self::new(STATUS_BROADCAST_USER, BROADCAST_SERVER)
    }

    pub fn with_device(&self, device: u16) -> Self {
        Self {
            device,
            ..self.clone()
        }
    }

    /// Strip the device component, yielding the user-level JID.
    pub fn to_non_ad(&self) -> Self {
        Self {
            user: self.user.clone(),
            server: self.server.clone(),
            ..Default::default()
        }
    }

    /// Device-qualified form used as input to the participant hash.
    pub fn to_ad_string(&self) -> String {
        if self.user.is_empty() {
            self.server.clone()
        } else {
            format!(
                "{}.{}:{}@{}",
                self.user, self.agent, self.device, self.server
            )
        }
    }

    /// The Signal protocol address for this wire JID.
    pub fn to_protocol_address(&self) -> SignalAddress {
        SignalAddress::new(self.user.clone(), u32::from(self.device))
    }

    pub fn is_ad(&self) -> bool {
        self.device > 0
            && (self.server == DEFAULT_USER_SERVER
                || self.server == HIDDEN_USER_SERVER
                || self.server == HOSTED_SERVER
                || self.server == HOSTED_LID_SERVER)
    }

    pub fn is_pn(&self) -> bool {
        self.server == DEFAULT_USER_SERVER || self.server == HOSTED_SERVER
    }

    pub fn is_lid(&self) -> bool {
        self.server == HIDDEN_USER_SERVER || self.server == HOSTED_LID_SERVER
    }

    pub fn is_group(&self) -> bool {
        self.server == GROUP_SERVER
    }

    pub fn is_newsletter(&self) -> bool {
        self.server == NEWSLETTER_SERVER
    }

    pub fn is_broadcast_list(&self) -> bool {
        self.server == BROADCAST_SERVER && self.user != STATUS_BROADCAST_USER
    }

    pub fn is_status_broadcast(&self) -> bool {
        self.server == BROADCAST_SERVER && self.user == STATUS_BROADCAST_USER
    }

    pub fn is_empty(&self) -> bool {
        self.server.is_empty()
    }

    /// Two JIDs are the same user when user and server match with the device
    /// stripped. Comparing across identity spaces goes through the identity
    /// map first.
    pub fn is_same_user_as(&self, other: &Jid) -> bool {
        self.user == other.user && self.server == other.server
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.user.is_empty() {
            return write!(f, "{}", self.server);
        }
        write!(f, "{}", self.user)?;
        if self.agent > 0 {
            write!(f, ".{}", self.agent)?;
        }
        if self.device > 0 {
            write!(f, ":{}", self.device)?;
        }
        write!(f, "@{}", self.server)
    }
}

impl FromStr for Jid {
    type Err = BinaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((user_part, server)) = s.split_once('@') else {
            // Server-only JID (e.g. "s.whatsapp.net" as an iq target).
            return Ok(Jid {
                user: String::new(),
                server: s.to_string(),
                ..Default::default()
            });
        };
        if user_part.is_empty() {
            return Err(BinaryError::InvalidJid(s.to_string()));
        }

        let (user_part, device) = match user_part.split_once(':') {
            Some((u, d)) => {
                let device = d
                    .parse::<u16>()
                    .map_err(|_| BinaryError::InvalidJid(s.to_string()))?;
                (u, device)
            }
            None => (user_part, 0),
        };

        // LID user identifiers can contain dots that are part of the
        // identity, never agent separators. Only the PN-adjacent servers use
        // the `user.agent` convention.
        let (user, agent) = if server == HIDDEN_USER_SERVER || server == HOSTED_LID_SERVER {
            (user_part, 0u8)
        } else {
            match user_part.rsplit_once('.') {
                Some((u, suffix)) => match suffix.parse::<u8>() {
                    Ok(agent) => (u, agent),
                    Err(_) => (user_part, 0),
                },
                None => (user_part, 0),
            }
        };

        Ok(Jid {
            user: user.to_string(),
            server: server.to_string(),
            agent,
            device,
        })
    }
}

/// Signal protocol address: the session-store key for one wire endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignalAddress {
    name: String,
    device_id: u32,
}

impl SignalAddress {
    pub fn new(name: String, device_id: u32) -> Self {
        Self { name, device_id }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }
}

impl fmt::Display for SignalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.name, self.device_id)
    }
}
