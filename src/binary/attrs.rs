use std::str::FromStr;

use super::error::{BinaryError, Result};
use super::jid::Jid;
use super::node::Node;

/// Error-accumulating attribute parser.
///
/// Lookups record failures instead of returning them so a handler can read
/// every attribute it needs and then check `finish()` once.
pub struct AttrParser<'a> {
    node: &'a Node,
    pub errors: Vec<BinaryError>,
}

impl<'a> AttrParser<'a> {
    pub fn new(node: &'a Node) -> Self {
        Self {
            node,
            errors: Vec::new(),
        }
    }

    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(&self) -> Result<()> {
        if self.ok() {
            Ok(())
        } else {
            Err(BinaryError::AttrList(self.errors.clone()))
        }
    }

    fn get_raw(&mut self, key: &str, require: bool) -> Option<&'a str> {
        let val = self.node.attrs.get(key).map(String::as_str);
        if require && val.is_none() {
            self.errors.push(BinaryError::MissingAttr(key.to_string()));
        }
        val
    }

    pub fn optional_string(&mut self, key: &str) -> Option<&'a str> {
        self.get_raw(key, false)
    }

    pub fn string(&mut self, key: &str) -> String {
        self.get_raw(key, true).unwrap_or_default().to_string()
    }

    pub fn optional_jid(&mut self, key: &str) -> Option<Jid> {
        let raw = self.get_raw(key, false)?;
        match Jid::from_str(raw) {
            Ok(jid) => Some(jid),
            Err(_) => {
                self.errors
                    .push(BinaryError::AttrParse(format!("invalid JID: {raw}")));
                None
            }
        }
    }

    pub fn jid(&mut self, key: &str) -> Jid {
        self.get_raw(key, true);
        self.optional_jid(key).unwrap_or_default()
    }

    pub fn optional_u64(&mut self, key: &str) -> Option<u64> {
        let raw = self.get_raw(key, false)?;
        match raw.parse::<u64>() {
            Ok(val) => Some(val),
            Err(e) => {
                self.errors.push(BinaryError::AttrParse(format!(
                    "failed to parse u64 from '{raw}' for key '{key}': {e}"
                )));
                None
            }
        }
    }

    pub fn optional_bool(&mut self, key: &str) -> Option<bool> {
        let raw = self.get_raw(key, false)?;
        match raw.parse::<bool>() {
            Ok(val) => Some(val),
            Err(e) => {
                self.errors.push(BinaryError::AttrParse(format!(
                    "failed to parse bool from '{raw}' for key '{key}': {e}"
                )));
                None
            }
        }
    }
}
