use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::attrs::AttrParser;

pub type Attrs = IndexMap<String, String>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeContent {
    Bytes(Vec<u8>),
    String(String),
    Nodes(Vec<Node>),
}

/// One node of the framed binary-node tree the wire protocol speaks.
///
/// Attribute order is preserved; the encoder on the transport side emits
/// attributes in insertion order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Node {
    pub tag: String,
    pub attrs: Attrs,
    pub content: Option<NodeContent>,
}

impl Node {
    pub fn new(tag: &str, attrs: Attrs, content: Option<NodeContent>) -> Self {
        Self {
            tag: tag.to_string(),
            attrs,
            content,
        }
    }

    pub fn attrs(&self) -> AttrParser<'_> {
        AttrParser::new(self)
    }

    pub fn children(&self) -> Option<&[Node]> {
        match &self.content {
            Some(NodeContent::Nodes(nodes)) => Some(nodes),
            _ => None,
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.content {
            Some(NodeContent::Bytes(b)) => Some(b),
            _ => None,
        }
    }

    pub fn get_optional_child(&self, tag: &str) -> Option<&Node> {
        self.children()
            .and_then(|nodes| nodes.iter().find(|node| node.tag == tag))
    }

    /// Walk a path of tags, returning the node at the end of the path.
    pub fn get_optional_child_by_tag<'a>(&'a self, tags: &[&str]) -> Option<&'a Node> {
        let mut current = self;
        for &tag in tags {
            current = current.get_optional_child(tag)?;
        }
        Some(current)
    }

    pub fn get_children_by_tag(&self, tag: &str) -> Vec<&Node> {
        self.children()
            .map(|children| children.iter().filter(|c| c.tag == tag).collect())
            .unwrap_or_default()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.tag)?;
        for (key, value) in &self.attrs {
            write!(f, " {key}=\"{value}\"")?;
        }
        match &self.content {
            None => write!(f, "/>"),
            Some(NodeContent::Bytes(b)) => write!(f, "><!-- {} bytes --></{}>", b.len(), self.tag),
            Some(NodeContent::String(s)) => write!(f, ">{s}</{}>", self.tag),
            Some(NodeContent::Nodes(children)) => {
                write!(f, ">")?;
                for child in children {
                    write!(f, "{child}")?;
                }
                write!(f, "</{}>", self.tag)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::binary::builder::NodeBuilder;

    #[test]
    fn child_lookup_by_path() {
        let node = NodeBuilder::new("iq")
            .children([NodeBuilder::new("usync")
                .children([NodeBuilder::new("list").build()])
                .build()])
            .build();

        assert!(node.get_optional_child_by_tag(&["usync", "list"]).is_some());
        assert!(node.get_optional_child_by_tag(&["usync", "side"]).is_none());
    }

    #[test]
    fn attrs_preserve_insertion_order() {
        let node = NodeBuilder::new("message")
            .attr("to", "a@s.whatsapp.net")
            .attr("id", "X")
            .attr("type", "text")
            .build();
        let keys: Vec<_> = node.attrs.keys().cloned().collect();
        assert_eq!(keys, vec!["to", "id", "type"]);
    }

    #[test]
    fn display_is_xml_like() {
        let node = NodeBuilder::new("enc")
            .attr("v", "2")
            .attr("type", "msg")
            .bytes(vec![1, 2, 3])
            .build();
        assert_eq!(
            node.to_string(),
            "<enc v=\"2\" type=\"msg\"><!-- 3 bytes --></enc>"
        );
    }
}
