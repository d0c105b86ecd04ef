//! # Node Types
//!
//! A closed set of node kinds with exhaustive per-kind handling. Containers
//! (the document node and elements) list their children by id.

use crate::NodeId;
use serde::{Deserialize, Serialize};

/// Single `name="value"` pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

/// Order-preserving attribute map with unique names.
///
/// Lookups are linear; elements rarely carry more than a handful of
/// attributes and the order is part of the document's identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|attr| attr.name == name)
            .map(|attr| attr.value.as_str())
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|attr| attr.name == name)
    }

    /// Set a value, keeping the attribute's position if it already exists.
    ///
    /// Returns the previous value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> Option<String> {
        let value = value.into();
        match self.0.iter_mut().find(|attr| attr.name == name) {
            Some(attr) => Some(std::mem::replace(&mut attr.value, value)),
            None => {
                self.0.push(Attribute {
                    name: name.to_string(),
                    value,
                });
                None
            }
        }
    }

    /// Insert at an exact position, replacing any attribute with the same name.
    pub fn insert_at(&mut self, position: usize, name: &str, value: impl Into<String>) {
        if let Some(existing) = self.position(name) {
            self.0.remove(existing);
        }
        let position = position.min(self.0.len());
        self.0.insert(
            position,
            Attribute {
                name: name.to_string(),
                value: value.into(),
            },
        );
    }

    /// Remove by name, returning the position and value it had.
    pub fn remove(&mut self, name: &str) -> Option<(usize, String)> {
        let position = self.position(name)?;
        let attr = self.0.remove(position);
        Some((position, attr.value))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|attr| attr.name.as_str())
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Attributes {
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> Self {
        let mut attributes = Attributes::new();
        for (name, value) in iter {
            let name = name.into();
            attributes.set(&name, value);
        }
        attributes
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Attributes,
    pub children: Vec<NodeId>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Attributes::new(),
            children: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document { children: Vec<NodeId> },
    Element(Element),
    Text(String),
    Comment(String),
    CData(String),
    ProcessingInstruction { target: String, data: String },
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Document { .. } => "document",
            NodeKind::Element(_) => "element",
            NodeKind::Text(_) => "text",
            NodeKind::Comment(_) => "comment",
            NodeKind::CData(_) => "cdata",
            NodeKind::ProcessingInstruction { .. } => "processing instruction",
        }
    }

    pub fn children(&self) -> &[NodeId] {
        match self {
            NodeKind::Document { children } => children,
            NodeKind::Element(element) => &element.children,
            _ => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<NodeId>> {
        match self {
            NodeKind::Document { children } => Some(children),
            NodeKind::Element(element) => Some(&mut element.children),
            _ => None,
        }
    }
}

/// A node stored in the arena
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: NodeId,
    parent: Option<NodeId>,
    kind: NodeKind,
}

impl Node {
    pub(crate) fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            parent: None,
            kind,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<NodeId>) {
        self.parent = parent;
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }

    pub fn children(&self) -> &[NodeId] {
        self.kind.children()
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, NodeKind::Document { .. } | NodeKind::Element(_))
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element(_))
    }

    pub fn as_element(&self) -> Option<&Element> {
        match &self.kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Element name or processing-instruction target
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element(element) => Some(&element.name),
            NodeKind::ProcessingInstruction { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Character data of a leaf node
    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text(text) | NodeKind::Comment(text) | NodeKind::CData(text) => Some(text),
            NodeKind::ProcessingInstruction { data, .. } => Some(data),
            _ => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.as_element().and_then(|element| element.attributes.get(name))
    }

    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_set_keeps_position() {
        let mut attrs: Attributes = [("a", "1"), ("b", "2"), ("c", "3")].into_iter().collect();

        assert_eq!(attrs.set("b", "20"), Some("2".to_string()));
        assert_eq!(attrs.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(attrs.get("b"), Some("20"));

        assert_eq!(attrs.set("d", "4"), None);
        assert_eq!(attrs.names().collect::<Vec<_>>(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_attribute_remove_then_insert_restores_order() {
        let mut attrs: Attributes = [("a", "1"), ("b", "2"), ("c", "3")].into_iter().collect();
        let original = attrs.clone();

        let (position, value) = attrs.remove("b").unwrap();
        assert_eq!(position, 1);
        assert_eq!(attrs.names().collect::<Vec<_>>(), vec!["a", "c"]);

        attrs.insert_at(position, "b", value);
        assert_eq!(attrs, original);
    }

    #[test]
    fn test_leaf_nodes_have_no_children() {
        let node = Node::new(NodeId::from_raw(1), NodeKind::Text("hi".into()));
        assert!(node.children().is_empty());
        assert!(!node.is_container());
        assert_eq!(node.text(), Some("hi"));
        assert_eq!(node.name(), None);
    }
}
