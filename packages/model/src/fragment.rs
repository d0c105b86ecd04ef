//! # Fragments
//!
//! Owned, detached description of a subtree. Commands carry fragments (so
//! they stay plain data) and the arena materializes them into nodes with fresh
//! ids when the command is first applied.

use crate::Attributes;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Fragment {
    Element {
        name: String,
        #[serde(default)]
        attributes: Attributes,
        #[serde(default)]
        children: Vec<Fragment>,
    },
    Text {
        text: String,
    },
    Comment {
        text: String,
    },
    CData {
        text: String,
    },
    ProcessingInstruction {
        target: String,
        data: String,
    },
}

impl Fragment {
    pub fn element(name: impl Into<String>) -> Self {
        Fragment::Element {
            name: name.into(),
            attributes: Attributes::new(),
            children: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Fragment::Text { text: text.into() }
    }

    pub fn comment(text: impl Into<String>) -> Self {
        Fragment::Comment { text: text.into() }
    }

    pub fn cdata(text: impl Into<String>) -> Self {
        Fragment::CData { text: text.into() }
    }

    pub fn processing_instruction(target: impl Into<String>, data: impl Into<String>) -> Self {
        Fragment::ProcessingInstruction {
            target: target.into(),
            data: data.into(),
        }
    }

    /// Builder: set an attribute (ignored on non-elements)
    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        if let Fragment::Element { attributes, .. } = &mut self {
            attributes.set(name, value);
        }
        self
    }

    /// Builder: append a child (ignored on non-elements)
    pub fn child(mut self, child: Fragment) -> Self {
        if let Fragment::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    /// Builder: append a text child
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.child(Fragment::text(text))
    }

    /// `<name>text</name>`
    pub fn leaf(name: impl Into<String>, text: impl Into<String>) -> Self {
        Fragment::element(name).with_text(text)
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Fragment::Element { name, .. } => Some(name),
            Fragment::ProcessingInstruction { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, Fragment::Element { .. })
    }

    pub fn children(&self) -> &[Fragment] {
        match self {
            Fragment::Element { children, .. } => children,
            _ => &[],
        }
    }

    /// Number of nodes the fragment materializes into
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(Fragment::node_count).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_produces_nested_fragment() {
        let row = Fragment::element("row")
            .attr("id", "1")
            .child(Fragment::leaf("name", "John"));

        assert_eq!(row.name(), Some("row"));
        assert_eq!(row.children().len(), 1);
        assert_eq!(row.node_count(), 3);
        match &row {
            Fragment::Element { attributes, .. } => assert_eq!(attributes.get("id"), Some("1")),
            _ => panic!("Expected element"),
        }
    }

    #[test]
    fn test_builders_ignore_leaves() {
        let text = Fragment::text("x").attr("a", "1").child(Fragment::text("y"));
        assert_eq!(text, Fragment::text("x"));
    }

    #[test]
    fn test_fragment_serialization() {
        let fragment = Fragment::element("p").attr("a", "1").with_text("hi");
        let json = serde_json::to_string(&fragment).unwrap();
        let back: Fragment = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fragment);
    }
}
