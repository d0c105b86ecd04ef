use crate::entities::{escape_attribute, escape_text};
use arbor_editor::TreeRef;
use arbor_model::{NodeId, NodeKind};
use std::fmt::Write;

/// Writes trees back to markup text.
///
/// Compact output reproduces the tree exactly. Pretty output indents
/// elements that hold only markup; an element with any text child is
/// written on one line so its text is not changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Serializer {
    indent: Option<usize>,
}

impl Serializer {
    pub fn new() -> Self {
        Self { indent: None }
    }

    pub fn pretty(indent: usize) -> Self {
        Self {
            indent: Some(indent),
        }
    }

    pub fn serialize(&self, tree: TreeRef<'_>) -> String {
        self.serialize_node(tree, tree.root())
    }

    /// Serialize one node and its subtree
    pub fn serialize_node(&self, tree: TreeRef<'_>, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(tree, id, 0, &mut out);
        if self.indent.is_some() && out.ends_with('\n') {
            out.pop();
        }
        out
    }

    fn write_node(&self, tree: TreeRef<'_>, id: NodeId, depth: usize, out: &mut String) {
        let Some(node) = tree.node(id) else {
            return;
        };
        match node.kind() {
            NodeKind::Document { children } => {
                for child in children {
                    self.write_node(tree, *child, depth, out);
                    if self.indent.is_some() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
            }
            NodeKind::Element(element) => {
                out.push('<');
                out.push_str(&element.name);
                for attribute in element.attributes.iter() {
                    let _ = write!(
                        out,
                        " {}=\"{}\"",
                        attribute.name,
                        escape_attribute(&attribute.value)
                    );
                }
                if element.children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');

                match self.indent {
                    Some(width) if !has_text(tree, &element.children) => {
                        for child in &element.children {
                            out.push('\n');
                            push_indent(out, width * (depth + 1));
                            self.write_node(tree, *child, depth + 1, out);
                        }
                        out.push('\n');
                        push_indent(out, width * depth);
                    }
                    _ => {
                        for child in &element.children {
                            self.write_node(tree, *child, depth + 1, out);
                        }
                    }
                }

                out.push_str("</");
                out.push_str(&element.name);
                out.push('>');
            }
            NodeKind::Text(text) => out.push_str(&escape_text(text)),
            NodeKind::Comment(text) => {
                let _ = write!(out, "<!--{}-->", text);
            }
            NodeKind::CData(text) => {
                let _ = write!(out, "<![CDATA[{}]]>", text);
            }
            NodeKind::ProcessingInstruction { target, data } => {
                if data.is_empty() {
                    let _ = write!(out, "<?{}?>", target);
                } else {
                    let _ = write!(out, "<?{} {}?>", target, data);
                }
            }
        }
    }
}

/// Any text, even whitespace, pins an element to one line: indenting it
/// would change its content.
fn has_text(tree: TreeRef<'_>, children: &[NodeId]) -> bool {
    children.iter().any(|child| {
        matches!(
            tree.node(*child).map(|node| node.kind()),
            Some(NodeKind::Text(_) | NodeKind::CData(_))
        )
    })
}

fn push_indent(out: &mut String, width: usize) {
    out.extend(std::iter::repeat(' ').take(width));
}

/// Compact serialization of a whole tree
pub fn serialize(tree: TreeRef<'_>) -> String {
    Serializer::new().serialize(tree)
}
