//! # Commands
//!
//! High-level, intent-preserving edits. Every change to a document goes
//! through one of these, executed by the `CommandManager`.
//!
//! ## Semantics
//!
//! ### DeleteNode
//! - Detaches the node and its subtree; the subtree stays in the arena while
//!   history can still restore it
//! - The document root cannot be deleted
//!
//! ### MoveNode
//! - Atomic relocation, `index` counts siblings after the node is taken out
//! - Fails if the destination is the node itself or one of its descendants
//!
//! ### SetText
//! - Atomic replacement, never a character diff
//! - On an element: edits its single text child, creating one when the
//!   element is empty; elements with structured content are rejected
//!
//! ### Merging
//! - Consecutive `SetText` on the same node, or `SetAttribute` on the same
//!   node and name, coalesce into one history entry; the later value wins

use crate::step::Step;
use crate::{EditorError, EditorResult};
use arbor_model::{Arena, Fragment, Node, NodeId, NodeKind};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Command {
    /// Insert a new subtree; `index: None` appends
    #[serde(rename_all = "camelCase")]
    AddChild {
        parent: NodeId,
        index: Option<usize>,
        fragment: Fragment,
    },

    #[serde(rename_all = "camelCase")]
    DeleteNode { node: NodeId },

    #[serde(rename_all = "camelCase")]
    SetAttribute {
        node: NodeId,
        name: String,
        value: String,
    },

    #[serde(rename_all = "camelCase")]
    RemoveAttribute { node: NodeId, name: String },

    #[serde(rename_all = "camelCase")]
    SetText { node: NodeId, text: String },

    #[serde(rename_all = "camelCase")]
    MoveNode {
        node: NodeId,
        new_parent: NodeId,
        index: usize,
    },

    #[serde(rename_all = "camelCase")]
    Rename { node: NodeId, name: String },

    /// Deep-copy a node in place, right after the original
    #[serde(rename_all = "camelCase")]
    Duplicate {
        node: NodeId,
        #[serde(default)]
        id_suffix: Option<String>,
    },
}

/// Steps ready to apply, plus subtrees allocated while planning
#[derive(Debug, Default)]
pub(crate) struct Plan {
    pub steps: Vec<Step>,
    pub allocated: Vec<NodeId>,
}

impl Plan {
    fn single(step: Step) -> Self {
        Self {
            steps: vec![step],
            allocated: Vec::new(),
        }
    }

    fn fresh(step: Step, node: NodeId) -> Self {
        Self {
            steps: vec![step],
            allocated: vec![node],
        }
    }

    fn unchanged() -> Self {
        Self::default()
    }
}

impl Command {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::AddChild { .. } => "add_child",
            Command::DeleteNode { .. } => "delete_node",
            Command::SetAttribute { .. } => "set_attribute",
            Command::RemoveAttribute { .. } => "remove_attribute",
            Command::SetText { .. } => "set_text",
            Command::MoveNode { .. } => "move_node",
            Command::Rename { .. } => "rename",
            Command::Duplicate { .. } => "duplicate",
        }
    }

    /// The node a command acts on (the parent for `AddChild`)
    pub fn target(&self) -> NodeId {
        match self {
            Command::AddChild { parent, .. } => *parent,
            Command::DeleteNode { node }
            | Command::SetAttribute { node, .. }
            | Command::RemoveAttribute { node, .. }
            | Command::SetText { node, .. }
            | Command::MoveNode { node, .. }
            | Command::Rename { node, .. }
            | Command::Duplicate { node, .. } => *node,
        }
    }

    /// Human-readable label for undo/redo menus
    pub fn describe(&self) -> String {
        match self {
            Command::AddChild { fragment, .. } => match fragment.name() {
                Some(name) => format!("Add <{}>", name),
                None => "Add content".to_string(),
            },
            Command::DeleteNode { .. } => "Delete node".to_string(),
            Command::SetAttribute { name, .. } => format!("Set @{}", name),
            Command::RemoveAttribute { name, .. } => format!("Remove @{}", name),
            Command::SetText { .. } => "Edit text".to_string(),
            Command::MoveNode { .. } => "Move node".to_string(),
            Command::Rename { name, .. } => format!("Rename to <{}>", name),
            Command::Duplicate { .. } => "Duplicate node".to_string(),
        }
    }

    /// Whether `next` rewrites the same slot as `self`
    pub fn can_merge_with(&self, next: &Command) -> bool {
        match (self, next) {
            (Command::SetText { node: a, .. }, Command::SetText { node: b, .. }) => a == b,
            (
                Command::SetAttribute {
                    node: a, name: x, ..
                },
                Command::SetAttribute {
                    node: b, name: y, ..
                },
            ) => a == b && x == y,
            _ => false,
        }
    }

    /// Combine two mergeable commands; the later value wins. Returns `self`
    /// unchanged when the two do not merge.
    pub fn merge_with(self, next: Command) -> Command {
        if self.can_merge_with(&next) {
            next
        } else {
            self
        }
    }

    /// Check preconditions without touching the document
    pub fn validate(&self, arena: &Arena, root: NodeId) -> EditorResult<()> {
        match self {
            Command::AddChild {
                parent,
                index,
                fragment,
            } => {
                let parent_node = live(arena, root, *parent)?;
                require_container(parent_node)?;
                check_index(index.unwrap_or(0), parent_node.children().len())?;
                check_fragment(fragment)?;
                let character_data =
                    matches!(fragment, Fragment::Text { .. } | Fragment::CData { .. });
                check_document_child(
                    arena,
                    root,
                    *parent,
                    fragment.is_element(),
                    character_data,
                    None,
                )
            }
            Command::DeleteNode { node } => {
                not_root(*node, root, "delete")?;
                live(arena, root, *node).map(|_| ())
            }
            Command::SetAttribute { node, name, .. } | Command::RemoveAttribute { node, name } => {
                require_element(live(arena, root, *node)?)?;
                check_name(name)
            }
            Command::SetText { node, text } => {
                let target = live(arena, root, *node)?;
                match target.kind() {
                    NodeKind::Document { .. } => {
                        Err(EditorError::invalid("the document root holds no text"))
                    }
                    NodeKind::Element(element) => {
                        for child in &element.children {
                            if !is_character_data(arena.get(*child)?) {
                                return Err(EditorError::invalid(format!(
                                    "element {} has structured content; edit its children instead",
                                    node
                                )));
                            }
                        }
                        // The first run is rewritten in place and may be CDATA
                        match element.children.first() {
                            Some(first) => check_content(arena.get(*first)?.kind(), text),
                            None => Ok(()),
                        }
                    }
                    kind => check_content(kind, text),
                }
            }
            Command::MoveNode {
                node,
                new_parent,
                index,
            } => {
                not_root(*node, root, "move")?;
                let moved = live(arena, root, *node)?;
                let destination = live(arena, root, *new_parent)?;
                require_container(destination)?;
                check_document_child(
                    arena,
                    root,
                    *new_parent,
                    moved.is_element(),
                    is_character_data(moved),
                    Some(*node),
                )?;
                if arena.is_ancestor_or_self(*node, *new_parent)? {
                    return Err(EditorError::invalid(
                        "cannot move a node into itself or its own descendant",
                    ));
                }
                let mut len = destination.children().len();
                if destination.children().contains(node) {
                    len -= 1;
                }
                check_index(*index, len)
            }
            Command::Rename { node, name } => {
                let target = live(arena, root, *node)?;
                if !matches!(
                    target.kind(),
                    NodeKind::Element(_) | NodeKind::ProcessingInstruction { .. }
                ) {
                    return Err(EditorError::invalid(format!(
                        "cannot rename a {} node",
                        target.kind_name()
                    )));
                }
                check_name(name)
            }
            Command::Duplicate { node, .. } => {
                not_root(*node, root, "duplicate")?;
                let original = live(arena, root, *node)?;
                match original.parent() {
                    Some(parent) => check_document_child(
                        arena,
                        root,
                        parent,
                        original.is_element(),
                        is_character_data(original),
                        None,
                    ),
                    None => Ok(()),
                }
            }
        }
    }

    /// Validate, then turn the command into reversible steps. Nodes the
    /// plan needs (new subtrees, copies) are allocated detached.
    pub(crate) fn plan(&self, arena: &mut Arena, root: NodeId) -> EditorResult<Plan> {
        self.validate(arena, root)?;

        let plan = match self {
            Command::AddChild {
                parent,
                index,
                fragment,
            } => {
                let index = match index {
                    Some(index) => *index,
                    None => arena.children(*parent)?.len(),
                };
                let node = arena.materialize(fragment);
                Plan::fresh(
                    Step::Attach {
                        parent: *parent,
                        index,
                        node,
                    },
                    node,
                )
            }
            Command::DeleteNode { node } => {
                let (parent, index) = attached_position(arena, *node)?;
                Plan::single(Step::Detach {
                    parent,
                    index,
                    node: *node,
                })
            }
            Command::SetAttribute { node, name, value } => {
                let Some(element) = arena.get(*node)?.as_element() else {
                    return Err(EditorError::invalid(format!("node {} is not an element", node)));
                };
                let attributes = &element.attributes;
                let before = attributes
                    .position(name)
                    .zip(attributes.get(name))
                    .map(|(position, old)| (position, old.to_string()));
                let position = match &before {
                    Some((_, old)) if old == value => return Ok(Plan::unchanged()),
                    Some((position, _)) => *position,
                    None => attributes.len(),
                };
                Plan::single(Step::Attribute {
                    node: *node,
                    name: name.clone(),
                    before,
                    after: Some((position, value.clone())),
                })
            }
            Command::RemoveAttribute { node, name } => {
                let before = arena
                    .get(*node)?
                    .as_element()
                    .and_then(|element| {
                        let position = element.attributes.position(name)?;
                        element.attributes.get(name).map(|old| (position, old.to_string()))
                    });
                match before {
                    Some(before) => Plan::single(Step::Attribute {
                        node: *node,
                        name: name.clone(),
                        before: Some(before),
                        after: None,
                    }),
                    None => Plan::unchanged(),
                }
            }
            Command::SetText { node, text } => plan_set_text(arena, *node, text)?,
            Command::MoveNode {
                node,
                new_parent,
                index,
            } => {
                let from = attached_position(arena, *node)?;
                if from == (*new_parent, *index) {
                    Plan::unchanged()
                } else {
                    Plan::single(Step::Move {
                        node: *node,
                        from,
                        to: (*new_parent, *index),
                    })
                }
            }
            Command::Rename { node, name } => {
                let before = arena.get(*node)?.name().unwrap_or_default().to_string();
                if before == *name {
                    Plan::unchanged()
                } else {
                    Plan::single(Step::Rename {
                        node: *node,
                        before,
                        after: name.clone(),
                    })
                }
            }
            Command::Duplicate { node, id_suffix } => {
                let (parent, index) = attached_position(arena, *node)?;
                let copy = arena.clone_subtree(*node, id_suffix.as_deref())?;
                Plan::fresh(
                    Step::Attach {
                        parent,
                        index: index + 1,
                        node: copy,
                    },
                    copy,
                )
            }
        };
        Ok(plan)
    }
}

fn plan_set_text(arena: &mut Arena, node: NodeId, text: &str) -> EditorResult<Plan> {
    let target = arena.get(node)?;
    if let Some(current) = target.text() {
        if current == text {
            return Ok(Plan::unchanged());
        }
        return Ok(Plan::single(Step::Text {
            node,
            before: current.to_string(),
            after: text.to_string(),
        }));
    }

    // Element with only character data (validated)
    let children = target.children().to_vec();
    let Some((&first, rest)) = children.split_first() else {
        if text.is_empty() {
            return Ok(Plan::unchanged());
        }
        let created = arena.alloc(NodeKind::Text(text.to_string()));
        return Ok(Plan::fresh(
            Step::Attach {
                parent: node,
                index: 0,
                node: created,
            },
            created,
        ));
    };

    let mut steps = Vec::new();
    let current = arena.get(first)?.text().unwrap_or_default();
    if current != text {
        steps.push(Step::Text {
            node: first,
            before: current.to_string(),
            after: text.to_string(),
        });
    }
    // Fold any further text runs into the first; detach from the back so
    // recorded indices stay valid in both directions.
    for (offset, child) in rest.iter().enumerate().rev() {
        steps.push(Step::Detach {
            parent: node,
            index: offset + 1,
            node: *child,
        });
    }
    Ok(Plan {
        steps,
        allocated: Vec::new(),
    })
}

/// Existing node that is part of the document
fn live(arena: &Arena, root: NodeId, id: NodeId) -> EditorResult<&Node> {
    let node = arena.get(id)?;
    if !arena.is_ancestor_or_self(root, id)? {
        return Err(EditorError::invalid(format!(
            "node {} is not part of the document",
            id
        )));
    }
    Ok(node)
}

fn attached_position(arena: &Arena, id: NodeId) -> EditorResult<(NodeId, usize)> {
    arena
        .position(id)?
        .ok_or_else(|| EditorError::invalid(format!("node {} has no parent", id)))
}

fn not_root(node: NodeId, root: NodeId, action: &str) -> EditorResult<()> {
    if node == root {
        Err(EditorError::invalid(format!(
            "cannot {} the document root",
            action
        )))
    } else {
        Ok(())
    }
}

fn require_container(node: &Node) -> EditorResult<()> {
    if node.is_container() {
        Ok(())
    } else {
        Err(EditorError::invalid(format!(
            "a {} node cannot have children",
            node.kind_name()
        )))
    }
}

fn require_element(node: &Node) -> EditorResult<()> {
    if node.is_element() {
        Ok(())
    } else {
        Err(EditorError::invalid(format!(
            "node {} is a {}, not an element",
            node.id(),
            node.kind_name()
        )))
    }
}

fn check_index(index: usize, len: usize) -> EditorResult<()> {
    if index > len {
        Err(EditorError::invalid(format!(
            "index {} out of range for {} children",
            index, len
        )))
    } else {
        Ok(())
    }
}

fn check_fragment(fragment: &Fragment) -> EditorResult<()> {
    let mut stack = vec![fragment];
    while let Some(fragment) = stack.pop() {
        match fragment {
            Fragment::Element {
                name,
                attributes,
                children,
            } => {
                check_name(name)?;
                for attribute in attributes.iter() {
                    check_name(&attribute.name)?;
                }
                stack.extend(children.iter());
            }
            Fragment::Text { .. } => {}
            Fragment::Comment { text } => check_comment(text)?,
            Fragment::CData { text } => check_cdata(text)?,
            Fragment::ProcessingInstruction { target, data } => {
                check_name(target)?;
                check_instruction(data)?;
            }
        }
    }
    Ok(())
}

/// New content for an existing character-data node
fn check_content(kind: &NodeKind, text: &str) -> EditorResult<()> {
    match kind {
        NodeKind::Comment(_) => check_comment(text),
        NodeKind::CData(_) => check_cdata(text),
        NodeKind::ProcessingInstruction { .. } => check_instruction(text),
        _ => Ok(()),
    }
}

fn check_comment(text: &str) -> EditorResult<()> {
    if text.contains("--") || text.ends_with('-') {
        Err(EditorError::invalid("a comment cannot contain '--' or end with '-'"))
    } else {
        Ok(())
    }
}

fn check_cdata(text: &str) -> EditorResult<()> {
    if text.contains("]]>") {
        Err(EditorError::invalid("a CDATA section cannot contain ']]>'"))
    } else {
        Ok(())
    }
}

fn check_instruction(data: &str) -> EditorResult<()> {
    if data.contains("?>") {
        Err(EditorError::invalid("instruction data cannot contain '?>'"))
    } else {
        Ok(())
    }
}

/// The document node holds at most one element and no character data.
/// `moving` is a node already counted under `parent` that is being moved.
fn check_document_child(
    arena: &Arena,
    root: NodeId,
    parent: NodeId,
    is_element: bool,
    character_data: bool,
    moving: Option<NodeId>,
) -> EditorResult<()> {
    if parent != root {
        return Ok(());
    }
    if character_data {
        return Err(EditorError::invalid("the document root holds no text"));
    }
    if is_element {
        for child in arena.children(root)? {
            if Some(*child) != moving && arena.get(*child)?.is_element() {
                return Err(EditorError::invalid(format!(
                    "the document already has a document element ({})",
                    child
                )));
            }
        }
    }
    Ok(())
}

fn is_character_data(node: &Node) -> bool {
    matches!(node.kind(), NodeKind::Text(_) | NodeKind::CData(_))
}

/// Element, attribute and PI names: a letter, `_` or `:` first, then
/// letters, digits, `-`, `.`, `_` or `:`
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '.' | '_' | ':'))
}

fn check_name(name: &str) -> EditorResult<()> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(EditorError::invalid(format!("'{}' is not a valid name", name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_serialization() {
        let command = Command::SetAttribute {
            node: NodeId::from_raw(12),
            name: "id".to_string(),
            value: "b1".to_string(),
        };

        let json = serde_json::to_string(&command).unwrap();
        let back: Command = serde_json::from_str(&json).unwrap();
        assert_eq!(command, back);
        assert!(json.contains("\"type\":\"setAttribute\""));
    }

    #[test]
    fn test_merge_rules() {
        let node = NodeId::from_raw(3);
        let other = NodeId::from_raw(4);
        let text = |node, text: &str| Command::SetText {
            node,
            text: text.to_string(),
        };

        assert!(text(node, "a").can_merge_with(&text(node, "ab")));
        assert!(!text(node, "a").can_merge_with(&text(other, "ab")));
        assert_eq!(text(node, "a").merge_with(text(node, "ab")), text(node, "ab"));

        let attr = |name: &str| Command::SetAttribute {
            node,
            name: name.to_string(),
            value: "v".to_string(),
        };
        assert!(attr("x").can_merge_with(&attr("x")));
        assert!(!attr("x").can_merge_with(&attr("y")));
        assert!(!attr("x").can_merge_with(&text(node, "v")));
        assert!(!Command::DeleteNode { node }.can_merge_with(&Command::DeleteNode { node }));
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("book"));
        assert!(is_valid_name("xs:element"));
        assert!(is_valid_name("_private-1.2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("1st"));
        assert!(!is_valid_name("has space"));
    }

    #[test]
    fn test_describe() {
        let command = Command::AddChild {
            parent: NodeId::from_raw(1),
            index: None,
            fragment: Fragment::element("book"),
        };
        assert_eq!(command.describe(), "Add <book>");
        assert_eq!(command.name(), "add_child");
    }
}
