//! Reversible primitive edits.
//!
//! A command plans into a list of steps. Each step records enough of the
//! "before" state to be reverted exactly, so undo never needs to re-derive
//! anything from the command that produced it.

use crate::events::ChangeKind;
use arbor_model::{Arena, ModelError, ModelResult, NodeId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    Attach {
        parent: NodeId,
        index: usize,
        node: NodeId,
    },
    Detach {
        parent: NodeId,
        index: usize,
        node: NodeId,
    },
    Move {
        node: NodeId,
        from: (NodeId, usize),
        to: (NodeId, usize),
    },
    /// `None` means absent; positions keep attribute order exact on revert
    Attribute {
        node: NodeId,
        name: String,
        before: Option<(usize, String)>,
        after: Option<(usize, String)>,
    },
    Text {
        node: NodeId,
        before: String,
        after: String,
    },
    Rename {
        node: NodeId,
        before: String,
        after: String,
    },
}

impl Step {
    pub fn apply(&self, arena: &mut Arena) -> ModelResult<()> {
        match self {
            Step::Attach {
                parent,
                index,
                node,
            } => arena.insert_child(*parent, *index, *node),
            Step::Detach {
                parent,
                index,
                node,
            } => detach_exact(arena, *parent, *index, *node),
            Step::Move { node, from, to } => {
                detach_exact(arena, from.0, from.1, *node)?;
                reattach(arena, *to, *from, *node)
            }
            Step::Attribute {
                node, name, after, ..
            } => put_attribute(arena, *node, name, after),
            Step::Text { node, after, .. } => arena.set_text(*node, after.as_str()).map(|_| ()),
            Step::Rename { node, after, .. } => arena.rename(*node, after.as_str()).map(|_| ()),
        }
    }

    pub fn revert(&self, arena: &mut Arena) -> ModelResult<()> {
        match self {
            Step::Attach {
                parent,
                index,
                node,
            } => detach_exact(arena, *parent, *index, *node),
            Step::Detach {
                parent,
                index,
                node,
            } => arena.insert_child(*parent, *index, *node),
            Step::Move { node, from, to } => {
                detach_exact(arena, to.0, to.1, *node)?;
                reattach(arena, *from, *to, *node)
            }
            Step::Attribute {
                node, name, before, ..
            } => put_attribute(arena, *node, name, before),
            Step::Text { node, before, .. } => arena.set_text(*node, before.as_str()).map(|_| ()),
            Step::Rename { node, before, .. } => {
                arena.rename(*node, before.as_str()).map(|_| ())
            }
        }
    }

    /// Change produced by `apply`
    pub fn forward_change(&self) -> (NodeId, ChangeKind) {
        match self {
            Step::Attach {
                parent,
                index,
                node,
            } => (
                *node,
                ChangeKind::Inserted {
                    parent: *parent,
                    index: *index,
                },
            ),
            Step::Detach {
                parent,
                index,
                node,
            } => (
                *node,
                ChangeKind::Removed {
                    parent: *parent,
                    index: *index,
                },
            ),
            Step::Move { node, from, to } => (*node, moved(*from, *to)),
            Step::Attribute {
                node,
                name,
                before,
                after,
            } => (*node, attribute_change(name, before, after)),
            Step::Text { node, .. } => (*node, ChangeKind::Text),
            Step::Rename {
                node,
                before,
                after,
            } => (
                *node,
                ChangeKind::Renamed {
                    old_name: before.clone(),
                    new_name: after.clone(),
                },
            ),
        }
    }

    /// Change produced by `revert`
    pub fn reverse_change(&self) -> (NodeId, ChangeKind) {
        match self {
            Step::Attach {
                parent,
                index,
                node,
            } => (
                *node,
                ChangeKind::Removed {
                    parent: *parent,
                    index: *index,
                },
            ),
            Step::Detach {
                parent,
                index,
                node,
            } => (
                *node,
                ChangeKind::Inserted {
                    parent: *parent,
                    index: *index,
                },
            ),
            Step::Move { node, from, to } => (*node, moved(*to, *from)),
            Step::Attribute {
                node,
                name,
                before,
                after,
            } => (*node, attribute_change(name, after, before)),
            Step::Text { node, .. } => (*node, ChangeKind::Text),
            Step::Rename {
                node,
                before,
                after,
            } => (
                *node,
                ChangeKind::Renamed {
                    old_name: after.clone(),
                    new_name: before.clone(),
                },
            ),
        }
    }

    /// Subtree root left out of the tree while this step is applied
    pub fn detached_when_applied(&self) -> Option<NodeId> {
        match self {
            Step::Detach { node, .. } => Some(*node),
            _ => None,
        }
    }

    /// Subtree root left out of the tree while this step is reverted
    pub fn detached_when_reverted(&self) -> Option<NodeId> {
        match self {
            Step::Attach { node, .. } => Some(*node),
            _ => None,
        }
    }

    /// Fold `next` into `self` when both rewrite the same slot
    pub fn absorb(&mut self, next: &Step) -> bool {
        match (self, next) {
            (
                Step::Text { node, after, .. },
                Step::Text {
                    node: next_node,
                    after: next_after,
                    ..
                },
            ) if node == next_node => {
                after.clone_from(next_after);
                true
            }
            (
                Step::Attribute {
                    node, name, after, ..
                },
                Step::Attribute {
                    node: next_node,
                    name: next_name,
                    after: next_after,
                    ..
                },
            ) if node == next_node && name == next_name => {
                after.clone_from(next_after);
                true
            }
            _ => false,
        }
    }
}

/// Remove `node` from `parent` only if it really sits at `index`
fn detach_exact(arena: &mut Arena, parent: NodeId, index: usize, node: NodeId) -> ModelResult<()> {
    let children = arena.children(parent)?;
    let len = children.len();
    match children.get(index).copied() {
        Some(found) if found == node => arena.remove_child(parent, index).map(|_| ()),
        Some(_) => Err(ModelError::DanglingReference(node)),
        None => Err(ModelError::IndexOutOfBounds { parent, index, len }),
    }
}

/// Attach at `to`, restoring `fallback` if that fails so the tree stays whole
fn reattach(
    arena: &mut Arena,
    to: (NodeId, usize),
    fallback: (NodeId, usize),
    node: NodeId,
) -> ModelResult<()> {
    match arena.insert_child(to.0, to.1, node) {
        Ok(()) => Ok(()),
        Err(err) => {
            if let Err(restore) = arena.insert_child(fallback.0, fallback.1, node) {
                tracing::error!(node = %node, error = %restore, "failed to restore moved node");
            }
            Err(err)
        }
    }
}

fn put_attribute(
    arena: &mut Arena,
    node: NodeId,
    name: &str,
    value: &Option<(usize, String)>,
) -> ModelResult<()> {
    match value {
        Some((position, value)) => arena.insert_attribute(node, *position, name, value.as_str()),
        None => arena.remove_attribute(node, name).map(|_| ()),
    }
}

fn moved(from: (NodeId, usize), to: (NodeId, usize)) -> ChangeKind {
    ChangeKind::Moved {
        old_parent: from.0,
        old_index: from.1,
        new_parent: to.0,
        new_index: to.1,
    }
}

fn attribute_change(
    name: &str,
    old: &Option<(usize, String)>,
    new: &Option<(usize, String)>,
) -> ChangeKind {
    ChangeKind::Attribute {
        name: name.to_string(),
        old_value: old.as_ref().map(|(_, value)| value.clone()),
        new_value: new.as_ref().map(|(_, value)| value.clone()),
    }
}

/// Apply steps in order; on failure revert the ones already applied
pub(crate) fn apply_all(arena: &mut Arena, steps: &[Step]) -> ModelResult<()> {
    for (applied, step) in steps.iter().enumerate() {
        if let Err(err) = step.apply(arena) {
            for done in steps[..applied].iter().rev() {
                if let Err(rollback) = done.revert(arena) {
                    tracing::error!(
                        error = %rollback,
                        "rollback of partially applied steps failed"
                    );
                }
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Revert steps in reverse order; on failure re-apply the ones already reverted
pub(crate) fn revert_all(arena: &mut Arena, steps: &[Step]) -> ModelResult<()> {
    for (position, step) in steps.iter().enumerate().rev() {
        if let Err(err) = step.revert(arena) {
            for done in &steps[position + 1..] {
                if let Err(rollback) = done.apply(arena) {
                    tracing::error!(error = %rollback, "re-apply after failed revert failed");
                }
            }
            return Err(err);
        }
    }
    Ok(())
}
