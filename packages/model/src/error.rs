//! Error types for the node model

use crate::NodeId;
use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

/// Failures of the arena primitives.
///
/// Every variant is a programmer error: the editor validates commands before
/// touching the arena, so these only surface when a caller bypasses it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Dangling reference: node {0} is not in the arena")]
    DanglingReference(NodeId),

    #[error("Index {index} out of bounds for node {parent} with {len} children")]
    IndexOutOfBounds {
        parent: NodeId,
        index: usize,
        len: usize,
    },

    #[error("Node {0} cannot have children")]
    NotAContainer(NodeId),

    #[error("Node {node} is {found}, expected {expected}")]
    KindMismatch {
        node: NodeId,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Node {0} is already attached to a parent")]
    AlreadyAttached(NodeId),

    #[error("Attaching {child} under {parent} would create a cycle")]
    WouldCycle { child: NodeId, parent: NodeId },
}

impl ModelError {
    pub fn kind_mismatch(node: NodeId, expected: &'static str, found: &'static str) -> Self {
        Self::KindMismatch {
            node,
            expected,
            found,
        }
    }
}
