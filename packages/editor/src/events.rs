//! Change events published to views after every history transition.

use crate::background::JobKind;
use crate::services::Diagnostic;
use arbor_model::NodeId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a registered view. `ViewId::SYSTEM` marks changes that no
/// view originated (document loads, scripted edits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(u32);

impl ViewId {
    pub const SYSTEM: ViewId = ViewId(0);

    pub(crate) fn new(raw: u32) -> Self {
        ViewId(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn is_system(self) -> bool {
        self == Self::SYSTEM
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_system() {
            write!(f, "system")
        } else {
            write!(f, "view-{}", self.0)
        }
    }
}

/// Which history transition produced an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Execute,
    Undo,
    Redo,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeCategory {
    Structure,
    Attribute,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChangeKind {
    #[serde(rename_all = "camelCase")]
    Inserted { parent: NodeId, index: usize },

    #[serde(rename_all = "camelCase")]
    Removed { parent: NodeId, index: usize },

    #[serde(rename_all = "camelCase")]
    Moved {
        old_parent: NodeId,
        old_index: usize,
        new_parent: NodeId,
        new_index: usize,
    },

    #[serde(rename_all = "camelCase")]
    Attribute {
        name: String,
        old_value: Option<String>,
        new_value: Option<String>,
    },

    /// Character data of the target changed
    Text,

    #[serde(rename_all = "camelCase")]
    Renamed { old_name: String, new_name: String },

    /// The whole document was replaced; views rebuild from scratch
    Reset,
}

impl ChangeKind {
    pub fn category(&self) -> ChangeCategory {
        match self {
            ChangeKind::Inserted { .. }
            | ChangeKind::Removed { .. }
            | ChangeKind::Moved { .. }
            | ChangeKind::Renamed { .. }
            | ChangeKind::Reset => ChangeCategory::Structure,
            ChangeKind::Attribute { .. } => ChangeCategory::Attribute,
            ChangeKind::Text => ChangeCategory::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// Document-wide publication order, strictly increasing
    pub sequence: u64,
    /// History entry the change belongs to (0 for resets)
    pub transaction: u64,
    pub phase: Phase,
    pub origin: ViewId,
    /// Node the change happened to
    pub node: NodeId,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub(crate) fn new(
        transaction: u64,
        phase: Phase,
        origin: ViewId,
        node: NodeId,
        kind: ChangeKind,
    ) -> Self {
        Self {
            sequence: 0,
            transaction,
            phase,
            origin,
            node,
            kind,
        }
    }

    pub fn category(&self) -> ChangeCategory {
        self.kind.category()
    }

    /// True when `parent` gained, lost or reordered a child
    pub fn touches_children_of(&self, parent: NodeId) -> bool {
        match &self.kind {
            ChangeKind::Inserted { parent: p, .. } | ChangeKind::Removed { parent: p, .. } => {
                *p == parent
            }
            ChangeKind::Moved {
                old_parent,
                new_parent,
                ..
            } => *old_parent == parent || *new_parent == parent,
            _ => false,
        }
    }

    /// An echo is a forward execution reported back to the view that asked
    /// for it. Undo and redo are never echoes, whoever requested them.
    pub fn is_echo_for(&self, view: ViewId) -> bool {
        self.phase == Phase::Execute && self.origin == view && !view.is_system()
    }
}

/// Result of background derived work (validation, serialization)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvisoryEvent {
    pub job: JobKind,
    pub generation: u64,
    pub document_version: u64,
    pub outcome: AdvisoryOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum AdvisoryOutcome {
    Diagnostics { diagnostics: Vec<Diagnostic> },
    Serialized { bytes: Vec<u8> },
    Failed { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> NodeId {
        NodeId::from_raw(raw)
    }

    #[test]
    fn test_categories() {
        let moved = ChangeKind::Moved {
            old_parent: id(1),
            old_index: 0,
            new_parent: id(2),
            new_index: 3,
        };
        assert_eq!(moved.category(), ChangeCategory::Structure);
        assert_eq!(ChangeKind::Text.category(), ChangeCategory::Text);
        let attr = ChangeKind::Attribute {
            name: "id".into(),
            old_value: None,
            new_value: Some("x".into()),
        };
        assert_eq!(attr.category(), ChangeCategory::Attribute);
    }

    #[test]
    fn test_echo_only_for_forward_execution() {
        let view = ViewId::new(3);
        let mut event = ChangeEvent::new(1, Phase::Execute, view, id(5), ChangeKind::Text);
        assert!(event.is_echo_for(view));
        assert!(!event.is_echo_for(ViewId::new(4)));

        event.phase = Phase::Undo;
        assert!(!event.is_echo_for(view));
    }

    #[test]
    fn test_touches_children_of() {
        let event = ChangeEvent::new(
            1,
            Phase::Execute,
            ViewId::SYSTEM,
            id(9),
            ChangeKind::Moved {
                old_parent: id(1),
                old_index: 0,
                new_parent: id(2),
                new_index: 0,
            },
        );
        assert!(event.touches_children_of(id(1)));
        assert!(event.touches_children_of(id(2)));
        assert!(!event.touches_children_of(id(9)));
    }

    #[test]
    fn test_event_serializes_with_tagged_kind() {
        let event = ChangeEvent::new(
            7,
            Phase::Redo,
            ViewId::new(1),
            id(4),
            ChangeKind::Inserted {
                parent: id(2),
                index: 0,
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["phase"], "redo");
        assert_eq!(json["kind"]["type"], "inserted");
        assert_eq!(json["kind"]["index"], 0);
    }
}
