//! View binding protocol.
//!
//! Views observe a document through change events and never mutate it
//! directly; they submit commands instead. Events for one history transition
//! are delivered together, in registration order, once the transition has
//! fully applied.

use crate::document::Document;
use crate::events::{AdvisoryEvent, ChangeEvent, ChangeKind};
use crate::{EditorResult, ViewId};
use arbor_model::NodeId;
use std::cell::RefCell;
use std::rc::Rc;

pub trait View {
    fn on_change(&mut self, doc: &Document, event: &ChangeEvent);

    /// Called once per history transition with every event it produced
    fn on_changes(&mut self, doc: &Document, events: &[ChangeEvent]) {
        for event in events {
            self.on_change(doc, event);
        }
    }

    fn on_advisory(&mut self, _doc: &Document, _event: &AdvisoryEvent) {}

    /// Views that do not update optimistically want their own edits back
    fn receives_own_changes(&self) -> bool {
        false
    }
}

pub type SharedView = Rc<RefCell<dyn View>>;

#[derive(Default)]
pub struct ViewRegistry {
    next_id: u32,
    views: Vec<(ViewId, SharedView)>,
}

impl ViewRegistry {
    pub fn register(&mut self, view: SharedView) -> ViewId {
        self.next_id += 1;
        let id = ViewId::new(self.next_id);
        self.views.push((id, view));
        id
    }

    pub fn unregister(&mut self, id: ViewId) -> bool {
        let before = self.views.len();
        self.views.retain(|(view_id, _)| *view_id != id);
        self.views.len() != before
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    pub fn ids(&self) -> Vec<ViewId> {
        self.views.iter().map(|(id, _)| *id).collect()
    }

    pub(crate) fn dispatch(&self, doc: &Document, events: &[ChangeEvent]) {
        for (id, view) in &self.views {
            // A view re-entering the registry through its own callback is a bug
            // in that view; skip it rather than panic on the double borrow.
            let Ok(mut view) = view.try_borrow_mut() else {
                tracing::warn!(view = %id, "view busy during dispatch, events skipped");
                continue;
            };
            let echo = events.iter().all(|event| event.is_echo_for(*id));
            if echo && !view.receives_own_changes() {
                continue;
            }
            view.on_changes(doc, events);
        }
    }

    pub(crate) fn dispatch_advisory(&self, doc: &Document, event: &AdvisoryEvent) {
        for (_, view) in &self.views {
            if let Ok(mut view) = view.try_borrow_mut() {
                view.on_advisory(doc, event);
            }
        }
    }
}

/// Outcome of adjusting an anchor for one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reanchor {
    Unchanged,
    /// Same parent, index shifted by a sibling change
    Shifted,
    /// The anchored node itself moved elsewhere
    Relocated,
    /// The anchored node left the tree; `index` now names the vacated slot
    Lost,
}

/// A selection position expressed as "node at index under parent", kept
/// valid as other edits shift siblings around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionAnchor {
    pub node: NodeId,
    pub parent: NodeId,
    pub index: usize,
}

impl SelectionAnchor {
    pub fn at(doc: &Document, node: NodeId) -> EditorResult<Option<Self>> {
        Ok(doc
            .arena()
            .position(node)?
            .map(|(parent, index)| Self { node, parent, index }))
    }

    pub fn reanchor(&mut self, event: &ChangeEvent) -> Reanchor {
        match &event.kind {
            ChangeKind::Inserted { parent, index } => self.after_insert(*parent, *index),
            ChangeKind::Removed { parent, index } => {
                if event.node == self.node {
                    self.index = *index;
                    Reanchor::Lost
                } else {
                    self.after_remove(*parent, *index)
                }
            }
            ChangeKind::Moved {
                old_parent,
                old_index,
                new_parent,
                new_index,
            } => {
                if event.node == self.node {
                    self.parent = *new_parent;
                    self.index = *new_index;
                    return Reanchor::Relocated;
                }
                let removed = self.after_remove(*old_parent, *old_index);
                let inserted = self.after_insert(*new_parent, *new_index);
                if removed == Reanchor::Unchanged && inserted == Reanchor::Unchanged {
                    Reanchor::Unchanged
                } else {
                    Reanchor::Shifted
                }
            }
            _ => Reanchor::Unchanged,
        }
    }

    fn after_insert(&mut self, parent: NodeId, index: usize) -> Reanchor {
        if parent == self.parent && index <= self.index {
            self.index += 1;
            Reanchor::Shifted
        } else {
            Reanchor::Unchanged
        }
    }

    fn after_remove(&mut self, parent: NodeId, index: usize) -> Reanchor {
        if parent == self.parent && index < self.index {
            self.index -= 1;
            Reanchor::Shifted
        } else {
            Reanchor::Unchanged
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Phase;

    fn id(raw: u64) -> NodeId {
        NodeId::from_raw(raw)
    }

    fn event(node: u64, kind: ChangeKind) -> ChangeEvent {
        ChangeEvent::new(1, Phase::Execute, ViewId::SYSTEM, id(node), kind)
    }

    fn anchor() -> SelectionAnchor {
        SelectionAnchor {
            node: id(10),
            parent: id(1),
            index: 2,
        }
    }

    #[test]
    fn test_insert_before_shifts() {
        let mut a = anchor();
        let result = a.reanchor(&event(
            20,
            ChangeKind::Inserted {
                parent: id(1),
                index: 0,
            },
        ));
        assert_eq!(result, Reanchor::Shifted);
        assert_eq!(a.index, 3);
    }

    #[test]
    fn test_insert_after_is_ignored() {
        let mut a = anchor();
        let result = a.reanchor(&event(
            20,
            ChangeKind::Inserted {
                parent: id(1),
                index: 3,
            },
        ));
        assert_eq!(result, Reanchor::Unchanged);
        assert_eq!(a.index, 2);
    }

    #[test]
    fn test_remove_before_and_self() {
        let mut a = anchor();
        a.reanchor(&event(
            20,
            ChangeKind::Removed {
                parent: id(1),
                index: 0,
            },
        ));
        assert_eq!(a.index, 1);

        let result = a.reanchor(&event(
            10,
            ChangeKind::Removed {
                parent: id(1),
                index: 1,
            },
        ));
        assert_eq!(result, Reanchor::Lost);
        assert_eq!(a.index, 1);
    }

    #[test]
    fn test_move_of_anchor_relocates() {
        let mut a = anchor();
        let result = a.reanchor(&event(
            10,
            ChangeKind::Moved {
                old_parent: id(1),
                old_index: 2,
                new_parent: id(5),
                new_index: 0,
            },
        ));
        assert_eq!(result, Reanchor::Relocated);
        assert_eq!((a.parent, a.index), (id(5), 0));
    }

    #[test]
    fn test_sibling_move_within_parent() {
        let mut a = anchor();
        // sibling at 0 moves behind the anchor
        let result = a.reanchor(&event(
            20,
            ChangeKind::Moved {
                old_parent: id(1),
                old_index: 0,
                new_parent: id(1),
                new_index: 3,
            },
        ));
        assert_eq!(result, Reanchor::Shifted);
        assert_eq!(a.index, 1);
    }

    struct Counter {
        calls: usize,
        own: bool,
    }

    impl View for Counter {
        fn on_change(&mut self, _doc: &Document, _event: &ChangeEvent) {
            self.calls += 1;
        }

        fn receives_own_changes(&self) -> bool {
            self.own
        }
    }

    #[test]
    fn test_registry_suppresses_echo() {
        let mut registry = ViewRegistry::default();
        let quiet = Rc::new(RefCell::new(Counter { calls: 0, own: false }));
        let loud = Rc::new(RefCell::new(Counter { calls: 0, own: true }));
        let quiet_id = registry.register(quiet.clone());
        let loud_id = registry.register(loud.clone());
        assert_ne!(quiet_id, loud_id);

        let doc = Document::new();
        let own = ChangeEvent::new(1, Phase::Execute, quiet_id, id(1), ChangeKind::Text);
        registry.dispatch(&doc, &[own.clone()]);
        assert_eq!(quiet.borrow().calls, 0);
        assert_eq!(loud.borrow().calls, 1);

        let undo = ChangeEvent {
            phase: Phase::Undo,
            ..own
        };
        registry.dispatch(&doc, &[undo]);
        assert_eq!(quiet.borrow().calls, 1);
        assert_eq!(loud.borrow().calls, 2);
    }

    #[test]
    fn test_unregister() {
        let mut registry = ViewRegistry::default();
        let view = Rc::new(RefCell::new(Counter { calls: 0, own: false }));
        let view_id = registry.register(view);
        assert!(registry.unregister(view_id));
        assert!(!registry.unregister(view_id));
        assert!(registry.is_empty());
    }
}
