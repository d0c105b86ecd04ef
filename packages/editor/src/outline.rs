//! Tree outline: one labelled line per node, kept current from change events
//! without rebuilding the whole tree.

use crate::document::Document;
use crate::events::{ChangeEvent, ChangeKind};
use crate::view::View;
use arbor_model::{Arena, NodeId, NodeKind};
use std::collections::HashMap;

const LABEL_TEXT_LIMIT: usize = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutlineEntry {
    pub depth: usize,
    pub label: String,
}

#[derive(Debug, Default)]
pub struct OutlineView {
    entries: HashMap<NodeId, OutlineEntry>,
    updates: usize,
}

impl OutlineView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(doc: &Document) -> Self {
        let mut view = Self::new();
        view.rebuild(doc);
        view
    }

    pub fn entry(&self, id: NodeId) -> Option<&OutlineEntry> {
        self.entries.get(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Events applied since construction
    pub fn updates_applied(&self) -> usize {
        self.updates
    }

    /// Entries in document order
    pub fn lines(&self, doc: &Document) -> Vec<(NodeId, OutlineEntry)> {
        doc.arena()
            .descendants(doc.root())
            .filter_map(|id| self.entries.get(&id).map(|entry| (id, entry.clone())))
            .collect()
    }

    fn rebuild(&mut self, doc: &Document) {
        self.entries.clear();
        self.insert_subtree(doc.arena(), doc.root());
    }

    fn insert_subtree(&mut self, arena: &Arena, top: NodeId) {
        let Ok(base) = arena.depth(top) else {
            return;
        };
        let mut stack = vec![(top, base)];
        while let Some((id, depth)) = stack.pop() {
            let Some(label) = label(arena, id) else {
                continue;
            };
            self.entries.insert(id, OutlineEntry { depth, label });
            if let Ok(children) = arena.children(id) {
                stack.extend(children.iter().map(|child| (*child, depth + 1)));
            }
        }
    }

    fn remove_subtree(&mut self, arena: &Arena, top: NodeId) {
        for id in arena.descendants(top) {
            self.entries.remove(&id);
        }
    }

    fn relabel(&mut self, arena: &Arena, id: NodeId) {
        if let (Some(entry), Some(label)) = (self.entries.get_mut(&id), label(arena, id)) {
            entry.label = label;
        }
    }
}

impl View for OutlineView {
    fn on_change(&mut self, doc: &Document, event: &ChangeEvent) {
        self.updates += 1;
        let arena = doc.arena();
        match &event.kind {
            ChangeKind::Inserted { .. } => self.insert_subtree(arena, event.node),
            ChangeKind::Removed { .. } => self.remove_subtree(arena, event.node),
            ChangeKind::Moved { .. } => {
                self.remove_subtree(arena, event.node);
                self.insert_subtree(arena, event.node);
            }
            ChangeKind::Attribute { .. } | ChangeKind::Renamed { .. } | ChangeKind::Text => {
                self.relabel(arena, event.node)
            }
            ChangeKind::Reset => self.rebuild(doc),
        }
    }

    fn receives_own_changes(&self) -> bool {
        true
    }
}

fn label(arena: &Arena, id: NodeId) -> Option<String> {
    let node = arena.get(id).ok()?;
    Some(match node.kind() {
        NodeKind::Document { .. } => "#document".to_string(),
        NodeKind::Element(element) => match element.attributes.get("id") {
            Some(key) => format!("<{}> #{}", element.name, key),
            None => format!("<{}>", element.name),
        },
        NodeKind::Text(text) => format!("\"{}\"", preview(text)),
        NodeKind::Comment(text) => format!("<!-- {} -->", preview(text)),
        NodeKind::CData(text) => format!("<![CDATA[{}]]>", preview(text)),
        NodeKind::ProcessingInstruction { target, .. } => format!("<?{}?>", target),
    })
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= LABEL_TEXT_LIMIT {
        trimmed.to_string()
    } else {
        let cut: String = trimmed.chars().take(LABEL_TEXT_LIMIT).collect();
        format!("{}…", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Command, CommandManager};
    use arbor_model::Fragment;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_outline_tracks_edits() {
        let doc = Document::from_fragment(
            &Fragment::element("catalog").child(Fragment::element("book").attr("id", "b1")),
        );
        let catalog = doc.document_element().unwrap();
        let book = doc.children(catalog).unwrap()[0];

        let outline = Rc::new(RefCell::new(OutlineView::build(&doc)));
        let mut manager = CommandManager::new(doc);
        manager.register_view(outline.clone());
        assert_eq!(outline.borrow().len(), 3);

        manager
            .execute(Command::AddChild {
                parent: book,
                index: None,
                fragment: Fragment::leaf("title", "Dune"),
            })
            .unwrap();
        assert_eq!(outline.borrow().len(), 5);

        manager
            .execute(Command::SetAttribute {
                node: book,
                name: "id".into(),
                value: "b2".into(),
            })
            .unwrap();
        assert_eq!(outline.borrow().entry(book).unwrap().label, "<book> #b2");

        manager.undo();
        manager.undo();
        let view = outline.borrow();
        assert_eq!(view.len(), 3);
        assert_eq!(view.entry(book).unwrap().label, "<book> #b1");
        assert_eq!(view.entry(book).unwrap().depth, 2);
        assert_eq!(view.updates_applied(), 4);
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(60);
        assert_eq!(preview(&long).chars().count(), LABEL_TEXT_LIMIT + 1);
        assert_eq!(preview("  short "), "short");
    }
}
