//! # Document Handle
//!
//! The single source of truth for one tree-structured document.
//!
//! A Document owns the node arena, the id of its document root, a version
//! counter bumped on every history transition, and the registry of views
//! observing it. Views only ever see `&Document`; all mutation goes through
//! the `CommandManager`.
//!
//! The arena sits behind an `Arc`. A snapshot shares it, and the next
//! mutation copies it only while some snapshot still holds the old one.
//!
//! ## Lifecycle
//!
//! ```text
//! parse/build → register views → execute/undo/redo → publish events → serialize
//! ```

use crate::events::{AdvisoryEvent, ChangeEvent};
use crate::view::{SharedView, ViewRegistry};
use crate::{EditorError, EditorResult, ViewId};
use arbor_model::{Arena, Fragment, Node, NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub struct Document {
    arena: Arc<Arena>,
    root: NodeId,
    version: u64,
    next_sequence: u64,
    views: ViewRegistry,
}

impl Document {
    /// Create an empty document holding only its root
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.alloc(NodeKind::Document { children: Vec::new() });
        Self::assemble(arena, root)
    }

    /// Create a document whose document element is built from `fragment`
    pub fn from_fragment(fragment: &Fragment) -> Self {
        let mut doc = Self::new();
        let root = doc.root;
        let arena = doc.arena_mut();
        let element = arena.materialize(fragment);
        // A fresh root is an empty container, attaching cannot fail.
        if let Err(err) = arena.append_child(root, element) {
            tracing::error!(error = %err, "failed to attach document element");
        }
        doc
    }

    /// Adopt an arena built elsewhere (parsers, snapshots)
    pub fn from_arena(arena: Arena, root: NodeId) -> EditorResult<Self> {
        let node = arena.get(root)?;
        if !matches!(node.kind(), NodeKind::Document { .. }) {
            return Err(EditorError::invalid(format!(
                "node {} is a {}, not a document root",
                root,
                node.kind_name()
            )));
        }
        if node.parent().is_some() {
            return Err(EditorError::invalid(format!(
                "document root {} must not have a parent",
                root
            )));
        }
        Ok(Self::assemble(arena, root))
    }

    fn assemble(arena: Arena, root: NodeId) -> Self {
        Self::assemble_shared(Arc::new(arena), root)
    }

    fn assemble_shared(arena: Arc<Arena>, root: NodeId) -> Self {
        Self {
            arena,
            root,
            version: 0,
            next_sequence: 0,
            views: ViewRegistry::default(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Incremented by every execute, undo and redo
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Copies the arena first if a snapshot still shares it
    pub(crate) fn arena_mut(&mut self) -> &mut Arena {
        Arc::make_mut(&mut self.arena)
    }

    pub(crate) fn bump_version(&mut self) {
        self.version += 1;
    }

    pub fn tree(&self) -> TreeRef<'_> {
        TreeRef {
            arena: &self.arena,
            root: self.root,
        }
    }

    pub fn node(&self, id: NodeId) -> EditorResult<&Node> {
        Ok(self.arena.get(id)?)
    }

    pub fn children(&self, id: NodeId) -> EditorResult<&[NodeId]> {
        Ok(self.arena.children(id)?)
    }

    pub fn parent(&self, id: NodeId) -> EditorResult<Option<NodeId>> {
        Ok(self.arena.parent(id)?)
    }

    /// Whether `id` is reachable from the document root
    pub fn is_attached(&self, id: NodeId) -> bool {
        self.arena
            .top_of(id)
            .map(|top| top == self.root)
            .unwrap_or(false)
    }

    /// The first element child of the root
    pub fn document_element(&self) -> Option<NodeId> {
        self.arena
            .children(self.root)
            .ok()?
            .iter()
            .copied()
            .find(|id| self.arena.get(*id).map(Node::is_element).unwrap_or(false))
    }

    /// First element named `name` in document order
    pub fn find_element(&self, name: &str) -> Option<NodeId> {
        self.arena
            .descendants(self.root)
            .find(|id| {
                self.arena
                    .get(*id)
                    .ok()
                    .and_then(Node::as_element)
                    .map(|element| element.name == name)
                    .unwrap_or(false)
            })
    }

    pub fn text_content(&self, id: NodeId) -> EditorResult<String> {
        Ok(self.arena.text_content(id)?)
    }

    /// Nodes still held in the arena but unreachable from the root. These
    /// are kept alive by undo/redo history and nothing else.
    pub fn detached_count(&self) -> usize {
        self.arena.len() - self.arena.descendants(self.root).count()
    }

    pub fn register_view(&mut self, view: SharedView) -> ViewId {
        let id = self.views.register(view);
        tracing::debug!(view = %id, "view registered");
        id
    }

    pub fn unregister_view(&mut self, id: ViewId) -> bool {
        self.views.unregister(id)
    }

    pub fn view_ids(&self) -> Vec<ViewId> {
        self.views.ids()
    }

    pub(crate) fn take_views(&mut self) -> ViewRegistry {
        std::mem::take(&mut self.views)
    }

    pub(crate) fn adopt_views(&mut self, views: ViewRegistry) {
        self.views = views;
    }

    /// Stamp sequence numbers and deliver events to every view, in
    /// registration order, after the transition has fully applied.
    pub(crate) fn publish(&mut self, mut events: Vec<ChangeEvent>) {
        if events.is_empty() {
            return;
        }
        for event in &mut events {
            self.next_sequence += 1;
            event.sequence = self.next_sequence;
        }

        let views = std::mem::take(&mut self.views);
        views.dispatch(self, &events);
        self.views = views;
    }

    pub(crate) fn publish_advisory(&mut self, event: &AdvisoryEvent) {
        let views = std::mem::take(&mut self.views);
        views.dispatch_advisory(self, event);
        self.views = views;
    }

    /// Identity-preserving structural dump, used to compare documents
    pub fn structure(&self) -> StructuralNode {
        StructuralNode::build(&self.arena, self.root)
    }

    /// Immutable, thread-safe view for background work. Shares the arena
    /// in O(1); the document's next edit while the snapshot is alive pays
    /// for one O(n) copy.
    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            arena: Arc::clone(&self.arena),
            root: self.root,
            version: self.version,
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("root", &self.root)
            .field("version", &self.version)
            .field("nodes", &self.arena.len())
            .field("views", &self.views.len())
            .finish()
    }
}

/// Borrowed, read-only view of a tree: what services consume.
#[derive(Debug, Clone, Copy)]
pub struct TreeRef<'a> {
    arena: &'a Arena,
    root: NodeId,
}

impl<'a> TreeRef<'a> {
    pub fn new(arena: &'a Arena, root: NodeId) -> Self {
        Self { arena, root }
    }

    pub fn arena(&self) -> &'a Arena {
        self.arena
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&'a Node> {
        self.arena.get(id).ok()
    }

    pub fn children(&self, id: NodeId) -> &'a [NodeId] {
        self.arena.children(id).unwrap_or(&[])
    }
}

#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    arena: Arc<Arena>,
    root: NodeId,
    version: u64,
}

impl DocumentSnapshot {
    pub fn tree(&self) -> TreeRef<'_> {
        TreeRef::new(&self.arena, self.root)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn to_document(&self) -> Document {
        Document::assemble_shared(Arc::clone(&self.arena), self.root)
    }
}

/// Node-for-node description of a subtree, ids included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralNode {
    pub id: NodeId,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<(String, String)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<StructuralNode>,
}

impl StructuralNode {
    fn build(arena: &Arena, id: NodeId) -> Self {
        let Ok(node) = arena.get(id) else {
            return Self {
                id,
                kind: "missing".to_string(),
                name: None,
                attributes: Vec::new(),
                text: None,
                children: Vec::new(),
            };
        };

        let attributes = node
            .as_element()
            .map(|element| {
                element
                    .attributes
                    .iter()
                    .map(|attr| (attr.name.clone(), attr.value.clone()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id,
            kind: node.kind_name().to_string(),
            name: node.name().map(str::to_string),
            attributes,
            text: node.text().map(str::to_string),
            children: node
                .children()
                .iter()
                .map(|child| Self::build(arena, *child))
                .collect(),
        }
    }

    /// Number of nodes in this subtree
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(StructuralNode::count).sum::<usize>()
    }
}
