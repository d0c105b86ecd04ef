//! # Grid Engine
//!
//! Tracks projections and keeps them current as a registered view.
//!
//! ```text
//! change events ──▶ GridEngine ──▶ affected rows only ──▶ ProjectionUpdate ──▶ subscribers
//!                        │
//!                  shape changed? ──▶ re-derive columns from cached shapes
//! ```
//!
//! A projection is created on first request, and only if its parent has at
//! least two element children with the requested name. After that it stays
//! tracked until untracked or the document is reset, even if rows drop below
//! two.

use crate::column::Column;
use crate::error::{GridError, GridResult};
use crate::projection::{
    cell_of, ColumnAnnotation, GridProjection, ProjectionChange, ProjectionKey, ProjectionUpdate,
};
use crate::shape::RowShape;
use arbor_editor::{ChangeEvent, ChangeKind, Document, SchemaService, ValueConstraint, View};
use arbor_model::{Arena, NodeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, trace};

/// Element children a name needs before it can be projected
pub const QUALIFYING_ROWS: usize = 2;

pub type SubscriptionId = usize;

struct Subscriber {
    id: SubscriptionId,
    /// `None` listens to every projection
    key: Option<ProjectionKey>,
    callback: Box<dyn FnMut(&ProjectionUpdate)>,
}

pub struct GridEngine {
    projections: HashMap<ProjectionKey, GridProjection>,
    /// Tracked keys in the order they were first requested
    order: Vec<ProjectionKey>,
    by_parent: HashMap<NodeId, Vec<String>>,
    schema: Option<Arc<dyn SchemaService>>,
    subscribers: Vec<Subscriber>,
    next_subscription: SubscriptionId,
    pending: Vec<ProjectionUpdate>,
    /// Handed out for requests that do not qualify
    scratch: GridProjection,
    column_recomputations: usize,
}

impl Default for GridEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl GridEngine {
    pub fn new() -> Self {
        Self {
            projections: HashMap::new(),
            order: Vec::new(),
            by_parent: HashMap::new(),
            schema: None,
            subscribers: Vec::new(),
            next_subscription: 1,
            pending: Vec::new(),
            scratch: GridProjection::empty(ProjectionKey::new(NodeId::from_raw(0), "")),
            column_recomputations: 0,
        }
    }

    /// Annotate columns with declared types and enumerations
    pub fn with_schema(mut self, schema: Arc<dyn SchemaService>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Names of element children of `parent` that can be projected, in
    /// first-seen order
    pub fn qualifying_names(&self, doc: &Document, parent: NodeId) -> Vec<String> {
        name_counts(doc.arena(), parent)
            .into_iter()
            .filter(|(_, count)| *count >= QUALIFYING_ROWS)
            .map(|(name, _)| name)
            .collect()
    }

    /// The projection for `(parent, name)`, building and tracking it on first
    /// request. A name that does not qualify yields an empty projection that
    /// is not tracked.
    #[instrument(level = "debug", skip(self, doc, parent), fields(parent = %parent))]
    pub fn projection_for(
        &mut self,
        doc: &Document,
        parent: NodeId,
        name: &str,
    ) -> &GridProjection {
        let key = ProjectionKey::new(parent, name);
        if !self.projections.contains_key(&key) {
            let qualifies = doc.is_attached(parent)
                && name_counts(doc.arena(), parent)
                    .iter()
                    .any(|(n, count)| n == name && *count >= QUALIFYING_ROWS);
            if !qualifies {
                debug!("no repeating children, returning an empty projection");
                self.scratch = GridProjection::empty(key);
                return &self.scratch;
            }
            self.track(doc, key.clone());
        }
        self.projections.get(&key).unwrap_or(&self.scratch)
    }

    /// Projection for the name with the most rows; ties go to the name seen
    /// first.
    pub fn default_projection(
        &mut self,
        doc: &Document,
        parent: NodeId,
    ) -> Option<&GridProjection> {
        let mut best: Option<(String, usize)> = None;
        for (name, count) in name_counts(doc.arena(), parent) {
            let better = match &best {
                Some((_, top)) => count > *top,
                None => count >= QUALIFYING_ROWS,
            };
            if better {
                best = Some((name, count));
            }
        }
        let (name, _) = best?;
        Some(self.projection_for(doc, parent, &name))
    }

    pub fn projection(&self, key: &ProjectionKey) -> Option<&GridProjection> {
        self.projections.get(key)
    }

    /// Like `projection`, for callers that need an error
    pub fn tracked(&self, key: &ProjectionKey) -> GridResult<&GridProjection> {
        self.projections
            .get(key)
            .ok_or_else(|| GridError::NotTracked(key.clone()))
    }

    pub fn is_tracked(&self, key: &ProjectionKey) -> bool {
        self.projections.contains_key(key)
    }

    pub fn tracked_keys(&self) -> &[ProjectionKey] {
        &self.order
    }

    pub fn untrack(&mut self, key: &ProjectionKey) -> bool {
        if self.projections.remove(key).is_none() {
            return false;
        }
        self.order.retain(|k| k != key);
        if let Some(names) = self.by_parent.get_mut(&key.parent) {
            names.retain(|name| *name != key.name);
            if names.is_empty() {
                self.by_parent.remove(&key.parent);
            }
        }
        debug!(key = %key, "projection untracked");
        true
    }

    /// Receive updates for one projection, or for all of them with `None`
    pub fn subscribe(
        &mut self,
        key: Option<ProjectionKey>,
        callback: impl FnMut(&ProjectionUpdate) + 'static,
    ) -> SubscriptionId {
        let id = self.next_subscription;
        self.next_subscription += 1;
        self.subscribers.push(Subscriber {
            id,
            key,
            callback: Box::new(callback),
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|subscriber| subscriber.id != id);
        self.subscribers.len() != before
    }

    /// Times a column list was re-derived after tracking began
    pub fn column_recomputations(&self) -> usize {
        self.column_recomputations
    }

    fn track(&mut self, doc: &Document, key: ProjectionKey) {
        let mut projection = GridProjection::build(doc.arena(), key.clone());
        annotate(self.schema.as_deref(), doc, &mut projection);
        debug!(
            key = %key,
            rows = projection.row_count(),
            columns = projection.columns().len(),
            "projection tracked"
        );
        self.by_parent
            .entry(key.parent)
            .or_default()
            .push(key.name.clone());
        self.order.push(key.clone());
        self.projections.insert(key, projection);
    }

    fn keys_under(&self, parent: NodeId) -> Vec<ProjectionKey> {
        self.by_parent
            .get(&parent)
            .map(|names| {
                names
                    .iter()
                    .map(|name| ProjectionKey::new(parent, name.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn emit(&mut self, key: &ProjectionKey, change: ProjectionChange) {
        self.pending.push(ProjectionUpdate {
            key: key.clone(),
            change,
        });
    }

    fn apply(&mut self, doc: &Document, event: &ChangeEvent) {
        trace!(sequence = event.sequence, node = %event.node, "grid event");
        match &event.kind {
            ChangeKind::Reset => self.reset(doc),
            ChangeKind::Inserted { parent, .. } => {
                self.row_attached(doc, *parent, event.node);
                self.refresh_containing(doc, *parent);
            }
            ChangeKind::Removed { parent, .. } => {
                self.row_detached(doc, *parent, event.node);
                self.refresh_containing(doc, *parent);
            }
            ChangeKind::Moved {
                old_parent,
                new_parent,
                ..
            } => {
                if old_parent == new_parent {
                    self.row_reordered(doc, *new_parent, event.node);
                } else {
                    self.row_detached(doc, *old_parent, event.node);
                    self.row_attached(doc, *new_parent, event.node);
                    self.refresh_containing(doc, *old_parent);
                }
                self.refresh_containing(doc, *new_parent);
            }
            ChangeKind::Renamed { .. } => {
                if let Ok(Some(parent)) = doc.parent(event.node) {
                    self.row_detached(doc, parent, event.node);
                    self.row_attached(doc, parent, event.node);
                    self.refresh_containing(doc, parent);
                }
            }
            ChangeKind::Attribute { .. } | ChangeKind::Text => {
                self.refresh_containing(doc, event.node)
            }
        }
    }

    fn row_attached(&mut self, doc: &Document, parent: NodeId, node: NodeId) {
        if !self.by_parent.contains_key(&parent) {
            return;
        }
        // Events arrive after the whole transaction; the node may have moved on
        if doc.parent(node).ok().flatten() != Some(parent) {
            return;
        }
        let Some(name) = element_name(doc.arena(), node) else {
            return;
        };
        let key = ProjectionKey::new(parent, name);
        let Some(projection) = self.projections.get_mut(&key) else {
            return;
        };
        if projection.contains_row(node) {
            return;
        }

        let shape = RowShape::capture(doc.arena(), node);
        let covered = projection.covers(&shape);
        let index = projection.insertion_index(doc.arena(), node);
        // Column order is first-seen by row, so only a covered last row leaves it alone
        let appended = index == projection.row_count();
        projection.insert_row(index, node, shape);
        self.emit(&key, ProjectionChange::RowInserted { index, row: node });
        if !(covered && appended) {
            self.recompute_columns(doc, &key);
        }
    }

    fn row_detached(&mut self, doc: &Document, parent: NodeId, node: NodeId) {
        for key in self.keys_under(parent) {
            let Some(projection) = self.projections.get_mut(&key) else {
                continue;
            };
            let Some((index, _)) = projection.remove_row(node) else {
                continue;
            };
            self.emit(&key, ProjectionChange::RowRemoved { index, row: node });
            self.recompute_columns(doc, &key);
        }
    }

    fn row_reordered(&mut self, doc: &Document, parent: NodeId, node: NodeId) {
        for key in self.keys_under(parent) {
            let Some(projection) = self.projections.get_mut(&key) else {
                continue;
            };
            if let Some((from, to)) = projection.reposition(doc.arena(), node) {
                if from != to {
                    self.emit(&key, ProjectionChange::RowMoved { from, to, row: node });
                    self.recompute_columns(doc, &key);
                }
            }
        }
    }

    /// Recapture every tracked row that contains `start` (or is `start`).
    fn refresh_containing(&mut self, doc: &Document, start: NodeId) {
        let arena = doc.arena();
        let mut current = Some(start);
        while let Some(node) = current {
            let parent = arena.parent(node).ok().flatten();
            if let Some(parent) = parent {
                if self.by_parent.contains_key(&parent) {
                    self.refresh_row(doc, parent, node);
                }
            }
            current = parent;
        }
    }

    fn refresh_row(&mut self, doc: &Document, parent: NodeId, row: NodeId) {
        let Some(name) = element_name(doc.arena(), row) else {
            return;
        };
        let key = ProjectionKey::new(parent, name);
        let Some(projection) = self.projections.get_mut(&key) else {
            return;
        };
        let Some(index) = projection.row_of(row) else {
            return;
        };

        let shape = RowShape::capture(doc.arena(), row);
        let Some(old) = projection.replace_shape(row, shape.clone()) else {
            return;
        };
        if old == shape {
            return;
        }
        if !old.same_signature(&shape) {
            self.recompute_columns(doc, &key);
        }

        let Some(projection) = self.projections.get(&key) else {
            return;
        };
        let columns: Vec<usize> = projection
            .columns()
            .iter()
            .enumerate()
            .filter(|(_, column)| cell_of(&old, index, column) != cell_of(&shape, index, column))
            .map(|(i, _)| i)
            .collect();
        if !columns.is_empty() {
            self.emit(
                &key,
                ProjectionChange::CellsChanged {
                    index,
                    row,
                    columns,
                },
            );
        }
    }

    fn recompute_columns(&mut self, doc: &Document, key: &ProjectionKey) -> bool {
        let Some(projection) = self.projections.get_mut(key) else {
            return false;
        };
        self.column_recomputations += 1;
        if !projection.recompute_columns() {
            return false;
        }
        annotate(self.schema.as_deref(), doc, projection);
        debug!(key = %key, columns = projection.columns().len(), "columns changed");
        let columns = projection.columns().to_vec();
        self.emit(key, ProjectionChange::ColumnsChanged { columns });
        true
    }

    fn reset(&mut self, doc: &Document) {
        let keys = std::mem::take(&mut self.order);
        self.projections.clear();
        self.by_parent.clear();
        for key in keys {
            let container = doc
                .node(key.parent)
                .map(|node| node.is_container())
                .unwrap_or(false);
            if container && doc.is_attached(key.parent) {
                self.track(doc, key.clone());
            } else {
                debug!(key = %key, "projection dropped on reset");
            }
            self.emit(&key, ProjectionChange::Reset);
        }
    }

    fn flush(&mut self) {
        let updates = std::mem::take(&mut self.pending);
        for update in &updates {
            for subscriber in &mut self.subscribers {
                let wanted = subscriber
                    .key
                    .as_ref()
                    .map_or(true, |key| *key == update.key);
                if wanted {
                    (subscriber.callback)(update);
                }
            }
        }
    }
}

impl View for GridEngine {
    fn on_change(&mut self, doc: &Document, event: &ChangeEvent) {
        self.apply(doc, event);
        self.flush();
    }

    fn on_changes(&mut self, doc: &Document, events: &[ChangeEvent]) {
        if self.projections.is_empty() {
            return;
        }
        for event in events {
            self.apply(doc, event);
        }
        self.flush();
    }

    /// The grid is derived state; it must see edits made through it too.
    fn receives_own_changes(&self) -> bool {
        true
    }
}

impl fmt::Debug for GridEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GridEngine")
            .field("tracked", &self.order)
            .field("subscribers", &self.subscribers.len())
            .field("has_schema", &self.schema.is_some())
            .finish()
    }
}

fn element_name(arena: &Arena, node: NodeId) -> Option<String> {
    arena
        .get(node)
        .ok()
        .and_then(|n| n.as_element())
        .map(|element| element.name.clone())
}

/// Element child names of `parent` with their counts, first-seen order
fn name_counts(arena: &Arena, parent: NodeId) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for child in arena.children(parent).unwrap_or_default() {
        let Some(element) = arena.get(*child).ok().and_then(|n| n.as_element()) else {
            continue;
        };
        match counts.iter_mut().find(|(name, _)| *name == element.name) {
            Some((_, count)) => *count += 1,
            None => counts.push((element.name.clone(), 1)),
        }
    }
    counts
}

fn annotate(schema: Option<&dyn SchemaService>, doc: &Document, projection: &mut GridProjection) {
    let Some(schema) = schema else {
        return;
    };
    let Some(first) = projection.row(0) else {
        projection.set_annotations(HashMap::new());
        return;
    };
    let tree = doc.tree();
    let row_info = schema.describe(tree, first);

    let mut annotations = HashMap::new();
    for column in projection.columns() {
        let annotation = match column {
            Column::Attribute(name) => row_info
                .as_ref()
                .and_then(|info| info.attribute(name))
                .map(|decl| {
                    let (enumeration, pattern) = match &decl.constraint {
                        Some(ValueConstraint::Enumeration(values)) => (values.clone(), None),
                        Some(ValueConstraint::Pattern(pattern)) => {
                            (Vec::new(), Some(pattern.clone()))
                        }
                        None => (Vec::new(), None),
                    };
                    ColumnAnnotation {
                        declared_type: decl.declared_type.clone(),
                        required: decl.required,
                        enumeration,
                        pattern,
                    }
                }),
            Column::Value(name) => (0..projection.row_count())
                .find_map(|index| projection.shape(index)?.child(name))
                .and_then(|child| schema.describe(tree, child.first))
                .map(|info| ColumnAnnotation {
                    declared_type: info.declared_type,
                    ..ColumnAnnotation::default()
                }),
            Column::RowNumber | Column::Marker(_) => None,
        };
        if let Some(annotation) = annotation {
            annotations.insert(column.clone(), annotation);
        }
    }
    projection.set_annotations(annotations);
}
