use crate::column::{derive_columns, Column};
use crate::shape::RowShape;
use arbor_model::{Arena, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identifies a projection: the parent whose children form the rows, and the
/// element name those children share.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionKey {
    pub parent: NodeId,
    pub name: String,
}

impl ProjectionKey {
    pub fn new(parent: NodeId, name: impl Into<String>) -> Self {
        Self {
            parent,
            name: name.into(),
        }
    }
}

impl fmt::Display for ProjectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.parent, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Cell {
    /// 1-based row number
    RowNumber { number: usize },
    Value { text: String },
    /// The row has no such attribute or child
    Unset,
    /// Complex child; `count` occurrences in this row
    Marker { count: usize },
}

impl Cell {
    pub fn text(&self) -> Option<&str> {
        match self {
            Cell::Value { text } => Some(text),
            _ => None,
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Cell::Unset)
    }
}

pub(crate) fn cell_of(shape: &RowShape, index: usize, column: &Column) -> Cell {
    match column {
        Column::RowNumber => Cell::RowNumber { number: index + 1 },
        Column::Attribute(name) => match shape.attribute(name) {
            Some(value) => Cell::Value {
                text: value.to_string(),
            },
            None => Cell::Unset,
        },
        Column::Value(name) => match shape.child(name) {
            Some(child) => Cell::Value {
                text: child.text.clone(),
            },
            None => Cell::Unset,
        },
        Column::Marker(name) => match shape.child(name) {
            Some(child) => Cell::Marker { count: child.count },
            None => Cell::Unset,
        },
    }
}

/// Hints from the schema service for one column
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnAnnotation {
    pub declared_type: Option<String>,
    pub required: bool,
    /// Allowed values, when the schema enumerates them
    pub enumeration: Vec<String>,
    pub pattern: Option<String>,
}

/// An incremental change to one projection, delivered to subscribers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionUpdate {
    pub key: ProjectionKey,
    pub change: ProjectionChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProjectionChange {
    RowInserted { index: usize, row: NodeId },
    RowRemoved { index: usize, row: NodeId },
    RowMoved { from: usize, to: usize, row: NodeId },
    /// Cells of one row changed; `columns` are indices into the column list
    CellsChanged {
        index: usize,
        row: NodeId,
        columns: Vec<usize>,
    },
    ColumnsChanged { columns: Vec<Column> },
    /// Rebuilt from scratch
    Reset,
}

/// Tabular view of the children of one parent that share an element name.
///
/// Rows are held by `NodeId` in document order; each row's shape is cached
/// so cells and columns never need a tree walk, and each row's index is
/// kept in a map so lookups by node are constant time.
#[derive(Debug, Clone)]
pub struct GridProjection {
    key: ProjectionKey,
    columns: Vec<Column>,
    rows: Vec<NodeId>,
    positions: HashMap<NodeId, usize>,
    shapes: HashMap<NodeId, RowShape>,
    annotations: HashMap<Column, ColumnAnnotation>,
}

impl GridProjection {
    /// A projection with no rows and only the row-number column
    pub fn empty(key: ProjectionKey) -> Self {
        Self {
            key,
            columns: vec![Column::RowNumber],
            rows: Vec::new(),
            positions: HashMap::new(),
            shapes: HashMap::new(),
            annotations: HashMap::new(),
        }
    }

    pub(crate) fn build(arena: &Arena, key: ProjectionKey) -> Self {
        let mut projection = Self::empty(key);
        let children = arena.children(projection.key.parent).unwrap_or_default();
        for child in children {
            let matches = arena
                .get(*child)
                .ok()
                .and_then(|node| node.as_element())
                .map(|element| element.name == projection.key.name)
                .unwrap_or(false);
            if matches {
                projection.positions.insert(*child, projection.rows.len());
                projection.rows.push(*child);
                projection
                    .shapes
                    .insert(*child, RowShape::capture(arena, *child));
            }
        }
        projection.recompute_columns();
        projection
    }

    pub fn key(&self) -> &ProjectionKey {
        &self.key
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[NodeId] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn headers(&self) -> Vec<String> {
        self.columns.iter().map(Column::header).collect()
    }

    pub fn column_index(&self, column: &Column) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn row(&self, index: usize) -> Option<NodeId> {
        self.rows.get(index).copied()
    }

    pub fn row_of(&self, node: NodeId) -> Option<usize> {
        self.positions.get(&node).copied()
    }

    pub fn contains_row(&self, node: NodeId) -> bool {
        self.shapes.contains_key(&node)
    }

    pub fn shape(&self, index: usize) -> Option<&RowShape> {
        self.rows.get(index).and_then(|row| self.shapes.get(row))
    }

    pub fn cell(&self, index: usize, column: &Column) -> Option<Cell> {
        self.shape(index).map(|shape| cell_of(shape, index, column))
    }

    /// All cells of one row, in column order
    pub fn row_cells(&self, index: usize) -> Option<Vec<Cell>> {
        let shape = self.shape(index)?;
        Some(
            self.columns
                .iter()
                .map(|column| cell_of(shape, index, column))
                .collect(),
        )
    }

    pub fn annotation(&self, column: &Column) -> Option<&ColumnAnnotation> {
        self.annotations.get(column)
    }

    pub(crate) fn set_annotations(&mut self, annotations: HashMap<Column, ColumnAnnotation>) {
        self.annotations = annotations;
    }

    /// Whether the columns already account for everything in `shape`
    pub(crate) fn covers(&self, shape: &RowShape) -> bool {
        let attributes_known = shape
            .attributes
            .iter()
            .all(|(name, _)| self.columns.contains(&Column::Attribute(name.clone())));
        let children_known = shape.children.iter().all(|child| {
            if child.complex {
                self.columns.contains(&Column::Marker(child.name.clone()))
            } else {
                self.columns.contains(&Column::Value(child.name.clone()))
            }
        });
        attributes_known && children_known
    }

    /// Re-derive columns from the cached shapes. Returns true if they changed.
    pub(crate) fn recompute_columns(&mut self) -> bool {
        let columns = derive_columns(self.rows.iter().filter_map(|row| self.shapes.get(row)));
        if columns == self.columns {
            return false;
        }
        self.columns = columns;
        true
    }

    pub(crate) fn insert_row(&mut self, index: usize, row: NodeId, shape: RowShape) {
        self.rows.insert(index, row);
        self.shapes.insert(row, shape);
        self.reindex(index);
    }

    pub(crate) fn remove_row(&mut self, row: NodeId) -> Option<(usize, RowShape)> {
        let index = self.positions.remove(&row)?;
        let shape = self.shapes.remove(&row)?;
        self.rows.remove(index);
        self.reindex(index);
        Some((index, shape))
    }

    /// Put `row` back in document order after its parent reordered children.
    /// Returns the old and new row index.
    pub(crate) fn reposition(&mut self, arena: &Arena, row: NodeId) -> Option<(usize, usize)> {
        let from = self.positions.remove(&row)?;
        self.rows.remove(from);
        self.reindex(from);
        let to = self.insertion_index(arena, row);
        self.rows.insert(to, row);
        self.reindex(to);
        Some((from, to))
    }

    /// Refresh stored indexes from `from` to the end of the row list
    fn reindex(&mut self, from: usize) {
        for (index, row) in self.rows.iter().enumerate().skip(from) {
            self.positions.insert(*row, index);
        }
    }

    pub(crate) fn replace_shape(&mut self, row: NodeId, shape: RowShape) -> Option<RowShape> {
        self.shapes.insert(row, shape)
    }

    /// Where `row`, now a child of the parent, belongs in the row list:
    /// right after the last tracked row that precedes it among the siblings.
    pub(crate) fn insertion_index(&self, arena: &Arena, row: NodeId) -> usize {
        let siblings = arena.children(self.key.parent).unwrap_or_default();
        let Some(position) = siblings.iter().position(|id| *id == row) else {
            return self.rows.len();
        };
        siblings[..position]
            .iter()
            .rev()
            .find_map(|sibling| self.positions.get(sibling))
            .map(|index| index + 1)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_model::Fragment;

    fn table(arena: &mut Arena) -> NodeId {
        arena.materialize(
            &Fragment::element("t")
                .child(Fragment::element("p").attr("a", "1").child(Fragment::leaf("x", "1")))
                .child(Fragment::comment("between"))
                .child(Fragment::element("p").attr("b", "2").child(Fragment::leaf("x", "2")))
                .child(Fragment::element("q")),
        )
    }

    #[test]
    fn test_build_collects_matching_rows() {
        let mut arena = Arena::new();
        let parent = table(&mut arena);
        let projection = GridProjection::build(&arena, ProjectionKey::new(parent, "p"));

        assert_eq!(projection.row_count(), 2);
        assert_eq!(projection.headers(), vec!["#", "@a", "@b", "x"]);
        assert_eq!(
            projection.cell(0, &Column::Attribute("b".into())),
            Some(Cell::Unset)
        );
        assert_eq!(
            projection.cell(1, &Column::RowNumber),
            Some(Cell::RowNumber { number: 2 })
        );
        assert_eq!(projection.cell(2, &Column::RowNumber), None);
    }

    #[test]
    fn test_insertion_index_skips_other_siblings() {
        let mut arena = Arena::new();
        let parent = table(&mut arena);
        let mut projection = GridProjection::build(&arena, ProjectionKey::new(parent, "p"));

        let late = arena.materialize(&Fragment::element("p"));
        arena.append_child(parent, late).unwrap();
        assert_eq!(projection.insertion_index(&arena, late), 2);

        let early = arena.materialize(&Fragment::element("p"));
        arena.insert_child(parent, 0, early).unwrap();
        assert_eq!(projection.insertion_index(&arena, early), 0);

        projection.insert_row(0, early, RowShape::default());
        assert_eq!(projection.row_of(early), Some(0));
    }

    #[test]
    fn test_row_positions_follow_edits() {
        let mut arena = Arena::new();
        let parent = table(&mut arena);
        let mut projection = GridProjection::build(&arena, ProjectionKey::new(parent, "p"));
        let assert_positions = |projection: &GridProjection| {
            for (index, row) in projection.rows().iter().enumerate() {
                assert_eq!(projection.row_of(*row), Some(index));
            }
        };

        let first = arena.materialize(&Fragment::element("p"));
        arena.insert_child(parent, 0, first).unwrap();
        let index = projection.insertion_index(&arena, first);
        projection.insert_row(index, first, RowShape::default());
        assert_eq!(projection.row_of(first), Some(0));
        assert_positions(&projection);

        let second = projection.row(1).unwrap();
        assert_eq!(arena.remove_child(parent, 1).unwrap(), second);
        arena.append_child(parent, second).unwrap();
        assert_eq!(projection.reposition(&arena, second), Some((1, 2)));
        assert_positions(&projection);

        let (removed, _) = projection.remove_row(first).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(projection.row_of(first), None);
        assert_positions(&projection);
        assert_eq!(projection.rows().last(), Some(&second));
    }

    #[test]
    fn test_empty_projection() {
        let projection = GridProjection::empty(ProjectionKey::new(NodeId::from_raw(1), "row"));
        assert!(projection.is_empty());
        assert_eq!(projection.columns(), &[Column::RowNumber]);
        assert_eq!(projection.key().to_string(), format!("{}/row", NodeId::from_raw(1)));
    }
}
