//! Row and cell edits. Nothing here touches the document: each operation
//! returns the command that performs it, to be run through the command
//! manager like any other edit.

use crate::column::Column;
use crate::error::{GridError, GridResult};
use crate::projection::GridProjection;
use arbor_editor::{Command, Document};
use arbor_model::{Fragment, NodeId};

impl GridProjection {
    /// Element a new row starts from: the row name with an empty child for
    /// every value column.
    pub fn row_template(&self) -> Fragment {
        self.columns()
            .iter()
            .filter_map(|column| match column {
                Column::Value(name) => Some(name),
                _ => None,
            })
            .fold(Fragment::element(self.key().name.as_str()), |row, name| {
                row.child(Fragment::element(name.as_str()))
            })
    }

    /// Insert a new row before row `before`, or after the last row.
    pub fn add_row(&self, doc: &Document, before: Option<usize>) -> GridResult<Command> {
        let index = match before {
            Some(before) => Some(self.child_index(doc, self.row_at(before)?)?),
            None => match self.rows().last() {
                Some(last) => Some(self.child_index(doc, *last)? + 1),
                None => None,
            },
        };
        Ok(Command::AddChild {
            parent: self.key().parent,
            index,
            fragment: self.row_template(),
        })
    }

    pub fn delete_row(&self, index: usize) -> GridResult<Command> {
        Ok(Command::DeleteNode {
            node: self.row_at(index)?,
        })
    }

    /// Copy a row to just after itself; `id_suffix` keeps `id` attributes
    /// unique.
    pub fn duplicate_row(&self, index: usize, id_suffix: Option<&str>) -> GridResult<Command> {
        Ok(Command::Duplicate {
            node: self.row_at(index)?,
            id_suffix: id_suffix.map(str::to_string),
        })
    }

    /// Move row `from` so that it ends up at row index `to`.
    pub fn move_row(&self, doc: &Document, from: usize, to: usize) -> GridResult<Command> {
        let node = self.row_at(from)?;
        let target = self.row_at(to)?;
        // Moving down lands after the target, moving up before it; with the
        // index counted after removal both are the target's current slot.
        Ok(Command::MoveNode {
            node,
            new_parent: self.key().parent,
            index: self.child_index(doc, target)?,
        })
    }

    pub fn set_cell(
        &self,
        index: usize,
        column: &Column,
        value: impl Into<String>,
    ) -> GridResult<Command> {
        let row = self.row_at(index)?;
        self.check_column(column)?;
        let value = value.into();

        match column {
            Column::Attribute(name) => Ok(Command::SetAttribute {
                node: row,
                name: name.clone(),
                value,
            }),
            Column::Value(name) => match self.shape(index).and_then(|shape| shape.child(name)) {
                Some(child) => Ok(Command::SetText {
                    node: child.first,
                    text: value,
                }),
                None => Ok(Command::AddChild {
                    parent: row,
                    index: None,
                    fragment: Fragment::leaf(name.as_str(), value),
                }),
            },
            Column::RowNumber | Column::Marker(_) => {
                Err(GridError::ReadOnlyColumn(column.header()))
            }
        }
    }

    /// Remove an attribute, or empty a value cell
    pub fn clear_cell(&self, index: usize, column: &Column) -> GridResult<Command> {
        let row = self.row_at(index)?;
        self.check_column(column)?;

        match column {
            Column::Attribute(name) => Ok(Command::RemoveAttribute {
                node: row,
                name: name.clone(),
            }),
            Column::Value(name) => match self.shape(index).and_then(|shape| shape.child(name)) {
                Some(child) => Ok(Command::SetText {
                    node: child.first,
                    text: String::new(),
                }),
                None => Err(GridError::Editor(arbor_editor::EditorError::invalid(format!(
                    "row {} has no <{}> to clear",
                    index + 1,
                    name
                )))),
            },
            Column::RowNumber | Column::Marker(_) => {
                Err(GridError::ReadOnlyColumn(column.header()))
            }
        }
    }

    fn row_at(&self, index: usize) -> GridResult<NodeId> {
        self.row(index).ok_or(GridError::RowOutOfRange {
            index,
            len: self.row_count(),
        })
    }

    fn check_column(&self, column: &Column) -> GridResult<()> {
        match self.column_index(column) {
            Some(_) => Ok(()),
            None => Err(GridError::UnknownColumn(column.header())),
        }
    }

    fn child_index(&self, doc: &Document, row: NodeId) -> GridResult<usize> {
        doc.children(self.key().parent)?
            .iter()
            .position(|child| *child == row)
            .ok_or(GridError::DetachedRow(row))
    }
}
