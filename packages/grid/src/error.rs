use crate::ProjectionKey;
use arbor_editor::EditorError;
use arbor_model::NodeId;
use thiserror::Error;

pub type GridResult<T> = Result<T, GridError>;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("No tracked projection for {0}")]
    NotTracked(ProjectionKey),

    #[error("Row {index} out of range for {len} rows")]
    RowOutOfRange { index: usize, len: usize },

    #[error("Row {0} is no longer a child of the projected parent")]
    DetachedRow(NodeId),

    #[error("Column '{0}' is read-only")]
    ReadOnlyColumn(String),

    #[error("Column '{0}' is not part of the projection")]
    UnknownColumn(String),

    #[error("Editor error: {0}")]
    Editor(#[from] EditorError),
}
