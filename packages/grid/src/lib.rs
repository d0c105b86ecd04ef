//! # Arbor Grid
//!
//! Tabular projections of repeating children. Given a parent and an element
//! name shared by at least two of its children, the engine derives rows (the
//! children, by `NodeId`) and columns:
//!
//! ```text
//! # │ @attr … (first seen) │ scalar child … │ complex child (marker) …
//! ```
//!
//! The engine is an ordinary view of the document. Change events update only
//! the rows they touch, and the column list is re-derived from cached row
//! shapes when a shape changes. Row and cell edits come back as editor
//! commands, so they are undoable like any other edit.

mod column;
mod engine;
mod error;
mod projection;
mod rows;
mod shape;

pub use column::Column;
pub use engine::{GridEngine, SubscriptionId, QUALIFYING_ROWS};
pub use error::{GridError, GridResult};
pub use projection::{
    Cell, ColumnAnnotation, GridProjection, ProjectionChange, ProjectionKey, ProjectionUpdate,
};
pub use shape::{ChildSummary, RowShape};
