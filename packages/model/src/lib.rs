//! # Arbor Model
//!
//! Value types for the document tree and the "physical" mutation primitives
//! that operate on them.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Arena: NodeId → Node (single owner)          │
//! │  - insert / remove / replace child at index  │
//! │  - set / insert / remove attribute           │
//! │  - set text, rename                          │
//! │  - clone_subtree, materialize(Fragment)      │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! Nodes never own each other. Children are listed by `NodeId` and every node
//! keeps a non-owning back-reference to its parent's id. Nothing in this crate
//! records history or emits notifications; the editor's commands are built on
//! top of these primitives.

mod arena;
mod error;
mod fragment;
mod id;
mod node;

pub use arena::{Arena, Descendants};
pub use error::{ModelError, ModelResult};
pub use fragment::Fragment;
pub use id::{IdGenerator, NodeId};
pub use node::{Attribute, Attributes, Element, Node, NodeKind};
