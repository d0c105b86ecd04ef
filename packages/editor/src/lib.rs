//! # Arbor Editor
//!
//! Editing core for tree-structured documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ model: arena of nodes addressed by NodeId   │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ editor: Document + CommandManager           │
//! │  - Validate and apply commands atomically   │
//! │  - Bounded undo/redo with merging           │
//! │  - Ordered change events to views           │
//! │  - Debounced background validation/saving   │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ views: outline, grid, text source ...       │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Document is the source of truth**: every view is derived from it
//! 2. **Commands are the only way in**: views never mutate nodes directly
//! 3. **Events after the fact**: a transition publishes once it fully applied
//! 4. **Identity survives undo**: nodes keep their ids across undo/redo
//!
//! ## Usage
//!
//! ```rust,ignore
//! use arbor_editor::{Command, CommandManager, Document};
//! use arbor_model::Fragment;
//!
//! let doc = Document::from_fragment(&Fragment::element("catalog"));
//! let catalog = doc.document_element().unwrap();
//! let mut manager = CommandManager::new(doc);
//!
//! manager.execute(Command::AddChild {
//!     parent: catalog,
//!     index: None,
//!     fragment: Fragment::element("book").attr("id", "b1"),
//! })?;
//!
//! manager.undo();
//! manager.redo();
//! ```

pub mod background;
pub mod command;
pub mod config;
pub mod document;
pub mod errors;
pub mod events;
mod history;
pub mod lane;
pub mod manager;
pub mod outline;
pub mod services;
mod step;
pub mod view;

pub use background::{BackgroundScheduler, DerivedJob, JobKind};
pub use command::{is_valid_name, Command};
pub use config::{EditorConfig, DEFAULT_CONFIG_NAME};
pub use document::{Document, DocumentSnapshot, StructuralNode, TreeRef};
pub use errors::{EditorError, EditorResult};
pub use events::{
    AdvisoryEvent, AdvisoryOutcome, ChangeCategory, ChangeEvent, ChangeKind, Phase, ViewId,
};
pub use lane::{EditLane, Intent, IntentOutcome, IntentSender};
pub use manager::{CommandManager, ExecuteOutcome};
pub use outline::{OutlineEntry, OutlineView};
pub use services::{
    AttributeDecl, Diagnostic, ParseProgress, SchemaInfo, SchemaService, SerializationService,
    Severity, ValidationService, ValueConstraint,
};
pub use view::{Reanchor, SelectionAnchor, SharedView, View, ViewRegistry};
