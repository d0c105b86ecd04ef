//! Pluggable services the editor consumes but does not implement: reading
//! and writing documents, schema lookups, and validation.

use crate::document::{Document, TreeRef};
use crate::EditorResult;
use arbor_model::NodeId;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::ops::ControlFlow;

/// Progress report for long-running parses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseProgress {
    pub bytes_read: usize,
    pub total_bytes: Option<usize>,
    pub nodes: usize,
}

pub trait SerializationService: Send + Sync {
    fn parse(&self, bytes: &[u8]) -> EditorResult<Document>;

    fn serialize(&self, tree: TreeRef<'_>) -> EditorResult<Vec<u8>>;

    /// Parse from a reader, reporting progress as it goes. Returning
    /// `ControlFlow::Break` from `progress` cancels with `EditorError::Cancelled`.
    fn parse_streaming(
        &self,
        reader: &mut dyn Read,
        progress: &mut dyn FnMut(ParseProgress) -> ControlFlow<()>,
    ) -> EditorResult<Document> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let report = ParseProgress {
            bytes_read: bytes.len(),
            total_bytes: Some(bytes.len()),
            nodes: 0,
        };
        if progress(report).is_break() {
            return Err(crate::EditorError::Cancelled);
        }
        self.parse(&bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum ValueConstraint {
    Enumeration(Vec<String>),
    Pattern(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDecl {
    pub name: String,
    #[serde(default)]
    pub declared_type: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub constraint: Option<ValueConstraint>,
}

/// What a schema knows about one node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaInfo {
    pub declared_type: Option<String>,
    #[serde(default)]
    pub attributes: Vec<AttributeDecl>,
    /// Element names allowed as children
    #[serde(default)]
    pub children: Vec<String>,
}

impl SchemaInfo {
    pub fn attribute(&self, name: &str) -> Option<&AttributeDecl> {
        self.attributes.iter().find(|decl| decl.name == name)
    }
}

pub trait SchemaService: Send + Sync {
    fn describe(&self, tree: TreeRef<'_>, node: NodeId) -> Option<SchemaInfo>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub node: Option<NodeId>,
    /// Byte offset in the serialized form, when known
    pub offset: Option<usize>,
    pub message: String,
    pub severity: Severity,
}

impl Diagnostic {
    pub fn error(node: Option<NodeId>, message: impl Into<String>) -> Self {
        Self {
            node,
            offset: None,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(node: Option<NodeId>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(node, message)
        }
    }
}

pub trait ValidationService: Send + Sync {
    fn validate(&self, tree: TreeRef<'_>) -> Vec<Diagnostic>;
}
