//! `SerializationService` backed by the markup reader and writer

use crate::parser::{build_document, Parser};
use crate::serializer::Serializer;
use arbor_editor::{
    Document, EditorError, EditorResult, ParseProgress, SerializationService, TreeRef,
};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::ops::ControlFlow;
use tracing::{debug, instrument};

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkupOptions {
    /// Pretty-print with this many spaces per level; compact when unset
    #[serde(default)]
    pub indent: Option<usize>,

    /// Keep whitespace-only text between elements when reading
    #[serde(default)]
    pub keep_whitespace: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MarkupService {
    options: MarkupOptions,
}

impl MarkupService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: MarkupOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &MarkupOptions {
        &self.options
    }

    fn serializer(&self) -> Serializer {
        match self.options.indent {
            Some(width) => Serializer::pretty(width),
            None => Serializer::new(),
        }
    }

    fn parse_str(
        &self,
        source: &str,
        progress: &mut dyn FnMut(usize) -> ControlFlow<()>,
    ) -> EditorResult<Document> {
        let mut parser = Parser::new(source)?.keep_whitespace(self.options.keep_whitespace);
        let nodes = parser.parse_nodes_with(progress)?;
        Ok(build_document(nodes, parser.nodes())?)
    }
}

fn utf8(bytes: &[u8]) -> EditorResult<&str> {
    std::str::from_utf8(bytes)
        .map_err(|err| EditorError::Serialization(format!("input is not UTF-8: {}", err)))
}

impl SerializationService for MarkupService {
    #[instrument(level = "debug", skip_all, fields(bytes = bytes.len()))]
    fn parse(&self, bytes: &[u8]) -> EditorResult<Document> {
        self.parse_str(utf8(bytes)?, &mut |_| ControlFlow::Continue(()))
    }

    fn serialize(&self, tree: TreeRef<'_>) -> EditorResult<Vec<u8>> {
        Ok(self.serializer().serialize(tree).into_bytes())
    }

    /// Reads in chunks, reporting bytes as they arrive, then node counts
    /// while the tree is built.
    fn parse_streaming(
        &self,
        reader: &mut dyn Read,
        progress: &mut dyn FnMut(ParseProgress) -> ControlFlow<()>,
    ) -> EditorResult<Document> {
        let mut bytes = Vec::new();
        let mut chunk = vec![0; CHUNK_SIZE];
        loop {
            let read = reader.read(&mut chunk)?;
            if read == 0 {
                break;
            }
            bytes.extend_from_slice(&chunk[..read]);
            let report = ParseProgress {
                bytes_read: bytes.len(),
                total_bytes: None,
                nodes: 0,
            };
            if progress(report).is_break() {
                debug!(bytes = bytes.len(), "parse cancelled while reading");
                return Err(EditorError::Cancelled);
            }
        }

        let total = bytes.len();
        let source = utf8(&bytes)?;
        self.parse_str(source, &mut |nodes| {
            progress(ParseProgress {
                bytes_read: total,
                total_bytes: Some(total),
                nodes,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_json() {
        let options: MarkupOptions = serde_json::from_str(r#"{"indent": 4}"#).unwrap();
        assert_eq!(options.indent, Some(4));
        assert!(!options.keep_whitespace);
    }

    #[test]
    fn test_invalid_utf8_is_a_serialization_error() {
        let err = MarkupService::new().parse(&[b'<', 0xff, b'/', b'>']).unwrap_err();
        assert!(matches!(err, EditorError::Serialization(message) if message.contains("UTF-8")));
    }

    #[test]
    fn test_pretty_option() {
        let service = MarkupService::with_options(MarkupOptions {
            indent: Some(1),
            keep_whitespace: false,
        });
        let doc = service.parse(b"<a><b/></a>").unwrap();
        assert_eq!(service.serialize(doc.tree()).unwrap(), b"<a>\n <b/>\n</a>");
    }
}
