//! Error types for the markup reader

use arbor_editor::EditorError;
use std::ops::Range;
use thiserror::Error;

pub type ParseResult<T> = Result<T, ParseError>;

/// Byte range in the source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpan {
    pub start: usize,
    pub end: usize,
}

impl From<Range<usize>> for TokenSpan {
    fn from(range: Range<usize>) -> Self {
        Self {
            start: range.start,
            end: range.end,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("Unexpected token at {span:?}: expected {expected}, found {found}")]
    UnexpectedToken {
        span: TokenSpan,
        expected: String,
        found: String,
    },

    #[error("Unexpected end of input: expected {expected}")]
    UnexpectedEof { expected: String },

    #[error("Invalid syntax at {span:?}: {message}")]
    InvalidSyntax { span: TokenSpan, message: String },

    #[error("Lexer error at {span:?}: {message}")]
    LexError { span: TokenSpan, message: String },

    #[error("Parse cancelled")]
    Cancelled,

    #[error("Failed to build document: {0}")]
    Build(String),
}

impl ParseError {
    pub fn unexpected_token(
        span: TokenSpan,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::UnexpectedToken {
            span,
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn unexpected_eof(expected: impl Into<String>) -> Self {
        Self::UnexpectedEof {
            expected: expected.into(),
        }
    }

    pub fn invalid_syntax(span: TokenSpan, message: impl Into<String>) -> Self {
        Self::InvalidSyntax {
            span,
            message: message.into(),
        }
    }

    pub fn lex_error(span: TokenSpan, message: impl Into<String>) -> Self {
        Self::LexError {
            span,
            message: message.into(),
        }
    }

    pub fn span(&self) -> Option<TokenSpan> {
        match self {
            ParseError::UnexpectedToken { span, .. }
            | ParseError::InvalidSyntax { span, .. }
            | ParseError::LexError { span, .. } => Some(*span),
            ParseError::UnexpectedEof { .. } | ParseError::Cancelled | ParseError::Build(_) => None,
        }
    }
}

impl From<ParseError> for EditorError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Cancelled => EditorError::Cancelled,
            other => EditorError::Serialization(other.to_string()),
        }
    }
}

/// Render an error against its source with ariadne
#[cfg(feature = "pretty-errors")]
pub fn format_error(source: &str, filename: &str, error: &ParseError) -> String {
    use ariadne::{Color, Label, Report, ReportKind, Source};

    let span = error.span().unwrap_or(TokenSpan {
        start: source.len().saturating_sub(1),
        end: source.len(),
    });
    let label = match error {
        ParseError::UnexpectedToken { expected, .. } | ParseError::UnexpectedEof { expected } => {
            format!("expected {}", expected)
        }
        ParseError::InvalidSyntax { message, .. } | ParseError::LexError { message, .. } => {
            message.clone()
        }
        ParseError::Cancelled | ParseError::Build(_) => error.to_string(),
    };

    let report = Report::build(ReportKind::Error, filename, span.start)
        .with_message(error.to_string())
        .with_label(
            Label::new((filename, span.start..span.end))
                .with_color(Color::Red)
                .with_message(label),
        )
        .finish();

    let mut output = Vec::new();
    if report
        .write((filename, Source::from(source)), &mut output)
        .is_err()
    {
        return error.to_string();
    }
    String::from_utf8(output).unwrap_or_else(|_| error.to_string())
}

#[cfg(not(feature = "pretty-errors"))]
pub fn format_error(_source: &str, filename: &str, error: &ParseError) -> String {
    format!("{}: {}", filename, error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_maps_to_editor_cancelled() {
        assert!(matches!(
            EditorError::from(ParseError::Cancelled),
            EditorError::Cancelled
        ));
        assert!(matches!(
            EditorError::from(ParseError::unexpected_eof("'>'")),
            EditorError::Serialization(message) if message.contains("'>'")
        ));
    }

    #[cfg(feature = "pretty-errors")]
    #[test]
    fn test_format_error_mentions_message() {
        let source = "<a></b>";
        let error = ParseError::invalid_syntax(TokenSpan { start: 3, end: 5 }, "expected </a>");
        let report = format_error(source, "input.xml", &error);
        assert!(report.contains("expected </a>"));
    }
}
