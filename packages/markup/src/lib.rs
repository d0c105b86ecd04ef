//! # Arbor Markup
//!
//! Reference reader and writer for the markup the editor works on: elements
//! with ordered attributes, text, comments, CDATA sections and processing
//! instructions. Document type declarations are skipped on read.
//!
//! ```text
//! source ─lex─▶ tokens ─parse─▶ fragments ─materialize─▶ Document
//! TreeRef ─serialize─▶ text
//! ```
//!
//! `MarkupService` plugs both directions into the editor as a
//! `SerializationService`, with streaming progress and cancellation.

mod entities;
mod error;
mod lexer;
mod parser;
mod serializer;
mod service;

pub use entities::{decode, escape_attribute, escape_text};
pub use error::{format_error, ParseError, ParseResult, TokenSpan};
pub use lexer::{lex, SpannedToken, Token};
pub use parser::{parse, parse_fragment, parse_with_progress, Parser, PROGRESS_INTERVAL};
pub use serializer::{serialize, Serializer};
pub use service::{MarkupOptions, MarkupService};
