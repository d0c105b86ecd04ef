use crate::entities::decode;
use crate::error::{ParseError, ParseResult, TokenSpan};
use crate::lexer::{lex, SpannedToken, Token};
use arbor_editor::{is_valid_name, Document};
use arbor_model::{Arena, Attributes, Fragment, NodeKind};
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Nodes between progress reports
pub const PROGRESS_INTERVAL: usize = 1024;

/// An element whose end tag has not been seen yet
struct Frame {
    name: String,
    attributes: Attributes,
    children: Vec<Fragment>,
    span: TokenSpan,
}

impl Frame {
    fn into_fragment(self, keep_whitespace: bool) -> Fragment {
        let mut children = self.children;
        // Line breaks and indentation between markup children are layout;
        // inline whitespace and anything in mixed content is kept
        if !keep_whitespace && is_element_only(&children) {
            children.retain(|child| !is_layout_text(child));
        }
        Fragment::Element {
            name: self.name,
            attributes: self.attributes,
            children,
        }
    }
}

fn is_blank_text(fragment: &Fragment) -> bool {
    matches!(fragment, Fragment::Text { text } if text.trim().is_empty())
}

fn is_layout_text(fragment: &Fragment) -> bool {
    matches!(fragment, Fragment::Text { text } if text.trim().is_empty() && text.contains('\n'))
}

/// Holds markup (elements, comments, instructions) and no text other
/// than whitespace
fn is_element_only(children: &[Fragment]) -> bool {
    children
        .iter()
        .any(|child| !matches!(child, Fragment::Text { .. }))
        && children.iter().all(|child| match child {
            Fragment::Text { text } => text.trim().is_empty(),
            Fragment::CData { .. } => false,
            _ => true,
        })
}

/// Parser for the markup subset. Works on an explicit element stack, so
/// nesting depth is limited by memory rather than the call stack.
pub struct Parser<'src> {
    tokens: Vec<SpannedToken<'src>>,
    pos: usize,
    nodes: usize,
    keep_whitespace: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> ParseResult<Self> {
        Ok(Self {
            tokens: lex(source)?,
            pos: 0,
            nodes: 0,
            keep_whitespace: false,
            cancel: None,
        })
    }

    /// Keep whitespace-only text between elements
    pub fn keep_whitespace(mut self, keep: bool) -> Self {
        self.keep_whitespace = keep;
        self
    }

    /// Stop with `ParseError::Cancelled` once `flag` is set
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Nodes produced so far
    pub fn nodes(&self) -> usize {
        self.nodes
    }

    /// Parse a sequence of top-level nodes
    pub fn parse_nodes(&mut self) -> ParseResult<Vec<Fragment>> {
        self.parse_nodes_with(&mut |_| ControlFlow::Continue(()))
    }

    /// Like `parse_nodes`, calling `progress` with the node count every
    /// `PROGRESS_INTERVAL` nodes and once at the end. `Break` cancels.
    pub fn parse_nodes_with(
        &mut self,
        progress: &mut dyn FnMut(usize) -> ControlFlow<()>,
    ) -> ParseResult<Vec<Fragment>> {
        let mut top = Vec::new();
        let mut stack: Vec<Frame> = Vec::new();

        while let Some(SpannedToken { token, span }) = self.advance() {
            let node = match token {
                Token::Open => {
                    self.check_cancelled()?;
                    let (frame, empty) = self.open_tag(span)?;
                    if empty {
                        Some(frame.into_fragment(self.keep_whitespace))
                    } else {
                        stack.push(frame);
                        None
                    }
                }
                Token::CloseOpen => {
                    let name = self.expect_name()?;
                    self.expect_tag_end(&name)?;
                    let Some(frame) = stack.pop() else {
                        return Err(ParseError::invalid_syntax(
                            span,
                            format!("</{}> has no matching start tag", name),
                        ));
                    };
                    if frame.name != name {
                        return Err(ParseError::invalid_syntax(
                            span,
                            format!("expected </{}>, found </{}>", frame.name, name),
                        ));
                    }
                    Some(frame.into_fragment(self.keep_whitespace))
                }
                Token::Text(raw) => {
                    if stack.is_empty() {
                        if !raw.trim().is_empty() {
                            return Err(ParseError::invalid_syntax(
                                span,
                                "text outside the document element",
                            ));
                        }
                        None
                    } else {
                        let text = decode(raw)
                            .map_err(|message| ParseError::invalid_syntax(span, message))?;
                        Some(Fragment::text(text))
                    }
                }
                Token::Comment(text) => Some(Fragment::comment(text)),
                Token::CData(text) => Some(Fragment::cdata(text)),
                Token::Instruction(body) => {
                    let (target, data) = split_instruction(body);
                    if !is_valid_name(target) {
                        return Err(ParseError::invalid_syntax(
                            span,
                            format!("'{}' is not a valid instruction target", target),
                        ));
                    }
                    Some(Fragment::processing_instruction(target, data))
                }
                other => {
                    return Err(ParseError::unexpected_token(
                        span,
                        "markup or text",
                        other.to_string(),
                    ))
                }
            };

            let Some(node) = node else {
                continue;
            };
            self.nodes += 1;
            if self.nodes % PROGRESS_INTERVAL == 0 && progress(self.nodes).is_break() {
                return Err(ParseError::Cancelled);
            }
            match stack.last_mut() {
                Some(parent) => parent.children.push(node),
                None => top.push(node),
            }
        }

        if let Some(open) = stack.pop() {
            debug!(start = open.span.start, "input ended inside an element");
            return Err(ParseError::unexpected_eof(format!("</{}>", open.name)));
        }
        if progress(self.nodes).is_break() {
            return Err(ParseError::Cancelled);
        }
        Ok(top)
    }

    /// Name and attributes after `<`; true if the tag closed with `/>`
    fn open_tag(&mut self, start: TokenSpan) -> ParseResult<(Frame, bool)> {
        let name = self.expect_name()?;
        let mut attributes = Attributes::new();

        loop {
            let Some(SpannedToken { token, span }) = self.advance() else {
                return Err(ParseError::unexpected_eof(format!("end of <{}> tag", name)));
            };
            match token {
                Token::TagEnd | Token::EmptyTagEnd => {
                    let frame = Frame {
                        name,
                        attributes,
                        children: Vec::new(),
                        span: start,
                    };
                    return Ok((frame, token == Token::EmptyTagEnd));
                }
                Token::Name(attribute) => {
                    if !is_valid_name(attribute) {
                        return Err(ParseError::invalid_syntax(
                            span,
                            format!("'{}' is not a valid attribute name", attribute),
                        ));
                    }
                    self.expect(Token::Equals, "'='")?;
                    let (raw, value_span) = self.expect_value()?;
                    let value = decode(raw)
                        .map_err(|message| ParseError::invalid_syntax(value_span, message))?;
                    if attributes.get(attribute).is_some() {
                        return Err(ParseError::invalid_syntax(
                            span,
                            format!("duplicate attribute '{}'", attribute),
                        ));
                    }
                    attributes.set(attribute, value);
                }
                other => {
                    return Err(ParseError::unexpected_token(
                        span,
                        "attribute or '>'",
                        other.to_string(),
                    ))
                }
            }
        }
    }

    fn advance(&mut self) -> Option<SpannedToken<'src>> {
        let token = self.tokens.get(self.pos).copied();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token<'_>, description: &str) -> ParseResult<TokenSpan> {
        match self.advance() {
            Some(SpannedToken { token, span }) if token == expected => Ok(span),
            Some(SpannedToken { token, span }) => Err(ParseError::unexpected_token(
                span,
                description,
                token.to_string(),
            )),
            None => Err(ParseError::unexpected_eof(description)),
        }
    }

    fn expect_name(&mut self) -> ParseResult<String> {
        match self.advance() {
            Some(SpannedToken {
                token: Token::Name(name),
                span,
            }) => {
                if is_valid_name(name) {
                    Ok(name.to_string())
                } else {
                    Err(ParseError::invalid_syntax(
                        span,
                        format!("'{}' is not a valid element name", name),
                    ))
                }
            }
            Some(SpannedToken { token, span }) => Err(ParseError::unexpected_token(
                span,
                "element name",
                token.to_string(),
            )),
            None => Err(ParseError::unexpected_eof("element name")),
        }
    }

    fn expect_value(&mut self) -> ParseResult<(&'src str, TokenSpan)> {
        match self.advance() {
            Some(SpannedToken {
                token: Token::Value(value),
                span,
            }) => Ok((value, span)),
            Some(SpannedToken { token, span }) => Err(ParseError::unexpected_token(
                span,
                "quoted value",
                token.to_string(),
            )),
            None => Err(ParseError::unexpected_eof("quoted value")),
        }
    }

    fn expect_tag_end(&mut self, name: &str) -> ParseResult<()> {
        self.expect(Token::TagEnd, &format!("'>' to close </{}>", name))
            .map(|_| ())
    }

    fn check_cancelled(&self) -> ParseResult<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(ParseError::Cancelled),
            _ => Ok(()),
        }
    }
}

fn split_instruction(body: &str) -> (&str, &str) {
    let body = body.trim_end();
    match body.find(char::is_whitespace) {
        Some(at) => (&body[..at], body[at..].trim_start()),
        None => (body, ""),
    }
}

/// Parse a complete document with exactly one document element
#[instrument(level = "debug", skip_all, fields(bytes = source.len()))]
pub fn parse(source: &str) -> ParseResult<Document> {
    let mut parser = Parser::new(source)?;
    let nodes = parser.parse_nodes()?;
    build_document(nodes, parser.nodes())
}

/// Parse a document, reporting progress and honouring a cancel flag
pub fn parse_with_progress(
    source: &str,
    cancel: Option<Arc<AtomicBool>>,
    keep_whitespace: bool,
    progress: &mut dyn FnMut(usize) -> ControlFlow<()>,
) -> ParseResult<Document> {
    let mut parser = Parser::new(source)?.keep_whitespace(keep_whitespace);
    if let Some(flag) = cancel {
        parser = parser.with_cancel_flag(flag);
    }
    let nodes = parser.parse_nodes_with(progress)?;
    build_document(nodes, parser.nodes())
}

/// Parse a single element, for building commands from text
pub fn parse_fragment(source: &str) -> ParseResult<Fragment> {
    let nodes = Parser::new(source)?.parse_nodes()?;
    let mut elements = nodes.into_iter().filter(|node| !is_blank_text(node));
    match (elements.next(), elements.next()) {
        (Some(element @ Fragment::Element { .. }), None) => Ok(element),
        _ => Err(ParseError::invalid_syntax(
            TokenSpan {
                start: 0,
                end: source.len(),
            },
            "expected exactly one element",
        )),
    }
}

pub(crate) fn build_document(nodes: Vec<Fragment>, count: usize) -> ParseResult<Document> {
    let elements = nodes.iter().filter(|node| node.is_element()).count();
    if elements != 1 {
        return Err(ParseError::Build(format!(
            "expected one document element, found {}",
            elements
        )));
    }

    let mut arena = Arena::new();
    let root = arena.alloc(NodeKind::Document {
        children: Vec::new(),
    });
    for node in &nodes {
        let id = arena.materialize(node);
        arena
            .append_child(root, id)
            .map_err(|err| ParseError::Build(err.to_string()))?;
    }
    debug!(nodes = count, "document parsed");
    Document::from_arena(arena, root).map_err(|err| ParseError::Build(err.to_string()))
}
