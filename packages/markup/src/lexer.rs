//! Lexer for the markup subset, using logos
//!
//! Markup has two lexical contexts: content (text, comments, CDATA,
//! processing instructions) and the inside of a tag (names, `=`, quoted
//! values). The content lexer morphs into the tag lexer after `<` or `</` and
//! back again after `>` or `/>`.

use crate::error::{ParseError, ParseResult, TokenSpan};
use logos::Logos;
use std::fmt;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"<!DOCTYPE[^>]*>")]
enum Content<'src> {
    #[token("<")]
    Open,

    #[token("</")]
    CloseOpen,

    #[token("<!--", |lex| until(lex, "-->"))]
    Comment(&'src str),

    #[token("<![CDATA[", |lex| until(lex, "]]>"))]
    CData(&'src str),

    #[token("<?", |lex| until(lex, "?>"))]
    Instruction(&'src str),

    #[regex(r"[^<]+", |lex| lex.slice())]
    Text(&'src str),
}

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
enum Tag<'src> {
    #[regex(r#"[^\s=/>"'<]+"#, |lex| lex.slice())]
    Name(&'src str),

    #[token("=")]
    Equals,

    #[regex(r#""[^"]*""#, |lex| inner(lex.slice(), 1, 1))]
    #[regex(r"'[^']*'", |lex| inner(lex.slice(), 1, 1))]
    Value(&'src str),

    #[token(">")]
    End,

    #[token("/>")]
    EmptyEnd,
}

fn inner(slice: &str, prefix: usize, suffix: usize) -> &str {
    &slice[prefix..slice.len() - suffix]
}

/// Consume up to and including the first `end`, yielding what came before.
/// An unterminated section is a lex error.
fn until<'src>(lex: &mut logos::Lexer<'src, Content<'src>>, end: &str) -> Option<&'src str> {
    let rest = lex.remainder();
    let at = rest.find(end)?;
    lex.bump(at + end.len());
    Some(&rest[..at])
}

/// Tokens of both lexical contexts, flattened into one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'src> {
    /// `<`
    Open,
    /// `</`
    CloseOpen,
    /// Raw character data, entities not yet decoded
    Text(&'src str),
    Comment(&'src str),
    CData(&'src str),
    /// Body of `<? ... ?>`
    Instruction(&'src str),
    Name(&'src str),
    Equals,
    /// Attribute value without its quotes, entities not yet decoded
    Value(&'src str),
    /// `>`
    TagEnd,
    /// `/>`
    EmptyTagEnd,
}

impl<'src> From<Content<'src>> for Token<'src> {
    fn from(token: Content<'src>) -> Self {
        match token {
            Content::Open => Token::Open,
            Content::CloseOpen => Token::CloseOpen,
            Content::Comment(text) => Token::Comment(text),
            Content::CData(text) => Token::CData(text),
            Content::Instruction(body) => Token::Instruction(body),
            Content::Text(text) => Token::Text(text),
        }
    }
}

impl<'src> From<Tag<'src>> for Token<'src> {
    fn from(token: Tag<'src>) -> Self {
        match token {
            Tag::Name(name) => Token::Name(name),
            Tag::Equals => Token::Equals,
            Tag::Value(value) => Token::Value(value),
            Tag::End => Token::TagEnd,
            Tag::EmptyEnd => Token::EmptyTagEnd,
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Open => write!(f, "'<'"),
            Token::CloseOpen => write!(f, "'</'"),
            Token::Text(_) => write!(f, "text"),
            Token::Comment(_) => write!(f, "comment"),
            Token::CData(_) => write!(f, "CDATA section"),
            Token::Instruction(_) => write!(f, "processing instruction"),
            Token::Name(name) => write!(f, "name '{}'", name),
            Token::Equals => write!(f, "'='"),
            Token::Value(value) => write!(f, "value \"{}\"", value),
            Token::TagEnd => write!(f, "'>'"),
            Token::EmptyTagEnd => write!(f, "'/>'"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpannedToken<'src> {
    pub token: Token<'src>,
    pub span: TokenSpan,
}

/// Lex a whole source into tokens with spans
pub fn lex(source: &str) -> ParseResult<Vec<SpannedToken<'_>>> {
    let mut tokens = Vec::new();
    let mut content = Content::lexer(source);

    while let Some(result) = content.next() {
        let span = TokenSpan::from(content.span());
        let token = result.map_err(|()| ParseError::lex_error(span, "unexpected character"))?;
        let opens_tag = matches!(token, Content::Open | Content::CloseOpen);
        tokens.push(SpannedToken {
            token: token.into(),
            span,
        });

        if opens_tag {
            let mut tag = content.morph::<Tag>();
            while let Some(result) = tag.next() {
                let span = TokenSpan::from(tag.span());
                let token = result
                    .map_err(|()| ParseError::lex_error(span, "unexpected character in tag"))?;
                let closes_tag = matches!(token, Tag::End | Tag::EmptyEnd);
                tokens.push(SpannedToken {
                    token: token.into(),
                    span,
                });
                if closes_tag {
                    break;
                }
            }
            content = tag.morph();
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token<'_>> {
        lex(source)
            .unwrap()
            .into_iter()
            .map(|spanned| spanned.token)
            .collect()
    }

    #[test]
    fn test_lex_element_with_attributes() {
        assert_eq!(
            kinds(r#"<a x="1" y='two'>hi</a>"#),
            vec![
                Token::Open,
                Token::Name("a"),
                Token::Name("x"),
                Token::Equals,
                Token::Value("1"),
                Token::Name("y"),
                Token::Equals,
                Token::Value("two"),
                Token::TagEnd,
                Token::Text("hi"),
                Token::CloseOpen,
                Token::Name("a"),
                Token::TagEnd,
            ]
        );
    }

    #[test]
    fn test_names_are_not_text_inside_tags() {
        // `b` after `<a/>` is content again, not a tag name
        assert_eq!(
            kinds("<a/>b"),
            vec![
                Token::Open,
                Token::Name("a"),
                Token::EmptyTagEnd,
                Token::Text("b"),
            ]
        );
    }

    #[test]
    fn test_lex_special_sections() {
        assert_eq!(
            kinds("<?xml version=\"1.0\"?><!DOCTYPE r><!-- c - d --><![CDATA[x]]y]]>"),
            vec![
                Token::Instruction("xml version=\"1.0\""),
                Token::Comment(" c - d "),
                Token::CData("x]]y"),
            ]
        );
    }

    #[test]
    fn test_special_sections_keep_markup_like_content() {
        assert_eq!(
            kinds("<a><?pi a?b>c?><![CDATA[<x>]]]]><!--<y>--></a>"),
            vec![
                Token::Open,
                Token::Name("a"),
                Token::TagEnd,
                Token::Instruction("pi a?b>c"),
                Token::CData("<x>]]"),
                Token::Comment("<y>"),
                Token::CloseOpen,
                Token::Name("a"),
                Token::TagEnd,
            ]
        );
    }

    #[test]
    fn test_unterminated_sections_are_errors() {
        assert!(matches!(lex("<a><![CDATA[x</a>"), Err(ParseError::LexError { .. })));
        assert!(matches!(lex("<?pi"), Err(ParseError::LexError { .. })));
        assert!(matches!(lex("<!-- open"), Err(ParseError::LexError { .. })));
    }

    #[test]
    fn test_spans_are_byte_offsets() {
        let tokens = lex("<a>é</a>").unwrap();
        assert_eq!(tokens[3].span, TokenSpan { start: 3, end: 5 });
    }
}
