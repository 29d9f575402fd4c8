//! The vDOM: the parsed, immutable program tree the scheduler walks.
//!
//! `spec.md` §1 scopes the real HVML grammar (and the full value-
//! computation expression language it embeds) out of the runtime's
//! core as an external collaborator — "the vDOM parser that turns
//! source text into the element tree the runtime walks" is consumed
//! as read-only input. This module gives that collaborator a concrete
//! (if deliberately small) shape: an XML-like element tree plus the
//! handful of expression forms the end-to-end scenarios in `spec.md`
//! §8 exercise (string/number literals and symbol references). A host
//! that embeds a full VCM evaluator swaps `Expr::eval` for its own.

use std::sync::Arc;

use indexmap::IndexMap;
use purc_variant::Variant;

use crate::error::{DomError, DomResult};

/// The attribute combine operator `spec.md` §4.4 names:
/// `=`, `+=`, `-=`, `*=`, `~=`, `$=`, `/=`, `^=`, `.=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    Assign,
    Add,
    Subtract,
    Multiply,
    Displace,
    Append,
    Prepend,
    Merge,
    StringJoin,
}

impl AttrOp {
    pub fn from_suffix(raw: &str) -> (&str, AttrOp) {
        let suffixes: &[(&str, AttrOp)] = &[
            ("+=", AttrOp::Add),
            ("-=", AttrOp::Subtract),
            ("*=", AttrOp::Multiply),
            ("~=", AttrOp::Displace),
            ("$=", AttrOp::Append),
            ("/=", AttrOp::Prepend),
            ("^=", AttrOp::Merge),
            (".=", AttrOp::StringJoin),
        ];
        for (suffix, op) in suffixes {
            if let Some(name) = raw.strip_suffix(suffix) {
                return (name, *op);
            }
        }
        (raw, AttrOp::Assign)
    }
}

/// A minimal expression: a literal value, or a reference to one of the
/// per-frame context symbols `spec.md` §4.4 names.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Variant),
    /// `<`, `@`, `!`, `%`, `^`, `:`, `=`
    Symbol(char),
    /// `$NAME`-style reference to a named context variable, resolved
    /// against the frame's `!` scratchpad or an ancestor's.
    Named(Arc<str>),
}

impl Expr {
    pub fn literal_string(s: impl Into<Arc<str>>) -> Self {
        Expr::Literal(Variant::make_string(s.into()))
    }
}

#[derive(Debug, Clone)]
pub struct Attribute {
    pub op: AttrOp,
    pub expr: Expr,
}

/// One node of the vDOM tree: one HVML element ("verb").
#[derive(Debug, Clone)]
pub struct Element {
    pub tag: Arc<str>,
    pub attrs: IndexMap<Arc<str>, Attribute>,
    pub content: Option<Expr>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(tag: impl Into<Arc<str>>) -> Self {
        Self {
            tag: tag.into(),
            attrs: IndexMap::new(),
            content: None,
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&Attribute> {
        self.attrs.get(name)
    }
}

/// Parses HVML source text into a vDOM tree.
///
/// Supports the subset exercised by this runtime's tests: nested
/// elements, self-closing tags, double-quoted attribute values, and
/// plain-text content. Does not attempt full HVML/VCM grammar (see
/// module docs) — that belongs to the external vDOM-loader
/// collaborator `spec.md` §1 names.
pub fn parse(source: &str) -> DomResult<Element> {
    let mut parser = Parser {
        bytes: source.as_bytes(),
        pos: 0,
    };
    parser.skip_trivia();
    let root = parser.parse_element()?;
    Ok(root)
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn skip_trivia(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn err(&self, message: impl Into<String>) -> DomError {
        DomError::Parse {
            offset: self.pos,
            message: message.into(),
        }
    }

    fn expect_byte(&mut self, b: u8) -> DomResult<()> {
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.err(format!("expected '{}'", b as char)))
        }
    }

    fn parse_name(&mut self) -> DomResult<&'a str> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':')
        {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.err("expected a name"));
        }
        Ok(std::str::from_utf8(&self.bytes[start..self.pos]).expect("ascii-only name"))
    }

    fn parse_element(&mut self) -> DomResult<Element> {
        self.expect_byte(b'<')?;
        let tag = self.parse_name()?;
        let mut element = Element::new(tag);

        loop {
            self.skip_trivia();
            match self.peek() {
                Some(b'/') => {
                    self.pos += 1;
                    self.expect_byte(b'>')?;
                    return Ok(element);
                }
                Some(b'>') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => {
                    let (name, attr) = self.parse_attribute()?;
                    element.attrs.insert(Arc::from(name), attr);
                }
                None => return Err(self.err("unexpected end of input in start tag")),
            }
        }

        self.parse_children(&mut element)?;
        self.skip_trivia();
        self.expect_byte(b'<')?;
        self.expect_byte(b'/')?;
        let closing = self.parse_name()?;
        if closing != &*element.tag {
            return Err(self.err(format!(
                "mismatched closing tag: expected </{}>, found </{closing}>",
                element.tag
            )));
        }
        self.skip_trivia();
        self.expect_byte(b'>')?;
        Ok(element)
    }

    fn parse_attribute(&mut self) -> DomResult<(&'a str, Attribute)> {
        let raw_name = self.parse_name()?;
        self.skip_trivia();
        self.expect_byte(b'=')?;
        self.skip_trivia();
        let quote = self.peek().ok_or_else(|| self.err("expected attribute value"))?;
        if quote != b'"' && quote != b'\'' {
            return Err(self.err("attribute value must be quoted"));
        }
        self.pos += 1;
        let start = self.pos;
        while self.peek().is_some_and(|b| b != quote) {
            self.pos += 1;
        }
        let value = std::str::from_utf8(&self.bytes[start..self.pos]).expect("utf8 attr value");
        self.expect_byte(quote)?;
        let (name, op) = AttrOp::from_suffix(raw_name);
        Ok((
            name,
            Attribute {
                op,
                expr: parse_expr(value),
            },
        ))
    }

    fn parse_children(&mut self, element: &mut Element) -> DomResult<()> {
        loop {
            self.skip_trivia();
            match self.peek() {
                Some(b'<') if self.bytes.get(self.pos + 1) == Some(&b'/') => return Ok(()),
                Some(b'<') => {
                    let child = self.parse_element()?;
                    element.children.push(child);
                }
                Some(_) => {
                    let start = self.pos;
                    while self.peek().is_some_and(|b| b != b'<') {
                        self.pos += 1;
                    }
                    let text =
                        std::str::from_utf8(&self.bytes[start..self.pos]).expect("utf8 text");
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        element.content = Some(Expr::literal_string(trimmed));
                    }
                }
                None => return Err(self.err("unexpected end of input in element body")),
            }
        }
    }
}

/// Parses an attribute value into an expression: `$`-prefixed names
/// become symbol/named references, everything else is a string
/// literal (numeric-looking values are also exposed as `Number` so
/// verbs like `exit` can read them directly).
fn parse_expr(value: &str) -> Expr {
    if let Some(rest) = value.strip_prefix('$') {
        if rest.len() == 1 && "<@!%^:=".contains(rest) {
            return Expr::Symbol(rest.chars().next().expect("checked len"));
        }
        return Expr::Named(Arc::from(rest));
    }
    if let Ok(n) = value.parse::<f64>() {
        return Expr::Literal(Variant::make_number(n));
    }
    Expr::literal_string(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_self_closing_elements() {
        let root = parse("<hvml><body><exit with=\"42\"/></body></hvml>").unwrap();
        assert_eq!(&*root.tag, "hvml");
        assert_eq!(root.children.len(), 1);
        let body = &root.children[0];
        assert_eq!(&*body.tag, "body");
        let exit = &body.children[0];
        assert_eq!(&*exit.tag, "exit");
        match &exit.attr("with").unwrap().expr {
            Expr::Literal(v) => assert_eq!(*v, Variant::make_number(42.0)),
            other => panic!("expected literal, got {other:?}"),
        }
    }

    #[test]
    fn parses_text_content() {
        let root = parse("<p>ok</p>").unwrap();
        match &root.content {
            Some(Expr::Literal(v)) => assert_eq!(*v, Variant::make_string("ok")),
            other => panic!("expected literal content, got {other:?}"),
        }
    }

    #[test]
    fn rejects_mismatched_closing_tag() {
        let err = parse("<a><b></c></a>").unwrap_err();
        assert!(matches!(err, DomError::Parse { .. }));
    }
}
