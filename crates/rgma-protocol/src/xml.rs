// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Decoder for the small XML dialect spoken by R-GMA servlets.
//!
//! This is a single-pass state machine, not a general XML parser. It
//! understands start, end and self-closing tags, quoted attributes, text
//! data, processing instructions (skipped) and the five predefined
//! entities. Anything else is rejected with an [`XmlError`]; a partially
//! built tree is simply dropped.

use thiserror::Error;

/// Predefined entities and the characters they stand for.
const ENTITIES: [(&str, char); 5] = [
    ("&amp;", '&'),
    ("&lt;", '<'),
    ("&gt;", '>'),
    ("&apos;", '\''),
    ("&quot;", '"'),
];

/// Errors produced while decoding a response document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum XmlError {
    #[error("unexpected character {found:?} at offset {offset}")]
    Unexpected { found: char, offset: usize },

    #[error("markup declarations are not supported (offset {0})")]
    Declaration(usize),

    #[error("end tag </{found}> does not match <{expected}> at offset {offset}")]
    MismatchedEndTag {
        expected: String,
        found: String,
        offset: usize,
    },

    #[error("end tag </{name}> without an open element at offset {offset}")]
    UnbalancedEndTag { name: String, offset: usize },

    #[error("second root element at offset {0}")]
    MultipleRoots(usize),

    #[error("document has no root element")]
    NoRoot,

    #[error("document ended inside {0}")]
    Truncated(&'static str),
}

/// One decoded element. Children are kept in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    /// Text content; `None` for self-closing elements and for elements
    /// that have children.
    pub data: Option<String>,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Value of the first attribute called `name`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// First child called `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn data(&self) -> Option<&str> {
        self.data.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Document,
    TagName,
    ProcessingInstruction,
    Tag,
    AttName,
    AttSeparator,
    AttValue(char),
    ElementData,
}

#[derive(Default)]
struct Parser {
    open: Vec<Element>,
    root: Option<Element>,
    name: String,
    end_tag: bool,
    self_closing: bool,
    att_name: String,
    att_value: String,
    attributes: Vec<(String, String)>,
    text: String,
}

impl Parser {
    fn begin_tag(&mut self) {
        self.name.clear();
        self.end_tag = false;
        self.self_closing = false;
        self.attributes.clear();
    }

    /// Called on `>`; returns the state to continue in.
    fn finish_tag(&mut self, offset: usize) -> Result<State, XmlError> {
        if self.name.is_empty() {
            return Err(XmlError::Unexpected { found: '>', offset });
        }
        let name = std::mem::take(&mut self.name);

        if self.end_tag {
            let element = self.open.pop().ok_or_else(|| XmlError::UnbalancedEndTag {
                name: name.clone(),
                offset,
            })?;
            if element.name != name {
                return Err(XmlError::MismatchedEndTag {
                    expected: element.name,
                    found: name,
                    offset,
                });
            }
            self.close(element);
            return Ok(State::Document);
        }

        if self.open.is_empty() && self.root.is_some() {
            return Err(XmlError::MultipleRoots(offset));
        }
        // A parent that gains a child loses any text it had accumulated.
        if let Some(parent) = self.open.last_mut() {
            parent.data = None;
        }
        let element = Element {
            name,
            data: None,
            attributes: std::mem::take(&mut self.attributes),
            children: Vec::new(),
        };
        if self.self_closing {
            self.close(element);
            Ok(State::Document)
        } else {
            self.open.push(element);
            self.text.clear();
            Ok(State::ElementData)
        }
    }

    fn close(&mut self, element: Element) {
        match self.open.last_mut() {
            Some(parent) => parent.children.push(element),
            None => self.root = Some(element),
        }
    }

    fn finish_data(&mut self) {
        if let Some(current) = self.open.last_mut() {
            current.data = Some(unescape(&self.text));
        }
        self.text.clear();
    }

    fn finish_attribute(&mut self) {
        let name = std::mem::take(&mut self.att_name);
        let value = unescape(&self.att_value);
        self.att_value.clear();
        self.attributes.push((name, value));
    }
}

/// Decode a complete response document into its root element.
pub fn parse(input: &str) -> Result<Element, XmlError> {
    let mut parser = Parser::default();
    let mut state = State::Document;
    let mut prev = '\0';

    for (offset, c) in input.char_indices() {
        let unexpected = XmlError::Unexpected { found: c, offset };
        state = match state {
            State::Document => match c {
                '<' => {
                    parser.begin_tag();
                    State::TagName
                }
                c if c.is_whitespace() => State::Document,
                _ => return Err(unexpected),
            },
            State::TagName => match c {
                '?' if parser.name.is_empty() && !parser.end_tag => State::ProcessingInstruction,
                '!' => return Err(XmlError::Declaration(offset)),
                '/' if parser.name.is_empty() && !parser.end_tag => {
                    parser.end_tag = true;
                    State::TagName
                }
                '/' if !parser.end_tag => {
                    parser.self_closing = true;
                    State::Tag
                }
                '>' => parser.finish_tag(offset)?,
                c if c.is_whitespace() && !parser.name.is_empty() => State::Tag,
                c if c.is_whitespace() || c == '<' || c == '/' => return Err(unexpected),
                c => {
                    parser.name.push(c);
                    State::TagName
                }
            },
            State::ProcessingInstruction => {
                if c == '>' && prev == '?' {
                    State::Document
                } else {
                    State::ProcessingInstruction
                }
            }
            State::Tag => match c {
                '>' => parser.finish_tag(offset)?,
                c if c.is_whitespace() => State::Tag,
                '/' if !parser.end_tag && !parser.self_closing => {
                    parser.self_closing = true;
                    State::Tag
                }
                _ if parser.end_tag || parser.self_closing || c == '<' || c == '/' => {
                    return Err(unexpected);
                }
                c => {
                    parser.att_name.push(c);
                    State::AttName
                }
            },
            State::AttName => match c {
                '=' => State::AttSeparator,
                c if c.is_whitespace() => State::AttSeparator,
                '>' | '/' | '<' | '"' | '\'' => return Err(unexpected),
                c => {
                    parser.att_name.push(c);
                    State::AttName
                }
            },
            State::AttSeparator => match c {
                '"' | '\'' => State::AttValue(c),
                '=' => State::AttSeparator,
                c if c.is_whitespace() => State::AttSeparator,
                _ => return Err(unexpected),
            },
            State::AttValue(quote) => {
                if c == quote {
                    parser.finish_attribute();
                    State::Tag
                } else {
                    parser.att_value.push(c);
                    State::AttValue(quote)
                }
            }
            State::ElementData => {
                if c == '<' {
                    parser.finish_data();
                    parser.begin_tag();
                    State::TagName
                } else {
                    parser.text.push(c);
                    State::ElementData
                }
            }
        };
        prev = c;
    }

    match state {
        State::Document if parser.open.is_empty() => parser.root.ok_or(XmlError::NoRoot),
        State::Document | State::ElementData => Err(XmlError::Truncated("an element")),
        State::ProcessingInstruction => Err(XmlError::Truncated("a processing instruction")),
        _ => Err(XmlError::Truncated("a tag")),
    }
}

/// Replace the five predefined entities; unknown entities are left as-is.
pub fn unescape(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ENTITIES.iter().find(|(entity, _)| rest.starts_with(entity)) {
            Some((entity, ch)) => {
                out.push(*ch);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Escape text for use in element data or a quoted attribute value.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match ENTITIES.iter().find(|(_, ch)| *ch == c) {
            Some((entity, _)) => out.push_str(entity),
            None => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_value_result() {
        let root = parse(r#"<r c="1" r="1"><v>42</v></r>"#).unwrap();
        assert_eq!(root.name, "r");
        assert_eq!(root.attribute("c"), Some("1"));
        assert_eq!(root.attribute("r"), Some("1"));
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.children[0].data(), Some("42"));
        assert_eq!(root.data(), None);
    }

    #[test]
    fn test_self_closing_elements() {
        let root = parse("<r><n/><e/></r>").unwrap();
        let names: Vec<&str> = root.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["n", "e"]);
        assert!(root.children.iter().all(|c| c.data.is_none()));
    }

    #[test]
    fn test_self_closing_with_attributes() {
        let root = parse(r#"<t m="Server busy" o='3'/>"#).unwrap();
        assert_eq!(root.name, "t");
        assert_eq!(root.attribute("m"), Some("Server busy"));
        assert_eq!(root.attribute("o"), Some("3"));
        assert!(root.children.is_empty());
    }

    #[test]
    fn test_whitespace_between_elements_is_ignored() {
        let root = parse("\n<r c=\"2\" >\n  <v>a</v>\n  <v> b </v>\n</r>\n").unwrap();
        assert_eq!(root.children.len(), 2);
        assert_eq!(root.children[1].data(), Some(" b "));
        assert_eq!(root.data(), None);
    }

    #[test]
    fn test_empty_element_has_empty_data() {
        let root = parse("<r><v></v></r>").unwrap();
        assert_eq!(root.children[0].data(), Some(""));
    }

    #[test]
    fn test_entities_decoded_in_data_and_attributes() {
        let root = parse(r#"<p m="a &lt;b&gt; &quot;c&quot;"><v>x &amp; y &apos;z&apos;</v></p>"#)
            .unwrap();
        assert_eq!(root.attribute("m"), Some(r#"a <b> "c""#));
        assert_eq!(root.children[0].data(), Some("x & y 'z'"));
    }

    #[test]
    fn test_unknown_entity_left_verbatim() {
        assert_eq!(unescape("&nbsp;&amp"), "&nbsp;&amp");
    }

    #[test]
    fn test_processing_instruction_skipped() {
        let root = parse("<?xml version=\"1.0\"?>\n<u/>").unwrap();
        assert_eq!(root.name, "u");
    }

    #[test]
    fn test_mismatched_end_tag_fails() {
        let err = parse("<r><v>1</n></r>").unwrap_err();
        assert!(matches!(err, XmlError::MismatchedEndTag { .. }));
    }

    #[test]
    fn test_unbalanced_end_tag_fails() {
        assert!(matches!(
            parse("</r>").unwrap_err(),
            XmlError::UnbalancedEndTag { .. }
        ));
    }

    #[test]
    fn test_text_outside_elements_fails() {
        assert!(matches!(
            parse("hello").unwrap_err(),
            XmlError::Unexpected { found: 'h', offset: 0 }
        ));
        assert!(parse("<r><v>1</v>stray</r>").is_err());
    }

    #[test]
    fn test_declarations_rejected() {
        assert!(matches!(
            parse("<!DOCTYPE r><r/>").unwrap_err(),
            XmlError::Declaration(1)
        ));
    }

    #[test]
    fn test_truncated_documents_fail() {
        for input in ["<r c=\"1\"><v>4", "<r c=\"1", "<r><v>1</v>", "<r", "<?xml"] {
            assert!(
                matches!(parse(input), Err(XmlError::Truncated(_))),
                "{input} should be truncated"
            );
        }
    }

    #[test]
    fn test_empty_document_has_no_root() {
        assert_eq!(parse("").unwrap_err(), XmlError::NoRoot);
        assert_eq!(parse("  \r\n").unwrap_err(), XmlError::NoRoot);
    }

    #[test]
    fn test_second_root_rejected() {
        assert!(matches!(
            parse("<u/><u/>").unwrap_err(),
            XmlError::MultipleRoots(_)
        ));
    }

    #[test]
    fn test_attribute_without_value_rejected() {
        assert!(parse("<r c></r>").is_err());
        assert!(parse("<r c=1></r>").is_err());
    }

    #[test]
    fn test_escape_round_trips_through_unescape() {
        let text = r#"<a href="x">Tom & Jerry's</a>"#;
        assert_eq!(unescape(&escape(text)), text);
    }

    #[test]
    fn test_nested_children_kept_in_order() {
        let root = parse("<a><b><c>1</c></b><d/></a>").unwrap();
        assert_eq!(root.children[0].child("c").and_then(Element::data), Some("1"));
        assert_eq!(root.children[1].name, "d");
    }
}
