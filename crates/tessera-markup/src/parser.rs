//! Parser that builds [`Document`] trees from XML text.

use crate::{Attribute, Document, Element, Error, Node, Result, Span};
use quick_xml::Reader;
use quick_xml::events::{BytesCData, BytesEnd, BytesStart, BytesText, Event};
use std::collections::HashMap;

/// Parse markup from a string, producing a [`Document`].
///
/// # Example
///
/// ```rust
/// use tessera_markup::parse;
///
/// let doc = parse("<template><block/></template>").unwrap();
/// assert_eq!(doc.root.name, "template");
/// ```
///
/// # Errors
///
/// Returns an error if the markup is malformed, a prefix is undeclared, or
/// the document does not have exactly one root element.
pub fn parse(content: &str) -> Result<Document> {
    let mut parser = MarkupParser::new(content);
    parser.parse()
}

/// Internal parser state.
struct MarkupParser<'a> {
    /// The source content being parsed.
    source: &'a str,

    /// The quick-xml reader.
    reader: Reader<&'a [u8]>,

    /// Stack of elements being built.
    stack: Vec<BuildNode>,
}

/// A node being constructed during parsing.
struct BuildNode {
    element: Element,

    /// Namespace bindings in scope for this element and its descendants.
    /// The empty key holds the default namespace.
    bindings: HashMap<String, String>,
}

impl<'a> MarkupParser<'a> {
    fn new(source: &'a str) -> Self {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text_start = false;
        reader.config_mut().trim_text_end = false;

        Self {
            source,
            reader,
            stack: Vec::new(),
        }
    }

    fn parse(&mut self) -> Result<Document> {
        let mut root: Option<Element> = None;

        loop {
            // Capture position before reading the event
            let event_start = self.reader.buffer_position() as usize;

            match self.reader.read_event() {
                Ok(Event::Start(e)) => {
                    let node = self.open_element(&e, event_start)?;
                    self.stack.push(node);
                }
                Ok(Event::End(e)) => {
                    let element = self.close_element(e)?;
                    self.attach(element, &mut root)?;
                }
                Ok(Event::Empty(e)) => {
                    let mut node = self.open_element(&e, event_start)?;
                    node.element.span.end = self.reader.buffer_position() as usize;
                    self.attach(node.element, &mut root)?;
                }
                Ok(Event::Text(e)) => {
                    self.handle_text(e, event_start)?;
                }
                Ok(Event::CData(e)) => {
                    self.handle_cdata(e, event_start);
                }
                Ok(Event::Comment(e)) => {
                    let span = Span::new(event_start, self.reader.buffer_position() as usize);
                    if let Some(node) = self.stack.last_mut() {
                        node.element.children.push(Node::Comment {
                            content: String::from_utf8_lossy(e.as_ref()).to_string(),
                            span,
                        });
                    }
                }
                Ok(Event::PI(_) | Event::Decl(_) | Event::DocType(_)) => {
                    // Processing instructions and declarations carry no units
                }
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(Error::XmlSyntax {
                        message: e.to_string(),
                        position: Some(self.reader.error_position()),
                    });
                }
            }
        }

        // Check for unclosed elements
        if let Some(node) = self.stack.last() {
            return Err(Error::UnexpectedEof {
                expected: format!("closing tag </{}>", node.element.qualified_name()),
                span: Some(node.element.span),
            });
        }

        let root = root.ok_or(Error::EmptyDocument)?;
        Ok(Document {
            root,
            span: Span::new(0, self.source.len()),
        })
    }

    /// Add a finished element to its parent, or install it as the root.
    fn attach(&mut self, element: Element, root: &mut Option<Element>) -> Result<()> {
        match self.stack.last_mut() {
            Some(parent) => {
                parent.element.children.push(Node::Element(element));
                Ok(())
            }
            None if root.is_some() => Err(Error::MultipleRoots {
                span: Some(element.span),
            }),
            None => {
                *root = Some(element);
                Ok(())
            }
        }
    }

    fn open_element(&self, e: &BytesStart<'_>, event_start: usize) -> Result<BuildNode> {
        let (name, prefix) = split_name(&String::from_utf8_lossy(e.name().as_ref()));
        let span = Span::new(event_start, event_start);

        let mut bindings = self
            .stack
            .last()
            .map(|n| n.bindings.clone())
            .unwrap_or_default();
        let mut attributes = Vec::new();

        for attr_result in e.attributes() {
            let attr = attr_result?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let value = attr
                .unescape_value()
                .map_err(|err| Error::XmlSyntax {
                    message: format!("Invalid attribute value: {}", err),
                    position: Some(event_start as u64),
                })?
                .into_owned();

            if key == "xmlns" {
                bindings.insert(String::new(), value);
                continue;
            }
            if let Some(declared) = key.strip_prefix("xmlns:") {
                bindings.insert(declared.to_string(), value);
                continue;
            }

            let (attr_name, attr_prefix) = split_name(&key);
            attributes.push(Attribute {
                name: attr_name,
                prefix: attr_prefix,
                value,
                span: self.attribute_span(e, event_start, &key),
            });
        }

        let namespace = match &prefix {
            Some(p) if p == "xml" => None,
            Some(p) => Some(bindings.get(p).cloned().ok_or_else(|| {
                Error::UndeclaredPrefix {
                    prefix: p.clone(),
                    span: Some(span),
                }
            })?),
            None => bindings.get("").cloned(),
        };

        Ok(BuildNode {
            element: Element {
                name,
                prefix,
                namespace,
                attributes,
                children: Vec::new(),
                span,
            },
            bindings,
        })
    }

    fn close_element(&mut self, e: BytesEnd<'_>) -> Result<Element> {
        let end_name = String::from_utf8_lossy(e.name().as_ref()).to_string();

        let node = self.stack.pop().ok_or_else(|| Error::InvalidStructure {
            message: format!("Unexpected closing tag </{}>", end_name),
            span: None,
        })?;

        // Verify tag names match
        let expected = node.element.qualified_name();
        if expected != end_name {
            return Err(Error::MismatchedEndTag {
                expected,
                found: end_name,
                span: Some(node.element.span),
            });
        }

        let mut element = node.element;
        element.span.end = self.reader.buffer_position() as usize;
        Ok(element)
    }

    fn handle_text(&mut self, e: BytesText<'_>, event_start: usize) -> Result<()> {
        let text = e.unescape().map_err(|err| Error::XmlSyntax {
            message: format!("Invalid text content: {}", err),
            position: Some(event_start as u64),
        })?;
        let span = Span::new(event_start, self.reader.buffer_position() as usize);

        match self.stack.last_mut() {
            Some(node) => {
                node.element.children.push(Node::Text {
                    content: text.into_owned(),
                    span,
                });
                Ok(())
            }
            // Whitespace around the root element is fine, anything else is not
            None if text.trim().is_empty() => Ok(()),
            None => Err(Error::InvalidStructure {
                message: "Text outside of the root element".to_string(),
                span: Some(span),
            }),
        }
    }

    fn handle_cdata(&mut self, e: BytesCData<'_>, event_start: usize) {
        let text = String::from_utf8_lossy(e.as_ref()).to_string();
        let span = Span::new(event_start, self.reader.buffer_position() as usize);

        if let Some(node) = self.stack.last_mut() {
            node.element.children.push(Node::Text {
                content: text,
                span,
            });
        }
    }

    /// Locate an attribute inside its start tag.
    ///
    /// quick-xml does not report attribute offsets, so search the raw tag
    /// text after the element name.
    fn attribute_span(&self, e: &BytesStart<'_>, tag_start: usize, key: &str) -> Span {
        let tag_str = String::from_utf8_lossy(e.as_ref());
        let name_len = e.name().as_ref().len();
        // The tag content starts after '<'
        let content_start = tag_start + 1;

        let Some(rel) = tag_str[name_len..].find(key) else {
            return Span::new(content_start, content_start + 1);
        };
        let start = content_start + name_len + rel;
        let rest = &tag_str[name_len + rel..];

        // Pattern: name="value" or name='value'
        let len = rest
            .find(['"', '\''])
            .and_then(|open| {
                let quote = &rest[open..open + 1];
                rest[open + 1..]
                    .find(quote)
                    .map(|close| open + 1 + close + 1)
            })
            .unwrap_or(key.len());
        Span::new(start, start + len)
    }
}

/// Split `prefix:name` into its local name and optional prefix.
fn split_name(full_name: &str) -> (String, Option<String>) {
    match full_name.find(':') {
        Some(pos) => (
            full_name[pos + 1..].to_string(),
            Some(full_name[..pos].to_string()),
        ),
        None => (full_name.to_string(), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NodeKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_simple_element() {
        let doc = parse("<root/>").unwrap();
        assert_eq!(doc.root.name, "root");
        assert!(doc.root.is_empty());
    }

    #[test]
    fn test_parse_nested_elements() {
        let doc = parse("<root><child/></root>").unwrap();
        assert!(doc.root.has_elements());

        let children: Vec<&Element> = doc.root.elements().collect();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].name, "child");
    }

    #[test]
    fn test_parse_text_content() {
        let doc = parse("<text>Hello, &amp; world!</text>").unwrap();
        assert_eq!(doc.root.text(), Some("Hello, & world!".to_string()));
    }

    #[test]
    fn test_parse_mixed_content_keeps_order() {
        let doc = parse("<block>a<value/>b<!-- note --></block>").unwrap();
        let kinds: Vec<NodeKind> = doc.root.children.iter().map(Node::kind).collect();
        assert_eq!(
            kinds,
            vec![
                NodeKind::Text,
                NodeKind::Element,
                NodeKind::Text,
                NodeKind::Other
            ]
        );
    }

    #[test]
    fn test_parse_cdata_becomes_text() {
        let doc = parse("<text><![CDATA[1 < 2]]></text>").unwrap();
        assert_eq!(doc.root.text(), Some("1 < 2".to_string()));
    }

    #[test]
    fn test_parse_attributes() {
        let doc = parse(r#"<set context="out" key='total'/>"#).unwrap();
        assert_eq!(doc.root.get_attribute("context"), Some("out"));
        assert_eq!(doc.root.get_attribute("key"), Some("total"));
    }

    #[test]
    fn test_attribute_span_covers_value() {
        let source = r#"<set key="total"/>"#;
        let doc = parse(source).unwrap();
        let span = doc.root.attributes[0].span;
        assert_eq!(&source[span.start..span.end], r#"key="total""#);
    }

    #[test]
    fn test_parse_namespace_resolution() {
        let doc = parse(
            r#"<template xmlns="urn:tessera" xmlns:ext="urn:ext">
                 <ext:widget/>
                 <block/>
               </template>"#,
        )
        .unwrap();
        assert_eq!(doc.root.namespace.as_deref(), Some("urn:tessera"));
        // xmlns declarations are not attributes
        assert!(doc.root.attributes.is_empty());

        let children: Vec<&Element> = doc.root.elements().collect();
        assert_eq!(children[0].name, "widget");
        assert_eq!(children[0].prefix.as_deref(), Some("ext"));
        assert_eq!(children[0].namespace.as_deref(), Some("urn:ext"));
        assert_eq!(children[1].namespace.as_deref(), Some("urn:tessera"));
    }

    #[test]
    fn test_undeclared_prefix_error() {
        let result = parse("<ext:widget/>");
        assert!(matches!(result, Err(Error::UndeclaredPrefix { .. })));
    }

    #[test]
    fn test_element_span() {
        let content = "<root><child/></root>";
        let doc = parse(content).unwrap();
        assert_eq!(doc.root.span, Span::new(0, content.len()));
        assert_eq!(doc.span.end, content.len());
    }

    #[test]
    fn test_empty_document_error() {
        let result = parse("");
        assert!(matches!(result, Err(Error::EmptyDocument)));
    }

    #[test]
    fn test_mismatched_tags_error() {
        let result = parse("<root></wrong>");
        // quick-xml checks end names itself, so either error shape is fine
        assert!(matches!(
            result,
            Err(Error::MismatchedEndTag { .. } | Error::XmlSyntax { .. })
        ));
    }

    #[test]
    fn test_unclosed_element_error() {
        let result = parse("<root><child>");
        assert!(matches!(
            result,
            Err(Error::UnexpectedEof { .. } | Error::XmlSyntax { .. })
        ));
    }

    #[test]
    fn test_multiple_roots_error() {
        let result = parse("<a/><b/>");
        assert!(matches!(result, Err(Error::MultipleRoots { .. })));
    }
}
