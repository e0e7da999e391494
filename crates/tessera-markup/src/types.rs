//! Core types for the generic markup tree.

/// A byte range in the parsed source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A parsed markup document.
///
/// This is the top-level result of parsing.
#[derive(Debug, Clone)]
pub struct Document {
    /// The root element of the document.
    pub root: Element,

    /// Span of the entire document.
    pub span: Span,
}

/// Discriminator for the kind of a [`Node`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
    /// Comments and anything else the compiler does not turn into units.
    Other,
}

/// A child node in element content.
#[derive(Debug, Clone)]
pub enum Node {
    /// A child element.
    Element(Element),

    /// Text content (CDATA is folded into text).
    Text {
        /// The text content, after unescaping entities.
        content: String,
        span: Span,
    },

    /// A comment. Kept so consumers can see every node kind in the
    /// source order, but carries no meaning for evaluation.
    Comment { content: String, span: Span },
}

/// An element with its namespace, attributes and ordered children.
#[derive(Debug, Clone)]
pub struct Element {
    /// The local name of the element (without namespace prefix).
    pub name: String,

    /// Namespace prefix, if any (e.g., "ext" in `<ext:widget>`).
    pub prefix: Option<String>,

    /// Namespace URI the element is bound to, resolved from the
    /// in-scope `xmlns` declarations.
    pub namespace: Option<String>,

    /// Attributes of this element. `xmlns` declarations are not included.
    pub attributes: Vec<Attribute>,

    /// Child nodes in document order.
    pub children: Vec<Node>,

    /// Span of the entire element (from `<` to the end of the end tag).
    pub span: Span,
}

/// An attribute on an element.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// The local name of the attribute (without namespace prefix).
    pub name: String,

    /// Namespace prefix, if any.
    pub prefix: Option<String>,

    /// The attribute value (after unescaping entities).
    pub value: String,

    /// Span of the attribute in the source tag.
    pub span: Span,
}

impl Node {
    /// The kind of this node.
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Element(_) => NodeKind::Element,
            Node::Text { .. } => NodeKind::Text,
            Node::Comment { .. } => NodeKind::Other,
        }
    }

    /// The element, if this node is one.
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    /// The text content, if this node is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Node::Element(e) => e.span,
            Node::Text { span, .. } | Node::Comment { span, .. } => *span,
        }
    }
}

impl Element {
    /// Create a new element without children.
    pub fn new(name: impl Into<String>, attributes: Vec<Attribute>) -> Self {
        Self {
            name: name.into(),
            prefix: None,
            namespace: None,
            attributes,
            children: Vec::new(),
            span: Span::default(),
        }
    }

    /// Builder-style helper for appending a child node.
    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// The qualified name (`prefix:name`, or just `name`).
    pub fn qualified_name(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.name),
            None => self.name.clone(),
        }
    }

    /// Get an attribute value by name.
    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Check if this element has child elements.
    pub fn has_elements(&self) -> bool {
        self.children.iter().any(|c| matches!(c, Node::Element(_)))
    }

    /// Check if this element has no children at all.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Concatenated text content of the direct text children.
    pub fn text(&self) -> Option<String> {
        let texts: Vec<&str> = self.children.iter().filter_map(Node::as_text).collect();
        if texts.is_empty() {
            None
        } else {
            Some(texts.concat())
        }
    }

    /// Get child elements by local name.
    pub fn get_children(&self, name: &str) -> Vec<&Element> {
        self.elements().filter(|e| e.name == name).collect()
    }

    /// Iterate over all child elements, skipping text and comments.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }
}

impl Attribute {
    /// Create an attribute without source position.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: None,
            value: value.into(),
            span: Span::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str) -> Node {
        Node::Text {
            content: content.to_string(),
            span: Span::default(),
        }
    }

    #[test]
    fn test_element_get_attribute() {
        let element = Element::new("set", vec![Attribute::new("key", "total")]);

        assert_eq!(element.get_attribute("key"), Some("total"));
        assert_eq!(element.get_attribute("missing"), None);
    }

    #[test]
    fn test_element_children() {
        let parent = Element::new("block", vec![])
            .with_child(text("a"))
            .with_child(Node::Element(Element::new("value", vec![])))
            .with_child(Node::Comment {
                content: "note".to_string(),
                span: Span::default(),
            });

        assert!(parent.has_elements());
        assert_eq!(parent.elements().count(), 1);
        assert_eq!(parent.get_children("value").len(), 1);
        assert_eq!(parent.children[2].kind(), NodeKind::Other);
    }

    #[test]
    fn test_element_text() {
        let element = Element::new("text", vec![])
            .with_child(text("Hello, "))
            .with_child(text("world!"));

        assert_eq!(element.text(), Some("Hello, world!".to_string()));
        assert_eq!(Element::new("empty", vec![]).text(), None);
    }

    #[test]
    fn test_qualified_name() {
        let mut element = Element::new("widget", vec![]);
        assert_eq!(element.qualified_name(), "widget");
        element.prefix = Some("ext".to_string());
        assert_eq!(element.qualified_name(), "ext:widget");
    }
}
