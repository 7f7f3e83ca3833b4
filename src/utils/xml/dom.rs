//! Owned markup tree built from `quick-xml` events.
//!
//! Pages are parsed as well-formed markup with two HTML allowances: void
//! elements (`<br>`, `<img ...>`, `<embed ...>`) need no end tag, and stray
//! end tags for them are ignored. Text and attribute values are kept exactly
//! as written (still escaped), so serializing an unmodified tree reproduces
//! its entities verbatim.

use quick_xml::events::{BytesStart, Event};
use std::borrow::Cow;
use thiserror::Error;

use super::common::{create_xml_reader, is_void_element, unescape_or_raw};

/// Markup parse errors.
#[derive(Debug, Error)]
pub enum DomError {
    #[error("malformed markup at byte {position}")]
    Syntax {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("mismatched end tag `</{found}>`, expected `</{expected}>`")]
    Mismatch { expected: String, found: String },

    #[error("unexpected end tag `</{0}>`")]
    UnexpectedEnd(String),

    #[error("unclosed element `<{0}>`")]
    Unclosed(String),
}

// ============================================================================
// Tree
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Escaped text, entities included.
    Text(String),
    Comment(String),
    CData(String),
    DocType(String),
    Decl(String),
    PI(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Element {
    pub name: String,
    /// Attribute name → escaped value, in source order.
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub children: Vec<Node>,
}

impl Node {
    /// Text node from plain (unescaped) text.
    pub fn text(plain: &str) -> Self {
        Self::Text(quick_xml::escape::escape(plain).into_owned())
    }

    /// Append this node's markup to `out`.
    pub fn write_html(&self, out: &mut String) {
        match self {
            Self::Element(element) => element.write_html(out),
            Self::Text(text) => out.push_str(text),
            Self::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            Self::CData(text) => {
                out.push_str("<![CDATA[");
                out.push_str(text);
                out.push_str("]]>");
            }
            Self::DocType(text) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(text);
                out.push('>');
            }
            Self::Decl(text) | Self::PI(text) => {
                out.push_str("<?");
                out.push_str(text);
                out.push_str("?>");
            }
        }
    }
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Self {
        let attrs = start
            .html_attributes()
            .with_checks(false)
            .flatten()
            .map(|attr| {
                (
                    String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                    String::from_utf8_lossy(&attr.value).into_owned(),
                )
            })
            .collect();

        Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attrs,
            children: Vec::new(),
        }
    }

    #[inline]
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    #[inline]
    pub fn is_void(&self) -> bool {
        is_void_element(&self.name)
    }

    /// Unescaped attribute value.
    pub fn attr(&self, name: &str) -> Option<Cow<'_, str>> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| unescape_or_raw(value))
    }

    /// Concatenated unescaped text of all descendants.
    pub fn text_content(&self) -> String {
        fn collect(nodes: &[Node], out: &mut String) {
            for node in nodes {
                match node {
                    Node::Text(text) => out.push_str(&unescape_or_raw(text)),
                    Node::CData(text) => out.push_str(text),
                    Node::Element(element) => collect(&element.children, out),
                    _ => {}
                }
            }
        }
        let mut out = String::new();
        collect(&self.children, &mut out);
        out
    }

    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.write_html(&mut out);
        }
        out
    }

    pub fn write_html(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attrs {
            let quote = if value.contains('"') { '\'' } else { '"' };
            out.push(' ');
            out.push_str(key);
            out.push('=');
            out.push(quote);
            out.push_str(value);
            out.push(quote);
        }

        if self.is_void() && self.children.is_empty() {
            out.push_str(" />");
            return;
        }

        out.push('>');
        for child in &self.children {
            child.write_html(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

// ============================================================================
// Parsing
// ============================================================================

impl Document {
    pub fn from_nodes(children: Vec<Node>) -> Self {
        Self { children }
    }

    pub fn parse(source: &str) -> Result<Self, DomError> {
        let mut reader = create_xml_reader(source.as_bytes());
        let mut tree = TreeBuilder::default();

        loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(source) => {
                    return Err(DomError::Syntax {
                        position: reader.error_position(),
                        source,
                    });
                }
            };

            match event {
                Event::Start(start) => {
                    let element = Element::from_start(&start);
                    if element.is_void() {
                        tree.push(Node::Element(element));
                    } else {
                        tree.open.push(element);
                    }
                }
                Event::Empty(start) => tree.push(Node::Element(Element::from_start(&start))),
                Event::End(end) => {
                    let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                    tree.close(name)?;
                }
                Event::Text(text) => tree.push_text(&String::from_utf8_lossy(&text)),
                Event::GeneralRef(entity) => {
                    tree.push_text(&format!("&{};", String::from_utf8_lossy(&entity)));
                }
                Event::CData(text) => tree.push(Node::CData(lossy(&text))),
                Event::Comment(text) => tree.push(Node::Comment(lossy(&text))),
                Event::DocType(text) => {
                    tree.push(Node::DocType(lossy(&text).trim_start().to_owned()));
                }
                Event::Decl(decl) => tree.push(Node::Decl(lossy(&decl))),
                Event::PI(pi) => tree.push(Node::PI(lossy(&pi))),
                Event::Eof => break,
            }
        }

        tree.finish()
    }
}

#[inline]
fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Stack of open elements plus the finished top-level nodes.
#[derive(Default)]
struct TreeBuilder {
    open: Vec<Element>,
    root: Vec<Node>,
}

impl TreeBuilder {
    fn siblings(&mut self) -> &mut Vec<Node> {
        match self.open.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut self.root,
        }
    }

    fn push(&mut self, node: Node) {
        self.siblings().push(node);
    }

    /// Text and entity events arrive split; merge them into one node.
    fn push_text(&mut self, text: &str) {
        let siblings = self.siblings();
        match siblings.last_mut() {
            Some(Node::Text(last)) => last.push_str(text),
            _ => siblings.push(Node::Text(text.to_owned())),
        }
    }

    fn close(&mut self, name: String) -> Result<(), DomError> {
        match self.open.last() {
            Some(top) if top.name == name => {
                if let Some(element) = self.open.pop() {
                    self.push(Node::Element(element));
                }
                Ok(())
            }
            _ if is_void_element(&name) => Ok(()),
            Some(top) => Err(DomError::Mismatch {
                expected: top.name.clone(),
                found: name,
            }),
            None => Err(DomError::UnexpectedEnd(name)),
        }
    }

    fn finish(self) -> Result<Document, DomError> {
        match self.open.last() {
            Some(unclosed) => Err(DomError::Unclosed(unclosed.name.clone())),
            None => Ok(Document::from_nodes(self.root)),
        }
    }
}

// ============================================================================
// Queries and Rewrites
// ============================================================================

impl Document {
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for child in &self.children {
            child.write_html(&mut out);
        }
        out
    }

    /// First element named `name` in document order.
    pub fn find_element(&self, name: &str) -> Option<&Element> {
        fn find<'a>(nodes: &'a [Node], name: &str) -> Option<&'a Element> {
            nodes.iter().find_map(|node| match node {
                Node::Element(element) if element.is(name) => Some(element),
                Node::Element(element) => find(&element.children, name),
                _ => None,
            })
        }
        find(&self.children, name)
    }

    /// Inner markup of `<body>`, or the whole document when there is none.
    pub fn body_html(&self) -> String {
        match self.find_element("body") {
            Some(body) => body.inner_html(),
            None => self.to_html(),
        }
    }

    /// Children of `<body>`, or every top-level node when there is none.
    ///
    /// Prolog nodes (`<?xml ...?>`, `<!DOCTYPE ...>`, processing
    /// instructions) are dropped: the result is spliced into a page body.
    pub fn into_body(self) -> Vec<Node> {
        fn take(nodes: &mut [Node]) -> Option<Vec<Node>> {
            nodes.iter_mut().find_map(|node| match node {
                Node::Element(element) if element.is("body") => {
                    Some(std::mem::take(&mut element.children))
                }
                Node::Element(element) => take(&mut element.children),
                _ => None,
            })
        }
        let mut children = self.children;
        let body = take(&mut children).unwrap_or(children);
        body.into_iter()
            .filter(|node| !matches!(node, Node::Decl(_) | Node::DocType(_) | Node::PI(_)))
            .collect()
    }

    /// Text of the first comment in document order.
    pub fn first_comment(&self) -> Option<&str> {
        fn find(nodes: &[Node]) -> Option<&str> {
            nodes.iter().find_map(|node| match node {
                Node::Comment(text) => Some(text.as_str()),
                Node::Element(element) => find(&element.children),
                _ => None,
            })
        }
        find(&self.children)
    }

    /// Remove the first comment in document order.
    pub fn remove_first_comment(&mut self) -> bool {
        fn remove(nodes: &mut Vec<Node>) -> bool {
            for i in 0..nodes.len() {
                match &mut nodes[i] {
                    Node::Comment(_) => {
                        nodes.remove(i);
                        return true;
                    }
                    Node::Element(element) => {
                        if remove(&mut element.children) {
                            return true;
                        }
                    }
                    _ => {}
                }
            }
            false
        }
        remove(&mut self.children)
    }

    /// Replace every `<p>` without a non-whitespace text child by its children.
    ///
    /// Only direct text counts: a paragraph holding just elements (a spliced
    /// embed, an image) disappears, one with any real text stays.
    pub fn unwrap_textless_paragraphs(&mut self) {
        unwrap_paragraphs(&mut self.children);
    }
}

fn unwrap_paragraphs(nodes: &mut Vec<Node>) {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes.drain(..) {
        match node {
            Node::Element(mut element) => {
                unwrap_paragraphs(&mut element.children);
                if element.is("p") && !has_direct_text(&element) {
                    out.extend(element.children);
                } else {
                    out.push(Node::Element(element));
                }
            }
            other => out.push(other),
        }
    }
    *nodes = out;
}

fn has_direct_text(element: &Element) -> bool {
    element.children.iter().any(|child| match child {
        Node::Text(text) | Node::CData(text) => !text.trim().is_empty(),
        _ => false,
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(source: &str) -> String {
        Document::parse(source).unwrap().to_html()
    }

    #[test]
    fn test_roundtrip_document() {
        let source = "<!DOCTYPE html>\n<html lang=\"en\"><head><title>T</title></head>\
                      <body><h1 class=\"x\">Hi</h1><!-- note --></body></html>";
        assert_eq!(roundtrip(source), source);
    }

    #[test]
    fn test_roundtrip_entities_verbatim() {
        assert_eq!(roundtrip("<p>a &amp; b&nbsp;c &#169;</p>"), "<p>a &amp; b&nbsp;c &#169;</p>");
    }

    #[test]
    fn test_text_merges_around_entities() {
        let doc = Document::parse("<p>a &amp; b</p>").unwrap();
        let p = doc.find_element("p").unwrap();
        assert_eq!(p.children, vec![Node::Text("a &amp; b".into())]);
        assert_eq!(p.text_content(), "a & b");
    }

    #[test]
    fn test_void_elements() {
        let doc = Document::parse("<p>one<br>two<img src=\"a.png\"></p>").unwrap();
        assert_eq!(doc.to_html(), "<p>one<br />two<img src=\"a.png\" /></p>");

        // Stray end tag of a void element is ignored
        let doc = Document::parse("<div><br></br></div>").unwrap();
        assert_eq!(doc.to_html(), "<div><br /></div>");
    }

    #[test]
    fn test_self_closing_non_void_keeps_end_tag() {
        assert_eq!(roundtrip("<div/>"), "<div></div>");
        assert_eq!(roundtrip("<embed type=\"text/plain\" src=\"a.txt\"/>"), "<embed type=\"text/plain\" src=\"a.txt\" />");
    }

    #[test]
    fn test_mismatched_end_tag() {
        let err = Document::parse("<div><span></div>").unwrap_err();
        assert!(matches!(err, DomError::Mismatch { ref expected, ref found }
            if expected == "span" && found == "div"));
    }

    #[test]
    fn test_unexpected_end_tag() {
        let err = Document::parse("text</p>").unwrap_err();
        assert!(matches!(err, DomError::UnexpectedEnd(ref name) if name == "p"));
    }

    #[test]
    fn test_unclosed_element() {
        let err = Document::parse("<div><p>text").unwrap_err();
        assert!(matches!(err, DomError::Unclosed(ref name) if name == "p"));
    }

    #[test]
    fn test_attr_unescaped_on_read() {
        let doc = Document::parse("<a title=\"x &amp; y\" href='say \"hi\"'>l</a>").unwrap();
        let a = doc.find_element("a").unwrap();
        assert_eq!(a.attr("title").as_deref(), Some("x & y"));
        assert_eq!(a.attr("href").as_deref(), Some("say \"hi\""));
        assert_eq!(a.attr("missing"), None);
        // Value containing a double quote keeps single quotes
        assert_eq!(doc.to_html(), "<a title=\"x &amp; y\" href='say \"hi\"'>l</a>");
    }

    #[test]
    fn test_text_node_escapes() {
        let mut out = String::new();
        Node::text("<b> & \"q\"").write_html(&mut out);
        assert!(out.starts_with("&lt;b&gt; &amp; "));
    }

    #[test]
    fn test_find_element_depth_first() {
        let doc = Document::parse("<div><section><h1>Deep</h1></section><h1>Later</h1></div>").unwrap();
        assert_eq!(doc.find_element("h1").unwrap().text_content(), "Deep");
        assert!(doc.find_element("h2").is_none());
    }

    #[test]
    fn test_body_html() {
        let doc = Document::parse("<html><head></head><body><p>x</p></body></html>").unwrap();
        assert_eq!(doc.body_html(), "<p>x</p>");

        let doc = Document::parse("<p>a</p>\n<p>b</p>").unwrap();
        assert_eq!(doc.body_html(), "<p>a</p>\n<p>b</p>");
    }

    #[test]
    fn test_into_body() {
        let doc = Document::parse("<html><body><p>x</p><p>y</p></body></html>").unwrap();
        assert_eq!(doc.into_body().len(), 2);

        let doc = Document::parse("<p>a</p>\n<p>b</p>").unwrap();
        assert_eq!(doc.into_body().len(), 3);
    }

    #[test]
    fn test_into_body_drops_prolog() {
        let doc = Document::parse(
            "<?xml version=\"1.0\"?>\n<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.1//EN\" \"x.dtd\">\n<?style a?><svg><circle /></svg>",
        )
        .unwrap();
        let html = Document::from_nodes(doc.into_body()).to_html();
        assert_eq!(html, "\n\n<svg><circle></circle></svg>");
    }

    #[test]
    fn test_first_comment_document_order() {
        let mut doc = Document::parse("<div><p>x<!-- inner --></p></div><!-- outer -->").unwrap();
        assert_eq!(doc.first_comment(), Some(" inner "));
        assert!(doc.remove_first_comment());
        assert_eq!(doc.first_comment(), Some(" outer "));
        assert!(doc.remove_first_comment());
        assert!(!doc.remove_first_comment());
        assert_eq!(doc.to_html(), "<div><p>x</p></div>");
    }

    #[test]
    fn test_unwrap_textless_paragraphs() {
        let mut doc = Document::parse(
            "<div><p>  <section>s</section>\n</p><p>kept <em>here</em></p><p><img src=\"a\" /></p></div>",
        )
        .unwrap();
        doc.unwrap_textless_paragraphs();
        assert_eq!(
            doc.to_html(),
            "<div>  <section>s</section>\n<p>kept <em>here</em></p><img src=\"a\" /></div>"
        );
    }

    #[test]
    fn test_unwrap_nested_paragraphs() {
        let mut doc = Document::parse("<p><span><p><b>x</b></p></span></p>").unwrap();
        doc.unwrap_textless_paragraphs();
        assert_eq!(doc.to_html(), "<span><b>x</b></span>");
    }

    #[test]
    fn test_comment_decl_and_cdata_roundtrip() {
        let source = "<?xml version=\"1.0\"?><svg><![CDATA[a < b]]><!--c--></svg>";
        assert_eq!(roundtrip(source), source);
    }
}
