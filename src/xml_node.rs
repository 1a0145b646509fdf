//! In-memory XML tree
//!
//! [`XmlTreeSink`] collects sink events into an [`XmlNode`] tree for callers
//! that want to inspect a result instead of serializing it.

use crate::sink::{XmlAttribute, XmlEventSink};
use crate::xml_chars::{escape_attribute, escape_text};

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Element {
        name: String,
        namespace: Option<String>,
        /// Namespace declarations made on this element, as (prefix, uri)
        declarations: Vec<(String, String)>,
        attributes: Vec<(String, String)>,
        children: Vec<XmlNode>,
    },
    Text(String),
}

impl XmlNode {
    /// Concatenated text of this node and its descendants
    pub fn text_content(&self) -> String {
        match self {
            XmlNode::Text(s) => s.clone(),
            XmlNode::Element { children, .. } => {
                children.iter().map(|child| child.text_content()).collect()
            }
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            XmlNode::Element { name, .. } => Some(name),
            XmlNode::Text(_) => None,
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        match self {
            XmlNode::Element { namespace, .. } => namespace.as_deref(),
            XmlNode::Text(_) => None,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        match self {
            XmlNode::Element { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str()),
            XmlNode::Text(_) => None,
        }
    }

    pub fn children(&self) -> &[XmlNode] {
        match self {
            XmlNode::Element { children, .. } => children,
            XmlNode::Text(_) => &[],
        }
    }

    /// Child elements, skipping text
    pub fn elements(&self) -> impl Iterator<Item = &XmlNode> {
        self.children()
            .iter()
            .filter(|c| matches!(c, XmlNode::Element { .. }))
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }

    fn write_xml(&self, out: &mut String) {
        match self {
            XmlNode::Element {
                name,
                declarations,
                attributes,
                children,
                ..
            } => {
                out.push('<');
                out.push_str(name);
                for (prefix, uri) in declarations {
                    if prefix.is_empty() {
                        out.push_str(" xmlns");
                    } else {
                        out.push_str(" xmlns:");
                        out.push_str(prefix);
                    }
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(uri));
                    out.push('"');
                }
                for (k, v) in attributes {
                    out.push(' ');
                    out.push_str(k);
                    out.push_str("=\"");
                    out.push_str(&escape_attribute(v));
                    out.push('"');
                }

                if children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for child in children {
                        child.write_xml(out);
                    }
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                }
            }
            XmlNode::Text(s) => out.push_str(&escape_text(s)),
        }
    }
}

/// Builds an [`XmlNode`] tree from sink events
#[derive(Debug, Default)]
pub struct XmlTreeSink {
    stack: Vec<XmlNode>,
    pending_declarations: Vec<(String, String)>,
    root: Option<XmlNode>,
}

impl XmlTreeSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The document element, once the document has been completed
    pub fn into_root(self) -> Option<XmlNode> {
        self.root
    }
}

impl XmlEventSink for XmlTreeSink {
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) {
        self.pending_declarations
            .push((prefix.to_string(), uri.to_string()));
    }

    fn start_element(&mut self, uri: &str, _local_name: &str, qname: &str, attributes: &[XmlAttribute]) {
        self.stack.push(XmlNode::Element {
            name: qname.to_string(),
            namespace: (!uri.is_empty()).then(|| uri.to_string()),
            declarations: std::mem::take(&mut self.pending_declarations),
            attributes: attributes
                .iter()
                .map(|a| (a.qname.clone(), a.value.clone()))
                .collect(),
            children: Vec::new(),
        });
    }

    fn characters(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(XmlNode::Element { children, .. }) = self.stack.last_mut() {
            match children.last_mut() {
                Some(XmlNode::Text(existing)) => existing.push_str(text),
                _ => children.push(XmlNode::Text(text.to_string())),
            }
        }
    }

    fn end_element(&mut self, _uri: &str, _local_name: &str, _qname: &str) {
        let Some(node) = self.stack.pop() else {
            return;
        };
        match self.stack.last_mut() {
            Some(XmlNode::Element { children, .. }) => children.push(node),
            _ => self.root = Some(node),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> XmlNode {
        let mut sink = XmlTreeSink::new();
        sink.start_document();
        sink.start_prefix_mapping("", "urn:x");
        sink.start_element("urn:x", "doc", "doc", &[XmlAttribute::new("id", "7")]);
        sink.characters("a");
        sink.characters("b");
        sink.start_element("urn:x", "item", "item", &[]);
        sink.characters("c & d");
        sink.end_element("urn:x", "item", "item");
        sink.end_element("urn:x", "doc", "doc");
        sink.end_document();
        sink.into_root().unwrap()
    }

    #[test]
    fn test_tree_shape() {
        let root = sample();
        assert_eq!(root.name(), Some("doc"));
        assert_eq!(root.namespace(), Some("urn:x"));
        assert_eq!(root.attribute("id"), Some("7"));
        assert_eq!(root.children().len(), 2);
        assert_eq!(root.children()[0], XmlNode::Text("ab".to_string()));
        assert_eq!(root.elements().count(), 1);
        assert_eq!(root.text_content(), "abc & d");
    }

    #[test]
    fn test_to_xml() {
        assert_eq!(
            sample().to_xml(),
            r#"<doc xmlns="urn:x" id="7">ab<item>c &amp; d</item></doc>"#
        );
    }
}
