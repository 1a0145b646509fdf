//! XML event sinks
//!
//! Tree construction and error rendering both write through [`XmlEventSink`],
//! a SAX-style stream of document, namespace, element and text events.
//! [`StringSink`] serializes the stream to XML text.

use crate::xml_chars::{escape_attribute, escape_text};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub uri: String,
    pub local_name: String,
    pub qname: String,
    pub value: String,
}

impl XmlAttribute {
    /// An attribute in no namespace
    pub fn new(name: &str, value: &str) -> Self {
        XmlAttribute {
            uri: String::new(),
            local_name: name.to_string(),
            qname: name.to_string(),
            value: value.to_string(),
        }
    }

    pub fn qualified(uri: &str, prefix: &str, local_name: &str, value: &str) -> Self {
        XmlAttribute {
            uri: uri.to_string(),
            local_name: local_name.to_string(),
            qname: format!("{}:{}", prefix, local_name),
            value: value.to_string(),
        }
    }
}

pub trait XmlEventSink {
    fn start_document(&mut self) {}

    fn end_document(&mut self) {}

    /// Declares `prefix` (empty for the default namespace) on the next element
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str);

    fn start_element(&mut self, uri: &str, local_name: &str, qname: &str, attributes: &[XmlAttribute]);

    fn characters(&mut self, text: &str);

    fn end_element(&mut self, uri: &str, local_name: &str, qname: &str);
}

/// Serializes events to a string; empty elements use the `<x/>` form
#[derive(Debug, Default)]
pub struct StringSink {
    output: String,
    pending_mappings: Vec<(String, String)>,
    tag_open: bool,
}

impl StringSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.output
    }

    pub fn into_string(self) -> String {
        self.output
    }

    fn close_start_tag(&mut self) {
        if self.tag_open {
            self.output.push('>');
            self.tag_open = false;
        }
    }
}

impl XmlEventSink for StringSink {
    fn start_prefix_mapping(&mut self, prefix: &str, uri: &str) {
        self.pending_mappings
            .push((prefix.to_string(), uri.to_string()));
    }

    fn start_element(&mut self, _uri: &str, _local_name: &str, qname: &str, attributes: &[XmlAttribute]) {
        self.close_start_tag();
        self.output.push('<');
        self.output.push_str(qname);

        for (prefix, uri) in std::mem::take(&mut self.pending_mappings) {
            if prefix.is_empty() {
                self.output.push_str(" xmlns=\"");
            } else {
                self.output.push_str(" xmlns:");
                self.output.push_str(&prefix);
                self.output.push_str("=\"");
            }
            self.output.push_str(&escape_attribute(&uri));
            self.output.push('"');
        }
        for attr in attributes {
            self.output.push(' ');
            self.output.push_str(&attr.qname);
            self.output.push_str("=\"");
            self.output.push_str(&escape_attribute(&attr.value));
            self.output.push('"');
        }
        self.tag_open = true;
    }

    fn characters(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.close_start_tag();
        self.output.push_str(&escape_text(text));
    }

    fn end_element(&mut self, _uri: &str, _local_name: &str, qname: &str) {
        if self.tag_open {
            self.output.push_str("/>");
            self.tag_open = false;
        } else {
            self.output.push_str("</");
            self.output.push_str(qname);
            self.output.push('>');
        }
    }
}
