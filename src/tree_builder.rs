//! Building the XML result of a parse
//!
//! A parsing engine walks the derivation it selected and reports it as
//! [`ParseEventHandler`] events. [`TreeBuilder`] turns those events into an
//! XML tree according to the marks on each symbol:
//!
//! - `^` opens an element
//! - `@` collects the text below it into an attribute of the nearest element
//! - `-` contributes only its content
//! - `+` contributes its inserted text
//!
//! Terminals with `tmark="-"` are dropped. Once the derivation is complete,
//! [`TreeBuilder::finish`] checks that exactly one element remains and writes
//! it to an [`XmlEventSink`].

use crate::canonical::{CanonicalGrammar, ParserAttributes, INSERTION, REWRITE, XMLNS};
use crate::error::{IxmlError, Result};
use crate::options::ProcessorOptions;
use crate::selector::TreeSelector;
use crate::sink::{XmlAttribute, XmlEventSink};
use crate::xml_chars::{first_invalid_char, is_valid_name};
use indexmap::IndexMap;
use log::debug;

/// Namespace of the `ixml:state` attribute
pub const IXML_NS: &str = "http://invisiblexml.org/NS";

/// Namespace of the `n:symbol` wrappers shown for hidden nonterminals
pub const NINEML_NS: &str = "https://nineml.org/ns/";

/// Grammar versions this processor implements
pub const KNOWN_VERSIONS: &[&str] = &["1.0", "1.0-nineml"];

/// Events produced while walking one derivation
pub trait ParseEventHandler {
    fn start_nonterminal(&mut self, attributes: &ParserAttributes) -> Result<()>;

    fn end_nonterminal(&mut self, attributes: &ParserAttributes) -> Result<()>;

    /// A terminal matched `ch`
    fn token(&mut self, ch: char, attributes: &ParserAttributes) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
enum Content {
    Element(Element),
    Text(String),
}

impl Content {
    fn text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Element(e) => e.children.iter().map(Content::text).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Element {
    name: String,
    /// An `n:symbol` wrapper for a hidden nonterminal
    bnf: bool,
    namespace: Option<String>,
    attributes: IndexMap<String, String>,
    children: Vec<Content>,
}

impl Element {
    fn new(name: String) -> Self {
        Element {
            name,
            bnf: false,
            namespace: None,
            attributes: IndexMap::new(),
            children: Vec::new(),
        }
    }

    fn push(&mut self, content: Content) {
        push_merged(&mut self.children, content);
    }

    fn contains_bnf(&self) -> bool {
        self.bnf
            || self.children.iter().any(|c| match c {
                Content::Element(e) => e.contains_bnf(),
                Content::Text(_) => false,
            })
    }
}

fn push_merged(children: &mut Vec<Content>, content: Content) {
    if let (Some(Content::Text(last)), Content::Text(text)) = (children.last_mut(), &content) {
        last.push_str(text);
        return;
    }
    children.push(content);
}

#[derive(Debug)]
enum OpenNode {
    Element {
        symbol: String,
        element: Element,
        discard_empty: bool,
    },
    Attribute {
        symbol: String,
        name: String,
        value: String,
    },
    Omitted {
        symbol: String,
    },
    Insertion {
        symbol: String,
    },
}

impl OpenNode {
    fn symbol(&self) -> &str {
        match self {
            OpenNode::Element { symbol, .. }
            | OpenNode::Attribute { symbol, .. }
            | OpenNode::Omitted { symbol }
            | OpenNode::Insertion { symbol } => symbol,
        }
    }
}

pub struct TreeBuilder {
    options: ProcessorOptions,
    version: Option<String>,
    default_namespace: Option<String>,
    stack: Vec<OpenNode>,
    top_level: Vec<Content>,
}

impl TreeBuilder {
    pub fn new(options: &ProcessorOptions, version: Option<&str>) -> Self {
        TreeBuilder {
            options: options.clone(),
            version: version.map(String::from),
            default_namespace: None,
            stack: Vec::new(),
            top_level: Vec::new(),
        }
    }

    pub fn for_grammar(grammar: &CanonicalGrammar, options: &ProcessorOptions) -> Self {
        Self::new(options, grammar.version()).with_default_namespace(grammar.default_namespace())
    }

    /// Namespace for the output when the root symbol does not carry one
    pub fn with_default_namespace(mut self, uri: Option<&str>) -> Self {
        self.default_namespace = uri.map(String::from);
        self
    }

    fn inside_attribute(&self) -> bool {
        self.stack
            .iter()
            .any(|n| matches!(n, OpenNode::Attribute { .. }))
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if self.options.assert_valid_xml_names && !is_valid_name(name) {
            return Err(IxmlError::InvalidXmlName(name.to_string()));
        }
        Ok(())
    }

    fn push_text(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        if self.options.assert_valid_xml_characters {
            if let Some(bad) = first_invalid_char(text) {
                return Err(IxmlError::InvalidXmlChar(bad as u32));
            }
        }
        self.push_content(Content::Text(text.to_string()));
        Ok(())
    }

    /// Hand finished content to the innermost open element or attribute
    fn push_content(&mut self, content: Content) {
        for node in self.stack.iter_mut().rev() {
            match node {
                OpenNode::Element { element, .. } => {
                    element.push(content);
                    return;
                }
                OpenNode::Attribute { value, .. } => {
                    value.push_str(&content.text());
                    return;
                }
                OpenNode::Omitted { .. } | OpenNode::Insertion { .. } => {}
            }
        }
        push_merged(&mut self.top_level, content);
    }

    fn attach_attribute(&mut self, name: String, value: String) -> Result<()> {
        if name == "xmlns" || name.starts_with("xmlns:") {
            return Err(IxmlError::ReservedAttribute(name));
        }
        for node in self.stack.iter_mut().rev() {
            if let OpenNode::Element { element, .. } = node {
                if element.bnf {
                    continue;
                }
                if element.attributes.contains_key(&name) {
                    return Err(IxmlError::DuplicateAttribute {
                        element: element.name.clone(),
                        attribute: name,
                    });
                }
                element.attributes.insert(name, value);
                return Ok(());
            }
        }
        Err(IxmlError::AttributeAtRoot(name))
    }

    /// Check the result and write it, with its `ixml:state`, to `sink`
    pub fn finish(self, selector: &dyn TreeSelector, sink: &mut dyn XmlEventSink) -> Result<()> {
        if let Some(open) = self.stack.last() {
            return Err(IxmlError::UnbalancedEvents(format!(
                "{} is still open",
                open.symbol()
            )));
        }

        let mut top = self.top_level.into_iter();
        let root = match (top.next(), top.next()) {
            (Some(Content::Element(root)), None) => root,
            _ => return Err(IxmlError::NotSingleRooted),
        };

        let ambiguous = if self.options.strict_ambiguity {
            selector.saw_choice()
        } else {
            selector.made_ambiguous_choice()
        };
        let mut states = Vec::new();
        if ambiguous && !self.options.suppress_ambiguous_state {
            states.push("ambiguous");
        }
        if let Some(version) = &self.version {
            if !KNOWN_VERSIONS.contains(&version.as_str())
                && !self.options.suppress_version_mismatch_state
            {
                states.push("version-mismatch");
            }
        }
        debug!("[tree] root <{}>, state {:?}", root.name, states);

        sink.start_document();
        let default_ns = root
            .namespace
            .clone()
            .or(self.default_namespace)
            .unwrap_or_default();
        if !default_ns.is_empty() {
            sink.start_prefix_mapping("", &default_ns);
        }
        let mut root_attributes = Vec::new();
        if !states.is_empty() {
            sink.start_prefix_mapping("ixml", IXML_NS);
            root_attributes.push(XmlAttribute::qualified(
                IXML_NS,
                "ixml",
                "state",
                &states.join(" "),
            ));
        }
        if root.contains_bnf() {
            sink.start_prefix_mapping("n", NINEML_NS);
        }
        emit_element(&root, &default_ns, root_attributes, sink);
        sink.end_document();
        Ok(())
    }
}

fn emit_element(
    element: &Element,
    default_ns: &str,
    mut attributes: Vec<XmlAttribute>,
    sink: &mut dyn XmlEventSink,
) {
    let (uri, local) = if element.bnf {
        (NINEML_NS, "symbol")
    } else {
        (default_ns, element.name.as_str())
    };
    attributes.extend(
        element
            .attributes
            .iter()
            .map(|(name, value)| XmlAttribute::new(name, value)),
    );

    sink.start_element(uri, local, &element.name, &attributes);
    for child in &element.children {
        match child {
            Content::Text(text) => sink.characters(text),
            Content::Element(e) => emit_element(e, default_ns, Vec::new(), sink),
        }
    }
    sink.end_element(uri, local, &element.name);
}

impl ParseEventHandler for TreeBuilder {
    fn start_nonterminal(&mut self, attributes: &ParserAttributes) -> Result<()> {
        let symbol = attributes.name().to_string();
        let mark = attributes.mark();

        // Inside an attribute only text counts
        let node = if mark == '+' {
            self.push_text(attributes.get(INSERTION).unwrap_or(""))?;
            OpenNode::Insertion { symbol }
        } else if self.inside_attribute() {
            OpenNode::Omitted { symbol }
        } else {
            match mark {
                '@' => {
                    let name = attributes.output_name().to_string();
                    self.check_name(&name)?;
                    OpenNode::Attribute {
                        symbol,
                        name,
                        value: String::new(),
                    }
                }
                '-' if self.options.show_bnf_nonterminals => {
                    let mut element = Element::new("n:symbol".to_string());
                    element.bnf = true;
                    element.attributes.insert("name".to_string(), symbol.clone());
                    OpenNode::Element {
                        symbol,
                        element,
                        discard_empty: false,
                    }
                }
                '-' => OpenNode::Omitted { symbol },
                _ => {
                    let name = attributes.output_name().to_string();
                    self.check_name(&name)?;
                    let mut element = Element::new(name);
                    element.namespace = attributes.get(XMLNS).map(String::from);
                    OpenNode::Element {
                        symbol,
                        element,
                        discard_empty: attributes.discard_empty(),
                    }
                }
            }
        };

        self.stack.push(node);
        Ok(())
    }

    fn end_nonterminal(&mut self, attributes: &ParserAttributes) -> Result<()> {
        let Some(node) = self.stack.pop() else {
            return Err(IxmlError::UnbalancedEvents(format!(
                "end of {} with nothing open",
                attributes.name()
            )));
        };
        if node.symbol() != attributes.name() {
            return Err(IxmlError::UnbalancedEvents(format!(
                "end of {} while {} is open",
                attributes.name(),
                node.symbol()
            )));
        }

        match node {
            OpenNode::Element {
                element,
                discard_empty,
                ..
            } => {
                if discard_empty && element.attributes.is_empty() && element.children.is_empty() {
                    debug!("[tree] discarding empty <{}>", element.name);
                    return Ok(());
                }
                self.push_content(Content::Element(element));
                Ok(())
            }
            OpenNode::Attribute { name, value, .. } => self.attach_attribute(name, value),
            OpenNode::Omitted { .. } | OpenNode::Insertion { .. } => Ok(()),
        }
    }

    fn token(&mut self, ch: char, attributes: &ParserAttributes) -> Result<()> {
        if attributes.tmark() == '-' {
            return Ok(());
        }
        match attributes.get(REWRITE) {
            Some(text) => self.push_text(text),
            None => {
                let mut buf = [0u8; 4];
                self.push_text(ch.encode_utf8(&mut buf))
            }
        }
    }
}
