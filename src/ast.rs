//! Grammar model for iXML grammars
//!
//! A [`Grammar`] owns an arena of [`Node`]s addressed by [`NodeId`]. Parent
//! links are plain indices used for lookups; children are ordered index lists
//! that the rewrite engine edits in place. Nodes detached by a rewrite stay in
//! the arena but are no longer reachable from the root.

use crate::error::{IxmlError, Result};
use crate::pragmas::Pragma;
use indexmap::IndexMap;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Serialization mark of a rule or nonterminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mark {
    Element,   // ^name
    Attribute, // @name
    Hidden,    // -name
}

impl Mark {
    pub fn from_char(ch: char) -> Result<Self> {
        match ch {
            '^' => Ok(Mark::Element),
            '@' => Ok(Mark::Attribute),
            '-' => Ok(Mark::Hidden),
            other => Err(IxmlError::InvalidMark(other)),
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Mark::Element => '^',
            Mark::Attribute => '@',
            Mark::Hidden => '-',
        }
    }
}

/// Mark of a terminal: kept in the output or dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TMark {
    Keep,   // ^"x" or plain "x"
    Hidden, // -"x"
}

impl TMark {
    pub fn from_char(ch: char) -> Result<Self> {
        match ch {
            '^' => Ok(TMark::Keep),
            '-' => Ok(TMark::Hidden),
            other => Err(IxmlError::InvalidMark(other)),
        }
    }

    pub fn as_char(self) -> char {
        match self {
            TMark::Keep => '^',
            TMark::Hidden => '-',
        }
    }
}

/// The text of a literal or insertion, given either as a string or as `#hex`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiteralValue {
    String(String),
    Hex(char),
}

impl LiteralValue {
    /// Parse the digits of a `#hex` literal
    pub fn from_hex(digits: &str) -> Result<Self> {
        let code = u32::from_str_radix(digits, 16)
            .map_err(|_| IxmlError::InvalidHex(digits.to_string()))?;
        char::from_u32(code)
            .map(LiteralValue::Hex)
            .ok_or_else(|| IxmlError::InvalidHex(digits.to_string()))
    }

    pub fn text(&self) -> String {
        match self {
            LiteralValue::String(s) => s.clone(),
            LiteralValue::Hex(ch) => ch.to_string(),
        }
    }

    fn to_ixml(&self) -> String {
        match self {
            LiteralValue::String(s) => format!("\"{}\"", s.replace('"', "\"\"")),
            LiteralValue::Hex(ch) => format!("#{:x}", *ch as u32),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Grammar root; children are the prolog, raw pragmas and rules
    Ixml,
    Prolog,
    Version(String),
    /// Name lives on the node; one child, the `Alts` body (or `Alt` once split)
    Rule { mark: Mark, rename: Option<String> },
    Alts,
    Alt,
    /// An unmarked reference takes the mark of the rule it names
    Nonterminal { mark: Option<Mark>, rename: Option<String> },
    Literal { tmark: TMark, value: LiteralValue },
    Insertion { value: LiteralValue },
    /// Unicode general category code, inside an inclusion or exclusion
    Class { code: String },
    Range { from: char, to: char },
    Inclusion { tmark: TMark },
    Exclusion { tmark: TMark },
    /// Children: the repeated factor, then an optional `Sep`
    Repeat0,
    Repeat1,
    Sep,
    Option,
    /// Unprocessed pragma as written in the source
    Pragma { name: String, data: String },
}

impl NodeKind {
    pub fn label(&self) -> &'static str {
        match self {
            NodeKind::Ixml => "ixml",
            NodeKind::Prolog => "prolog",
            NodeKind::Version(_) => "version",
            NodeKind::Rule { .. } => "rule",
            NodeKind::Alts => "alts",
            NodeKind::Alt => "alt",
            NodeKind::Nonterminal { .. } => "nonterminal",
            NodeKind::Literal { .. } => "literal",
            NodeKind::Insertion { .. } => "insertion",
            NodeKind::Class { .. } => "class",
            NodeKind::Range { .. } => "range",
            NodeKind::Inclusion { .. } => "inclusion",
            NodeKind::Exclusion { .. } => "exclusion",
            NodeKind::Repeat0 => "repeat0",
            NodeKind::Repeat1 => "repeat1",
            NodeKind::Sep => "sep",
            NodeKind::Option => "option",
            NodeKind::Pragma { .. } => "pragma",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub name: Option<String>,
    pub optional: bool,
    pub pragmas: Vec<Pragma>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    fn new(kind: NodeKind, name: Option<String>) -> Self {
        Node {
            kind,
            name,
            optional: false,
            pragmas: Vec::new(),
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }
}

/// Root aggregate: the node arena plus grammar-wide bookkeeping
#[derive(Debug, Clone)]
pub struct Grammar {
    nodes: Vec<Node>,
    root: NodeId,
    syn_count: usize,
    start_rule: Option<String>,
    namespaces: IndexMap<String, String>,
    default_namespace: Option<String>,
    pending_rules: Vec<NodeId>,
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

impl Grammar {
    pub fn new() -> Self {
        Grammar {
            nodes: vec![Node::new(NodeKind::Ixml, None)],
            root: NodeId(0),
            syn_count: 0,
            start_rule: None,
            namespaces: IndexMap::new(),
            default_namespace: None,
            pending_rules: Vec::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    /// Create a detached node
    pub fn add_node(&mut self, kind: NodeKind) -> NodeId {
        self.nodes.push(Node::new(kind, None));
        NodeId(self.nodes.len() - 1)
    }

    pub fn add_named(&mut self, kind: NodeKind, name: &str) -> NodeId {
        self.nodes.push(Node::new(kind, Some(name.to_string())));
        NodeId(self.nodes.len() - 1)
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Put `new` where `old` was among its parent's children
    pub fn replace(&mut self, old: NodeId, new: NodeId) {
        if let Some(parent) = self.nodes[old.0].parent {
            for slot in self.nodes[parent.0].children.iter_mut() {
                if *slot == old {
                    *slot = new;
                }
            }
            self.nodes[new.0].parent = Some(parent);
            self.nodes[old.0].parent = None;
        }
    }

    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    /// Walk parent links up to the topmost ancestor
    pub fn root_of(&self, mut id: NodeId) -> NodeId {
        while let Some(parent) = self.nodes[id.0].parent {
            id = parent;
        }
        id
    }

    /// The nearest enclosing rule, if any
    pub fn rule_of(&self, mut id: NodeId) -> Option<NodeId> {
        loop {
            if matches!(self.nodes[id.0].kind, NodeKind::Rule { .. }) {
                return Some(id);
            }
            id = self.nodes[id.0].parent?;
        }
    }

    /// Clone a subtree into fresh, detached nodes
    pub fn deep_copy(&mut self, id: NodeId) -> NodeId {
        let mut copy = self.nodes[id.0].clone();
        copy.parent = None;
        let children = std::mem::take(&mut copy.children);
        self.nodes.push(copy);
        let new_id = NodeId(self.nodes.len() - 1);
        for child in children {
            let child_copy = self.deep_copy(child);
            self.append_child(new_id, child_copy);
        }
        new_id
    }

    /// Append a rule to the grammar; the first rule added is the start rule
    pub fn add_rule(&mut self, rule: NodeId) {
        if self.start_rule.is_none() {
            self.start_rule = self.nodes[rule.0].name.clone();
        }
        let root = self.root;
        self.append_child(root, rule);
    }

    /// Stage a rule created mid-pass; it joins the rule list on the next drain
    pub fn queue_rule(&mut self, rule: NodeId) {
        self.pending_rules.push(rule);
    }

    pub fn pending_rule_count(&self) -> usize {
        self.pending_rules.len()
    }

    /// Move every staged rule into the rule list, returning how many moved
    pub fn drain_pending_rules(&mut self) -> usize {
        let pending = std::mem::take(&mut self.pending_rules);
        let count = pending.len();
        for rule in pending {
            self.add_rule(rule);
        }
        count
    }

    pub fn rules(&self) -> Vec<NodeId> {
        self.children(self.root)
            .iter()
            .copied()
            .filter(|c| matches!(self.kind(*c), NodeKind::Rule { .. }))
            .collect()
    }

    pub fn rules_named(&self, name: &str) -> Vec<NodeId> {
        self.rules()
            .into_iter()
            .filter(|r| self.node(*r).name() == name)
            .collect()
    }

    pub fn start_rule(&self) -> Option<&str> {
        self.start_rule.as_deref()
    }

    /// Declared ixml version from the prolog, if any
    pub fn version(&self) -> Option<String> {
        let prolog = self
            .children(self.root)
            .iter()
            .find(|c| matches!(self.kind(**c), NodeKind::Prolog))?;
        self.children(*prolog).iter().find_map(|c| match self.kind(*c) {
            NodeKind::Version(v) => Some(v.clone()),
            _ => None,
        })
    }

    pub fn namespaces(&self) -> &IndexMap<String, String> {
        &self.namespaces
    }

    pub fn bind_namespace(&mut self, prefix: &str, uri: &str) {
        self.namespaces.insert(prefix.to_string(), uri.to_string());
    }

    pub fn namespace_uri(&self, prefix: &str) -> Option<&str> {
        self.namespaces.get(prefix).map(|s| s.as_str())
    }

    pub fn default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }

    pub fn set_default_namespace(&mut self, uri: &str) {
        self.default_namespace = Some(uri.to_string());
    }

    /// Mint a grammar-unique name for a synthetic rule
    pub fn next_synthetic_name(&mut self, hint: &str, kind: &str) -> String {
        self.syn_count += 1;
        format!("${}_{}_{}", hint, self.syn_count, kind)
    }

    pub fn synthetic_count(&self) -> usize {
        self.syn_count
    }

    /// Every node reachable from the root, in document order
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            for child in self.children(next).iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Render a node back to ixml notation
    pub fn to_ixml(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_ixml(id, &mut out);
        out
    }

    fn write_ixml(&self, id: NodeId, out: &mut String) {
        let node = self.node(id);
        match &node.kind {
            NodeKind::Ixml => {
                for child in &node.children {
                    self.write_ixml(*child, out);
                    out.push('\n');
                }
            }
            NodeKind::Prolog => {
                for child in &node.children {
                    self.write_ixml(*child, out);
                }
            }
            NodeKind::Version(v) => {
                let _ = write!(out, "ixml version \"{}\".", v);
            }
            NodeKind::Rule { mark, .. } => {
                if *mark != Mark::Element {
                    out.push(mark.as_char());
                }
                let _ = write!(out, "{}: ", node.name());
                for child in &node.children {
                    self.write_ixml(*child, out);
                }
                out.push('.');
            }
            NodeKind::Alts => {
                let nested = node
                    .parent
                    .is_some_and(|p| !matches!(self.kind(p), NodeKind::Rule { .. }));
                if nested {
                    out.push('(');
                }
                for (i, child) in node.children.iter().enumerate() {
                    if i > 0 {
                        out.push_str("; ");
                    }
                    self.write_ixml(*child, out);
                }
                if nested {
                    out.push(')');
                }
            }
            NodeKind::Alt => {
                for (i, child) in node.children.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    self.write_ixml(*child, out);
                }
            }
            NodeKind::Nonterminal { mark, .. } => {
                if let Some(mark) = mark {
                    out.push(mark.as_char());
                }
                out.push_str(node.name());
            }
            NodeKind::Literal { tmark, value } => {
                if *tmark == TMark::Hidden {
                    out.push('-');
                }
                out.push_str(&value.to_ixml());
            }
            NodeKind::Insertion { value } => {
                out.push('+');
                out.push_str(&value.to_ixml());
            }
            NodeKind::Class { code } => out.push_str(code),
            NodeKind::Range { from, to } => {
                let _ = write!(out, "#{:x}-#{:x}", *from as u32, *to as u32);
            }
            NodeKind::Inclusion { tmark } | NodeKind::Exclusion { tmark } => {
                if *tmark == TMark::Hidden {
                    out.push('-');
                }
                if matches!(node.kind, NodeKind::Exclusion { .. }) {
                    out.push('~');
                }
                out.push('[');
                for (i, child) in node.children.iter().enumerate() {
                    if i > 0 {
                        out.push_str("; ");
                    }
                    self.write_ixml(*child, out);
                }
                out.push(']');
            }
            NodeKind::Repeat0 | NodeKind::Repeat1 => {
                let op = if matches!(node.kind, NodeKind::Repeat0) { '*' } else { '+' };
                if let Some(first) = node.children.first() {
                    self.write_ixml(*first, out);
                }
                out.push(op);
                if let Some(sep) = node.children.get(1) {
                    out.push(op);
                    self.write_ixml(*sep, out);
                }
            }
            NodeKind::Sep => {
                if let Some(first) = node.children.first() {
                    self.write_ixml(*first, out);
                }
            }
            NodeKind::Option => {
                if let Some(first) = node.children.first() {
                    self.write_ixml(*first, out);
                }
                out.push('?');
            }
            NodeKind::Pragma { name, data } => {
                let _ = write!(out, "{{[{} {}]}}", name, data);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Grammar, NodeId, NodeId) {
        // greeting: "hi", name.
        let mut g = Grammar::new();
        let rule = g.add_named(
            NodeKind::Rule {
                mark: Mark::Element,
                rename: None,
            },
            "greeting",
        );
        let alts = g.add_node(NodeKind::Alts);
        let alt = g.add_node(NodeKind::Alt);
        let lit = g.add_node(NodeKind::Literal {
            tmark: TMark::Keep,
            value: LiteralValue::String("hi".to_string()),
        });
        let nt = g.add_named(
            NodeKind::Nonterminal {
                mark: None,
                rename: None,
            },
            "name",
        );
        g.append_child(alt, lit);
        g.append_child(alt, nt);
        g.append_child(alts, alt);
        g.append_child(rule, alts);
        g.add_rule(rule);
        (g, rule, nt)
    }

    #[test]
    fn test_mark_parsing() {
        assert_eq!(Mark::from_char('@').unwrap(), Mark::Attribute);
        assert_eq!(Mark::from_char('-').unwrap(), Mark::Hidden);
        assert_eq!(Mark::from_char('!'), Err(IxmlError::InvalidMark('!')));
        assert!(TMark::from_char('@').is_err());
    }

    #[test]
    fn test_hex_literal() {
        assert_eq!(LiteralValue::from_hex("41").unwrap().text(), "A");
        assert!(LiteralValue::from_hex("zz").is_err());
        assert!(LiteralValue::from_hex("d800").is_err());
    }

    #[test]
    fn test_root_and_rule_lookup() {
        let (g, rule, nt) = sample();
        assert_eq!(g.root_of(nt), g.root());
        assert_eq!(g.rule_of(nt), Some(rule));
        assert_eq!(g.start_rule(), Some("greeting"));
        assert_eq!(g.rules(), vec![rule]);
    }

    #[test]
    fn test_deep_copy_is_detached() {
        let (mut g, rule, _) = sample();
        let copy = g.deep_copy(rule);
        assert_ne!(copy, rule);
        assert_eq!(g.parent(copy), None);
        assert_eq!(g.to_ixml(copy), g.to_ixml(rule));
        assert_eq!(g.rules().len(), 1);
    }

    #[test]
    fn test_replace_and_detach() {
        let (mut g, rule, nt) = sample();
        let other = g.add_named(
            NodeKind::Nonterminal {
                mark: Some(Mark::Hidden),
                rename: None,
            },
            "other",
        );
        g.replace(nt, other);
        assert_eq!(g.to_ixml(rule), "greeting: \"hi\", -other.");
        g.detach(other);
        assert_eq!(g.to_ixml(rule), "greeting: \"hi\".");
    }

    #[test]
    fn test_pending_rules_drain() {
        let (mut g, _, _) = sample();
        let extra = g.add_named(
            NodeKind::Rule {
                mark: Mark::Hidden,
                rename: None,
            },
            "extra",
        );
        g.queue_rule(extra);
        assert_eq!(g.rules().len(), 1);
        assert_eq!(g.drain_pending_rules(), 1);
        assert_eq!(g.rules().len(), 2);
        assert_eq!(g.pending_rule_count(), 0);
        assert_eq!(g.start_rule(), Some("greeting"));
    }

    #[test]
    fn test_synthetic_names_are_unique() {
        let mut g = Grammar::new();
        let a = g.next_synthetic_name("x", "star");
        let b = g.next_synthetic_name("x", "star");
        assert_ne!(a, b);
        assert_eq!(a, "$x_1_star");
    }
}
