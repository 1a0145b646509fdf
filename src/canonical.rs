//! Canonical grammar handed to a parsing engine
//!
//! A [`CanonicalGrammar`] is a flat list of rules, each a left-hand
//! nonterminal and a sequence of [`Symbol`]s. Every symbol carries an ordered
//! [`ParserAttributes`] map describing how its match is rendered to XML. The
//! structures are immutable once built.

use crate::charclass::{member, RangeSet};
use indexmap::IndexMap;
use std::fmt;

pub const MARK: &str = "mark";
pub const TMARK: &str = "tmark";
pub const NAME: &str = "name";
pub const RENAME: &str = "rename";
pub const OPTIONAL: &str = "optional";
pub const PRUNING: &str = "pruning";
pub const PRIORITY: &str = "priority";
pub const DISCARD_EMPTY: &str = "discard-empty";
pub const INSERTION: &str = "insertion";
pub const REWRITE: &str = "rewrite";
pub const XMLNS: &str = "xmlns";
pub const TOKEN: &str = "token";
pub const REGEX: &str = "regex";
pub const METADATA: &str = "metadata";

/// Name of the empty rule that every insertion refers to
pub const INSERTION_RULE: &str = "$insertion";

/// Ordered key/value attributes of a symbol
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserAttributes {
    map: IndexMap<String, String>,
}

impl ParserAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.map.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|v| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Nonterminal mark: `^`, `@`, `-`, or `+` for insertions. Defaults to `^`.
    pub fn mark(&self) -> char {
        self.first_char(MARK).unwrap_or('^')
    }

    /// Terminal mark: `^` or `-`. Defaults to `^`.
    pub fn tmark(&self) -> char {
        self.first_char(TMARK).unwrap_or('^')
    }

    pub fn name(&self) -> &str {
        self.get(NAME).unwrap_or("")
    }

    /// The name to use in the output: the rename if there is one
    pub fn output_name(&self) -> &str {
        self.get(RENAME).unwrap_or_else(|| self.name())
    }

    /// Numeric priority; missing or unparsable values count as zero
    pub fn priority(&self) -> f64 {
        self.get(PRIORITY)
            .and_then(|p| p.parse::<f64>().ok())
            .unwrap_or(0.0)
    }

    pub fn discard_empty(&self) -> bool {
        self.get(DISCARD_EMPTY) == Some("true")
    }

    fn first_char(&self, key: &str) -> Option<char> {
        self.get(key).and_then(|v| v.chars().next())
    }
}

/// What a terminal matches: one character or a character set
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenMatcher {
    Char(char),
    Set {
        set: RangeSet,
        /// `false` for an exclusion: the terminal matches what is not in `set`
        inclusion: bool,
        /// Source notation, e.g. `~["a"; Nd]`
        description: String,
    },
}

impl TokenMatcher {
    pub fn matches(&self, ch: char) -> bool {
        match self {
            TokenMatcher::Char(c) => *c == ch,
            TokenMatcher::Set { set, inclusion, .. } => set.contains(ch) == *inclusion,
        }
    }
}

impl fmt::Display for TokenMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenMatcher::Char(ch) => write!(f, "{}", member(*ch)),
            TokenMatcher::Set { description, .. } if !description.is_empty() => {
                write!(f, "{}", description)
            }
            TokenMatcher::Set { set, inclusion, .. } => {
                write!(f, "{}[{}]", if *inclusion { "" } else { "~" }, set)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Symbol {
    Nonterminal {
        name: String,
        attributes: ParserAttributes,
    },
    Terminal {
        matcher: TokenMatcher,
        attributes: ParserAttributes,
    },
}

impl Symbol {
    pub fn nonterminal(name: &str, attributes: ParserAttributes) -> Self {
        Symbol::Nonterminal {
            name: name.to_string(),
            attributes,
        }
    }

    pub fn terminal(matcher: TokenMatcher, attributes: ParserAttributes) -> Self {
        Symbol::Terminal {
            matcher,
            attributes,
        }
    }

    pub fn attributes(&self) -> &ParserAttributes {
        match self {
            Symbol::Nonterminal { attributes, .. } | Symbol::Terminal { attributes, .. } => {
                attributes
            }
        }
    }

    /// Name of a nonterminal, `None` for terminals
    pub fn name(&self) -> Option<&str> {
        match self {
            Symbol::Nonterminal { name, .. } => Some(name),
            Symbol::Terminal { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Symbol::Terminal { .. })
    }

    /// True if this is a terminal matching `ch`
    pub fn matches(&self, ch: char) -> bool {
        match self {
            Symbol::Terminal { matcher, .. } => matcher.matches(ch),
            Symbol::Nonterminal { .. } => false,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Nonterminal { name, .. } => write!(f, "{}", name),
            Symbol::Terminal { matcher, .. } => write!(f, "{}", matcher),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalRule {
    pub lhs: Symbol,
    pub rhs: Vec<Symbol>,
}

impl CanonicalRule {
    pub fn name(&self) -> &str {
        self.lhs.name().unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.rhs.is_empty()
    }
}

impl fmt::Display for CanonicalRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ::=", self.lhs)?;
        if self.rhs.is_empty() {
            return write!(f, " ε");
        }
        for (i, symbol) in self.rhs.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", sep, symbol)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalGrammar {
    rules: Vec<CanonicalRule>,
    start: Symbol,
    version: Option<String>,
    default_namespace: Option<String>,
}

impl CanonicalGrammar {
    pub fn new(
        rules: Vec<CanonicalRule>,
        start: Symbol,
        version: Option<String>,
        default_namespace: Option<String>,
    ) -> Self {
        CanonicalGrammar {
            rules,
            start,
            version,
            default_namespace,
        }
    }

    pub fn rules(&self) -> &[CanonicalRule] {
        &self.rules
    }

    /// Every rule whose left-hand side is `name`, in grammar order
    pub fn rules_for<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a CanonicalRule> + 'a {
        self.rules.iter().filter(move |r| r.name() == name)
    }

    /// The start symbol, with the attributes of the first rule
    pub fn start(&self) -> &Symbol {
        &self.start
    }

    pub fn start_name(&self) -> &str {
        self.start.name().unwrap_or("")
    }

    /// Version declared in the grammar's prolog
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn default_namespace(&self) -> Option<&str> {
        self.default_namespace.as_deref()
    }
}

impl fmt::Display for CanonicalGrammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rule in &self.rules {
            writeln!(f, "{}", rule)?;
        }
        Ok(())
    }
}
