//! Grammar builder
//!
//! Turns a simplified [`Grammar`] into a [`CanonicalGrammar`]. Literals become
//! one terminal per character, sets become a single terminal over a
//! [`RangeSet`], insertions become references to the empty `$insertion` rule
//! and nonterminal references get their effective mark and name resolved
//! against the rule they refer to.

use crate::ast::{Grammar, Mark, NodeId, NodeKind, TMark};
use crate::canonical::{
    CanonicalGrammar, CanonicalRule, ParserAttributes, Symbol, TokenMatcher, DISCARD_EMPTY,
    INSERTION, INSERTION_RULE, MARK, METADATA, NAME, OPTIONAL, PRIORITY, PRUNING, REGEX, RENAME,
    REWRITE, TMARK, TOKEN, XMLNS,
};
use crate::charclass::{unicode_category_to_rangeset, RangeSet};
use crate::error::{IxmlError, Result};
use crate::pragmas::{Pragma, PragmaDirective};
use log::debug;
use std::collections::{HashMap, HashSet};

/// Reject rules defined twice and, when asked, references to missing rules.
/// Runs on the grammar as loaded, before simplification splits rules.
pub fn check_grammar(grammar: &Grammar, check_undefined: bool) -> Result<()> {
    let mut defined = HashSet::new();
    for rule in grammar.rules() {
        let name = grammar.node(rule).name();
        if !defined.insert(name) {
            return Err(IxmlError::RuleRedefined(name.to_string()));
        }
    }

    if !check_undefined {
        return Ok(());
    }
    for rule in grammar.rules() {
        for id in grammar.descendants(rule) {
            if !matches!(grammar.kind(id), NodeKind::Nonterminal { .. }) {
                continue;
            }
            let name = grammar.node(id).name();
            if !defined.contains(name) {
                return Err(IxmlError::UndefinedNonterminal {
                    name: name.to_string(),
                    rule: grammar.node(rule).name().to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Build the canonical grammar for a simplified grammar
pub fn build_grammar(grammar: &Grammar) -> Result<CanonicalGrammar> {
    GrammarBuilder::new(grammar).build()
}

/// What references inherit from the rule they name
#[derive(Debug, Clone)]
struct RuleInfo {
    mark: Mark,
    rename: Option<String>,
    discard_empty: bool,
    priority: Option<f64>,
}

pub struct GrammarBuilder<'g> {
    grammar: &'g Grammar,
    rules: HashMap<String, RuleInfo>,
    default_priority: Option<f64>,
    uses_insertion: bool,
}

impl<'g> GrammarBuilder<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        let mut rules = HashMap::new();
        for rule in grammar.rules() {
            let node = grammar.node(rule);
            let NodeKind::Rule { mark, rename } = &node.kind else {
                continue;
            };
            rules.entry(node.name().to_string()).or_insert_with(|| RuleInfo {
                mark: *mark,
                rename: rename.clone(),
                discard_empty: has_directive(&node.pragmas, |d| {
                    matches!(d, PragmaDirective::DiscardEmpty)
                }),
                priority: node.pragmas.iter().find_map(|p| match p.directive {
                    PragmaDirective::Priority(weight) => Some(weight),
                    _ => None,
                }),
            });
        }

        let default_priority = grammar
            .node(grammar.root())
            .pragmas
            .iter()
            .find_map(|p| match p.directive {
                PragmaDirective::DefaultPriority(weight) => Some(weight),
                _ => None,
            });

        GrammarBuilder {
            grammar,
            rules,
            default_priority,
            uses_insertion: false,
        }
    }

    pub fn build(mut self) -> Result<CanonicalGrammar> {
        let grammar = self.grammar;
        let start_name = grammar.start_rule().ok_or(IxmlError::EmptyGrammar)?;
        let start_rule = grammar
            .rules_named(start_name)
            .first()
            .copied()
            .ok_or(IxmlError::EmptyGrammar)?;

        let mut rules = Vec::new();
        for rule in grammar.rules() {
            rules.push(self.build_rule(rule)?);
        }
        if self.uses_insertion {
            let attrs = ParserAttributes::new()
                .with(MARK, "-")
                .with(NAME, INSERTION_RULE)
                .with(PRUNING, "allowed");
            rules.push(CanonicalRule {
                lhs: Symbol::nonterminal(INSERTION_RULE, attrs),
                rhs: Vec::new(),
            });
        }

        let start = self.lhs_symbol(start_rule);
        debug!(
            "[compile] {} canonical rules, start symbol {}",
            rules.len(),
            start_name
        );

        Ok(CanonicalGrammar::new(
            rules,
            start,
            grammar.version(),
            grammar.default_namespace().map(String::from),
        ))
    }

    fn build_rule(&mut self, rule: NodeId) -> Result<CanonicalRule> {
        let grammar = self.grammar;
        let rule_name = grammar.node(rule).name();
        let unexpected = |id: NodeId| IxmlError::UnexpectedNode {
            kind: grammar.kind(id).label().to_string(),
            rule: rule_name.to_string(),
        };

        let body = match grammar.children(rule) {
            [alt] if matches!(grammar.kind(*alt), NodeKind::Alt) => *alt,
            [other, ..] => return Err(unexpected(*other)),
            [] => return Err(unexpected(rule)),
        };

        let mut rhs = Vec::new();
        for &factor in grammar.children(body) {
            let node = grammar.node(factor);
            match &node.kind {
                NodeKind::Nonterminal { .. } => rhs.push(self.reference_symbol(factor)),
                NodeKind::Literal { tmark, value } => {
                    let rewrite = rewrite_text(&node.pragmas);
                    for (i, ch) in value.text().chars().enumerate() {
                        let mut attrs = ParserAttributes::new().with(TMARK, tmark_value(*tmark));
                        if let Some(text) = &rewrite {
                            // The whole literal is replaced once, at its first character
                            attrs.insert(REWRITE, if i == 0 { text.as_str() } else { "" });
                        }
                        rhs.push(Symbol::terminal(TokenMatcher::Char(ch), attrs));
                    }
                }
                NodeKind::Insertion { value } => {
                    self.uses_insertion = true;
                    let text = rewrite_text(&node.pragmas).unwrap_or_else(|| value.text());
                    let attrs = ParserAttributes::new()
                        .with(MARK, "+")
                        .with(NAME, INSERTION_RULE)
                        .with(PRUNING, "allowed")
                        .with(INSERTION, text);
                    rhs.push(Symbol::nonterminal(INSERTION_RULE, attrs));
                }
                NodeKind::Inclusion { tmark } | NodeKind::Exclusion { tmark } => {
                    let matcher = self.set_matcher(factor, rule_name)?;
                    let attrs = ParserAttributes::new().with(TMARK, tmark_value(*tmark));
                    rhs.push(Symbol::terminal(matcher, attrs));
                }
                _ => return Err(unexpected(factor)),
            }
        }

        Ok(CanonicalRule {
            lhs: self.lhs_symbol(rule),
            rhs,
        })
    }

    fn set_matcher(&self, set: NodeId, rule_name: &str) -> Result<TokenMatcher> {
        let grammar = self.grammar;
        let inclusion = matches!(grammar.kind(set), NodeKind::Inclusion { .. });
        let mut chars = RangeSet::new();
        let mut members = Vec::new();

        for &member in grammar.children(set) {
            match grammar.kind(member) {
                NodeKind::Literal { value, .. } => {
                    for ch in value.text().chars() {
                        chars.add_char(ch);
                    }
                }
                NodeKind::Range { from, to } => chars.add_range(*from, *to),
                NodeKind::Class { code } => {
                    let class = unicode_category_to_rangeset(code)
                        .ok_or_else(|| IxmlError::UnknownClass(code.clone()))?;
                    chars = chars.union(&class);
                }
                other => {
                    return Err(IxmlError::UnexpectedNode {
                        kind: other.label().to_string(),
                        rule: rule_name.to_string(),
                    })
                }
            }
            members.push(grammar.to_ixml(member));
        }

        let description = format!(
            "{}[{}]",
            if inclusion { "" } else { "~" },
            members.join("; ")
        );
        Ok(TokenMatcher::Set {
            set: chars,
            inclusion,
            description,
        })
    }

    /// Attributes shared by a rule's left-hand side and references to it
    fn nonterminal_attributes(&self, name: &str, mark: Mark, rename: Option<&str>) -> ParserAttributes {
        let mut attrs = ParserAttributes::new()
            .with(MARK, mark.as_char().to_string())
            .with(NAME, name);
        if let Some(rename) = rename {
            attrs.insert(RENAME, rename);
        }
        if name.starts_with('$') {
            attrs.insert(PRUNING, "allowed");
        }
        if self.rules.get(name).is_some_and(|info| info.discard_empty) {
            attrs.insert(DISCARD_EMPTY, "true");
        }
        if let Some(ns) = self.grammar.default_namespace() {
            if self.grammar.start_rule() == Some(name) {
                attrs.insert(XMLNS, ns);
            }
        }
        attrs
    }

    fn lhs_symbol(&self, rule: NodeId) -> Symbol {
        let node = self.grammar.node(rule);
        let name = node.name();
        let (mark, rename) = match &node.kind {
            NodeKind::Rule { mark, rename } => (*mark, rename.as_deref()),
            _ => (Mark::Element, None),
        };

        let mut attrs = self.nonterminal_attributes(name, mark, rename);
        if node.optional {
            attrs.insert(OPTIONAL, "true");
        }
        for pragma in &node.pragmas {
            match &pragma.directive {
                PragmaDirective::Priority(weight) => attrs.insert(PRIORITY, weight.to_string()),
                PragmaDirective::Token(value) => attrs.insert(TOKEN, value.as_str()),
                PragmaDirective::Regex(value) => attrs.insert(REGEX, value.as_str()),
                PragmaDirective::Metadata { uri, data } => {
                    let value = match data {
                        Some(data) => format!("{} {}", uri, data),
                        None => uri.clone(),
                    };
                    attrs.insert(METADATA, value);
                }
                _ => {}
            }
        }
        if !attrs.contains(PRIORITY) {
            if let Some(weight) = self.default_priority {
                attrs.insert(PRIORITY, weight.to_string());
            }
        }
        Symbol::nonterminal(name, attrs)
    }

    fn reference_symbol(&self, id: NodeId) -> Symbol {
        let node = self.grammar.node(id);
        let name = node.name();
        let info = self.rules.get(name);
        let (mark, rename) = match &node.kind {
            NodeKind::Nonterminal { mark, rename } => (*mark, rename.as_deref()),
            _ => (None, None),
        };

        let mark = mark
            .or_else(|| info.map(|i| i.mark))
            .unwrap_or(Mark::Element);
        let rename = rename.or_else(|| info.and_then(|i| i.rename.as_deref()));

        let mut attrs = self.nonterminal_attributes(name, mark, rename);
        if node.optional {
            attrs.insert(OPTIONAL, "true");
        }
        for pragma in &node.pragmas {
            match pragma.directive {
                PragmaDirective::Priority(weight) => attrs.insert(PRIORITY, weight.to_string()),
                PragmaDirective::DiscardEmpty => attrs.insert(DISCARD_EMPTY, "true"),
                _ => {}
            }
        }
        if !attrs.contains(PRIORITY) {
            if let Some(weight) = info.and_then(|i| i.priority) {
                attrs.insert(PRIORITY, weight.to_string());
            }
        }
        Symbol::nonterminal(name, attrs)
    }
}

fn tmark_value(tmark: TMark) -> String {
    tmark.as_char().to_string()
}

fn has_directive(pragmas: &[Pragma], test: impl Fn(&PragmaDirective) -> bool) -> bool {
    pragmas.iter().any(|p| test(&p.directive))
}

fn rewrite_text(pragmas: &[Pragma]) -> Option<String> {
    pragmas.iter().find_map(|p| match &p.directive {
        PragmaDirective::Rewrite(text) => Some(text.clone()),
        _ => None,
    })
}
