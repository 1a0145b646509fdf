//! Grammar simplification
//!
//! Rewrites a grammar in place until every rule has a single alternative and
//! every alternative is a flat sequence of literals, sets, insertions and
//! nonterminal references. Each pass:
//!
//! 1. splits multi-alternative rules into one rule per alternative
//! 2. replaces empty groups with a reference to the shared `$empty` rule
//! 3. rewrites repetitions and options in the order the strategy prescribes
//! 4. hoists the remaining groups into synthetic rules
//!
//! Passes repeat until nothing changes. Rules created during a step are staged
//! on the grammar and drained into the rule list before the next step starts.

use crate::ast::{Grammar, Mark, NodeId, NodeKind};
use crate::options::RewriteStrategy;
use log::debug;

/// Name of the shared rule that matches the empty string
pub const EMPTY_RULE: &str = "$empty";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    StarSep,
    PlusSep,
    Star,
    Plus,
    Option,
}

impl Target {
    fn suffix(self) -> &'static str {
        match self {
            Target::StarSep => "star-sep",
            Target::PlusSep => "plus-sep",
            Target::Star => "star",
            Target::Plus => "plus",
            Target::Option => "option",
        }
    }

    fn matches(self, grammar: &Grammar, id: NodeId) -> bool {
        let separated = grammar.children(id).len() > 1;
        match (self, grammar.kind(id)) {
            (Target::StarSep, NodeKind::Repeat0) => separated,
            (Target::Star, NodeKind::Repeat0) => !separated,
            (Target::PlusSep, NodeKind::Repeat1) => separated,
            (Target::Plus, NodeKind::Repeat1) => !separated,
            (Target::Option, NodeKind::Option) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimplifyStats {
    pub passes: usize,
    pub rules_added: usize,
}

pub struct Simplifier {
    strategy: RewriteStrategy,
}

impl Simplifier {
    pub fn new(strategy: RewriteStrategy) -> Self {
        Simplifier { strategy }
    }

    pub fn strategy(&self) -> RewriteStrategy {
        self.strategy
    }

    fn order(&self) -> [Target; 5] {
        match self.strategy {
            RewriteStrategy::Spec => [
                Target::StarSep,
                Target::PlusSep,
                Target::Plus,
                Target::Star,
                Target::Option,
            ],
            RewriteStrategy::Alternate => [
                Target::StarSep,
                Target::PlusSep,
                Target::Star,
                Target::Plus,
                Target::Option,
            ],
        }
    }

    /// Run rewrite passes until the grammar is canonical
    pub fn simplify(&self, grammar: &mut Grammar) -> SimplifyStats {
        let initial_rules = grammar.rules().len();
        let mut stats = SimplifyStats::default();

        loop {
            stats.passes += 1;
            let mut changed = split_alternatives(grammar);
            changed |= replace_empty_groups(grammar);

            for target in self.order() {
                changed |= self.rewrite_all(grammar, target);
                grammar.drain_pending_rules();
            }

            changed |= flatten_groups(grammar);
            grammar.drain_pending_rules();

            debug!(
                "[simplify] pass {} ({:?}): {} rules",
                stats.passes,
                self.strategy,
                grammar.rules().len()
            );
            if !changed {
                break;
            }
        }

        stats.rules_added = grammar.rules().len().saturating_sub(initial_rules);
        debug!(
            "[simplify] finished after {} passes, {} rules added",
            stats.passes, stats.rules_added
        );
        stats
    }

    fn rewrite_all(&self, grammar: &mut Grammar, target: Target) -> bool {
        let root = grammar.root();
        let targets: Vec<NodeId> = grammar
            .rules()
            .into_iter()
            .flat_map(|rule| grammar.descendants(rule))
            .filter(|id| target.matches(grammar, *id))
            .collect();

        let mut changed = false;
        for id in targets {
            // Skip nodes that an earlier rewrite in this step moved or discarded
            if grammar.root_of(id) != root {
                continue;
            }
            match target {
                Target::StarSep => self.rewrite_star_sep(grammar, id),
                Target::PlusSep => self.rewrite_plus_sep(grammar, id),
                Target::Star => self.rewrite_star(grammar, id),
                Target::Plus => rewrite_plus(grammar, id),
                Target::Option => rewrite_option(grammar, id),
            }
            changed = true;
        }
        changed
    }

    // f**s  spec:      X: (f++s)?.
    //       alternate: X: ; f++s.
    fn rewrite_star_sep(&self, grammar: &mut Grammar, id: NodeId) {
        let (rule, alts, name) = synthetic_rule(grammar, id, Target::StarSep);
        let (factor, sep) = repeat_parts(grammar, id);

        let plus = grammar.add_node(NodeKind::Repeat1);
        grammar.append_child(plus, factor);
        if let Some(sep) = sep {
            grammar.append_child(plus, sep);
        }

        match self.strategy {
            RewriteStrategy::Spec => {
                let option = grammar.add_node(NodeKind::Option);
                grammar.append_child(option, plus);
                add_alt(grammar, alts, &[option]);
            }
            RewriteStrategy::Alternate => {
                add_alt(grammar, alts, &[]);
                add_alt(grammar, alts, &[plus]);
            }
        }

        replace_with_reference(grammar, id, &name, rule);
    }

    // f++s  spec:      X: f, (s, f)*.
    //       alternate: X: f; f, s, X.
    fn rewrite_plus_sep(&self, grammar: &mut Grammar, id: NodeId) {
        let (rule, alts, name) = synthetic_rule(grammar, id, Target::PlusSep);
        let (factor, sep) = repeat_parts(grammar, id);
        let sep_factor = sep.and_then(|s| grammar.children(s).first().copied());
        let factor_copy = grammar.deep_copy(factor);

        match self.strategy {
            RewriteStrategy::Spec => {
                let group = grammar.add_node(NodeKind::Alts);
                let mut tail = Vec::new();
                if let Some(s) = sep_factor {
                    grammar.detach(s);
                    tail.push(s);
                }
                tail.push(factor_copy);
                add_alt(grammar, group, &tail);
                let star = grammar.add_node(NodeKind::Repeat0);
                grammar.append_child(star, group);
                add_alt(grammar, alts, &[factor, star]);
            }
            RewriteStrategy::Alternate => {
                add_alt(grammar, alts, &[factor]);
                let mut recursive = vec![factor_copy];
                if let Some(s) = sep_factor {
                    grammar.detach(s);
                    recursive.push(s);
                }
                recursive.push(reference(grammar, &name));
                add_alt(grammar, alts, &recursive);
            }
        }

        replace_with_reference(grammar, id, &name, rule);
    }

    // f*  spec:      (f+)?
    //     alternate: X: ; f, X.
    fn rewrite_star(&self, grammar: &mut Grammar, id: NodeId) {
        match self.strategy {
            RewriteStrategy::Spec => {
                let (factor, _) = repeat_parts(grammar, id);
                let plus = grammar.add_node(NodeKind::Repeat1);
                grammar.append_child(plus, factor);
                let option = grammar.add_node(NodeKind::Option);
                grammar.append_child(option, plus);
                grammar.replace(id, option);
            }
            RewriteStrategy::Alternate => {
                let (rule, alts, name) = synthetic_rule(grammar, id, Target::Star);
                let (factor, _) = repeat_parts(grammar, id);
                add_alt(grammar, alts, &[]);
                let self_ref = reference(grammar, &name);
                add_alt(grammar, alts, &[factor, self_ref]);
                replace_with_reference(grammar, id, &name, rule);
            }
        }
    }
}

// f+  X: f; f, X.
fn rewrite_plus(grammar: &mut Grammar, id: NodeId) {
    let (rule, alts, name) = synthetic_rule(grammar, id, Target::Plus);
    let (factor, _) = repeat_parts(grammar, id);
    let factor_copy = grammar.deep_copy(factor);
    add_alt(grammar, alts, &[factor]);
    let self_ref = reference(grammar, &name);
    add_alt(grammar, alts, &[factor_copy, self_ref]);
    replace_with_reference(grammar, id, &name, rule);
}

// f?  X: ; f.
fn rewrite_option(grammar: &mut Grammar, id: NodeId) {
    let Some(factor) = grammar.children(id).first().copied() else {
        grammar.detach(id);
        return;
    };

    // ()? is the same as (): avoids a second, ambiguous way to match nothing
    if is_empty_reference(grammar, factor) {
        grammar.detach(factor);
        grammar.replace(id, factor);
        return;
    }

    let (rule, alts, name) = synthetic_rule(grammar, id, Target::Option);
    grammar.node_mut(rule).optional = true;
    grammar.detach(factor);
    add_alt(grammar, alts, &[]);
    add_alt(grammar, alts, &[factor]);
    replace_with_reference(grammar, id, &name, rule);
}

/// Repeated factor and `Sep` node of a repetition, both detached from it
fn repeat_parts(grammar: &mut Grammar, id: NodeId) -> (NodeId, Option<NodeId>) {
    let children = grammar.children(id).to_vec();
    for child in &children {
        grammar.detach(*child);
    }
    let mut iter = children.into_iter();
    let factor = match iter.next() {
        Some(f) => f,
        None => grammar.add_node(NodeKind::Alt),
    };
    (factor, iter.next())
}

/// Create a hidden rule named after `source`, before its children are moved;
/// returns (rule, body, name)
fn synthetic_rule(grammar: &mut Grammar, source: NodeId, target: Target) -> (NodeId, NodeId, String) {
    let hint = hint(grammar, source);
    let name = grammar.next_synthetic_name(&hint, target.suffix());
    let rule = grammar.add_named(
        NodeKind::Rule {
            mark: Mark::Hidden,
            rename: None,
        },
        &name,
    );
    let alts = grammar.add_node(NodeKind::Alts);
    grammar.append_child(rule, alts);
    (rule, alts, name)
}

fn add_alt(grammar: &mut Grammar, alts: NodeId, factors: &[NodeId]) {
    let alt = grammar.add_node(NodeKind::Alt);
    for factor in factors {
        grammar.append_child(alt, *factor);
    }
    grammar.append_child(alts, alt);
}

fn reference(grammar: &mut Grammar, name: &str) -> NodeId {
    grammar.add_named(
        NodeKind::Nonterminal {
            mark: None,
            rename: None,
        },
        name,
    )
}

fn replace_with_reference(grammar: &mut Grammar, old: NodeId, name: &str, rule: NodeId) {
    let new_ref = reference(grammar, name);
    grammar.node_mut(new_ref).optional = grammar.node(rule).optional;
    grammar.replace(old, new_ref);
    grammar.queue_rule(rule);
}

fn is_empty_reference(grammar: &Grammar, id: NodeId) -> bool {
    matches!(grammar.kind(id), NodeKind::Nonterminal { .. })
        && grammar.node(id).name() == EMPTY_RULE
}

fn rule_body(grammar: &Grammar, rule: NodeId) -> Option<NodeId> {
    grammar
        .children(rule)
        .iter()
        .copied()
        .find(|c| matches!(grammar.kind(*c), NodeKind::Alts | NodeKind::Alt))
}

/// Give every rule exactly one `Alt` child
fn split_alternatives(grammar: &mut Grammar) -> bool {
    let mut changed = false;

    for rule in grammar.rules() {
        let Some(body) = rule_body(grammar, rule) else {
            let alt = grammar.add_node(NodeKind::Alt);
            grammar.append_child(rule, alt);
            changed = true;
            continue;
        };
        if !matches!(grammar.kind(body), NodeKind::Alts) {
            continue;
        }
        changed = true;

        let alts = grammar.children(body).to_vec();
        grammar.detach(body);
        let mut alts = alts.into_iter();
        let first = match alts.next() {
            Some(alt) => alt,
            None => grammar.add_node(NodeKind::Alt),
        };
        grammar.detach(first);
        grammar.append_child(rule, first);

        for alt in alts {
            grammar.detach(alt);
            let template = grammar.node(rule).clone();
            let copy = grammar.add_named(template.kind.clone(), template.name());
            let node = grammar.node_mut(copy);
            node.optional = template.optional;
            node.pragmas = template.pragmas;
            grammar.append_child(copy, alt);
            grammar.queue_rule(copy);
        }
    }

    grammar.drain_pending_rules();
    changed
}

/// Replace groups that can only match nothing with a `$empty` reference
fn replace_empty_groups(grammar: &mut Grammar) -> bool {
    let empty_groups: Vec<NodeId> = grammar
        .rules()
        .into_iter()
        .flat_map(|rule| grammar.descendants(rule))
        .filter(|id| {
            matches!(grammar.kind(*id), NodeKind::Alts)
                && grammar
                    .parent(*id)
                    .is_some_and(|p| !matches!(grammar.kind(p), NodeKind::Rule { .. }))
                && grammar.children(*id).iter().all(|alt| {
                    matches!(grammar.kind(*alt), NodeKind::Alt) && grammar.children(*alt).is_empty()
                })
        })
        .collect();

    if empty_groups.is_empty() {
        return false;
    }

    if grammar.rules_named(EMPTY_RULE).is_empty() {
        let rule = grammar.add_named(
            NodeKind::Rule {
                mark: Mark::Hidden,
                rename: None,
            },
            EMPTY_RULE,
        );
        let alt = grammar.add_node(NodeKind::Alt);
        grammar.append_child(rule, alt);
        grammar.add_rule(rule);
    }

    for group in empty_groups {
        let empty = reference(grammar, EMPTY_RULE);
        grammar.replace(group, empty);
    }
    true
}

/// Hoist groups that sit directly in an alternative into synthetic rules
fn flatten_groups(grammar: &mut Grammar) -> bool {
    let groups: Vec<NodeId> = grammar
        .rules()
        .into_iter()
        .flat_map(|rule| grammar.descendants(rule))
        .filter(|id| {
            matches!(grammar.kind(*id), NodeKind::Alts)
                && grammar
                    .parent(*id)
                    .is_some_and(|p| matches!(grammar.kind(p), NodeKind::Alt))
        })
        .collect();

    let mut changed = false;
    for group in groups {
        let hint = hint(grammar, group);
        let name = grammar.next_synthetic_name(&hint, "alts");
        let rule = grammar.add_named(
            NodeKind::Rule {
                mark: Mark::Hidden,
                rename: None,
            },
            &name,
        );
        // Pragmas written before the group now describe the rule
        let pragmas = std::mem::take(&mut grammar.node_mut(group).pragmas);
        grammar.node_mut(rule).pragmas = pragmas;
        let new_ref = reference(grammar, &name);
        grammar.replace(group, new_ref);
        grammar.append_child(rule, group);
        grammar.queue_rule(rule);
        changed = true;
    }
    changed
}

/// Readable fragment for a synthetic name, taken from the first symbol
fn hint(grammar: &Grammar, id: NodeId) -> String {
    let raw = raw_hint(grammar, id);
    if raw.is_empty() {
        return "empty".to_string();
    }
    let mut out = String::new();
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '.' {
            out.push(ch);
        } else {
            out.push_str(&format!("%{:02X}", ch as u32));
        }
    }
    out
}

fn raw_hint(grammar: &Grammar, id: NodeId) -> String {
    let node = grammar.node(id);
    match &node.kind {
        NodeKind::Nonterminal { .. } => {
            let name = node.name();
            match name.strip_prefix('$') {
                // $hint_n_kind: reuse the hint of the synthetic rule
                Some(rest) => rest.rsplitn(3, '_').last().unwrap_or(rest).to_string(),
                None => name.to_string(),
            }
        }
        NodeKind::Literal { value, .. } | NodeKind::Insertion { value } => value.text(),
        NodeKind::Class { code } => code.clone(),
        NodeKind::Range { from, .. } => from.to_string(),
        _ => node
            .children
            .first()
            .map(|c| raw_hint(grammar, *c))
            .unwrap_or_default(),
    }
}
