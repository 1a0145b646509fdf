//! A small parsing engine for tests
//!
//! Plays the part of the external engine over short inputs. Recognition is a
//! span fixpoint: round `h` records every `(nonterminal, start, end)` that can
//! be derived using only spans found in earlier rounds, so `h` is the height
//! of the shallowest derivation. Walking a derivation only descends into
//! spans of smaller height, which keeps it finite even for cyclic grammars.
//! Failures are located with a plain Earley chart.

use crate::canonical::{CanonicalGrammar, CanonicalRule, Symbol};
use crate::error::{IxmlError, Result};
use crate::error_document::{ChartItem, DiagnosticChart, ParseFailure};
use crate::selector::TreeSelector;
use crate::tree_builder::ParseEventHandler;
use std::collections::{BTreeSet, HashMap, HashSet};

/// Derivations enumerated per rule and span before giving up
const SPLIT_LIMIT: usize = 32;

type Span = (String, usize, usize);

#[derive(Debug, Clone, Copy)]
enum Step {
    Token(usize),
    Span(usize, usize),
}

pub struct TestEngine<'g> {
    grammar: &'g CanonicalGrammar,
    input: Vec<char>,
    heights: HashMap<Span, usize>,
}

impl<'g> TestEngine<'g> {
    /// Recognize `input`; `None` when the start symbol does not derive it
    pub fn parse(grammar: &'g CanonicalGrammar, input: &str) -> Option<Self> {
        let mut engine = TestEngine {
            grammar,
            input: input.chars().collect(),
            heights: HashMap::new(),
        };
        engine.recognize();

        let whole = (grammar.start_name().to_string(), 0, engine.input.len());
        engine.heights.contains_key(&whole).then_some(engine)
    }

    fn recognize(&mut self) {
        let n = self.input.len();
        let mut round = 0;
        loop {
            round += 1;
            let mut found = Vec::new();
            for rule in self.grammar.rules() {
                for start in 0..=n {
                    for end in self.ends(&rule.rhs, start, round) {
                        let key = (rule.name().to_string(), start, end);
                        if !self.heights.contains_key(&key) {
                            found.push(key);
                        }
                    }
                }
            }
            if found.is_empty() {
                break;
            }
            for key in found {
                self.heights.entry(key).or_insert(round);
            }
        }
    }

    fn height(&self, name: &str, start: usize, end: usize) -> Option<usize> {
        self.heights.get(&(name.to_string(), start, end)).copied()
    }

    /// Where `rhs` can end when started at `start`, using spans below `bound`
    fn ends(&self, rhs: &[Symbol], start: usize, bound: usize) -> BTreeSet<usize> {
        let n = self.input.len();
        let mut positions = BTreeSet::from([start]);
        for symbol in rhs {
            let mut next = BTreeSet::new();
            for &p in &positions {
                match symbol {
                    Symbol::Terminal { .. } => {
                        if p < n && symbol.matches(self.input[p]) {
                            next.insert(p + 1);
                        }
                    }
                    Symbol::Nonterminal { name, .. } => {
                        for q in p..=n {
                            if self.height(name, p, q).is_some_and(|h| h < bound) {
                                next.insert(q);
                            }
                        }
                    }
                }
            }
            positions = next;
        }
        positions
    }

    #[allow(clippy::too_many_arguments)]
    fn splits(
        &self,
        rhs: &[Symbol],
        k: usize,
        p: usize,
        end: usize,
        bound: usize,
        current: &mut Vec<Step>,
        out: &mut Vec<Vec<Step>>,
    ) {
        if out.len() >= SPLIT_LIMIT {
            return;
        }
        let Some(symbol) = rhs.get(k) else {
            if p == end {
                out.push(current.clone());
            }
            return;
        };
        match symbol {
            Symbol::Terminal { .. } => {
                if p < end && symbol.matches(self.input[p]) {
                    current.push(Step::Token(p));
                    self.splits(rhs, k + 1, p + 1, end, bound, current, out);
                    current.pop();
                }
            }
            Symbol::Nonterminal { name, .. } => {
                for q in p..=end {
                    if self.height(name, p, q).is_some_and(|h| h < bound) {
                        current.push(Step::Span(p, q));
                        self.splits(rhs, k + 1, q, end, bound, current, out);
                        current.pop();
                    }
                }
            }
        }
    }

    /// Report one derivation of the whole input to `handler`
    pub fn walk(
        &self,
        handler: &mut dyn ParseEventHandler,
        selector: &mut dyn TreeSelector,
    ) -> Result<()> {
        self.walk_symbol(self.grammar.start(), 0, self.input.len(), handler, selector)
    }

    fn walk_symbol(
        &self,
        symbol: &Symbol,
        start: usize,
        end: usize,
        handler: &mut dyn ParseEventHandler,
        selector: &mut dyn TreeSelector,
    ) -> Result<()> {
        let name = symbol.name().unwrap_or("");
        let no_derivation = || {
            IxmlError::UnbalancedEvents(format!("no derivation of {} over {}..{}", name, start, end))
        };
        let height = self.height(name, start, end).ok_or_else(no_derivation)?;

        let mut options: Vec<(&CanonicalRule, Vec<Step>)> = Vec::new();
        for rule in self.grammar.rules_for(name) {
            let mut out = Vec::new();
            self.splits(&rule.rhs, 0, start, end, height, &mut Vec::new(), &mut out);
            options.extend(out.into_iter().map(|split| (rule, split)));
        }
        if options.is_empty() {
            return Err(no_derivation());
        }

        let rules: Vec<&CanonicalRule> = options.iter().map(|(rule, _)| *rule).collect();
        let choice = selector.select(&rules).min(options.len() - 1);
        let (rule, steps) = &options[choice];

        handler.start_nonterminal(symbol.attributes())?;
        for (child, step) in rule.rhs.iter().zip(steps) {
            match *step {
                Step::Token(p) => handler.token(self.input[p], child.attributes())?,
                Step::Span(p, q) => self.walk_symbol(child, p, q, handler, selector)?,
            }
        }
        handler.end_nonterminal(symbol.attributes())
    }

    /// Locate where `input` stops being a prefix of the language
    pub fn failure(grammar: &CanonicalGrammar, input: &str) -> ParseFailure {
        let chars: Vec<char> = input.chars().collect();
        let rules = grammar.rules();

        let mut seed = Vec::new();
        for (index, rule) in rules.iter().enumerate() {
            if rule.name() == grammar.start_name() {
                seed.push((index, 0, 0));
            }
        }
        let mut rows: Vec<Vec<(usize, usize, usize)>> = Vec::new();
        let first = earley_closure(rules, seed, 0, &rows);
        rows.push(first);

        for (k, ch) in chars.iter().enumerate() {
            let scanned: Vec<(usize, usize, usize)> = rows[k]
                .iter()
                .filter(|(r, dot, _)| rules[*r].rhs.get(*dot).is_some_and(|s| s.matches(*ch)))
                .map(|&(r, dot, start)| (r, dot + 1, start))
                .collect();
            let next = earley_closure(rules, scanned, k + 1, &rows);
            let empty = next.is_empty();
            rows.push(next);
            if empty {
                break;
            }
        }

        let position = if rows.last().is_some_and(|row| row.is_empty()) {
            rows.len().saturating_sub(2)
        } else {
            chars.len()
        };

        let predicted = rows[position]
            .iter()
            .filter_map(|(r, dot, _)| rules[*r].rhs.get(*dot))
            .filter(|s| s.is_terminal())
            .cloned()
            .collect();

        let mut chart = DiagnosticChart::new();
        for row in &rows {
            chart.push_row(
                row.iter()
                    .map(|&(r, dot, start)| ChartItem::new(rules[r].clone(), dot, start))
                    .collect(),
            );
        }

        ParseFailure::at(input, position)
            .with_predicted(predicted)
            .with_chart(chart)
    }
}

/// Predict and complete until the row stops growing
fn earley_closure(
    rules: &[CanonicalRule],
    items: Vec<(usize, usize, usize)>,
    k: usize,
    rows: &[Vec<(usize, usize, usize)>],
) -> Vec<(usize, usize, usize)> {
    let mut row = Vec::new();
    let mut seen = HashSet::new();
    for item in items {
        if seen.insert(item) {
            row.push(item);
        }
    }

    loop {
        let mut added = Vec::new();
        for &(r, dot, start) in &row {
            match rules[r].rhs.get(dot) {
                Some(Symbol::Nonterminal { name, .. }) => {
                    for (index, rule) in rules.iter().enumerate() {
                        if rule.name() == name.as_str() {
                            added.push((index, 0, k));
                        }
                    }
                }
                Some(Symbol::Terminal { .. }) => {}
                None => {
                    let lhs = rules[r].name();
                    let origin = if start == k { &row } else { &rows[start] };
                    for &(r2, dot2, start2) in origin {
                        if rules[r2].rhs.get(dot2).and_then(|s| s.name()) == Some(lhs) {
                            added.push((r2, dot2 + 1, start2));
                        }
                    }
                }
            }
        }

        let before = row.len();
        for item in added {
            if seen.insert(item) {
                row.push(item);
            }
        }
        if row.len() == before {
            return row;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ProcessorOptions;
    use crate::processor::IxmlProcessor;
    use crate::selector::PriorityTreeSelector;

    fn compile(grammar: &str) -> CanonicalGrammar {
        IxmlProcessor::new(ProcessorOptions::default())
            .compile(grammar)
            .unwrap()
    }

    #[test]
    fn test_recognizes_language() {
        let g = compile(r#"s: "a", s, "b"; ."#);
        assert!(TestEngine::parse(&g, "").is_some());
        assert!(TestEngine::parse(&g, "aabb").is_some());
        assert!(TestEngine::parse(&g, "aab").is_none());
    }

    #[test]
    fn test_cyclic_grammar_terminates() {
        let g = compile(r#"s: s; "x"."#);
        let engine = TestEngine::parse(&g, "x").unwrap();
        let mut selector = PriorityTreeSelector::new();
        let mut builder = crate::tree_builder::TreeBuilder::for_grammar(&g, &ProcessorOptions::default());
        engine.walk(&mut builder, &mut selector).unwrap();
    }

    #[test]
    fn test_failure_position() {
        let g = compile(r#"s: "a", "b", "c"."#);
        let failure = TestEngine::failure(&g, "abx");
        assert_eq!(failure.position, Some(2));
        assert_eq!(failure.unexpected, Some('x'));
        assert_eq!(failure.permitted(), vec!["'c'".to_string()]);

        let short = TestEngine::failure(&g, "ab");
        assert_eq!(short.position, Some(2));
        assert_eq!(short.unexpected, None);
    }
}
