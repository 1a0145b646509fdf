//! Choosing between alternative derivations
//!
//! When the parse forest offers more than one derivation for a span, the
//! engine asks a [`TreeSelector`] which one to follow. The selector also
//! remembers whether any choice it made was ambiguous so the tree builder can
//! report it on the result.

use crate::canonical::{CanonicalRule, Symbol};
use log::debug;

pub trait TreeSelector {
    /// Pick one of `alternatives`, returning its index
    fn select(&mut self, alternatives: &[&CanonicalRule]) -> usize;

    /// The engine skipped a derivation of `symbol` that would loop forever
    fn report_loop(&mut self, symbol: &Symbol);

    /// At least one choice could not be decided by priority
    fn made_ambiguous_choice(&self) -> bool;

    /// `select` was called with more than one alternative
    fn saw_choice(&self) -> bool;
}

/// Prefers the alternative with the highest total `priority`; ties go to the
/// first alternative
#[derive(Debug, Default)]
pub struct PriorityTreeSelector {
    choices: usize,
    ambiguous_choices: usize,
    loops: Vec<String>,
}

impl PriorityTreeSelector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn choices(&self) -> usize {
        self.choices
    }

    pub fn loops(&self) -> &[String] {
        &self.loops
    }

    /// Priority of the rule plus the priorities of the nonterminals it uses
    pub fn score(rule: &CanonicalRule) -> f64 {
        rule.lhs.attributes().priority()
            + rule
                .rhs
                .iter()
                .filter(|s| !s.is_terminal())
                .map(|s| s.attributes().priority())
                .sum::<f64>()
    }
}

impl TreeSelector for PriorityTreeSelector {
    fn select(&mut self, alternatives: &[&CanonicalRule]) -> usize {
        if alternatives.len() <= 1 {
            return 0;
        }
        self.choices += 1;

        let scores: Vec<f64> = alternatives.iter().map(|r| Self::score(r)).collect();
        let mut best = 0;
        for (i, score) in scores.iter().enumerate() {
            if *score > scores[best] {
                best = i;
            }
        }
        let tied = scores.iter().filter(|s| **s == scores[best]).count();
        if tied > 1 {
            self.ambiguous_choices += 1;
        }

        debug!(
            "[select] {} alternatives for {}, chose {} (score {}, {} tied)",
            alternatives.len(),
            alternatives[best].name(),
            best,
            scores[best],
            tied
        );
        best
    }

    fn report_loop(&mut self, symbol: &Symbol) {
        debug!("[select] loop on {}", symbol);
        self.loops.push(symbol.to_string());
    }

    fn made_ambiguous_choice(&self) -> bool {
        self.ambiguous_choices > 0
    }

    fn saw_choice(&self) -> bool {
        self.choices > 0
    }
}
