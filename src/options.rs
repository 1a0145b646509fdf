//! Processor configuration
//!
//! Options are plain data. They can be built in code with the setter methods
//! or deserialized from any serde format using kebab-case keys; missing keys
//! take their default values.

use serde::Deserialize;

/// Which set of rewrite rules the simplifier applies to repetitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RewriteStrategy {
    /// Rewrites that follow the implementation hints of the iXML specification
    #[default]
    Spec,
    /// Direct empty/non-empty rule pairs with fewer intermediate rules
    Alternate,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ProcessorOptions {
    pub rewrite_strategy: RewriteStrategy,

    /// Report `ambiguous` whenever the forest offered any choice, not only
    /// when the selector could not decide by priority
    pub strict_ambiguity: bool,

    pub suppress_ambiguous_state: bool,
    pub suppress_version_mismatch_state: bool,

    /// Emit hidden nonterminals as `n:symbol` wrapper elements
    pub show_bnf_nonterminals: bool,

    pub assert_valid_xml_names: bool,
    pub assert_valid_xml_characters: bool,

    /// Include the full diagnostic chart in error documents
    pub show_chart: bool,

    pub check_undefined_nonterminals: bool,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        ProcessorOptions {
            rewrite_strategy: RewriteStrategy::default(),
            strict_ambiguity: false,
            suppress_ambiguous_state: false,
            suppress_version_mismatch_state: false,
            show_bnf_nonterminals: false,
            assert_valid_xml_names: true,
            assert_valid_xml_characters: true,
            show_chart: false,
            check_undefined_nonterminals: true,
        }
    }
}

impl ProcessorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strategy(mut self, strategy: RewriteStrategy) -> Self {
        self.rewrite_strategy = strategy;
        self
    }

    pub fn with_strict_ambiguity(mut self, strict: bool) -> Self {
        self.strict_ambiguity = strict;
        self
    }

    pub fn with_show_bnf_nonterminals(mut self, show: bool) -> Self {
        self.show_bnf_nonterminals = show;
        self
    }

    pub fn with_show_chart(mut self, show: bool) -> Self {
        self.show_chart = show;
        self
    }

    /// Turn both XML validators off (or back on)
    pub fn with_permissive_xml(mut self, permissive: bool) -> Self {
        self.assert_valid_xml_names = !permissive;
        self.assert_valid_xml_characters = !permissive;
        self
    }

    pub fn with_suppressed_states(mut self, ambiguous: bool, version_mismatch: bool) -> Self {
        self.suppress_ambiguous_state = ambiguous;
        self.suppress_version_mismatch_state = version_mismatch;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = ProcessorOptions::default();
        assert_eq!(opts.rewrite_strategy, RewriteStrategy::Spec);
        assert!(opts.assert_valid_xml_names);
        assert!(!opts.strict_ambiguity);
    }

    #[test]
    fn test_deserialize_partial() {
        let json = r#"{ "rewrite-strategy": "alternate", "strict-ambiguity": true }"#;
        let opts: ProcessorOptions = serde_json::from_str(json).unwrap();
        assert_eq!(opts.rewrite_strategy, RewriteStrategy::Alternate);
        assert!(opts.strict_ambiguity);
        assert!(opts.check_undefined_nonterminals);
    }

    #[test]
    fn test_permissive_xml() {
        let opts = ProcessorOptions::new().with_permissive_xml(true);
        assert!(!opts.assert_valid_xml_names);
        assert!(!opts.assert_valid_xml_characters);
    }
}
