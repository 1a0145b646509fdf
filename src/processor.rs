//! Processor facade
//!
//! [`IxmlProcessor`] wires the pipeline together: load the ixml source,
//! process pragmas, check rule definitions, simplify, and build the canonical
//! grammar. It also connects a parsing engine's output to the tree builder or
//! the error-document builder.

use crate::ast::Grammar;
use crate::canonical::CanonicalGrammar;
use crate::compiler::{build_grammar, check_grammar};
use crate::error::Result;
use crate::error_document::{ErrorDocumentBuilder, ParseFailure};
use crate::grammar_parser::parse_ixml_grammar;
use crate::options::ProcessorOptions;
use crate::pragmas::process_pragmas;
use crate::rewrite::Simplifier;
use crate::selector::TreeSelector;
use crate::sink::XmlEventSink;
use crate::tree_builder::TreeBuilder;
use log::debug;

#[derive(Debug, Clone, Default)]
pub struct IxmlProcessor {
    options: ProcessorOptions,
}

impl IxmlProcessor {
    pub fn new(options: ProcessorOptions) -> Self {
        IxmlProcessor { options }
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    /// Load and simplify a grammar without building the canonical form
    pub fn load(&self, source: &str) -> Result<Grammar> {
        let mut grammar = parse_ixml_grammar(source)?;
        process_pragmas(&mut grammar)?;
        check_grammar(&grammar, self.options.check_undefined_nonterminals)?;

        let source_rules = grammar.rules().len();
        let stats = Simplifier::new(self.options.rewrite_strategy).simplify(&mut grammar);
        debug!(
            "[load] {} source rules simplified to {} in {} passes",
            source_rules,
            grammar.rules().len(),
            stats.passes
        );
        Ok(grammar)
    }

    pub fn compile(&self, source: &str) -> Result<CanonicalGrammar> {
        let grammar = self.load(source)?;
        build_grammar(&grammar)
    }

    /// Build the XML for one derivation. `drive` is the engine: it reports
    /// the derivation to the handler, consulting the selector at each choice.
    pub fn render_tree<F>(
        &self,
        grammar: &CanonicalGrammar,
        selector: &mut dyn TreeSelector,
        sink: &mut dyn XmlEventSink,
        drive: F,
    ) -> Result<()>
    where
        F: FnOnce(&mut TreeBuilder, &mut dyn TreeSelector) -> Result<()>,
    {
        let mut builder = TreeBuilder::for_grammar(grammar, &self.options);
        drive(&mut builder, &mut *selector)?;
        builder.finish(&*selector, sink)
    }

    pub fn render_failure(&self, failure: &ParseFailure, sink: &mut dyn XmlEventSink) {
        ErrorDocumentBuilder::new(self.options.show_chart).render(failure, sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IxmlError;
    use crate::options::RewriteStrategy;
    use crate::selector::PriorityTreeSelector;
    use crate::sink::StringSink;
    use crate::test_engine::TestEngine;
    use crate::xml_node::XmlTreeSink;
    use rstest::rstest;

    fn parse_with(options: ProcessorOptions, grammar: &str, input: &str) -> Result<String> {
        let processor = IxmlProcessor::new(options);
        let compiled = processor.compile(grammar)?;
        let mut sink = StringSink::new();
        match TestEngine::parse(&compiled, input) {
            Some(engine) => {
                let mut selector = PriorityTreeSelector::new();
                processor.render_tree(&compiled, &mut selector, &mut sink, |handler, selector| {
                    engine.walk(handler, selector)
                })?;
            }
            None => processor.render_failure(&TestEngine::failure(&compiled, input), &mut sink),
        }
        Ok(sink.into_string())
    }

    fn parse(grammar: &str, input: &str) -> Result<String> {
        parse_with(ProcessorOptions::default(), grammar, input)
    }

    const NINEML: &str = r#"{[ixmlns:n "https://nineml.org/ns/pragma/"]}"#;

    #[test]
    fn test_mark_semantics() {
        let grammar = r#"S: A, -"-", @B, C. A: "a". B: "b". C: +"Z"."#;
        assert_eq!(
            parse(grammar, "a-b").unwrap(),
            r#"<S B="b"><A>a</A><C>Z</C></S>"#
        );
    }

    #[test]
    fn test_markless_identity() {
        let grammar = r#"doc: word++-" ". word: ["a"-"z"]+."#;
        let input = "ab cd e";
        let compiled = IxmlProcessor::default().compile(grammar).unwrap();
        let engine = TestEngine::parse(&compiled, input).unwrap();
        let mut builder = TreeBuilder::for_grammar(&compiled, &ProcessorOptions::default());
        let mut selector = PriorityTreeSelector::new();
        engine.walk(&mut builder, &mut selector).unwrap();
        let mut sink = XmlTreeSink::new();
        builder.finish(&selector, &mut sink).unwrap();
        let root = sink.into_root().unwrap();
        assert_eq!(root.text_content(), "abcde");
        assert_eq!(root.elements().count(), 3);

        let plain = r#"doc: word++" ". word: ["a"-"z"]+."#;
        let compiled = IxmlProcessor::default().compile(plain).unwrap();
        let engine = TestEngine::parse(&compiled, input).unwrap();
        let mut builder = TreeBuilder::for_grammar(&compiled, &ProcessorOptions::default());
        engine.walk(&mut builder, &mut PriorityTreeSelector::new()).unwrap();
        let mut sink = XmlTreeSink::new();
        builder.finish(&PriorityTreeSelector::new(), &mut sink).unwrap();
        assert_eq!(sink.into_root().unwrap().text_content(), input);
    }

    #[rstest]
    #[case("", "<list/>")]
    #[case("x", "<list><item>x</item></list>")]
    #[case("x,x", "<list><item>x</item>,<item>x</item></list>")]
    #[case("x,x,x", "<list><item>x</item>,<item>x</item>,<item>x</item></list>")]
    fn test_separated_repetition_strategies_agree(#[case] input: &str, #[case] expected: &str) {
        for strategy in [RewriteStrategy::Spec, RewriteStrategy::Alternate] {
            let options = ProcessorOptions::default().with_strategy(strategy);
            let star = parse_with(options.clone(), r#"list: item**",". item: "x"."#, input);
            assert_eq!(star.unwrap(), expected, "{:?} **", strategy);
        }
    }

    #[rstest]
    #[case("")]
    #[case("x")]
    #[case("xx")]
    #[case("xxx")]
    fn test_bare_repetition_strategies_agree(#[case] input: &str) {
        let results: Vec<String> = [RewriteStrategy::Spec, RewriteStrategy::Alternate]
            .into_iter()
            .map(|strategy| {
                let options = ProcessorOptions::default().with_strategy(strategy);
                parse_with(options, r#"list: item*. item: "x"."#, input).unwrap()
            })
            .collect();
        assert_eq!(results[0], results[1]);
        assert!(!results[0].contains("ixml:state"));
        assert_eq!(results[0].matches("<item>").count(), input.len());
    }

    #[rstest]
    #[case("x", 1)]
    #[case("x;x;x", 3)]
    fn test_plus_separated(#[case] input: &str, #[case] items: usize) {
        for strategy in [RewriteStrategy::Spec, RewriteStrategy::Alternate] {
            let options = ProcessorOptions::default().with_strategy(strategy);
            let xml = parse_with(options, r#"list: item++-";". item: "x"."#, input).unwrap();
            assert_eq!(xml.matches("<item>x</item>").count(), items);
            assert!(!xml.contains(';'));
        }
    }

    #[test]
    fn test_plus_rejects_empty_input() {
        let xml = parse(r#"list: item++",". item: "x"."#, "").unwrap();
        assert!(xml.starts_with("<failed"));
        assert!(xml.contains("<end-of-input/>"));
        assert!(xml.contains("<permitted>'x'</permitted>"));
    }

    #[test]
    fn test_single_rootedness() {
        assert_eq!(
            parse(r#"-s: a, a. a: "x"."#, "xx").unwrap_err(),
            IxmlError::NotSingleRooted
        );
        assert_eq!(parse(r#"-s: a. a: "x"."#, "x").unwrap(), "<a>x</a>");
    }

    #[test]
    fn test_discard_empty() {
        let grammar = format!(
            r#"{} s: e, "x", e. {{[n:discard empty]}} e: "y"?."#,
            NINEML
        );
        assert_eq!(parse(&grammar, "x").unwrap(), "<s>x</s>");
        assert_eq!(parse(&grammar, "yx").unwrap(), "<s><e>y</e>x</s>");
    }

    #[test]
    fn test_discard_empty_keeps_whitespace_attribute() {
        let grammar = format!(r#"{} s: e, "x". {{[n:discard empty]}} e: @v?. v: " "."#, NINEML);
        assert_eq!(parse(&grammar, " x").unwrap(), r#"<s><e v=" "/>x</s>"#);
        assert_eq!(parse(&grammar, "x").unwrap(), "<s>x</s>");
    }

    #[test]
    fn test_ambiguity_is_reported() {
        let grammar = r#"s: a; b. a: "x". b: "x"."#;
        assert_eq!(
            parse(grammar, "x").unwrap(),
            r#"<s xmlns:ixml="http://invisiblexml.org/NS" ixml:state="ambiguous"><a>x</a></s>"#
        );
    }

    #[test]
    fn test_priority_resolves_ambiguity() {
        let grammar = format!(
            r#"{} s: a; b. a: "x". {{[n:priority 2]}} b: "x"."#,
            NINEML
        );
        assert_eq!(parse(&grammar, "x").unwrap(), "<s><b>x</b></s>");

        let strict = ProcessorOptions::default().with_strict_ambiguity(true);
        assert_eq!(
            parse_with(strict, &grammar, "x").unwrap(),
            r#"<s xmlns:ixml="http://invisiblexml.org/NS" ixml:state="ambiguous"><b>x</b></s>"#
        );
    }

    #[test]
    fn test_version_mismatch_state() {
        let grammar = r#"ixml version "1.1". s: "x"."#;
        assert_eq!(
            parse(grammar, "x").unwrap(),
            r#"<s xmlns:ixml="http://invisiblexml.org/NS" ixml:state="version-mismatch">x</s>"#
        );
        let suppressed = ProcessorOptions::default().with_suppressed_states(false, true);
        assert_eq!(parse_with(suppressed, grammar, "x").unwrap(), "<s>x</s>");
    }

    #[test]
    fn test_rename_and_namespace() {
        let grammar = format!(
            r#"{} ixml version "1.0" {{[n:xmlns "urn:example"]}}.
               s: item+. {{[n:rename entry]}} item: "x"."#,
            NINEML
        );
        assert_eq!(
            parse(&grammar, "xx").unwrap(),
            r#"<s xmlns="urn:example"><entry>x</entry><entry>x</entry></s>"#
        );
    }

    #[test]
    fn test_namespace_with_hidden_start_rule() {
        let grammar = format!(
            r#"{} ixml version "1.0" {{[n:xmlns "urn:example"]}}. -s: a. a: 'x'."#,
            NINEML
        );
        assert_eq!(parse(&grammar, "x").unwrap(), r#"<a xmlns="urn:example">x</a>"#);
    }

    #[test]
    fn test_attribute_values_from_hidden_structure() {
        let grammar = r#"date: day, -"/", @month. -day: d, d. month: d, d. -d: ["0"-"9"]."#;
        assert_eq!(
            parse(grammar, "07/11").unwrap(),
            r#"<date month="11">07</date>"#
        );
    }

    #[test]
    fn test_insertion_and_rewrite() {
        let grammar = format!(
            r#"{} s: +"[", {{[n:rewrite "yes"]}} "y", +"]"."#,
            NINEML
        );
        assert_eq!(parse(&grammar, "y").unwrap(), "<s>[yes]</s>");
    }

    #[test]
    fn test_configuration_errors_surface_from_compile() {
        let processor = IxmlProcessor::default();
        assert!(matches!(
            processor.compile("s: t."),
            Err(IxmlError::UndefinedNonterminal { .. })
        ));
        assert!(matches!(
            processor.compile(r#"s: "x". s: "y"."#),
            Err(IxmlError::RuleRedefined(_))
        ));
        assert!(matches!(
            processor.compile(r#"{[p:rename x]} s: "x"."#),
            Err(IxmlError::UnboundPragmaPrefix { .. })
        ));
        let lenient = IxmlProcessor::new(ProcessorOptions {
            check_undefined_nonterminals: false,
            ..ProcessorOptions::default()
        });
        assert!(lenient.compile("s: t.").is_ok());
    }

    #[test]
    fn test_failure_document() {
        let processor = IxmlProcessor::default();
        let compiled = processor.compile(r#"s: "a", "b"."#).unwrap();
        assert!(TestEngine::parse(&compiled, "ac").is_none());

        let failure = TestEngine::failure(&compiled, "ac");
        let mut sink = StringSink::new();
        processor.render_failure(&failure, &mut sink);
        assert_eq!(
            sink.into_string(),
            concat!(
                r#"<failed xmlns:ixml="http://invisiblexml.org/NS" ixml:state="failed">"#,
                "<line>1</line><column>2</column><pos>1</pos>",
                "<unexpected>c</unexpected>",
                "<permitted>'b'</permitted>",
                "</failed>"
            )
        );
    }
}
