//! rustixml-core - Invisible XML grammar compilation and tree construction
//!
//! The parts of an iXML processor that sit around a general context-free
//! parsing engine:
//!
//! - load an ixml grammar, interpret its pragmas and simplify it into plain
//!   BNF-like rules ([`IxmlProcessor::load`], [`rewrite::Simplifier`])
//! - lower it into a [`CanonicalGrammar`] whose symbols carry the attributes
//!   the engine hands back ([`IxmlProcessor::compile`])
//! - turn the engine's derivation events into XML ([`TreeBuilder`]), or a
//!   failed parse into an error document ([`ErrorDocumentBuilder`])
//!
//! The engine itself is not part of this crate.
//!
//! # Quick Start
//!
//! ```rust
//! use rustixml_core::{IxmlProcessor, ProcessorOptions};
//!
//! let grammar = r#"
//!     greeting: "Hello, ", name, "!".
//!     name: letter+.
//!     -letter: ["A"-"Z"; "a"-"z"].
//! "#;
//!
//! let processor = IxmlProcessor::new(ProcessorOptions::default());
//! let compiled = processor.compile(grammar).unwrap();
//! assert_eq!(compiled.start_name(), "greeting");
//! for rule in compiled.rules() {
//!     println!("{}", rule);
//! }
//! ```

pub mod ast;
pub mod canonical;
pub mod charclass;
pub mod compiler;
pub mod error;
pub mod error_document;
pub mod grammar_parser;
pub mod lexer;
pub mod options;
pub mod pragmas;
pub mod processor;
pub mod rewrite;
pub mod selector;
pub mod sink;
pub mod tree_builder;
pub mod xml_chars;
pub mod xml_node;

#[cfg(test)]
mod test_engine;

// Re-export main API
pub use ast::Grammar;
pub use canonical::{CanonicalGrammar, CanonicalRule, ParserAttributes, Symbol, TokenMatcher};
pub use error::{IxmlError, Result};
pub use error_document::{ErrorDocumentBuilder, ParseFailure};
pub use grammar_parser::parse_ixml_grammar;
pub use options::{ProcessorOptions, RewriteStrategy};
pub use processor::IxmlProcessor;
pub use selector::{PriorityTreeSelector, TreeSelector};
pub use sink::{StringSink, XmlEventSink};
pub use tree_builder::{ParseEventHandler, TreeBuilder};
pub use xml_node::{XmlNode, XmlTreeSink};
