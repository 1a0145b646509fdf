//! Pragma processing
//!
//! The loader leaves pragmas as raw `Pragma` child nodes. [`process_pragmas`]
//! registers namespace declarations on the grammar, resolves every other
//! pragma name against them, validates the data of the nineml vocabulary and
//! attaches the result to the parent node as a [`Pragma`]. Problems with
//! namespace declarations and pragmas from foreign namespaces are logged and
//! dropped; malformed nineml pragma data aborts processing.

use crate::ast::{Grammar, NodeId, NodeKind};
use crate::error::{IxmlError, Result};
use log::{debug, warn};

/// Namespace of the pragmas this crate understands
pub const NINEML_PRAGMA_NS: &str = "https://nineml.org/ns/pragma/";

const NAMESPACE_DECLARATION: &str = "ixmlns";

#[derive(Debug, Clone, PartialEq)]
pub enum PragmaDirective {
    /// Output name for a rule or nonterminal
    Rename(String),
    /// Drop the element when it has neither attributes nor children
    DiscardEmpty,
    Priority(f64),
    DefaultPriority(f64),
    Token(String),
    Regex(String),
    Metadata { uri: String, data: Option<String> },
    /// Replacement text for a literal or insertion
    Rewrite(String),
    /// Default namespace of the output document
    Xmlns(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pragma {
    /// Name as written, e.g. `n:rename`
    pub name: String,
    pub data: String,
    pub directive: PragmaDirective,
}

/// Resolve every raw pragma node in the grammar
pub fn process_pragmas(grammar: &mut Grammar) -> Result<()> {
    let root = grammar.root();

    // Declarations first so that every later lookup sees all bindings
    let raw: Vec<NodeId> = grammar
        .descendants(root)
        .into_iter()
        .filter(|id| matches!(grammar.kind(*id), NodeKind::Pragma { .. }))
        .collect();

    let mut remaining = Vec::new();
    for id in raw {
        let (name, data) = match grammar.kind(id) {
            NodeKind::Pragma { name, data } => (name.clone(), data.clone()),
            _ => continue,
        };
        match name.strip_prefix("ixmlns:") {
            Some(prefix) => {
                declare_namespace(grammar, prefix, &data);
                grammar.detach(id);
            }
            None if name == NAMESPACE_DECLARATION => {
                warn!("Ignoring namespace declaration without a prefix: {}", data);
                grammar.detach(id);
            }
            None => remaining.push((id, name, data)),
        }
    }

    for (id, name, data) in remaining {
        let owner = grammar.parent(id);
        grammar.detach(id);
        let Some(owner) = owner else { continue };

        if let Some(directive) = resolve(grammar, &name, &data)? {
            let pragma = Pragma {
                name,
                data,
                directive,
            };
            attach(grammar, owner, pragma)?;
        }
    }

    Ok(())
}

fn declare_namespace(grammar: &mut Grammar, prefix: &str, data: &str) {
    let uri = unquote(data);
    if prefix == "xml" || prefix == "xmlns" {
        warn!("Ignoring declaration of reserved prefix '{}'", prefix);
    } else if uri.is_empty() {
        warn!("Ignoring declaration of prefix '{}' with an empty URI", prefix);
    } else if let Some(existing) = grammar.namespace_uri(prefix) {
        warn!(
            "Ignoring duplicate declaration of prefix '{}' (already bound to {})",
            prefix, existing
        );
    } else {
        debug!("Binding pragma prefix '{}' to {}", prefix, uri);
        grammar.bind_namespace(prefix, &uri);
    }
}

/// Map a pragma to its directive, or `None` when it is not ours
fn resolve(grammar: &Grammar, name: &str, data: &str) -> Result<Option<PragmaDirective>> {
    let local = match name.split_once(':') {
        Some((prefix, local)) => {
            let uri = grammar
                .namespace_uri(prefix)
                .ok_or_else(|| IxmlError::UnboundPragmaPrefix {
                    prefix: prefix.to_string(),
                    pragma: name.to_string(),
                })?;
            if uri != NINEML_PRAGMA_NS {
                warn!("Ignoring pragma '{}' from unrecognized namespace {}", name, uri);
                return Ok(None);
            }
            local
        }
        None => {
            debug!("Treating unprefixed pragma '{}' as a nineml pragma", name);
            name
        }
    };

    let data = data.trim();
    let malformed = |reason: &str| IxmlError::MalformedPragmaData {
        pragma: name.to_string(),
        data: data.to_string(),
        reason: reason.to_string(),
    };

    let directive = match local {
        "rename" => {
            let value = unquote(data);
            if value.is_empty() {
                return Err(malformed("a new name is required"));
            }
            PragmaDirective::Rename(value)
        }
        "discard" => {
            if data != "empty" {
                return Err(malformed("the only supported value is 'empty'"));
            }
            PragmaDirective::DiscardEmpty
        }
        "priority" | "default-priority" => {
            let weight: f64 = data
                .parse()
                .ok()
                .filter(|w: &f64| w.is_finite())
                .ok_or_else(|| malformed("expected a number"))?;
            if local == "priority" {
                PragmaDirective::Priority(weight)
            } else {
                PragmaDirective::DefaultPriority(weight)
            }
        }
        "token" | "regex" | "rewrite" => {
            let value = quoted(data).ok_or_else(|| malformed("expected a quoted string"))?;
            match local {
                "token" => PragmaDirective::Token(value),
                "regex" => PragmaDirective::Regex(value),
                _ => PragmaDirective::Rewrite(value),
            }
        }
        "metadata" => {
            let (uri, rest) = match data.split_once(char::is_whitespace) {
                Some((uri, rest)) => (uri, Some(rest.trim().to_string())),
                None => (data, None),
            };
            if uri.is_empty() {
                return Err(malformed("a URI is required"));
            }
            PragmaDirective::Metadata {
                uri: unquote(uri),
                data: rest.filter(|r| !r.is_empty()),
            }
        }
        "xmlns" => {
            let uri = unquote(data);
            if uri.is_empty() {
                return Err(malformed("a namespace URI is required"));
            }
            PragmaDirective::Xmlns(uri)
        }
        other => {
            warn!("Ignoring unknown nineml pragma '{}'", other);
            return Ok(None);
        }
    };

    Ok(Some(directive))
}

fn attach(grammar: &mut Grammar, owner: NodeId, pragma: Pragma) -> Result<()> {
    match &pragma.directive {
        PragmaDirective::Rename(new_name) => {
            let symbol = grammar.node(owner).name().to_string();
            match &mut grammar.node_mut(owner).kind {
                NodeKind::Rule { rename, .. } | NodeKind::Nonterminal { rename, .. } => {
                    if let Some(first) = rename {
                        return Err(IxmlError::DuplicateRename {
                            symbol,
                            first: first.clone(),
                            second: new_name.clone(),
                        });
                    }
                    *rename = Some(new_name.clone());
                }
                other => {
                    warn!("Ignoring rename pragma on {} node", other.label());
                    return Ok(());
                }
            }
        }
        PragmaDirective::Xmlns(uri) => {
            let uri = uri.clone();
            grammar.set_default_namespace(&uri);
        }
        PragmaDirective::Rewrite(_) => {
            if !matches!(
                grammar.kind(owner),
                NodeKind::Literal { .. } | NodeKind::Insertion { .. }
            ) {
                warn!(
                    "Ignoring rewrite pragma on {} node",
                    grammar.kind(owner).label()
                );
                return Ok(());
            }
        }
        _ => {}
    }

    grammar.node_mut(owner).pragmas.push(pragma);
    Ok(())
}

/// Strip one level of matching quotes, collapsing doubled inner quotes
fn quoted(data: &str) -> Option<String> {
    let mut chars = data.chars();
    let first = chars.next()?;
    if (first != '"' && first != '\'') || data.len() < 2 || !data.ends_with(first) {
        return None;
    }
    let inner = &data[1..data.len() - 1];
    let doubled: String = [first, first].iter().collect();
    Some(inner.replace(&doubled, &first.to_string()))
}

fn unquote(data: &str) -> String {
    let data = data.trim();
    quoted(data).unwrap_or_else(|| data.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar_parser::parse_ixml_grammar;

    const NS: &str = r#"{[ixmlns:n "https://nineml.org/ns/pragma/"]}"#;

    fn processed(body: &str) -> Result<Grammar> {
        let mut g = parse_ixml_grammar(&format!("{}\n{}", NS, body))?;
        process_pragmas(&mut g)?;
        Ok(g)
    }

    #[test]
    fn test_namespace_binding() {
        let g = processed("a: b.").unwrap();
        assert_eq!(g.namespace_uri("n"), Some(NINEML_PRAGMA_NS));
    }

    #[test]
    fn test_rename_on_rule_and_reference() {
        let g = processed("{[n:rename doc]} a: {[n:rename 'item']} b. b: 'x'.").unwrap();
        let rule = g.rules()[0];
        assert!(matches!(g.kind(rule), NodeKind::Rule { rename: Some(r), .. } if r == "doc"));

        let reference = g
            .descendants(rule)
            .into_iter()
            .find(|id| matches!(g.kind(*id), NodeKind::Nonterminal { .. }))
            .unwrap();
        assert!(matches!(g.kind(reference), NodeKind::Nonterminal { rename: Some(r), .. } if r == "item"));
        assert!(g.children(reference).is_empty());
    }

    #[test]
    fn test_duplicate_rename_is_fatal() {
        let err = processed("{[n:rename one]} {[n:rename two]} a: 'x'.").unwrap_err();
        assert_eq!(
            err,
            IxmlError::DuplicateRename {
                symbol: "a".to_string(),
                first: "one".to_string(),
                second: "two".to_string(),
            }
        );
    }

    #[test]
    fn test_priority_parsing() {
        let g = processed("a: {[n:priority 2.5]} b. b: 'x'.").unwrap();
        let rule = g.rules()[0];
        let b = g
            .descendants(rule)
            .into_iter()
            .find(|id| g.node(*id).name() == "b")
            .unwrap();
        assert_eq!(g.node(b).pragmas[0].directive, PragmaDirective::Priority(2.5));

        assert!(matches!(
            processed("{[n:priority high]} a: 'x'."),
            Err(IxmlError::MalformedPragmaData { .. })
        ));
    }

    #[test]
    fn test_discard_requires_empty() {
        assert!(processed("{[n:discard empty]} a: 'x'.").is_ok());
        assert!(matches!(
            processed("{[n:discard always]} a: 'x'."),
            Err(IxmlError::MalformedPragmaData { .. })
        ));
    }

    #[test]
    fn test_token_requires_quotes() {
        assert!(processed(r#"{[n:regex "[a-z]+"]} a: 'x'."#).is_ok());
        assert!(matches!(
            processed("{[n:token abc]} a: 'x'."),
            Err(IxmlError::MalformedPragmaData { .. })
        ));
    }

    #[test]
    fn test_unbound_prefix_is_error() {
        let mut g = parse_ixml_grammar("{[q:rename x]} a: 'x'.").unwrap();
        assert!(matches!(
            process_pragmas(&mut g),
            Err(IxmlError::UnboundPragmaPrefix { ref prefix, .. }) if prefix == "q"
        ));
    }

    #[test]
    fn test_foreign_namespace_is_ignored() {
        let mut g = parse_ixml_grammar(
            r#"{[ixmlns:o "urn:other"]} {[o:rename x]} a: 'x'."#,
        )
        .unwrap();
        process_pragmas(&mut g).unwrap();
        let rule = g.rules()[0];
        assert!(g.node(rule).pragmas.is_empty());
        assert!(matches!(g.kind(rule), NodeKind::Rule { rename: None, .. }));
    }

    #[test]
    fn test_bad_declarations_are_dropped() {
        let mut g = parse_ixml_grammar(
            r#"{[ixmlns:xml "urn:x"]} {[ixmlns:e ""]} {[ixmlns:n "urn:one"]} {[ixmlns:n "urn:two"]} a: 'x'."#,
        )
        .unwrap();
        process_pragmas(&mut g).unwrap();
        assert_eq!(g.namespace_uri("xml"), None);
        assert_eq!(g.namespace_uri("e"), None);
        assert_eq!(g.namespace_uri("n"), Some("urn:one"));
    }

    #[test]
    fn test_xmlns_sets_default_namespace() {
        let g = processed(r#"ixml version "1.0" {[n:xmlns "urn:example"]}. a: 'x'."#).unwrap();
        assert_eq!(g.default_namespace(), Some("urn:example"));
    }

    #[test]
    fn test_legacy_unprefixed_pragma() {
        let mut g = parse_ixml_grammar("{[discard empty]} a: 'x'.").unwrap();
        process_pragmas(&mut g).unwrap();
        let rule = g.rules()[0];
        assert_eq!(g.node(rule).pragmas[0].directive, PragmaDirective::DiscardEmpty);
    }

    #[test]
    fn test_quoted_helper() {
        assert_eq!(quoted("\"a\"\"b\""), Some("a\"b".to_string()));
        assert_eq!(quoted("'x'"), Some("x".to_string()));
        assert_eq!(quoted("x"), None);
        assert_eq!(quoted("\""), None);
    }
}
