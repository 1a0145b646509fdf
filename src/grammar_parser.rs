//! Handwritten recursive descent parser for iXML grammars
//!
//! Builds the [`Grammar`] node arena directly from the token stream. Pragmas
//! are kept as raw `Pragma` child nodes of whatever they precede; the pragma
//! processor validates and attaches them later.

use crate::ast::{Grammar, LiteralValue, Mark, NodeId, NodeKind, TMark};
use crate::charclass::is_category_code;
use crate::error::{IxmlError, Result};
use crate::lexer::{Lexer, Spanned, Token};

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    grammar: Grammar,
}

impl Parser {
    pub fn new(tokens: Vec<Spanned>) -> Self {
        Parser {
            tokens,
            pos: 0,
            grammar: Grammar::new(),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_ahead(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|s| &s.token)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn matches(&self, expected: &Token) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(t) == std::mem::discriminant(expected))
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn error(&self, message: impl Into<String>) -> IxmlError {
        let (line, column) = self
            .tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| (s.line, s.column))
            .unwrap_or((1, 1));
        IxmlError::Syntax {
            message: message.into(),
            line,
            column,
        }
    }

    fn expect(&mut self, expected: Token, description: &str) -> Result<()> {
        if self.matches(&expected) {
            self.consume();
            Ok(())
        } else {
            Err(self.error(format!("Expected {}, found {:?}", description, self.peek())))
        }
    }

    // Grammar: Prolog? (Pragma* Rule)+
    pub fn parse_grammar(mut self) -> Result<Grammar> {
        let root = self.grammar.root();
        let mut pending = self.parse_pragmas();

        if matches!(self.peek(), Some(Token::Ident(s)) if s == "ixml")
            && matches!(self.peek_ahead(1), Some(Token::Ident(s)) if s == "version")
        {
            self.parse_prolog(&mut pending)?;
        }

        let mut rule_count = 0;
        while !self.at_end() {
            pending.extend(self.parse_pragmas());
            if self.at_end() {
                break;
            }
            let rule_pragmas = self.split_grammar_pragmas(pending);
            pending = Vec::new();
            let rule = self.parse_rule(rule_pragmas)?;
            self.grammar.add_rule(rule);
            rule_count += 1;
        }

        for pragma in pending {
            self.grammar.append_child(root, pragma);
        }

        if rule_count == 0 {
            return Err(IxmlError::EmptyGrammar);
        }

        Ok(self.grammar)
    }

    // Prolog: "ixml" "version" String Pragma* "."
    fn parse_prolog(&mut self, pending: &mut Vec<NodeId>) -> Result<()> {
        self.consume();
        self.consume();
        let version = match self.consume() {
            Some(Token::String(v)) => v,
            other => return Err(self.error(format!("Expected version string, got {:?}", other))),
        };

        let root = self.grammar.root();
        let prolog = self.grammar.add_node(NodeKind::Prolog);
        let version_node = self.grammar.add_node(NodeKind::Version(version));
        self.grammar.append_child(prolog, version_node);
        self.grammar.append_child(root, prolog);

        // Pragmas before and inside the prolog apply to the whole grammar
        pending.extend(self.parse_pragmas());
        for pragma in pending.drain(..) {
            self.grammar.append_child(root, pragma);
        }
        self.expect(Token::Period, "'.' after version declaration")
    }

    /// Namespace declarations always belong to the grammar root
    fn split_grammar_pragmas(&mut self, pragmas: Vec<NodeId>) -> Vec<NodeId> {
        let root = self.grammar.root();
        let mut rest = Vec::new();
        for pragma in pragmas {
            let is_decl = matches!(self.grammar.kind(pragma),
                NodeKind::Pragma { name, .. } if name.starts_with("ixmlns:"));
            if is_decl {
                self.grammar.append_child(root, pragma);
            } else {
                rest.push(pragma);
            }
        }
        rest
    }

    fn parse_pragmas(&mut self) -> Vec<NodeId> {
        let mut pragmas = Vec::new();
        while let Some(Token::Pragma { name, data }) = self.peek().cloned() {
            self.consume();
            pragmas.push(self.grammar.add_node(NodeKind::Pragma { name, data }));
        }
        pragmas
    }

    fn parse_mark(&mut self) -> Option<char> {
        let mark = match self.peek() {
            Some(Token::At) => '@',
            Some(Token::Minus) => '-',
            Some(Token::Caret) => '^',
            _ => return None,
        };
        self.consume();
        Some(mark)
    }

    // Rule: Mark? Ident (":" | "=") Alternatives "."
    fn parse_rule(&mut self, pragmas: Vec<NodeId>) -> Result<NodeId> {
        let mark = match self.parse_mark() {
            Some(ch) => Mark::from_char(ch)?,
            None => Mark::Element,
        };

        let name = match self.consume() {
            Some(Token::Ident(s)) => s,
            other => return Err(self.error(format!("Expected rule name, got {:?}", other))),
        };

        if !(self.matches(&Token::Colon) || self.matches(&Token::Equals)) {
            return Err(self.error(format!("Expected ':' after rule name '{}'", name)));
        }
        self.consume();

        let rule = self
            .grammar
            .add_named(NodeKind::Rule { mark, rename: None }, &name);
        for pragma in pragmas {
            self.grammar.append_child(rule, pragma);
        }
        let alts = self.parse_alternatives()?;
        self.grammar.append_child(rule, alts);

        if !self.matches(&Token::Period) {
            return Err(self.error(format!("Expected '.' at end of rule '{}'", name)));
        }
        self.consume();

        Ok(rule)
    }

    // Alternatives: Sequence (("|" | ";") Sequence)*
    fn parse_alternatives(&mut self) -> Result<NodeId> {
        let alts = self.grammar.add_node(NodeKind::Alts);
        let first = self.parse_sequence()?;
        self.grammar.append_child(alts, first);

        while self.matches(&Token::Pipe) || self.matches(&Token::Semicolon) {
            self.consume();
            let alt = self.parse_sequence()?;
            self.grammar.append_child(alts, alt);
        }

        Ok(alts)
    }

    fn at_sequence_end(&self) -> bool {
        self.at_end()
            || self.matches(&Token::Period)
            || self.matches(&Token::Pipe)
            || self.matches(&Token::Semicolon)
            || self.matches(&Token::RParen)
    }

    // Sequence: Factor ("," Factor)* | Factor+ | empty
    fn parse_sequence(&mut self) -> Result<NodeId> {
        let alt = self.grammar.add_node(NodeKind::Alt);
        if self.at_sequence_end() {
            return Ok(alt);
        }

        let first = self.parse_factor()?;
        self.grammar.append_child(alt, first);

        if self.matches(&Token::Comma) {
            while self.matches(&Token::Comma) {
                self.consume();
                let factor = self.parse_factor()?;
                self.grammar.append_child(alt, factor);
            }
        } else {
            while !self.at_sequence_end() {
                let factor = self.parse_factor()?;
                self.grammar.append_child(alt, factor);
            }
        }

        Ok(alt)
    }

    // Factor: Pragma* Term ("?" | "*" | "+" | "**" Factor | "++" Factor)?
    fn parse_factor(&mut self) -> Result<NodeId> {
        let pragmas = self.parse_pragmas();
        let term = self.parse_term()?;
        for pragma in pragmas {
            self.grammar.append_child(term, pragma);
        }

        let wrapper = match self.peek() {
            Some(Token::Question) => NodeKind::Option,
            Some(Token::Star) | Some(Token::DoubleStar) => NodeKind::Repeat0,
            Some(Token::Plus) | Some(Token::DoublePlus) => NodeKind::Repeat1,
            _ => return Ok(term),
        };
        let separated = matches!(self.peek(), Some(Token::DoubleStar) | Some(Token::DoublePlus));
        self.consume();

        let node = self.grammar.add_node(wrapper);
        self.grammar.append_child(node, term);
        if separated {
            let sep = self.grammar.add_node(NodeKind::Sep);
            let sep_factor = self.parse_factor()?;
            self.grammar.append_child(sep, sep_factor);
            self.grammar.append_child(node, sep);
        }
        Ok(node)
    }

    // Term: "(" Alternatives ")" | Nonterminal | Literal | Insertion | Set
    fn parse_term(&mut self) -> Result<NodeId> {
        if self.matches(&Token::LParen) {
            self.consume();
            let alts = self.parse_alternatives()?;
            self.expect(Token::RParen, "')' after grouped alternatives")?;
            return Ok(alts);
        }

        // Insertion: +"text" or +#hex
        if self.matches(&Token::Plus) {
            self.consume();
            let value = self.parse_literal_value()?;
            return Ok(self.grammar.add_node(NodeKind::Insertion { value }));
        }

        let mark = self.parse_mark();

        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                self.consume();
                let mark = mark.map(Mark::from_char).transpose()?;
                Ok(self
                    .grammar
                    .add_named(NodeKind::Nonterminal { mark, rename: None }, &name))
            }
            Some(Token::String(_)) | Some(Token::Hex(_)) => {
                let tmark = mark.map(TMark::from_char).transpose()?.unwrap_or(TMark::Keep);
                let value = self.parse_literal_value()?;
                Ok(self.grammar.add_node(NodeKind::Literal { tmark, value }))
            }
            Some(Token::LBracket) | Some(Token::Tilde) => {
                let tmark = mark.map(TMark::from_char).transpose()?.unwrap_or(TMark::Keep);
                self.parse_set(tmark)
            }
            other => Err(self.error(format!("Expected factor, got {:?}", other))),
        }
    }

    fn parse_literal_value(&mut self) -> Result<LiteralValue> {
        match self.consume() {
            Some(Token::String(s)) => Ok(LiteralValue::String(s)),
            Some(Token::Hex(h)) => LiteralValue::from_hex(&h),
            other => Err(self.error(format!("Expected string or #hex, got {:?}", other))),
        }
    }

    // Set: "~"? "[" (Member ((";" | "|" | ",") Member)*)? "]"
    fn parse_set(&mut self, tmark: TMark) -> Result<NodeId> {
        let kind = if self.matches(&Token::Tilde) {
            self.consume();
            NodeKind::Exclusion { tmark }
        } else {
            NodeKind::Inclusion { tmark }
        };
        self.expect(Token::LBracket, "'['")?;

        let set = self.grammar.add_node(kind);
        while !self.matches(&Token::RBracket) {
            if self.at_end() {
                return Err(self.error("Unterminated character set"));
            }
            let member = self.parse_member()?;
            self.grammar.append_child(set, member);
            if self.matches(&Token::Semicolon)
                || self.matches(&Token::Pipe)
                || self.matches(&Token::Comma)
            {
                self.consume();
            }
        }
        self.consume();
        Ok(set)
    }

    // Member: Literal | Literal "-" Literal | ClassCode
    fn parse_member(&mut self) -> Result<NodeId> {
        if let Some(Token::Ident(code)) = self.peek().cloned() {
            self.consume();
            if !is_category_code(&code) {
                return Err(IxmlError::UnknownClass(code));
            }
            return Ok(self.grammar.add_node(NodeKind::Class { code }));
        }

        let value = self.parse_literal_value()?;
        if !self.matches(&Token::Minus) {
            return Ok(self.grammar.add_node(NodeKind::Literal {
                tmark: TMark::Keep,
                value,
            }));
        }
        self.consume();
        let end = self.parse_literal_value()?;
        let from = self.range_bound(value)?;
        let to = self.range_bound(end)?;
        if from > to {
            return Err(IxmlError::InvalidRange { from, to });
        }
        Ok(self.grammar.add_node(NodeKind::Range { from, to }))
    }

    fn range_bound(&self, value: LiteralValue) -> Result<char> {
        match value {
            LiteralValue::Hex(ch) => Ok(ch),
            LiteralValue::String(s) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => Ok(ch),
                    _ => Err(self.error(format!(
                        "Range bound must be a single character, got \"{}\"",
                        s
                    ))),
                }
            }
        }
    }
}

/// Parse an iXML grammar from a string
pub fn parse_ixml_grammar(input: &str) -> Result<Grammar> {
    let tokens = Lexer::new(input).tokenize()?;
    Parser::new(tokens).parse_grammar()
}
