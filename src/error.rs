//! Error types for grammar compilation and tree construction
//!
//! Every variant carries a stable code (see [`IxmlError::code`]) so callers can
//! match on the kind of failure without parsing the message text.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, IxmlError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IxmlError {
    /// The ixml source text could not be parsed
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("invalid mark '{0}', expected one of '^', '@', '-'")]
    InvalidMark(char),

    #[error("invalid hexadecimal character '#{0}'")]
    InvalidHex(String),

    #[error("invalid range {from:?}-{to:?}: start is greater than end")]
    InvalidRange { from: char, to: char },

    #[error("unknown character class code '{0}'")]
    UnknownClass(String),

    #[error("'{symbol}' has more than one rename pragma ('{first}' and '{second}')")]
    DuplicateRename {
        symbol: String,
        first: String,
        second: String,
    },

    #[error("rule '{0}' is defined more than once")]
    RuleRedefined(String),

    #[error("nonterminal '{name}' used in rule '{rule}' is never defined")]
    UndefinedNonterminal { name: String, rule: String },

    #[error("grammar has no rules")]
    EmptyGrammar,

    #[error("malformed data for pragma '{pragma}': {reason} (data: {data:?})")]
    MalformedPragmaData {
        pragma: String,
        data: String,
        reason: String,
    },

    #[error("pragma '{pragma}' uses unbound namespace prefix '{prefix}'")]
    UnboundPragmaPrefix { prefix: String, pragma: String },

    /// Simplification left a construct the grammar builder cannot express
    #[error("unexpected {kind} node in simplified rule '{rule}'")]
    UnexpectedNode { kind: String, rule: String },

    #[error("result is not single rooted")]
    NotSingleRooted,

    #[error("attribute '{0}' cannot be attached to the document root")]
    AttributeAtRoot(String),

    #[error("duplicate attribute '{attribute}' on element '{element}'")]
    DuplicateAttribute { element: String, attribute: String },

    #[error("attribute name '{0}' is reserved for namespace declarations")]
    ReservedAttribute(String),

    #[error("'{0}' is not a valid XML name")]
    InvalidXmlName(String),

    #[error("character #{0:X} is not allowed in XML")]
    InvalidXmlChar(u32),

    /// A parse event arrived that does not match the open node stack
    #[error("unbalanced parse events: {0}")]
    UnbalancedEvents(String),
}

impl IxmlError {
    /// Stable identifier for the error kind
    pub fn code(&self) -> &'static str {
        match self {
            IxmlError::Syntax { .. } => "IXML0001",
            IxmlError::InvalidMark(_) => "IXML0002",
            IxmlError::InvalidHex(_) => "IXML0003",
            IxmlError::InvalidRange { .. } => "IXML0004",
            IxmlError::UnknownClass(_) => "IXML0005",
            IxmlError::DuplicateRename { .. } => "IXML0006",
            IxmlError::RuleRedefined(_) => "IXML0007",
            IxmlError::UndefinedNonterminal { .. } => "IXML0008",
            IxmlError::EmptyGrammar => "IXML0009",
            IxmlError::MalformedPragmaData { .. } => "IXML0010",
            IxmlError::UnboundPragmaPrefix { .. } => "IXML0011",
            IxmlError::UnexpectedNode { .. } => "IXML0100",
            IxmlError::NotSingleRooted => "IXML0101",
            IxmlError::AttributeAtRoot(_) => "IXML0102",
            IxmlError::DuplicateAttribute { .. } => "IXML0103",
            IxmlError::ReservedAttribute(_) => "IXML0104",
            IxmlError::UnbalancedEvents(_) => "IXML0105",
            IxmlError::InvalidXmlName(_) => "IXML0200",
            IxmlError::InvalidXmlChar(_) => "IXML0201",
        }
    }

    /// True for errors raised while building or simplifying a grammar
    pub fn is_configuration_error(&self) -> bool {
        self.code() < "IXML0100"
    }
}
