//! Error documents for failed parses
//!
//! When the engine cannot parse its input it hands back a [`ParseFailure`].
//! [`ErrorDocumentBuilder`] renders it as a small XML document rooted at
//! `<failed ixml:state="failed">` describing where parsing stopped and what
//! would have been accepted there.

use crate::canonical::{CanonicalRule, Symbol};
use crate::sink::{XmlAttribute, XmlEventSink};
use crate::tree_builder::IXML_NS;
use crate::xml_chars::is_printable;
use std::collections::BTreeSet;
use std::fmt;

/// A partially recognized rule in one chart row
#[derive(Debug, Clone, PartialEq)]
pub struct ChartItem {
    pub rule: CanonicalRule,
    /// Number of right-hand symbols already matched
    pub dot: usize,
    /// Input position where the rule started
    pub start: usize,
}

impl ChartItem {
    pub fn new(rule: CanonicalRule, dot: usize, start: usize) -> Self {
        ChartItem { rule, dot, start }
    }

    pub fn is_complete(&self) -> bool {
        self.dot >= self.rule.rhs.len()
    }

    /// The symbol right after the dot
    pub fn next_symbol(&self) -> Option<&Symbol> {
        self.rule.rhs.get(self.dot)
    }
}

impl fmt::Display for ChartItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ::=", self.rule.lhs)?;
        for (i, symbol) in self.rule.rhs.iter().enumerate() {
            if i == self.dot {
                write!(f, " •")?;
            }
            write!(f, " {}", symbol)?;
        }
        if self.is_complete() {
            write!(f, " •")?;
        }
        write!(f, " ({})", self.start)
    }
}

/// Chart rows as left by the engine, one row per input position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagnosticChart {
    rows: Vec<Vec<ChartItem>>,
}

impl DiagnosticChart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_row(&mut self, items: Vec<ChartItem>) {
        self.rows.push(items);
    }

    pub fn rows(&self) -> &[Vec<ChartItem>] {
        &self.rows
    }

    pub fn last_nonempty_row(&self) -> Option<&[ChartItem]> {
        self.rows
            .iter()
            .rev()
            .find(|row| !row.is_empty())
            .map(|row| row.as_slice())
    }
}

/// What the engine reports when no parse exists
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseFailure {
    pub line: Option<usize>,
    pub column: Option<usize>,
    /// Byte offset of the failure in the UTF-8 input
    pub position: Option<usize>,
    /// The character that could not be consumed; `None` at end of input
    pub unexpected: Option<char>,
    /// Terminals the engine would have accepted at the failure point
    pub predicted: Vec<Symbol>,
    pub chart: Option<DiagnosticChart>,
}

impl ParseFailure {
    /// A failure at character index `index` of `input`; line, column and
    /// byte offset are computed from the input
    pub fn at(input: &str, index: usize) -> Self {
        let (line, column) = line_col(input, index);
        let (offset, unexpected) = match input.char_indices().nth(index) {
            Some((offset, ch)) => (offset, Some(ch)),
            None => (input.len(), None),
        };
        ParseFailure {
            line: Some(line),
            column: Some(column),
            position: Some(offset),
            unexpected,
            predicted: Vec::new(),
            chart: None,
        }
    }

    pub fn with_predicted(mut self, predicted: Vec<Symbol>) -> Self {
        self.predicted = predicted;
        self
    }

    pub fn with_chart(mut self, chart: DiagnosticChart) -> Self {
        self.chart = Some(chart);
        self
    }

    /// Sorted, deduplicated descriptions of every terminal that was possible
    pub fn permitted(&self) -> Vec<String> {
        let mut permitted: BTreeSet<String> =
            self.predicted.iter().map(|s| s.to_string()).collect();

        if let Some(row) = self.chart.as_ref().and_then(|c| c.last_nonempty_row()) {
            for item in row.iter().filter(|item| !item.is_complete()) {
                if let Some(symbol) = item.next_symbol().filter(|s| s.is_terminal()) {
                    permitted.insert(symbol.to_string());
                }
            }
        }
        permitted.into_iter().collect()
    }
}

/// 1-based line and column of a character offset
pub fn line_col(input: &str, position: usize) -> (usize, usize) {
    let mut line = 1;
    let mut column = 1;
    for ch in input.chars().take(position) {
        if ch == '\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

fn describe_char(ch: char) -> String {
    if is_printable(ch) {
        ch.to_string()
    } else {
        format!("#{:x}", ch as u32)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ErrorDocumentBuilder {
    show_chart: bool,
}

impl ErrorDocumentBuilder {
    pub fn new(show_chart: bool) -> Self {
        ErrorDocumentBuilder { show_chart }
    }

    pub fn render(&self, failure: &ParseFailure, sink: &mut dyn XmlEventSink) {
        sink.start_document();
        sink.start_prefix_mapping("ixml", IXML_NS);
        let state = XmlAttribute::qualified(IXML_NS, "ixml", "state", "failed");
        sink.start_element("", "failed", "failed", &[state]);

        if let Some(line) = failure.line {
            text_element(sink, "line", &line.to_string());
        }
        if let Some(column) = failure.column {
            text_element(sink, "column", &column.to_string());
        }
        if let Some(pos) = failure.position {
            text_element(sink, "pos", &pos.to_string());
        }

        match failure.unexpected {
            Some(ch) => text_element(sink, "unexpected", &describe_char(ch)),
            None => {
                sink.start_element("", "end-of-input", "end-of-input", &[]);
                sink.end_element("", "end-of-input", "end-of-input");
            }
        }

        let permitted = failure.permitted();
        if !permitted.is_empty() {
            text_element(sink, "permitted", &permitted.join(", "));
        }

        if self.show_chart {
            if let Some(chart) = &failure.chart {
                render_chart(chart, sink);
            }
        }

        sink.end_element("", "failed", "failed");
        sink.end_document();
    }
}

fn text_element(sink: &mut dyn XmlEventSink, name: &str, text: &str) {
    sink.start_element("", name, name, &[]);
    sink.characters(text);
    sink.end_element("", name, name);
}

fn render_chart(chart: &DiagnosticChart, sink: &mut dyn XmlEventSink) {
    sink.start_element("", "chart", "chart", &[]);
    for (n, row) in chart.rows().iter().enumerate() {
        let attrs = [XmlAttribute::new("n", &n.to_string())];
        sink.start_element("", "row", "row", &attrs);
        for item in row {
            text_element(sink, "item", &item.to_string());
        }
        sink.end_element("", "row", "row");
    }
    sink.end_element("", "chart", "chart");
}
