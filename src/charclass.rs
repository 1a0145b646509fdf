//! Character sets for inclusion and exclusion terminals
//!
//! A [`RangeSet`] is the matcher behind every terminal the grammar builder
//! emits for `[...]` and `~[...]`. Unicode general category codes are resolved
//! through `unicode-general-category` and cached per code.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, OnceLock};
use unicode_general_category::{get_general_category, GeneralCategory};

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RangeSet {
    /// Sorted, non-overlapping, non-adjacent inclusive ranges
    ranges: Vec<(char, char)>,
}

impl RangeSet {
    pub fn new() -> Self {
        RangeSet { ranges: Vec::new() }
    }

    pub fn from_char(ch: char) -> Self {
        RangeSet {
            ranges: vec![(ch, ch)],
        }
    }

    /// A reversed range yields the empty set
    pub fn from_range(start: char, end: char) -> Self {
        if start <= end {
            RangeSet {
                ranges: vec![(start, end)],
            }
        } else {
            RangeSet::new()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn add_char(&mut self, ch: char) {
        self.add_range(ch, ch);
    }

    pub fn add_range(&mut self, start: char, end: char) {
        if start > end {
            return;
        }
        self.ranges.push((start, end));
        self.normalize();
    }

    fn normalize(&mut self) {
        if self.ranges.len() <= 1 {
            return;
        }
        self.ranges.sort_by_key(|r| r.0);
        let mut merged = Vec::with_capacity(self.ranges.len());
        let mut current = self.ranges[0];

        for &(start, end) in &self.ranges[1..] {
            if start as u32 <= current.1 as u32 + 1 {
                current.1 = current.1.max(end);
            } else {
                merged.push(current);
                current = (start, end);
            }
        }
        merged.push(current);
        self.ranges = merged;
    }

    pub fn union(&self, other: &RangeSet) -> RangeSet {
        let mut result = self.clone();
        result.ranges.extend_from_slice(&other.ranges);
        result.normalize();
        result
    }

    pub fn contains(&self, ch: char) -> bool {
        self.ranges
            .binary_search_by(|&(start, end)| {
                if end < ch {
                    std::cmp::Ordering::Less
                } else if start > ch {
                    std::cmp::Ordering::Greater
                } else {
                    std::cmp::Ordering::Equal
                }
            })
            .is_ok()
    }

    pub fn ranges(&self) -> &[(char, char)] {
        &self.ranges
    }

    pub fn num_ranges(&self) -> usize {
        self.ranges.len()
    }
}

impl fmt::Display for RangeSet {
    /// Renders the set in ixml member notation, e.g. `#30-#39; 'a'`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, &(start, end)) in self.ranges.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            if start == end {
                write!(f, "{}", member(start))?;
            } else {
                write!(f, "{}-{}", member(start), member(end))?;
            }
        }
        Ok(())
    }
}

/// One character in ixml notation: quoted when printable, `#hex` otherwise
pub fn member(ch: char) -> String {
    if ch == '\'' {
        "\"'\"".to_string()
    } else if ch.is_control() || ch.is_whitespace() {
        format!("#{:x}", ch as u32)
    } else {
        format!("'{}'", ch)
    }
}

pub fn is_category_code(code: &str) -> bool {
    matches!(
        code,
        "L" | "M" | "N" | "P" | "S" | "Z" | "C"
            | "Lu" | "Ll" | "Lt" | "Lm" | "Lo" | "LC"
            | "Mn" | "Mc" | "Me"
            | "Nd" | "Nl" | "No"
            | "Pc" | "Pd" | "Ps" | "Pe" | "Pi" | "Pf" | "Po"
            | "Sm" | "Sc" | "Sk" | "So"
            | "Zs" | "Zl" | "Zp"
            | "Cc" | "Cf" | "Cs" | "Co" | "Cn"
    )
}

fn category_matches(cat: GeneralCategory, code: &str) -> bool {
    use GeneralCategory::*;
    match code {
        "L" => matches!(
            cat,
            UppercaseLetter | LowercaseLetter | TitlecaseLetter | ModifierLetter | OtherLetter
        ),
        "LC" => matches!(cat, UppercaseLetter | LowercaseLetter | TitlecaseLetter),
        "M" => matches!(cat, NonspacingMark | SpacingMark | EnclosingMark),
        "N" => matches!(cat, DecimalNumber | LetterNumber | OtherNumber),
        "P" => matches!(
            cat,
            ConnectorPunctuation
                | DashPunctuation
                | OpenPunctuation
                | ClosePunctuation
                | InitialPunctuation
                | FinalPunctuation
                | OtherPunctuation
        ),
        "S" => matches!(cat, MathSymbol | CurrencySymbol | ModifierSymbol | OtherSymbol),
        "Z" => matches!(cat, SpaceSeparator | LineSeparator | ParagraphSeparator),
        "C" => matches!(cat, Control | Format | Surrogate | PrivateUse | Unassigned),
        "Lu" => cat == UppercaseLetter,
        "Ll" => cat == LowercaseLetter,
        "Lt" => cat == TitlecaseLetter,
        "Lm" => cat == ModifierLetter,
        "Lo" => cat == OtherLetter,
        "Mn" => cat == NonspacingMark,
        "Mc" => cat == SpacingMark,
        "Me" => cat == EnclosingMark,
        "Nd" => cat == DecimalNumber,
        "Nl" => cat == LetterNumber,
        "No" => cat == OtherNumber,
        "Pc" => cat == ConnectorPunctuation,
        "Pd" => cat == DashPunctuation,
        "Ps" => cat == OpenPunctuation,
        "Pe" => cat == ClosePunctuation,
        "Pi" => cat == InitialPunctuation,
        "Pf" => cat == FinalPunctuation,
        "Po" => cat == OtherPunctuation,
        "Sm" => cat == MathSymbol,
        "Sc" => cat == CurrencySymbol,
        "Sk" => cat == ModifierSymbol,
        "So" => cat == OtherSymbol,
        "Zs" => cat == SpaceSeparator,
        "Zl" => cat == LineSeparator,
        "Zp" => cat == ParagraphSeparator,
        "Cc" => cat == Control,
        "Cf" => cat == Format,
        "Cs" => cat == Surrogate,
        "Co" => cat == PrivateUse,
        "Cn" => cat == Unassigned,
        _ => false,
    }
}

/// Resolve a general category code (`L`, `Nd`, ...) to the set of its characters.
/// Results are cached; `None` for unknown codes.
pub fn unicode_category_to_rangeset(code: &str) -> Option<RangeSet> {
    static UNICODE_CACHE: OnceLock<Mutex<HashMap<String, RangeSet>>> = OnceLock::new();

    if !is_category_code(code) {
        return None;
    }

    let cache = UNICODE_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    if let Ok(lock) = cache.lock() {
        if let Some(set) = lock.get(code) {
            return Some(set.clone());
        }
    }

    let mut result = RangeSet::new();
    let mut run: Option<(char, char)> = None;

    for codepoint in 0u32..=0x10FFFF {
        let Some(ch) = char::from_u32(codepoint) else {
            continue;
        };
        if category_matches(get_general_category(ch), code) {
            run = match run {
                Some((start, _)) => Some((start, ch)),
                None => Some((ch, ch)),
            };
        } else if let Some((start, end)) = run.take() {
            result.ranges.push((start, end));
        }
    }
    if let Some((start, end)) = run {
        result.ranges.push((start, end));
    }
    // Surrogates break runs, so adjacent pieces may still need merging
    result.normalize();

    if let Ok(mut lock) = cache.lock() {
        lock.insert(code.to_string(), result.clone());
    }

    Some(result)
}
