//! Pattern syntax.
//!
//! ```text
//! alternation  := sequence ('|' sequence)*
//! sequence     := repeat*
//! repeat       := atom quantifier*
//! quantifier   := '?' | ('*' | '+') ('!' | '^')? | '{' counts '}' ('!' | '^')?
//! counts       := n | n ',' | n ',' m | n ',' m ',' k (',' ...)*
//! atom         := '(' alternation ')' | '[' '^'? class-item* ']' | '.' | '\' escape | char
//! ```
//!
//! `{n,m}` is the range `n..=m`; three or more values enumerate the
//! accepted counts.  `!` after an unbounded quantifier leaves the loop as
//! soon as what follows can take the symbol; `^` keeps looping instead.
//!
//! Patterns are read as UTF-16 code units.  Characters outside the Basic
//! Multilingual Plane are accepted as literals (a surrogate pair) but not
//! inside classes.

use std::num::ParseIntError;
use std::ops::Range;

use smallvec::SmallVec;
use thiserror::Error;

use crate::ast::{BuildRegex, UNIT_LIMIT, negate_ranges, normalize_ranges};
use crate::capture::Label;
use crate::graph::LoopPolicy;

/// Upper bound on any finite repetition count.
pub const MAX_REPEAT: u32 = 1000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Fold letters through their simple one-to-one case mappings.
    pub case_insensitive: bool,
}

/// A pattern or template that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at offset {offset} in `{input}`")]
pub struct ParseError {
    /// Full text that was being parsed.
    pub input: String,
    /// Byte offset of the offending part.
    pub offset: usize,
    #[source]
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub fn new(input: &str, offset: usize, kind: ParseErrorKind) -> Self {
        Self {
            input: input.to_string(),
            offset,
            kind,
        }
    }

    /// The input from the offending position on.
    pub fn fragment(&self) -> &str {
        self.input.get(self.offset..).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("unclosed group")]
    UnclosedGroup,
    #[error("unopened group")]
    UnopenedGroup,
    #[error("unclosed character class")]
    UnclosedClass,
    #[error("invalid class range {0:?}-{1:?}")]
    InvalidRange(char, char),
    #[error("character {0:?} is outside the 16-bit range")]
    OutOfRange(char),
    #[error("unknown escape \\{0}")]
    UnknownEscape(char),
    #[error("dangling backslash")]
    DanglingEscape,
    #[error("invalid \\u escape")]
    InvalidUnicodeEscape,
    #[error("nothing to repeat")]
    NothingToRepeat,
    #[error("invalid quantifier: {0}")]
    InvalidQuantifier(String),
    #[error("invalid number")]
    Number(#[from] ParseIntError),
    #[error("unclosed group reference")]
    UnclosedReference,
    #[error("invalid group reference")]
    InvalidReference,
}

enum Escape {
    Unit(u32),
    Class(Vec<Range<u32>>),
}

/// Recursive-descent parser producing a [`BuildRegex`].
pub struct Parser<'a> {
    input: &'a str,
    pos: usize,
    options: ParseOptions,
    /// Label of the innermost open group.
    path: Label,
    /// Groups opened so far at each nesting depth.
    children: Vec<u16>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Self::with_options(input, ParseOptions::default())
    }

    pub fn with_options(input: &'a str, options: ParseOptions) -> Self {
        Self {
            input,
            pos: 0,
            options,
            path: SmallVec::new(),
            children: vec![0],
        }
    }

    pub fn parse(mut self) -> Result<BuildRegex, ParseError> {
        let regex = self.parse_alternation()?;
        if self.pos < self.input.len() {
            return Err(self.error(ParseErrorKind::UnopenedGroup));
        }
        Ok(regex)
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.input, self.pos, kind)
    }

    fn error_at(&self, offset: usize, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.input, offset, kind)
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn parse_alternation(&mut self) -> Result<BuildRegex, ParseError> {
        let mut branches = vec![self.parse_sequence()?];
        while self.eat('|') {
            branches.push(self.parse_sequence()?);
        }
        Ok(BuildRegex::select(branches))
    }

    fn parse_sequence(&mut self) -> Result<BuildRegex, ParseError> {
        let mut items = Vec::new();
        while let Some(c) = self.peek() {
            if c == '|' || c == ')' {
                break;
            }
            items.push(self.parse_repeat()?);
        }
        Ok(BuildRegex::sequence(items))
    }

    fn parse_repeat(&mut self) -> Result<BuildRegex, ParseError> {
        let mut regex = self.parse_atom()?;
        loop {
            let start = self.pos;
            regex = match self.peek() {
                Some('?') => {
                    self.bump();
                    BuildRegex::optional(regex)
                }
                Some('*') => {
                    self.bump();
                    let policy = self.parse_policy();
                    BuildRegex::repeat_infinite(regex, 0, policy)
                }
                Some('+') => {
                    self.bump();
                    let policy = self.parse_policy();
                    BuildRegex::repeat_infinite(regex, 1, policy)
                }
                Some('{') => {
                    self.bump();
                    self.parse_counts(regex, start)?
                }
                _ => return Ok(regex),
            };
        }
    }

    fn parse_policy(&mut self) -> LoopPolicy {
        if self.eat('!') {
            LoopPolicy::ExclusiveLimiting
        } else if self.eat('^') {
            LoopPolicy::ExclusiveExtending
        } else {
            LoopPolicy::Plain
        }
    }

    /// Everything after `{` of a counted repetition.
    fn parse_counts(&mut self, body: BuildRegex, start: usize) -> Result<BuildRegex, ParseError> {
        let mut values: Vec<Option<u32>> = Vec::new();
        loop {
            let digits_start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            let digits = &self.input[digits_start..self.pos];
            let value = if digits.is_empty() {
                None
            } else {
                let n: u32 = digits
                    .parse()
                    .map_err(|e: ParseIntError| self.error_at(digits_start, e.into()))?;
                if n > MAX_REPEAT {
                    return Err(self.error_at(
                        digits_start,
                        ParseErrorKind::InvalidQuantifier(format!(
                            "count {n} exceeds {MAX_REPEAT}"
                        )),
                    ));
                }
                Some(n)
            };
            values.push(value);
            match self.bump() {
                Some(',') => continue,
                Some('}') => break,
                _ => {
                    return Err(self.error_at(
                        start,
                        ParseErrorKind::InvalidQuantifier("expected `,` or `}`".to_string()),
                    ));
                }
            }
        }

        let input = self.input;
        let invalid = |reason: &str| {
            Err(ParseError::new(
                input,
                start,
                ParseErrorKind::InvalidQuantifier(reason.to_string()),
            ))
        };
        match values.as_slice() {
            [Some(n)] => Ok(BuildRegex::repeat(body, [*n])),
            [Some(min), None] => {
                let policy = self.parse_policy();
                Ok(BuildRegex::repeat_infinite(body, *min, policy))
            }
            [Some(min), Some(max)] if min <= max => Ok(BuildRegex::repeat(body, *min..=*max)),
            [Some(min), Some(max)] => invalid(&format!("{{{min},{max}}} has min above max")),
            many if many.len() > 2 && many.iter().all(Option::is_some) => {
                Ok(BuildRegex::repeat(body, many.iter().flatten().copied()))
            }
            _ => invalid("missing count"),
        }
    }

    fn parse_atom(&mut self) -> Result<BuildRegex, ParseError> {
        let start = self.pos;
        let Some(c) = self.bump() else {
            return Err(self.error(ParseErrorKind::NothingToRepeat));
        };
        match c {
            '(' => self.parse_group(start),
            '[' => self.parse_class(start),
            '.' => Ok(BuildRegex::any()),
            '\\' => match self.parse_escape()? {
                Escape::Unit(unit) => Ok(self.unit(unit)),
                Escape::Class(ranges) => Ok(BuildRegex::class(ranges)),
            },
            '?' | '*' | '+' | '{' => Err(self.error_at(start, ParseErrorKind::NothingToRepeat)),
            c => Ok(self.literal(c)),
        }
    }

    fn parse_group(&mut self, start: usize) -> Result<BuildRegex, ParseError> {
        let depth = self.path.len();
        let index = self.children[depth];
        self.children[depth] += 1;
        self.path.push(index);
        self.children.push(0);

        let body = self.parse_alternation()?;
        if !self.eat(')') {
            return Err(self.error_at(start, ParseErrorKind::UnclosedGroup));
        }

        let label = self.path.clone();
        self.path.pop();
        self.children.pop();
        Ok(BuildRegex::capture(label, body))
    }

    fn parse_class(&mut self, start: usize) -> Result<BuildRegex, ParseError> {
        let negated = self.eat('^');
        let mut ranges: Vec<Range<u32>> = Vec::new();
        loop {
            let item_start = self.pos;
            let first = match self.bump() {
                None => return Err(self.error_at(start, ParseErrorKind::UnclosedClass)),
                Some(']') => break,
                Some('\\') => self.parse_escape()?,
                Some(c) => Escape::Unit(self.class_unit(c, item_start)?),
            };
            let lo = match first {
                Escape::Class(class) => {
                    ranges.extend(class);
                    continue;
                }
                Escape::Unit(lo) => lo,
            };

            let rest = &self.input[self.pos..];
            if rest.starts_with('-') && !rest.starts_with("-]") && rest.len() > 1 {
                self.pos += 1;
                let hi_start = self.pos;
                let hi = match self.bump() {
                    None => return Err(self.error_at(start, ParseErrorKind::UnclosedClass)),
                    Some('\\') => match self.parse_escape()? {
                        Escape::Unit(hi) => hi,
                        Escape::Class(_) => {
                            return Err(self.error_at(
                                item_start,
                                ParseErrorKind::InvalidRange(to_char(lo), '\\'),
                            ));
                        }
                    },
                    Some(c) => self.class_unit(c, hi_start)?,
                };
                if hi < lo {
                    return Err(self.error_at(
                        item_start,
                        ParseErrorKind::InvalidRange(to_char(lo), to_char(hi)),
                    ));
                }
                ranges.push(lo..hi + 1);
            } else {
                ranges.push(lo..lo + 1);
            }
        }

        let mut ranges = normalize_ranges(ranges);
        if self.options.case_insensitive {
            ranges = fold_ranges(&ranges);
        }
        if negated {
            ranges = negate_ranges(&ranges, UNIT_LIMIT);
        }
        Ok(BuildRegex::Class(ranges))
    }

    fn class_unit(&self, c: char, offset: usize) -> Result<u32, ParseError> {
        let ordinal = c as u32;
        if ordinal >= UNIT_LIMIT {
            return Err(self.error_at(offset, ParseErrorKind::OutOfRange(c)));
        }
        Ok(ordinal)
    }

    /// Everything after a backslash.
    fn parse_escape(&mut self) -> Result<Escape, ParseError> {
        let start = self.pos - 1;
        let Some(c) = self.bump() else {
            return Err(self.error_at(start, ParseErrorKind::DanglingEscape));
        };
        let unit = match c {
            'n' => 0x0a,
            't' => 0x09,
            'r' => 0x0d,
            'f' => 0x0c,
            'v' => 0x0b,
            '0' => 0x00,
            'u' => {
                let hex = self.input.get(self.pos..self.pos + 4);
                let unit = hex
                    .filter(|h| h.chars().all(|c| c.is_ascii_hexdigit()))
                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                    .ok_or_else(|| self.error_at(start, ParseErrorKind::InvalidUnicodeEscape))?;
                self.pos += 4;
                unit
            }
            'd' => return Ok(Escape::Class(digit_ranges())),
            'D' => return Ok(Escape::Class(negate_ranges(&digit_ranges(), UNIT_LIMIT))),
            'w' => return Ok(Escape::Class(word_ranges())),
            'W' => return Ok(Escape::Class(negate_ranges(&word_ranges(), UNIT_LIMIT))),
            's' => return Ok(Escape::Class(space_ranges())),
            'S' => return Ok(Escape::Class(negate_ranges(&space_ranges(), UNIT_LIMIT))),
            '\\' | '.' | '[' | ']' | '(' | ')' | '{' | '}' | '|' | '?' | '*' | '+' | '!' | '^'
            | '$' | '-' | '/' => c as u32,
            other => return Err(self.error_at(start, ParseErrorKind::UnknownEscape(other))),
        };
        Ok(Escape::Unit(unit))
    }

    fn unit(&self, unit: u32) -> BuildRegex {
        if self.options.case_insensitive {
            BuildRegex::Class(fold_ranges(&[unit..unit + 1]))
        } else {
            BuildRegex::symbol(unit)
        }
    }

    fn literal(&self, c: char) -> BuildRegex {
        let mut buf = [0u16; 2];
        match c.encode_utf16(&mut buf) {
            [unit] => self.unit(u32::from(*unit)),
            units => BuildRegex::Sequence(
                units
                    .iter()
                    .map(|&unit| BuildRegex::symbol(u32::from(unit)))
                    .collect(),
            ),
        }
    }
}

fn to_char(unit: u32) -> char {
    char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn digit_ranges() -> Vec<Range<u32>> {
    vec!['0' as u32..'9' as u32 + 1]
}

fn word_ranges() -> Vec<Range<u32>> {
    vec![
        '0' as u32..'9' as u32 + 1,
        'A' as u32..'Z' as u32 + 1,
        '_' as u32..'_' as u32 + 1,
        'a' as u32..'z' as u32 + 1,
    ]
}

fn space_ranges() -> Vec<Range<u32>> {
    vec![0x09..0x0e, 0x20..0x21]
}

/// Single-character case partner of `c` through `mapping`, if there is one.
fn simple_case(mut mapping: impl ExactSizeIterator<Item = char>) -> Option<char> {
    if mapping.len() == 1 { mapping.next() } else { None }
}

/// Add the simple case partners of every unit in `ranges`.
pub fn fold_ranges(ranges: &[Range<u32>]) -> Vec<Range<u32>> {
    let mut folded: Vec<Range<u32>> = ranges.to_vec();
    for range in ranges {
        if range.start == 0 && range.end >= UNIT_LIMIT {
            continue;
        }
        for unit in range.clone() {
            let Some(c) = char::from_u32(unit) else {
                continue;
            };
            let partners = [simple_case(c.to_lowercase()), simple_case(c.to_uppercase())];
            for partner in partners.into_iter().flatten() {
                let ordinal = partner as u32;
                if partner != c && ordinal < UNIT_LIMIT {
                    folded.push(ordinal..ordinal + 1);
                }
            }
        }
    }
    normalize_ranges(folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn parse(pattern: &str) -> BuildRegex {
        Parser::new(pattern).parse().expect("pattern should parse")
    }

    fn parse_err(pattern: &str) -> ParseError {
        Parser::new(pattern).parse().expect_err("pattern should fail")
    }

    fn ch(c: char) -> BuildRegex {
        BuildRegex::symbol(c as u32)
    }

    #[test]
    fn test_parse_sequence_and_alternation() {
        assert_eq!(
            parse("ab|c"),
            BuildRegex::Select(vec![BuildRegex::Sequence(vec![ch('a'), ch('b')]), ch('c')])
        );
        assert_eq!(parse(""), BuildRegex::empty());
        assert_eq!(
            parse("a|"),
            BuildRegex::Select(vec![ch('a'), BuildRegex::empty()])
        );
    }

    #[test]
    fn test_parse_quantifiers() {
        assert_eq!(parse("a?"), BuildRegex::optional(ch('a')));
        assert_eq!(parse("a*"), BuildRegex::star(ch('a')));
        assert_eq!(parse("a+"), BuildRegex::plus(ch('a')));
        assert_eq!(
            parse("a*!"),
            BuildRegex::repeat_infinite(ch('a'), 0, LoopPolicy::ExclusiveLimiting)
        );
        assert_eq!(
            parse("a+^"),
            BuildRegex::repeat_infinite(ch('a'), 1, LoopPolicy::ExclusiveExtending)
        );
        assert_eq!(parse("a{3}"), BuildRegex::repeat(ch('a'), [3]));
        assert_eq!(parse("a{2,4}"), BuildRegex::repeat(ch('a'), [2, 3, 4]));
        assert_eq!(
            parse("a{2,}"),
            BuildRegex::repeat_infinite(ch('a'), 2, LoopPolicy::Plain)
        );
        assert_eq!(parse("a{1,3,7}"), BuildRegex::repeat(ch('a'), [1, 3, 7]));
        assert_eq!(parse("a{7,1,3}"), BuildRegex::repeat(ch('a'), [1, 3, 7]));
    }

    #[test]
    fn test_parse_groups_get_nested_labels() {
        let regex = parse("(a(b))(c)");
        let labels: Vec<Vec<u16>> = regex.labels().iter().map(|l| l.to_vec()).collect();
        assert_eq!(labels, vec![vec![0], vec![0, 0], vec![1]]);
    }

    #[test]
    fn test_parse_classes() {
        assert_eq!(
            parse("[a-cx]"),
            BuildRegex::Class(vec!['a' as u32..'d' as u32, 'x' as u32..'y' as u32])
        );
        assert_eq!(
            parse("[^b]"),
            BuildRegex::Class(vec![0..'b' as u32, 'c' as u32..UNIT_LIMIT])
        );
        assert_eq!(
            parse("[a-]"),
            BuildRegex::Class(vec!['-' as u32..'.' as u32, 'a' as u32..'b' as u32])
        );
        assert_eq!(parse("[\\d]"), BuildRegex::Class(digit_ranges()));
        assert_eq!(parse("[\\]]"), ch(']'));
    }

    #[test]
    fn test_parse_escapes() {
        assert_eq!(parse("\\n"), ch('\n'));
        assert_eq!(parse("\\u00e9"), ch('é'));
        assert_eq!(parse("\\*"), ch('*'));
        assert_eq!(parse("\\s"), BuildRegex::Class(vec![0x09..0x0e, 0x20..0x21]));
        assert_eq!(parse("."), BuildRegex::any());
    }

    #[test]
    fn test_parse_case_insensitive() {
        let options = ParseOptions {
            case_insensitive: true,
        };
        let regex = Parser::with_options("[a-cA-C]", options).parse().expect("parse");
        assert_eq!(
            regex,
            BuildRegex::Class(vec!['A' as u32..'D' as u32, 'a' as u32..'d' as u32])
        );
        let regex = Parser::with_options("k", options).parse().expect("parse");
        // partners come from the pattern's letters only; U+212A is not added
        assert_eq!(
            regex,
            BuildRegex::Class(vec!['K' as u32..'L' as u32, 'k' as u32..'l' as u32])
        );
        let regex = Parser::with_options("[^a]", options).parse().expect("parse");
        assert_eq!(
            regex,
            BuildRegex::Class(vec![
                0..'A' as u32,
                'B' as u32..'a' as u32,
                'b' as u32..UNIT_LIMIT
            ])
        );
    }

    #[test]
    fn test_parse_astral_literal() {
        assert_eq!(parse("😀"), BuildRegex::Sequence(vec![
            BuildRegex::symbol(0xd83d),
            BuildRegex::symbol(0xde00),
        ]));
        assert_eq!(parse_err("[😀]").kind, ParseErrorKind::OutOfRange('😀'));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_err("(a").kind, ParseErrorKind::UnclosedGroup);
        assert_eq!(parse_err("a)").kind, ParseErrorKind::UnopenedGroup);
        assert_eq!(parse_err("a)").offset, 1);
        assert_eq!(parse_err("[ab").kind, ParseErrorKind::UnclosedClass);
        assert_eq!(parse_err("[z-a]").kind, ParseErrorKind::InvalidRange('z', 'a'));
        assert_eq!(parse_err("\\q").kind, ParseErrorKind::UnknownEscape('q'));
        assert_eq!(parse_err("a\\").kind, ParseErrorKind::DanglingEscape);
        assert_eq!(parse_err("\\u12").kind, ParseErrorKind::InvalidUnicodeEscape);
        assert_eq!(parse_err("*a").kind, ParseErrorKind::NothingToRepeat);
        assert_eq!(parse_err("a|?").kind, ParseErrorKind::NothingToRepeat);
        assert!(matches!(
            parse_err("a{3,2}").kind,
            ParseErrorKind::InvalidQuantifier(_)
        ));
        assert!(matches!(
            parse_err("a{2").kind,
            ParseErrorKind::InvalidQuantifier(_)
        ));
        assert!(matches!(
            parse_err("a{1,,3}").kind,
            ParseErrorKind::InvalidQuantifier(_)
        ));
        assert!(matches!(
            parse_err("a{5000}").kind,
            ParseErrorKind::InvalidQuantifier(_)
        ));
    }

    #[test]
    fn test_parse_error_reports_fragment() {
        let err = parse_err("ab[cd");
        assert_eq!(err.offset, 2);
        assert_eq!(err.fragment(), "[cd");
        assert_eq!(err.to_string(), "unclosed character class at offset 2 in `ab[cd`");
    }

    #[test]
    fn test_capture_labels_are_smallvec() {
        let regex = parse("(x)");
        let expected: Label = smallvec![0];
        assert_eq!(regex, BuildRegex::capture(expected, ch('x')));
    }
}
