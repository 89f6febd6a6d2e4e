//! Standard regex syntax through `regex-syntax`.
//!
//! The high-level IR is translated node by node.  Assertions have no
//! counterpart and are rejected.  Unicode classes are cut down to the
//! Basic Multilingual Plane since patterns run over UTF-16 code units;
//! literals outside it become surrogate pairs like any other text.

use log::debug;
use regex_syntax::ParserBuilder;
use regex_syntax::hir::{Class, Hir, HirKind};
use smallvec::SmallVec;

use crate::Error;
use crate::ast::{BuildRegex, UNIT_LIMIT};
use crate::capture::Label;
use crate::graph::LoopPolicy;
use crate::parser::{MAX_REPEAT, ParseOptions};

/// Parse `pattern` in the syntax of the `regex` crate.
pub fn parse_std(pattern: &str) -> Result<BuildRegex, Error> {
    parse_std_with(pattern, ParseOptions::default())
}

/// Like [`parse_std`], with `options` setting the parser's initial flags.
/// Inline flags such as `(?-i)` still override them.
pub fn parse_std_with(pattern: &str, options: ParseOptions) -> Result<BuildRegex, Error> {
    let hir = ParserBuilder::new()
        .case_insensitive(options.case_insensitive)
        .build()
        .parse(pattern)?;
    from_hir(&hir)
}

/// Translate an already parsed `Hir`.
pub fn from_hir(hir: &Hir) -> Result<BuildRegex, Error> {
    Translator::default().translate(hir)
}

struct Translator {
    path: Label,
    children: Vec<u16>,
}

impl Default for Translator {
    fn default() -> Self {
        Self {
            path: SmallVec::new(),
            children: vec![0],
        }
    }
}

impl Translator {
    fn translate(&mut self, hir: &Hir) -> Result<BuildRegex, Error> {
        Ok(match hir.kind() {
            HirKind::Empty => BuildRegex::empty(),
            HirKind::Literal(literal) => match std::str::from_utf8(&literal.0) {
                Ok(text) => BuildRegex::literal(text),
                Err(_) => BuildRegex::sequence(
                    literal
                        .0
                        .iter()
                        .map(|&b| BuildRegex::symbol(u32::from(b)))
                        .collect(),
                ),
            },
            HirKind::Class(Class::Unicode(class)) => {
                let mut ranges = Vec::with_capacity(class.ranges().len());
                for range in class.ranges() {
                    let (lo, hi) = (u32::from(range.start()), u32::from(range.end()));
                    if lo >= UNIT_LIMIT {
                        debug!("dropping class range {lo:#x}-{hi:#x} outside the BMP");
                        continue;
                    }
                    ranges.push(lo..(hi + 1).min(UNIT_LIMIT));
                }
                if ranges.is_empty() && !class.ranges().is_empty() {
                    return Err(Error::UnsupportedClass(format!("{class:?}")));
                }
                BuildRegex::class(ranges)
            }
            HirKind::Class(Class::Bytes(class)) => BuildRegex::class(
                class
                    .ranges()
                    .iter()
                    .map(|r| u32::from(r.start())..u32::from(r.end()) + 1),
            ),
            HirKind::Look(look) => return Err(Error::UnsupportedLook(format!("{look:?}"))),
            HirKind::Repetition(rep) => {
                let body = self.translate(&rep.sub)?;
                match rep.max {
                    None => BuildRegex::repeat_infinite(body, rep.min, LoopPolicy::Plain),
                    Some(max) if max > MAX_REPEAT => {
                        return Err(Error::UnsupportedRepetition(format!(
                            "{{{},{max}}} exceeds {MAX_REPEAT}",
                            rep.min
                        )));
                    }
                    Some(max) => BuildRegex::repeat(body, rep.min..=max),
                }
            }
            HirKind::Capture(capture) => {
                let depth = self.path.len();
                let index = self.children[depth];
                self.children[depth] += 1;
                self.path.push(index);
                self.children.push(0);
                let body = self.translate(&capture.sub);
                let label = self.path.clone();
                self.path.pop();
                self.children.pop();
                BuildRegex::capture(label, body?)
            }
            HirKind::Concat(items) => BuildRegex::sequence(
                items
                    .iter()
                    .map(|item| self.translate(item))
                    .collect::<Result<_, _>>()?,
            ),
            HirKind::Alternation(branches) => BuildRegex::select(
                branches
                    .iter()
                    .map(|branch| self.translate(branch))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scheme::CharScheme;

    fn accepts(regex: &BuildRegex, text: &str) -> bool {
        regex
            .compile::<CharScheme>()
            .expect("compile")
            .is_match(&CharScheme::encode(text))
    }

    #[test]
    fn test_same_language_as_own_syntax() {
        let texts = ["", "a", "ad", "abd", "abcbd", "abxd", "dd"];
        for pattern in ["a(b|c)*d", "a[bc]?d", "(ab){2,3}"] {
            let std = parse_std(pattern).expect("std");
            let own = Parser::new(pattern).parse().expect("own");
            for text in texts {
                assert_eq!(accepts(&std, text), accepts(&own, text), "{pattern} on {text:?}");
            }
        }
    }

    #[test]
    fn test_capture_labels_follow_nesting() {
        let regex = parse_std("(a(b))(c)").expect("parse");
        let labels: Vec<Vec<u16>> = regex.labels().iter().map(|l| l.to_vec()).collect();
        assert_eq!(labels, vec![vec![0], vec![0, 0], vec![1]]);
    }

    #[test]
    fn test_unicode_classes_are_clipped() {
        let word = parse_std(r"\w+").expect("parse");
        assert!(accepts(&word, "abc_9"));
        assert!(accepts(&word, "é"));
        assert!(!accepts(&word, "a b"));

        let dot = parse_std(".").expect("parse");
        assert!(accepts(&dot, "\u{ffff}"));
        assert!(!accepts(&dot, "\n"));

        let err = parse_std(r"[\u{10000}-\u{10FFFF}]").expect_err("astral only");
        assert!(matches!(err, Error::UnsupportedClass(_)));
    }

    #[test]
    fn test_case_insensitive_flag() {
        let regex = parse_std("(?i)ab").expect("parse");
        for text in ["ab", "AB", "aB"] {
            assert!(accepts(&regex, text), "{text}");
        }
    }

    #[test]
    fn test_case_insensitive_option() {
        let options = ParseOptions {
            case_insensitive: true,
        };
        let regex = parse_std_with("ab[c-d]", options).expect("parse");
        for text in ["abc", "ABD", "aBc"] {
            assert!(accepts(&regex, text), "{text}");
        }
        assert!(!accepts(&parse_std("ab").expect("parse"), "AB"));

        let regex = parse_std_with("a(?-i)b", options).expect("parse");
        assert!(accepts(&regex, "Ab"));
        assert!(!accepts(&regex, "AB"));
    }

    #[test]
    fn test_rejected_constructs() {
        assert!(matches!(parse_std(r"\bfoo"), Err(Error::UnsupportedLook(_))));
        assert!(matches!(parse_std("^a"), Err(Error::UnsupportedLook(_))));
        assert!(matches!(parse_std("a{2,1001}"), Err(Error::UnsupportedRepetition(_))));
        assert!(matches!(parse_std("a("), Err(Error::Syntax(_))));
    }

    #[test]
    fn test_repetitions() {
        let regex = parse_std("a{2,}").expect("parse");
        assert!(!accepts(&regex, "a"));
        assert!(accepts(&regex, "aaaa"));
        let regex = parse_std("a{1,2}?").expect("parse");
        assert!(accepts(&regex, "aa"));
        assert!(!accepts(&regex, "aaa"));
    }
}
