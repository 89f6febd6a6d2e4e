//! Replacement templates.
//!
//! A template is literal text with group references: `[n]` inserts the
//! last occurrence of group `n` (`[0]` is the whole match) and a backslash
//! takes the next character literally.

use crate::capture::Captured;
use crate::parser::{ParseError, ParseErrorKind};
use crate::scheme::CharScheme;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Piece {
    Literal(String),
    Group(usize),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Template {
    pieces: Vec<Piece>,
}

impl Template {
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut chars = text.char_indices();

        while let Some((offset, c)) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some((_, escaped)) => literal.push(escaped),
                    None => {
                        return Err(ParseError::new(text, offset, ParseErrorKind::DanglingEscape));
                    }
                },
                '[' => {
                    let rest = &text[offset + 1..];
                    let Some(close) = rest.find(']') else {
                        return Err(ParseError::new(text, offset, ParseErrorKind::UnclosedReference));
                    };
                    let digits = &rest[..close];
                    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                        return Err(ParseError::new(text, offset, ParseErrorKind::InvalidReference));
                    }
                    let group = digits
                        .parse()
                        .map_err(|e| ParseError::new(text, offset, ParseErrorKind::Number(e)))?;
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(Piece::Group(group));
                    // skip the digits and the closing bracket
                    for _ in 0..=close {
                        chars.next();
                    }
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }
        Ok(Self { pieces })
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    /// Highest group referenced.
    pub fn max_group(&self) -> usize {
        self.pieces
            .iter()
            .filter_map(|piece| match piece {
                Piece::Group(n) => Some(*n),
                Piece::Literal(_) => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Append the expansion for one match to `out`.  Groups that did not
    /// participate expand to nothing.
    pub fn expand(&self, input: &[u16], captured: &Captured, out: &mut String) {
        for piece in &self.pieces {
            match piece {
                Piece::Literal(text) => out.push_str(text),
                Piece::Group(n) => {
                    if let Some(range) = captured.last(*n)
                        && let Some(units) = input.get(range)
                    {
                        out.push_str(&CharScheme::decode(units));
                    }
                }
            }
        }
    }
}
