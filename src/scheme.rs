//! Alphabet schemes.
//!
//! A [`Scheme`] fixes the input symbol type of an automaton and the size of
//! its alphabet.  Transitions are keyed by *ordinals*: every symbol maps to
//! a `u32` below [`Scheme::LIMIT`], and node maps bind half-open ordinal
//! ranges (groups) to successors.

use std::fmt;

use crate::node::{NodeMap, NodeMapBuilder};

pub trait Scheme: Copy + Clone + fmt::Debug + Default + Send + Sync + 'static {
    /// One unit of input.
    type Symbol: Copy + fmt::Debug + Send + Sync;

    /// Exclusive upper bound of the ordinals.  Class ranges are clipped to it.
    const LIMIT: u32;

    const NAME: &'static str;

    fn ordinal(symbol: Self::Symbol) -> u32;

    /// Human-readable label for the ordinal group `lo..hi`.
    fn describe(lo: u32, hi: u32) -> String;

    /// Fresh builder for a node map over this alphabet.
    fn builder() -> NodeMapBuilder {
        NodeMapBuilder::default()
    }

    /// Combine maps whose groups never overlap.
    fn merge(maps: &[&NodeMap]) -> NodeMap {
        NodeMap::merge(maps)
    }
}

/// UTF-16 code units, the alphabet of text patterns.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CharScheme;

impl CharScheme {
    pub fn encode(text: &str) -> Vec<u16> {
        text.encode_utf16().collect()
    }

    pub fn decode(units: &[u16]) -> String {
        String::from_utf16_lossy(units)
    }
}

impl Scheme for CharScheme {
    type Symbol = u16;

    const LIMIT: u32 = 0x1_0000;

    const NAME: &'static str = "char";

    #[inline]
    fn ordinal(symbol: u16) -> u32 {
        u32::from(symbol)
    }

    fn describe(lo: u32, hi: u32) -> String {
        describe_group(lo, hi, Self::LIMIT, |unit| match char::from_u32(unit) {
            Some(c) if c.is_ascii_graphic() => c.to_string(),
            Some(c) if !c.is_control() && !c.is_whitespace() && unit > 0x7f => c.to_string(),
            _ => format!("\\u{unit:04X}"),
        })
    }
}

/// Raw bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ByteScheme;

impl Scheme for ByteScheme {
    type Symbol = u8;

    const LIMIT: u32 = 0x100;

    const NAME: &'static str = "byte";

    #[inline]
    fn ordinal(symbol: u8) -> u32 {
        u32::from(symbol)
    }

    fn describe(lo: u32, hi: u32) -> String {
        describe_group(lo, hi, Self::LIMIT, |byte| match u8::try_from(byte) {
            Ok(b) if b.is_ascii_graphic() => (b as char).to_string(),
            _ => format!("\\x{byte:02X}"),
        })
    }
}

fn describe_group(lo: u32, hi: u32, limit: u32, one: impl Fn(u32) -> String) -> String {
    if lo == 0 && hi >= limit {
        ".".to_string()
    } else if hi == lo + 1 {
        one(lo)
    } else {
        format!("{}-{}", one(lo), one(hi - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_scheme_encode_decode() {
        let units = CharScheme::encode("aé😀");
        assert_eq!(units.len(), 4);
        assert_eq!(CharScheme::ordinal(units[0]), 'a' as u32);
        assert_eq!(CharScheme::decode(&units), "aé😀");
    }

    #[test]
    fn test_describe_groups() {
        assert_eq!(CharScheme::describe('a' as u32, 'b' as u32), "a");
        assert_eq!(CharScheme::describe('a' as u32, 'z' as u32 + 1), "a-z");
        assert_eq!(CharScheme::describe(0, CharScheme::LIMIT), ".");
        assert_eq!(CharScheme::describe(10, 11), "\\u000A");
        assert_eq!(ByteScheme::describe(0, 0x100), ".");
        assert_eq!(ByteScheme::describe(0xff, 0x100), "\\xFF");
    }
}
