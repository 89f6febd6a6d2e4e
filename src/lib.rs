//! Regular-expression automata that can be merged.
//!
//! Patterns compile to deterministic automata over an interval alphabet.
//! Two automata can be combined in two ways:
//!
//! * as **alternate paths** of one pattern, where the result accepts what
//!   either side accepts and pattern ids are shared;
//! * as **alternate patterns**, where the right side's pattern ids and
//!   capture slots are shifted past the left side's so that a single scan
//!   tells which pattern matched and with which groups.
//!
//! Merged automata are themselves mergeable, so a large pattern set can be
//! folded one pattern at a time.
//!
//! # Architecture
//!
//! The pipeline is:
//!
//! ```text
//! pattern ──Parser / parse_std──>  BuildRegex  ──to_node_graph──>  Graph  ──freeze──>  Automaton
//!                                                                                        │
//!                                               Matcher <──MatcherBuilder── merge_alternate_pattern
//! ```
//!
//! ## Intervals
//!
//! A [`Node`] maps sorted, disjoint ordinal ranges to [`Binding`]s.  Every
//! binding carries the successor node, the set of pattern ids still alive
//! on that edge (*routes*) and the capture boundaries crossed on it.  A
//! [`Scheme`] decides what a symbol is: [`CharScheme`] reads UTF-16 code
//! units, [`ByteScheme`] reads bytes.
//!
//! ## Interning
//!
//! Id sets and capture annotations are interned process-wide, so clones
//! are pointer copies and equality is pointer equality.  Nodes whose
//! bindings agree compare equal cheaply, which keeps subset construction
//! and pair products small.
//!
//! ## Lazy subset construction
//!
//! The [`Graph`] is an arena of slots, most of which are *recipes* rather
//! than nodes: the union of a set of nodes, a node with extra capture
//! boundaries on its first edges, a node preferring one operand over
//! another on shared symbols, or a loop marker.  Recipes are memoized by
//! their operands and only resolved into real nodes when
//! [`Graph::freeze`] walks what is reachable from the start.
//!
//! ## Loops
//!
//! A loop body is compiled against a marker that stands for the loop
//! entry.  Once the body is known the marker is removed from the body's
//! top level and the entry is built as the body merged with the tail.
//! [`LoopPolicy`] decides what happens on symbols both can take: the
//! plain policy keeps both, the exclusive ones let one side win.  The
//! marker is then pointed at the entry.
//!
//! ## Pattern merging
//!
//! Pattern merging walks the product of both automata, memoizing pairs
//! of states.  A pair where one side has died copies the other side
//! wholesale.  A bound on the product depth keeps pathological pattern
//! pairs from exploding; a merge that needs to go past it fails rather
//! than silently losing a pattern.  Inputs accepted by both sides are
//! rejected unless overlap is explicitly allowed.
//!
//! ## Captures
//!
//! Groups are identified by their path through the enclosing groups and
//! compiled into edge annotations (open, close before, close after).
//! During a scan a [`Capturing`] buffer records every occurrence of every
//! slot, so groups inside loops report all their iterations.
//!
//! Annotations are exact as long as alternatives sharing a symbol agree
//! on it.  When they do not, the automaton is flagged and the matcher
//! replays the matched span through a small Thompson program of the
//! pattern, whose threads run in priority order and carry their own
//! group positions.

mod ast;
mod automaton;
mod capture;
mod graph;
mod hir;
mod ids;
mod matcher;
mod node;
mod parser;
mod scheme;
mod template;
mod thompson;

use thiserror::Error;

pub use ast::{BuildRegex, UNIT_LIMIT, negate_ranges, normalize_ranges};
pub use automaton::{Automaton, DEFAULT_MAX_DEPTH, MergeOptions};
pub use capture::{Capture, Captured, Capturing, Label};
pub use graph::{Graph, LoopPolicy};
pub use hir::{from_hir, parse_std, parse_std_with};
pub use ids::{Boundary, IdCapture, IdSet, Interner};
pub use matcher::{Constructor, FindAction, Found, Matcher, MatcherBuilder, Regex};
pub use node::{Binding, Node, NodeIdx, NodeMap, NodeMapBuilder};
pub use parser::{MAX_REPEAT, ParseError, ParseErrorKind, ParseOptions, Parser};
pub use scheme::{ByteScheme, CharScheme, Scheme};
pub use template::{Piece, Template};

/// Re-export so users do not need a direct `regex-syntax` dependency.
pub use regex_syntax::hir::Hir;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Syntax(#[from] regex_syntax::Error),
    /// A class with no code point inside the Basic Multilingual Plane.
    #[error("unsupported character class: {0}")]
    UnsupportedClass(String),
    /// Assertions (`^`, `$`, `\b`, ...) have no automaton counterpart.
    #[error("unsupported look-around assertion: {0}")]
    UnsupportedLook(String),
    #[error("unsupported repetition: {0}")]
    UnsupportedRepetition(String),
    #[error("duplicate capture group label {0:?}")]
    DuplicateCapture(Vec<u16>),
    /// Pattern merge with overlap disallowed found an input accepted by
    /// both sides; the ids are those accepting in the offending state.
    #[error("patterns {left:?} and {right:?} accept the same input")]
    OverlappingAccept { left: Vec<u32>, right: Vec<u32> },
    /// Pattern merge needed overlapping transitions deeper than the
    /// configured bound.
    #[error("pattern merge exceeded the depth bound {0}")]
    MergeDepthExceeded(usize),
    #[error("no constructor for pattern {0}")]
    MissingConstructor(usize),
    #[error("no patterns to build")]
    NoPatterns,
}
