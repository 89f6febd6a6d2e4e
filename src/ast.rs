//! Regex syntax tree and its compilation into a [`Graph`].
//!
//! Compilation runs right to left: every construct is compiled *against
//! its tail*, the node that follows it.  `ab` is `a` leading to (`b`
//! leading to tail), alternation merges the branches compiled against the
//! same tail, and a loop body is compiled against a marker that is later
//! pointed at the loop entry.
//!
//! Capture groups are compiled into edge annotations.  The first edges of
//! a group open an occurrence of its slot; every edge that may be the last
//! one consumed inside the group closes it *after* its symbol, which is
//! why the end annotations travel inwards alongside the tail.  A group
//! whose body can match nothing additionally closes on the first edge of
//! its tail, *before* that edge's symbol.

use std::ops::Range;

use smallvec::SmallVec;

use crate::Error;
use crate::automaton::Automaton;
use crate::capture::{Capture, Label};
use crate::graph::{Graph, LoopPolicy};
use crate::ids::IdCapture;
use crate::node::NodeIdx;
use crate::scheme::{CharScheme, Scheme};

/// Ordinal bound of classes built from text patterns.
pub const UNIT_LIMIT: u32 = CharScheme::LIMIT;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildRegex {
    /// One symbol out of sorted, disjoint ordinal ranges.
    Class(Vec<Range<u32>>),
    Sequence(Vec<BuildRegex>),
    Select(Vec<BuildRegex>),
    /// The body repeated exactly `n` times for some `n` in the sorted,
    /// non-empty count set.
    Repeat {
        body: Box<BuildRegex>,
        counts: Vec<u32>,
    },
    /// At least `min` repetitions.
    RepeatInfinite {
        body: Box<BuildRegex>,
        min: u32,
        policy: LoopPolicy,
    },
    Optional(Box<BuildRegex>),
    Capture {
        label: Label,
        body: Box<BuildRegex>,
    },
}

impl BuildRegex {
    /// Class from arbitrary ranges; they are sorted and merged.
    pub fn class(ranges: impl IntoIterator<Item = Range<u32>>) -> Self {
        BuildRegex::Class(normalize_ranges(ranges.into_iter().collect()))
    }

    pub fn symbol(ordinal: u32) -> Self {
        BuildRegex::Class(vec![ordinal..ordinal + 1])
    }

    /// Any code unit.
    pub fn any() -> Self {
        BuildRegex::Class(vec![0..UNIT_LIMIT])
    }

    /// The empty sequence, matching only the empty input.
    pub fn empty() -> Self {
        BuildRegex::Sequence(Vec::new())
    }

    /// The UTF-16 code units of `text`, in order.
    pub fn literal(text: &str) -> Self {
        let items: Vec<BuildRegex> = text
            .encode_utf16()
            .map(|unit| Self::symbol(u32::from(unit)))
            .collect();
        Self::sequence(items)
    }

    pub fn sequence(items: Vec<BuildRegex>) -> Self {
        if items.len() == 1 {
            items.into_iter().next().unwrap_or_else(Self::empty)
        } else {
            BuildRegex::Sequence(items)
        }
    }

    pub fn select(branches: Vec<BuildRegex>) -> Self {
        if branches.len() == 1 {
            branches.into_iter().next().unwrap_or_else(Self::empty)
        } else {
            BuildRegex::Select(branches)
        }
    }

    /// Repeat for every count in `counts`; an empty set means zero times.
    pub fn repeat(body: BuildRegex, counts: impl IntoIterator<Item = u32>) -> Self {
        let mut counts: Vec<u32> = counts.into_iter().collect();
        counts.sort_unstable();
        counts.dedup();
        if counts.is_empty() {
            counts.push(0);
        }
        BuildRegex::Repeat {
            body: Box::new(body),
            counts,
        }
    }

    pub fn repeat_infinite(body: BuildRegex, min: u32, policy: LoopPolicy) -> Self {
        BuildRegex::RepeatInfinite {
            body: Box::new(body),
            min,
            policy,
        }
    }

    pub fn star(body: BuildRegex) -> Self {
        Self::repeat_infinite(body, 0, LoopPolicy::Plain)
    }

    pub fn plus(body: BuildRegex) -> Self {
        Self::repeat_infinite(body, 1, LoopPolicy::Plain)
    }

    pub fn optional(body: BuildRegex) -> Self {
        BuildRegex::Optional(Box::new(body))
    }

    pub fn capture(label: Label, body: BuildRegex) -> Self {
        BuildRegex::Capture {
            label,
            body: Box::new(body),
        }
    }

    /// Whether the empty input is in the language.
    pub fn nullable(&self) -> bool {
        match self {
            BuildRegex::Class(_) => false,
            BuildRegex::Sequence(items) => items.iter().all(BuildRegex::nullable),
            BuildRegex::Select(branches) => branches.iter().any(BuildRegex::nullable),
            BuildRegex::Repeat { body, counts } => counts.first() == Some(&0) || body.nullable(),
            BuildRegex::RepeatInfinite { body, min, .. } => *min == 0 || body.nullable(),
            BuildRegex::Optional(_) => true,
            BuildRegex::Capture { body, .. } => body.nullable(),
        }
    }

    /// Group labels in declaration (pre-order) order.
    pub fn labels(&self) -> Vec<Label> {
        let mut out = Vec::new();
        self.collect_labels(&mut out);
        out
    }

    fn collect_labels(&self, out: &mut Vec<Label>) {
        match self {
            BuildRegex::Class(_) => {}
            BuildRegex::Sequence(items) | BuildRegex::Select(items) => {
                for item in items {
                    item.collect_labels(out);
                }
            }
            BuildRegex::Repeat { body, .. }
            | BuildRegex::RepeatInfinite { body, .. }
            | BuildRegex::Optional(body) => body.collect_labels(out),
            BuildRegex::Capture { label, body } => {
                out.push(label.clone());
                body.collect_labels(out);
            }
        }
    }

    /// Capture layout of this pattern.
    pub fn capture_layout(&self) -> Result<Capture, Error> {
        Capture::new(self.labels())
    }

    /// Compile into `graph`, in front of `tail`.
    ///
    /// `end` holds the capture boundaries owed to the last symbol this
    /// construct consumes: the closing annotations of the groups it ends.
    pub fn to_node_graph<S: Scheme>(
        &self,
        graph: &mut Graph<S>,
        layout: &Capture,
        tail: NodeIdx,
        end: &IdCapture,
    ) -> NodeIdx {
        match self {
            BuildRegex::Class(ranges) => graph.edge(ranges, tail, end.clone()),
            BuildRegex::Sequence(items) => {
                let mut next = tail;
                let mut owed = end.clone();
                for item in items.iter().rev() {
                    next = item.to_node_graph(graph, layout, next, &owed);
                    if !item.nullable() {
                        owed = IdCapture::empty();
                    }
                }
                next
            }
            BuildRegex::Select(branches) => {
                let nodes: SmallVec<[NodeIdx; 4]> = branches
                    .iter()
                    .map(|branch| branch.to_node_graph(graph, layout, tail, end))
                    .collect();
                graph.merge_alternate_paths(nodes)
            }
            BuildRegex::Repeat { body, counts } => {
                let max = counts.last().copied().unwrap_or(0);
                let mut node = tail;
                for k in (0..max).rev() {
                    let again = body.to_node_graph(graph, layout, node, end);
                    node = if counts.binary_search(&k).is_ok() {
                        graph.merge_alternate_path(again, tail)
                    } else {
                        again
                    };
                }
                node
            }
            BuildRegex::RepeatInfinite { body, min, policy } => {
                let marker = graph.marker();
                let once = body.to_node_graph(graph, layout, marker, end);
                let entry = graph.close_loop(marker, once, tail, *policy);
                if *min == 0 {
                    return entry;
                }
                let mut node = graph.unroll_loop(marker);
                for _ in 1..*min {
                    node = body.to_node_graph(graph, layout, node, end);
                }
                node
            }
            BuildRegex::Optional(body) => {
                let taken = body.to_node_graph(graph, layout, tail, end);
                graph.merge_alternate_path(taken, tail)
            }
            BuildRegex::Capture { label, body } => {
                let Some(slot) = layout.slot_of(label) else {
                    return body.to_node_graph(graph, layout, tail, end);
                };
                let body_tail = if body.nullable() {
                    graph.annotate(tail, IdCapture::end(slot, false))
                } else {
                    tail
                };
                let close = end.union(&IdCapture::end(slot, true));
                let inner = body.to_node_graph(graph, layout, body_tail, &close);
                graph.annotate(inner, IdCapture::start(slot))
            }
        }
    }

    /// Compile into a standalone automaton accepting exactly this pattern
    /// under pattern id 0.
    pub fn compile<S: Scheme>(&self) -> Result<Automaton<S>, Error> {
        let layout = self.capture_layout()?;
        let mut graph = Graph::<S>::new();
        let terminal = graph.terminal();
        let start = self.to_node_graph(&mut graph, &layout, terminal, &IdCapture::empty());
        Ok(graph.freeze(start).with_captures(layout.len() as u32))
    }
}

/// Sort and merge overlapping or touching ranges, dropping empty ones.
pub fn normalize_ranges(mut ranges: Vec<Range<u32>>) -> Vec<Range<u32>> {
    ranges.retain(|r| r.start < r.end);
    ranges.sort_by_key(|r| r.start);
    let mut out: Vec<Range<u32>> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match out.last_mut() {
            Some(last) if range.start <= last.end => last.end = last.end.max(range.end),
            _ => out.push(range),
        }
    }
    out
}

/// Complement of normalized `ranges` within `0..limit`.
pub fn negate_ranges(ranges: &[Range<u32>], limit: u32) -> Vec<Range<u32>> {
    let mut out = Vec::new();
    let mut lo = 0;
    for range in ranges {
        if range.start > lo {
            out.push(lo..range.start.min(limit));
        }
        lo = lo.max(range.end);
    }
    if lo < limit {
        out.push(lo..limit);
    }
    out.retain(|r| r.start < r.end);
    out
}
