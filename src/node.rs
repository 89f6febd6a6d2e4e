//! Nodes and their interval-keyed transition maps.

use std::fmt;
use std::ops::{Index, Range};

use crate::ids::{IdCapture, IdSet};

// ---------------------------------------------------------------------------
// NodeIdx
// ---------------------------------------------------------------------------

/// Index of a node, either in a [`Graph`](crate::graph::Graph) arena or in
/// the dense state table of a frozen [`Automaton`](crate::Automaton).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeIdx(u32);

impl NodeIdx {
    /// The node that matches nothing.  Slot 0 of every graph.
    pub const EMPTY: Self = Self(0);

    /// # Panics
    ///
    /// If `idx` does not fit in 32 bits.  Graphs and automata index their
    /// nodes densely from 0, so this only happens past 4 billion nodes.
    #[inline]
    pub fn new(idx: usize) -> Self {
        Self(u32::try_from(idx).expect("node index exceeds u32::MAX"))
    }

    #[inline]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Index<NodeIdx> for [Node] {
    type Output = Node;

    #[inline]
    fn index(&self, idx: NodeIdx) -> &Node {
        &self[idx.idx()]
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// One transition: every ordinal in `lo..hi` leads to `next`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub lo: u32,
    pub hi: u32,
    pub next: NodeIdx,
    /// Merged pattern copies that survive taking this edge.
    pub routes: IdSet,
    /// Capture boundaries fired by this edge.
    pub capture: IdCapture,
}

impl Binding {
    #[inline]
    pub fn contains(&self, ordinal: u32) -> bool {
        self.lo <= ordinal && ordinal < self.hi
    }

    #[inline]
    pub fn group(&self) -> Range<u32> {
        self.lo..self.hi
    }

    /// Same edge restricted to `lo..hi`.
    pub fn with_group(&self, lo: u32, hi: u32) -> Self {
        Self {
            lo,
            hi,
            ..self.clone()
        }
    }

    fn same_edge(&self, other: &Self) -> bool {
        self.next == other.next && self.routes == other.routes && self.capture == other.capture
    }
}

// ---------------------------------------------------------------------------
// NodeMap
// ---------------------------------------------------------------------------

/// Sorted, non-overlapping interval map from ordinal groups to edges.
///
/// Adjacent groups with identical edges are always coalesced, so two maps
/// describing the same function compare equal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeMap {
    bindings: Vec<Binding>,
}

/// Result of aligning two maps over their common group boundaries.
#[derive(Debug, Default)]
pub struct Split<'a> {
    pub left_only: Vec<Binding>,
    pub right_only: Vec<Binding>,
    pub both: Vec<Overlap<'a>>,
}

/// A sub-group covered by both maps, with the edge each side binds it to.
#[derive(Debug)]
pub struct Overlap<'a> {
    pub lo: u32,
    pub hi: u32,
    pub left: &'a Binding,
    pub right: &'a Binding,
}

impl NodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sort, validate and coalesce.
    ///
    /// # Panics
    ///
    /// If two bindings overlap.  Callers only ever combine disjoint groups;
    /// an overlap is a construction bug.
    pub(crate) fn from_bindings(mut bindings: Vec<Binding>) -> Self {
        bindings.sort_by_key(|b| b.lo);
        let mut out: Vec<Binding> = Vec::with_capacity(bindings.len());
        for binding in bindings {
            debug_assert!(binding.lo < binding.hi);
            if let Some(last) = out.last_mut() {
                assert!(
                    last.hi <= binding.lo,
                    "overlapping binding {}..{} after {}..{}",
                    binding.lo,
                    binding.hi,
                    last.lo,
                    last.hi
                );
                if last.hi == binding.lo && last.same_edge(&binding) {
                    last.hi = binding.hi;
                    continue;
                }
            }
            out.push(binding);
        }
        Self { bindings: out }
    }

    #[inline]
    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Edge taken on `ordinal`, if any.
    #[inline]
    pub fn find(&self, ordinal: u32) -> Option<&Binding> {
        let i = self.bindings.partition_point(|b| b.hi <= ordinal);
        self.bindings.get(i).filter(|b| b.lo <= ordinal)
    }

    /// Union of maps with pairwise disjoint groups.
    pub fn merge(maps: &[&NodeMap]) -> NodeMap {
        let bindings = maps
            .iter()
            .flat_map(|map| map.bindings.iter().cloned())
            .collect();
        Self::from_bindings(bindings)
    }

    /// Rewrite every edge; the groups are kept.
    pub fn map_edges(&self, mut f: impl FnMut(&Binding) -> Binding) -> NodeMap {
        let bindings = self
            .bindings
            .iter()
            .map(|b| {
                let mapped = f(b);
                Binding {
                    lo: b.lo,
                    hi: b.hi,
                    ..mapped
                }
            })
            .collect();
        Self::from_bindings(bindings)
    }

    /// Cut both maps at every boundary either of them has.
    ///
    /// Each resulting piece is reported once: bound only on the left, only
    /// on the right, or on both sides.
    pub fn split<'a>(left: &'a NodeMap, right: &'a NodeMap) -> Split<'a> {
        let mut split = Split::default();
        let (l, r) = (&left.bindings, &right.bindings);
        let (mut i, mut j) = (0, 0);
        // Low end of the part of l[i] / r[j] not yet reported.
        let mut lo_l = l.first().map_or(0, |b| b.lo);
        let mut lo_r = r.first().map_or(0, |b| b.lo);

        while i < l.len() && j < r.len() {
            let (a, b) = (&l[i], &r[j]);
            if lo_l < lo_r {
                let hi = a.hi.min(lo_r);
                split.left_only.push(a.with_group(lo_l, hi));
                lo_l = hi;
            } else if lo_r < lo_l {
                let hi = b.hi.min(lo_l);
                split.right_only.push(b.with_group(lo_r, hi));
                lo_r = hi;
            } else {
                let hi = a.hi.min(b.hi);
                split.both.push(Overlap {
                    lo: lo_l,
                    hi,
                    left: a,
                    right: b,
                });
                lo_l = hi;
                lo_r = hi;
            }

            if lo_l == a.hi {
                i += 1;
                if let Some(next) = l.get(i) {
                    lo_l = next.lo;
                }
            }
            if lo_r == b.hi {
                j += 1;
                if let Some(next) = r.get(j) {
                    lo_r = next.lo;
                }
            }
        }

        if i < l.len() {
            split.left_only.push(l[i].with_group(lo_l, l[i].hi));
            split.left_only.extend(l[i + 1..].iter().cloned());
        }
        if j < r.len() {
            split.right_only.push(r[j].with_group(lo_r, r[j].hi));
            split.right_only.extend(r[j + 1..].iter().cloned());
        }
        split
    }
}

// ---------------------------------------------------------------------------
// NodeMapBuilder
// ---------------------------------------------------------------------------

/// Collects bindings in any order and produces a canonical [`NodeMap`].
#[derive(Debug, Default)]
pub struct NodeMapBuilder {
    bindings: Vec<Binding>,
}

impl NodeMapBuilder {
    /// Bind `group` to an edge.  Empty groups are ignored.
    pub fn bind(
        &mut self,
        group: Range<u32>,
        next: NodeIdx,
        routes: IdSet,
        capture: IdCapture,
    ) -> &mut Self {
        if group.start < group.end {
            self.bindings.push(Binding {
                lo: group.start,
                hi: group.end,
                next,
                routes,
                capture,
            });
        }
        self
    }

    pub fn push(&mut self, binding: Binding) -> &mut Self {
        if binding.lo < binding.hi {
            self.bindings.push(binding);
        }
        self
    }

    /// # Panics
    ///
    /// If two bound groups overlap.
    pub fn build(self) -> NodeMap {
        NodeMap::from_bindings(self.bindings)
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A state: its outgoing edges and what ending here means.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Node {
    pub map: NodeMap,
    /// Ids of the patterns accepting when input ends here.
    pub accept: IdSet,
    /// Capture boundaries applied when a match ends here.
    pub exit: IdCapture,
    /// Part of a cycle.  Only meaningful after freezing.
    pub cyclic: bool,
}

impl Node {
    #[inline]
    pub fn step(&self, ordinal: u32) -> Option<&Binding> {
        self.map.find(ordinal)
    }

    #[inline]
    pub fn is_accepting(&self) -> bool {
        !self.accept.is_empty()
    }

    pub fn memory_size(&self) -> usize {
        std::mem::size_of::<Node>() + self.map.len() * std::mem::size_of::<Binding>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(lo: u8, hi: u8, next: usize) -> Binding {
        Binding {
            lo: lo as u32,
            hi: hi as u32,
            next: NodeIdx::new(next),
            routes: IdSet::single(0),
            capture: IdCapture::empty(),
        }
    }

    fn groups(bindings: &[Binding]) -> Vec<(u32, u32, usize)> {
        bindings
            .iter()
            .map(|b| (b.lo, b.hi, b.next.idx()))
            .collect()
    }

    #[test]
    fn test_builder_sorts_and_finds() {
        let mut builder = NodeMapBuilder::default();
        builder
            .push(edge(b'x', b'z', 2))
            .push(edge(b'a', b'c', 1));
        let map = builder.build();
        assert_eq!(map.len(), 2);
        assert_eq!(map.find(b'a' as u32).map(|b| b.next), Some(NodeIdx::new(1)));
        assert_eq!(map.find(b'b' as u32).map(|b| b.next), Some(NodeIdx::new(1)));
        assert!(map.find(b'c' as u32).is_none());
        assert_eq!(map.find(b'y' as u32).map(|b| b.next), Some(NodeIdx::new(2)));
        assert!(map.find(b'z' as u32).is_none());
        assert!(map.find(0).is_none());
    }

    #[test]
    fn test_builder_coalesces_adjacent_identical_edges() {
        let mut builder = NodeMapBuilder::default();
        builder.push(edge(b'a', b'c', 1)).push(edge(b'c', b'f', 1));
        let map = builder.build();
        assert_eq!(groups(map.bindings()), vec![(b'a' as u32, b'f' as u32, 1)]);
    }

    #[test]
    #[should_panic(expected = "overlapping binding")]
    fn test_builder_rejects_overlap() {
        let mut builder = NodeMapBuilder::default();
        builder.push(edge(b'a', b'd', 1)).push(edge(b'c', b'f', 2));
        let _ = builder.build();
    }

    #[test]
    fn test_node_idx_round_trips_largest_index() {
        let max = u32::MAX as usize;
        assert_eq!(NodeIdx::new(max).idx(), max);
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    #[should_panic(expected = "node index exceeds u32::MAX")]
    fn test_node_idx_rejects_truncation() {
        let _ = NodeIdx::new(u32::MAX as usize + 1);
    }

    #[test]
    fn test_builder_ignores_empty_group() {
        let mut builder = NodeMapBuilder::default();
        builder.bind(5..5, NodeIdx::new(1), IdSet::single(0), IdCapture::empty());
        assert!(builder.build().is_empty());
    }

    #[test]
    fn test_split_partial_overlap() {
        let left = NodeMap::from_bindings(vec![edge(b'a', b'e', 1)]);
        let right = NodeMap::from_bindings(vec![edge(b'c', b'h', 2)]);
        let split = NodeMap::split(&left, &right);
        assert_eq!(groups(&split.left_only), vec![(b'a' as u32, b'c' as u32, 1)]);
        assert_eq!(groups(&split.right_only), vec![(b'e' as u32, b'h' as u32, 2)]);
        assert_eq!(split.both.len(), 1);
        let overlap = &split.both[0];
        assert_eq!((overlap.lo, overlap.hi), (b'c' as u32, b'e' as u32));
        assert_eq!(overlap.left.next, NodeIdx::new(1));
        assert_eq!(overlap.right.next, NodeIdx::new(2));
    }

    #[test]
    fn test_split_nested_and_disjoint() {
        let left = NodeMap::from_bindings(vec![edge(b'a', b'z', 1)]);
        let right = NodeMap::from_bindings(vec![edge(b'c', b'd', 2), edge(b'x', b'y', 3)]);
        let split = NodeMap::split(&left, &right);
        assert_eq!(
            groups(&split.left_only),
            vec![
                (b'a' as u32, b'c' as u32, 1),
                (b'd' as u32, b'x' as u32, 1),
                (b'y' as u32, b'z' as u32, 1),
            ]
        );
        assert!(split.right_only.is_empty());
        let both: Vec<_> = split
            .both
            .iter()
            .map(|o| (o.lo, o.hi, o.right.next.idx()))
            .collect();
        assert_eq!(
            both,
            vec![(b'c' as u32, b'd' as u32, 2), (b'x' as u32, b'y' as u32, 3)]
        );
    }

    #[test]
    fn test_split_covers_every_ordinal_exactly_once() {
        let left = NodeMap::from_bindings(vec![edge(0, 10, 1), edge(20, 30, 2)]);
        let right = NodeMap::from_bindings(vec![edge(5, 25, 3), edge(28, 40, 4)]);
        let split = NodeMap::split(&left, &right);
        for ordinal in 0..50u32 {
            let in_left = left.find(ordinal).is_some();
            let in_right = right.find(ordinal).is_some();
            let hits = split.left_only.iter().filter(|b| b.contains(ordinal)).count()
                + split.right_only.iter().filter(|b| b.contains(ordinal)).count()
                + split
                    .both
                    .iter()
                    .filter(|o| o.lo <= ordinal && ordinal < o.hi)
                    .count();
            assert_eq!(hits, usize::from(in_left || in_right), "ordinal {ordinal}");
            if in_left && in_right {
                assert!(split.both.iter().any(|o| o.lo <= ordinal && ordinal < o.hi));
            }
        }
    }

    #[test]
    fn test_merge_disjoint_maps() {
        let a = NodeMap::from_bindings(vec![edge(b'a', b'b', 1)]);
        let b = NodeMap::from_bindings(vec![edge(b'b', b'c', 1), edge(b'x', b'y', 2)]);
        let merged = NodeMap::merge(&[&a, &b]);
        assert_eq!(
            groups(merged.bindings()),
            vec![(b'a' as u32, b'c' as u32, 1), (b'x' as u32, b'y' as u32, 2)]
        );
    }

    #[test]
    fn test_map_edges_recoalesces() {
        let map = NodeMap::from_bindings(vec![edge(b'a', b'b', 1), edge(b'b', b'c', 2)]);
        let renumbered = map.map_edges(|b| Binding {
            next: NodeIdx::new(7),
            ..b.clone()
        });
        assert_eq!(groups(renumbered.bindings()), vec![(b'a' as u32, b'c' as u32, 7)]);
    }
}
