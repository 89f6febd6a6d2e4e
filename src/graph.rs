//! Mutable construction arena.
//!
//! A [`Graph`] owns every node produced while compiling one or more
//! patterns.  Nodes are referred to by [`NodeIdx`] and are of two kinds:
//!
//! * **Built** nodes carry a concrete [`Node`] (edges, accept set, exit
//!   captures).
//! * **Lazy** nodes describe how a node is *derived* from others: the
//!   union of several nodes (alternation), a node with extra capture
//!   boundaries on its first edges, a node whose edges win over another's
//!   where they overlap, or a loop marker standing for a loop entry that is
//!   still being built.
//!
//! Lazy nodes are resolved on demand.  Resolving a union merges the edge
//! maps of its members; wherever two members bind the same ordinal, the
//! edge goes to the union of both successors, which is again a lazy node.
//! Unions are memoized by their flattened member set, so the number of
//! distinct unions is bounded by the subsets of the atomic nodes and
//! resolution terminates on cyclic graphs.  This is subset construction,
//! performed lazily over the shared arena.
//!
//! # Loops
//!
//! A loop body is compiled against a fresh [marker](Graph::marker) standing
//! in for the loop entry.  Once the body exists, the entry is assembled
//! from the body's first step and the loop tail according to a
//! [`LoopPolicy`], and [`make_loop`](Graph::make_loop) points the marker at
//! it.  That patch is the only in-place mutation of an existing node and
//! is what closes the cycle.
//!
//! ```text
//!            ┌───── body ─────┐
//!            v                │
//!  entry = body₀ ∪ tail    marker ──> entry
//! ```
//!
//! `body₀` is the body with the marker itself removed from its top level
//! (see [`subtract`](Graph::subtract)): the marker stands for "one more
//! iteration or leave", which `entry` already offers.
//!
//! # Freezing
//!
//! [`freeze`](Graph::freeze) resolves every node reachable from a start
//! node and renumbers them densely into an immutable
//! [`Automaton`](crate::Automaton).

use std::marker::PhantomData;
use std::ops::Range;

use indexmap::IndexSet;
use log::{debug, trace, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::automaton::Automaton;
use crate::ids::{IdCapture, IdSet, sorted_contains_all, sorted_union};
use crate::node::{Binding, Node, NodeIdx, NodeMap, NodeMapBuilder, Split};
use crate::scheme::Scheme;

/// How a loop entry resolves a symbol that both continues the loop and
/// leaves it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LoopPolicy {
    /// Both paths stay alive.
    #[default]
    Plain,
    /// The loop keeps the symbol; the tail never sees it (`*^`, `+^`).
    ExclusiveExtending,
    /// The tail takes the symbol and the loop ends (`*!`, `+!`).
    ExclusiveLimiting,
}

#[derive(Clone, Debug)]
enum Slot {
    Built,
    /// Flattened, sorted, at least two members.
    Union(Box<[NodeIdx]>),
    Annotate {
        inner: NodeIdx,
        capture: IdCapture,
    },
    Prefer {
        winner: NodeIdx,
        loser: NodeIdx,
    },
    /// Loop entry placeholder; `None` while the loop is open.
    Marker(Option<NodeIdx>),
}

#[derive(Debug)]
pub struct Graph<S: Scheme> {
    slots: Vec<Slot>,
    /// Concrete content of each slot; filled on construction for built
    /// nodes and on first resolution for lazy ones.
    resolved: Vec<Option<Node>>,
    unions: FxHashMap<Box<[NodeIdx]>, NodeIdx>,
    annotations: FxHashMap<(NodeIdx, IdCapture), NodeIdx>,
    preferences: FxHashMap<(NodeIdx, NodeIdx), NodeIdx>,
    /// Loop marker -> loop body compiled against that marker.
    loops: FxHashMap<NodeIdx, NodeIdx>,
    resolving: FxHashSet<NodeIdx>,
    terminal: NodeIdx,
    /// Some resolution merged edges or exits with different capture
    /// annotations.
    ambiguous_captures: bool,
    _scheme: PhantomData<S>,
}

impl<S: Scheme> Default for Graph<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Scheme> Graph<S> {
    pub fn new() -> Self {
        let mut graph = Self {
            slots: Vec::new(),
            resolved: Vec::new(),
            unions: FxHashMap::default(),
            annotations: FxHashMap::default(),
            preferences: FxHashMap::default(),
            loops: FxHashMap::default(),
            resolving: FxHashSet::default(),
            terminal: NodeIdx::EMPTY,
            ambiguous_captures: false,
            _scheme: PhantomData,
        };
        let empty = graph.add(Node::default());
        debug_assert_eq!(empty, NodeIdx::EMPTY);
        graph.terminal = graph.add(Node {
            accept: IdSet::single(0),
            ..Node::default()
        });
        graph
    }

    /// Node matching no input at all.
    #[inline]
    pub fn empty(&self) -> NodeIdx {
        NodeIdx::EMPTY
    }

    /// Node matching exactly the empty input.
    #[inline]
    pub fn terminal(&self) -> NodeIdx {
        self.terminal
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn builder(&self) -> NodeMapBuilder {
        S::builder()
    }

    fn push(&mut self, slot: Slot, resolved: Option<Node>) -> NodeIdx {
        let idx = NodeIdx::new(self.slots.len());
        self.slots.push(slot);
        self.resolved.push(resolved);
        idx
    }

    /// Store a concrete node.
    pub fn add(&mut self, node: Node) -> NodeIdx {
        self.push(Slot::Built, Some(node))
    }

    /// Node with one edge per class range, all leading to `next`.
    ///
    /// Ranges are clipped to the scheme's alphabet; a class left empty
    /// yields [`NodeIdx::EMPTY`].
    pub fn edge(&mut self, ranges: &[Range<u32>], next: NodeIdx, capture: IdCapture) -> NodeIdx {
        let routes = IdSet::single(0);
        let mut builder = self.builder();
        for range in ranges {
            let hi = range.end.min(S::LIMIT);
            builder.bind(range.start..hi, next, routes.clone(), capture.clone());
        }
        let map = builder.build();
        if map.is_empty() {
            return NodeIdx::EMPTY;
        }
        self.add(Node {
            map,
            ..Node::default()
        })
    }

    /// Fresh open loop marker.
    pub fn marker(&mut self) -> NodeIdx {
        self.push(Slot::Marker(None), None)
    }

    /// Follow closed markers to the node they stand for.
    pub fn canonical(&self, mut idx: NodeIdx) -> NodeIdx {
        while let Slot::Marker(Some(target)) = self.slots[idx.idx()] {
            idx = target;
        }
        idx
    }

    /// Atomic members of a node: the flattened union members, or the node
    /// itself.  Markers closed since the union was formed are expanded.
    fn members(&self, idx: NodeIdx) -> Vec<NodeIdx> {
        let idx = self.canonical(idx);
        if idx == NodeIdx::EMPTY {
            return Vec::new();
        }
        let Slot::Union(members) = &self.slots[idx.idx()] else {
            return vec![idx];
        };
        let closed = |m: &NodeIdx| matches!(self.slots[m.idx()], Slot::Marker(Some(_)));
        if !members.iter().any(closed) {
            return members.to_vec();
        }
        let mut out: Vec<NodeIdx> = members.iter().flat_map(|&m| self.members(m)).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    fn union_of(&mut self, members: Vec<NodeIdx>) -> NodeIdx {
        match members.len() {
            0 => return NodeIdx::EMPTY,
            1 => return members[0],
            _ => {}
        }
        let key = members.into_boxed_slice();
        if let Some(&idx) = self.unions.get(&key) {
            return idx;
        }
        let idx = self.push(Slot::Union(key.clone()), None);
        self.unions.insert(key, idx);
        idx
    }

    /// Node accepting what either `a` or `b` accepts.  Ids are shared, so
    /// both sides must belong to the same pattern.
    pub fn merge_alternate_path(&mut self, a: NodeIdx, b: NodeIdx) -> NodeIdx {
        let (a, b) = (self.canonical(a), self.canonical(b));
        if a == b || b == NodeIdx::EMPTY {
            return a;
        }
        if a == NodeIdx::EMPTY {
            return b;
        }
        let (ma, mb) = (self.members(a), self.members(b));
        if sorted_contains_all(&ma, &mb) {
            return a;
        }
        if sorted_contains_all(&mb, &ma) {
            return b;
        }
        self.union_of(sorted_union(&ma, &mb))
    }

    pub fn merge_alternate_paths(&mut self, nodes: impl IntoIterator<Item = NodeIdx>) -> NodeIdx {
        nodes
            .into_iter()
            .fold(NodeIdx::EMPTY, |acc, node| self.merge_alternate_path(acc, node))
    }

    /// `inner` with `capture` added to every first edge, and to its exit
    /// annotations if it accepts.
    pub fn annotate(&mut self, inner: NodeIdx, capture: IdCapture) -> NodeIdx {
        let inner = self.canonical(inner);
        if capture.is_empty() || inner == NodeIdx::EMPTY {
            return inner;
        }
        if let Slot::Annotate {
            inner: deeper,
            capture: existing,
        } = &self.slots[inner.idx()]
        {
            let (deeper, combined) = (*deeper, existing.union(&capture));
            return self.annotate(deeper, combined);
        }
        let key = (inner, capture);
        if let Some(&idx) = self.annotations.get(&key) {
            return idx;
        }
        let idx = self.push(
            Slot::Annotate {
                inner,
                capture: key.1.clone(),
            },
            None,
        );
        self.annotations.insert(key, idx);
        idx
    }

    /// Node accepting what either side accepts, except that on symbols both
    /// sides bind, only `winner`'s edge is kept.
    pub fn prefer(&mut self, winner: NodeIdx, loser: NodeIdx) -> NodeIdx {
        let (winner, loser) = (self.canonical(winner), self.canonical(loser));
        if winner == loser || loser == NodeIdx::EMPTY {
            return winner;
        }
        if winner == NodeIdx::EMPTY {
            return loser;
        }
        if let Some(&idx) = self.preferences.get(&(winner, loser)) {
            return idx;
        }
        let idx = self.push(Slot::Prefer { winner, loser }, None);
        self.preferences.insert((winner, loser), idx);
        idx
    }

    /// Structural difference: `node` with every top-level member of
    /// `remove` taken out.
    ///
    /// Only the node's own alternatives are inspected; successors reached
    /// through edges are left untouched.  Both sides must come from the
    /// same graph.
    pub fn subtract(&mut self, node: NodeIdx, remove: NodeIdx) -> NodeIdx {
        let removed = self.members(remove);
        let mut memo = FxHashMap::default();
        self.subtract_in(node, &removed, &mut memo)
    }

    fn subtract_in(
        &mut self,
        node: NodeIdx,
        removed: &[NodeIdx],
        memo: &mut FxHashMap<NodeIdx, NodeIdx>,
    ) -> NodeIdx {
        if removed.binary_search(&node).is_ok() {
            return NodeIdx::EMPTY;
        }
        if let Some(&done) = memo.get(&node) {
            return done;
        }
        memo.insert(node, node);

        let result = match self.slots[node.idx()].clone() {
            Slot::Built | Slot::Marker(None) => node,
            Slot::Marker(Some(target)) => {
                let rest = self.subtract_in(target, removed, memo);
                if rest == target { node } else { rest }
            }
            Slot::Union(members) => {
                let rest: Vec<NodeIdx> = members
                    .iter()
                    .map(|&m| self.subtract_in(m, removed, memo))
                    .collect();
                if rest.iter().eq(members.iter()) {
                    node
                } else {
                    self.merge_alternate_paths(rest)
                }
            }
            Slot::Annotate { inner, capture } => {
                let rest = self.subtract_in(inner, removed, memo);
                if rest == inner {
                    node
                } else {
                    self.annotate(rest, capture)
                }
            }
            Slot::Prefer { winner, loser } => {
                let w = self.subtract_in(winner, removed, memo);
                let l = self.subtract_in(loser, removed, memo);
                if (w, l) == (winner, loser) {
                    node
                } else {
                    self.prefer(w, l)
                }
            }
        };
        memo.insert(node, result);
        result
    }

    /// Close the loop opened by `marker`.
    ///
    /// # Panics
    ///
    /// If `marker` is not an open loop marker.
    pub fn make_loop(&mut self, marker: NodeIdx, entry: NodeIdx) {
        if let Slot::Marker(target) = &mut self.slots[marker.idx()]
            && target.is_none()
        {
            *target = Some(entry);
            trace!("closed loop marker {marker} -> {entry}");
            return;
        }
        panic!("make_loop: {marker} is not an open loop marker");
    }

    /// Loop whose body and tail both stay alive on shared symbols.
    pub fn merge_loop_with_tail(&mut self, marker: NodeIdx, body: NodeIdx, tail: NodeIdx) -> NodeIdx {
        self.close_loop(marker, body, tail, LoopPolicy::Plain)
    }

    /// Loop that keeps every symbol it can consume.
    pub fn merge_loop_exclusive_extending(
        &mut self,
        marker: NodeIdx,
        body: NodeIdx,
        tail: NodeIdx,
    ) -> NodeIdx {
        self.close_loop(marker, body, tail, LoopPolicy::ExclusiveExtending)
    }

    /// Loop that leaves as soon as the tail can take the symbol.
    pub fn merge_loop_exclusive_limiting(
        &mut self,
        marker: NodeIdx,
        body: NodeIdx,
        tail: NodeIdx,
    ) -> NodeIdx {
        self.close_loop(marker, body, tail, LoopPolicy::ExclusiveLimiting)
    }

    /// Build the loop entry from `body` (compiled against `marker`) and
    /// `tail`, then point the marker at it.
    pub fn close_loop(
        &mut self,
        marker: NodeIdx,
        body: NodeIdx,
        tail: NodeIdx,
        policy: LoopPolicy,
    ) -> NodeIdx {
        let once = self.subtract(body, marker);
        let entry = match policy {
            LoopPolicy::Plain => self.merge_alternate_path(once, tail),
            LoopPolicy::ExclusiveExtending => self.prefer(once, tail),
            LoopPolicy::ExclusiveLimiting => self.prefer(tail, once),
        };
        self.make_loop(marker, entry);
        self.loops.insert(marker, body);
        debug!("loop {marker}: body {body}, tail {tail}, entry {entry} ({policy:?})");
        entry
    }

    /// One mandatory pass through a closed loop, leading back into the
    /// shared loop entry.  Any other node is returned unchanged.
    pub fn unroll_loop(&self, marker: NodeIdx) -> NodeIdx {
        self.loops
            .get(&marker)
            .copied()
            .unwrap_or_else(|| self.canonical(marker))
    }

    /// Concrete content of a node, resolving lazy nodes as needed.
    pub fn resolve(&mut self, idx: NodeIdx) -> Node {
        let idx = self.canonical(idx);
        if let Some(node) = &self.resolved[idx.idx()] {
            return node.clone();
        }
        if !self.resolving.insert(idx) {
            warn!("node {idx} reached itself without consuming input; treating it as empty");
            return Node::default();
        }

        let node = match self.slots[idx.idx()].clone() {
            Slot::Built | Slot::Marker(_) => Node::default(),
            Slot::Union(members) => {
                let mut acc = Node::default();
                for member in members.iter() {
                    let next = self.resolve(*member);
                    acc = self.union_nodes(&acc, &next);
                }
                acc
            }
            Slot::Annotate { inner, capture } => {
                let inner = self.resolve(inner);
                overlay(&inner, &capture)
            }
            Slot::Prefer { winner, loser } => {
                let winner = self.resolve(winner);
                let loser = self.resolve(loser);
                self.prefer_nodes(&winner, &loser)
            }
        };

        self.resolving.remove(&idx);
        trace!("resolved {idx}: {} bindings, accept {:?}", node.map.len(), node.accept);
        self.resolved[idx.idx()] = Some(node.clone());
        node
    }

    fn union_nodes(&mut self, a: &Node, b: &Node) -> Node {
        let Split {
            left_only,
            right_only,
            both,
        } = NodeMap::split(&a.map, &b.map);
        let mut bindings = left_only;
        bindings.extend(right_only);
        for overlap in both {
            if overlap.left.capture != overlap.right.capture {
                self.ambiguous_captures = true;
            }
            let next = self.merge_alternate_path(overlap.left.next, overlap.right.next);
            bindings.push(Binding {
                lo: overlap.lo,
                hi: overlap.hi,
                next,
                routes: overlap.left.routes.union(&overlap.right.routes),
                capture: overlap.left.capture.union(&overlap.right.capture),
            });
        }
        self.check_exits(a, b);
        Node {
            map: NodeMap::from_bindings(bindings),
            accept: a.accept.union(&b.accept),
            exit: a.exit.union(&b.exit),
            cyclic: false,
        }
    }

    /// On the winner's symbols the loser's edges are dropped, so only the
    /// exits can disagree.
    fn prefer_nodes(&mut self, winner: &Node, loser: &Node) -> Node {
        let Split {
            left_only,
            right_only,
            both,
        } = NodeMap::split(&winner.map, &loser.map);
        let mut bindings = left_only;
        bindings.extend(right_only);
        bindings.extend(both.iter().map(|o| o.left.with_group(o.lo, o.hi)));
        self.check_exits(winner, loser);
        Node {
            map: NodeMap::from_bindings(bindings),
            accept: winner.accept.union(&loser.accept),
            exit: winner.exit.union(&loser.exit),
            cyclic: false,
        }
    }

    fn check_exits(&mut self, a: &Node, b: &Node) {
        if a.is_accepting() && b.is_accepting() && a.exit != b.exit {
            self.ambiguous_captures = true;
        }
    }

    /// Whether any node resolved so far mixes capture annotations of
    /// alternatives sharing a symbol or an accepting end.
    pub fn ambiguous_captures(&self) -> bool {
        self.ambiguous_captures
    }

    /// Resolve everything reachable from `start` into a dense automaton.
    ///
    /// Every loop reachable from `start` must be closed.
    pub fn freeze(&mut self, start: NodeIdx) -> Automaton<S> {
        let mut order: IndexSet<NodeIdx> = IndexSet::new();
        order.insert(self.canonical(start));
        let mut nodes = Vec::new();

        let mut i = 0;
        while let Some(&idx) = order.get_index(i) {
            let node = self.resolve(idx);
            let map = node.map.map_edges(|b| {
                let (dense, _) = order.insert_full(self.canonical(b.next));
                Binding {
                    next: NodeIdx::new(dense),
                    ..b.clone()
                }
            });
            nodes.push(Node {
                map,
                accept: node.accept,
                exit: node.exit,
                cyclic: false,
            });
            i += 1;
        }

        debug!(
            "froze {} states out of {} graph slots ({} unions)",
            nodes.len(),
            self.slots.len(),
            self.unions.len()
        );
        Automaton::new(nodes, NodeIdx::new(0)).with_ambiguous_captures(self.ambiguous_captures)
    }
}

/// Add `capture` to every edge of `node`, and to its exit if it accepts.
fn overlay(node: &Node, capture: &IdCapture) -> Node {
    let map = node.map.map_edges(|b| Binding {
        capture: b.capture.union(capture),
        ..b.clone()
    });
    let exit = if node.is_accepting() {
        node.exit.union(capture)
    } else {
        node.exit.clone()
    };
    Node {
        map,
        accept: node.accept.clone(),
        exit,
        cyclic: node.cyclic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::Boundary;
    use crate::scheme::CharScheme;

    fn sym(c: char) -> Range<u32> {
        c as u32..c as u32 + 1
    }

    fn units(s: &str) -> Vec<u16> {
        CharScheme::encode(s)
    }

    /// `body` = `a` back into the loop, `tail` = one `tail_char` then accept.
    fn single_symbol_loop(policy: LoopPolicy, tail_char: char) -> Automaton<CharScheme> {
        let mut graph = Graph::<CharScheme>::new();
        let terminal = graph.terminal();
        let tail = graph.edge(&[sym(tail_char)], terminal, IdCapture::empty());
        let marker = graph.marker();
        let body = graph.edge(&[sym('a')], marker, IdCapture::empty());
        let entry = match policy {
            LoopPolicy::Plain => graph.merge_loop_with_tail(marker, body, tail),
            LoopPolicy::ExclusiveExtending => graph.merge_loop_exclusive_extending(marker, body, tail),
            LoopPolicy::ExclusiveLimiting => graph.merge_loop_exclusive_limiting(marker, body, tail),
        };
        graph.freeze(entry)
    }

    #[test]
    fn test_new_graph_has_empty_and_terminal() {
        let mut graph = Graph::<CharScheme>::new();
        assert_eq!(graph.empty(), NodeIdx::EMPTY);
        let terminal = graph.terminal();
        assert!(graph.resolve(terminal).is_accepting());
        assert!(!graph.resolve(NodeIdx::EMPTY).is_accepting());
    }

    #[test]
    fn test_merge_alternate_path_identities() {
        let mut graph = Graph::<CharScheme>::new();
        let t = graph.terminal();
        let a = graph.edge(&[sym('a')], t, IdCapture::empty());
        assert_eq!(graph.merge_alternate_path(a, NodeIdx::EMPTY), a);
        assert_eq!(graph.merge_alternate_path(NodeIdx::EMPTY, a), a);
        assert_eq!(graph.merge_alternate_path(a, a), a);
    }

    #[test]
    fn test_unions_are_memoized_by_member_set() {
        let mut graph = Graph::<CharScheme>::new();
        let t = graph.terminal();
        let a = graph.edge(&[sym('a')], t, IdCapture::empty());
        let b = graph.edge(&[sym('b')], t, IdCapture::empty());
        let c = graph.edge(&[sym('c')], t, IdCapture::empty());
        let ab = graph.merge_alternate_path(a, b);
        let ba = graph.merge_alternate_path(b, a);
        assert_eq!(ab, ba);
        let abc = graph.merge_alternate_path(ab, c);
        let bc = graph.merge_alternate_path(b, c);
        let a_bc = graph.merge_alternate_path(a, bc);
        assert_eq!(abc, a_bc);
        assert_eq!(graph.merge_alternate_path(abc, ab), abc);
    }

    #[test]
    fn test_union_of_overlapping_edges() {
        let mut graph = Graph::<CharScheme>::new();
        let t = graph.terminal();
        let b = graph.edge(&[sym('b')], t, IdCapture::empty());
        let c = graph.edge(&[sym('c')], t, IdCapture::empty());
        let ab = graph.edge(&[sym('a')], b, IdCapture::empty());
        let ac = graph.edge(&[sym('a')], c, IdCapture::empty());
        let either = graph.merge_alternate_path(ab, ac);
        let automaton = graph.freeze(either);
        assert!(automaton.is_match(&units("ab")));
        assert!(automaton.is_match(&units("ac")));
        assert!(!automaton.is_match(&units("a")));
        assert!(!automaton.is_match(&units("b")));
        // start, {b,c} union, terminal
        assert_eq!(automaton.state_count(), 3);
        assert!(!automaton.ambiguous_captures());
    }

    #[test]
    fn test_union_flags_diverging_captures() {
        let open_close = IdCapture::new([(0, Boundary::Start), (0, Boundary::EndInclusive)]);
        let mut graph = Graph::<CharScheme>::new();
        let t = graph.terminal();
        let b = graph.edge(&[sym('b')], t, IdCapture::empty());
        let c = graph.edge(&[sym('c')], t, open_close.clone());
        let ab = graph.edge(&[sym('a')], b, open_close);
        let ac = graph.edge(&[sym('a')], c, IdCapture::empty());
        let either = graph.merge_alternate_path(ab, ac);
        let automaton = graph.freeze(either);
        assert!(automaton.ambiguous_captures());
        assert!(automaton.is_match(&units("ac")));
    }

    #[test]
    fn test_subtract_removes_marker_only_at_top_level() {
        let mut graph = Graph::<CharScheme>::new();
        let t = graph.terminal();
        let marker = graph.marker();
        let a = graph.edge(&[sym('a')], marker, IdCapture::empty());
        let body = graph.merge_alternate_path(a, marker);
        assert_eq!(graph.subtract(body, marker), a);
        assert_eq!(graph.subtract(a, marker), a);
        assert_eq!(graph.subtract(marker, marker), NodeIdx::EMPTY);
        let annotated = graph.annotate(body, IdCapture::start(0));
        let expected = graph.annotate(a, IdCapture::start(0));
        assert_eq!(graph.subtract(annotated, marker), expected);
        assert_eq!(graph.subtract(t, marker), t);
    }

    #[test]
    fn test_plain_loop() {
        let automaton = single_symbol_loop(LoopPolicy::Plain, 'b');
        assert!(automaton.is_match(&units("b")));
        assert!(automaton.is_match(&units("ab")));
        assert!(automaton.is_match(&units("aaab")));
        assert!(!automaton.is_match(&units("a")));
        assert!(!automaton.is_match(&units("")));
    }

    #[test]
    fn test_plain_loop_overlapping_tail() {
        let automaton = single_symbol_loop(LoopPolicy::Plain, 'a');
        assert!(!automaton.is_match(&units("")));
        assert!(automaton.is_match(&units("a")));
        assert!(automaton.is_match(&units("aa")));
        assert!(automaton.is_match(&units("aaaa")));
    }

    #[test]
    fn test_exclusive_extending_loop_starves_tail() {
        let automaton = single_symbol_loop(LoopPolicy::ExclusiveExtending, 'a');
        assert!(!automaton.is_match(&units("a")));
        assert!(!automaton.is_match(&units("aa")));
        let automaton = single_symbol_loop(LoopPolicy::ExclusiveExtending, 'b');
        assert!(automaton.is_match(&units("aab")));
    }

    #[test]
    fn test_exclusive_limiting_loop_leaves_early() {
        let automaton = single_symbol_loop(LoopPolicy::ExclusiveLimiting, 'a');
        assert!(automaton.is_match(&units("a")));
        assert!(!automaton.is_match(&units("aa")));
        let automaton = single_symbol_loop(LoopPolicy::ExclusiveLimiting, 'b');
        assert!(automaton.is_match(&units("aab")));
    }

    #[test]
    fn test_unroll_loop_requires_one_pass() {
        let mut graph = Graph::<CharScheme>::new();
        let t = graph.terminal();
        let marker = graph.marker();
        let body = graph.edge(&[sym('a')], marker, IdCapture::empty());
        graph.merge_loop_with_tail(marker, body, t);
        let plus = graph.unroll_loop(marker);
        assert_eq!(plus, body);
        let automaton = graph.freeze(plus);
        assert!(!automaton.is_match(&units("")));
        assert!(automaton.is_match(&units("a")));
        assert!(automaton.is_match(&units("aaa")));
        assert_eq!(graph.unroll_loop(t), t);
    }

    #[test]
    #[should_panic(expected = "not an open loop marker")]
    fn test_make_loop_twice_panics() {
        let mut graph = Graph::<CharScheme>::new();
        let t = graph.terminal();
        let marker = graph.marker();
        graph.make_loop(marker, t);
        graph.make_loop(marker, t);
    }

    #[test]
    fn test_prefer_keeps_winner_edges() {
        let mut graph = Graph::<CharScheme>::new();
        let t = graph.terminal();
        let b = graph.edge(&[sym('b')], t, IdCapture::empty());
        let winner = graph.edge(&[sym('a')], t, IdCapture::empty());
        let loser = graph.edge(&[sym('a'), sym('c')], b, IdCapture::empty());
        let preferred = graph.prefer(winner, loser);
        let automaton = graph.freeze(preferred);
        assert!(automaton.is_match(&units("a")));
        assert!(!automaton.is_match(&units("ab")));
        assert!(automaton.is_match(&units("cb")));
    }

    #[test]
    fn test_annotate_adds_capture_to_first_edges_and_exit() {
        let mut graph = Graph::<CharScheme>::new();
        let t = graph.terminal();
        let a = graph.edge(&[sym('a')], t, IdCapture::empty());
        let either = graph.merge_alternate_path(a, t);
        let annotated = graph.annotate(either, IdCapture::start(3));
        let node = graph.resolve(annotated);
        assert_eq!(node.map.bindings()[0].capture, IdCapture::start(3));
        assert_eq!(node.exit, IdCapture::start(3));
        // nested annotations collapse into one
        let twice = graph.annotate(annotated, IdCapture::end(3, false));
        let direct = graph.annotate(
            either,
            IdCapture::start(3).union(&IdCapture::end(3, false)),
        );
        assert_eq!(twice, direct);
    }

    #[test]
    fn test_freeze_marks_cycles() {
        let automaton = single_symbol_loop(LoopPolicy::Plain, 'b');
        let start = automaton.node(automaton.start());
        assert!(start.cyclic);
        let after_b = start
            .step('b' as u32)
            .map(|b| automaton.node(b.next))
            .expect("edge on b");
        assert!(!after_b.cyclic);
    }
}
