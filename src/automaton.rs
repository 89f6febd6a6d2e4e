//! Frozen, immutable automata and their merging.

use std::io::{self, Write};
use std::marker::PhantomData;

use indexmap::IndexMap;
use log::debug;

use crate::Error;
use crate::ids::IdSet;
use crate::node::{Binding, Node, NodeIdx, NodeMap, Split};
use crate::scheme::Scheme;

/// Default bound on the product depth of [`Automaton::merge_alternate_pattern`].
pub const DEFAULT_MAX_DEPTH: usize = 10_000;

/// Knobs for [`Automaton::merge_alternate_pattern`].
#[derive(Clone, Debug)]
pub struct MergeOptions {
    /// Shift applied to the right side's pattern ids.  Defaults to the left
    /// side's pattern count.
    pub id_offset: Option<u32>,
    /// Shift applied to the right side's capture slots.  Defaults to the
    /// left side's capture count.
    pub capture_offset: Option<u32>,
    /// Bound on the pair-product depth; overlapping transitions deeper
    /// than this fail the merge with [`Error::MergeDepthExceeded`].
    pub max_depth: usize,
    /// Whether an input may be accepted by both sides.  Off by default.
    pub allow_overlap: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            id_offset: None,
            capture_offset: None,
            max_depth: DEFAULT_MAX_DEPTH,
            allow_overlap: false,
        }
    }
}

/// Dense, immutable state table produced by
/// [`Graph::freeze`](crate::graph::Graph::freeze) or by merging.
///
/// Safe to share between threads; every matching buffer lives in the
/// caller's [`Capturing`](crate::Capturing).
#[derive(Clone, Debug)]
pub struct Automaton<S: Scheme> {
    nodes: Box<[Node]>,
    start: NodeIdx,
    patterns: u32,
    captures: u32,
    routes: IdSet,
    ambiguous_captures: bool,
    _scheme: PhantomData<S>,
}

type Pair = (Option<NodeIdx>, Option<NodeIdx>);

struct Product<'a, S: Scheme> {
    left: &'a Automaton<S>,
    right: &'a Automaton<S>,
    id_offset: u32,
    capture_offset: u32,
    max_depth: usize,
    allow_overlap: bool,
    /// Path merges share capture slots; diverging annotations on a shared
    /// symbol make the result's edge captures unreliable.
    same_pattern: bool,
    ambiguous: bool,
    /// Pair -> depth of first discovery.  The index is the dense state id.
    pairs: IndexMap<Pair, usize>,
}

impl<S: Scheme> Automaton<S> {
    /// Wrap a dense node table, inferring pattern and capture counts.
    pub fn new(mut nodes: Vec<Node>, start: NodeIdx) -> Self {
        mark_cycles(&mut nodes);
        let mut max_id = None::<u32>;
        let mut max_slot = None::<u32>;
        for node in &nodes {
            max_id = max_id.max(node.accept.max());
            max_slot = max_slot.max(node.exit.max_slot());
            for b in node.map.bindings() {
                max_id = max_id.max(b.routes.max());
                max_slot = max_slot.max(b.capture.max_slot());
            }
        }
        let patterns = max_id.map_or(1, |id| id + 1);
        let captures = max_slot.map_or(0, |slot| slot + 1);
        Self {
            nodes: nodes.into_boxed_slice(),
            start,
            patterns,
            captures,
            routes: IdSet::range(patterns),
            ambiguous_captures: false,
            _scheme: PhantomData,
        }
    }

    pub(crate) fn with_ambiguous_captures(mut self, ambiguous: bool) -> Self {
        self.ambiguous_captures |= ambiguous;
        self
    }

    /// Whether the edge annotations may disagree with the groups of the
    /// alternative that actually matched.
    ///
    /// Set when two alternatives sharing a prefix, or a loop body and its
    /// tail, annotate the same symbol differently.  A deterministic
    /// automaton cannot tell them apart on the fly, so the
    /// [`Matcher`](crate::Matcher) resolves the groups of such patterns
    /// again over the matched span.
    pub fn ambiguous_captures(&self) -> bool {
        self.ambiguous_captures
    }

    /// Raise the declared capture count, e.g. for groups that no path
    /// can reach.
    pub fn with_captures(mut self, captures: u32) -> Self {
        self.captures = self.captures.max(captures);
        self
    }

    fn with_patterns(mut self, patterns: u32) -> Self {
        if patterns > self.patterns {
            self.patterns = patterns;
            self.routes = IdSet::range(patterns);
        }
        self
    }

    #[inline]
    pub fn start(&self) -> NodeIdx {
        self.start
    }

    #[inline]
    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx]
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn state_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of pattern ids; ids are `0..patterns()`.
    pub fn patterns(&self) -> u32 {
        self.patterns
    }

    /// Number of capture slots; slots are `0..captures()`.
    pub fn captures(&self) -> u32 {
        self.captures
    }

    /// Every pattern id, the route set live at the start of a scan.
    #[inline]
    pub fn routes(&self) -> &IdSet {
        &self.routes
    }

    pub fn memory_size(&self) -> usize {
        std::mem::size_of::<Self>() + self.nodes.iter().map(Node::memory_size).sum::<usize>()
    }

    /// Ids of the patterns accepting the whole of `input`.
    pub fn accepts(&self, input: &[S::Symbol]) -> IdSet {
        let mut state = self.start;
        let mut live = self.routes.clone();
        for &symbol in input {
            let Some(binding) = self.nodes[state].step(S::ordinal(symbol)) else {
                return IdSet::empty();
            };
            live = live.intersect(&binding.routes);
            if live.is_empty() {
                return IdSet::empty();
            }
            state = binding.next;
        }
        self.nodes[state].accept.intersect(&live)
    }

    /// Whether some pattern accepts the whole of `input`.
    pub fn is_match(&self, input: &[S::Symbol]) -> bool {
        !self.accepts(input).is_empty()
    }

    /// Automaton accepting what either side accepts, ids shared.
    ///
    /// Both sides should describe the same pattern; use
    /// [`merge_alternate_pattern`](Self::merge_alternate_pattern) to keep
    /// patterns apart.
    pub fn merge_alternate_path(&self, other: &Self) -> Self {
        let product = Product {
            left: self,
            right: other,
            id_offset: 0,
            capture_offset: 0,
            max_depth: usize::MAX,
            allow_overlap: true,
            same_pattern: true,
            ambiguous: false,
            pairs: IndexMap::new(),
        };
        match product.run() {
            Ok(merged) => merged,
            Err(err) => unreachable!("path merge has neither an overlap check nor a depth bound: {err}"),
        }
    }

    /// Automaton running both patterns at once while keeping them apart.
    ///
    /// The right side's pattern ids and capture slots are shifted past the
    /// left side's, so every accept reports which pattern matched and
    /// captures never collide.  Merged automata can be merged again.
    ///
    /// # Errors
    ///
    /// [`Error::OverlappingAccept`] if some input is accepted by both sides
    /// and `options.allow_overlap` is false, and
    /// [`Error::MergeDepthExceeded`] if the product needs overlapping
    /// transitions deeper than `options.max_depth`.
    pub fn merge_alternate_pattern(&self, other: &Self, options: &MergeOptions) -> Result<Self, Error> {
        let id_offset = options.id_offset.unwrap_or(self.patterns);
        let capture_offset = options.capture_offset.unwrap_or(self.captures);
        let product = Product {
            left: self,
            right: other,
            id_offset,
            capture_offset,
            max_depth: options.max_depth,
            allow_overlap: options.allow_overlap,
            same_pattern: false,
            ambiguous: false,
            pairs: IndexMap::new(),
        };
        let merged = product.run()?;
        Ok(merged
            .with_patterns(id_offset + other.patterns)
            .with_captures(capture_offset + other.captures))
    }

    /// Write a DOT (Graphviz) representation of the automaton.
    pub fn to_dot(&self, mut buffer: impl Write) -> io::Result<()> {
        writeln!(buffer, "digraph automaton {{")?;
        writeln!(buffer, "\trankdir=LR;")?;
        writeln!(buffer, "\tnode [shape=circle];")?;
        writeln!(buffer, "\tstart [shape=point];")?;
        writeln!(buffer, "\tstart -> {};", self.start)?;

        for (i, node) in self.nodes.iter().enumerate() {
            if node.is_accepting() {
                let mut label = format!("{i} {:?}", node.accept);
                if !node.exit.is_empty() {
                    label.push_str(&format!(" {:?}", node.exit));
                }
                writeln!(
                    buffer,
                    "\t{i} [shape=doublecircle, label=\"{}\"];",
                    escape(&label)
                )?;
            }
            for b in node.map.bindings() {
                let mut label = S::describe(b.lo, b.hi);
                if !b.capture.is_empty() {
                    label.push_str(&format!(" {:?}", b.capture));
                }
                if self.patterns > 1 {
                    label.push_str(&format!(" {:?}", b.routes));
                }
                let style = if node.cyclic && self.nodes[b.next].cyclic {
                    ", style=bold"
                } else {
                    ""
                };
                writeln!(
                    buffer,
                    "\t{i} -> {} [label=\"{}\"{style}];",
                    b.next,
                    escape(&label)
                )?;
            }
        }

        writeln!(buffer, "}}")
    }
}

impl<S: Scheme> Product<'_, S> {
    fn intern(&mut self, pair: Pair, depth: usize) -> NodeIdx {
        let entry = self.pairs.entry(pair);
        let idx = entry.index();
        entry.or_insert(depth);
        NodeIdx::new(idx)
    }

    fn run(mut self) -> Result<Automaton<S>, Error> {
        let (left, right) = (self.left, self.right);
        self.intern((Some(left.start), Some(right.start)), 0);
        let mut nodes = Vec::new();

        let mut i = 0;
        while let Some((&pair, &depth)) = self.pairs.get_index(i) {
            let node = match pair {
                (Some(l), Some(r)) => self.both(&left.nodes[l], &right.nodes[r], depth)?,
                (Some(l), None) => self.copy_left(&left.nodes[l], depth),
                (None, Some(r)) => self.copy_right(&right.nodes[r], depth),
                (None, None) => Node::default(),
            };
            nodes.push(node);
            i += 1;
        }

        debug!(
            "merged {} + {} states into {}",
            left.nodes.len(),
            right.nodes.len(),
            nodes.len()
        );
        let ambiguous = self.ambiguous || left.ambiguous_captures || right.ambiguous_captures;
        Ok(Automaton::new(nodes, NodeIdx::new(0)).with_ambiguous_captures(ambiguous))
    }

    fn copy_left(&mut self, node: &Node, depth: usize) -> Node {
        let map = node.map.map_edges(|b| Binding {
            next: self.intern((Some(b.next), None), depth + 1),
            ..b.clone()
        });
        Node {
            map,
            accept: node.accept.clone(),
            exit: node.exit.clone(),
            cyclic: false,
        }
    }

    fn copy_right(&mut self, node: &Node, depth: usize) -> Node {
        let shifted = self.shift_right(node);
        let map = shifted.map.map_edges(|b| Binding {
            next: self.intern((None, Some(b.next)), depth + 1),
            ..b.clone()
        });
        Node { map, ..shifted }
    }

    /// The right side's node with ids and slots moved into the merged space.
    fn shift_right(&self, node: &Node) -> Node {
        let (ids, slots) = (self.id_offset, self.capture_offset);
        Node {
            map: node.map.map_edges(|b| Binding {
                routes: b.routes.shift(ids),
                capture: b.capture.shift(slots),
                ..b.clone()
            }),
            accept: node.accept.shift(ids),
            exit: node.exit.shift(slots),
            cyclic: false,
        }
    }

    fn both(&mut self, l: &Node, r: &Node, depth: usize) -> Result<Node, Error> {
        let r = self.shift_right(r);
        if l.is_accepting() && r.is_accepting() && !self.allow_overlap {
            return Err(Error::OverlappingAccept {
                left: l.accept.as_slice().to_vec(),
                right: r.accept.as_slice().to_vec(),
            });
        }
        if self.same_pattern && l.is_accepting() && r.is_accepting() && l.exit != r.exit {
            self.ambiguous = true;
        }

        let Split {
            left_only,
            right_only,
            both,
        } = NodeMap::split(&l.map, &r.map);
        let mut bindings = Vec::with_capacity(left_only.len() + right_only.len() + both.len());
        for b in left_only {
            let next = self.intern((Some(b.next), None), depth + 1);
            bindings.push(Binding { next, ..b });
        }
        for b in right_only {
            let next = self.intern((None, Some(b.next)), depth + 1);
            bindings.push(Binding { next, ..b });
        }
        if !both.is_empty() && depth + 1 > self.max_depth {
            return Err(Error::MergeDepthExceeded(self.max_depth));
        }
        for o in both {
            if self.same_pattern && o.left.capture != o.right.capture {
                self.ambiguous = true;
            }
            let next = self.intern((Some(o.left.next), Some(o.right.next)), depth + 1);
            bindings.push(Binding {
                lo: o.lo,
                hi: o.hi,
                next,
                routes: o.left.routes.union(&o.right.routes),
                capture: o.left.capture.union(&o.right.capture),
            });
        }

        Ok(Node {
            map: NodeMap::from_bindings(bindings),
            accept: l.accept.union(&r.accept),
            exit: l.exit.union(&r.exit),
            cyclic: false,
        })
    }
}

/// Flag every node on a cycle (iterative Tarjan SCC).
fn mark_cycles(nodes: &mut [Node]) {
    const UNVISITED: u32 = u32::MAX;
    let n = nodes.len();
    let mut index = vec![UNVISITED; n];
    let mut low = vec![0u32; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut call: Vec<(usize, usize)> = Vec::new();
    let mut counter = 0u32;

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }
        index[root] = counter;
        low[root] = counter;
        counter += 1;
        stack.push(root);
        on_stack[root] = true;
        call.push((root, 0));

        while let Some(&(v, edge)) = call.last() {
            if let Some(b) = nodes[v].map.bindings().get(edge) {
                let w = b.next.idx();
                if let Some(top) = call.last_mut() {
                    top.1 += 1;
                }
                if index[w] == UNVISITED {
                    index[w] = counter;
                    low[w] = counter;
                    counter += 1;
                    stack.push(w);
                    on_stack[w] = true;
                    call.push((w, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
                continue;
            }

            call.pop();
            if let Some(&(parent, _)) = call.last() {
                low[parent] = low[parent].min(low[v]);
            }
            if low[v] == index[v] {
                let mut component = Vec::new();
                while let Some(w) = stack.pop() {
                    on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                let cyclic = component.len() > 1
                    || nodes[v].map.bindings().iter().any(|b| b.next.idx() == v);
                if cyclic {
                    for w in component {
                        nodes[w].cyclic = true;
                    }
                }
            }
        }
    }
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}
