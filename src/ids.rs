//! Interned identifier sets.
//!
//! Two immutable set types travel on every transition of an automaton:
//!
//! * [`IdSet`]: the *routes* of an edge (which merged pattern copies are
//!   still alive when the edge is taken), and the accept set of a node.
//! * [`IdCapture`]: the capture-group boundaries that fire when an edge is
//!   taken.
//!
//! Both are created in great numbers while automata are built and merged,
//! but only a few distinct values exist.  Every value is therefore interned
//! in a process-wide table: structurally equal sets share one allocation,
//! equality is a pointer comparison and hashing hashes the pointer.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use rustc_hash::FxHashSet;

// ---------------------------------------------------------------------------
// Interner
// ---------------------------------------------------------------------------

/// Thread-safe table of canonical slices.
///
/// Lookups take the read lock; a miss re-checks under the write lock before
/// inserting, so two threads interning the same content always end up with
/// the same allocation.
pub struct Interner<T: 'static> {
    table: RwLock<FxHashSet<Arc<[T]>>>,
}

impl<T: Hash + Eq + Clone> Interner<T> {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(FxHashSet::default()),
        }
    }

    /// Return the canonical allocation holding `items`.
    pub fn intern(&self, items: &[T]) -> Arc<[T]> {
        {
            let table = self.table.read();
            if let Some(found) = table.get(items) {
                return found.clone();
            }
        }

        let mut table = self.table.write();
        if let Some(found) = table.get(items) {
            return found.clone();
        }
        let canonical: Arc<[T]> = Arc::from(items);
        table.insert(canonical.clone());
        canonical
    }

    /// Number of distinct values interned so far.
    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }
}

impl<T: Hash + Eq + Clone> Default for Interner<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Interner<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interner")
            .field("count", &self.table.read().len())
            .finish()
    }
}

static ID_SETS: LazyLock<Interner<u32>> = LazyLock::new(Interner::new);

static ID_CAPTURES: LazyLock<Interner<(u32, Boundary)>> = LazyLock::new(Interner::new);

// ---------------------------------------------------------------------------
// Sorted-slice algebra shared by both set types
// ---------------------------------------------------------------------------

pub(crate) fn sorted_union<T: Ord + Copy>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

pub(crate) fn sorted_intersection<T: Ord + Copy>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

pub(crate) fn sorted_difference<T: Ord + Copy>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(a.len());
    let mut j = 0;
    for &x in a {
        while j < b.len() && b[j] < x {
            j += 1;
        }
        if j < b.len() && b[j] == x {
            continue;
        }
        out.push(x);
    }
    out
}

/// `true` when every element of `b` is in `a`.
pub(crate) fn sorted_contains_all<T: Ord>(a: &[T], b: &[T]) -> bool {
    let mut i = 0;
    for x in b {
        while i < a.len() && a[i] < *x {
            i += 1;
        }
        if i == a.len() || a[i] != *x {
            return false;
        }
        i += 1;
    }
    true
}

fn sorted_disjoint<T: Ord>(a: &[T], b: &[T]) -> bool {
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => return false,
        }
    }
    true
}

// ---------------------------------------------------------------------------
// IdSet
// ---------------------------------------------------------------------------

/// Interned sorted set of small integer ids.
///
/// Used for edge routes and node accept sets.  When a second pattern is
/// merged into an automaton its ids are shifted past the first pattern's
/// (see [`append`](Self::append)), so ids stay unique per origin.
#[derive(Clone)]
pub struct IdSet(Arc<[u32]>);

impl IdSet {
    /// Build a set from ids in any order; duplicates are dropped.
    pub fn new(ids: impl IntoIterator<Item = u32>) -> Self {
        let mut ids: Vec<u32> = ids.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        Self::from_sorted(&ids)
    }

    fn from_sorted(ids: &[u32]) -> Self {
        Self(ID_SETS.intern(ids))
    }

    pub fn empty() -> Self {
        Self::from_sorted(&[])
    }

    pub fn single(id: u32) -> Self {
        Self::from_sorted(&[id])
    }

    /// The set `0..n`.
    pub fn range(n: u32) -> Self {
        let ids: Vec<u32> = (0..n).collect();
        Self::from_sorted(&ids)
    }

    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.0.binary_search(&id).is_ok()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }

    pub fn max(&self) -> Option<u32> {
        self.0.last().copied()
    }

    #[inline]
    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Ids present in both sets.
    ///
    /// Runs on the matching hot path: when one side already contains the
    /// other no lookup in the interning table is needed.
    pub fn intersect(&self, other: &Self) -> Self {
        if self.ptr_eq(other) || other.is_superset(self) {
            return self.clone();
        }
        if self.is_superset(other) {
            return other.clone();
        }
        Self::from_sorted(&sorted_intersection(&self.0, &other.0))
    }

    pub fn union(&self, other: &Self) -> Self {
        self.append(other, 0)
    }

    /// Union with `other` after shifting every id of `other` by `offset`.
    pub fn append(&self, other: &Self, offset: u32) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.shift(offset);
        }
        if offset == 0 && self.is_superset(other) {
            return self.clone();
        }
        let shifted: Vec<u32> = other.iter().map(|id| id + offset).collect();
        Self::from_sorted(&sorted_union(&self.0, &shifted))
    }

    /// Every id moved up by `offset`.
    pub fn shift(&self, offset: u32) -> Self {
        if offset == 0 || self.is_empty() {
            return self.clone();
        }
        let shifted: Vec<u32> = self.iter().map(|id| id + offset).collect();
        Self::from_sorted(&shifted)
    }

    /// Ids of `self` that are not in `other`.
    pub fn subtract(&self, other: &Self) -> Self {
        if other.is_empty() || self.is_disjoint(other) {
            return self.clone();
        }
        Self::from_sorted(&sorted_difference(&self.0, &other.0))
    }

    pub fn is_superset(&self, other: &Self) -> bool {
        self.ptr_eq(other) || sorted_contains_all(&self.0, &other.0)
    }

    pub fn is_disjoint(&self, other: &Self) -> bool {
        sorted_disjoint(&self.0, &other.0)
    }
}

impl Default for IdSet {
    fn default() -> Self {
        Self::empty()
    }
}

/// Interned values are equal exactly when they share an allocation.
impl PartialEq for IdSet {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for IdSet {}

impl Hash for IdSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const u32 as usize).hash(state);
    }
}

impl fmt::Debug for IdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<u32> for IdSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self::new(iter)
    }
}

// ---------------------------------------------------------------------------
// IdCapture
// ---------------------------------------------------------------------------

/// What a capture annotation does to its capture slot.
///
/// The declaration order is the processing order for one slot on one edge:
/// an occurrence is opened before it is closed, and an inclusive close
/// (the edge's own symbol is part of the group) wins over an exclusive one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Boundary {
    /// Open a new occurrence at the current position.
    Start,
    /// Close the latest occurrence before the current symbol.
    EndExclusive,
    /// Close the latest occurrence after the current symbol.
    EndInclusive,
}

impl Boundary {
    fn sigil(self) -> &'static str {
        match self {
            Boundary::Start => "(",
            Boundary::EndExclusive => ")",
            Boundary::EndInclusive => "]",
        }
    }
}

/// Interned sorted list of `(capture slot, boundary)` annotations.
#[derive(Clone)]
pub struct IdCapture(Arc<[(u32, Boundary)]>);

impl IdCapture {
    pub fn new(entries: impl IntoIterator<Item = (u32, Boundary)>) -> Self {
        let mut entries: Vec<(u32, Boundary)> = entries.into_iter().collect();
        entries.sort_unstable();
        entries.dedup();
        Self::from_sorted(&entries)
    }

    fn from_sorted(entries: &[(u32, Boundary)]) -> Self {
        Self(ID_CAPTURES.intern(entries))
    }

    pub fn empty() -> Self {
        Self::from_sorted(&[])
    }

    pub fn start(slot: u32) -> Self {
        Self::from_sorted(&[(slot, Boundary::Start)])
    }

    pub fn end(slot: u32, inclusive: bool) -> Self {
        let boundary = if inclusive {
            Boundary::EndInclusive
        } else {
            Boundary::EndExclusive
        };
        Self::from_sorted(&[(slot, boundary)])
    }

    #[inline]
    pub fn as_slice(&self) -> &[(u32, Boundary)] {
        &self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (u32, Boundary)> + '_ {
        self.0.iter().copied()
    }

    /// Highest slot mentioned by any annotation.
    pub fn max_slot(&self) -> Option<u32> {
        self.iter().map(|(slot, _)| slot).max()
    }

    #[inline]
    fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn union(&self, other: &Self) -> Self {
        self.append(other, 0)
    }

    /// Union with `other` after shifting its slots by `offset`.
    pub fn append(&self, other: &Self, offset: u32) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.shift(offset);
        }
        if offset == 0 && self.is_superset(other) {
            return self.clone();
        }
        let mut shifted: Vec<(u32, Boundary)> = other
            .iter()
            .map(|(slot, boundary)| (slot + offset, boundary))
            .collect();
        shifted.sort_unstable();
        Self::from_sorted(&sorted_union(&self.0, &shifted))
    }

    pub fn shift(&self, offset: u32) -> Self {
        if offset == 0 || self.is_empty() {
            return self.clone();
        }
        let shifted: Vec<(u32, Boundary)> = self
            .iter()
            .map(|(slot, boundary)| (slot + offset, boundary))
            .collect();
        Self::from_sorted(&shifted)
    }

    pub fn subtract(&self, other: &Self) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        Self::from_sorted(&sorted_difference(&self.0, &other.0))
    }

    pub fn is_superset(&self, other: &Self) -> bool {
        self.ptr_eq(other) || sorted_contains_all(&self.0, &other.0)
    }
}

impl Default for IdCapture {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for IdCapture {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for IdCapture {}

impl Hash for IdCapture {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as *const (u32, Boundary) as usize).hash(state);
    }
}

/// `[0( 0] 1)]`: slot followed by the boundary sigil.
impl fmt::Debug for IdCapture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, (slot, boundary)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}{}", slot, boundary.sigil())?;
        }
        write!(f, "]")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_set_interning_returns_same_allocation() {
        let a = IdSet::new([3, 1, 2, 3]);
        let b = IdSet::new([1, 2, 3]);
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(a, b);
        assert_eq!(a.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_id_set_distinct_content_distinct_handles() {
        assert_ne!(IdSet::new([1, 2]), IdSet::new([1, 3]));
        assert_ne!(IdSet::empty(), IdSet::single(0));
    }

    #[test]
    fn test_id_set_intersect_is_commutative() {
        let a = IdSet::new([1, 2, 5, 9]);
        let b = IdSet::new([2, 3, 9, 11]);
        assert_eq!(a.intersect(&b), b.intersect(&a));
        assert_eq!(a.intersect(&b).as_slice(), &[2, 9]);
        assert_eq!(a.intersect(&IdSet::empty()), IdSet::empty());
    }

    #[test]
    fn test_id_set_intersect_superset_shortcut() {
        let small = IdSet::new([2, 4]);
        let big = IdSet::new([1, 2, 3, 4]);
        assert_eq!(small.intersect(&big), small);
        assert_eq!(big.intersect(&small), small);
    }

    #[test]
    fn test_id_set_union_is_commutative() {
        let a = IdSet::new([0, 4]);
        let b = IdSet::new([1, 4, 7]);
        assert_eq!(a.union(&b), b.union(&a));
        assert_eq!(a.union(&b).as_slice(), &[0, 1, 4, 7]);
    }

    #[test]
    fn test_id_set_append_with_offset() {
        let a = IdSet::new([0, 1]);
        let b = IdSet::new([0, 2]);
        assert_eq!(a.append(&b, 2).as_slice(), &[0, 1, 2, 4]);
        assert_eq!(IdSet::empty().append(&b, 3).as_slice(), &[3, 5]);
        assert_eq!(a.append(&IdSet::empty(), 9), a);
    }

    #[test]
    fn test_id_set_subtract_inverts_append() {
        let a = IdSet::new([0, 1, 2]);
        let b = IdSet::new([0, 1]);
        let merged = a.append(&b, 3);
        assert_eq!(merged.subtract(&b.shift(3)), a);
        assert_eq!(merged.subtract(&a), b.shift(3));
        assert_eq!(a.subtract(&a), IdSet::empty());
    }

    #[test]
    fn test_id_set_superset_and_disjoint() {
        let a = IdSet::new([1, 2, 3]);
        assert!(a.is_superset(&IdSet::new([1, 3])));
        assert!(a.is_superset(&IdSet::empty()));
        assert!(!a.is_superset(&IdSet::new([0, 1])));
        assert!(a.is_disjoint(&IdSet::new([0, 4])));
        assert!(!a.is_disjoint(&IdSet::new([3])));
    }

    #[test]
    fn test_id_set_range_and_contains() {
        let r = IdSet::range(4);
        assert_eq!(r.as_slice(), &[0, 1, 2, 3]);
        assert!(r.contains(3));
        assert!(!r.contains(4));
        assert_eq!(r.max(), Some(3));
        assert_eq!(IdSet::range(0), IdSet::empty());
    }

    #[test]
    fn test_id_capture_sorts_by_slot_then_boundary() {
        let c = IdCapture::new([
            (1, Boundary::EndInclusive),
            (1, Boundary::Start),
            (0, Boundary::EndExclusive),
        ]);
        let entries: Vec<_> = c.iter().collect();
        assert_eq!(
            entries,
            vec![
                (0, Boundary::EndExclusive),
                (1, Boundary::Start),
                (1, Boundary::EndInclusive),
            ]
        );
        assert_eq!(c.max_slot(), Some(1));
    }

    #[test]
    fn test_id_capture_union_shift_and_interning() {
        let open = IdCapture::start(0);
        let close = IdCapture::end(0, true);
        let both = open.union(&close);
        assert_eq!(both, close.union(&open));
        assert_eq!(both.len(), 2);
        let shifted = both.shift(2);
        assert_eq!(
            shifted,
            IdCapture::new([(2, Boundary::Start), (2, Boundary::EndInclusive)])
        );
        assert_eq!(IdCapture::empty().append(&both, 2), shifted);
        assert_eq!(both.subtract(&open), close);
    }

    #[test]
    fn test_id_capture_debug() {
        let c = IdCapture::new([(0, Boundary::Start), (1, Boundary::EndExclusive)]);
        assert_eq!(format!("{:?}", c), "[0( 1)]");
    }

    #[test]
    fn test_interning_is_consistent_across_threads() {
        let handles: Vec<IdSet> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| IdSet::new([40_001, 40_002, 40_003])))
                .collect();
            workers
                .into_iter()
                .map(|w| w.join().expect("interning thread panicked"))
                .collect()
        });
        for pair in handles.windows(2) {
            assert_eq!(pair[0], pair[1]);
        }
    }

    #[test]
    fn test_private_interner_counts_distinct_values() {
        let interner = Interner::<u32>::new();
        let a = interner.intern(&[1, 2]);
        let b = interner.intern(&[1, 2]);
        let _c = interner.intern(&[3]);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(interner.len(), 2);
    }

    #[test]
    fn test_sorted_helpers() {
        assert_eq!(sorted_union(&[1, 3], &[2, 3, 4]), vec![1, 2, 3, 4]);
        assert_eq!(sorted_intersection(&[1, 2, 3], &[2, 3, 4]), vec![2, 3]);
        assert_eq!(sorted_difference(&[1, 2, 3], &[2]), vec![1, 3]);
        assert!(sorted_contains_all(&[1, 2, 3], &[1, 3]));
        assert!(!sorted_contains_all(&[1, 3], &[2]));
    }
}
