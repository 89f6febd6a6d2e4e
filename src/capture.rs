//! Capture groups: static layout and per-scan recording.
//!
//! Groups are identified by a *label*, the path of child indices from the
//! outermost group down to the group itself.  `a(b(c))(d)` declares the
//! labels `[0]`, `[0, 0]` and `[1]`.  The [`Capture`] layout of a pattern
//! maps each group, in declaration order, to a runtime slot; merged
//! patterns are given disjoint slot ranges.
//!
//! At run time the automaton's edges carry [`IdCapture`] annotations and a
//! [`Capturing`] buffer records every occurrence of every slot.

use std::ops::Range;

use smallvec::SmallVec;

use crate::Error;
use crate::ids::{Boundary, IdCapture};

/// Path of a capture group through its enclosing groups.
pub type Label = SmallVec<[u16; 4]>;

/// Static capture layout of one pattern.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Capture {
    /// Declared order.
    labels: Vec<Label>,
    /// Declared position -> slot, before `base`.
    slots: Vec<u32>,
    base: u32,
}

impl Capture {
    /// # Errors
    ///
    /// [`Error::DuplicateCapture`] if two groups share a label.
    pub fn new(labels: impl IntoIterator<Item = Label>) -> Result<Self, Error> {
        let labels: Vec<Label> = labels.into_iter().collect();
        let mut order: Vec<usize> = (0..labels.len()).collect();
        order.sort_by(|&a, &b| labels[a].cmp(&labels[b]));
        if let Some(pair) = order.windows(2).find(|w| labels[w[0]] == labels[w[1]]) {
            return Err(Error::DuplicateCapture(labels[pair[0]].to_vec()));
        }
        let mut slots = vec![0; labels.len()];
        for (slot, &position) in order.iter().enumerate() {
            slots[position] = slot as u32;
        }
        Ok(Self {
            labels,
            slots,
            base: 0,
        })
    }

    /// Same layout with every slot moved up by `base`.
    pub fn with_base(mut self, base: u32) -> Self {
        self.base = base;
        self
    }

    pub fn base(&self) -> u32 {
        self.base
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label of the group declared at `position` (1-based).
    pub fn label(&self, position: usize) -> Option<&Label> {
        self.labels.get(position.checked_sub(1)?)
    }

    /// Runtime slot of the group declared at `position` (1-based).
    pub fn slot(&self, position: usize) -> Option<u32> {
        let slot = self.slots.get(position.checked_sub(1)?)?;
        Some(self.base + slot)
    }

    /// Declared position (1-based) of the group with `label`.
    pub fn position_of(&self, label: &[u16]) -> Option<usize> {
        self.labels.iter().position(|l| l.as_slice() == label).map(|i| i + 1)
    }

    /// Runtime slot of the group with `label`.
    pub fn slot_of(&self, label: &[u16]) -> Option<u32> {
        let position = self.labels.iter().position(|l| l.as_slice() == label)?;
        Some(self.base + self.slots[position])
    }

    /// Runtime slots in declaration order.
    pub fn slots(&self) -> impl Iterator<Item = u32> + '_ {
        self.slots.iter().map(move |slot| self.base + slot)
    }
}

/// Result of a match: the overall span and every occurrence of every
/// group, in input order.  Spans are symbol offsets.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Captured {
    span: Range<usize>,
    groups: Vec<Vec<Range<usize>>>,
}

impl Captured {
    pub fn new(span: Range<usize>, groups: Vec<Vec<Range<usize>>>) -> Self {
        Self { span, groups }
    }

    pub fn span(&self) -> Range<usize> {
        self.span.clone()
    }

    /// Number of declared groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// All occurrences of group `position`; group 0 is the whole match.
    pub fn group(&self, position: usize) -> &[Range<usize>] {
        match position {
            0 => std::slice::from_ref(&self.span),
            _ => self
                .groups
                .get(position - 1)
                .map_or(&[][..], |occurrences| occurrences.as_slice()),
        }
    }

    /// Last occurrence of group `position`.
    pub fn last(&self, position: usize) -> Option<Range<usize>> {
        self.group(position).last().cloned()
    }
}

const OPEN: usize = usize::MAX;

#[derive(Clone, Debug, Default)]
struct SlotRecord {
    generation: u32,
    starts: Vec<usize>,
    ends: Vec<usize>,
}

/// Reusable per-thread recording buffer for capture occurrences.
///
/// Resetting is O(1): records carry the generation that wrote them and
/// stale ones are cleared on first touch.
#[derive(Clone, Debug)]
pub struct Capturing {
    generation: u32,
    records: Vec<SlotRecord>,
}

impl Default for Capturing {
    fn default() -> Self {
        Self::new()
    }
}

impl Capturing {
    pub fn new() -> Self {
        Self {
            generation: 1,
            records: Vec::new(),
        }
    }

    /// Forget everything recorded so far.
    pub fn reset(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            for record in &mut self.records {
                *record = SlotRecord::default();
            }
            self.generation = 1;
        }
    }

    fn record_mut(&mut self, slot: u32) -> &mut SlotRecord {
        let i = slot as usize;
        if i >= self.records.len() {
            self.records.resize_with(i + 1, SlotRecord::default);
        }
        let generation = self.generation;
        let record = &mut self.records[i];
        if record.generation != generation {
            record.starts.clear();
            record.ends.clear();
            record.generation = generation;
        }
        record
    }

    fn record(&self, slot: u32) -> Option<&SlotRecord> {
        self.records
            .get(slot as usize)
            .filter(|record| record.generation == self.generation)
    }

    /// Apply the boundaries of an edge taken at `position`.
    pub fn update(&mut self, capture: &IdCapture, position: usize) {
        for (slot, boundary) in capture.iter() {
            let record = self.record_mut(slot);
            apply(&mut record.starts, &mut record.ends, boundary, position);
        }
    }

    /// Occurrences of `slot` recorded so far; open ones are omitted.
    pub fn occurrences(&self, slot: u32) -> Vec<Range<usize>> {
        self.record(slot)
            .map(|record| {
                record
                    .starts
                    .iter()
                    .zip(&record.ends)
                    .filter(|&(_, &end)| end != OPEN)
                    .map(|(&start, &end)| start..end)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Snapshot for a match ending at `span.end` in a node with `exit`
    /// boundaries.  Occurrences still open are closed at the match end.
    pub fn select(&self, layout: &Capture, exit: &IdCapture, span: Range<usize>) -> Captured {
        let end = span.end;
        let groups = layout
            .slots()
            .map(|slot| {
                let (mut starts, mut ends) = match self.record(slot) {
                    Some(record) => (record.starts.clone(), record.ends.clone()),
                    None => (Vec::new(), Vec::new()),
                };
                for (_, boundary) in exit.iter().filter(|&(s, _)| s == slot) {
                    // an exit has no symbol of its own to include
                    let boundary = match boundary {
                        Boundary::EndInclusive => Boundary::EndExclusive,
                        other => other,
                    };
                    apply(&mut starts, &mut ends, boundary, end);
                }
                starts
                    .into_iter()
                    .zip(ends)
                    .map(|(start, stop)| start..if stop == OPEN { end } else { stop })
                    .collect()
            })
            .collect();
        Captured { span, groups }
    }
}

fn apply(starts: &mut Vec<usize>, ends: &mut Vec<usize>, boundary: Boundary, position: usize) {
    match boundary {
        Boundary::Start => {
            starts.push(position);
            ends.push(OPEN);
        }
        Boundary::EndExclusive => {
            if let Some(end) = ends.last_mut() {
                *end = position;
            }
        }
        Boundary::EndInclusive => {
            if let Some(end) = ends.last_mut() {
                *end = position + 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn layout(labels: &[&[u16]]) -> Capture {
        Capture::new(labels.iter().map(|l| Label::from_slice(l))).expect("distinct labels")
    }

    #[test]
    fn test_layout_slots_follow_label_order() {
        let capture = layout(&[&[1], &[0], &[0, 0]]);
        assert_eq!(capture.slot(1), Some(2));
        assert_eq!(capture.slot(2), Some(0));
        assert_eq!(capture.slot(3), Some(1));
        assert_eq!(capture.slot(0), None);
        assert_eq!(capture.slot(4), None);
        assert_eq!(capture.slot_of(&[0, 0]), Some(1));
        assert_eq!(capture.slot_of(&[5]), None);
        let label: Label = smallvec![1];
        assert_eq!(capture.label(1), Some(&label));
    }

    #[test]
    fn test_layout_with_base() {
        let capture = layout(&[&[0], &[1]]).with_base(3);
        assert_eq!(capture.slots().collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(capture.slot_of(&[1]), Some(4));
    }

    #[test]
    fn test_duplicate_labels_rejected() {
        let err = Capture::new([Label::from_slice(&[0]), Label::from_slice(&[0])])
            .expect_err("duplicate");
        assert!(matches!(err, Error::DuplicateCapture(ref label) if label == &vec![0]));
    }

    #[test]
    fn test_update_records_occurrences() {
        let mut capturing = Capturing::new();
        let open_close = IdCapture::start(0).union(&IdCapture::end(0, true));
        capturing.update(&open_close, 1);
        capturing.update(&IdCapture::end(0, true), 2);
        capturing.update(&open_close, 4);
        assert_eq!(capturing.occurrences(0), vec![1..3, 4..5]);
    }

    #[test]
    fn test_inclusive_end_wins_over_exclusive() {
        let mut capturing = Capturing::new();
        let all = IdCapture::new([
            (0, Boundary::EndInclusive),
            (0, Boundary::Start),
            (0, Boundary::EndExclusive),
        ]);
        capturing.update(&all, 7);
        assert_eq!(capturing.occurrences(0), vec![7..8]);
    }

    #[test]
    fn test_end_without_start_is_ignored() {
        let mut capturing = Capturing::new();
        capturing.update(&IdCapture::end(2, false), 3);
        assert!(capturing.occurrences(2).is_empty());
    }

    #[test]
    fn test_reset_discards_previous_scan() {
        let mut capturing = Capturing::new();
        capturing.update(&IdCapture::start(0).union(&IdCapture::end(0, true)), 0);
        capturing.reset();
        assert!(capturing.occurrences(0).is_empty());
        capturing.update(&IdCapture::start(0).union(&IdCapture::end(0, true)), 5);
        assert_eq!(capturing.occurrences(0), vec![5..6]);
    }

    #[test]
    fn test_select_applies_exit_and_closes_open_groups() {
        let capture = layout(&[&[0], &[1], &[2]]);
        let mut capturing = Capturing::new();
        capturing.update(&IdCapture::start(0), 1);
        capturing.update(&IdCapture::start(1).union(&IdCapture::end(1, true)), 2);
        let exit = IdCapture::start(2).union(&IdCapture::end(2, false));
        let captured = capturing.select(&capture, &exit, 0..4);
        assert_eq!(captured.span(), 0..4);
        assert_eq!(captured.group(0), &[0..4]);
        assert_eq!(captured.group(1), &[1..4]);
        assert_eq!(captured.group(2), &[2..3]);
        assert_eq!(captured.group(3), &[4..4]);
        assert_eq!(captured.last(3), Some(4..4));
        assert!(captured.group(9).is_empty());
        assert_eq!(captured.len(), 3);
    }
}
