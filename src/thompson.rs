//! Thompson program used to resolve the groups of a match.
//!
//! Alternatives sharing a symbol are merged into one deterministic edge,
//! so when they annotate that symbol differently the merged edge carries
//! both annotations.  For such patterns the matcher replays the matched
//! span through a Thompson NFA of the pattern.  Threads are kept in
//! priority order (earlier alternation branches first, loop bodies before
//! the loop exit, except for limiting loops) and every thread carries its
//! own group occurrences.  The first thread reaching `Match` at the end
//! of the span decides the groups.

use std::ops::Range;

use crate::ast::BuildRegex;
use crate::capture::{Capture, Captured};
use crate::graph::LoopPolicy;
use crate::scheme::Scheme;

/// A single program state.
///
/// `Split`, `Open` and `Close` are followed during
/// [`Run::addstate`]; `Class` is stepped over in [`Program::captures`].
#[derive(Clone, Debug)]
enum State {
    /// Epsilon fork: `out` has priority over `out1`.
    Split { out: usize, out1: usize },
    /// Consume one ordinal out of sorted ranges.  No range: dead end.
    Class { ranges: Box<[Range<u32>]>, out: usize },
    /// Start a new occurrence of the group at declared index `group`.
    Open { group: usize, out: usize },
    /// End the latest occurrence of `group` at the current position.
    Close { group: usize, out: usize },
    Match,
}

/// Occurrences per declared group.
type Groups = Vec<Vec<Range<usize>>>;

#[derive(Debug)]
struct Thread {
    state: usize,
    groups: Groups,
}

#[derive(Clone, Debug)]
pub(crate) struct Program {
    states: Vec<State>,
    start: usize,
    groups: usize,
}

impl Program {
    pub(crate) fn new(regex: &BuildRegex, layout: &Capture) -> Self {
        let mut program = Self {
            states: vec![State::Match],
            start: 0,
            groups: layout.len(),
        };
        program.start = program.emit(regex, layout, 0);
        program
    }

    pub(crate) fn len(&self) -> usize {
        self.states.len()
    }

    fn state(&mut self, state: State) -> usize {
        self.states.push(state);
        self.states.len() - 1
    }

    /// Emit `regex` in front of `out` and return its entry state.
    fn emit(&mut self, regex: &BuildRegex, layout: &Capture, out: usize) -> usize {
        match regex {
            BuildRegex::Class(ranges) => self.state(State::Class {
                ranges: ranges.clone().into_boxed_slice(),
                out,
            }),
            BuildRegex::Sequence(items) => items
                .iter()
                .rev()
                .fold(out, |next, item| self.emit(item, layout, next)),
            BuildRegex::Select(branches) => {
                let Some((last, rest)) = branches.split_last() else {
                    return self.state(State::Class {
                        ranges: Box::new([]),
                        out,
                    });
                };
                let mut entry = self.emit(last, layout, out);
                for branch in rest.iter().rev() {
                    let first = self.emit(branch, layout, out);
                    entry = self.state(State::Split { out: first, out1: entry });
                }
                entry
            }
            BuildRegex::Repeat { body, counts } => {
                let max = counts.last().copied().unwrap_or(0);
                let mut next = out;
                for k in (0..max).rev() {
                    let again = self.emit(body, layout, next);
                    next = if counts.binary_search(&k).is_ok() {
                        self.state(State::Split { out: again, out1: out })
                    } else {
                        again
                    };
                }
                next
            }
            BuildRegex::RepeatInfinite { body, min, policy } => {
                // Patched once the body is emitted.
                let fork = self.state(State::Match);
                let again = self.emit(body, layout, fork);
                self.states[fork] = match policy {
                    LoopPolicy::Plain | LoopPolicy::ExclusiveExtending => {
                        State::Split { out: again, out1: out }
                    }
                    LoopPolicy::ExclusiveLimiting => State::Split { out, out1: again },
                };
                let mut entry = fork;
                for _ in 0..*min {
                    entry = self.emit(body, layout, entry);
                }
                entry
            }
            BuildRegex::Optional(body) => {
                let taken = self.emit(body, layout, out);
                self.state(State::Split { out: taken, out1: out })
            }
            BuildRegex::Capture { label, body } => {
                let Some(position) = layout.position_of(label) else {
                    return self.emit(body, layout, out);
                };
                let group = position - 1;
                let close = self.state(State::Close { group, out });
                let inner = self.emit(body, layout, close);
                self.state(State::Open { group, out: inner })
            }
        }
    }

    /// Groups of the highest-priority parse of exactly `input[span]`, or
    /// `None` if the program does not accept it.
    pub(crate) fn captures<S: Scheme>(&self, input: &[S::Symbol], span: Range<usize>) -> Option<Captured> {
        let mut run = Run {
            program: self,
            lastlist: vec![usize::MAX; self.states.len()],
            listid: 0,
            clist: Vec::new(),
            nlist: Vec::new(),
        };
        run.addstate(self.start, vec![Vec::new(); self.groups], span.start);
        run.swap();

        for pos in span.clone() {
            let ordinal = S::ordinal(*input.get(pos)?);
            for thread in std::mem::take(&mut run.clist) {
                if let State::Class { ranges, out } = &self.states[thread.state]
                    && ranges.iter().any(|r| r.contains(&ordinal))
                {
                    run.addstate(*out, thread.groups, pos + 1);
                }
            }
            run.swap();
            if run.clist.is_empty() {
                return None;
            }
        }

        let thread = run
            .clist
            .into_iter()
            .find(|thread| matches!(self.states[thread.state], State::Match))?;
        Some(Captured::new(span, thread.groups))
    }
}

struct Run<'a> {
    program: &'a Program,
    /// Per-state deduplication stamp (compared against `listid`).
    lastlist: Vec<usize>,
    listid: usize,
    clist: Vec<Thread>,
    nlist: Vec<Thread>,
}

impl Run<'_> {
    fn swap(&mut self) {
        std::mem::swap(&mut self.clist, &mut self.nlist);
        self.nlist.clear();
        self.listid += 1;
    }

    /// Follow epsilon transitions from `state`, appending the consuming
    /// and accepting states reached to `nlist` in priority order.
    ///
    /// A state already reached in this step was reached by a thread of
    /// higher priority, so the later arrival is dropped.
    fn addstate(&mut self, state: usize, groups: Groups, pos: usize) {
        let program = self.program;
        let mut stack = vec![(state, groups)];
        while let Some((idx, mut groups)) = stack.pop() {
            if self.lastlist[idx] == self.listid {
                continue;
            }
            self.lastlist[idx] = self.listid;
            match &program.states[idx] {
                State::Split { out, out1 } => {
                    stack.push((*out1, groups.clone()));
                    stack.push((*out, groups));
                }
                State::Open { group, out } => {
                    groups[*group].push(pos..pos);
                    stack.push((*out, groups));
                }
                State::Close { group, out } => {
                    if let Some(last) = groups[*group].last_mut() {
                        last.end = pos;
                    }
                    stack.push((*out, groups));
                }
                State::Class { .. } | State::Match => self.nlist.push(Thread { state: idx, groups }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use crate::scheme::CharScheme;

    fn groups(pattern: &str, text: &str) -> Option<Vec<Vec<Range<usize>>>> {
        let regex = Parser::new(pattern).parse().expect("parse");
        let layout = regex.capture_layout().expect("layout");
        let program = Program::new(&regex, &layout);
        let units = CharScheme::encode(text);
        let captured = program.captures::<CharScheme>(&units, 0..units.len())?;
        Some((1..=captured.len()).map(|g| captured.group(g).to_vec()).collect())
    }

    #[test]
    fn test_first_alternative_wins() {
        assert_eq!(groups("(a)b|a(c)", "ab"), Some(vec![vec![0..1], vec![]]));
        assert_eq!(groups("(a)b|a(c)", "ac"), Some(vec![vec![], vec![1..2]]));
        assert_eq!(groups("(a)|(a)", "a"), Some(vec![vec![0..1], vec![]]));
        assert_eq!(groups("(a)b|a(c)", "ad"), None);
    }

    #[test]
    fn test_loop_priorities() {
        assert_eq!(groups("(x*)x", "xxx"), Some(vec![vec![0..2]]));
        assert_eq!(groups("(x*)x", "x"), Some(vec![vec![0..0]]));
        assert_eq!(groups("(x*!)x*", "xx"), Some(vec![vec![0..0]]));
        assert_eq!(groups("(a|b)*", "ab"), Some(vec![vec![0..1, 1..2]]));
    }

    #[test]
    fn test_counted_and_optional() {
        assert_eq!(groups("(a){2,3}a?", "aaa"), Some(vec![vec![0..1, 1..2, 2..3]]));
        assert_eq!(groups("(a)?a", "a"), Some(vec![vec![]]));
        assert_eq!(groups("((a)b)+", "abab"), Some(vec![vec![0..2, 2..4], vec![0..1, 2..3]]));
    }

    #[test]
    fn test_nullable_body_in_loop_terminates() {
        // An iteration that consumes nothing leads back to the loop fork,
        // which the higher-priority exit thread already claimed.
        assert_eq!(groups("(a?)*b", "b"), Some(vec![vec![]]));
        assert_eq!(groups("(a?)*b", "ab"), Some(vec![vec![0..1]]));
        assert_eq!(groups("(a*)*", ""), Some(vec![vec![]]));
    }
}
