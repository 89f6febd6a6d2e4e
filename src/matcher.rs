//! Running automata over input.
//!
//! A [`Matcher`] couples a (usually merged) automaton with one capture
//! layout and one result constructor per pattern id.  Scans are driven by
//! [`find_all`](Matcher::find_all): for every start offset the automaton
//! is walked forward, and every accepting position reports one [`Found`]
//! per live pattern, shortest match first and ascending pattern id within
//! a position.  The callback steers the scan through a [`FindAction`].
//!
//! Groups come from the edge annotations recorded in [`Capturing`].
//! Patterns whose automaton reports
//! [`ambiguous_captures`](Automaton::ambiguous_captures) are resolved
//! again over the matched span by a Thompson program built from the
//! pattern, so the groups follow the alternative that actually matched.

use std::fmt;
use std::ops::Range;

use log::debug;

use crate::Error;
use crate::ast::BuildRegex;
use crate::automaton::{Automaton, DEFAULT_MAX_DEPTH, MergeOptions};
use crate::capture::{Capture, Captured, Capturing};
use crate::ids::IdCapture;
use crate::parser::{ParseOptions, Parser};
use crate::scheme::{CharScheme, Scheme};
use crate::template::Template;
use crate::thompson::Program;

/// Builds the user-facing value of a match from the input and its captures.
pub type Constructor<S, T> = Box<dyn Fn(&[<S as Scheme>::Symbol], &Captured) -> T + Send + Sync>;

/// How the scan continues after a match was reported.
///
/// Skip counts are measured from the current start offset.  A skip always
/// advances by at least one symbol.  The `AfterThisPrefix` variants keep
/// reporting longer matches from the current start and take effect once
/// it is exhausted; a later request replaces an earlier one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FindAction {
    /// Keep going: longer matches here, then the next start offset.
    ContinueAll,
    /// Stop the scan now.
    Terminate,
    /// Finish the current start offset, then stop.
    TerminateAfterThisPrefix,
    /// Restart right after the reported match.
    SkipMatchedCharsNow,
    /// Restart after the last reported match once this start is exhausted.
    SkipMatchedCharsAfterThisPrefix,
    /// Restart `n` symbols after the current start offset.
    SkipCharsNow(usize),
    /// Restart `n` symbols after the current start once it is exhausted.
    SkipCharsAfterThisPrefix(usize),
}

/// One reported match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Found<T> {
    pub pattern: usize,
    pub span: Range<usize>,
    pub value: T,
}

pub struct Matcher<S: Scheme, T> {
    automaton: Automaton<S>,
    captures: Vec<Capture>,
    constructors: Vec<Constructor<S, T>>,
    /// Per pattern id; `None` where the edge annotations are exact.
    programs: Vec<Option<Program>>,
}

impl<S: Scheme, T> fmt::Debug for Matcher<S, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("scheme", &S::NAME)
            .field("states", &self.automaton.state_count())
            .field("patterns", &self.automaton.patterns())
            .field("captures", &self.captures)
            .field(
                "resolved",
                &self.programs.iter().filter(|p| p.is_some()).count(),
            )
            .finish()
    }
}

impl<S: Scheme, T> Matcher<S, T> {
    /// # Errors
    ///
    /// [`Error::MissingConstructor`] if some pattern id of the automaton
    /// has no capture layout or no constructor.
    ///
    /// Groups are read from the edge annotations only; use
    /// [`MatcherBuilder`] for patterns with ambiguous captures.
    pub fn new(
        automaton: Automaton<S>,
        captures: Vec<Capture>,
        constructors: Vec<Constructor<S, T>>,
    ) -> Result<Self, Error> {
        let covered = captures.len().min(constructors.len());
        if covered < automaton.patterns() as usize {
            return Err(Error::MissingConstructor(covered));
        }
        Ok(Self {
            automaton,
            captures,
            constructors,
            programs: Vec::new(),
        })
    }

    fn with_programs(mut self, programs: Vec<Option<Program>>) -> Self {
        self.programs = programs;
        self
    }

    pub fn automaton(&self) -> &Automaton<S> {
        &self.automaton
    }

    pub fn capture(&self, pattern: usize) -> Option<&Capture> {
        self.captures.get(pattern)
    }

    /// Whether some pattern matches the whole input.
    pub fn is_match(&self, input: &[S::Symbol]) -> bool {
        self.automaton.is_match(input)
    }

    fn construct(
        &self,
        pattern: u32,
        input: &[S::Symbol],
        capturing: &Capturing,
        exit: &IdCapture,
        span: Range<usize>,
    ) -> Found<T> {
        let pattern = pattern as usize;
        let layout = &self.captures[pattern];
        let resolved = self
            .programs
            .get(pattern)
            .and_then(Option::as_ref)
            .and_then(|program| program.captures::<S>(input, span.clone()));
        let captured = resolved.unwrap_or_else(|| capturing.select(layout, exit, span.clone()));
        let value = (self.constructors[pattern])(input, &captured);
        Found {
            pattern,
            span,
            value,
        }
    }

    /// Every pattern matching the whole input, by ascending id.
    pub fn exact_all(&self, input: &[S::Symbol], capturing: &mut Capturing) -> Vec<Found<T>> {
        capturing.reset();
        let mut state = self.automaton.start();
        let mut live = self.automaton.routes().clone();
        for (pos, &symbol) in input.iter().enumerate() {
            let Some(binding) = self.automaton.node(state).step(S::ordinal(symbol)) else {
                return Vec::new();
            };
            live = live.intersect(&binding.routes);
            if live.is_empty() {
                return Vec::new();
            }
            capturing.update(&binding.capture, pos);
            state = binding.next;
        }
        let node = self.automaton.node(state);
        node.accept
            .intersect(&live)
            .iter()
            .map(|id| self.construct(id, input, capturing, &node.exit, 0..input.len()))
            .collect()
    }

    /// The lowest-id pattern matching the whole input.
    pub fn exact(&self, input: &[S::Symbol], capturing: &mut Capturing) -> Option<Found<T>> {
        self.exact_all(input, capturing).into_iter().next()
    }

    /// Report matches anywhere in `input` to `on_found`.
    ///
    /// Start offsets are tried left to right.  From each start the
    /// automaton runs until it fails or the input ends, reporting every
    /// accepting position.
    pub fn find_all<F>(&self, input: &[S::Symbol], capturing: &mut Capturing, mut on_found: F)
    where
        F: FnMut(Found<T>) -> FindAction,
    {
        let len = input.len();
        let mut start = 0;

        'scan: while start <= len {
            capturing.reset();
            let mut state = self.automaton.start();
            let mut live = self.automaton.routes().clone();
            let mut pos = start;
            let mut resume = None;
            let mut stop = false;

            loop {
                let node = self.automaton.node(state);
                for id in node.accept.intersect(&live).iter() {
                    let found = self.construct(id, input, capturing, &node.exit, start..pos);
                    match on_found(found) {
                        FindAction::ContinueAll => {}
                        FindAction::Terminate => return,
                        FindAction::TerminateAfterThisPrefix => stop = true,
                        FindAction::SkipMatchedCharsNow => {
                            start = advance(start, pos);
                            continue 'scan;
                        }
                        FindAction::SkipMatchedCharsAfterThisPrefix => {
                            resume = Some(advance(start, pos));
                        }
                        FindAction::SkipCharsNow(n) => {
                            start = start.saturating_add(n.max(1));
                            continue 'scan;
                        }
                        FindAction::SkipCharsAfterThisPrefix(n) => {
                            resume = Some(start.saturating_add(n.max(1)));
                        }
                    }
                }

                let Some(&symbol) = input.get(pos) else {
                    break;
                };
                let Some(binding) = node.step(S::ordinal(symbol)) else {
                    break;
                };
                live = live.intersect(&binding.routes);
                if live.is_empty() {
                    break;
                }
                capturing.update(&binding.capture, pos);
                state = binding.next;
                pos += 1;
            }

            if stop {
                return;
            }
            start = resume.unwrap_or(start + 1);
        }
    }

    /// Leftmost match; among those, the shortest, then the lowest id.
    pub fn find_first(&self, input: &[S::Symbol], capturing: &mut Capturing) -> Option<Found<T>> {
        let mut first = None;
        self.find_all(input, capturing, |found| {
            first = Some(found);
            FindAction::Terminate
        });
        first
    }

    /// Leftmost-longest, non-overlapping matches.
    ///
    /// `on_group` receives every pattern matching the longest span at one
    /// start offset and returns whether to keep scanning.
    pub fn find_longest_with<F>(&self, input: &[S::Symbol], capturing: &mut Capturing, mut on_group: F)
    where
        F: FnMut(Vec<Found<T>>) -> bool,
    {
        let mut pending: Vec<Found<T>> = Vec::new();
        let mut stopped = false;
        self.find_all(input, capturing, |found| {
            if let Some(first) = pending.first() {
                if first.span.start != found.span.start {
                    if !on_group(std::mem::take(&mut pending)) {
                        stopped = true;
                        return FindAction::Terminate;
                    }
                } else if found.span.end > first.span.end {
                    pending.clear();
                }
            }
            pending.push(found);
            FindAction::SkipMatchedCharsAfterThisPrefix
        });
        if !stopped && !pending.is_empty() {
            on_group(pending);
        }
    }

    /// All leftmost-longest matches, in input order.
    pub fn find_longest(&self, input: &[S::Symbol], capturing: &mut Capturing) -> Vec<Found<T>> {
        let mut out = Vec::new();
        self.find_longest_with(input, capturing, |group| {
            out.extend(group);
            true
        });
        out
    }
}

/// Restart position after a match `start..end`; never stays in place.
fn advance(start: usize, end: usize) -> usize {
    end.max(start + 1)
}

/// Assembles a [`Matcher`] from several patterns, one id each.
pub struct MatcherBuilder<S: Scheme, T> {
    patterns: Vec<(Automaton<S>, Capture, Option<Program>, Constructor<S, T>)>,
    max_depth: usize,
    allow_overlap: bool,
}

impl<S: Scheme, T> Default for MatcherBuilder<S, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Scheme, T> MatcherBuilder<S, T> {
    pub fn new() -> Self {
        Self {
            patterns: Vec::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            allow_overlap: false,
        }
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Accept pattern sets where one input is accepted by several
    /// patterns.  Off by default: [`build`](Self::build) then fails with
    /// [`Error::OverlappingAccept`].
    pub fn allow_overlap(mut self, allow: bool) -> Self {
        self.allow_overlap = allow;
        self
    }

    /// Add a pattern; it gets the next id.
    pub fn pattern<F>(mut self, regex: &BuildRegex, constructor: F) -> Result<Self, Error>
    where
        F: Fn(&[S::Symbol], &Captured) -> T + Send + Sync + 'static,
    {
        let automaton = regex.compile::<S>()?;
        let layout = regex.capture_layout()?;
        let program = (automaton.ambiguous_captures() && !layout.is_empty()).then(|| {
            let program = Program::new(regex, &layout);
            debug!(
                "pattern {}: ambiguous captures, {} program states",
                self.patterns.len(),
                program.len()
            );
            program
        });
        self.patterns.push((automaton, layout, program, Box::new(constructor)));
        Ok(self)
    }

    pub fn build(self) -> Result<Matcher<S, T>, Error> {
        let mut patterns = self.patterns.into_iter();
        let Some((mut automaton, layout, program, constructor)) = patterns.next() else {
            return Err(Error::NoPatterns);
        };
        let mut captures = vec![layout];
        let mut programs = vec![program];
        let mut constructors = vec![constructor];

        for (next, layout, program, constructor) in patterns {
            let options = MergeOptions {
                id_offset: Some(automaton.patterns()),
                capture_offset: Some(automaton.captures()),
                max_depth: self.max_depth,
                allow_overlap: self.allow_overlap,
            };
            captures.push(layout.with_base(automaton.captures()));
            automaton = automaton.merge_alternate_pattern(&next, &options)?;
            programs.push(program);
            constructors.push(constructor);
        }

        debug!(
            "matcher: {} patterns, {} states, {} capture slots",
            constructors.len(),
            automaton.state_count(),
            automaton.captures()
        );
        Ok(Matcher::new(automaton, captures, constructors)?.with_programs(programs))
    }
}

/// A single text pattern with captures.
///
/// Offsets in results are UTF-16 code unit offsets into the searched text.
#[derive(Debug)]
pub struct Regex {
    pattern: String,
    matcher: Matcher<CharScheme, Captured>,
}

impl Regex {
    pub fn new(pattern: &str) -> Result<Self, Error> {
        Self::with_options(pattern, ParseOptions::default())
    }

    pub fn with_options(pattern: &str, options: ParseOptions) -> Result<Self, Error> {
        let regex = Parser::with_options(pattern, options).parse()?;
        Self::from_build_regex(pattern, &regex)
    }

    /// Wrap an already parsed pattern; `pattern` is kept for display only.
    pub fn from_build_regex(pattern: &str, regex: &BuildRegex) -> Result<Self, Error> {
        let matcher = MatcherBuilder::<CharScheme, Captured>::new()
            .pattern(regex, |_, captured: &Captured| captured.clone())?
            .build()?;
        Ok(Self {
            pattern: pattern.to_string(),
            matcher,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn automaton(&self) -> &Automaton<CharScheme> {
        self.matcher.automaton()
    }

    pub fn matcher(&self) -> &Matcher<CharScheme, Captured> {
        &self.matcher
    }

    /// Whether the whole of `text` matches.
    pub fn is_match(&self, text: &str) -> bool {
        self.matcher.is_match(&CharScheme::encode(text))
    }

    /// Captures of a whole-text match.
    pub fn captures(&self, text: &str) -> Option<Captured> {
        let units = CharScheme::encode(text);
        let mut capturing = Capturing::new();
        self.matcher.exact(&units, &mut capturing).map(|found| found.value)
    }

    /// Leftmost, shortest match.
    pub fn find(&self, text: &str) -> Option<Range<usize>> {
        let units = CharScheme::encode(text);
        let mut capturing = Capturing::new();
        self.matcher
            .find_first(&units, &mut capturing)
            .map(|found| found.span)
    }

    /// Leftmost-longest, non-overlapping matches.
    pub fn find_iter(&self, text: &str) -> Vec<Captured> {
        let units = CharScheme::encode(text);
        let mut capturing = Capturing::new();
        self.matcher
            .find_longest(&units, &mut capturing)
            .into_iter()
            .map(|found| found.value)
            .collect()
    }

    /// Replace every leftmost-longest match through `template`.
    pub fn replace_all(&self, text: &str, template: &Template) -> String {
        let units = CharScheme::encode(text);
        let mut capturing = Capturing::new();
        let mut out = String::with_capacity(text.len());
        let mut copied = 0;
        for found in self.matcher.find_longest(&units, &mut capturing) {
            out.push_str(&CharScheme::decode(&units[copied..found.span.start]));
            template.expand(&units, &found.value, &mut out);
            copied = found.span.end;
        }
        out.push_str(&CharScheme::decode(&units[copied..]));
        out
    }
}
