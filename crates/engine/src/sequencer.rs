use std::collections::HashMap;

use exam_core::model::{Attempt, QuestionData, QuestionId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::SessionError;

/// Proof that a fetch was started for a presentation slot.
///
/// The generation lets a late response be told apart from the one the learner
/// is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavTicket {
    pub index: usize,
    pub no: u32,
    generation: u64,
}

/// What navigating to a slot requires.
#[derive(Debug, Clone, PartialEq)]
pub enum Visit {
    /// Already cached; now the displayed question.
    Cached(QuestionData),
    /// Must be fetched by canonical number, then handed to
    /// [`QuestionSequencer::complete`].
    Fetch(NavTicket),
}

/// Where a completed fetch ended up.
#[derive(Debug, Clone, PartialEq)]
pub enum Arrival {
    /// Cached and displayed.
    Shown(QuestionData),
    /// Cached only; the learner has since moved elsewhere.
    Stale,
}

/// Stable shuffled presentation of an attempt's questions and options.
///
/// The question permutation is drawn once at construction. Each question's
/// options are shuffled the first time it is cached and never again.
pub struct QuestionSequencer {
    order: Vec<u32>,
    ids_by_no: HashMap<u32, QuestionId>,
    cache: HashMap<QuestionId, QuestionData>,
    rng: StdRng,
    shuffle_options: bool,
    generation: u64,
    current: Option<usize>,
}

impl QuestionSequencer {
    /// Draw the presentation order for `attempt` and write it back into the
    /// attempt's navigation grid.
    pub fn new(
        attempt: &mut Attempt,
        shuffle_questions: bool,
        shuffle_options: bool,
        mut rng: StdRng,
    ) -> Self {
        let mut order: Vec<u32> = attempt.nav().iter().map(|item| item.original_no).collect();
        if shuffle_questions {
            order.shuffle(&mut rng);
        }
        attempt.apply_presentation(&order);

        let ids_by_no = attempt
            .nav()
            .iter()
            .map(|item| (item.original_no, item.question_id))
            .collect();

        Self {
            order,
            ids_by_no,
            cache: HashMap::new(),
            rng,
            shuffle_options,
            generation: 0,
            current: None,
        }
    }

    /// Canonical numbers by presentation slot.
    #[must_use]
    pub fn presentation_order(&self) -> &[u32] {
        &self.order
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    #[must_use]
    pub fn canonical_no(&self, index: usize) -> Option<u32> {
        self.order.get(index).copied()
    }

    /// Presentation slot of a question.
    #[must_use]
    pub fn index_of(&self, question: QuestionId) -> Option<usize> {
        self.order
            .iter()
            .position(|no| self.ids_by_no.get(no) == Some(&question))
    }

    #[must_use]
    pub fn cached(&self, question: QuestionId) -> Option<&QuestionData> {
        self.cache.get(&question)
    }

    pub fn cached_mut(&mut self, question: QuestionId) -> Option<&mut QuestionData> {
        self.cache.get_mut(&question)
    }

    /// The displayed question, if it has been loaded.
    #[must_use]
    pub fn current(&self) -> Option<&QuestionData> {
        let no = self.canonical_no(self.current?)?;
        self.cache.get(self.ids_by_no.get(&no)?)
    }

    /// Start navigating to presentation slot `index`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::IndexOutOfRange` for a slot past the end.
    pub fn begin(&mut self, index: usize) -> Result<Visit, SessionError> {
        let no = self
            .canonical_no(index)
            .ok_or(SessionError::IndexOutOfRange {
                index,
                len: self.order.len(),
            })?;
        self.generation += 1;

        let cached = self
            .ids_by_no
            .get(&no)
            .and_then(|id| self.cache.get(id))
            .cloned();
        if let Some(question) = cached {
            debug!(index, no, "serving question from cache");
            self.current = Some(index);
            return Ok(Visit::Cached(question));
        }

        Ok(Visit::Fetch(NavTicket {
            index,
            no,
            generation: self.generation,
        }))
    }

    /// Whether `ticket` is still the navigation the learner is waiting on.
    #[must_use]
    pub fn is_current(&self, ticket: &NavTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Cache a fetched question and, if nothing newer was requested since,
    /// display it.
    ///
    /// A question that is already cached keeps its existing option order; the
    /// late copy is discarded.
    pub fn complete(&mut self, ticket: NavTicket, mut fetched: QuestionData) -> Arrival {
        let id = fetched.id();
        self.ids_by_no.entry(ticket.no).or_insert(id);

        if !self.cache.contains_key(&id) {
            if self.shuffle_options {
                fetched.options_mut().shuffle(&mut self.rng);
            }
            fetched.relabel_options();
            self.cache.insert(id, fetched);
        }

        if !self.is_current(&ticket) {
            debug!(index = ticket.index, no = ticket.no, "late question cached, not shown");
            return Arrival::Stale;
        }

        self.current = Some(ticket.index);
        match self.cache.get(&id) {
            Some(question) => Arrival::Shown(question.clone()),
            None => Arrival::Stale,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exam_core::model::{AttemptId, AttemptStatus, OptionData, OptionId};
    use rand::SeedableRng;

    fn attempt(n: u64) -> Attempt {
        Attempt::new(
            AttemptId::new(1),
            AttemptStatus::InProgress,
            600,
            None,
            (1..=n).map(|i| (QuestionId::new(100 + i), false, false)),
        )
        .unwrap()
    }

    fn question(no: u32, options: u64) -> QuestionData {
        let options = (1..=options)
            .map(|i| OptionData {
                id: OptionId::new(u64::from(no) * 10 + i),
                label: String::new(),
                text: format!("choice {i}"),
                image_url: None,
                is_correct: None,
                score: None,
            })
            .collect();
        QuestionData::new(
            QuestionId::new(100 + u64::from(no)),
            no,
            format!("question {no}"),
            None,
            options,
            AttemptStatus::InProgress,
            None,
            false,
            600,
            None,
        )
        .unwrap()
    }

    fn sequencer(attempt: &mut Attempt, seed: u64) -> QuestionSequencer {
        QuestionSequencer::new(attempt, true, true, StdRng::seed_from_u64(seed))
    }

    fn fetch(seq: &mut QuestionSequencer, index: usize) -> QuestionData {
        match seq.begin(index).unwrap() {
            Visit::Cached(q) => q,
            Visit::Fetch(ticket) => match seq.complete(ticket, question(ticket.no, 5)) {
                Arrival::Shown(q) => q,
                Arrival::Stale => panic!("fetch unexpectedly stale"),
            },
        }
    }

    #[test]
    fn presentation_order_is_a_permutation() {
        let mut attempt = attempt(20);
        let seq = sequencer(&mut attempt, 3);
        let mut order = seq.presentation_order().to_vec();
        order.sort_unstable();
        assert_eq!(order, (1..=20).collect::<Vec<_>>());

        let grid: Vec<_> = attempt
            .nav_in_presentation_order()
            .iter()
            .map(|i| i.original_no)
            .collect();
        assert_eq!(grid, seq.presentation_order());
    }

    #[test]
    fn unshuffled_order_is_canonical() {
        let mut attempt = attempt(4);
        let seq = QuestionSequencer::new(&mut attempt, false, false, StdRng::seed_from_u64(1));
        assert_eq!(seq.presentation_order(), &[1, 2, 3, 4]);
    }

    #[test]
    fn revisit_keeps_option_order_and_labels() {
        let mut attempt = attempt(3);
        let mut seq = sequencer(&mut attempt, 11);
        let first = fetch(&mut seq, 1);
        fetch(&mut seq, 0);
        let again = fetch(&mut seq, 1);
        assert_eq!(first.options(), again.options());
        let labels: Vec<_> = again.options().iter().map(|o| o.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B", "C", "D", "E"]);
    }

    #[test]
    fn late_refetch_does_not_reshuffle_cached_question() {
        let mut attempt = attempt(2);
        let mut seq = sequencer(&mut attempt, 5);
        let Visit::Fetch(first) = seq.begin(0).unwrap() else {
            panic!("expected fetch");
        };
        let Visit::Fetch(second) = seq.begin(0).unwrap() else {
            panic!("expected fetch");
        };

        let Arrival::Shown(shown) = seq.complete(second, question(second.no, 5)) else {
            panic!("newest fetch should be shown");
        };
        assert_eq!(seq.complete(first, question(first.no, 5)), Arrival::Stale);
        assert_eq!(seq.cached(shown.id()).unwrap().options(), shown.options());
    }

    #[test]
    fn stale_fetch_is_cached_but_not_displayed() {
        let mut attempt = attempt(3);
        let mut seq = sequencer(&mut attempt, 9);
        let Visit::Fetch(slow) = seq.begin(0).unwrap() else {
            panic!("expected fetch");
        };
        let fast = fetch(&mut seq, 2);

        assert_eq!(seq.complete(slow, question(slow.no, 4)), Arrival::Stale);
        assert_eq!(seq.current_index(), Some(2));
        assert_eq!(seq.current().unwrap().id(), fast.id());

        let no = seq.canonical_no(0).unwrap();
        let id = QuestionId::new(100 + u64::from(no));
        assert!(seq.cached(id).is_some());
        assert!(matches!(seq.begin(0).unwrap(), Visit::Cached(_)));
    }

    #[test]
    fn out_of_range_index_is_an_error() {
        let mut attempt = attempt(2);
        let mut seq = sequencer(&mut attempt, 1);
        assert!(matches!(
            seq.begin(2),
            Err(SessionError::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn same_seed_same_order() {
        let mut a = attempt(10);
        let mut b = attempt(10);
        assert_eq!(
            sequencer(&mut a, 77).presentation_order(),
            sequencer(&mut b, 77).presentation_order()
        );
    }
}
