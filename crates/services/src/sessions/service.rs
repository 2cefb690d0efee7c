use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;

use quiz_core::model::{
    AnswerKey, Attempt, AttemptItem, ModePolicy, Question, ScoreReport,
};
use quiz_core::timer::CountdownTimer;

use crate::error::SessionError;
use super::progress::SessionProgress;

//
// ─── STATES ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of the session as a whole. `Expired` is reachable only from
/// `Active`, via timer exhaustion; both terminal states disable input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Completed,
    Expired,
}

impl SessionState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Answer lifecycle of a single question within the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestionPhase {
    /// No recorded answer yet; a pending selection may be overwritten.
    Answering,
    /// Answer recorded, feedback deferred until the attempt finishes.
    Locked,
    /// Answer recorded, correctness and rationale visible.
    Revealed,
}

#[derive(Debug, Clone, Default)]
struct Slot {
    pending: Option<AnswerKey>,
    item: Option<AttemptItem>,
    revealed: bool,
}

impl Slot {
    fn phase(&self) -> QuestionPhase {
        match (&self.item, self.revealed) {
            (None, _) => QuestionPhase::Answering,
            (Some(_), false) => QuestionPhase::Locked,
            (Some(_), true) => QuestionPhase::Revealed,
        }
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// In-memory state machine for one attempt.
///
/// One implementation serves practice, test and exam delivery; the
/// differences live entirely in the `ModePolicy` value. The question list
/// is the attempt's persisted ID list and is never reshuffled here.
///
/// Persistence is decoupled: recorded items accumulate in an outbox that
/// the loop service drains, so a slow or failing backend never blocks a
/// state transition.
pub struct SessionService {
    attempt: Attempt,
    policy: ModePolicy,
    questions: Vec<Question>,
    slots: Vec<Slot>,
    current: usize,
    timer: CountdownTimer,
    state: SessionState,
    outbox: VecDeque<AttemptItem>,
    dirty: bool,
    last_snapshot_elapsed: u32,
}

impl SessionService {
    /// Build a fresh session over a newly created attempt.
    ///
    /// `questions` must be the attempt's persisted ID list, already
    /// re-ordered by the caller.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::QuestionListMismatch` when the loaded
    /// questions do not line up with the attempt's list.
    pub fn new(attempt: Attempt, questions: Vec<Question>) -> Result<Self, SessionError> {
        Self::build(attempt, questions, Vec::new(), None)
    }

    /// Rebuild a session from persisted state, replaying recorded answers.
    ///
    /// The durable attempt ID is the only required input to get here; no
    /// in-memory navigation state survives a reload, and none is needed.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::QuestionListMismatch` on question/list
    /// disagreement, or `SessionError::Attempt` if finalizing an attempt
    /// whose timer ran out while it was away fails.
    pub fn resume(
        attempt: Attempt,
        questions: Vec<Question>,
        items: Vec<AttemptItem>,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        Self::build(attempt, questions, items, Some(now))
    }

    fn build(
        attempt: Attempt,
        questions: Vec<Question>,
        items: Vec<AttemptItem>,
        resume_now: Option<DateTime<Utc>>,
    ) -> Result<Self, SessionError> {
        let ids = attempt.question_ids();
        if questions.len() != ids.len()
            || questions.iter().zip(ids).any(|(q, id)| q.id() != *id)
        {
            return Err(SessionError::QuestionListMismatch);
        }

        let policy = attempt.mode().policy();
        let limit = if policy.timed { attempt.time_limit_secs() } else { 0 };
        let timer = CountdownTimer::from_elapsed(limit, attempt.duration_secs());
        let finished = attempt.is_finished();

        let mut slots: Vec<Slot> = vec![Slot::default(); questions.len()];
        for item in items {
            let index = usize::try_from(item.position)
                .map_err(|_| SessionError::QuestionListMismatch)?;
            let slot = slots
                .get_mut(index)
                .ok_or(SessionError::QuestionListMismatch)?;
            if slot.item.is_some() || questions[index].id() != item.question_id {
                return Err(SessionError::QuestionListMismatch);
            }
            slot.revealed = finished || policy.immediate_feedback;
            slot.item = Some(item);
        }

        let current = slots
            .iter()
            .position(|slot| slot.item.is_none())
            .unwrap_or_else(|| slots.len().saturating_sub(1));

        let mut session = Self {
            attempt,
            policy,
            questions,
            slots,
            current,
            timer,
            state: if finished {
                SessionState::Completed
            } else {
                SessionState::Active
            },
            outbox: VecDeque::new(),
            dirty: false,
            last_snapshot_elapsed: 0,
        };
        session.last_snapshot_elapsed = session.timer.elapsed_secs();

        // a timed attempt whose budget ran out while it was away is
        // force-finished on resume
        if session.state == SessionState::Active && session.timer.is_expired() {
            let now = resume_now.unwrap_or_else(|| session.attempt.started_at());
            session.complete(now, SessionState::Expired)?;
        }

        Ok(session)
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn attempt(&self) -> &Attempt {
        &self.attempt
    }

    #[must_use]
    pub fn policy(&self) -> ModePolicy {
        self.policy
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current)
    }

    #[must_use]
    pub fn question_phase(&self, index: usize) -> Option<QuestionPhase> {
        self.slots.get(index).map(Slot::phase)
    }

    #[must_use]
    pub fn current_phase(&self) -> QuestionPhase {
        self.slots
            .get(self.current)
            .map_or(QuestionPhase::Answering, Slot::phase)
    }

    /// The not-yet-submitted choice on the current question.
    #[must_use]
    pub fn pending_selection(&self) -> Option<AnswerKey> {
        self.slots.get(self.current).and_then(|slot| slot.pending)
    }

    /// The recorded answer for a question, once submitted.
    #[must_use]
    pub fn recorded_item(&self, index: usize) -> Option<&AttemptItem> {
        self.slots.get(index).and_then(|slot| slot.item.as_ref())
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.item.is_some()).count()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.is_terminal()
    }

    /// Seconds left on the countdown; `None` for untimed sessions.
    #[must_use]
    pub fn remaining_secs(&self) -> Option<u32> {
        self.timer.remaining_secs()
    }

    /// Foreground seconds consumed so far.
    #[must_use]
    pub fn elapsed_secs(&self) -> u32 {
        self.timer.elapsed_secs()
    }

    /// Returns a summary of the current session progress.
    #[must_use]
    pub fn progress(&self) -> SessionProgress {
        let answered = self.answered_count();
        SessionProgress {
            total: self.questions.len(),
            answered,
            remaining: self.questions.len().saturating_sub(answered),
            is_complete: self.is_complete(),
            remaining_secs: self.remaining_secs(),
        }
    }

    /// Score over the answers recorded so far.
    #[must_use]
    pub fn score_report(&self) -> ScoreReport {
        let items: Vec<AttemptItem> = self
            .slots
            .iter()
            .filter_map(|slot| slot.item.clone())
            .collect();
        ScoreReport::from_items(&items)
    }

    //
    // ─── ANSWERING ─────────────────────────────────────────────────────────────
    //

    /// Choose an option on the current question.
    ///
    /// Re-selection before submission overwrites the pending choice; once an
    /// answer is recorded the selection is locked.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AlreadyFinished` in terminal states,
    /// `SessionError::AlreadyAnswered` once recorded, and
    /// `SessionError::InvalidSelection` for keys past the option list.
    pub fn select(&mut self, key: AnswerKey) -> Result<(), SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::AlreadyFinished);
        }
        let Some(question) = self.questions.get(self.current) else {
            return Err(SessionError::QuestionListMismatch);
        };
        if !question.accepts(key) {
            return Err(SessionError::InvalidSelection { key });
        }
        let slot = &mut self.slots[self.current];
        if slot.item.is_some() {
            return Err(SessionError::AlreadyAnswered);
        }
        slot.pending = Some(key);
        Ok(())
    }

    /// Submit the pending selection on the current question.
    ///
    /// Correctness is computed against the normalized key, the immutable
    /// answer record is queued for persistence and the attempt counters are
    /// updated. Feedback is revealed immediately or withheld per the mode
    /// policy. Recording the final unanswered question finishes the
    /// attempt.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NoSelection` without a pending choice,
    /// `SessionError::AlreadyAnswered` on a recorded question, and
    /// `SessionError::AlreadyFinished` in terminal states.
    pub fn submit_current(&mut self, now: DateTime<Utc>) -> Result<AttemptItem, SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::AlreadyFinished);
        }
        let Some(question) = self.questions.get(self.current) else {
            return Err(SessionError::QuestionListMismatch);
        };
        let slot = &self.slots[self.current];
        if slot.item.is_some() {
            return Err(SessionError::AlreadyAnswered);
        }
        let Some(selected) = slot.pending else {
            return Err(SessionError::NoSelection);
        };

        let position = u32::try_from(self.current)
            .map_err(|_| SessionError::QuestionListMismatch)?;
        let item = AttemptItem::new(
            self.attempt.id(),
            question.id(),
            selected,
            question.correct_key(),
            question.topic(),
            position,
            now,
        );

        self.attempt.record_answer(item.is_correct())?;
        let slot = &mut self.slots[self.current];
        slot.item = Some(item.clone());
        slot.revealed = self.policy.immediate_feedback;
        self.outbox.push_back(item.clone());
        self.dirty = true;

        if self.slots.iter().all(|slot| slot.item.is_some()) {
            self.complete(now, SessionState::Completed)?;
        }

        Ok(item)
    }

    /// Finish the attempt explicitly. Unanswered questions stay unanswered.
    ///
    /// Idempotent: finishing a terminal session just returns its report.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Attempt` if the finish timestamp precedes the
    /// start.
    pub fn finish(&mut self, now: DateTime<Utc>) -> Result<ScoreReport, SessionError> {
        if self.state == SessionState::Active {
            self.complete(now, SessionState::Completed)?;
        }
        Ok(self.score_report())
    }

    fn complete(
        &mut self,
        now: DateTime<Utc>,
        terminal: SessionState,
    ) -> Result<(), SessionError> {
        self.attempt.finish(now, self.timer.elapsed_secs())?;
        // deferred feedback unlocks once the whole attempt is done
        for slot in &mut self.slots {
            if slot.item.is_some() {
                slot.revealed = true;
            }
        }
        self.state = terminal;
        self.dirty = true;
        Ok(())
    }

    //
    // ─── TIMER ─────────────────────────────────────────────────────────────────
    //

    /// Advance one second of foreground time.
    ///
    /// Returns `true` on the tick that exhausts the countdown; the session
    /// moves to `Expired` and is force-finished with every unanswered
    /// question left unanswered. Duplicate callbacks after expiry are
    /// no-ops.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Attempt` if force-finishing fails.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<bool, SessionError> {
        if self.state.is_terminal() {
            return Ok(false);
        }
        if self.timer.tick() {
            self.complete(now, SessionState::Expired)?;
            return Ok(true);
        }
        self.attempt.record_elapsed(self.timer.elapsed_secs());
        Ok(false)
    }

    /// Record a tab visibility transition; hidden sessions consume no time.
    pub fn set_visible(&mut self, visible: bool) {
        self.timer.set_visible(visible);
    }

    //
    // ─── NAVIGATION ────────────────────────────────────────────────────────────
    //

    /// Move to the next question; clamps at the end. No-op once terminal.
    pub fn go_next(&mut self) {
        if !self.state.is_terminal() && !self.questions.is_empty() {
            self.current = (self.current + 1).min(self.questions.len() - 1);
        }
    }

    /// Move to the previous question; clamps at the start. No-op once
    /// terminal.
    pub fn go_prev(&mut self) {
        if !self.state.is_terminal() {
            self.current = self.current.saturating_sub(1);
        }
    }

    /// Jump to an index; out-of-bounds indices clamp rather than error.
    pub fn jump_to(&mut self, index: usize) {
        if !self.state.is_terminal() && !self.questions.is_empty() {
            self.current = index.min(self.questions.len() - 1);
        }
    }

    //
    // ─── PERSISTENCE BOOKKEEPING ───────────────────────────────────────────────
    //

    pub(crate) fn take_unsynced(&mut self) -> Vec<AttemptItem> {
        self.outbox.drain(..).collect()
    }

    pub(crate) fn requeue_unsynced(&mut self, items: Vec<AttemptItem>) {
        for item in items.into_iter().rev() {
            self.outbox.push_front(item);
        }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty || !self.outbox.is_empty()
    }

    pub(crate) fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn snapshot_due(&self, interval_secs: u32) -> bool {
        self.timer
            .elapsed_secs()
            .saturating_sub(self.last_snapshot_elapsed)
            >= interval_secs
    }

    pub(crate) fn mark_snapshotted(&mut self) {
        self.last_snapshot_elapsed = self.timer.elapsed_secs();
    }
}

impl fmt::Debug for SessionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionService")
            .field("attempt_id", &self.attempt.id())
            .field("mode", &self.attempt.mode())
            .field("questions_len", &self.questions.len())
            .field("current", &self.current)
            .field("answered", &self.answered_count())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{
        AttemptDraft, Difficulty, Mode, QuestionId, QuestionOption, ReviewStatus, UserId,
    };
    use quiz_core::time::fixed_now;
    use uuid::Uuid;

    fn build_question(id: u64, topic: &str) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Stem {id}"),
            vec![
                QuestionOption::new("first"),
                QuestionOption::new("second"),
                QuestionOption::new("third"),
                QuestionOption::new("fourth"),
            ],
            AnswerKey::B,
            "math-basic",
            topic,
            None,
            Difficulty::Easy,
            ReviewStatus::Approved,
        )
        .unwrap()
    }

    fn build_session(mode: Mode, n: u64, time_limit_secs: u32) -> SessionService {
        let questions: Vec<Question> =
            (1..=n).map(|id| build_question(id, "algebra")).collect();
        let attempt = AttemptDraft {
            user_id: UserId::new(Uuid::nil()),
            mode,
            exam_type: "math-basic".into(),
            topic: Some("algebra".into()),
            question_ids: questions.iter().map(Question::id).collect(),
            time_limit_secs,
            started_at: fixed_now(),
        }
        .validate()
        .unwrap()
        .assign_id(quiz_core::model::AttemptId::new(1));

        SessionService::new(attempt, questions).unwrap()
    }

    #[test]
    fn mismatched_questions_are_rejected() {
        let questions = vec![build_question(1, "algebra")];
        let attempt = AttemptDraft {
            user_id: UserId::new(Uuid::nil()),
            mode: Mode::Practice,
            exam_type: "math-basic".into(),
            topic: None,
            question_ids: vec![QuestionId::new(2)],
            time_limit_secs: 0,
            started_at: fixed_now(),
        }
        .validate()
        .unwrap()
        .assign_id(quiz_core::model::AttemptId::new(1));

        assert!(matches!(
            SessionService::new(attempt, questions),
            Err(SessionError::QuestionListMismatch)
        ));
    }

    #[test]
    fn reselect_overwrites_until_submission_locks() {
        let mut session = build_session(Mode::Practice, 2, 0);

        session.select(AnswerKey::A).unwrap();
        session.select(AnswerKey::C).unwrap();
        assert_eq!(session.pending_selection(), Some(AnswerKey::C));

        let item = session.submit_current(fixed_now()).unwrap();
        assert!(!item.is_correct());
        assert_eq!(session.current_phase(), QuestionPhase::Revealed);

        // locked after reveal
        assert!(matches!(
            session.select(AnswerKey::B),
            Err(SessionError::AlreadyAnswered)
        ));
        assert!(matches!(
            session.submit_current(fixed_now()),
            Err(SessionError::AlreadyAnswered)
        ));
    }

    #[test]
    fn submit_without_selection_fails() {
        let mut session = build_session(Mode::Practice, 1, 0);
        assert!(matches!(
            session.submit_current(fixed_now()),
            Err(SessionError::NoSelection)
        ));
    }

    #[test]
    fn selection_outside_option_list_fails() {
        let mut session = build_session(Mode::Practice, 1, 0);
        assert!(matches!(
            session.select(AnswerKey::E),
            Err(SessionError::InvalidSelection { key: AnswerKey::E })
        ));
    }

    #[test]
    fn exam_mode_defers_feedback_until_finish() {
        let mut session = build_session(Mode::Exam, 2, 600);

        session.select(AnswerKey::B).unwrap();
        session.submit_current(fixed_now()).unwrap();
        assert_eq!(session.question_phase(0), Some(QuestionPhase::Locked));

        session.go_next();
        session.select(AnswerKey::A).unwrap();
        session.submit_current(fixed_now()).unwrap();

        // answering the final question finishes the attempt and unlocks
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.question_phase(0), Some(QuestionPhase::Revealed));
        assert_eq!(session.question_phase(1), Some(QuestionPhase::Revealed));
    }

    #[test]
    fn answering_every_question_completes_and_scores() {
        let mut session = build_session(Mode::Practice, 3, 0);
        let keys = [AnswerKey::B, AnswerKey::B, AnswerKey::A];
        for key in keys {
            session.select(key).unwrap();
            session.submit_current(fixed_now()).unwrap();
            session.go_next();
        }

        assert_eq!(session.state(), SessionState::Completed);
        let report = session.finish(fixed_now()).unwrap();
        assert_eq!(report.correct, 2);
        assert_eq!(report.total, 3);
        assert_eq!(report.percentage, 67);
        assert!(session.attempt().is_finished());
    }

    #[test]
    fn finish_is_idempotent_on_the_session() {
        let mut session = build_session(Mode::Practice, 2, 0);
        session.select(AnswerKey::B).unwrap();
        session.submit_current(fixed_now()).unwrap();

        let first = session.finish(fixed_now()).unwrap();
        let again = session
            .finish(fixed_now() + chrono::Duration::seconds(30))
            .unwrap();

        assert_eq!(first, again);
        assert_eq!(session.attempt().total_attempted(), 1);
        assert_eq!(session.attempt().finished_at(), Some(fixed_now()));
    }

    #[test]
    fn navigation_clamps_and_dies_with_the_session() {
        let mut session = build_session(Mode::Practice, 3, 0);

        session.go_prev();
        assert_eq!(session.current_index(), 0);

        session.jump_to(99);
        assert_eq!(session.current_index(), 2);

        session.go_next();
        assert_eq!(session.current_index(), 2);

        session.jump_to(1);
        assert_eq!(session.current_index(), 1);

        session.finish(fixed_now()).unwrap();
        session.go_next();
        session.jump_to(0);
        assert_eq!(session.current_index(), 1);
    }

    #[test]
    fn timer_exhaustion_expires_and_force_finishes() {
        let mut session = build_session(Mode::Test, 10, 5);
        session.select(AnswerKey::B).unwrap();
        session.submit_current(fixed_now()).unwrap();
        session.go_next();

        let mut fired = 0;
        for _ in 0..8 {
            if session.tick(fixed_now()).unwrap() {
                fired += 1;
            }
        }

        assert_eq!(fired, 1);
        assert_eq!(session.state(), SessionState::Expired);
        assert!(session.attempt().is_finished());
        assert_eq!(session.attempt().total_attempted(), 1);
        assert_eq!(session.attempt().duration_secs(), 5);

        // unanswered questions stay unanswered, input stays dead
        assert!(matches!(
            session.select(AnswerKey::A),
            Err(SessionError::AlreadyFinished)
        ));
    }

    #[test]
    fn hidden_session_consumes_no_time() {
        let mut session = build_session(Mode::Test, 2, 60);
        session.set_visible(false);
        for _ in 0..30 {
            session.tick(fixed_now()).unwrap();
        }

        assert_eq!(session.remaining_secs(), Some(60));
        assert_eq!(session.state(), SessionState::Active);

        session.set_visible(true);
        session.tick(fixed_now()).unwrap();
        assert_eq!(session.remaining_secs(), Some(59));
    }

    #[test]
    fn untimed_practice_never_expires() {
        let mut session = build_session(Mode::Practice, 2, 0);
        for _ in 0..600 {
            assert!(!session.tick(fixed_now()).unwrap());
        }
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.remaining_secs(), None);
    }

    #[test]
    fn test_mode_ignores_limit_only_when_policy_is_untimed() {
        // practice attempts carry no countdown even if a limit is stored
        let session = build_session(Mode::Practice, 1, 300);
        assert_eq!(session.remaining_secs(), None);

        let timed = build_session(Mode::Test, 1, 300);
        assert_eq!(timed.remaining_secs(), Some(300));
    }

    #[test]
    fn resume_replays_items_and_continues_at_first_unanswered() {
        let mut session = build_session(Mode::Test, 3, 600);
        session.select(AnswerKey::B).unwrap();
        session.submit_current(fixed_now()).unwrap();
        session.tick(fixed_now()).unwrap();

        let attempt = session.attempt().clone();
        let questions: Vec<Question> = (1..=3).map(|id| build_question(id, "algebra")).collect();
        let items = session.take_unsynced();

        let resumed =
            SessionService::resume(attempt, questions, items, fixed_now()).unwrap();

        assert_eq!(resumed.state(), SessionState::Active);
        assert_eq!(resumed.current_index(), 1);
        assert_eq!(resumed.answered_count(), 1);
        assert_eq!(resumed.question_phase(0), Some(QuestionPhase::Revealed));
        assert_eq!(resumed.remaining_secs(), Some(599));
    }

    #[test]
    fn resume_of_exhausted_attempt_expires_immediately() {
        let questions = vec![build_question(1, "algebra")];
        let attempt = quiz_core::model::Attempt::from_persisted(
            quiz_core::model::AttemptId::new(1),
            UserId::new(Uuid::nil()),
            Mode::Test,
            "math-basic".into(),
            None,
            vec![QuestionId::new(1)],
            60,
            fixed_now(),
            None,
            0,
            0,
            60,
        )
        .unwrap();

        let session = SessionService::resume(
            attempt,
            questions,
            Vec::new(),
            fixed_now() + chrono::Duration::seconds(120),
        )
        .unwrap();

        assert_eq!(session.state(), SessionState::Expired);
        assert!(session.attempt().is_finished());
    }
}
