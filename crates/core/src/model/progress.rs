use chrono::{DateTime, Utc};

use crate::model::{AnswerKey, DeviceId, QuestionId, UserId};

/// Who owns a progress record: an authenticated user or an anonymous device.
///
/// The two never merge; a device record stays a device record even after the
/// same person signs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressOwner {
    User(UserId),
    Device(DeviceId),
}

impl ProgressOwner {
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::User(_))
    }
}

/// Untimed, per-owner-per-question engagement record, independent of any
/// attempt.
///
/// Created lazily on first view of a question outside a timed attempt and
/// updated continuously while the question is on screen. The engine never
/// deletes these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionProgress {
    owner: ProgressOwner,
    question_id: QuestionId,
    attempts: u32,
    last_selected: Option<AnswerKey>,
    last_correct: Option<bool>,
    flagged: bool,
    notes: String,
    time_spent_secs: u64,
    last_action_at: DateTime<Utc>,
}

impl QuestionProgress {
    /// Fresh record for a question the owner has just opened.
    #[must_use]
    pub fn new(owner: ProgressOwner, question_id: QuestionId, now: DateTime<Utc>) -> Self {
        Self {
            owner,
            question_id,
            attempts: 0,
            last_selected: None,
            last_correct: None,
            flagged: false,
            notes: String::new(),
            time_spent_secs: 0,
            last_action_at: now,
        }
    }

    /// Rehydrate from persisted storage.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn from_persisted(
        owner: ProgressOwner,
        question_id: QuestionId,
        attempts: u32,
        last_selected: Option<AnswerKey>,
        last_correct: Option<bool>,
        flagged: bool,
        notes: String,
        time_spent_secs: u64,
        last_action_at: DateTime<Utc>,
    ) -> Self {
        Self {
            owner,
            question_id,
            attempts,
            last_selected,
            last_correct,
            flagged,
            notes,
            time_spent_secs,
            last_action_at,
        }
    }

    #[must_use]
    pub fn owner(&self) -> ProgressOwner {
        self.owner
    }

    #[must_use]
    pub fn question_id(&self) -> QuestionId {
        self.question_id
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub fn last_selected(&self) -> Option<AnswerKey> {
        self.last_selected
    }

    #[must_use]
    pub fn last_correct(&self) -> Option<bool> {
        self.last_correct
    }

    #[must_use]
    pub fn is_flagged(&self) -> bool {
        self.flagged
    }

    #[must_use]
    pub fn notes(&self) -> &str {
        &self.notes
    }

    #[must_use]
    pub fn time_spent_secs(&self) -> u64 {
        self.time_spent_secs
    }

    #[must_use]
    pub fn last_action_at(&self) -> DateTime<Utc> {
        self.last_action_at
    }

    /// Record one answer event. The attempts counter increments exactly once
    /// per call, never per render.
    pub fn record_answer(&mut self, selected: AnswerKey, correct: bool, now: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_selected = Some(selected);
        self.last_correct = Some(correct);
        self.last_action_at = now;
    }

    /// Flip the review flag. Self-inverse; does not touch the attempts
    /// counter.
    pub fn toggle_flag(&mut self, now: DateTime<Utc>) {
        self.flagged = !self.flagged;
        self.last_action_at = now;
    }

    pub fn set_notes(&mut self, notes: impl Into<String>, now: DateTime<Utc>) {
        self.notes = notes.into();
        self.last_action_at = now;
    }

    /// Add foreground seconds to the cumulative total. Monotone: the total
    /// never decreases, and accruing zero is a no-op for the counter.
    pub fn accrue_time(&mut self, secs: u64, now: DateTime<Utc>) {
        self.time_spent_secs = self.time_spent_secs.saturating_add(secs);
        self.last_action_at = now;
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use uuid::Uuid;

    fn build_progress() -> QuestionProgress {
        QuestionProgress::new(
            ProgressOwner::User(UserId::new(Uuid::nil())),
            QuestionId::new(1),
            fixed_now(),
        )
    }

    #[test]
    fn record_answer_increments_once_per_call() {
        let mut progress = build_progress();
        progress.record_answer(AnswerKey::B, true, fixed_now());
        progress.record_answer(AnswerKey::C, false, fixed_now());

        assert_eq!(progress.attempts(), 2);
        assert_eq!(progress.last_selected(), Some(AnswerKey::C));
        assert_eq!(progress.last_correct(), Some(false));
    }

    #[test]
    fn double_toggle_restores_flag_and_leaves_attempts() {
        let mut progress = build_progress();
        let initial = progress.is_flagged();

        progress.toggle_flag(fixed_now());
        progress.toggle_flag(fixed_now());

        assert_eq!(progress.is_flagged(), initial);
        assert_eq!(progress.attempts(), 0);
    }

    #[test]
    fn time_accrual_is_monotone() {
        let mut progress = build_progress();
        progress.accrue_time(5, fixed_now());
        progress.accrue_time(0, fixed_now());
        progress.accrue_time(7, fixed_now());

        assert_eq!(progress.time_spent_secs(), 12);
    }

    #[test]
    fn device_owner_is_not_authenticated() {
        let owner = ProgressOwner::Device(DeviceId::generate());
        assert!(!owner.is_authenticated());
        assert!(ProgressOwner::User(UserId::new(Uuid::nil())).is_authenticated());
    }
}
