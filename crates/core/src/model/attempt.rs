use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{AttemptId, Mode, QuestionId, UserId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("attempt needs at least one question")]
    EmptyQuestionList,

    #[error("duplicate question in attempt list")]
    DuplicateQuestion,

    #[error("attempt is already finished")]
    AlreadyFinished,

    #[error("answered count {attempted} exceeds question list length {len}")]
    TooManyAnswers { attempted: u32, len: usize },

    #[error("correct count {correct} exceeds answered count {attempted}")]
    CountMismatch { correct: u32, attempted: u32 },

    #[error("finished_at is before started_at")]
    InvalidTimeRange,
}

//
// ─── DRAFT / VALIDATED ─────────────────────────────────────────────────────────
//

/// Configuration captured at session start, before storage has assigned an
/// identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptDraft {
    pub user_id: UserId,
    pub mode: Mode,
    pub exam_type: String,
    pub topic: Option<String>,
    pub question_ids: Vec<QuestionId>,
    /// Seconds; 0 means untimed.
    pub time_limit_secs: u32,
    pub started_at: DateTime<Utc>,
}

impl AttemptDraft {
    /// Validates the draft into an attempt awaiting an identifier.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::EmptyQuestionList` when no questions were
    /// selected and `AttemptError::DuplicateQuestion` when the list repeats
    /// an ID.
    pub fn validate(self) -> Result<ValidatedAttempt, AttemptError> {
        if self.question_ids.is_empty() {
            return Err(AttemptError::EmptyQuestionList);
        }
        let mut seen = std::collections::HashSet::with_capacity(self.question_ids.len());
        for id in &self.question_ids {
            if !seen.insert(*id) {
                return Err(AttemptError::DuplicateQuestion);
            }
        }
        Ok(ValidatedAttempt { draft: self })
    }
}

/// A validated draft; storage assigns the ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAttempt {
    draft: AttemptDraft,
}

impl ValidatedAttempt {
    #[must_use]
    pub fn assign_id(self, id: AttemptId) -> Attempt {
        let d = self.draft;
        Attempt {
            id,
            user_id: d.user_id,
            mode: d.mode,
            exam_type: d.exam_type,
            topic: d.topic,
            question_ids: d.question_ids,
            time_limit_secs: d.time_limit_secs,
            started_at: d.started_at,
            finished_at: None,
            total_attempted: 0,
            correct_count: 0,
            duration_secs: 0,
        }
    }

    #[must_use]
    pub fn draft(&self) -> &AttemptDraft {
        &self.draft
    }
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// One instance of a user working through a fixed, ordered set of questions
/// under a given mode and optional time limit.
///
/// The question-ID list is persisted once at creation and is the sole source
/// of truth for ordering on every subsequent load. Aggregates are mutated
/// only by the owning session and frozen by `finish`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    id: AttemptId,
    user_id: UserId,
    mode: Mode,
    exam_type: String,
    topic: Option<String>,
    question_ids: Vec<QuestionId>,
    time_limit_secs: u32,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    total_attempted: u32,
    correct_count: u32,
    duration_secs: u32,
}

impl Attempt {
    /// Rehydrate an attempt from persisted storage, re-checking the counter
    /// and time-range invariants.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError` when persisted state violates
    /// `correct_count <= total_attempted <= question_ids.len()` or the
    /// timestamps are out of order.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: AttemptId,
        user_id: UserId,
        mode: Mode,
        exam_type: String,
        topic: Option<String>,
        question_ids: Vec<QuestionId>,
        time_limit_secs: u32,
        started_at: DateTime<Utc>,
        finished_at: Option<DateTime<Utc>>,
        total_attempted: u32,
        correct_count: u32,
        duration_secs: u32,
    ) -> Result<Self, AttemptError> {
        if question_ids.is_empty() {
            return Err(AttemptError::EmptyQuestionList);
        }
        if total_attempted as usize > question_ids.len() {
            return Err(AttemptError::TooManyAnswers {
                attempted: total_attempted,
                len: question_ids.len(),
            });
        }
        if correct_count > total_attempted {
            return Err(AttemptError::CountMismatch {
                correct: correct_count,
                attempted: total_attempted,
            });
        }
        if let Some(finished) = finished_at {
            if finished < started_at {
                return Err(AttemptError::InvalidTimeRange);
            }
        }

        Ok(Self {
            id,
            user_id,
            mode,
            exam_type,
            topic,
            question_ids,
            time_limit_secs,
            started_at,
            finished_at,
            total_attempted,
            correct_count,
            duration_secs,
        })
    }

    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    #[must_use]
    pub fn exam_type(&self) -> &str {
        &self.exam_type
    }

    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    #[must_use]
    pub fn question_ids(&self) -> &[QuestionId] {
        &self.question_ids
    }

    /// Seconds; 0 means untimed.
    #[must_use]
    pub fn time_limit_secs(&self) -> u32 {
        self.time_limit_secs
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    #[must_use]
    pub fn total_attempted(&self) -> u32 {
        self.total_attempted
    }

    #[must_use]
    pub fn correct_count(&self) -> u32 {
        self.correct_count
    }

    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    /// Rounded percentage of correct answers among answered questions.
    /// Zero answered means 0%.
    #[must_use]
    pub fn percentage(&self) -> u32 {
        if self.total_attempted == 0 {
            return 0;
        }
        let pct = f64::from(self.correct_count) * 100.0 / f64::from(self.total_attempted);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            pct.round() as u32
        }
    }

    /// Record one answered question in the running aggregates.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::AlreadyFinished` after `finish` and
    /// `AttemptError::TooManyAnswers` when every question already has an
    /// answer on record.
    pub fn record_answer(&mut self, correct: bool) -> Result<(), AttemptError> {
        if self.is_finished() {
            return Err(AttemptError::AlreadyFinished);
        }
        if self.total_attempted as usize >= self.question_ids.len() {
            return Err(AttemptError::TooManyAnswers {
                attempted: self.total_attempted,
                len: self.question_ids.len(),
            });
        }

        self.total_attempted += 1;
        if correct {
            self.correct_count += 1;
        }
        Ok(())
    }

    /// Update the running foreground-time total, as sampled by the session
    /// timer. No-op once finished; `finish` freezes the duration.
    pub fn record_elapsed(&mut self, secs: u32) {
        if !self.is_finished() {
            self.duration_secs = secs;
        }
    }

    /// Finalize the attempt, freezing its aggregates.
    ///
    /// Idempotent: a second call leaves `finished_at`, the counters and the
    /// duration untouched.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::InvalidTimeRange` if `finished_at` would
    /// precede `started_at`.
    pub fn finish(
        &mut self,
        finished_at: DateTime<Utc>,
        duration_secs: u32,
    ) -> Result<(), AttemptError> {
        if self.is_finished() {
            return Ok(());
        }
        if finished_at < self.started_at {
            return Err(AttemptError::InvalidTimeRange);
        }
        self.finished_at = Some(finished_at);
        self.duration_secs = duration_secs;
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
