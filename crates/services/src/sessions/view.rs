use chrono::{DateTime, Utc};
use std::sync::Arc;

use quiz_core::model::{Attempt, AttemptId, Mode, ScoreReport, UserId};
use storage::repository::AttemptRepository;

use crate::Clock;
use crate::error::SessionError;

/// Presentation-agnostic list item for a past attempt.
///
/// This is intentionally **not** a UI view-model:
/// - no pre-formatted strings
/// - no localization assumptions
///
/// The UI may format timestamps (e.g., relative time, locale) as needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptListItem {
    pub id: AttemptId,
    pub mode: Mode,
    pub exam_type: String,
    pub topic: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_attempted: u32,
    pub correct_count: u32,
    pub percentage: u32,
}

impl AttemptListItem {
    #[must_use]
    pub fn from_attempt(attempt: &Attempt) -> Self {
        Self {
            id: attempt.id(),
            mode: attempt.mode(),
            exam_type: attempt.exam_type().to_string(),
            topic: attempt.topic().map(ToString::to_string),
            started_at: attempt.started_at(),
            finished_at: attempt.finished_at(),
            total_attempted: attempt.total_attempted(),
            correct_count: attempt.correct_count(),
            percentage: attempt.percentage(),
        }
    }
}

/// Read-side facade over persisted attempts, hiding repositories and time
/// from the presentation layer.
#[derive(Clone)]
pub struct AttemptReportService {
    clock: Clock,
    attempts: Arc<dyn AttemptRepository>,
}

impl AttemptReportService {
    #[must_use]
    pub fn new(clock: Clock, attempts: Arc<dyn AttemptRepository>) -> Self {
        Self { clock, attempts }
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Fetch an attempt by its durable ID.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` when the attempt is missing or the
    /// repository fails.
    pub async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, SessionError> {
        Ok(self.attempts.get_attempt(id).await?)
    }

    /// Recompute the topic-level score breakdown from an attempt's recorded
    /// answers.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` on repository failures.
    pub async fn score_report(&self, id: AttemptId) -> Result<ScoreReport, SessionError> {
        // ensure the attempt exists so a bad ID is NotFound, not an empty report
        let _ = self.attempts.get_attempt(id).await?;
        let items = self.attempts.list_items(id).await?;
        Ok(ScoreReport::from_items(&items))
    }

    /// List a user's attempts, most recently started first.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` on repository failures.
    pub async fn list_recent_attempts(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<AttemptListItem>, SessionError> {
        let attempts = self.attempts.list_attempts_for_user(user_id, limit).await?;
        Ok(attempts.iter().map(AttemptListItem::from_attempt).collect())
    }
}
