use chrono::{DateTime, Utc};
use std::collections::HashMap;

use quiz_core::model::{
    Attempt, AttemptDraft, AttemptId, Mode, Question, QuestionId, UserId,
};
use storage::repository::{AttemptRepository, QuestionRepository};

use crate::error::SessionError;
use super::plan::{Selector, SelectorConfig};
use super::service::SessionService;

/// Storage-backed session queries and builders.
pub(crate) struct SessionQueries;

/// Re-order fetched questions by the persisted ID list.
///
/// Repositories return questions in no guaranteed order; the attempt's list
/// is the sole source of truth for ordering.
pub(crate) fn order_questions(
    ids: &[QuestionId],
    fetched: Vec<Question>,
) -> Result<Vec<Question>, SessionError> {
    let mut by_id: HashMap<QuestionId, Question> = fetched
        .into_iter()
        .map(|question| (question.id(), question))
        .collect();

    let mut ordered = Vec::with_capacity(ids.len());
    for id in ids {
        let question = by_id.remove(id).ok_or(SessionError::QuestionListMismatch)?;
        ordered.push(question);
    }
    Ok(ordered)
}

impl SessionQueries {
    /// Select questions, persist the attempt with its fixed ID list, then
    /// load the questions and build the session.
    ///
    /// The ID list is written back before the first question is shown, so a
    /// reload re-fetches the same IDs instead of re-shuffling.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InsufficientQuestions` from the selector and
    /// `SessionError::Storage`/`SessionError::Load` on repository failures.
    #[allow(clippy::too_many_arguments)]
    pub async fn start_from_storage(
        user_id: UserId,
        mode: Mode,
        config: &SelectorConfig,
        time_limit_secs: u32,
        questions: &dyn QuestionRepository,
        attempts: &dyn AttemptRepository,
        now: DateTime<Utc>,
    ) -> Result<SessionService, SessionError> {
        let plan = Selector::select(questions, config).await?;

        let validated = AttemptDraft {
            user_id,
            mode,
            exam_type: config.exam_type.clone(),
            topic: config.topic.clone(),
            question_ids: plan.question_ids.clone(),
            time_limit_secs,
            started_at: now,
        }
        .validate()?;
        let attempt = attempts.create_attempt(validated).await?;

        let fetched = questions.get_questions_by_ids(attempt.question_ids()).await?;
        let ordered = order_questions(attempt.question_ids(), fetched)?;
        SessionService::new(attempt, ordered)
    }

    /// Rebuild a session from nothing but its durable attempt ID.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` when the attempt or its questions
    /// cannot be loaded.
    pub async fn resume_from_storage(
        attempt_id: AttemptId,
        questions: &dyn QuestionRepository,
        attempts: &dyn AttemptRepository,
        now: DateTime<Utc>,
    ) -> Result<SessionService, SessionError> {
        let attempt: Attempt = attempts.get_attempt(attempt_id).await?;
        let fetched = questions.get_questions_by_ids(attempt.question_ids()).await?;
        let ordered = order_questions(attempt.question_ids(), fetched)?;
        let items = attempts.list_items(attempt_id).await?;
        SessionService::resume(attempt, ordered, items, now)
    }
}
