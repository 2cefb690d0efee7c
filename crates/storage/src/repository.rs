use async_trait::async_trait;
use quiz_core::model::{
    Attempt, AttemptId, AttemptItem, Difficulty, ProgressOwner, Question, QuestionId,
    QuestionProgress, ReviewStatus, UserId, ValidatedAttempt,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
}

/// Filter for candidate-question queries.
///
/// `None` fields are wildcards; the selector's tier cascade is expressed by
/// progressively widening one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionFilter {
    pub exam_type: Option<String>,
    pub topic: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub status: ReviewStatus,
}

impl QuestionFilter {
    /// Approved questions for an exam type, optionally narrowed by topic.
    #[must_use]
    pub fn approved(exam_type: impl Into<String>, topic: Option<String>) -> Self {
        Self {
            exam_type: Some(exam_type.into()),
            topic,
            difficulty: None,
            status: ReviewStatus::Approved,
        }
    }

    /// Any approved question, regardless of exam type. Last-resort tier.
    #[must_use]
    pub fn any_approved() -> Self {
        Self {
            exam_type: None,
            topic: None,
            difficulty: None,
            status: ReviewStatus::Approved,
        }
    }

    #[must_use]
    pub fn with_difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = Some(difficulty);
        self
    }

    /// Whether a question satisfies this filter.
    #[must_use]
    pub fn matches(&self, question: &Question) -> bool {
        if question.status() != self.status {
            return false;
        }
        if let Some(exam) = &self.exam_type {
            if question.exam_type() != exam {
                return false;
            }
        }
        if let Some(topic) = &self.topic {
            if question.topic() != topic {
                return false;
            }
        }
        if let Some(difficulty) = self.difficulty {
            if question.difficulty() != difficulty {
                return false;
            }
        }
        true
    }
}

/// Read-mostly contract over the question corpus.
///
/// The corpus is owned by an external content-review workflow; this engine
/// only writes through `upsert_question` for seeding and tests.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    /// Persist or update a question.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the question cannot be stored.
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError>;

    /// List candidate questions matching the filter.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn list_questions(&self, filter: &QuestionFilter) -> Result<Vec<Question>, StorageError>;

    /// Fetch questions by ID, in no guaranteed order. Callers re-order by
    /// their own persisted ID list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if any are missing, or other storage
    /// errors.
    async fn get_questions_by_ids(
        &self,
        ids: &[QuestionId],
    ) -> Result<Vec<Question>, StorageError>;
}

/// Repository contract for attempts and their answer records.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Persist a validated attempt, assigning its identifier. The fixed
    /// question-ID list is written here, before any question is served.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the attempt cannot be stored.
    async fn create_attempt(&self, attempt: ValidatedAttempt) -> Result<Attempt, StorageError>;

    /// Fetch an attempt by ID, including its ordered question-ID list.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StorageError>;

    /// Snapshot the attempt's mutable state (counters, finish timestamps).
    /// Last-write-wins; concurrent tabs race here without conflict
    /// detection.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the attempt does not exist.
    async fn update_attempt(&self, attempt: &Attempt) -> Result<(), StorageError>;

    /// Append one immutable answer record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the item cannot be stored.
    async fn append_item(&self, item: &AttemptItem) -> Result<i64, StorageError>;

    /// List an attempt's answer records ordered by position.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn list_items(&self, attempt_id: AttemptId) -> Result<Vec<AttemptItem>, StorageError>;

    /// List a user's attempts, most recently started first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn list_attempts_for_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Attempt>, StorageError>;
}

/// Repository contract for per-question progress records.
#[async_trait]
pub trait ProgressRepository: Send + Sync {
    /// Fetch the progress record for an owner/question pair, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on query failure.
    async fn get_progress(
        &self,
        owner: ProgressOwner,
        question_id: QuestionId,
    ) -> Result<Option<QuestionProgress>, StorageError>;

    /// Persist or update a progress record.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the record cannot be stored.
    async fn upsert_progress(&self, progress: &QuestionProgress) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    questions: Arc<Mutex<HashMap<QuestionId, Question>>>,
    attempts: Arc<Mutex<HashMap<AttemptId, Attempt>>>,
    items: Arc<Mutex<Vec<AttemptItem>>>,
    progress: Arc<Mutex<HashMap<(ProgressOwner, QuestionId), QuestionProgress>>>,
    next_attempt_id: Arc<Mutex<u64>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let mut guard = self.questions.lock().map_err(lock_err)?;
        guard.insert(question.id(), question.clone());
        Ok(())
    }

    async fn list_questions(&self, filter: &QuestionFilter) -> Result<Vec<Question>, StorageError> {
        let guard = self.questions.lock().map_err(lock_err)?;
        let mut found: Vec<Question> = guard
            .values()
            .filter(|q| filter.matches(q))
            .cloned()
            .collect();
        found.sort_by_key(|q| q.id().value());
        Ok(found)
    }

    async fn get_questions_by_ids(
        &self,
        ids: &[QuestionId],
    ) -> Result<Vec<Question>, StorageError> {
        let guard = self.questions.lock().map_err(lock_err)?;
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            match guard.get(id) {
                Some(question) => found.push(question.clone()),
                None => return Err(StorageError::NotFound),
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn create_attempt(&self, attempt: ValidatedAttempt) -> Result<Attempt, StorageError> {
        let id = {
            let mut guard = self.next_attempt_id.lock().map_err(lock_err)?;
            *guard += 1;
            AttemptId::new(*guard)
        };
        let attempt = attempt.assign_id(id);
        let mut guard = self.attempts.lock().map_err(lock_err)?;
        guard.insert(attempt.id(), attempt.clone());
        Ok(attempt)
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StorageError> {
        let guard = self.attempts.lock().map_err(lock_err)?;
        guard.get(&id).cloned().ok_or(StorageError::NotFound)
    }

    async fn update_attempt(&self, attempt: &Attempt) -> Result<(), StorageError> {
        let mut guard = self.attempts.lock().map_err(lock_err)?;
        if !guard.contains_key(&attempt.id()) {
            return Err(StorageError::NotFound);
        }
        guard.insert(attempt.id(), attempt.clone());
        Ok(())
    }

    async fn append_item(&self, item: &AttemptItem) -> Result<i64, StorageError> {
        let mut guard = self.items.lock().map_err(lock_err)?;
        guard.push(item.clone());
        i64::try_from(guard.len()).map_err(|_| StorageError::Serialization("item id overflow".into()))
    }

    async fn list_items(&self, attempt_id: AttemptId) -> Result<Vec<AttemptItem>, StorageError> {
        let guard = self.items.lock().map_err(lock_err)?;
        let mut found: Vec<AttemptItem> = guard
            .iter()
            .filter(|item| item.attempt_id == attempt_id)
            .cloned()
            .collect();
        found.sort_by_key(|item| item.position);
        Ok(found)
    }

    async fn list_attempts_for_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Attempt>, StorageError> {
        let guard = self.attempts.lock().map_err(lock_err)?;
        let mut found: Vec<Attempt> = guard
            .values()
            .filter(|a| a.user_id() == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|a| std::cmp::Reverse((a.started_at(), a.id().value())));
        found.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(found)
    }
}

#[async_trait]
impl ProgressRepository for InMemoryRepository {
    async fn get_progress(
        &self,
        owner: ProgressOwner,
        question_id: QuestionId,
    ) -> Result<Option<QuestionProgress>, StorageError> {
        let guard = self.progress.lock().map_err(lock_err)?;
        Ok(guard.get(&(owner, question_id)).cloned())
    }

    async fn upsert_progress(&self, progress: &QuestionProgress) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(lock_err)?;
        guard.insert((progress.owner(), progress.question_id()), progress.clone());
        Ok(())
    }
}

/// Aggregates the engine's repositories behind trait objects for easy
/// backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub questions: Arc<dyn QuestionRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub progress: Arc<dyn ProgressRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            questions: Arc::new(repo.clone()),
            attempts: Arc::new(repo.clone()),
            progress: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{AnswerKey, AttemptDraft, Mode, QuestionOption};
    use quiz_core::time::fixed_now;
    use uuid::Uuid;

    fn build_question(id: u64, exam: &str, topic: &str, status: ReviewStatus) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Stem {id}"),
            vec![
                QuestionOption::new("first"),
                QuestionOption::new("second"),
                QuestionOption::new("third"),
            ],
            AnswerKey::B,
            exam,
            topic,
            None,
            Difficulty::Medium,
            status,
        )
        .unwrap()
    }

    fn build_draft(question_ids: Vec<QuestionId>) -> ValidatedAttempt {
        AttemptDraft {
            user_id: UserId::new(Uuid::nil()),
            mode: Mode::Practice,
            exam_type: "math-basic".into(),
            topic: None,
            question_ids,
            time_limit_secs: 0,
            started_at: fixed_now(),
        }
        .validate()
        .unwrap()
    }

    #[tokio::test]
    async fn filter_narrows_by_exam_topic_and_status() {
        let repo = InMemoryRepository::new();
        repo.upsert_question(&build_question(1, "math-basic", "algebra", ReviewStatus::Approved))
            .await
            .unwrap();
        repo.upsert_question(&build_question(2, "math-basic", "geometry", ReviewStatus::Approved))
            .await
            .unwrap();
        repo.upsert_question(&build_question(3, "physics", "optics", ReviewStatus::Approved))
            .await
            .unwrap();
        repo.upsert_question(&build_question(4, "math-basic", "algebra", ReviewStatus::Draft))
            .await
            .unwrap();

        let narrow = repo
            .list_questions(&QuestionFilter::approved("math-basic", Some("algebra".into())))
            .await
            .unwrap();
        assert_eq!(narrow.len(), 1);
        assert_eq!(narrow[0].id(), QuestionId::new(1));

        let by_exam = repo
            .list_questions(&QuestionFilter::approved("math-basic", None))
            .await
            .unwrap();
        assert_eq!(by_exam.len(), 2);

        let all = repo.list_questions(&QuestionFilter::any_approved()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn get_by_ids_requires_every_id() {
        let repo = InMemoryRepository::new();
        repo.upsert_question(&build_question(1, "math-basic", "algebra", ReviewStatus::Approved))
            .await
            .unwrap();

        let found = repo
            .get_questions_by_ids(&[QuestionId::new(1)])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);

        let missing = repo
            .get_questions_by_ids(&[QuestionId::new(1), QuestionId::new(99)])
            .await;
        assert!(matches!(missing, Err(StorageError::NotFound)));
    }

    #[tokio::test]
    async fn create_attempt_assigns_increasing_ids() {
        let repo = InMemoryRepository::new();
        let a = repo
            .create_attempt(build_draft(vec![QuestionId::new(1)]))
            .await
            .unwrap();
        let b = repo
            .create_attempt(build_draft(vec![QuestionId::new(2)]))
            .await
            .unwrap();

        assert_ne!(a.id(), b.id());
        let loaded = repo.get_attempt(a.id()).await.unwrap();
        assert_eq!(loaded.question_ids(), a.question_ids());
    }

    #[tokio::test]
    async fn update_requires_existing_attempt() {
        let repo = InMemoryRepository::new();
        let attempt = build_draft(vec![QuestionId::new(1)]).assign_id(AttemptId::new(404));
        assert!(matches!(
            repo.update_attempt(&attempt).await,
            Err(StorageError::NotFound)
        ));
    }

    #[tokio::test]
    async fn items_list_in_position_order() {
        let repo = InMemoryRepository::new();
        let attempt = repo
            .create_attempt(build_draft(vec![QuestionId::new(1), QuestionId::new(2)]))
            .await
            .unwrap();

        let later = AttemptItem::new(
            attempt.id(),
            QuestionId::new(2),
            AnswerKey::A,
            AnswerKey::B,
            "algebra",
            1,
            fixed_now(),
        );
        let earlier = AttemptItem::new(
            attempt.id(),
            QuestionId::new(1),
            AnswerKey::B,
            AnswerKey::B,
            "algebra",
            0,
            fixed_now(),
        );
        repo.append_item(&later).await.unwrap();
        repo.append_item(&earlier).await.unwrap();

        let items = repo.list_items(attempt.id()).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].position, 0);
        assert_eq!(items[1].position, 1);
    }

    #[tokio::test]
    async fn progress_round_trips_per_owner() {
        let repo = InMemoryRepository::new();
        let owner = ProgressOwner::Device(quiz_core::model::DeviceId::generate());
        let question = QuestionId::new(5);

        assert!(repo.get_progress(owner, question).await.unwrap().is_none());

        let mut progress = QuestionProgress::new(owner, question, fixed_now());
        progress.record_answer(AnswerKey::C, false, fixed_now());
        repo.upsert_progress(&progress).await.unwrap();

        let loaded = repo.get_progress(owner, question).await.unwrap().unwrap();
        assert_eq!(loaded.attempts(), 1);
        assert_eq!(loaded.last_selected(), Some(AnswerKey::C));
    }
}
