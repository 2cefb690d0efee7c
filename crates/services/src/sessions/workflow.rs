use std::sync::Arc;

use quiz_core::model::{
    AnswerKey, AttemptId, AttemptItem, Difficulty, Mode, ScoreReport, UserId,
};
use storage::repository::{AttemptRepository, QuestionRepository};

use crate::Clock;
use crate::error::SessionError;
use super::plan::SelectorConfig;
use super::queries::SessionQueries;
use super::service::SessionService;

/// Cadence of periodic attempt snapshots, in foreground seconds.
pub const SNAPSHOT_INTERVAL_SECS: u32 = 5;

/// Configuration for starting a new attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartConfig {
    /// Attempt creation needs an identity; `None` fails with
    /// `SessionError::AuthRequired` so callers can prompt sign-in.
    pub user_id: Option<UserId>,
    pub mode: Mode,
    pub exam_type: String,
    pub topic: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub count: u32,
    /// Seconds; ignored by modes whose policy is untimed.
    pub time_limit_secs: u32,
}

/// Result of answering a single question in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAnswerResult {
    pub item: AttemptItem,
    /// `None` when the mode withholds feedback until the attempt finishes.
    pub is_correct: Option<bool>,
    pub is_complete: bool,
}

/// Orchestrates attempt start, resume, persisted answering and the
/// periodic snapshot loop.
///
/// Persistence is fire-and-forget from the state machine's point of view:
/// failed writes are absorbed, logged and retried on a later tick rather
/// than blocking a transition. Concurrent tabs racing on snapshots are
/// last-write-wins; one active session per user is the working assumption.
#[derive(Clone)]
pub struct AttemptLoopService {
    clock: Clock,
    questions: Arc<dyn QuestionRepository>,
    attempts: Arc<dyn AttemptRepository>,
}

impl AttemptLoopService {
    #[must_use]
    pub fn new(
        clock: Clock,
        questions: Arc<dyn QuestionRepository>,
        attempts: Arc<dyn AttemptRepository>,
    ) -> Self {
        Self {
            clock,
            questions,
            attempts,
        }
    }

    /// Select questions, persist the attempt and build its session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::AuthRequired` without a user,
    /// `SessionError::InsufficientQuestions` when the selector exhausts its
    /// tiers, and storage/load errors otherwise.
    pub async fn start_attempt(&self, config: StartConfig) -> Result<SessionService, SessionError> {
        let Some(user_id) = config.user_id else {
            return Err(SessionError::AuthRequired);
        };
        let time_limit_secs = if config.mode.policy().timed {
            config.time_limit_secs
        } else {
            0
        };
        let selector = SelectorConfig {
            exam_type: config.exam_type,
            topic: config.topic,
            difficulty: config.difficulty,
            count: config.count,
        };

        let session = SessionQueries::start_from_storage(
            user_id,
            config.mode,
            &selector,
            time_limit_secs,
            self.questions.as_ref(),
            self.attempts.as_ref(),
            self.clock.now(),
        )
        .await?;
        tracing::debug!(
            attempt = %session.attempt().id(),
            mode = %session.attempt().mode(),
            questions = session.total_questions(),
            "attempt started"
        );
        Ok(session)
    }

    /// Rebuild a session from its durable attempt ID, the only input a
    /// resume needs.
    ///
    /// An attempt whose time budget ran out while it was away comes back
    /// already expired; its finalization is persisted here (best-effort,
    /// retried on later ticks if the write fails).
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` when the attempt or its questions
    /// cannot be loaded.
    pub async fn resume_attempt(&self, id: AttemptId) -> Result<SessionService, SessionError> {
        let mut session = SessionQueries::resume_from_storage(
            id,
            self.questions.as_ref(),
            self.attempts.as_ref(),
            self.clock.now(),
        )
        .await?;

        if session.is_dirty() {
            self.sync_best_effort(&mut session).await;
        }
        Ok(session)
    }

    /// Select and submit an answer on the current question, then push the
    /// new state to storage.
    ///
    /// A failing backend does not fail the answer: the record stays queued
    /// and is retried on a later tick.
    ///
    /// # Errors
    ///
    /// Returns engine errors (`AlreadyAnswered`, `NoSelection`,
    /// `InvalidSelection`, terminal-state rejections); never persistence
    /// errors.
    pub async fn answer_current(
        &self,
        session: &mut SessionService,
        key: AnswerKey,
    ) -> Result<SessionAnswerResult, SessionError> {
        session.select(key)?;
        let item = session.submit_current(self.clock.now())?;
        let is_correct = session
            .policy()
            .immediate_feedback
            .then(|| item.is_correct());

        self.sync_best_effort(session).await;

        Ok(SessionAnswerResult {
            item,
            is_correct,
            is_complete: session.is_complete(),
        })
    }

    /// Advance the session by one foreground second and run the snapshot
    /// cadence.
    ///
    /// Returns `true` when this tick expired the attempt. Snapshot writes
    /// happen roughly every `SNAPSHOT_INTERVAL_SECS` of foreground time and
    /// immediately on expiry; failures are absorbed and retried.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Attempt` if force-finishing on expiry fails.
    pub async fn on_tick(&self, session: &mut SessionService) -> Result<bool, SessionError> {
        let expired = session.tick(self.clock.now())?;
        if expired || session.snapshot_due(SNAPSHOT_INTERVAL_SECS) {
            self.sync_best_effort(session).await;
        }
        Ok(expired)
    }

    /// Finish the attempt and persist the final state.
    ///
    /// Unlike the periodic snapshots this write is not fire-and-forget: a
    /// failure is returned so the caller can retry the finalization, which
    /// is idempotent.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Storage` when the final write fails.
    pub async fn finish_attempt(
        &self,
        session: &mut SessionService,
    ) -> Result<ScoreReport, SessionError> {
        let report = session.finish(self.clock.now())?;
        self.sync(session).await?;
        tracing::debug!(
            attempt = %session.attempt().id(),
            correct = report.correct,
            total = report.total,
            "attempt finalized"
        );
        Ok(report)
    }

    /// Best-effort final write for page-hide/unload. Navigating away
    /// abandons the in-memory machine after this flush; there is no
    /// server-side expiry sweep for whatever never arrives.
    pub async fn flush(&self, session: &mut SessionService) {
        self.sync_best_effort(session).await;
    }

    async fn sync(&self, session: &mut SessionService) -> Result<(), SessionError> {
        let items = session.take_unsynced();
        for (index, item) in items.iter().enumerate() {
            if let Err(e) = self.attempts.append_item(item).await {
                session.requeue_unsynced(items[index..].to_vec());
                return Err(e.into());
            }
        }
        self.attempts.update_attempt(session.attempt()).await?;
        session.mark_snapshotted();
        session.clear_dirty();
        Ok(())
    }

    async fn sync_best_effort(&self, session: &mut SessionService) {
        if let Err(e) = self.sync(session).await {
            tracing::warn!(error = %e, "attempt snapshot failed; retrying on a later tick");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use quiz_core::model::{
        Attempt, Question, QuestionId, QuestionOption, ReviewStatus, ValidatedAttempt,
    };
    use quiz_core::time::fixed_now;
    use std::sync::atomic::{AtomicBool, Ordering};
    use storage::repository::{InMemoryRepository, StorageError};
    use uuid::Uuid;

    fn build_question(id: u64) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Stem {id}"),
            vec![QuestionOption::new("x"), QuestionOption::new("y")],
            AnswerKey::A,
            "math-basic",
            "algebra",
            None,
            Difficulty::Easy,
            ReviewStatus::Approved,
        )
        .unwrap()
    }

    fn start_config(mode: Mode, count: u32, time_limit_secs: u32) -> StartConfig {
        StartConfig {
            user_id: Some(UserId::new(Uuid::nil())),
            mode,
            exam_type: "math-basic".into(),
            topic: Some("algebra".into()),
            difficulty: None,
            count,
            time_limit_secs,
        }
    }

    async fn seeded_repo(n: u64) -> InMemoryRepository {
        use storage::repository::QuestionRepository as _;
        let repo = InMemoryRepository::new();
        for id in 1..=n {
            repo.upsert_question(&build_question(id)).await.unwrap();
        }
        repo
    }

    fn loop_service(repo: &InMemoryRepository) -> AttemptLoopService {
        AttemptLoopService::new(
            Clock::fixed(fixed_now()),
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
        )
    }

    /// Wraps the in-memory repository with a switchable write failure.
    #[derive(Clone)]
    struct FlakyAttemptRepo {
        inner: InMemoryRepository,
        failing: Arc<AtomicBool>,
    }

    impl FlakyAttemptRepo {
        fn check(&self) -> Result<(), StorageError> {
            if self.failing.load(Ordering::SeqCst) {
                Err(StorageError::Connection("backend down".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl AttemptRepository for FlakyAttemptRepo {
        async fn create_attempt(
            &self,
            attempt: ValidatedAttempt,
        ) -> Result<Attempt, StorageError> {
            self.inner.create_attempt(attempt).await
        }

        async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StorageError> {
            self.inner.get_attempt(id).await
        }

        async fn update_attempt(&self, attempt: &Attempt) -> Result<(), StorageError> {
            self.check()?;
            self.inner.update_attempt(attempt).await
        }

        async fn append_item(&self, item: &AttemptItem) -> Result<i64, StorageError> {
            self.check()?;
            self.inner.append_item(item).await
        }

        async fn list_items(
            &self,
            attempt_id: AttemptId,
        ) -> Result<Vec<AttemptItem>, StorageError> {
            self.inner.list_items(attempt_id).await
        }

        async fn list_attempts_for_user(
            &self,
            user_id: UserId,
            limit: u32,
        ) -> Result<Vec<Attempt>, StorageError> {
            self.inner.list_attempts_for_user(user_id, limit).await
        }
    }

    #[tokio::test]
    async fn anonymous_start_is_rejected_distinctly() {
        let repo = seeded_repo(3).await;
        let svc = loop_service(&repo);

        let mut config = start_config(Mode::Practice, 2, 0);
        config.user_id = None;

        let err = svc.start_attempt(config).await.unwrap_err();
        assert!(matches!(err, SessionError::AuthRequired));
    }

    #[tokio::test]
    async fn answers_persist_items_and_counters() {
        let repo = seeded_repo(4).await;
        let svc = loop_service(&repo);

        let mut session = svc
            .start_attempt(start_config(Mode::Practice, 2, 0))
            .await
            .unwrap();

        let first = svc.answer_current(&mut session, AnswerKey::A).await.unwrap();
        assert_eq!(first.is_correct, Some(true));
        assert!(!first.is_complete);

        session.go_next();
        let second = svc.answer_current(&mut session, AnswerKey::B).await.unwrap();
        assert_eq!(second.is_correct, Some(false));
        assert!(second.is_complete);

        use storage::repository::AttemptRepository as _;
        let persisted = repo.get_attempt(session.attempt().id()).await.unwrap();
        assert_eq!(persisted.total_attempted(), 2);
        assert_eq!(persisted.correct_count(), 1);
        assert!(persisted.is_finished());
        assert_eq!(repo.list_items(persisted.id()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn exam_mode_withholds_feedback_in_the_result() {
        let repo = seeded_repo(3).await;
        let svc = loop_service(&repo);

        let mut session = svc
            .start_attempt(start_config(Mode::Exam, 2, 600))
            .await
            .unwrap();

        let result = svc.answer_current(&mut session, AnswerKey::A).await.unwrap();
        assert_eq!(result.is_correct, None);
    }

    #[tokio::test]
    async fn failed_writes_are_retried_on_a_later_tick() {
        use storage::repository::QuestionRepository as _;
        let inner = InMemoryRepository::new();
        for id in 1..=3 {
            inner.upsert_question(&build_question(id)).await.unwrap();
        }
        let failing = Arc::new(AtomicBool::new(false));
        let flaky = FlakyAttemptRepo {
            inner: inner.clone(),
            failing: failing.clone(),
        };
        let svc = AttemptLoopService::new(
            Clock::fixed(fixed_now()),
            Arc::new(inner.clone()),
            Arc::new(flaky),
        );

        let mut session = svc
            .start_attempt(start_config(Mode::Test, 2, 600))
            .await
            .unwrap();

        // backend goes down mid-session; the answer still lands in memory
        failing.store(true, Ordering::SeqCst);
        let result = svc.answer_current(&mut session, AnswerKey::A).await.unwrap();
        assert_eq!(result.is_correct, Some(true));

        use storage::repository::AttemptRepository as _;
        assert!(inner.list_items(session.attempt().id()).await.unwrap().is_empty());

        // backend recovers; the snapshot cadence drains the queue
        failing.store(false, Ordering::SeqCst);
        for _ in 0..SNAPSHOT_INTERVAL_SECS {
            svc.on_tick(&mut session).await.unwrap();
        }

        let items = inner.list_items(session.attempt().id()).await.unwrap();
        assert_eq!(items.len(), 1);
        let persisted = inner.get_attempt(session.attempt().id()).await.unwrap();
        assert_eq!(persisted.total_attempted(), 1);
    }

    #[tokio::test]
    async fn expiry_tick_finalizes_and_persists() {
        let repo = seeded_repo(3).await;
        let svc = loop_service(&repo);

        let mut session = svc
            .start_attempt(start_config(Mode::Test, 2, 3))
            .await
            .unwrap();
        svc.answer_current(&mut session, AnswerKey::A).await.unwrap();

        let mut expired_ticks = 0;
        for _ in 0..5 {
            if svc.on_tick(&mut session).await.unwrap() {
                expired_ticks += 1;
            }
        }
        assert_eq!(expired_ticks, 1);

        use storage::repository::AttemptRepository as _;
        let persisted = repo.get_attempt(session.attempt().id()).await.unwrap();
        assert!(persisted.is_finished());
        assert_eq!(persisted.total_attempted(), 1);
        assert_eq!(persisted.duration_secs(), 3);
    }

    #[tokio::test]
    async fn resume_finalizes_attempts_that_expired_while_away() {
        let repo = seeded_repo(3).await;
        let svc = loop_service(&repo);

        let mut session = svc
            .start_attempt(start_config(Mode::Test, 2, 4))
            .await
            .unwrap();
        // burn the whole budget, snapshot, abandon the tab
        for _ in 0..4 {
            let _ = svc.on_tick(&mut session).await.unwrap();
        }
        svc.flush(&mut session).await;

        let resumed = svc.resume_attempt(session.attempt().id()).await.unwrap();
        assert!(resumed.is_complete());

        use storage::repository::AttemptRepository as _;
        let persisted = repo.get_attempt(session.attempt().id()).await.unwrap();
        assert!(persisted.is_finished());
    }
}
