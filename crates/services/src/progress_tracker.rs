//! Per-question progress tracking, decoupled from timed attempts.
//!
//! Used by the browse-reviewed-questions experience: flags, notes and
//! cumulative time for a single question, independent of any attempt.
//! Two backing stores exist, a durable repository for authenticated users
//! and an ephemeral device-local store for anonymous use, chosen by the
//! owner's identity at call time. Nothing is merged if a device later signs
//! in; that migration is an explicit product decision this engine does not
//! make.

use std::sync::Arc;

use quiz_core::model::{AnswerKey, ProgressOwner, QuestionId, QuestionProgress};
use storage::repository::ProgressRepository;

use crate::Clock;
use crate::error::ProgressTrackerError;

#[derive(Clone)]
pub struct ProgressTracker {
    clock: Clock,
    durable: Arc<dyn ProgressRepository>,
    local: Arc<dyn ProgressRepository>,
}

impl ProgressTracker {
    #[must_use]
    pub fn new(
        clock: Clock,
        durable: Arc<dyn ProgressRepository>,
        local: Arc<dyn ProgressRepository>,
    ) -> Self {
        Self {
            clock,
            durable,
            local,
        }
    }

    fn store_for(&self, owner: ProgressOwner) -> &Arc<dyn ProgressRepository> {
        if owner.is_authenticated() {
            &self.durable
        } else {
            &self.local
        }
    }

    /// Fetch the record for this owner/question pair, creating it lazily on
    /// first view.
    ///
    /// # Errors
    ///
    /// Returns `ProgressTrackerError::Storage` on repository failures.
    pub async fn get_or_create(
        &self,
        owner: ProgressOwner,
        question_id: QuestionId,
    ) -> Result<QuestionProgress, ProgressTrackerError> {
        let store = self.store_for(owner);
        if let Some(existing) = store.get_progress(owner, question_id).await? {
            return Ok(existing);
        }
        let fresh = QuestionProgress::new(owner, question_id, self.clock.now());
        store.upsert_progress(&fresh).await?;
        Ok(fresh)
    }

    /// Record one answer event; the attempts counter moves exactly once per
    /// call.
    ///
    /// # Errors
    ///
    /// Returns `ProgressTrackerError::Storage` on repository failures.
    pub async fn record_answer(
        &self,
        owner: ProgressOwner,
        question_id: QuestionId,
        selected: AnswerKey,
        correct_key: AnswerKey,
    ) -> Result<QuestionProgress, ProgressTrackerError> {
        self.mutate(owner, question_id, |progress, now| {
            progress.record_answer(selected, selected == correct_key, now);
        })
        .await
    }

    /// Flip the flagged-for-review marker.
    ///
    /// # Errors
    ///
    /// Returns `ProgressTrackerError::Storage` on repository failures.
    pub async fn toggle_flag(
        &self,
        owner: ProgressOwner,
        question_id: QuestionId,
    ) -> Result<QuestionProgress, ProgressTrackerError> {
        self.mutate(owner, question_id, |progress, now| {
            progress.toggle_flag(now);
        })
        .await
    }

    /// Replace the free-text notes.
    ///
    /// # Errors
    ///
    /// Returns `ProgressTrackerError::Storage` on repository failures.
    pub async fn set_notes(
        &self,
        owner: ProgressOwner,
        question_id: QuestionId,
        notes: impl Into<String> + Send,
    ) -> Result<QuestionProgress, ProgressTrackerError> {
        let notes = notes.into();
        self.mutate(owner, question_id, move |progress, now| {
            progress.set_notes(notes, now);
        })
        .await
    }

    /// Add foreground seconds while the question is on screen. The total
    /// only ever grows.
    ///
    /// # Errors
    ///
    /// Returns `ProgressTrackerError::Storage` on repository failures.
    pub async fn accrue_time(
        &self,
        owner: ProgressOwner,
        question_id: QuestionId,
        secs: u64,
    ) -> Result<QuestionProgress, ProgressTrackerError> {
        self.mutate(owner, question_id, move |progress, now| {
            progress.accrue_time(secs, now);
        })
        .await
    }

    async fn mutate(
        &self,
        owner: ProgressOwner,
        question_id: QuestionId,
        apply: impl FnOnce(&mut QuestionProgress, chrono::DateTime<chrono::Utc>) + Send,
    ) -> Result<QuestionProgress, ProgressTrackerError> {
        let store = self.store_for(owner);
        let now = self.clock.now();
        let mut progress = match store.get_progress(owner, question_id).await? {
            Some(existing) => existing,
            None => QuestionProgress::new(owner, question_id, now),
        };
        apply(&mut progress, now);
        store.upsert_progress(&progress).await?;
        Ok(progress)
    }
}
