use quiz_core::model::{ProgressOwner, QuestionId, QuestionProgress};

use super::{
    SqliteRepository,
    mapping::{id_i64, map_progress_row, owner_to_columns},
};
use crate::repository::{ProgressRepository, StorageError};

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn get_progress(
        &self,
        owner: ProgressOwner,
        question_id: QuestionId,
    ) -> Result<Option<QuestionProgress>, StorageError> {
        let (kind, owner_id) = owner_to_columns(owner);

        let row = sqlx::query(
            r"
            SELECT
                owner_kind, owner_id, question_id, attempts, last_selected,
                last_correct, flagged, notes, time_spent_secs, last_action_at
            FROM question_progress
            WHERE owner_kind = ?1 AND owner_id = ?2 AND question_id = ?3
            ",
        )
        .bind(kind)
        .bind(owner_id)
        .bind(id_i64("question_id", question_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|r| map_progress_row(&r)).transpose()
    }

    async fn upsert_progress(&self, progress: &QuestionProgress) -> Result<(), StorageError> {
        let (kind, owner_id) = owner_to_columns(progress.owner());
        let time_spent = i64::try_from(progress.time_spent_secs())
            .map_err(|_| StorageError::Serialization("time_spent_secs overflow".into()))?;

        sqlx::query(
            r"
            INSERT INTO question_progress (
                owner_kind, owner_id, question_id, attempts, last_selected,
                last_correct, flagged, notes, time_spent_secs, last_action_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(owner_kind, owner_id, question_id) DO UPDATE SET
                attempts = excluded.attempts,
                last_selected = excluded.last_selected,
                last_correct = excluded.last_correct,
                flagged = excluded.flagged,
                notes = excluded.notes,
                time_spent_secs = excluded.time_spent_secs,
                last_action_at = excluded.last_action_at
            ",
        )
        .bind(kind)
        .bind(owner_id)
        .bind(id_i64("question_id", progress.question_id().value())?)
        .bind(i64::from(progress.attempts()))
        .bind(progress.last_selected().map(|k| k.as_str()))
        .bind(progress.last_correct())
        .bind(progress.is_flagged())
        .bind(progress.notes().to_owned())
        .bind(time_spent)
        .bind(progress.last_action_at())
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }
}
