use quiz_core::model::{Attempt, AttemptId, AttemptItem, UserId, ValidatedAttempt};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{attempt_id_from_i64, build_attempt, id_i64, map_item_row, question_id_from_i64, ser},
};
use crate::repository::{AttemptRepository, StorageError};

impl SqliteRepository {
    async fn question_ids_for(
        &self,
        attempt_id: i64,
    ) -> Result<Vec<quiz_core::model::QuestionId>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT question_id
            FROM attempt_questions
            WHERE attempt_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(question_id_from_i64(
                row.try_get::<i64, _>("question_id").map_err(ser)?,
            )?);
        }
        Ok(ids)
    }
}

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn create_attempt(&self, attempt: ValidatedAttempt) -> Result<Attempt, StorageError> {
        let draft = attempt.draft();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let res = sqlx::query(
            r"
            INSERT INTO attempts (
                user_id, mode, exam_type, topic, time_limit_secs,
                started_at, finished_at, total_attempted, correct_count, duration_secs
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, 0, 0, 0)
            ",
        )
        .bind(draft.user_id.value().to_string())
        .bind(draft.mode.as_str())
        .bind(draft.exam_type.clone())
        .bind(draft.topic.clone())
        .bind(i64::from(draft.time_limit_secs))
        .bind(draft.started_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let row_id = res.last_insert_rowid();

        for (position, question_id) in draft.question_ids.iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO attempt_questions (attempt_id, position, question_id)
                VALUES (?1, ?2, ?3)
                ",
            )
            .bind(row_id)
            .bind(i64::try_from(position).map_err(|_| {
                StorageError::Serialization("attempt position overflow".into())
            })?)
            .bind(id_i64("question_id", question_id.value())?)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(attempt.assign_id(attempt_id_from_i64(row_id)?))
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Attempt, StorageError> {
        let attempt_id = id_i64("attempt_id", id.value())?;

        let row = sqlx::query(
            r"
            SELECT
                id, user_id, mode, exam_type, topic, time_limit_secs,
                started_at, finished_at, total_attempted, correct_count, duration_secs
            FROM attempts
            WHERE id = ?1
            ",
        )
        .bind(attempt_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        let question_ids = self.question_ids_for(attempt_id).await?;
        build_attempt(&row, question_ids)
    }

    async fn update_attempt(&self, attempt: &Attempt) -> Result<(), StorageError> {
        // Only the session-mutable fields; the question list and the
        // configuration written at creation never change.
        let res = sqlx::query(
            r"
            UPDATE attempts
            SET finished_at = ?2,
                total_attempted = ?3,
                correct_count = ?4,
                duration_secs = ?5
            WHERE id = ?1
            ",
        )
        .bind(id_i64("attempt_id", attempt.id().value())?)
        .bind(attempt.finished_at())
        .bind(i64::from(attempt.total_attempted()))
        .bind(i64::from(attempt.correct_count()))
        .bind(i64::from(attempt.duration_secs()))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn append_item(&self, item: &AttemptItem) -> Result<i64, StorageError> {
        let res = sqlx::query(
            r"
            INSERT INTO attempt_items (
                attempt_id, question_id, selected_key, correct_key,
                topic, position, answered_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )
        .bind(id_i64("attempt_id", item.attempt_id.value())?)
        .bind(id_i64("question_id", item.question_id.value())?)
        .bind(item.selected.as_str())
        .bind(item.correct.as_str())
        .bind(item.topic.clone())
        .bind(i64::from(item.position))
        .bind(item.answered_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(res.last_insert_rowid())
    }

    async fn list_items(&self, attempt_id: AttemptId) -> Result<Vec<AttemptItem>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                attempt_id, question_id, selected_key, correct_key,
                topic, position, answered_at
            FROM attempt_items
            WHERE attempt_id = ?1
            ORDER BY position ASC
            ",
        )
        .bind(id_i64("attempt_id", attempt_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(map_item_row(&row)?);
        }
        Ok(items)
    }

    async fn list_attempts_for_user(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<Attempt>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT
                id, user_id, mode, exam_type, topic, time_limit_secs,
                started_at, finished_at, total_attempted, correct_count, duration_secs
            FROM attempts
            WHERE user_id = ?1
            ORDER BY started_at DESC, id DESC
            LIMIT ?2
            ",
        )
        .bind(user_id.value().to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut attempts = Vec::with_capacity(rows.len());
        for row in rows {
            let attempt_id: i64 = row.try_get("id").map_err(ser)?;
            let question_ids = self.question_ids_for(attempt_id).await?;
            attempts.push(build_attempt(&row, question_ids)?);
        }
        Ok(attempts)
    }
}
