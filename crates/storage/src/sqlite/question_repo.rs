use std::collections::HashMap;

use quiz_core::model::{Question, QuestionId, QuestionOption};
use sqlx::Row;

use super::{
    SqliteRepository,
    mapping::{build_question, id_i64, ser},
};
use crate::repository::{QuestionFilter, QuestionRepository, StorageError};

impl SqliteRepository {
    /// Fetch option rows for a set of questions, grouped by question ID and
    /// ordered by position within each group.
    async fn options_for(
        &self,
        ids: &[i64],
    ) -> Result<HashMap<i64, Vec<QuestionOption>>, StorageError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let mut sql = String::from(
            r"
            SELECT question_id, position, option_text, rationale
            FROM question_options
            WHERE question_id IN (
            ",
        );
        for i in 0..ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 1).to_string());
        }
        sql.push_str(")\nORDER BY question_id ASC, position ASC");

        let mut q = sqlx::query(&sql);
        for id in ids {
            q = q.bind(id);
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let mut grouped: HashMap<i64, Vec<QuestionOption>> = HashMap::new();
        for row in rows {
            let question_id: i64 = row.try_get("question_id").map_err(ser)?;
            let text: String = row.try_get("option_text").map_err(ser)?;
            let rationale: Option<String> = row.try_get("rationale").map_err(ser)?;
            let option = match rationale {
                Some(r) => QuestionOption::with_rationale(text, r),
                None => QuestionOption::new(text),
            };
            grouped.entry(question_id).or_default().push(option);
        }
        Ok(grouped)
    }

    async fn assemble(
        &self,
        rows: Vec<sqlx::sqlite::SqliteRow>,
    ) -> Result<Vec<Question>, StorageError> {
        let mut row_ids = Vec::with_capacity(rows.len());
        for row in &rows {
            row_ids.push(row.try_get::<i64, _>("id").map_err(ser)?);
        }
        let mut options = self.options_for(&row_ids).await?;

        let mut questions = Vec::with_capacity(rows.len());
        for (row, id) in rows.iter().zip(row_ids) {
            let opts = options.remove(&id).unwrap_or_default();
            questions.push(build_question(row, opts)?);
        }
        Ok(questions)
    }
}

#[async_trait::async_trait]
impl QuestionRepository for SqliteRepository {
    async fn upsert_question(&self, question: &Question) -> Result<(), StorageError> {
        let id = id_i64("question_id", question.id().value())?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        sqlx::query(
            r"
            INSERT INTO questions (
                id, stem, correct_key, exam_type, topic, subtopic, difficulty, status
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                stem = excluded.stem,
                correct_key = excluded.correct_key,
                exam_type = excluded.exam_type,
                topic = excluded.topic,
                subtopic = excluded.subtopic,
                difficulty = excluded.difficulty,
                status = excluded.status
            ",
        )
        .bind(id)
        .bind(question.stem().to_owned())
        .bind(question.correct_key().as_str())
        .bind(question.exam_type().to_owned())
        .bind(question.topic().to_owned())
        .bind(question.subtopic().map(ToOwned::to_owned))
        .bind(question.difficulty().as_str())
        .bind(question.status().as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        // Option lists are replaced wholesale; they are tiny (2-5 rows).
        sqlx::query("DELETE FROM question_options WHERE question_id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        for (position, option) in question.options().iter().enumerate() {
            sqlx::query(
                r"
                INSERT INTO question_options (question_id, position, option_text, rationale)
                VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(id)
            .bind(i64::try_from(position).map_err(|_| {
                StorageError::Serialization("option position overflow".into())
            })?)
            .bind(option.text.clone())
            .bind(option.rationale.clone())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn list_questions(&self, filter: &QuestionFilter) -> Result<Vec<Question>, StorageError> {
        let mut sql = String::from(
            r"
            SELECT id, stem, correct_key, exam_type, topic, subtopic, difficulty, status
            FROM questions
            WHERE status = ?1
            ",
        );

        let mut bind_index = 2;
        if filter.exam_type.is_some() {
            sql.push_str(" AND exam_type = ?");
            sql.push_str(&bind_index.to_string());
            bind_index += 1;
        }
        if filter.topic.is_some() {
            sql.push_str(" AND topic = ?");
            sql.push_str(&bind_index.to_string());
            bind_index += 1;
        }
        if filter.difficulty.is_some() {
            sql.push_str(" AND difficulty = ?");
            sql.push_str(&bind_index.to_string());
        }
        sql.push_str(" ORDER BY id ASC");

        let mut q = sqlx::query(&sql).bind(filter.status.as_str());
        if let Some(exam) = &filter.exam_type {
            q = q.bind(exam.clone());
        }
        if let Some(topic) = &filter.topic {
            q = q.bind(topic.clone());
        }
        if let Some(difficulty) = filter.difficulty {
            q = q.bind(difficulty.as_str());
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        self.assemble(rows).await
    }

    async fn get_questions_by_ids(
        &self,
        ids: &[QuestionId],
    ) -> Result<Vec<Question>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = String::from(
            r"
            SELECT id, stem, correct_key, exam_type, topic, subtopic, difficulty, status
            FROM questions
            WHERE id IN (
            ",
        );
        for i in 0..ids.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push('?');
            sql.push_str(&(i + 1).to_string());
        }
        sql.push_str(")\n");

        let mut q = sqlx::query(&sql);
        for id in ids {
            q = q.bind(id_i64("question_id", id.value())?);
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        if rows.len() != ids.len() {
            return Err(StorageError::NotFound);
        }

        self.assemble(rows).await
    }
}
