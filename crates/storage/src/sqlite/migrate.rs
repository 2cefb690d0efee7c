use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

/// Runs a single, consolidated migration for the current schema.
///
/// Creates the full schema (questions with options, attempts with their
/// fixed question lists, answer records, per-question progress, and
/// indexes). Question rows may also live in a remote store; the local
/// tables hold whatever slice of the corpus this deployment caches, so
/// attempt and progress rows carry no foreign key into `questions`.
#[allow(clippy::too_many_lines)]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS questions (
                    id INTEGER PRIMARY KEY,
                    stem TEXT NOT NULL,
                    correct_key TEXT NOT NULL CHECK (correct_key IN ('A','B','C','D','E')),
                    exam_type TEXT NOT NULL,
                    topic TEXT NOT NULL,
                    subtopic TEXT,
                    difficulty TEXT NOT NULL,
                    status TEXT NOT NULL
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS question_options (
                    question_id INTEGER NOT NULL,
                    position INTEGER NOT NULL CHECK (position BETWEEN 0 AND 4),
                    option_text TEXT NOT NULL,
                    rationale TEXT,
                    PRIMARY KEY (question_id, position),
                    FOREIGN KEY (question_id) REFERENCES questions(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS attempts (
                    id INTEGER PRIMARY KEY,
                    user_id TEXT NOT NULL,
                    mode TEXT NOT NULL,
                    exam_type TEXT NOT NULL,
                    topic TEXT,
                    time_limit_secs INTEGER NOT NULL CHECK (time_limit_secs >= 0),
                    started_at TEXT NOT NULL,
                    finished_at TEXT,
                    total_attempted INTEGER NOT NULL CHECK (total_attempted >= 0),
                    correct_count INTEGER NOT NULL CHECK (correct_count >= 0),
                    duration_secs INTEGER NOT NULL CHECK (duration_secs >= 0)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS attempt_questions (
                    attempt_id INTEGER NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    question_id INTEGER NOT NULL,
                    PRIMARY KEY (attempt_id, position),
                    FOREIGN KEY (attempt_id) REFERENCES attempts(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS attempt_items (
                    id INTEGER PRIMARY KEY,
                    attempt_id INTEGER NOT NULL,
                    question_id INTEGER NOT NULL,
                    selected_key TEXT NOT NULL CHECK (selected_key IN ('A','B','C','D','E')),
                    correct_key TEXT NOT NULL CHECK (correct_key IN ('A','B','C','D','E')),
                    topic TEXT NOT NULL,
                    position INTEGER NOT NULL CHECK (position >= 0),
                    answered_at TEXT NOT NULL,
                    FOREIGN KEY (attempt_id) REFERENCES attempts(id) ON DELETE CASCADE
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE TABLE IF NOT EXISTS question_progress (
                    owner_kind TEXT NOT NULL CHECK (owner_kind IN ('user','device')),
                    owner_id TEXT NOT NULL,
                    question_id INTEGER NOT NULL,
                    attempts INTEGER NOT NULL CHECK (attempts >= 0),
                    last_selected TEXT,
                    last_correct INTEGER,
                    flagged INTEGER NOT NULL CHECK (flagged IN (0, 1)),
                    notes TEXT NOT NULL,
                    time_spent_secs INTEGER NOT NULL CHECK (time_spent_secs >= 0),
                    last_action_at TEXT NOT NULL,
                    PRIMARY KEY (owner_kind, owner_id, question_id)
                );
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_questions_status_exam_topic
                    ON questions (status, exam_type, topic);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_attempts_user_started
                    ON attempts (user_id, started_at);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                CREATE INDEX IF NOT EXISTS idx_attempt_items_attempt_position
                    ON attempt_items (attempt_id, position);
            ",
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!("applied schema migration v1");
    }

    Ok(())
}
