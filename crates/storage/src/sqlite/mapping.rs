use quiz_core::model::{
    AnswerKey, Attempt, AttemptId, AttemptItem, Difficulty, DeviceId, Mode, ProgressOwner,
    Question, QuestionId, QuestionOption, QuestionProgress, ReviewStatus, UserId,
};
use sqlx::Row;
use uuid::Uuid;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn attempt_id_from_i64(v: i64) -> Result<AttemptId, StorageError> {
    Ok(AttemptId::new(i64_to_u64("attempt_id", v)?))
}

pub(crate) fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn parse_answer_key(s: &str) -> Result<AnswerKey, StorageError> {
    s.parse::<AnswerKey>().map_err(ser)
}

pub(crate) fn parse_mode(s: &str) -> Result<Mode, StorageError> {
    s.parse::<Mode>().map_err(ser)
}

pub(crate) fn parse_difficulty(s: &str) -> Result<Difficulty, StorageError> {
    s.parse::<Difficulty>().map_err(ser)
}

pub(crate) fn parse_status(s: &str) -> Result<ReviewStatus, StorageError> {
    s.parse::<ReviewStatus>().map_err(ser)
}

pub(crate) fn parse_uuid(field: &'static str, s: &str) -> Result<Uuid, StorageError> {
    Uuid::parse_str(s).map_err(|_| StorageError::Serialization(format!("invalid {field}: {s}")))
}

/// Storage encoding for a progress owner: discriminant column plus UUID text.
pub(crate) fn owner_to_columns(owner: ProgressOwner) -> (&'static str, String) {
    match owner {
        ProgressOwner::User(id) => ("user", id.value().to_string()),
        ProgressOwner::Device(id) => ("device", id.value().to_string()),
    }
}

/// This must stay consistent with `owner_to_columns`.
pub(crate) fn owner_from_columns(kind: &str, id: &str) -> Result<ProgressOwner, StorageError> {
    let uuid = parse_uuid("owner_id", id)?;
    match kind {
        "user" => Ok(ProgressOwner::User(UserId::new(uuid))),
        "device" => Ok(ProgressOwner::Device(DeviceId::new(uuid))),
        other => Err(StorageError::Serialization(format!(
            "invalid owner_kind: {other}"
        ))),
    }
}

/// Assemble a domain question from its row and its ordered option rows.
pub(crate) fn build_question(
    row: &sqlx::sqlite::SqliteRow,
    options: Vec<QuestionOption>,
) -> Result<Question, StorageError> {
    let id = question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let stem: String = row.try_get("stem").map_err(ser)?;
    let correct = parse_answer_key(row.try_get::<String, _>("correct_key").map_err(ser)?.as_str())?;
    let exam_type: String = row.try_get("exam_type").map_err(ser)?;
    let topic: String = row.try_get("topic").map_err(ser)?;
    let subtopic: Option<String> = row.try_get("subtopic").map_err(ser)?;
    let difficulty =
        parse_difficulty(row.try_get::<String, _>("difficulty").map_err(ser)?.as_str())?;
    let status = parse_status(row.try_get::<String, _>("status").map_err(ser)?.as_str())?;

    Question::new(
        id, stem, options, correct, exam_type, topic, subtopic, difficulty, status,
    )
    .map_err(ser)
}

/// Assemble a domain attempt from its row and its ordered question-ID list.
pub(crate) fn build_attempt(
    row: &sqlx::sqlite::SqliteRow,
    question_ids: Vec<QuestionId>,
) -> Result<Attempt, StorageError> {
    let id = attempt_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
    let user_id = UserId::new(parse_uuid(
        "user_id",
        row.try_get::<String, _>("user_id").map_err(ser)?.as_str(),
    )?);
    let mode = parse_mode(row.try_get::<String, _>("mode").map_err(ser)?.as_str())?;
    let exam_type: String = row.try_get("exam_type").map_err(ser)?;
    let topic: Option<String> = row.try_get("topic").map_err(ser)?;
    let time_limit_secs = u32_from_i64(
        "time_limit_secs",
        row.try_get::<i64, _>("time_limit_secs").map_err(ser)?,
    )?;
    let started_at = row.try_get("started_at").map_err(ser)?;
    let finished_at = row.try_get("finished_at").map_err(ser)?;
    let total_attempted = u32_from_i64(
        "total_attempted",
        row.try_get::<i64, _>("total_attempted").map_err(ser)?,
    )?;
    let correct_count = u32_from_i64(
        "correct_count",
        row.try_get::<i64, _>("correct_count").map_err(ser)?,
    )?;
    let duration_secs = u32_from_i64(
        "duration_secs",
        row.try_get::<i64, _>("duration_secs").map_err(ser)?,
    )?;

    Attempt::from_persisted(
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
    )
    .map_err(ser)
}

pub(crate) fn map_item_row(row: &sqlx::sqlite::SqliteRow) -> Result<AttemptItem, StorageError> {
    Ok(AttemptItem::new(
        attempt_id_from_i64(row.try_get::<i64, _>("attempt_id").map_err(ser)?)?,
        question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?,
        parse_answer_key(
            row.try_get::<String, _>("selected_key").map_err(ser)?.as_str(),
        )?,
        parse_answer_key(
            row.try_get::<String, _>("correct_key").map_err(ser)?.as_str(),
        )?,
        row.try_get::<String, _>("topic").map_err(ser)?,
        u32_from_i64("position", row.try_get::<i64, _>("position").map_err(ser)?)?,
        row.try_get("answered_at").map_err(ser)?,
    ))
}

pub(crate) fn map_progress_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<QuestionProgress, StorageError> {
    let owner = owner_from_columns(
        row.try_get::<String, _>("owner_kind").map_err(ser)?.as_str(),
        row.try_get::<String, _>("owner_id").map_err(ser)?.as_str(),
    )?;
    let question_id = question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?;
    let attempts = u32_from_i64("attempts", row.try_get::<i64, _>("attempts").map_err(ser)?)?;
    let last_selected = row
        .try_get::<Option<String>, _>("last_selected")
        .map_err(ser)?
        .map(|s| parse_answer_key(s.as_str()))
        .transpose()?;
    let last_correct: Option<bool> = row.try_get("last_correct").map_err(ser)?;
    let flagged: bool = row.try_get("flagged").map_err(ser)?;
    let notes: String = row.try_get("notes").map_err(ser)?;
    let time_spent_i64: i64 = row.try_get("time_spent_secs").map_err(ser)?;
    let time_spent_secs = u64::try_from(time_spent_i64).map_err(|_| {
        StorageError::Serialization(format!("invalid time_spent_secs: {time_spent_i64}"))
    })?;
    let last_action_at = row.try_get("last_action_at").map_err(ser)?;

    Ok(QuestionProgress::from_persisted(
        owner,
        question_id,
        attempts,
        last_selected,
        last_correct,
        flagged,
        notes,
        time_spent_secs,
        last_action_at,
    ))
}
