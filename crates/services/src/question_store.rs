//! HTTP client for a remote question store.
//!
//! The store is read-only from the engine's point of view: questions are
//! authored and approved by an external content-review workflow. Upstream
//! payloads are inconsistent about the correct-option indicator (some
//! tables carry a letter key, others a zero-based index), so this client is
//! the boundary where both are reconciled into `AnswerKey`.

use quiz_core::model::{
    AnswerKey, Difficulty, Question, QuestionId, QuestionOption, ReviewStatus,
};
use serde::Deserialize;
use storage::repository::{QuestionFilter, QuestionRepository, StorageError};
use thiserror::Error;

/// Errors emitted by `HttpQuestionStore`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuestionStoreError {
    #[error("question store request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("malformed question payload: {0}")]
    Malformed(String),
}

//
// ─── WIRE FORMAT ───────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Deserialize)]
struct OptionDto {
    text: String,
    #[serde(default)]
    rationale: Option<String>,
}

/// The two correct-answer encodings observed upstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum CorrectDto {
    Index(usize),
    Letter(String),
}

#[derive(Debug, Clone, Deserialize)]
struct QuestionDto {
    id: u64,
    stem: String,
    options: Vec<OptionDto>,
    correct: CorrectDto,
    exam_type: String,
    topic: String,
    #[serde(default)]
    subtopic: Option<String>,
    difficulty: String,
    status: String,
}

impl QuestionDto {
    fn into_question(self) -> Result<Question, QuestionStoreError> {
        let malformed = |e: &dyn std::fmt::Display| QuestionStoreError::Malformed(e.to_string());

        let correct = match &self.correct {
            CorrectDto::Index(i) => AnswerKey::from_index(*i).map_err(|e| malformed(&e))?,
            CorrectDto::Letter(s) => s.parse::<AnswerKey>().map_err(|e| malformed(&e))?,
        };
        let difficulty = self
            .difficulty
            .parse::<Difficulty>()
            .map_err(|e| malformed(&e))?;
        let status = self
            .status
            .parse::<ReviewStatus>()
            .map_err(|e| malformed(&e))?;
        let options = self
            .options
            .into_iter()
            .map(|o| match o.rationale {
                Some(r) => QuestionOption::with_rationale(o.text, r),
                None => QuestionOption::new(o.text),
            })
            .collect();

        Question::new(
            QuestionId::new(self.id),
            self.stem,
            options,
            correct,
            self.exam_type,
            self.topic,
            self.subtopic,
            difficulty,
            status,
        )
        .map_err(|e| malformed(&e))
    }
}

//
// ─── CLIENT ────────────────────────────────────────────────────────────────────
//

/// Thin reqwest client over the question store's JSON endpoints.
#[derive(Debug, Clone)]
pub struct HttpQuestionStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpQuestionStore {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn fetch_questions(
        &self,
        url: String,
        query: &[(&str, String)],
    ) -> Result<Vec<Question>, QuestionStoreError> {
        let response = self.client.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(QuestionStoreError::HttpStatus(status));
        }

        let body = response.bytes().await?;
        let dtos: Vec<QuestionDto> = serde_json::from_slice(&body)
            .map_err(|e| QuestionStoreError::Malformed(e.to_string()))?;

        dtos.into_iter().map(QuestionDto::into_question).collect()
    }

    /// List candidate questions matching the filter.
    ///
    /// # Errors
    ///
    /// Returns `QuestionStoreError` on transport failures, non-success
    /// statuses and payloads this client cannot reconcile.
    pub async fn list_questions(
        &self,
        filter: &QuestionFilter,
    ) -> Result<Vec<Question>, QuestionStoreError> {
        let mut query = vec![("status", filter.status.as_str().to_string())];
        if let Some(exam) = &filter.exam_type {
            query.push(("exam_type", exam.clone()));
        }
        if let Some(topic) = &filter.topic {
            query.push(("topic", topic.clone()));
        }
        if let Some(difficulty) = filter.difficulty {
            query.push(("difficulty", difficulty.as_str().to_string()));
        }

        self.fetch_questions(format!("{}/questions", self.base_url), &query)
            .await
    }

    /// Fetch questions by ID. The store guarantees no particular order;
    /// callers re-order by their own persisted ID list.
    ///
    /// # Errors
    ///
    /// Returns `QuestionStoreError` on transport or payload failures.
    pub async fn get_questions_by_ids(
        &self,
        ids: &[QuestionId],
    ) -> Result<Vec<Question>, QuestionStoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");

        self.fetch_questions(
            format!("{}/questions/by-ids", self.base_url),
            &[("ids", joined)],
        )
        .await
    }
}

fn store_err(e: QuestionStoreError) -> StorageError {
    match e {
        QuestionStoreError::Malformed(msg) => StorageError::Serialization(msg),
        other => StorageError::Connection(other.to_string()),
    }
}

#[async_trait::async_trait]
impl QuestionRepository for HttpQuestionStore {
    async fn upsert_question(&self, _question: &Question) -> Result<(), StorageError> {
        // authoring goes through the content-review workflow, never this client
        Err(StorageError::Unsupported("question store is read-only"))
    }

    async fn list_questions(&self, filter: &QuestionFilter) -> Result<Vec<Question>, StorageError> {
        HttpQuestionStore::list_questions(self, filter)
            .await
            .map_err(store_err)
    }

    async fn get_questions_by_ids(
        &self,
        ids: &[QuestionId],
    ) -> Result<Vec<Question>, StorageError> {
        let found = HttpQuestionStore::get_questions_by_ids(self, ids)
            .await
            .map_err(store_err)?;
        if found.len() != ids.len() {
            return Err(StorageError::NotFound);
        }
        Ok(found)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
