//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{AnswerKey, AttemptError};
use storage::repository::StorageError;

use crate::question_store::QuestionStoreError;

/// Errors emitted by session services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// The selector exhausted every fallback tier without enough approved
    /// candidates. Non-fatal: the caller redirects to reconfiguration.
    #[error("not enough approved questions: requested {requested}, available {available}")]
    InsufficientQuestions { requested: u32, available: u32 },

    /// Attempt creation needs an identity; surfaced distinctly from load
    /// failures so the caller can prompt sign-in instead of a dead end.
    #[error("an authenticated user is required to start an attempt")]
    AuthRequired,

    #[error("attempt is already finished")]
    AlreadyFinished,

    #[error("this question already has a recorded answer")]
    AlreadyAnswered,

    #[error("no selection to submit")]
    NoSelection,

    #[error("selection {key} is not an option on this question")]
    InvalidSelection { key: AnswerKey },

    /// Loaded questions do not line up with the attempt's persisted ID
    /// list. The session never renders with partial question data.
    #[error("loaded questions do not match the attempt's question list")]
    QuestionListMismatch,

    #[error(transparent)]
    Attempt(#[from] AttemptError),

    #[error(transparent)]
    Load(#[from] QuestionStoreError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `ProgressTracker`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressTrackerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
