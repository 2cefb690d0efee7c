use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::QuestionId;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question stem must not be empty")]
    EmptyStem,

    #[error("question must carry between 2 and 5 options, got {0}")]
    InvalidOptionCount(usize),

    #[error("correct key {key} does not address any of the {options} options")]
    KeyOutOfRange { key: AnswerKey, options: usize },

    #[error("invalid answer key: {0:?}")]
    InvalidKey(String),

    #[error("invalid answer index: {0}")]
    InvalidIndex(usize),

    #[error("invalid difficulty: {0:?}")]
    InvalidDifficulty(String),

    #[error("invalid review status: {0:?}")]
    InvalidStatus(String),
}

//
// ─── ANSWER KEY ────────────────────────────────────────────────────────────────
//

/// Normalized correct-option indicator.
///
/// Upstream question stores represent the correct option either as a letter
/// key or as a zero-based index. Both are reconciled into this single
/// representation at the ingestion boundary; everything past that point
/// compares `AnswerKey` values only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AnswerKey {
    A,
    B,
    C,
    D,
    E,
}

impl AnswerKey {
    /// Converts a zero-based option index into a letter key.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::InvalidIndex` for indices past `E`.
    pub fn from_index(index: usize) -> Result<Self, QuestionError> {
        match index {
            0 => Ok(Self::A),
            1 => Ok(Self::B),
            2 => Ok(Self::C),
            3 => Ok(Self::D),
            4 => Ok(Self::E),
            other => Err(QuestionError::InvalidIndex(other)),
        }
    }

    /// Zero-based index of this key within an option list.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
            Self::C => 2,
            Self::D => 3,
            Self::E => 4,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::E => "E",
        }
    }
}

impl fmt::Display for AnswerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnswerKey {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(Self::A),
            "B" | "b" => Ok(Self::B),
            "C" | "c" => Ok(Self::C),
            "D" | "d" => Ok(Self::D),
            "E" | "e" => Ok(Self::E),
            other => Err(QuestionError::InvalidKey(other.to_string())),
        }
    }
}

//
// ─── CLASSIFICATION ────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(QuestionError::InvalidDifficulty(other.to_string())),
        }
    }
}

/// Content-review lifecycle of a question. Only `Approved` questions are
/// eligible for delivery; the review workflow itself lives outside this
/// engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Draft,
    UnderReview,
    Approved,
    Archived,
}

impl ReviewStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Archived => "archived",
        }
    }
}

impl FromStr for ReviewStatus {
    type Err = QuestionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(Self::Draft),
            "under_review" => Ok(Self::UnderReview),
            "approved" => Ok(Self::Approved),
            "archived" => Ok(Self::Archived),
            other => Err(QuestionError::InvalidStatus(other.to_string())),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// One answer option: the visible text plus an optional rationale shown
/// after reveal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub text: String,
    pub rationale: Option<String>,
}

impl QuestionOption {
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rationale: None,
        }
    }

    #[must_use]
    pub fn with_rationale(text: impl Into<String>, rationale: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            rationale: Some(rationale.into()),
        }
    }
}

/// A multiple-choice exam question.
///
/// Immutable once approved; owned by the external content-review workflow.
/// The engine only ever reads these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    stem: String,
    options: Vec<QuestionOption>,
    correct: AnswerKey,
    exam_type: String,
    topic: String,
    subtopic: Option<String>,
    difficulty: Difficulty,
    status: ReviewStatus,
}

impl Question {
    /// Builds a question, validating the stem, the option count (2–5) and
    /// that the correct key addresses an existing option.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` when any structural rule is violated.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: QuestionId,
        stem: impl Into<String>,
        options: Vec<QuestionOption>,
        correct: AnswerKey,
        exam_type: impl Into<String>,
        topic: impl Into<String>,
        subtopic: Option<String>,
        difficulty: Difficulty,
        status: ReviewStatus,
    ) -> Result<Self, QuestionError> {
        let stem = stem.into();
        if stem.trim().is_empty() {
            return Err(QuestionError::EmptyStem);
        }
        if options.len() < 2 || options.len() > 5 {
            return Err(QuestionError::InvalidOptionCount(options.len()));
        }
        if correct.index() >= options.len() {
            return Err(QuestionError::KeyOutOfRange {
                key: correct,
                options: options.len(),
            });
        }

        Ok(Self {
            id,
            stem,
            options,
            correct,
            exam_type: exam_type.into(),
            topic: topic.into(),
            subtopic,
            difficulty,
            status,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn stem(&self) -> &str {
        &self.stem
    }

    #[must_use]
    pub fn options(&self) -> &[QuestionOption] {
        &self.options
    }

    /// The option addressed by the given key, if it exists on this question.
    #[must_use]
    pub fn option(&self, key: AnswerKey) -> Option<&QuestionOption> {
        self.options.get(key.index())
    }

    #[must_use]
    pub fn correct_key(&self) -> AnswerKey {
        self.correct
    }

    #[must_use]
    pub fn exam_type(&self) -> &str {
        &self.exam_type
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn subtopic(&self) -> Option<&str> {
        self.subtopic.as_deref()
    }

    #[must_use]
    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    #[must_use]
    pub fn status(&self) -> ReviewStatus {
        self.status
    }

    /// Whether the given key is a valid selection for this question.
    #[must_use]
    pub fn accepts(&self, key: AnswerKey) -> bool {
        key.index() < self.options.len()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;

    fn options(n: usize) -> Vec<QuestionOption> {
        (0..n).map(|i| QuestionOption::new(format!("opt {i}"))).collect()
    }

    fn build_question(n_options: usize, correct: AnswerKey) -> Result<Question, QuestionError> {
        Question::new(
            QuestionId::new(1),
            "What is 2 + 2?",
            options(n_options),
            correct,
            "math-basic",
            "arithmetic",
            None,
            Difficulty::Easy,
            ReviewStatus::Approved,
        )
    }

    #[test]
    fn key_from_index_maps_to_letters() {
        assert_eq!(AnswerKey::from_index(0).unwrap(), AnswerKey::A);
        assert_eq!(AnswerKey::from_index(4).unwrap(), AnswerKey::E);
        assert!(matches!(
            AnswerKey::from_index(5),
            Err(QuestionError::InvalidIndex(5))
        ));
    }

    #[test]
    fn key_parses_letters_case_insensitively() {
        assert_eq!("c".parse::<AnswerKey>().unwrap(), AnswerKey::C);
        assert_eq!(" B ".parse::<AnswerKey>().unwrap(), AnswerKey::B);
        assert!("F".parse::<AnswerKey>().is_err());
    }

    #[test]
    fn question_rejects_bad_option_counts() {
        assert!(matches!(
            build_question(1, AnswerKey::A),
            Err(QuestionError::InvalidOptionCount(1))
        ));
        assert!(matches!(
            build_question(6, AnswerKey::A),
            Err(QuestionError::InvalidOptionCount(6))
        ));
        assert!(build_question(2, AnswerKey::A).is_ok());
        assert!(build_question(5, AnswerKey::E).is_ok());
    }

    #[test]
    fn question_rejects_key_past_options() {
        let err = build_question(3, AnswerKey::D).unwrap_err();
        assert!(matches!(
            err,
            QuestionError::KeyOutOfRange {
                key: AnswerKey::D,
                options: 3
            }
        ));
    }

    #[test]
    fn question_rejects_blank_stem() {
        let err = Question::new(
            QuestionId::new(1),
            "   ",
            options(4),
            AnswerKey::A,
            "math-basic",
            "arithmetic",
            None,
            Difficulty::Easy,
            ReviewStatus::Approved,
        )
        .unwrap_err();
        assert!(matches!(err, QuestionError::EmptyStem));
    }

    #[test]
    fn accepts_only_keys_within_option_range() {
        let q = build_question(3, AnswerKey::B).unwrap();
        assert!(q.accepts(AnswerKey::C));
        assert!(!q.accepts(AnswerKey::D));
        assert_eq!(q.option(AnswerKey::A).unwrap().text, "opt 0");
        assert!(q.option(AnswerKey::E).is_none());
    }

    #[test]
    fn status_and_difficulty_round_trip_strings() {
        assert_eq!(
            "under_review".parse::<ReviewStatus>().unwrap(),
            ReviewStatus::UnderReview
        );
        assert_eq!(ReviewStatus::Approved.as_str(), "approved");
        assert_eq!("hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("brutal".parse::<Difficulty>().is_err());
    }
}
