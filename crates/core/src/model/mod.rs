mod answer;
mod attempt;
mod ids;
mod mode;
mod progress;
mod question;

pub use answer::{AttemptItem, ScoreReport, TopicScore};
pub use attempt::{Attempt, AttemptDraft, AttemptError, ValidatedAttempt};
pub use ids::{AttemptId, DeviceId, ParseIdError, QuestionId, UserId};
pub use mode::{Mode, ModePolicy, ParseModeError};
pub use progress::{ProgressOwner, QuestionProgress};
pub use question::{
    AnswerKey, Difficulty, Question, QuestionError, QuestionOption, ReviewStatus,
};
