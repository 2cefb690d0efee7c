#![forbid(unsafe_code)]

pub mod error;
pub mod progress_tracker;
pub mod question_store;
pub mod sessions;

pub use quiz_core::Clock;
pub use sessions as session;

pub use error::{ProgressTrackerError, SessionError};
pub use progress_tracker::ProgressTracker;
pub use question_store::{HttpQuestionStore, QuestionStoreError};

pub use sessions::{
    AttemptListItem, AttemptLoopService, AttemptReportService, KeyPress, SelectionTier, Selector,
    SelectorConfig, SessionAnswerResult, SessionCommand, SessionPlan, SessionProgress,
    SessionService, SessionState, StartConfig,
};
