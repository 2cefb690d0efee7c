mod input;
mod plan;
mod progress;
mod queries;
mod service;
mod view;
mod workflow;

// Public API of the session subsystem.
pub use crate::error::SessionError;
pub use input::{KeyPress, SessionCommand};
pub use plan::{SelectionTier, Selector, SelectorConfig, SessionPlan};
pub use progress::SessionProgress;
pub use service::{QuestionPhase, SessionService, SessionState};
pub use view::{AttemptListItem, AttemptReportService};
pub use workflow::{
    AttemptLoopService, SNAPSHOT_INTERVAL_SECS, SessionAnswerResult, StartConfig,
};
