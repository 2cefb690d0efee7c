use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid mode: {0:?}")]
pub struct ParseModeError(String);

/// Delivery mode of an attempt.
///
/// - `Practice`: untimed, feedback revealed per question.
/// - `Test`: hard-timed, feedback revealed per question.
/// - `Exam`: hard-timed, feedback withheld until the attempt finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Practice,
    Test,
    Exam,
}

impl Mode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Practice => "practice",
            Self::Test => "test",
            Self::Exam => "exam",
        }
    }

    /// The policy value object that parameterizes the session state machine.
    ///
    /// One session implementation serves every mode; the differences between
    /// them live entirely in this value.
    #[must_use]
    pub fn policy(self) -> ModePolicy {
        match self {
            Self::Practice => ModePolicy {
                immediate_feedback: true,
                timed: false,
            },
            Self::Test => ModePolicy {
                immediate_feedback: true,
                timed: true,
            },
            Self::Exam => ModePolicy {
                immediate_feedback: false,
                timed: true,
            },
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "practice" => Ok(Self::Practice),
            "test" => Ok(Self::Test),
            "exam" => Ok(Self::Exam),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

/// How a session behaves for a given mode.
///
/// `immediate_feedback` controls whether a submission reveals correctness on
/// the spot or defers it to the final report. `timed` controls whether the
/// attempt's configured time limit is armed at all. The fixed question-ID
/// list persisted on the attempt is authoritative in every mode; resume
/// never reshuffles or re-queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModePolicy {
    pub immediate_feedback: bool,
    pub timed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policies_differ_only_where_modes_do() {
        assert_eq!(
            Mode::Practice.policy(),
            ModePolicy {
                immediate_feedback: true,
                timed: false
            }
        );
        assert_eq!(
            Mode::Test.policy(),
            ModePolicy {
                immediate_feedback: true,
                timed: true
            }
        );
        assert_eq!(
            Mode::Exam.policy(),
            ModePolicy {
                immediate_feedback: false,
                timed: true
            }
        );
    }

    #[test]
    fn mode_round_trips_strings() {
        for mode in [Mode::Practice, Mode::Test, Mode::Exam] {
            assert_eq!(mode.as_str().parse::<Mode>().unwrap(), mode);
        }
        assert!("marathon".parse::<Mode>().is_err());
    }
}
