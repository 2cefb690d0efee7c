use quiz_core::model::AnswerKey;

use super::service::{QuestionPhase, SessionService};

/// Keyboard input the embedding shell forwards to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPress {
    /// Digit keys 1-5 select the matching option letter.
    Digit(u8),
    ArrowLeft,
    ArrowRight,
    Enter,
}

/// What a key press should do to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Select(AnswerKey),
    Prev,
    Next,
    Submit,
}

impl SessionService {
    /// Map a key press to a session command.
    ///
    /// Shortcuts are dead once the session is terminal; digits map only to
    /// options that exist on the current question, and Enter submits only
    /// while a pending selection is waiting.
    #[must_use]
    pub fn map_key(&self, key: KeyPress) -> Option<SessionCommand> {
        if self.state().is_terminal() {
            return None;
        }
        match key {
            KeyPress::Digit(n @ 1..=5) => {
                let key = AnswerKey::from_index(usize::from(n) - 1).ok()?;
                let question = self.current_question()?;
                (question.accepts(key) && self.current_phase() == QuestionPhase::Answering)
                    .then_some(SessionCommand::Select(key))
            }
            KeyPress::Digit(_) => None,
            KeyPress::ArrowLeft => Some(SessionCommand::Prev),
            KeyPress::ArrowRight => Some(SessionCommand::Next),
            KeyPress::Enter => self
                .pending_selection()
                .is_some()
                .then_some(SessionCommand::Submit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{
        AttemptDraft, AttemptId, Difficulty, Mode, Question, QuestionId, QuestionOption,
        ReviewStatus, UserId,
    };
    use quiz_core::time::fixed_now;
    use uuid::Uuid;

    fn build_session() -> SessionService {
        let question = Question::new(
            QuestionId::new(1),
            "Stem",
            vec![
                QuestionOption::new("first"),
                QuestionOption::new("second"),
                QuestionOption::new("third"),
            ],
            AnswerKey::A,
            "math-basic",
            "algebra",
            None,
            Difficulty::Easy,
            ReviewStatus::Approved,
        )
        .unwrap();
        let attempt = AttemptDraft {
            user_id: UserId::new(Uuid::nil()),
            mode: Mode::Practice,
            exam_type: "math-basic".into(),
            topic: None,
            question_ids: vec![question.id()],
            time_limit_secs: 0,
            started_at: fixed_now(),
        }
        .validate()
        .unwrap()
        .assign_id(AttemptId::new(1));

        SessionService::new(attempt, vec![question]).unwrap()
    }

    #[test]
    fn digits_map_to_existing_options_only() {
        let session = build_session();
        assert_eq!(
            session.map_key(KeyPress::Digit(1)),
            Some(SessionCommand::Select(AnswerKey::A))
        );
        assert_eq!(
            session.map_key(KeyPress::Digit(3)),
            Some(SessionCommand::Select(AnswerKey::C))
        );
        // question has three options; 4 maps to nothing
        assert_eq!(session.map_key(KeyPress::Digit(4)), None);
        assert_eq!(session.map_key(KeyPress::Digit(0)), None);
    }

    #[test]
    fn enter_requires_a_pending_selection() {
        let mut session = build_session();
        assert_eq!(session.map_key(KeyPress::Enter), None);

        session.select(AnswerKey::B).unwrap();
        assert_eq!(session.map_key(KeyPress::Enter), Some(SessionCommand::Submit));
    }

    #[test]
    fn shortcuts_die_in_terminal_states() {
        let mut session = build_session();
        session.finish(fixed_now()).unwrap();

        assert_eq!(session.map_key(KeyPress::Digit(1)), None);
        assert_eq!(session.map_key(KeyPress::ArrowRight), None);
        assert_eq!(session.map_key(KeyPress::Enter), None);
    }

    #[test]
    fn arrows_map_to_navigation() {
        let session = build_session();
        assert_eq!(session.map_key(KeyPress::ArrowLeft), Some(SessionCommand::Prev));
        assert_eq!(session.map_key(KeyPress::ArrowRight), Some(SessionCommand::Next));
    }
}
