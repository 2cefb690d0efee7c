use rand::rng;
use rand::seq::SliceRandom;

use quiz_core::model::{Difficulty, QuestionId};
use storage::repository::{QuestionFilter, QuestionRepository};

use crate::error::SessionError;

/// Requested shape of a question selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorConfig {
    pub exam_type: String,
    pub topic: Option<String>,
    pub difficulty: Option<Difficulty>,
    pub count: u32,
}

/// Which relaxation level produced the candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTier {
    /// Exact match on exam type and topic.
    ExamAndTopic,
    /// Relaxed to exam type only.
    ExamOnly,
    /// Last resort: any approved question.
    AnyApproved,
}

/// Selection result: the ordered ID list to persist on the attempt, plus
/// the tier that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlan {
    pub question_ids: Vec<QuestionId>,
    pub tier: SelectionTier,
}

impl SessionPlan {
    #[must_use]
    pub fn total(&self) -> usize {
        self.question_ids.len()
    }
}

/// Turns a filter configuration into a fixed, ordered question-ID list.
///
/// Candidates come from a three-tier cascading query, stopping at the first
/// tier with any matches. The surviving pool is shuffled with a uniform
/// permutation (`SliceRandom::shuffle` is Fisher–Yates; sort-by-random-key
/// schemes are biased under ties and are not used) and truncated to the
/// requested count.
pub struct Selector;

impl Selector {
    fn tiers(config: &SelectorConfig) -> Vec<(SelectionTier, QuestionFilter)> {
        let mut tiers = Vec::with_capacity(3);
        if config.topic.is_some() {
            let mut filter = QuestionFilter::approved(config.exam_type.clone(), config.topic.clone());
            filter.difficulty = config.difficulty;
            tiers.push((SelectionTier::ExamAndTopic, filter));
        }
        let mut exam_only = QuestionFilter::approved(config.exam_type.clone(), None);
        exam_only.difficulty = config.difficulty;
        tiers.push((SelectionTier::ExamOnly, exam_only));
        tiers.push((SelectionTier::AnyApproved, QuestionFilter::any_approved()));
        tiers
    }

    /// Select exactly `config.count` question IDs.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InsufficientQuestions` when even the last
    /// tier cannot supply enough candidates; nothing is padded or silently
    /// truncated.
    pub async fn select(
        repo: &dyn QuestionRepository,
        config: &SelectorConfig,
    ) -> Result<SessionPlan, SessionError> {
        let tiers = Self::tiers(config);
        let first_tier = tiers[0].0;
        let mut chosen = None;
        for (tier, filter) in tiers {
            let candidates = repo.list_questions(&filter).await?;
            if !candidates.is_empty() {
                if tier != first_tier {
                    tracing::debug!(?tier, "selector relaxed its filter");
                }
                chosen = Some((tier, candidates));
                break;
            }
        }

        let Some((tier, candidates)) = chosen else {
            return Err(SessionError::InsufficientQuestions {
                requested: config.count,
                available: 0,
            });
        };

        if (candidates.len() as u64) < u64::from(config.count) {
            return Err(SessionError::InsufficientQuestions {
                requested: config.count,
                available: u32::try_from(candidates.len()).unwrap_or(u32::MAX),
            });
        }

        let mut ids: Vec<QuestionId> = candidates.iter().map(|q| q.id()).collect();
        let mut rng = rng();
        ids.as_mut_slice().shuffle(&mut rng);
        ids.truncate(usize::try_from(config.count).unwrap_or(usize::MAX));

        Ok(SessionPlan {
            question_ids: ids,
            tier,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use quiz_core::model::{AnswerKey, Question, QuestionOption, ReviewStatus};
    use std::collections::HashSet;
    use storage::repository::InMemoryRepository;

    fn build_question(id: u64, exam: &str, topic: &str, status: ReviewStatus) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Stem {id}"),
            vec![QuestionOption::new("x"), QuestionOption::new("y")],
            AnswerKey::A,
            exam,
            topic,
            None,
            Difficulty::Medium,
            status,
        )
        .unwrap()
    }

    async fn seed(repo: &InMemoryRepository, questions: &[Question]) {
        use storage::repository::QuestionRepository as _;
        for q in questions {
            repo.upsert_question(q).await.unwrap();
        }
    }

    fn config(exam: &str, topic: Option<&str>, count: u32) -> SelectorConfig {
        SelectorConfig {
            exam_type: exam.to_string(),
            topic: topic.map(ToString::to_string),
            difficulty: None,
            count,
        }
    }

    #[tokio::test]
    async fn tier_one_yields_a_permutation_of_matching_candidates() {
        let repo = InMemoryRepository::new();
        let corpus: Vec<Question> = (1..=12)
            .map(|id| build_question(id, "math-basic", "algebra", ReviewStatus::Approved))
            .collect();
        seed(&repo, &corpus).await;

        let plan = Selector::select(&repo, &config("math-basic", Some("algebra"), 8))
            .await
            .unwrap();

        assert_eq!(plan.tier, SelectionTier::ExamAndTopic);
        assert_eq!(plan.total(), 8);

        let unique: HashSet<_> = plan.question_ids.iter().collect();
        assert_eq!(unique.len(), 8);
        let valid: HashSet<_> = corpus.iter().map(Question::id).collect();
        assert!(plan.question_ids.iter().all(|id| valid.contains(id)));
    }

    #[tokio::test]
    async fn empty_topic_falls_back_to_exam_tier() {
        let repo = InMemoryRepository::new();
        let corpus: Vec<Question> = (1..=4)
            .map(|id| build_question(id, "math-basic", "geometry", ReviewStatus::Approved))
            .collect();
        seed(&repo, &corpus).await;

        // no algebra questions exist, but the exam has matches
        let plan = Selector::select(&repo, &config("math-basic", Some("algebra"), 3))
            .await
            .unwrap();

        assert_eq!(plan.tier, SelectionTier::ExamOnly);
        assert_eq!(plan.total(), 3);
    }

    #[tokio::test]
    async fn last_resort_tier_accepts_any_approved_question() {
        let repo = InMemoryRepository::new();
        seed(
            &repo,
            &[build_question(1, "physics", "optics", ReviewStatus::Approved)],
        )
        .await;

        let plan = Selector::select(&repo, &config("math-basic", Some("algebra"), 1))
            .await
            .unwrap();

        assert_eq!(plan.tier, SelectionTier::AnyApproved);
        assert_eq!(plan.question_ids, vec![QuestionId::new(1)]);
    }

    #[tokio::test]
    async fn exhausted_corpus_signals_insufficient_questions() {
        let repo = InMemoryRepository::new();
        seed(
            &repo,
            &[build_question(1, "math-basic", "algebra", ReviewStatus::Draft)],
        )
        .await;

        let err = Selector::select(&repo, &config("math-basic", Some("algebra"), 5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::InsufficientQuestions {
                requested: 5,
                available: 0
            }
        ));
    }

    #[tokio::test]
    async fn shortfall_is_signalled_rather_than_truncated() {
        let repo = InMemoryRepository::new();
        let corpus: Vec<Question> = (1..=3)
            .map(|id| build_question(id, "math-basic", "algebra", ReviewStatus::Approved))
            .collect();
        seed(&repo, &corpus).await;

        let err = Selector::select(&repo, &config("math-basic", Some("algebra"), 10))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::InsufficientQuestions {
                requested: 10,
                available: 3
            }
        ));
    }

    #[tokio::test]
    async fn draft_questions_never_enter_a_plan() {
        let repo = InMemoryRepository::new();
        seed(
            &repo,
            &[
                build_question(1, "math-basic", "algebra", ReviewStatus::Approved),
                build_question(2, "math-basic", "algebra", ReviewStatus::Draft),
                build_question(3, "math-basic", "algebra", ReviewStatus::Archived),
            ],
        )
        .await;

        let plan = Selector::select(&repo, &config("math-basic", Some("algebra"), 1))
            .await
            .unwrap();
        assert_eq!(plan.question_ids, vec![QuestionId::new(1)]);
    }
}
