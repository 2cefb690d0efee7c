use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::model::{AnswerKey, AttemptId, QuestionId};

//
// ─── ATTEMPT ITEM ──────────────────────────────────────────────────────────────
//

/// Immutable record of one answered question within an attempt.
///
/// The correct key is snapshotted at answer time so later edits to the
/// question never retroactively change history. Append-only: a re-answer is
/// a new logical event, not a mutation of this record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptItem {
    pub attempt_id: AttemptId,
    pub question_id: QuestionId,
    pub selected: AnswerKey,
    pub correct: AnswerKey,
    pub topic: String,
    /// Zero-based position of the question within the attempt's fixed list.
    pub position: u32,
    pub answered_at: DateTime<Utc>,
}

impl AttemptItem {
    #[must_use]
    pub fn new(
        attempt_id: AttemptId,
        question_id: QuestionId,
        selected: AnswerKey,
        correct: AnswerKey,
        topic: impl Into<String>,
        position: u32,
        answered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            attempt_id,
            question_id,
            selected,
            correct,
            topic: topic.into(),
            position,
            answered_at,
        }
    }

    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.selected == self.correct
    }
}

//
// ─── SCORE REPORT ──────────────────────────────────────────────────────────────
//

/// Aggregate correctness for one topic within an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScore {
    pub topic: String,
    pub correct: u32,
    pub total: u32,
}

/// Final result of a finished attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreReport {
    pub correct: u32,
    pub total: u32,
    /// Rounded; 0 when nothing was answered.
    pub percentage: u32,
    pub by_topic: Vec<TopicScore>,
}

impl ScoreReport {
    /// Build a report by grouping attempt items by topic.
    ///
    /// Topics are emitted in lexicographic order so the breakdown is stable
    /// across loads.
    #[must_use]
    pub fn from_items(items: &[AttemptItem]) -> Self {
        let mut correct = 0_u32;
        let mut by_topic: BTreeMap<&str, (u32, u32)> = BTreeMap::new();

        for item in items {
            let entry = by_topic.entry(item.topic.as_str()).or_insert((0, 0));
            entry.1 += 1;
            if item.is_correct() {
                entry.0 += 1;
                correct += 1;
            }
        }

        let total = u32::try_from(items.len()).unwrap_or(u32::MAX);
        let percentage = if total == 0 {
            0
        } else {
            let pct = f64::from(correct) * 100.0 / f64::from(total);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                pct.round() as u32
            }
        };

        Self {
            correct,
            total,
            percentage,
            by_topic: by_topic
                .into_iter()
                .map(|(topic, (correct, total))| TopicScore {
                    topic: topic.to_string(),
                    correct,
                    total,
                })
                .collect(),
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn item(question: u64, topic: &str, selected: AnswerKey, correct: AnswerKey) -> AttemptItem {
        AttemptItem::new(
            AttemptId::new(1),
            QuestionId::new(question),
            selected,
            correct,
            topic,
            0,
            fixed_now(),
        )
    }

    #[test]
    fn correctness_compares_snapshot_keys() {
        assert!(item(1, "algebra", AnswerKey::B, AnswerKey::B).is_correct());
        assert!(!item(1, "algebra", AnswerKey::A, AnswerKey::B).is_correct());
    }

    #[test]
    fn report_groups_by_topic() {
        let items = vec![
            item(1, "algebra", AnswerKey::A, AnswerKey::A),
            item(2, "algebra", AnswerKey::B, AnswerKey::C),
            item(3, "geometry", AnswerKey::D, AnswerKey::D),
        ];

        let report = ScoreReport::from_items(&items);

        assert_eq!(report.correct, 2);
        assert_eq!(report.total, 3);
        assert_eq!(report.percentage, 67);
        assert_eq!(report.by_topic.len(), 2);
        assert_eq!(report.by_topic[0].topic, "algebra");
        assert_eq!(report.by_topic[0].correct, 1);
        assert_eq!(report.by_topic[0].total, 2);
        assert_eq!(report.by_topic[1].topic, "geometry");
        assert_eq!(report.by_topic[1].correct, 1);
    }

    #[test]
    fn empty_report_is_zero_percent() {
        let report = ScoreReport::from_items(&[]);
        assert_eq!(report.correct, 0);
        assert_eq!(report.total, 0);
        assert_eq!(report.percentage, 0);
        assert!(report.by_topic.is_empty());
    }
}
