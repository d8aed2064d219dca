use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::thread_rng;
use thiserror::Error;

use crate::engine::{QuestionId, TopicId};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Topic {
    pub id: TopicId,
    pub name: String,
}

/// One quiz question. Immutable once loaded: the option list always has at
/// least two entries and `correct_option` always indexes into it (enforced by
/// the catalog loader).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub text: String,
    pub options: Vec<String>,
    pub correct_option: usize,
    pub topic_id: TopicId,
}

/// Supplies the topic catalog and question picks for quiz runs. The engine
/// relies on `random_questions_for_topics` never returning two questions with
/// the same id within one call.
pub trait QuestionSource: Send + Sync {
    fn topics(&self) -> Vec<Topic>;

    fn question(&self, id: QuestionId) -> Option<Question>;

    fn question_count(&self) -> usize;

    /// Uniform pick from the whole catalog; `None` if the catalog is empty.
    fn random_question(&self) -> Option<Question>;

    /// At most `count` distinct questions whose topic is in `topic_ids`, in
    /// an unspecified but fixed order. Never pads with duplicates. An empty
    /// `topic_ids` yields the full catalog or nothing depending on the
    /// source's fallback policy.
    fn random_questions_for_topics(
        &self,
        topic_ids: &HashSet<TopicId>,
        count: usize,
    ) -> Vec<Question>;
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse catalog file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("question {id}: {reason}")]
    InvalidQuestion { id: QuestionId, reason: &'static str },
}

#[derive(Debug, serde::Deserialize)]
struct CatalogFile {
    topics: Vec<Topic>,
    questions: Vec<Question>,
}

/// Question catalog held in memory, loaded from a JSON seed file at startup.
#[derive(Debug)]
pub struct InMemoryQuestionSource {
    topics: Vec<Topic>,
    questions: Vec<Question>,
    by_id: HashMap<QuestionId, usize>,
    /// Whether an empty topic set falls back to the full catalog. Explicit
    /// policy choice, configured at construction time.
    empty_selection_fallback: bool,
}

impl InMemoryQuestionSource {
    pub fn new(
        topics: Vec<Topic>,
        questions: Vec<Question>,
        empty_selection_fallback: bool,
    ) -> Result<Self, CatalogError> {
        let topic_ids: HashSet<TopicId> = topics.iter().map(|t| t.id).collect();
        let mut by_id = HashMap::with_capacity(questions.len());

        for (idx, question) in questions.iter().enumerate() {
            if question.options.len() < 2 {
                return Err(CatalogError::InvalidQuestion {
                    id: question.id,
                    reason: "needs at least two options",
                });
            }
            if question.correct_option >= question.options.len() {
                return Err(CatalogError::InvalidQuestion {
                    id: question.id,
                    reason: "correct option index out of bounds",
                });
            }
            if !topic_ids.contains(&question.topic_id) {
                return Err(CatalogError::InvalidQuestion {
                    id: question.id,
                    reason: "references an unknown topic",
                });
            }
            if by_id.insert(question.id, idx).is_some() {
                return Err(CatalogError::InvalidQuestion {
                    id: question.id,
                    reason: "duplicate question id",
                });
            }
        }

        Ok(Self {
            topics,
            questions,
            by_id,
            empty_selection_fallback,
        })
    }

    pub fn from_file(
        path: impl AsRef<Path>,
        empty_selection_fallback: bool,
    ) -> Result<Self, CatalogError> {
        let file = File::open(path)?;
        let catalog: CatalogFile = serde_json::from_reader(BufReader::new(file))?;
        Self::new(catalog.topics, catalog.questions, empty_selection_fallback)
    }
}

impl QuestionSource for InMemoryQuestionSource {
    fn topics(&self) -> Vec<Topic> {
        self.topics.clone()
    }

    fn question(&self, id: QuestionId) -> Option<Question> {
        self.by_id.get(&id).map(|&idx| self.questions[idx].clone())
    }

    fn question_count(&self) -> usize {
        self.questions.len()
    }

    fn random_question(&self) -> Option<Question> {
        self.questions.choose(&mut thread_rng()).cloned()
    }

    fn random_questions_for_topics(
        &self,
        topic_ids: &HashSet<TopicId>,
        count: usize,
    ) -> Vec<Question> {
        let mut pool: Vec<Question> = if topic_ids.is_empty() {
            if !self.empty_selection_fallback {
                return Vec::new();
            }
            self.questions.clone()
        } else {
            self.questions
                .iter()
                .filter(|q| topic_ids.contains(&q.topic_id))
                .cloned()
                .collect()
        };

        pool.shuffle(&mut thread_rng());
        pool.truncate(count);
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(id: TopicId, name: &str) -> Topic {
        Topic {
            id,
            name: name.to_string(),
        }
    }

    fn question(id: QuestionId, topic_id: TopicId) -> Question {
        Question {
            id,
            text: format!("question {}", id),
            options: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            correct_option: 0,
            topic_id,
        }
    }

    fn source(questions: Vec<Question>, fallback: bool) -> InMemoryQuestionSource {
        InMemoryQuestionSource::new(vec![topic(1, "Math"), topic(2, "History")], questions, fallback)
            .unwrap()
    }

    #[test]
    fn rejects_question_with_one_option() {
        let mut q = question(1, 1);
        q.options.truncate(1);
        let err = InMemoryQuestionSource::new(vec![topic(1, "Math")], vec![q], false).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidQuestion { id: 1, .. }));
    }

    #[test]
    fn rejects_out_of_bounds_correct_option() {
        let mut q = question(1, 1);
        q.correct_option = 3;
        let err = InMemoryQuestionSource::new(vec![topic(1, "Math")], vec![q], false).unwrap_err();
        assert!(matches!(err, CatalogError::InvalidQuestion { id: 1, .. }));
    }

    #[test]
    fn rejects_unknown_topic_and_duplicate_id() {
        let err =
            InMemoryQuestionSource::new(vec![topic(1, "Math")], vec![question(1, 9)], false)
                .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidQuestion { .. }));

        let err = InMemoryQuestionSource::new(
            vec![topic(1, "Math")],
            vec![question(1, 1), question(1, 1)],
            false,
        )
        .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidQuestion { id: 1, .. }));
    }

    #[test]
    fn filters_by_topic_and_never_pads() {
        let src = source(
            vec![question(1, 1), question(2, 1), question(3, 2)],
            false,
        );
        let picked = src.random_questions_for_topics(&HashSet::from([1]), 20);

        assert_eq!(picked.len(), 2);
        assert!(picked.iter().all(|q| q.topic_id == 1));

        let ids: HashSet<QuestionId> = picked.iter().map(|q| q.id).collect();
        assert_eq!(ids.len(), picked.len(), "duplicate question in one pick");
    }

    #[test]
    fn respects_count_limit() {
        let src = source((1..=10).map(|id| question(id, 1)).collect(), false);
        let picked = src.random_questions_for_topics(&HashSet::from([1]), 4);
        assert_eq!(picked.len(), 4);
    }

    #[test]
    fn empty_selection_policy_is_explicit() {
        let questions = vec![question(1, 1), question(2, 2)];

        let no_fallback = source(questions.clone(), false);
        assert!(no_fallback
            .random_questions_for_topics(&HashSet::new(), 20)
            .is_empty());

        let with_fallback = source(questions, true);
        assert_eq!(
            with_fallback
                .random_questions_for_topics(&HashSet::new(), 20)
                .len(),
            2
        );
    }

    #[test]
    fn lookup_by_id() {
        let src = source(vec![question(5, 1)], false);
        assert_eq!(src.question(5).unwrap().id, 5);
        assert!(src.question(99).is_none());
    }

    #[test]
    fn random_question_on_empty_catalog_is_none() {
        let src = source(Vec::new(), false);
        assert!(src.random_question().is_none());
        assert_eq!(src.question_count(), 0);
    }
}
