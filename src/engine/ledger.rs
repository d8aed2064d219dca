use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::engine::error::StoreError;
use crate::engine::session::RunId;
use crate::engine::{QuestionId, UserId};

/// One submitted answer. Correctness is derived at write time from the
/// question's correct-option index and never recomputed.
#[derive(Debug, Clone)]
pub struct Answer {
    pub user_id: UserId,
    pub question_id: QuestionId,
    pub run_id: RunId,
    pub selected_option: usize,
    pub correct: bool,
    pub answered_at: DateTime<Utc>,
}

/// Append-only log of submitted answers. No update or delete; statistics are
/// computed by filtering over it.
pub trait AnswerLedger: Send + Sync {
    fn append(&self, answer: Answer) -> Result<(), StoreError>;

    fn find_by_user(&self, user: UserId) -> Result<Vec<Answer>, StoreError>;

    fn find_by_question(&self, question: QuestionId) -> Result<Vec<Answer>, StoreError>;

    fn find_by_run(&self, user: UserId, run: RunId) -> Result<Vec<Answer>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryAnswerLedger {
    answers: Mutex<Vec<Answer>>,
}

impl InMemoryAnswerLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AnswerLedger for InMemoryAnswerLedger {
    fn append(&self, answer: Answer) -> Result<(), StoreError> {
        log::debug!(
            "user {} answered question {} with option {} ({})",
            answer.user_id,
            answer.question_id,
            answer.selected_option,
            if answer.correct { "correct" } else { "wrong" }
        );
        let mut answers = self.answers.lock().map_err(|_| StoreError::Poisoned)?;
        answers.push(answer);
        Ok(())
    }

    fn find_by_user(&self, user: UserId) -> Result<Vec<Answer>, StoreError> {
        let answers = self.answers.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(answers.iter().filter(|a| a.user_id == user).cloned().collect())
    }

    fn find_by_question(&self, question: QuestionId) -> Result<Vec<Answer>, StoreError> {
        let answers = self.answers.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(answers
            .iter()
            .filter(|a| a.question_id == question)
            .cloned()
            .collect())
    }

    fn find_by_run(&self, user: UserId, run: RunId) -> Result<Vec<Answer>, StoreError> {
        let answers = self.answers.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(answers
            .iter()
            .filter(|a| a.user_id == user && a.run_id == run)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn answer(user: UserId, question: QuestionId, run: RunId, correct: bool) -> Answer {
        Answer {
            user_id: user,
            question_id: question,
            run_id: run,
            selected_option: 0,
            correct,
            answered_at: Utc::now(),
        }
    }

    #[test]
    fn filters_by_user_question_and_run() {
        let ledger = InMemoryAnswerLedger::new();
        let run_a = Uuid::new_v4();
        let run_b = Uuid::new_v4();

        ledger.append(answer(1, 10, run_a, true)).unwrap();
        ledger.append(answer(1, 11, run_a, false)).unwrap();
        ledger.append(answer(1, 10, run_b, true)).unwrap();
        ledger.append(answer(2, 10, run_b, false)).unwrap();

        assert_eq!(ledger.find_by_user(1).unwrap().len(), 3);
        assert_eq!(ledger.find_by_question(10).unwrap().len(), 3);
        assert_eq!(ledger.find_by_run(1, run_a).unwrap().len(), 2);
        assert_eq!(ledger.find_by_run(2, run_a).unwrap().len(), 0);
    }
}
