pub mod error;
pub mod ledger;
pub mod question;
pub mod selection;
pub mod session;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::engine::error::{EngineError, StoreError};
use crate::engine::ledger::{Answer, AnswerLedger};
use crate::engine::question::{Question, QuestionSource, Topic};
use crate::engine::selection::TopicSelectionStore;
use crate::engine::session::{QuizRun, SessionStore, State};

pub type UserId = u64;
pub type TopicId = i64;
pub type QuestionId = i64;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How many questions a quiz run is built from (fewer if the selected
    /// topics have less).
    pub quiz_len: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { quiz_len: 20 }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let quiz_len = std::env::var("QUIZ_LEN")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or_else(|| Self::default().quiz_len);
        Self { quiz_len }
    }
}

#[derive(Debug, Clone)]
pub enum StartOutcome {
    /// No topics selected yet: the user is moved into selection mode and
    /// gets the topic list to pick from.
    PresentTopics {
        topics: Vec<Topic>,
        selected: HashSet<TopicId>,
    },
    /// A selection was already present, a run was built from it.
    FirstQuestion(Question),
}

#[derive(Debug, Clone)]
pub struct SelectionView {
    pub topics: Vec<Topic>,
    pub selected: HashSet<TopicId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// The user has no quiz in progress.
    NoActiveQuiz,
    /// The submitted question is not the session's current question
    /// (duplicate or late delivery).
    StaleQuestion,
    /// The option index is outside the question's option list.
    InvalidOption,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuizStats {
    pub total: usize,
    pub correct: usize,
    pub wrong_questions: Vec<Question>,
}

#[derive(Debug, Clone)]
pub enum AnswerOutcome {
    NextQuestion { question: Question, correct: bool },
    Finished { stats: QuizStats, correct: bool },
    Rejected(RejectReason),
}

/// The quiz session state machine. All mutating operations for one user run
/// under that user's guard, so duplicate or interleaved events from the
/// transport cannot corrupt the session; events for different users do not
/// contend with each other.
pub struct QuizEngine {
    sessions: Arc<dyn SessionStore>,
    ledger: Arc<dyn AnswerLedger>,
    source: Arc<dyn QuestionSource>,
    selection: TopicSelectionStore,
    config: EngineConfig,
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl QuizEngine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        ledger: Arc<dyn AnswerLedger>,
        source: Arc<dyn QuestionSource>,
        config: EngineConfig,
    ) -> Self {
        Self {
            sessions,
            ledger,
            source,
            selection: TopicSelectionStore::new(),
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn user_guard(&self, user: UserId) -> Result<Arc<Mutex<()>>, StoreError> {
        let mut locks = self.locks.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(locks.entry(user).or_default().clone())
    }

    /// Start a quiz. With a pre-seeded topic selection this builds the run
    /// right away; otherwise the user is put into topic-selection mode.
    pub fn start_quiz(&self, user: UserId) -> Result<StartOutcome, EngineError> {
        let guard = self.user_guard(user)?;
        let _guard = guard.lock().map_err(|_| StoreError::Poisoned)?;

        let session = self.sessions.get_or_create(user)?;
        if session.state == State::QuizAsking {
            return Err(EngineError::validation(
                "a quiz is already in progress, answer the current question",
            ));
        }

        if self.source.question_count() == 0 {
            log::warn!("user {} wants a quiz but the catalog is empty", user);
            return Err(EngineError::not_found("no questions available"));
        }

        let selected = self.selection.peek(user)?;
        if !selected.is_empty() {
            let first = self.begin_run(user, &selected)?;
            self.selection.confirm(user)?;
            return Ok(StartOutcome::FirstQuestion(first));
        }

        let topics = self.source.topics();
        if topics.is_empty() {
            return Err(EngineError::not_found("no topics configured"));
        }

        self.sessions.set_state(user, State::SelectingTopics)?;
        log::info!("user {} is selecting topics", user);
        Ok(StartOutcome::PresentTopics { topics, selected })
    }

    /// Toggle one topic in the user's selection. Only valid while the user
    /// is in selection mode; late taps on an old keyboard are stale.
    pub fn toggle_topic(&self, user: UserId, topic: TopicId) -> Result<SelectionView, EngineError> {
        let guard = self.user_guard(user)?;
        let _guard = guard.lock().map_err(|_| StoreError::Poisoned)?;

        let session = self.sessions.get_or_create(user)?;
        if session.state != State::SelectingTopics {
            return Err(EngineError::stale(format!(
                "topic toggle while in {:?}",
                session.state
            )));
        }

        let selected = self.selection.toggle(user, topic)?;
        Ok(SelectionView {
            topics: self.source.topics(),
            selected,
        })
    }

    /// Confirm the selection and start the run. The selection is consumed
    /// only on success so the user can adjust it after a failed confirm.
    pub fn confirm_topics(&self, user: UserId) -> Result<Question, EngineError> {
        let guard = self.user_guard(user)?;
        let _guard = guard.lock().map_err(|_| StoreError::Poisoned)?;

        let session = self.sessions.get_or_create(user)?;
        if session.state != State::SelectingTopics {
            return Err(EngineError::stale(format!(
                "confirm while in {:?}",
                session.state
            )));
        }

        let selected = self.selection.peek(user)?;
        if selected.is_empty() {
            return Err(EngineError::validation("no topic chosen"));
        }

        let first = self.begin_run(user, &selected)?;
        self.selection.confirm(user)?;
        Ok(first)
    }

    /// Leave topic-selection mode without starting anything.
    pub fn cancel_topics(&self, user: UserId) -> Result<(), EngineError> {
        let guard = self.user_guard(user)?;
        let _guard = guard.lock().map_err(|_| StoreError::Poisoned)?;

        let session = self.sessions.get_or_create(user)?;
        if session.state != State::SelectingTopics {
            return Err(EngineError::stale(format!(
                "cancel while in {:?}",
                session.state
            )));
        }

        self.selection.cancel(user)?;
        self.sessions.set_state(user, State::IdleMenu)?;
        log::info!("user {} cancelled topic selection", user);
        Ok(())
    }

    /// Evaluate one submitted answer and advance the run. The submitted
    /// question must be the session's current question; anything else is a
    /// duplicate or late event and is rejected without touching the session.
    pub fn submit_answer(
        &self,
        user: UserId,
        question_id: QuestionId,
        option: usize,
    ) -> Result<AnswerOutcome, EngineError> {
        let guard = self.user_guard(user)?;
        let _guard = guard.lock().map_err(|_| StoreError::Poisoned)?;

        let session = self.sessions.get_or_create(user)?;
        if session.state != State::QuizAsking {
            log::debug!("user {} submitted an answer outside a quiz", user);
            return Ok(AnswerOutcome::Rejected(RejectReason::NoActiveQuiz));
        }

        let run = session.run.as_ref().ok_or(StoreError::NoActiveRun)?;
        let current = run
            .current_question()
            .cloned()
            .ok_or(StoreError::NoActiveRun)?;

        if current.id != question_id {
            log::debug!(
                "user {} answered question {} but {} is current, dropping",
                user,
                question_id,
                current.id
            );
            return Ok(AnswerOutcome::Rejected(RejectReason::StaleQuestion));
        }

        if option >= current.options.len() {
            log::debug!(
                "user {} picked option {} of {} for question {}",
                user,
                option,
                current.options.len(),
                current.id
            );
            return Ok(AnswerOutcome::Rejected(RejectReason::InvalidOption));
        }

        let correct = option == current.correct_option;
        self.ledger.append(Answer {
            user_id: user,
            question_id,
            run_id: run.id,
            selected_option: option,
            correct,
            answered_at: Utc::now(),
        })?;
        if correct {
            self.sessions.record_correct(user)?;
        }

        match self.sessions.advance(user)? {
            Some(next) => Ok(AnswerOutcome::NextQuestion {
                question: next,
                correct,
            }),
            None => {
                let finished = self.sessions.finish_run(user)?;
                let stats = self.run_stats(user, &finished)?;
                self.sessions.clear(user)?;
                log::info!(
                    "user {} finished run {} with {}/{} correct",
                    user,
                    finished.id,
                    stats.correct,
                    stats.total
                );
                Ok(AnswerOutcome::Finished { stats, correct })
            }
        }
    }

    /// Uniform pick from the whole catalog, independent of any session.
    pub fn random_question(&self) -> Option<Question> {
        self.source.random_question()
    }

    /// The question the user is currently asked, if any.
    pub fn current_question(&self, user: UserId) -> Result<Option<Question>, EngineError> {
        let guard = self.user_guard(user)?;
        let _guard = guard.lock().map_err(|_| StoreError::Poisoned)?;

        let session = self.sessions.get_or_create(user)?;
        Ok(session
            .run
            .as_ref()
            .and_then(|run| run.current_question().cloned()))
    }

    /// Lifetime statistics for one user, computed from the answer ledger on
    /// demand (there is no terminal run state to read them off).
    pub fn stats(&self, user: UserId) -> Result<QuizStats, EngineError> {
        let answers = self.ledger.find_by_user(user)?;
        let total = answers.len();
        let correct = answers.iter().filter(|a| a.correct).count();

        let mut seen = HashSet::new();
        let mut wrong_questions = Vec::new();
        for answer in answers.iter().filter(|a| !a.correct) {
            if seen.insert(answer.question_id) {
                if let Some(question) = self.source.question(answer.question_id) {
                    wrong_questions.push(question);
                }
            }
        }

        Ok(QuizStats {
            total,
            correct,
            wrong_questions,
        })
    }

    fn begin_run(&self, user: UserId, selected: &HashSet<TopicId>) -> Result<Question, EngineError> {
        let questions = self
            .source
            .random_questions_for_topics(selected, self.config.quiz_len);
        if questions.is_empty() {
            log::info!("no questions for topics {:?} of user {}", selected, user);
            return Err(EngineError::not_found("no questions for the selected topics"));
        }

        let run = QuizRun::new(user, questions);
        Ok(self.sessions.attach_run(user, run)?)
    }

    fn run_stats(&self, user: UserId, run: &QuizRun) -> Result<QuizStats, EngineError> {
        let answers = self.ledger.find_by_run(user, run.id)?;
        let total = answers.len();
        let correct = answers.iter().filter(|a| a.correct).count();
        let wrong_questions = answers
            .iter()
            .filter(|a| !a.correct)
            .filter_map(|a| run.questions.iter().find(|q| q.id == a.question_id))
            .cloned()
            .collect();

        Ok(QuizStats {
            total,
            correct,
            wrong_questions,
        })
    }
}
