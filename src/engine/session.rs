use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::engine::error::StoreError;
use crate::engine::question::Question;
use crate::engine::{QuestionId, UserId};

pub type RunId = Uuid;

/// Where a user currently is in the conversation. Finishing a quiz goes back
/// to `IdleMenu`; there is no separate finished state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    IdleMenu,
    SelectingTopics,
    QuizAsking,
}

/// One started quiz: a question sequence fixed at creation time, a cursor
/// into it, and the score accumulated so far. The sequence is never
/// re-ordered or re-fetched; a cursor equal to `questions.len()` means the
/// run is finished.
#[derive(Debug, Clone)]
pub struct QuizRun {
    pub id: RunId,
    pub user_id: UserId,
    pub questions: Vec<Question>,
    pub cursor: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub score: u32,
}

impl QuizRun {
    pub fn new(user_id: UserId, questions: Vec<Question>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            questions,
            cursor: 0,
            started_at: Utc::now(),
            finished_at: None,
            score: 0,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.cursor)
    }
}

/// Per-user singleton conversation record. Created lazily on first access,
/// mutated only through the store.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub state: State,
    pub run: Option<QuizRun>,
    pub current_question_id: Option<QuestionId>,
    pub last_active_at: DateTime<Utc>,
}

impl Session {
    fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            state: State::IdleMenu,
            run: None,
            current_question_id: None,
            last_active_at: Utc::now(),
        }
    }
}

/// Durable per-user session state. `advance` is the only operation that
/// moves a run's cursor, and it only ever moves it forward by one.
pub trait SessionStore: Send + Sync {
    /// Returns the user's session, creating an idle one on first access.
    fn get_or_create(&self, user: UserId) -> Result<Session, StoreError>;

    fn set_state(&self, user: UserId, state: State) -> Result<(), StoreError>;

    /// Attaches a fresh run: current question becomes the run's first
    /// question and the state becomes `QuizAsking`.
    fn attach_run(&self, user: UserId, run: QuizRun) -> Result<Question, StoreError>;

    /// Moves the cursor forward one step and returns the new current
    /// question, or `None` when the sequence is exhausted.
    fn advance(&self, user: UserId) -> Result<Option<Question>, StoreError>;

    /// Increments the active run's score by one.
    fn record_correct(&self, user: UserId) -> Result<(), StoreError>;

    /// Stamps `finished_at` on the active run and returns a snapshot of it.
    fn finish_run(&self, user: UserId) -> Result<QuizRun, StoreError>;

    /// Detaches the run and current question, back to `IdleMenu`.
    fn clear(&self, user: UserId) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<UserId, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_session<T>(
        &self,
        user: UserId,
        f: impl FnOnce(&mut Session) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut sessions = self.sessions.lock().map_err(|_| StoreError::Poisoned)?;
        let session = sessions.entry(user).or_insert_with(|| {
            log::info!("creating session for user {}", user);
            Session::new(user)
        });
        let result = f(session)?;
        session.last_active_at = Utc::now();
        Ok(result)
    }
}

impl SessionStore for InMemorySessionStore {
    fn get_or_create(&self, user: UserId) -> Result<Session, StoreError> {
        self.with_session(user, |session| Ok(session.clone()))
    }

    fn set_state(&self, user: UserId, state: State) -> Result<(), StoreError> {
        self.with_session(user, |session| {
            log::debug!("user {} state -> {:?}", user, state);
            session.state = state;
            Ok(())
        })
    }

    fn attach_run(&self, user: UserId, run: QuizRun) -> Result<Question, StoreError> {
        self.with_session(user, |session| {
            let first = run.questions.first().cloned().ok_or(StoreError::EmptyRun)?;
            log::info!(
                "user {} starts run {} with {} questions",
                user,
                run.id,
                run.questions.len()
            );
            session.current_question_id = Some(first.id);
            session.run = Some(run);
            session.state = State::QuizAsking;
            Ok(first)
        })
    }

    fn advance(&self, user: UserId) -> Result<Option<Question>, StoreError> {
        self.with_session(user, |session| {
            let run = session.run.as_mut().ok_or(StoreError::NoActiveRun)?;
            if run.cursor < run.questions.len() {
                run.cursor += 1;
            }
            let next = run.current_question().cloned();
            session.current_question_id = next.as_ref().map(|q| q.id);
            Ok(next)
        })
    }

    fn record_correct(&self, user: UserId) -> Result<(), StoreError> {
        self.with_session(user, |session| {
            let run = session.run.as_mut().ok_or(StoreError::NoActiveRun)?;
            run.score += 1;
            Ok(())
        })
    }

    fn finish_run(&self, user: UserId) -> Result<QuizRun, StoreError> {
        self.with_session(user, |session| {
            let run = session.run.as_mut().ok_or(StoreError::NoActiveRun)?;
            if run.finished_at.is_none() {
                run.finished_at = Some(Utc::now());
            }
            Ok(run.clone())
        })
    }

    fn clear(&self, user: UserId) -> Result<(), StoreError> {
        self.with_session(user, |session| {
            session.run = None;
            session.current_question_id = None;
            session.state = State::IdleMenu;
            log::debug!("cleared session for user {}", user);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: QuestionId) -> Question {
        Question {
            id,
            text: format!("question {}", id),
            options: vec!["a".to_string(), "b".to_string()],
            correct_option: 0,
            topic_id: 1,
        }
    }

    fn run_of(user: UserId, ids: &[QuestionId]) -> QuizRun {
        QuizRun::new(user, ids.iter().map(|&id| question(id)).collect())
    }

    #[test]
    fn first_access_creates_idle_session() {
        let store = InMemorySessionStore::new();
        let session = store.get_or_create(1).unwrap();

        assert_eq!(session.state, State::IdleMenu);
        assert!(session.run.is_none());
        assert!(session.current_question_id.is_none());
    }

    #[test]
    fn attach_run_sets_first_question_and_state() {
        let store = InMemorySessionStore::new();
        let first = store.attach_run(1, run_of(1, &[10, 11])).unwrap();

        assert_eq!(first.id, 10);
        let session = store.get_or_create(1).unwrap();
        assert_eq!(session.state, State::QuizAsking);
        assert_eq!(session.current_question_id, Some(10));
    }

    #[test]
    fn attach_rejects_empty_run() {
        let store = InMemorySessionStore::new();
        let err = store.attach_run(1, run_of(1, &[])).unwrap_err();
        assert!(matches!(err, StoreError::EmptyRun));
    }

    #[test]
    fn advance_walks_the_sequence_and_stops_at_the_end() {
        let store = InMemorySessionStore::new();
        store.attach_run(1, run_of(1, &[10, 11, 12])).unwrap();

        assert_eq!(store.advance(1).unwrap().unwrap().id, 11);
        assert_eq!(store.advance(1).unwrap().unwrap().id, 12);
        assert!(store.advance(1).unwrap().is_none());

        // Cursor is capped at the sequence length, never beyond.
        let session = store.get_or_create(1).unwrap();
        let run = session.run.unwrap();
        assert_eq!(run.cursor, run.questions.len());
        assert!(session.current_question_id.is_none());

        assert!(store.advance(1).unwrap().is_none());
        let session = store.get_or_create(1).unwrap();
        assert_eq!(session.run.unwrap().cursor, 3);
    }

    #[test]
    fn advance_without_a_run_is_a_store_error() {
        let store = InMemorySessionStore::new();
        assert!(matches!(
            store.advance(1).unwrap_err(),
            StoreError::NoActiveRun
        ));
    }

    #[test]
    fn score_accumulates_on_the_run() {
        let store = InMemorySessionStore::new();
        store.attach_run(1, run_of(1, &[10, 11])).unwrap();
        store.record_correct(1).unwrap();
        store.record_correct(1).unwrap();

        assert_eq!(store.get_or_create(1).unwrap().run.unwrap().score, 2);
    }

    #[test]
    fn finish_stamps_timestamp_once() {
        let store = InMemorySessionStore::new();
        store.attach_run(1, run_of(1, &[10])).unwrap();

        let finished = store.finish_run(1).unwrap();
        assert!(finished.finished_at.is_some());

        let again = store.finish_run(1).unwrap();
        assert_eq!(again.finished_at, finished.finished_at);
    }

    #[test]
    fn clear_resets_to_idle() {
        let store = InMemorySessionStore::new();
        store.attach_run(1, run_of(1, &[10])).unwrap();
        store.clear(1).unwrap();

        let session = store.get_or_create(1).unwrap();
        assert_eq!(session.state, State::IdleMenu);
        assert!(session.run.is_none());
        assert!(session.current_question_id.is_none());
    }
}
