use thiserror::Error;

/// Failures of the underlying state stores. The in-memory stores can only
/// fail on lock poisoning or contract misuse, but the engine treats any
/// variant as fatal for the event being processed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store lock poisoned")]
    Poisoned,
    #[error("no active quiz run for this user")]
    NoActiveRun,
    #[error("quiz run has no questions")]
    EmptyRun,
}

/// Engine-level error taxonomy. Each variant maps to a different reaction at
/// the dispatcher boundary:
/// - `Validation` is reported to the user, nothing changes;
/// - `NotFound` is reported and the session stays in (or falls back to) a
///   safe state;
/// - `Stale` is logged and silently dropped (duplicate/late delivery);
/// - `Storage` aborts handling of the current event.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("stale event: {0}")]
    Stale(String),
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        EngineError::NotFound(msg.into())
    }

    pub fn stale(msg: impl Into<String>) -> Self {
        EngineError::Stale(msg.into())
    }
}
