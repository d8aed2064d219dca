use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::engine::error::StoreError;
use crate::engine::{TopicId, UserId};

/// Ephemeral per-user set of selected topic ids. Lives only as long as the
/// process; a selection is created on the first toggle and dropped on
/// confirm/cancel. The engine serializes access per user, the interior mutex
/// keeps the map itself consistent across users.
#[derive(Debug, Default)]
pub struct TopicSelectionStore {
    selections: Mutex<HashMap<UserId, HashSet<TopicId>>>,
}

impl TopicSelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Symmetric toggle: adds the topic if absent, removes it if present.
    /// Returns the selection as it looks after the toggle.
    pub fn toggle(&self, user: UserId, topic: TopicId) -> Result<HashSet<TopicId>, StoreError> {
        let mut selections = self.selections.lock().map_err(|_| StoreError::Poisoned)?;
        let selected = selections.entry(user).or_default();
        if !selected.insert(topic) {
            selected.remove(&topic);
        }
        Ok(selected.clone())
    }

    /// Returns the final selection and atomically clears it.
    pub fn confirm(&self, user: UserId) -> Result<HashSet<TopicId>, StoreError> {
        let mut selections = self.selections.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(selections.remove(&user).unwrap_or_default())
    }

    /// Drops the selection without returning it.
    pub fn cancel(&self, user: UserId) -> Result<(), StoreError> {
        let mut selections = self.selections.lock().map_err(|_| StoreError::Poisoned)?;
        selections.remove(&user);
        Ok(())
    }

    /// Read-only view of the current selection. Never creates an entry;
    /// returns an empty set for users with no selection.
    pub fn peek(&self, user: UserId) -> Result<HashSet<TopicId>, StoreError> {
        let selections = self.selections.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(selections.get(&user).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_adds_then_removes() {
        let store = TopicSelectionStore::new();
        let after_add = store.toggle(1, 10).unwrap();
        assert!(after_add.contains(&10));

        let after_remove = store.toggle(1, 10).unwrap();
        assert!(after_remove.is_empty());
    }

    #[test]
    fn double_toggle_restores_empty_selection() {
        let store = TopicSelectionStore::new();
        store.toggle(1, 42).unwrap();
        store.toggle(1, 42).unwrap();
        assert!(store.peek(1).unwrap().is_empty());
    }

    #[test]
    fn confirm_returns_and_clears() {
        let store = TopicSelectionStore::new();
        store.toggle(1, 10).unwrap();
        store.toggle(1, 20).unwrap();

        let confirmed = store.confirm(1).unwrap();
        assert_eq!(confirmed, HashSet::from([10, 20]));
        assert!(store.peek(1).unwrap().is_empty());
    }

    #[test]
    fn cancel_clears_without_returning() {
        let store = TopicSelectionStore::new();
        store.toggle(1, 10).unwrap();
        store.cancel(1).unwrap();
        assert!(store.peek(1).unwrap().is_empty());
    }

    #[test]
    fn peek_does_not_create_an_entry() {
        let store = TopicSelectionStore::new();
        assert!(store.peek(7).unwrap().is_empty());
        assert!(store.selections.lock().unwrap().is_empty());
    }

    #[test]
    fn selections_are_per_user() {
        let store = TopicSelectionStore::new();
        store.toggle(1, 10).unwrap();
        store.toggle(2, 20).unwrap();

        assert_eq!(store.peek(1).unwrap(), HashSet::from([10]));
        assert_eq!(store.peek(2).unwrap(), HashSet::from([20]));
    }
}
