//! Action Queue
//!
//! Ordered queue of planned actions for one run. Follow-up actions go at
//! the front so they execute before the remainder of the plan; library-wide
//! failures prune by library without disturbing other libraries' actions.

use crate::actions::Action;
use bridge_traits::data::LibraryIdentifier;
use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct ActionQueue {
    actions: VecDeque<Action>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn pop_front(&mut self) -> Option<Action> {
        self.actions.pop_front()
    }

    pub fn front(&self) -> Option<&Action> {
        self.actions.front()
    }

    /// Enqueue follow-up actions ahead of the remaining plan, preserving
    /// their relative order.
    pub fn push_front(&mut self, actions: impl IntoIterator<Item = Action>) {
        let mut front: Vec<Action> = actions.into_iter().collect();
        while let Some(action) = front.pop() {
            self.actions.push_front(action);
        }
    }

    pub fn push_back(&mut self, actions: impl IntoIterator<Item = Action>) {
        self.actions.extend(actions);
    }

    /// Drop every queued action that targets `library_id`.
    pub fn remove_library_actions(&mut self, library_id: LibraryIdentifier) {
        self.actions
            .retain(|action| action.library_id() != Some(library_id));
    }

    /// Keep only actions for which `keep` returns true.
    pub fn retain(&mut self, keep: impl FnMut(&Action) -> bool) {
        self.actions.retain(keep);
    }

    /// Replace the action at `index` in place.
    pub fn replace_at(&mut self, index: usize, action: Action) {
        if let Some(slot) = self.actions.get_mut(index) {
            *slot = action;
        }
    }

    /// Insert an action before `index`; appends when `index` is past the end.
    pub fn insert_at(&mut self, index: usize, action: Action) {
        let index = index.min(self.actions.len());
        self.actions.insert(index, action);
    }

    pub fn remove_at(&mut self, index: usize) -> Option<Action> {
        self.actions.remove(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Action> {
        self.actions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::data::SyncObject;

    fn settings(library_id: LibraryIdentifier) -> Action {
        Action::SyncSettings {
            library_id,
            version: 0,
        }
    }

    #[test]
    fn test_front_insertion_preserves_order() {
        let mut queue = ActionQueue::new();
        queue.push_back([settings(LibraryIdentifier::Custom)]);
        queue.push_front([
            Action::LoadKeyPermissions,
            Action::SyncGroupVersions,
        ]);

        assert_eq!(queue.pop_front(), Some(Action::LoadKeyPermissions));
        assert_eq!(queue.pop_front(), Some(Action::SyncGroupVersions));
        assert_eq!(queue.pop_front(), Some(settings(LibraryIdentifier::Custom)));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_remove_library_actions_spares_other_libraries() {
        let group = LibraryIdentifier::Group(5);
        let mut queue = ActionQueue::new();
        queue.push_back([
            settings(LibraryIdentifier::Custom),
            settings(group),
            Action::SyncDeletions {
                library_id: group,
                version: 3,
            },
            Action::LoadKeyPermissions,
        ]);

        queue.remove_library_actions(group);

        let remaining: Vec<_> = queue.iter().cloned().collect();
        assert_eq!(
            remaining,
            vec![settings(LibraryIdentifier::Custom), Action::LoadKeyPermissions]
        );
    }

    #[test]
    fn test_replace_at() {
        let mut queue = ActionQueue::new();
        queue.push_back([settings(LibraryIdentifier::Custom)]);
        queue.replace_at(
            0,
            Action::StoreVersion {
                library_id: LibraryIdentifier::Custom,
                object: SyncObject::Settings,
                version: 9,
            },
        );
        assert_eq!(
            queue.pop_front(),
            Some(Action::StoreVersion {
                library_id: LibraryIdentifier::Custom,
                object: SyncObject::Settings,
                version: 9,
            })
        );
    }
}
