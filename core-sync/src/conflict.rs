//! Conflict Hand-Off
//!
//! Conflicts the engine cannot decide on its own are emitted to an external
//! receiver and the run blocks until a [`ConflictResolution`] arrives. The
//! resolution is translated back into actions pushed at the queue front.

use crate::actions::Action;
use bridge_traits::data::LibraryIdentifier;
use bridge_traits::store::DeletionsToApply;
use serde::{Deserialize, Serialize};

/// A decision the engine defers to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Conflict {
    /// A group library was deleted remotely but still has local data.
    GroupRemoved { group_id: i64, name: String },
    /// Metadata write access to a group was revoked while local metadata
    /// changes are pending.
    GroupMetadataWriteDenied { group_id: i64, name: String },
    /// File write access to a group was revoked while local file changes
    /// are pending.
    GroupFileWriteDenied { group_id: i64, name: String },
    /// Remote deletions target objects the user is currently viewing.
    ObjectsRemovedRemotely {
        library_id: LibraryIdentifier,
        collections: Vec<String>,
        items: Vec<String>,
        searches: Vec<String>,
        tags: Vec<String>,
    },
    /// Remote deletions target items that carry unsubmitted local changes.
    /// Keys are paired with display titles for the prompt.
    RemovedItemsHaveLocalChanges {
        library_id: LibraryIdentifier,
        keys: Vec<(String, String)>,
    },
}

/// The receiver's answer to a [`Conflict`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum ConflictResolution {
    DeleteGroup { group_id: i64 },
    MarkGroupAsLocalOnly { group_id: i64 },
    RevertGroupChanges { group_id: i64 },
    /// Keep the local changes and mark them as already synced.
    KeepGroupChanges { group_id: i64 },
    RevertGroupFiles { group_id: i64 },
    SkipGroup { group_id: i64 },
    /// Per-object verdict for a remote deletion touching active objects.
    RemoteDeletionOfActiveObject {
        library_id: LibraryIdentifier,
        to_delete_collections: Vec<String>,
        to_delete_items: Vec<String>,
        to_restore_collections: Vec<String>,
        to_restore_items: Vec<String>,
        searches: Vec<String>,
        tags: Vec<String>,
    },
    /// Per-item verdict for remote deletions of locally changed items.
    RemoteDeletionOfChangedItem {
        library_id: LibraryIdentifier,
        to_delete: Vec<String>,
        to_restore: Vec<String>,
    },
}

impl ConflictResolution {
    /// Translate the resolution into follow-up actions. Callers push these
    /// at the front of the queue so they run before the rest of the plan.
    pub fn into_actions(self) -> Vec<Action> {
        match self {
            Self::DeleteGroup { group_id } => vec![Action::DeleteGroup { group_id }],
            Self::MarkGroupAsLocalOnly { group_id } => {
                vec![Action::MarkGroupAsLocalOnly { group_id }]
            }
            Self::RevertGroupChanges { group_id } => vec![Action::RevertLibraryToOriginal {
                library_id: LibraryIdentifier::Group(group_id),
            }],
            Self::KeepGroupChanges { group_id } => vec![Action::MarkChangesAsResolved {
                library_id: LibraryIdentifier::Group(group_id),
            }],
            Self::RevertGroupFiles { group_id } => vec![Action::RevertLibraryFilesToOriginal {
                library_id: LibraryIdentifier::Group(group_id),
            }],
            Self::SkipGroup { group_id } => vec![Action::RemoveActions {
                library_id: LibraryIdentifier::Group(group_id),
            }],
            Self::RemoteDeletionOfActiveObject {
                library_id,
                to_delete_collections,
                to_delete_items,
                to_restore_collections,
                to_restore_items,
                searches,
                tags,
            } => {
                let mut actions = Vec::new();
                if !to_delete_collections.is_empty()
                    || !to_delete_items.is_empty()
                    || !searches.is_empty()
                    || !tags.is_empty()
                {
                    actions.push(Action::PerformDeletions {
                        library_id,
                        deletions: DeletionsToApply {
                            collections: to_delete_collections,
                            items: to_delete_items,
                            searches,
                            tags,
                        },
                        version: None,
                    });
                }
                if !to_restore_collections.is_empty() || !to_restore_items.is_empty() {
                    actions.push(Action::RestoreDeletions {
                        library_id,
                        collections: to_restore_collections,
                        items: to_restore_items,
                    });
                }
                actions
            }
            Self::RemoteDeletionOfChangedItem {
                library_id,
                to_delete,
                to_restore,
            } => {
                let mut actions = Vec::new();
                if !to_delete.is_empty() {
                    actions.push(Action::PerformDeletions {
                        library_id,
                        deletions: DeletionsToApply {
                            collections: Vec::new(),
                            items: to_delete,
                            searches: Vec::new(),
                            tags: Vec::new(),
                        },
                        version: None,
                    });
                }
                if !to_restore.is_empty() {
                    actions.push(Action::RestoreDeletions {
                        library_id,
                        collections: Vec::new(),
                        items: to_restore,
                    });
                }
                actions
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_resolutions_translate_directly() {
        assert_eq!(
            ConflictResolution::DeleteGroup { group_id: 7 }.into_actions(),
            vec![Action::DeleteGroup { group_id: 7 }]
        );
        assert_eq!(
            ConflictResolution::MarkGroupAsLocalOnly { group_id: 7 }.into_actions(),
            vec![Action::MarkGroupAsLocalOnly { group_id: 7 }]
        );
        assert_eq!(
            ConflictResolution::RevertGroupChanges { group_id: 7 }.into_actions(),
            vec![Action::RevertLibraryToOriginal {
                library_id: LibraryIdentifier::Group(7)
            }]
        );
        assert_eq!(
            ConflictResolution::KeepGroupChanges { group_id: 7 }.into_actions(),
            vec![Action::MarkChangesAsResolved {
                library_id: LibraryIdentifier::Group(7)
            }]
        );
        assert_eq!(
            ConflictResolution::RevertGroupFiles { group_id: 7 }.into_actions(),
            vec![Action::RevertLibraryFilesToOriginal {
                library_id: LibraryIdentifier::Group(7)
            }]
        );
        assert_eq!(
            ConflictResolution::SkipGroup { group_id: 7 }.into_actions(),
            vec![Action::RemoveActions {
                library_id: LibraryIdentifier::Group(7)
            }]
        );
    }

    #[test]
    fn test_active_object_resolution_deletes_then_restores() {
        let actions = ConflictResolution::RemoteDeletionOfActiveObject {
            library_id: LibraryIdentifier::Custom,
            to_delete_collections: vec!["C1".to_string()],
            to_delete_items: vec!["I1".to_string()],
            to_restore_collections: vec!["C2".to_string()],
            to_restore_items: vec!["I2".to_string()],
            searches: vec!["S1".to_string()],
            tags: vec!["tag".to_string()],
        }
        .into_actions();

        assert_eq!(actions.len(), 2);
        match &actions[0] {
            Action::PerformDeletions {
                library_id,
                deletions,
                version,
            } => {
                assert_eq!(*library_id, LibraryIdentifier::Custom);
                assert_eq!(deletions.collections, vec!["C1"]);
                assert_eq!(deletions.items, vec!["I1"]);
                assert_eq!(deletions.searches, vec!["S1"]);
                assert_eq!(deletions.tags, vec!["tag"]);
                assert_eq!(*version, None);
            }
            other => panic!("expected PerformDeletions, got {:?}", other),
        }
        match &actions[1] {
            Action::RestoreDeletions {
                collections, items, ..
            } => {
                assert_eq!(collections, &vec!["C2".to_string()]);
                assert_eq!(items, &vec!["I2".to_string()]);
            }
            other => panic!("expected RestoreDeletions, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_sides_produce_no_actions() {
        let actions = ConflictResolution::RemoteDeletionOfChangedItem {
            library_id: LibraryIdentifier::Custom,
            to_delete: Vec::new(),
            to_restore: Vec::new(),
        }
        .into_actions();
        assert!(actions.is_empty());
    }

    #[test]
    fn test_changed_item_resolution_keeps_items_only() {
        let actions = ConflictResolution::RemoteDeletionOfChangedItem {
            library_id: LibraryIdentifier::Group(3),
            to_delete: vec!["A".to_string()],
            to_restore: vec!["B".to_string()],
        }
        .into_actions();

        assert_eq!(actions.len(), 2);
        match &actions[0] {
            Action::PerformDeletions { deletions, .. } => {
                assert!(deletions.collections.is_empty());
                assert_eq!(deletions.items, vec!["A"]);
            }
            other => panic!("expected PerformDeletions, got {:?}", other),
        }
    }
}
