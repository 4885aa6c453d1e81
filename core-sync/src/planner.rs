//! Action Planner
//!
//! Pure planning functions: given a sync kind and read-only library
//! snapshots, produce the ordered action list for a run. No I/O happens
//! here; the controller executes the plan and calls back in to expand
//! per-library and batched-download sub-plans.

use crate::actions::{Action, CreateLibraryActionsOptions};
use crate::types::{DownloadBatch, SyncKind};
use bridge_traits::data::{Libraries, LibraryData, LibraryIdentifier, SyncObject, Versions};

/// Initial queue for a run. Key permissions always come first; any group
/// library in scope forces a fresh group enumeration before per-library
/// plans can be trusted.
pub fn initial_actions(kind: SyncKind, libraries: &Libraries) -> Vec<Action> {
    if kind == SyncKind::KeysOnly {
        return vec![Action::LoadKeyPermissions];
    }

    let needs_group_sync = match libraries {
        Libraries::All => true,
        Libraries::Specific(ids) => ids.iter().any(|id| id.group_id().is_some()),
    };
    if needs_group_sync {
        return vec![Action::LoadKeyPermissions, Action::SyncGroupVersions];
    }

    vec![
        Action::LoadKeyPermissions,
        Action::CreateLibraryActions(libraries.clone(), options_for(kind)),
    ]
}

/// Per-library planning mode implied by the sync kind.
pub fn options_for(kind: SyncKind) -> CreateLibraryActionsOptions {
    match kind {
        SyncKind::Full | SyncKind::CollectionsOnly => CreateLibraryActionsOptions::OnlyDownloads,
        SyncKind::Normal
        | SyncKind::IgnoreIndividualDelays
        | SyncKind::KeysOnly
        | SyncKind::PrioritizeDownloads => CreateLibraryActionsOptions::Automatic,
    }
}

/// Expand library snapshots into per-library action sets.
///
/// Returns the actions, the queue position to insert them at (`Some(0)`
/// means ahead of the remaining plan) and the number of planned write
/// submissions.
pub fn library_actions(
    data: &[LibraryData],
    options: CreateLibraryActionsOptions,
    kind: SyncKind,
) -> (Vec<Action>, Option<usize>, usize) {
    let mut actions = Vec::new();
    let mut write_count = 0;

    for library in data {
        let (library_plan, writes) = single_library_actions(library, options, kind);
        write_count += writes;
        actions.extend(library_plan);
    }

    let index = match options {
        CreateLibraryActionsOptions::Automatic => None,
        CreateLibraryActionsOptions::OnlyDownloads => Some(0),
    };
    (actions, index, write_count)
}

fn single_library_actions(
    library: &LibraryData,
    options: CreateLibraryActionsOptions,
    kind: SyncKind,
) -> (Vec<Action>, usize) {
    let has_pending_writes =
        !library.updates.is_empty() || !library.deletions.is_empty() || library.has_upload;

    let (mut actions, write_count) = match options {
        CreateLibraryActionsOptions::OnlyDownloads => {
            (download_actions(library.identifier, &library.versions, kind), 0)
        }
        CreateLibraryActionsOptions::Automatic if has_pending_writes => write_actions(library),
        CreateLibraryActionsOptions::Automatic => {
            (download_actions(library.identifier, &library.versions, kind), 0)
        }
    };

    if library.has_web_dav_deletions {
        actions.push(Action::PerformWebDavDeletions {
            library_id: library.identifier,
        });
    }

    (actions, write_count)
}

/// Write branch for one library. Groups without metadata write access
/// degrade into a permission conflict instead of submitting anything.
fn write_actions(library: &LibraryData) -> (Vec<Action>, usize) {
    if let Some(group_id) = library.identifier.group_id() {
        if !library.can_edit_metadata {
            return (
                vec![Action::ResolveGroupMetadataWritePermission {
                    group_id,
                    name: library.name.clone(),
                }],
                0,
            );
        }
    }

    let mut actions = Vec::new();
    for batch in &library.updates {
        actions.push(Action::SubmitWriteBatch(batch.clone()));
    }
    for batch in &library.deletions {
        actions.push(Action::SubmitDeleteBatch(batch.clone()));
    }
    let had_other_write_actions = !actions.is_empty();
    actions.push(Action::CreateUploadActions {
        library_id: library.identifier,
        had_other_write_actions,
        can_edit_files: library.can_edit_files,
    });

    let write_count = actions.len() - 1;
    (actions, write_count)
}

/// Download plan for one library's object categories.
///
/// Normal syncs go settings, versions per category, then deletions; full
/// syncs front-load deletions and record their version before the category
/// fetches so a re-download starts from consistent bookkeeping.
fn download_actions(
    library_id: LibraryIdentifier,
    versions: &Versions,
    kind: SyncKind,
) -> Vec<Action> {
    let check_remote = kind != SyncKind::Full;
    let sync_versions = |object: SyncObject, version: i64| Action::SyncVersions {
        library_id,
        object,
        version,
        check_remote,
    };

    match kind {
        SyncKind::KeysOnly => Vec::new(),
        SyncKind::CollectionsOnly => {
            vec![sync_versions(SyncObject::Collection, versions.collections)]
        }
        SyncKind::Full => vec![
            Action::SyncSettings {
                library_id,
                version: versions.settings,
            },
            Action::SyncDeletions {
                library_id,
                version: versions.deletions,
            },
            Action::StoreDeletionVersion {
                library_id,
                version: versions.deletions,
            },
            sync_versions(SyncObject::Collection, versions.collections),
            sync_versions(SyncObject::Search, versions.searches),
            sync_versions(SyncObject::Item, versions.items),
            sync_versions(SyncObject::Trash, versions.trash),
        ],
        SyncKind::Normal | SyncKind::IgnoreIndividualDelays | SyncKind::PrioritizeDownloads => {
            vec![
                Action::SyncSettings {
                    library_id,
                    version: versions.settings,
                },
                sync_versions(SyncObject::Collection, versions.collections),
                sync_versions(SyncObject::Search, versions.searches),
                sync_versions(SyncObject::Item, versions.items),
                sync_versions(SyncObject::Trash, versions.trash),
                Action::SyncDeletions {
                    library_id,
                    version: versions.deletions,
                },
                Action::StoreDeletionVersion {
                    library_id,
                    version: versions.deletions,
                },
            ]
        }
    }
}

/// Plan batched downloads for one category's changed keys.
///
/// No keys but a version bump still yields a version-store action so local
/// bookkeeping stays consistent.
pub fn batched_object_actions(
    library_id: LibraryIdentifier,
    object: SyncObject,
    keys: Vec<String>,
    version: i64,
    should_store_version: bool,
) -> Vec<Action> {
    let batches = DownloadBatch::from_keys(library_id, object, keys, version);

    if batches.is_empty() {
        if should_store_version {
            return vec![Action::StoreVersion {
                library_id,
                object,
                version,
            }];
        }
        return Vec::new();
    }

    let mut actions = vec![Action::SyncBatchesToDb(batches)];
    if should_store_version {
        actions.push(Action::StoreVersion {
            library_id,
            object,
            version,
        });
    }
    actions
}

/// Group-stage follow-ups: resolve remotely deleted groups first, sync
/// updated group metadata, then hand over to per-library planning.
pub fn group_actions(
    to_update: &[i64],
    to_remove: &[(i64, String)],
    libraries: &Libraries,
    kind: SyncKind,
) -> Vec<Action> {
    let ids_to_sync: Vec<i64> = match libraries {
        Libraries::All => to_update.to_vec(),
        Libraries::Specific(identifiers) => identifiers
            .iter()
            .filter_map(|id| id.group_id())
            .filter(|id| to_update.contains(id))
            .collect(),
    };

    let mut actions: Vec<Action> = to_remove
        .iter()
        .map(|(group_id, name)| Action::ResolveDeletedGroup {
            group_id: *group_id,
            name: name.clone(),
        })
        .collect();
    actions.extend(
        ids_to_sync
            .into_iter()
            .map(|group_id| Action::SyncGroupToDb { group_id }),
    );
    actions.push(Action::CreateLibraryActions(
        libraries.clone(),
        options_for(kind),
    ));
    actions
}
