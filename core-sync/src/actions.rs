//! Sync Actions
//!
//! The closed command set of the engine. One [`Action`] is one planned step
//! of a sync run; the controller pops and dispatches them one at a time.
//! Each action knows which library it targets (global actions carry none)
//! and whether executing it may require an external conflict receiver.

use crate::types::DownloadBatch;
use bridge_traits::data::{
    AttachmentUpload, DeleteBatch, Libraries, LibraryIdentifier, SyncObject, WriteBatch,
};
use bridge_traits::store::DeletionsToApply;

/// Per-library planning mode for `CreateLibraryActions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateLibraryActionsOptions {
    /// Writes first when pending local changes exist, downloads otherwise.
    Automatic,
    /// Plan only the download branch.
    OnlyDownloads,
}

/// One planned step of a sync run.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Validate the API key and load its permissions.
    LoadKeyPermissions,
    /// Enumerate remote group versions and plan group updates/removals.
    SyncGroupVersions,
    /// Build planning snapshots and expand into per-library action sets.
    CreateLibraryActions(Libraries, CreateLibraryActionsOptions),
    /// Compare remote object versions and plan batched downloads.
    SyncVersions {
        library_id: LibraryIdentifier,
        object: SyncObject,
        version: i64,
        /// Gate the request on the version having moved remotely.
        check_remote: bool,
    },
    /// Download a set of object batches into the store.
    SyncBatchesToDb(Vec<DownloadBatch>),
    /// Record a category version counter.
    StoreVersion {
        library_id: LibraryIdentifier,
        object: SyncObject,
        version: i64,
    },
    /// Fetch and store library settings.
    SyncSettings {
        library_id: LibraryIdentifier,
        version: i64,
    },
    /// Fetch remote deletions and plan their local application.
    SyncDeletions {
        library_id: LibraryIdentifier,
        version: i64,
    },
    /// Apply remote deletions locally, surfacing conflicts.
    PerformDeletions {
        library_id: LibraryIdentifier,
        deletions: DeletionsToApply,
        version: Option<i64>,
    },
    /// Re-create objects the user chose to keep after a deletion conflict.
    RestoreDeletions {
        library_id: LibraryIdentifier,
        collections: Vec<String>,
        items: Vec<String>,
    },
    /// Record the deletions version counter.
    StoreDeletionVersion {
        library_id: LibraryIdentifier,
        version: i64,
    },
    /// Submit a batch of local object writes.
    SubmitWriteBatch(WriteBatch),
    /// Submit a batch of local object deletions.
    SubmitDeleteBatch(DeleteBatch),
    /// Enumerate pending attachment uploads and plan them.
    CreateUploadActions {
        library_id: LibraryIdentifier,
        had_other_write_actions: bool,
        can_edit_files: bool,
    },
    /// Upload one attachment file.
    UploadAttachment(AttachmentUpload),
    /// Re-fetch remote metadata for an attachment whose upload hit a
    /// precondition failure, then reconcile.
    FixUpload {
        library_id: LibraryIdentifier,
        key: String,
    },
    /// Drop all remaining queued actions for a library.
    RemoveActions { library_id: LibraryIdentifier },
    /// Discard local changes, reverting the library to server state.
    RevertLibraryToOriginal { library_id: LibraryIdentifier },
    /// Discard local attachment-file changes in the library.
    RevertLibraryFilesToOriginal { library_id: LibraryIdentifier },
    /// Mark all local changes as submitted without uploading them.
    MarkChangesAsResolved { library_id: LibraryIdentifier },
    /// Keep a group's data locally but stop syncing it.
    MarkGroupAsLocalOnly { group_id: i64 },
    /// Delete a group library and its data.
    DeleteGroup { group_id: i64 },
    /// Fetch one group's metadata and store it.
    SyncGroupToDb { group_id: i64 },
    /// Ask the conflict receiver what to do about a remotely deleted group.
    ResolveDeletedGroup { group_id: i64, name: String },
    /// Ask the conflict receiver about lost group metadata write access.
    ResolveGroupMetadataWritePermission { group_id: i64, name: String },
    /// Ask the conflict receiver about lost group file write access.
    ResolveGroupFileWritePermission { group_id: i64, name: String },
    /// Delete WebDAV files for locally removed attachments.
    PerformWebDavDeletions { library_id: LibraryIdentifier },
}

impl Action {
    /// Library this action targets. Global actions (permission load, group
    /// enumeration, plan expansion) carry none.
    pub fn library_id(&self) -> Option<LibraryIdentifier> {
        match self {
            Self::LoadKeyPermissions | Self::SyncGroupVersions | Self::CreateLibraryActions(..) => {
                None
            }
            Self::SyncVersions { library_id, .. }
            | Self::StoreVersion { library_id, .. }
            | Self::SyncSettings { library_id, .. }
            | Self::SyncDeletions { library_id, .. }
            | Self::PerformDeletions { library_id, .. }
            | Self::RestoreDeletions { library_id, .. }
            | Self::StoreDeletionVersion { library_id, .. }
            | Self::CreateUploadActions { library_id, .. }
            | Self::FixUpload { library_id, .. }
            | Self::RemoveActions { library_id }
            | Self::RevertLibraryToOriginal { library_id }
            | Self::RevertLibraryFilesToOriginal { library_id }
            | Self::MarkChangesAsResolved { library_id }
            | Self::PerformWebDavDeletions { library_id } => Some(*library_id),
            Self::SyncBatchesToDb(batches) => batches.first().map(|b| b.library_id),
            Self::SubmitWriteBatch(batch) => Some(batch.library_id),
            Self::SubmitDeleteBatch(batch) => Some(batch.library_id),
            Self::UploadAttachment(upload) => Some(upload.library_id),
            Self::MarkGroupAsLocalOnly { group_id }
            | Self::DeleteGroup { group_id }
            | Self::SyncGroupToDb { group_id }
            | Self::ResolveDeletedGroup { group_id, .. }
            | Self::ResolveGroupMetadataWritePermission { group_id, .. }
            | Self::ResolveGroupFileWritePermission { group_id, .. } => {
                Some(LibraryIdentifier::Group(*group_id))
            }
        }
    }

    /// Whether executing this action may emit a conflict that an external
    /// receiver must answer before the run can continue.
    pub fn requires_conflict_receiver(&self) -> bool {
        matches!(
            self,
            Self::PerformDeletions { .. }
                | Self::ResolveDeletedGroup { .. }
                | Self::ResolveGroupMetadataWritePermission { .. }
                | Self::ResolveGroupFileWritePermission { .. }
        )
    }

    /// Short name for logging and progress events.
    pub fn name(&self) -> &'static str {
        match self {
            Self::LoadKeyPermissions => "loadKeyPermissions",
            Self::SyncGroupVersions => "syncGroupVersions",
            Self::CreateLibraryActions(..) => "createLibraryActions",
            Self::SyncVersions { .. } => "syncVersions",
            Self::SyncBatchesToDb(..) => "syncBatchesToDb",
            Self::StoreVersion { .. } => "storeVersion",
            Self::SyncSettings { .. } => "syncSettings",
            Self::SyncDeletions { .. } => "syncDeletions",
            Self::PerformDeletions { .. } => "performDeletions",
            Self::RestoreDeletions { .. } => "restoreDeletions",
            Self::StoreDeletionVersion { .. } => "storeDeletionVersion",
            Self::SubmitWriteBatch(..) => "submitWriteBatch",
            Self::SubmitDeleteBatch(..) => "submitDeleteBatch",
            Self::CreateUploadActions { .. } => "createUploadActions",
            Self::UploadAttachment(..) => "uploadAttachment",
            Self::FixUpload { .. } => "fixUpload",
            Self::RemoveActions { .. } => "removeActions",
            Self::RevertLibraryToOriginal { .. } => "revertLibraryToOriginal",
            Self::RevertLibraryFilesToOriginal { .. } => "revertLibraryFilesToOriginal",
            Self::MarkChangesAsResolved { .. } => "markChangesAsResolved",
            Self::MarkGroupAsLocalOnly { .. } => "markGroupAsLocalOnly",
            Self::DeleteGroup { .. } => "deleteGroup",
            Self::SyncGroupToDb { .. } => "syncGroupToDb",
            Self::ResolveDeletedGroup { .. } => "resolveDeletedGroup",
            Self::ResolveGroupMetadataWritePermission { .. } => {
                "resolveGroupMetadataWritePermission"
            }
            Self::ResolveGroupFileWritePermission { .. } => "resolveGroupFileWritePermission",
            Self::PerformWebDavDeletions { .. } => "performWebDavDeletions",
        }
    }
}
