//! Local Store Abstraction
//!
//! The transactional local replica consumed by the sync engine. Every method
//! is one "perform(request)" boundary: implementations must execute it
//! atomically with respect to concurrent readers. After writes the engine
//! calls [`LocalStore::invalidate`] so read views refresh.

use crate::data::{
    AttachmentUpload, DeleteBatch, LibraryData, LibraryIdentifier, Libraries, SyncObject,
    VersionTarget, WriteBatch,
};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;

/// Outcome of persisting a batch of downloaded objects.
#[derive(Debug, Clone, Default)]
pub struct StoreObjectsResult {
    /// Keys successfully parsed and stored.
    pub parsed_keys: Vec<String>,
    /// Per-object parse failures, as messages.
    pub parse_errors: Vec<String>,
    /// Keys that conflicted with unsubmitted local changes.
    pub conflict_keys: Vec<String>,
}

/// Remote deletions to apply locally in one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionsToApply {
    pub collections: Vec<String>,
    pub items: Vec<String>,
    pub searches: Vec<String>,
    pub tags: Vec<String>,
}

/// Result of diffing remote group versions against local state.
#[derive(Debug, Clone, Default)]
pub struct GroupVersionDiff {
    /// Group ids whose remote version is newer than the local copy.
    pub to_update: Vec<i64>,
    /// Locally present groups missing remotely, with display names.
    pub to_remove: Vec<(i64, String)>,
}

/// Transactional local store operations used by the sync engine.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Build planning snapshots for the requested libraries.
    ///
    /// `fetch_updates` loads pending write/delete batches, `load_versions`
    /// loads the per-category version counters, `web_dav_enabled` includes
    /// pending WebDAV deletion bookkeeping.
    async fn load_library_data(
        &self,
        libraries: Libraries,
        fetch_updates: bool,
        load_versions: bool,
        web_dav_enabled: bool,
    ) -> Result<Vec<LibraryData>>;

    /// Persist downloaded objects at the given version.
    async fn store_objects(
        &self,
        library_id: LibraryIdentifier,
        object: SyncObject,
        objects: &[serde_json::Value],
        version: i64,
    ) -> Result<StoreObjectsResult>;

    /// Compare remote versions against local state and return the keys that
    /// need downloading. `full` forces re-download of locally missing keys.
    async fn sync_versions(
        &self,
        library_id: LibraryIdentifier,
        object: SyncObject,
        remote_versions: &HashMap<String, i64>,
        full: bool,
    ) -> Result<Vec<String>>;

    /// Record a new version counter for one target.
    async fn store_version(
        &self,
        library_id: LibraryIdentifier,
        target: VersionTarget,
        version: i64,
    ) -> Result<()>;

    /// Persist downloaded library settings.
    async fn store_settings(
        &self,
        library_id: LibraryIdentifier,
        settings: &serde_json::Value,
        version: i64,
    ) -> Result<()>;

    /// Apply remote deletions. Items with unsubmitted local changes are left
    /// untouched and returned as `(key, title)` conflicts. `version` is
    /// absent when the deletions come from a conflict resolution rather than
    /// a versioned fetch.
    async fn perform_deletions(
        &self,
        library_id: LibraryIdentifier,
        deletions: &DeletionsToApply,
        version: Option<i64>,
    ) -> Result<Vec<(String, String)>>;

    /// Re-create locally objects the user chose to keep after a remote
    /// deletion conflict.
    async fn restore_deletions(
        &self,
        library_id: LibraryIdentifier,
        collections: &[String],
        items: &[String],
    ) -> Result<()>;

    /// Diff remote group versions against local groups.
    async fn group_version_diff(
        &self,
        remote_versions: &HashMap<i64, i64>,
    ) -> Result<GroupVersionDiff>;

    /// Persist one group's metadata at the given version.
    async fn store_group(&self, group: &serde_json::Value, version: i64) -> Result<()>;

    /// Delete a group library and all of its data.
    async fn delete_group(&self, group_id: i64) -> Result<()>;

    /// Keep a group's data but stop syncing it.
    async fn mark_group_as_local_only(&self, group_id: i64) -> Result<()>;

    /// Discard local changes in a library, reverting to the server state.
    async fn revert_library_to_original(&self, library_id: LibraryIdentifier) -> Result<()>;

    /// Discard local attachment-file changes in a library.
    async fn revert_library_files_to_original(&self, library_id: LibraryIdentifier) -> Result<()>;

    /// Mark all local changes in a library as submitted without uploading.
    async fn mark_changes_as_resolved(&self, library_id: LibraryIdentifier) -> Result<()>;

    /// Mark successfully submitted write-batch keys as synced, recording the
    /// new version.
    async fn mark_submitted(
        &self,
        batch: &WriteBatch,
        successful_keys: &[String],
        version: i64,
    ) -> Result<()>;

    /// Mark a submitted delete batch as applied, recording the new version.
    async fn mark_deleted(&self, batch: &DeleteBatch, version: i64) -> Result<()>;

    /// Pending attachment uploads for a library.
    async fn pending_uploads(&self, library_id: LibraryIdentifier)
        -> Result<Vec<AttachmentUpload>>;

    /// Record a completed attachment upload at the given version.
    async fn mark_attachment_uploaded(
        &self,
        library_id: LibraryIdentifier,
        key: String,
        version: Option<i64>,
    ) -> Result<()>;

    /// Flag an attachment's parent item as changed so the next run
    /// re-submits it before uploading.
    async fn mark_attachment_item_for_submission(
        &self,
        library_id: LibraryIdentifier,
        key: String,
    ) -> Result<()>;

    /// Flag keys that failed to download for another attempt.
    async fn mark_for_resync(
        &self,
        library_id: LibraryIdentifier,
        object: SyncObject,
        keys: &[String],
    ) -> Result<()>;

    /// Attachment keys deleted locally whose WebDAV files still exist.
    async fn pending_web_dav_deletions(
        &self,
        library_id: LibraryIdentifier,
    ) -> Result<Vec<String>>;

    /// Clear WebDAV deletion bookkeeping for the given keys.
    async fn clear_web_dav_deletions(
        &self,
        library_id: LibraryIdentifier,
        keys: &[String],
    ) -> Result<()>;

    /// Highest locally known version for a library, for filtering push
    /// notifications.
    async fn library_version(&self, library_id: LibraryIdentifier) -> Result<i64>;

    /// Refresh read views after a write.
    async fn invalidate(&self) -> Result<()>;
}
