//! Sync Controller
//!
//! The state machine that executes one sync run: pops actions off the
//! queue one at a time, dispatches them against the remote API and local
//! store, accumulates non-fatal errors and decides at the end whether the
//! scheduler should retry with a narrower scope. All run-scoped state lives
//! in [`RunState`], rebuilt for every run.

use crate::actions::{Action, CreateLibraryActionsOptions};
use crate::batch::BatchProcessor;
use crate::conflict::{Conflict, ConflictResolution};
use crate::error::{ErrorData, Fatal, NonFatal, SyncError};
use crate::planner;
use crate::queue::ActionQueue;
use crate::types::{DownloadBatch, SyncKind, SyncRequest};
use bridge_traits::api::{ApiClient, ApiError, KeyPermissions};
use bridge_traits::data::{
    AttachmentUpload, DeleteBatch, Libraries, LibraryIdentifier, SyncObject, VersionTarget,
    WriteBatch,
};
use bridge_traits::files::{AttachmentUploader, WebDavClient};
use bridge_traits::network::NetworkMonitor;
use bridge_traits::store::{DeletionsToApply, LocalStore};
use core_runtime::{CoreConfig, CoreEvent, EventBus, SyncEvent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Engine-requested retries are bounded; a run at this attempt count never
/// schedules another.
pub const DEFAULT_MAX_RETRY_COUNT: usize = 3;

const CONFLICT_CHANNEL_CAPACITY: usize = 16;

/// What one run produced: the errors to report and an optional retry
/// request for the scheduler.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub retry: Option<SyncRequest>,
    pub errors: Vec<NonFatal>,
    pub fatal: Option<Fatal>,
}

/// Run-scoped mutable state, rebuilt at the start of every run.
struct RunState {
    sync_id: Uuid,
    kind: SyncKind,
    libraries: Libraries,
    retry_attempt: usize,
    queue: ActionQueue,
    non_fatal_errors: Vec<NonFatal>,
    /// Version the server reported for the previous action of the same
    /// library; cleared whenever the current library changes.
    last_returned_version: Option<i64>,
    current_library: Option<LibraryIdentifier>,
    access: Option<KeyPermissions>,
    library_names: HashMap<LibraryIdentifier, String>,
    enqueued_uploads: usize,
    uploads_failed_before_api: usize,
    did_enqueue_write_actions: bool,
    /// Libraries already re-planned as download-only after a quota limit;
    /// each library gets at most one re-queue per run.
    quota_requeued: HashSet<LibraryIdentifier>,
}

impl RunState {
    fn new(request: &SyncRequest) -> Self {
        Self {
            sync_id: Uuid::new_v4(),
            kind: request.kind,
            libraries: request.libraries.clone(),
            retry_attempt: request.retry_attempt,
            queue: ActionQueue::new(),
            non_fatal_errors: Vec::new(),
            last_returned_version: None,
            current_library: None,
            access: None,
            library_names: HashMap::new(),
            enqueued_uploads: 0,
            uploads_failed_before_api: 0,
            did_enqueue_write_actions: false,
            quota_requeued: HashSet::new(),
        }
    }
}

pub struct SyncController {
    user_id: i64,
    api: Arc<dyn ApiClient>,
    store: Arc<dyn LocalStore>,
    uploader: Option<Arc<dyn AttachmentUploader>>,
    web_dav: Option<Arc<dyn WebDavClient>>,
    network: Option<Arc<dyn NetworkMonitor>>,
    web_dav_enabled: bool,
    max_retry_count: usize,
    events: EventBus,
    conflicts: broadcast::Sender<Conflict>,
    resolution_tx: mpsc::UnboundedSender<ConflictResolution>,
    resolutions: Mutex<mpsc::UnboundedReceiver<ConflictResolution>>,
}

impl SyncController {
    pub fn new(config: &CoreConfig, events: EventBus) -> Self {
        let (conflicts, _) = broadcast::channel(CONFLICT_CHANNEL_CAPACITY);
        let (resolution_tx, resolution_rx) = mpsc::unbounded_channel();
        Self {
            user_id: config.user_id,
            api: config.api_client.clone(),
            store: config.store.clone(),
            uploader: config.attachment_uploader.clone(),
            web_dav: config.web_dav_client.clone(),
            network: config.network_monitor.clone(),
            web_dav_enabled: config.web_dav_enabled,
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            events,
            conflicts,
            resolution_tx,
            resolutions: Mutex::new(resolution_rx),
        }
    }

    pub fn with_max_retries(mut self, max_retry_count: usize) -> Self {
        self.max_retry_count = max_retry_count;
        self
    }

    /// Conflicts emitted mid-run. An action that raises a conflict blocks
    /// the run until a resolution arrives, so a subscriber must be
    /// listening before such actions can execute.
    pub fn subscribe_conflicts(&self) -> broadcast::Receiver<Conflict> {
        self.conflicts.subscribe()
    }

    /// Sender the conflict receiver uses to answer.
    pub fn resolution_sender(&self) -> mpsc::UnboundedSender<ConflictResolution> {
        self.resolution_tx.clone()
    }

    /// Answer the pending conflict; the blocked run resumes with the
    /// actions the resolution translates to.
    pub fn enqueue_resolution(&self, resolution: ConflictResolution) {
        let _ = self.resolution_tx.send(resolution);
    }

    /// Execute one run to completion. Only one run may be active at a time;
    /// the scheduler serializes calls.
    pub async fn run(&self, request: SyncRequest, cancel: &CancellationToken) -> SyncReport {
        let mut state = RunState::new(&request);
        info!(
            sync_id = %state.sync_id,
            kind = %state.kind,
            attempt = state.retry_attempt,
            "sync run started"
        );
        self.emit(SyncEvent::Started {
            sync_id: state.sync_id.to_string(),
            kind: state.kind.to_string(),
            libraries: format!("{:?}", state.libraries),
        });

        if let Some(network) = &self.network {
            if !network.is_connected().await {
                return self.abort(state, Fatal::NoInternetConnection);
            }
        }

        state
            .queue
            .push_back(planner::initial_actions(state.kind, &state.libraries));

        loop {
            if cancel.is_cancelled() {
                return self.cancelled(state);
            }
            let Some(action) = state.queue.pop_front() else {
                return self.finish(state);
            };

            if state.last_returned_version.is_some()
                && action.library_id() != state.current_library
            {
                state.last_returned_version = None;
            }
            state.current_library = action.library_id();

            self.emit(SyncEvent::Progress {
                sync_id: state.sync_id.to_string(),
                library: action.library_id().map(|id| id.to_string()),
                action: action.name().to_string(),
            });

            let step = tokio::select! {
                _ = cancel.cancelled() => return self.cancelled(state),
                step = self.process(action, &mut state, cancel) => step,
            };
            match step {
                Ok(()) => {}
                Err(Fatal::Cancelled) => return self.cancelled(state),
                Err(fatal) => return self.abort(state, fatal),
            }
        }
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    async fn process(
        &self,
        action: Action,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<(), Fatal> {
        match action {
            Action::LoadKeyPermissions => self.load_key_permissions(state).await,
            Action::SyncGroupVersions => self.sync_group_versions(state).await,
            Action::CreateLibraryActions(libraries, options) => {
                self.create_library_actions(state, libraries, options).await
            }
            Action::SyncVersions {
                library_id,
                object,
                version,
                check_remote,
            } => {
                self.sync_versions(state, library_id, object, version, check_remote)
                    .await
            }
            Action::SyncBatchesToDb(batches) => self.sync_batches(state, batches, cancel).await,
            Action::StoreVersion {
                library_id,
                object,
                version,
            } => {
                self.store_version(state, library_id, VersionTarget::Object(object), version)
                    .await
            }
            Action::StoreDeletionVersion {
                library_id,
                version,
            } => {
                self.store_version(state, library_id, VersionTarget::Deletions, version)
                    .await
            }
            Action::SyncSettings {
                library_id,
                version,
            } => self.sync_settings(state, library_id, version).await,
            Action::SyncDeletions {
                library_id,
                version,
            } => self.sync_deletions(state, library_id, version, cancel).await,
            Action::PerformDeletions {
                library_id,
                deletions,
                version,
            } => {
                self.perform_deletions(state, library_id, deletions, version, cancel)
                    .await
            }
            Action::RestoreDeletions {
                library_id,
                collections,
                items,
            } => {
                let result = self
                    .store
                    .restore_deletions(library_id, &collections, &items)
                    .await;
                self.finish_store_action(state, library_id, result.map_err(Into::into))
            }
            Action::SubmitWriteBatch(batch) => self.submit_write_batch(state, batch).await,
            Action::SubmitDeleteBatch(batch) => self.submit_delete_batch(state, batch).await,
            Action::CreateUploadActions {
                library_id,
                had_other_write_actions,
                can_edit_files,
            } => {
                self.create_upload_actions(state, library_id, had_other_write_actions, can_edit_files)
                    .await
            }
            Action::UploadAttachment(upload) => self.upload_attachment(state, upload).await,
            Action::FixUpload { library_id, key } => self.fix_upload(library_id, key).await,
            Action::RemoveActions { library_id } => {
                state.queue.remove_library_actions(library_id);
                Ok(())
            }
            Action::RevertLibraryToOriginal { library_id } => {
                let result = self.store.revert_library_to_original(library_id).await;
                self.finish_store_action(state, library_id, result.map_err(Into::into))
            }
            Action::RevertLibraryFilesToOriginal { library_id } => {
                let result = self.store.revert_library_files_to_original(library_id).await;
                self.finish_store_action(state, library_id, result.map_err(Into::into))
            }
            Action::MarkChangesAsResolved { library_id } => {
                let result = self.store.mark_changes_as_resolved(library_id).await;
                self.finish_store_action(state, library_id, result.map_err(Into::into))
            }
            Action::MarkGroupAsLocalOnly { group_id } => {
                let result = self.store.mark_group_as_local_only(group_id).await;
                self.finish_store_action(
                    state,
                    LibraryIdentifier::Group(group_id),
                    result.map_err(Into::into),
                )
            }
            Action::DeleteGroup { group_id } => {
                let result = self.store.delete_group(group_id).await;
                self.finish_store_action(
                    state,
                    LibraryIdentifier::Group(group_id),
                    result.map_err(Into::into),
                )
            }
            Action::SyncGroupToDb { group_id } => self.sync_group(state, group_id).await,
            Action::ResolveDeletedGroup { group_id, name } => {
                self.resolve(state, Conflict::GroupRemoved { group_id, name }, cancel)
                    .await
            }
            Action::ResolveGroupMetadataWritePermission { group_id, name } => {
                self.resolve(
                    state,
                    Conflict::GroupMetadataWriteDenied { group_id, name },
                    cancel,
                )
                .await
            }
            Action::ResolveGroupFileWritePermission { group_id, name } => {
                self.resolve(
                    state,
                    Conflict::GroupFileWriteDenied { group_id, name },
                    cancel,
                )
                .await
            }
            Action::PerformWebDavDeletions { library_id } => {
                self.perform_web_dav_deletions(state, library_id).await
            }
        }
    }

    // ========================================================================
    // Action handlers
    // ========================================================================

    async fn load_key_permissions(&self, state: &mut RunState) -> Result<(), Fatal> {
        let permissions = match self.api.fetch_key_permissions().await {
            Ok(permissions) => permissions,
            Err(api_error) => {
                let classified =
                    SyncError::from_api_error(&api_error, None, ErrorData::default());
                return match classified {
                    SyncError::Fatal(fatal) => Err(fatal),
                    SyncError::NonFatal(_) => Err(Fatal::PermissionLoadingFailed),
                };
            }
        };

        if let Some(default_access) = permissions.default_group_access {
            if !default_access.can_edit_metadata {
                return Err(Fatal::MissingGroupPermissions);
            }
        }
        state.access = Some(permissions);
        Ok(())
    }

    async fn sync_group_versions(&self, state: &mut RunState) -> Result<(), Fatal> {
        let remote = match self.api.fetch_group_versions(self.user_id).await {
            Ok(remote) => remote,
            Err(api_error) => {
                let classified =
                    SyncError::from_api_error(&api_error, None, ErrorData::default());
                return match classified {
                    SyncError::Fatal(fatal) => Err(fatal),
                    SyncError::NonFatal(_) => Err(Fatal::GroupSyncFailed),
                };
            }
        };

        let diff = match self.store.group_version_diff(&remote).await {
            Ok(diff) => diff,
            Err(error) => {
                error!(%error, "group version diff failed");
                return Err(Fatal::GroupSyncFailed);
            }
        };
        let actions =
            planner::group_actions(&diff.to_update, &diff.to_remove, &state.libraries, state.kind);
        state.queue.push_front(actions);
        Ok(())
    }

    async fn create_library_actions(
        &self,
        state: &mut RunState,
        libraries: Libraries,
        options: CreateLibraryActionsOptions,
    ) -> Result<(), Fatal> {
        let fetch_updates = options != CreateLibraryActionsOptions::OnlyDownloads;
        let load_versions = state.kind != SyncKind::Full;
        let data = match self
            .store
            .load_library_data(libraries, fetch_updates, load_versions, self.web_dav_enabled)
            .await
        {
            Ok(data) => data,
            Err(error) => {
                error!(%error, "loading library snapshots failed");
                return Err(Fatal::AllLibrariesFetchFailed);
            }
        };

        if options == CreateLibraryActionsOptions::Automatic || state.kind == SyncKind::Full {
            for library in &data {
                state
                    .library_names
                    .insert(library.identifier, library.name.clone());
            }
        }

        let (actions, index, write_count) = planner::library_actions(&data, options, state.kind);
        state.did_enqueue_write_actions =
            options != CreateLibraryActionsOptions::Automatic || write_count > 0;

        match index {
            Some(0) => state.queue.push_front(actions),
            _ => state.queue.push_back(actions),
        }
        Ok(())
    }

    async fn sync_versions(
        &self,
        state: &mut RunState,
        library_id: LibraryIdentifier,
        object: SyncObject,
        version: i64,
        check_remote: bool,
    ) -> Result<(), Fatal> {
        let last = state.last_returned_version;

        let result: Result<(i64, Vec<String>), SyncError> = async {
            if !check_remote && state.kind != SyncKind::Full {
                // Nothing moved remotely; only re-queue locally flagged keys.
                let keys = self
                    .store
                    .sync_versions(library_id, object, &HashMap::new(), false)
                    .await?;
                return Ok((last.unwrap_or(version), keys));
            }

            let response = self
                .api
                .fetch_versions(library_id, object, Some(version))
                .await
                .map_err(|e| {
                    SyncError::from_api_error(
                        &e,
                        Some(library_id),
                        ErrorData::for_library(library_id),
                    )
                })?;
            let new_version = response.last_modified_version;
            if let Some(current) = last {
                if new_version != current {
                    // The library shifted between category fetches.
                    return Err(NonFatal::VersionMismatch(library_id).into());
                }
            }
            let keys = self
                .store
                .sync_versions(
                    library_id,
                    object,
                    &response.versions,
                    state.kind == SyncKind::Full,
                )
                .await?;
            Ok((new_version, keys))
        }
        .await;

        match result {
            Ok((new_version, keys)) => {
                debug!(library = %library_id, object = %object, count = keys.len(), "versions synced");
                let should_store_version = last != Some(version);
                let actions = planner::batched_object_actions(
                    library_id,
                    object,
                    keys,
                    new_version,
                    should_store_version,
                );
                state.queue.push_front(actions);
                Ok(())
            }
            Err(error) => self.handle_failure(state, error, Some(library_id), Some(version)),
        }
    }

    async fn sync_batches(
        &self,
        state: &mut RunState,
        batches: Vec<DownloadBatch>,
        cancel: &CancellationToken,
    ) -> Result<(), Fatal> {
        let Some(first) = batches.first() else {
            return Ok(());
        };
        let library_id = first.library_id;
        let object = first.object;
        let all_keys: Vec<String> = batches.iter().flat_map(|b| b.keys.clone()).collect();

        let processor = BatchProcessor::new(self.api.clone(), self.store.clone());
        match processor.process(batches, cancel).await {
            Ok(result) => {
                for message in result.parse_errors {
                    state.non_fatal_errors.push(NonFatal::ParsingError {
                        message,
                        library_id: Some(library_id),
                    });
                }
                if !result.conflict_keys.is_empty() {
                    debug!(
                        library = %library_id,
                        conflicts = result.conflict_keys.len(),
                        "downloaded objects conflicted with local changes"
                    );
                }
                Ok(())
            }
            Err(SyncError::Fatal(fatal)) => Err(fatal),
            Err(SyncError::NonFatal(non_fatal)) => {
                // The whole set failed; flag everything for a later attempt.
                if let Err(error) = self
                    .store
                    .mark_for_resync(library_id, object, &all_keys)
                    .await
                {
                    return Err(SyncError::from(error).into_fatal_or(Fatal::DbError(
                        "marking keys for resync failed".to_string(),
                    )));
                }
                self.handle_non_fatal(state, non_fatal, Some(library_id), None);
                Ok(())
            }
        }
    }

    async fn store_version(
        &self,
        state: &mut RunState,
        library_id: LibraryIdentifier,
        target: VersionTarget,
        version: i64,
    ) -> Result<(), Fatal> {
        let result = self.store.store_version(library_id, target, version).await;
        self.finish_store_action(state, library_id, result.map_err(Into::into))
    }

    async fn sync_settings(
        &self,
        state: &mut RunState,
        library_id: LibraryIdentifier,
        version: i64,
    ) -> Result<(), Fatal> {
        let response = match self.api.fetch_settings(library_id, version).await {
            Ok(response) => response,
            Err(api_error) => {
                let classified = SyncError::from_api_error(
                    &api_error,
                    Some(library_id),
                    ErrorData::for_library(library_id),
                );
                return self.handle_failure(state, classified, Some(library_id), Some(version));
            }
        };

        let new_version = response.last_modified_version;
        if let Some(current) = state.last_returned_version {
            if new_version != current {
                return self.handle_failure(
                    state,
                    NonFatal::VersionMismatch(library_id).into(),
                    Some(library_id),
                    Some(version),
                );
            }
        }
        debug!(library = %library_id, version = new_version, "settings synced");
        state.last_returned_version = Some(new_version);

        if !response.settings.is_null() {
            if let Err(error) = self
                .store
                .store_settings(library_id, &response.settings, new_version)
                .await
            {
                return self.handle_failure(
                    state,
                    error.into(),
                    Some(library_id),
                    Some(version),
                );
            }
            state.queue.push_front([Action::StoreVersion {
                library_id,
                object: SyncObject::Settings,
                version: new_version,
            }]);
        }
        Ok(())
    }

    async fn sync_deletions(
        &self,
        state: &mut RunState,
        library_id: LibraryIdentifier,
        version: i64,
        cancel: &CancellationToken,
    ) -> Result<(), Fatal> {
        let response = match self.api.fetch_deletions(library_id, version).await {
            Ok(response) => response,
            Err(api_error) => {
                let classified = SyncError::from_api_error(
                    &api_error,
                    Some(library_id),
                    ErrorData::for_library(library_id),
                );
                return self.handle_failure(state, classified, Some(library_id), Some(version));
            }
        };

        let new_version = response.last_modified_version;
        if let Some(current) = state.last_returned_version {
            if new_version != current {
                return self.handle_failure(
                    state,
                    NonFatal::VersionMismatch(library_id).into(),
                    Some(library_id),
                    Some(version),
                );
            }
        }
        update_deletion_version(state, library_id, new_version);

        let deletions = DeletionsToApply {
            collections: response.collections,
            items: response.items,
            searches: response.searches,
            tags: response.tags,
        };
        if deletions == DeletionsToApply::default() {
            return Ok(());
        }

        if state.kind == SyncKind::Full {
            // A full re-download applies deletions directly; only items with
            // unsubmitted local changes go through the conflict receiver.
            return self
                .perform_deletions(state, library_id, deletions, Some(new_version), cancel)
                .await;
        }

        self.resolve(
            state,
            Conflict::ObjectsRemovedRemotely {
                library_id,
                collections: deletions.collections,
                items: deletions.items,
                searches: deletions.searches,
                tags: deletions.tags,
            },
            cancel,
        )
        .await
    }

    async fn perform_deletions(
        &self,
        state: &mut RunState,
        library_id: LibraryIdentifier,
        deletions: DeletionsToApply,
        version: Option<i64>,
        cancel: &CancellationToken,
    ) -> Result<(), Fatal> {
        let conflicts = match self
            .store
            .perform_deletions(library_id, &deletions, version)
            .await
        {
            Ok(conflicts) => conflicts,
            Err(error) => {
                return self.handle_failure(state, error.into(), Some(library_id), version)
            }
        };
        if conflicts.is_empty() {
            return Ok(());
        }
        self.resolve(
            state,
            Conflict::RemovedItemsHaveLocalChanges {
                library_id,
                keys: conflicts,
            },
            cancel,
        )
        .await
    }

    async fn submit_write_batch(
        &self,
        state: &mut RunState,
        batch: WriteBatch,
    ) -> Result<(), Fatal> {
        let keys: Vec<String> = batch
            .parameters
            .iter()
            .filter_map(|p| p.get("key").and_then(|k| k.as_str()))
            .map(str::to_string)
            .collect();

        let response = match self
            .api
            .submit_write_batch(batch.library_id, batch.object, batch.version, &batch.parameters)
            .await
        {
            Ok(response) => response,
            Err(api_error) => {
                let classified = SyncError::from_api_error(
                    &api_error,
                    Some(batch.library_id),
                    ErrorData::for_keys(batch.library_id, keys),
                );
                return self.handle_failure(
                    state,
                    classified,
                    Some(batch.library_id),
                    Some(batch.version),
                );
            }
        };

        if response.failed.iter().any(|f| f.code == 412) {
            // A per-object precondition failure means our local copy of a
            // remote object is stale in a way downloads alone cannot fix.
            return Err(Fatal::UploadObjectConflict(ErrorData::for_keys(
                batch.library_id,
                keys,
            )));
        }

        let new_version = response.last_modified_version;
        if let Err(error) = self
            .store
            .mark_submitted(&batch, &response.successful_keys, new_version)
            .await
        {
            return self.handle_failure(
                state,
                error.into(),
                Some(batch.library_id),
                Some(new_version),
            );
        }

        if !response.failed.is_empty() {
            let message = response
                .failed
                .iter()
                .map(|f| f.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            state.non_fatal_errors.push(NonFatal::Unknown {
                message,
                data: ErrorData::for_library(batch.library_id),
            });
        }

        update_version_in_next_write_batch(state, batch.library_id, new_version);
        Ok(())
    }

    async fn submit_delete_batch(
        &self,
        state: &mut RunState,
        batch: DeleteBatch,
    ) -> Result<(), Fatal> {
        let new_version = match self
            .api
            .submit_delete_batch(batch.library_id, batch.object, batch.version, &batch.keys)
            .await
        {
            Ok(new_version) => new_version,
            Err(api_error) => {
                let classified = SyncError::from_api_error(
                    &api_error,
                    Some(batch.library_id),
                    ErrorData::for_keys(batch.library_id, batch.keys.clone()),
                );
                return self.handle_failure(
                    state,
                    classified,
                    Some(batch.library_id),
                    Some(batch.version),
                );
            }
        };

        if let Err(error) = self.store.mark_deleted(&batch, new_version).await {
            return self.handle_failure(
                state,
                error.into(),
                Some(batch.library_id),
                Some(new_version),
            );
        }
        if self.web_dav_enabled {
            ensure_web_dav_deletions_action(state, batch.library_id);
        }
        update_version_in_next_write_batch(state, batch.library_id, new_version);
        Ok(())
    }

    async fn create_upload_actions(
        &self,
        state: &mut RunState,
        library_id: LibraryIdentifier,
        had_other_write_actions: bool,
        can_edit_files: bool,
    ) -> Result<(), Fatal> {
        let uploads = match self.store.pending_uploads(library_id).await {
            Ok(uploads) => uploads,
            Err(error) => {
                state.enqueued_uploads = 0;
                state.uploads_failed_before_api = 0;
                return self.finish_store_action(state, library_id, Err(error.into()));
            }
        };

        if uploads.is_empty() {
            if !had_other_write_actions {
                // The write branch turned out to have nothing to submit;
                // fall back to the download plan for this library.
                state.queue.push_front([Action::CreateLibraryActions(
                    Libraries::Specific(vec![library_id]),
                    CreateLibraryActionsOptions::OnlyDownloads,
                )]);
            }
            return Ok(());
        }

        if !can_edit_files {
            if let Some(group_id) = library_id.group_id() {
                let name = state
                    .library_names
                    .get(&library_id)
                    .cloned()
                    .unwrap_or_else(|| format!("group {}", group_id));
                state
                    .queue
                    .push_front([Action::ResolveGroupFileWritePermission { group_id, name }]);
            }
            return Ok(());
        }

        state.enqueued_uploads = uploads.len();
        state.uploads_failed_before_api = 0;
        state
            .queue
            .push_front(uploads.into_iter().map(Action::UploadAttachment));
        Ok(())
    }

    async fn upload_attachment(
        &self,
        state: &mut RunState,
        upload: AttachmentUpload,
    ) -> Result<(), Fatal> {
        let Some(uploader) = &self.uploader else {
            warn!("attachment upload skipped, no uploader configured");
            state.non_fatal_errors.push(NonFatal::Unknown {
                message: "attachment uploader not available".to_string(),
                data: ErrorData::for_keys(upload.library_id, vec![upload.key.clone()]),
            });
            return Ok(());
        };

        match uploader.upload(&upload).await {
            Ok(outcome) => {
                if let Err(error) = self
                    .store
                    .mark_attachment_uploaded(upload.library_id, upload.key.clone(), outcome.new_version)
                    .await
                {
                    return self.finish_store_action(state, upload.library_id, Err(error.into()));
                }
                Ok(())
            }
            Err(ApiError::Status { code, response })
                if matches!(code, 403 | 404 | 412 | 413) =>
            {
                self.handle_upload_authorization_failure(state, code, response, upload)
                    .await
            }
            Err(api_error) => {
                let failed_before_api =
                    matches!(api_error, ApiError::Transport(_) | ApiError::NoNetwork);
                let classified = SyncError::from_api_error(
                    &api_error,
                    Some(upload.library_id),
                    ErrorData::for_keys(upload.library_id, vec![upload.key.clone()]),
                );
                match classified {
                    SyncError::Fatal(fatal) => Err(fatal),
                    SyncError::NonFatal(non_fatal) => {
                        self.handle_non_fatal(state, non_fatal, Some(upload.library_id), None);
                        if failed_before_api {
                            handle_all_uploads_failed_early(state, upload.library_id);
                        }
                        Ok(())
                    }
                }
            }
        }
    }

    /// Map an upload-authorization HTTP failure onto the engine's control
    /// flow: 403 on a group raises a file-permission conflict, 413 is a
    /// quota limit, 404 aborts with a retryable submission error and 412
    /// reconciles the remote state with a fix-upload action.
    async fn handle_upload_authorization_failure(
        &self,
        state: &mut RunState,
        code: u16,
        response: String,
        upload: AttachmentUpload,
    ) -> Result<(), Fatal> {
        let library_id = upload.library_id;
        match code {
            403 => match library_id.group_id() {
                Some(group_id) => {
                    let name = state
                        .library_names
                        .get(&library_id)
                        .cloned()
                        .unwrap_or_else(|| format!("group {}", group_id));
                    state
                        .queue
                        .push_front([Action::ResolveGroupFileWritePermission { group_id, name }]);
                    Ok(())
                }
                None => {
                    self.handle_non_fatal(
                        state,
                        NonFatal::ApiError {
                            message: response,
                            data: ErrorData::for_keys(library_id, vec![upload.key]),
                        },
                        Some(library_id),
                        None,
                    );
                    Ok(())
                }
            },
            413 => {
                self.handle_non_fatal(
                    state,
                    NonFatal::QuotaLimit(library_id),
                    Some(library_id),
                    None,
                );
                Ok(())
            }
            404 => {
                // The parent item never made it to the backend; flag it so
                // the next run submits it first, then retry the same scope.
                if self
                    .store
                    .mark_attachment_item_for_submission(library_id, upload.key.clone())
                    .await
                    .is_err()
                {
                    return Err(Fatal::DbError(
                        "could not flag attachment item for submission".to_string(),
                    ));
                }
                Err(Fatal::CantSubmitAttachmentItem(ErrorData::for_keys(
                    library_id,
                    vec![upload.key],
                )))
            }
            412 => {
                state.queue.push_front([Action::FixUpload {
                    library_id,
                    key: upload.key,
                }]);
                Ok(())
            }
            _ => {
                self.handle_non_fatal(
                    state,
                    NonFatal::ApiError {
                        message: response,
                        data: ErrorData::for_keys(library_id, vec![upload.key]),
                    },
                    Some(library_id),
                    None,
                );
                Ok(())
            }
        }
    }

    /// Re-fetch remote metadata for an attachment whose upload hit a
    /// precondition failure and reconcile the local copy.
    async fn fix_upload(&self, library_id: LibraryIdentifier, key: String) -> Result<(), Fatal> {
        let result: Result<(), SyncError> = async {
            let keys = vec![key.clone()];
            let response = self
                .api
                .fetch_objects(library_id, SyncObject::Item, &keys)
                .await
                .map_err(|e| {
                    SyncError::from_api_error(
                        &e,
                        Some(library_id),
                        ErrorData::for_keys(library_id, keys.clone()),
                    )
                })?;
            self.store
                .store_objects(
                    library_id,
                    SyncObject::Item,
                    &response.objects,
                    response.last_modified_version,
                )
                .await?;
            self.store
                .mark_attachment_uploaded(library_id, key.clone(), None)
                .await?;
            Ok(())
        }
        .await;

        result.map_err(|error| {
            error!(%error, "upload fix failed");
            Fatal::UploadObjectConflict(ErrorData::for_keys(library_id, vec![key]))
        })
    }

    async fn sync_group(&self, state: &mut RunState, group_id: i64) -> Result<(), Fatal> {
        let library_id = LibraryIdentifier::Group(group_id);
        let result: Result<(), SyncError> = async {
            let response = self.api.fetch_group(group_id).await.map_err(|e| {
                SyncError::from_api_error(&e, Some(library_id), ErrorData::for_library(library_id))
            })?;
            let Some(group) = response.objects.first() else {
                return Err(NonFatal::Unknown {
                    message: format!("group {} metadata missing from response", group_id),
                    data: ErrorData::for_library(library_id),
                }
                .into());
            };
            self.store
                .store_group(group, response.last_modified_version)
                .await?;
            Ok(())
        }
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(SyncError::Fatal(fatal)) => Err(fatal),
            Err(SyncError::NonFatal(non_fatal)) => {
                warn!(group_id, error = %non_fatal, "group sync failed");
                state.non_fatal_errors.push(non_fatal);
                Ok(())
            }
        }
    }

    async fn perform_web_dav_deletions(
        &self,
        state: &mut RunState,
        library_id: LibraryIdentifier,
    ) -> Result<(), Fatal> {
        let Some(web_dav) = &self.web_dav else {
            return Ok(());
        };

        let keys = match self.store.pending_web_dav_deletions(library_id).await {
            Ok(keys) => keys,
            Err(error) => return self.finish_store_action(state, library_id, Err(error.into())),
        };
        if keys.is_empty() {
            return Ok(());
        }

        match web_dav.delete_files(library_id, &keys).await {
            Ok(failed) => {
                let deleted: Vec<String> = keys
                    .iter()
                    .filter(|key| !failed.contains(key))
                    .cloned()
                    .collect();
                if let Err(error) = self
                    .store
                    .clear_web_dav_deletions(library_id, &deleted)
                    .await
                {
                    return self.finish_store_action(state, library_id, Err(error.into()));
                }
                if !failed.is_empty() {
                    self.handle_non_fatal(
                        state,
                        NonFatal::WebDavDeletion {
                            count: failed.len(),
                            library: library_id.to_string(),
                        },
                        Some(library_id),
                        None,
                    );
                }
                Ok(())
            }
            Err(api_error) => {
                self.handle_non_fatal(
                    state,
                    NonFatal::WebDavDeletionFailed {
                        error: api_error.to_string(),
                        library: library_id.to_string(),
                    },
                    Some(library_id),
                    None,
                );
                Ok(())
            }
        }
    }

    // ========================================================================
    // Conflicts
    // ========================================================================

    /// Emit a conflict and block until the receiver answers, then splice
    /// the resolution's follow-up actions ahead of the remaining plan.
    async fn resolve(
        &self,
        state: &mut RunState,
        conflict: Conflict,
        cancel: &CancellationToken,
    ) -> Result<(), Fatal> {
        info!(conflict = ?conflict, "conflict requires external resolution");
        if self.conflicts.send(conflict).is_err() {
            // Nobody is listening; the run cannot make a decision on the
            // user's behalf.
            return Err(Fatal::Cancelled);
        }

        let mut resolutions = self.resolutions.lock().await;
        let resolution = tokio::select! {
            _ = cancel.cancelled() => return Err(Fatal::Cancelled),
            resolution = resolutions.recv() => resolution,
        };
        drop(resolutions);

        match resolution {
            Some(resolution) => {
                state.queue.push_front(resolution.into_actions());
                Ok(())
            }
            None => Err(Fatal::Cancelled),
        }
    }

    // ========================================================================
    // Failure handling
    // ========================================================================

    fn finish_store_action(
        &self,
        state: &mut RunState,
        library_id: LibraryIdentifier,
        result: Result<(), SyncError>,
    ) -> Result<(), Fatal> {
        match result {
            Ok(()) => Ok(()),
            Err(error) => self.handle_failure(state, error, Some(library_id), None),
        }
    }

    fn handle_failure(
        &self,
        state: &mut RunState,
        error: SyncError,
        library_id: Option<LibraryIdentifier>,
        version: Option<i64>,
    ) -> Result<(), Fatal> {
        match error {
            SyncError::Fatal(fatal) => Err(fatal),
            SyncError::NonFatal(non_fatal) => {
                self.handle_non_fatal(state, non_fatal, library_id, version);
                Ok(())
            }
        }
    }

    /// Record a non-fatal error and narrow the remaining plan where the
    /// error makes it stale.
    fn handle_non_fatal(
        &self,
        state: &mut RunState,
        error: NonFatal,
        library_id: Option<LibraryIdentifier>,
        version: Option<i64>,
    ) {
        match &error {
            NonFatal::VersionMismatch(_) | NonFatal::PreconditionFailed(_) => {
                if let Some(library_id) = library_id {
                    state.queue.remove_library_actions(library_id);
                }
                state.non_fatal_errors.push(error);
            }
            NonFatal::Unchanged => {
                if let (Some(library_id), Some(version)) = (library_id, version) {
                    handle_unchanged(state, library_id, version);
                }
            }
            NonFatal::QuotaLimit(quota_library) => {
                let quota_library = *quota_library;
                state.queue.retain(|action| {
                    !matches!(action, Action::UploadAttachment(upload) if upload.library_id == quota_library)
                });
                if state.quota_requeued.insert(quota_library) {
                    state.queue.push_front([Action::CreateLibraryActions(
                        Libraries::Specific(vec![quota_library]),
                        CreateLibraryActionsOptions::OnlyDownloads,
                    )]);
                }
                if !state.non_fatal_errors.contains(&error) {
                    state.non_fatal_errors.push(error);
                }
            }
            _ => state.non_fatal_errors.push(error),
        }
    }

    // ========================================================================
    // Run termination
    // ========================================================================

    fn finish(&self, state: RunState) -> SyncReport {
        let (retry, errors) = split_retry(&state, self.max_retry_count);
        info!(
            sync_id = %state.sync_id,
            errors = errors.len(),
            retry = retry.is_some(),
            "sync run finished"
        );
        self.emit(SyncEvent::Finished {
            sync_id: state.sync_id.to_string(),
            error_count: errors.len(),
            retry_scheduled: retry.is_some(),
        });
        SyncReport {
            retry,
            errors,
            fatal: None,
        }
    }

    fn abort(&self, state: RunState, fatal: Fatal) -> SyncReport {
        error!(sync_id = %state.sync_id, error = %fatal, "sync run aborted");
        let retry = fatal_retry(&state, &fatal, self.max_retry_count);
        self.emit(SyncEvent::Aborted {
            sync_id: state.sync_id.to_string(),
            message: fatal.to_string(),
        });
        SyncReport {
            retry,
            errors: state.non_fatal_errors,
            fatal: Some(fatal),
        }
    }

    fn cancelled(&self, state: RunState) -> SyncReport {
        info!(sync_id = %state.sync_id, "sync run cancelled");
        self.emit(SyncEvent::Cancelled {
            sync_id: state.sync_id.to_string(),
        });
        SyncReport {
            retry: None,
            errors: Vec::new(),
            fatal: Some(Fatal::Cancelled),
        }
    }

    fn emit(&self, event: SyncEvent) {
        let _ = self.events.emit(CoreEvent::Sync(event));
    }
}

// ============================================================================
// Queue surgery helpers
// ============================================================================

/// Splice a fresh optimistic-concurrency token into the next queued
/// write or delete batch so subsequent submissions do not need re-planning.
fn update_version_in_next_write_batch(
    state: &mut RunState,
    library_id: LibraryIdentifier,
    version: i64,
) {
    let replacement = match state.queue.front() {
        Some(Action::SubmitWriteBatch(batch)) if batch.library_id == library_id => {
            Action::SubmitWriteBatch(batch.copy_with_version(version))
        }
        Some(Action::SubmitDeleteBatch(batch)) if batch.library_id == library_id => {
            Action::SubmitDeleteBatch(batch.copy_with_version(version))
        }
        _ => return,
    };
    state.queue.replace_at(0, replacement);
}

/// Rewrite the queued deletion-version store for a library once the
/// server reported the deletions' actual version.
fn update_deletion_version(state: &mut RunState, library_id: LibraryIdentifier, version: i64) {
    let position = state.queue.iter().position(|action| {
        matches!(action, Action::StoreDeletionVersion { library_id: id, .. } if *id == library_id)
    });
    if let Some(index) = position {
        state
            .queue
            .replace_at(index, Action::StoreDeletionVersion { library_id, version });
    }
}

/// A 304 means the library did not move past `last_version`. Queued
/// settings/deletions/version-store actions already at that version are
/// redundant, and version listings only need a remote round trip when
/// their since-version is older.
fn handle_unchanged(state: &mut RunState, library_id: LibraryIdentifier, last_version: i64) {
    state.last_returned_version = Some(last_version);
    if state.kind == SyncKind::Full {
        return;
    }

    let mut replacements: Vec<(usize, Action)> = Vec::new();
    let mut to_delete: Vec<usize> = Vec::new();
    for (index, action) in state.queue.iter().enumerate() {
        if action.library_id() != Some(library_id) {
            break;
        }
        match action {
            Action::SyncVersions {
                library_id,
                object,
                version,
                ..
            } => {
                replacements.push((
                    index,
                    Action::SyncVersions {
                        library_id: *library_id,
                        object: *object,
                        version: *version,
                        check_remote: *version < last_version,
                    },
                ));
            }
            Action::SyncSettings { version, .. }
            | Action::SyncDeletions { version, .. }
            | Action::StoreDeletionVersion { version, .. } => {
                if *version == last_version {
                    to_delete.push(index);
                }
            }
            _ => {}
        }
    }

    for (index, action) in replacements {
        state.queue.replace_at(index, action);
    }
    for index in to_delete.into_iter().rev() {
        state.queue.remove_at(index);
    }
}

/// Insert a WebDAV deletions action at the end of a library's queued
/// actions unless one is already queued.
fn ensure_web_dav_deletions_action(state: &mut RunState, library_id: LibraryIdentifier) {
    let mut insert_at = 0;
    for action in state.queue.iter() {
        if action.library_id() != Some(library_id) {
            break;
        }
        if matches!(action, Action::PerformWebDavDeletions { .. }) {
            return;
        }
        insert_at += 1;
    }
    state
        .queue
        .insert_at(insert_at, Action::PerformWebDavDeletions { library_id });
}

/// When a library's run consisted solely of uploads and every one of them
/// failed before reaching the backend, nothing was actually written; fall
/// back to a download-only plan so reads still happen.
fn handle_all_uploads_failed_early(state: &mut RunState, library_id: LibraryIdentifier) {
    if state.did_enqueue_write_actions || state.enqueued_uploads == 0 {
        return;
    }
    state.uploads_failed_before_api += 1;
    if state.uploads_failed_before_api != state.enqueued_uploads {
        return;
    }
    if state.queue.front().map(|a| a.library_id()) == Some(Some(library_id)) {
        return;
    }

    state.did_enqueue_write_actions = false;
    state.enqueued_uploads = 0;
    state.uploads_failed_before_api = 0;
    state.queue.push_front([Action::CreateLibraryActions(
        Libraries::Specific(vec![library_id]),
        CreateLibraryActionsOptions::OnlyDownloads,
    )]);
}

// ============================================================================
// Retry policy
// ============================================================================

/// Split accumulated non-fatal errors into a scoped retry request and the
/// errors to report. Version mismatches and precondition failures retry as
/// download-first syncs over exactly the affected libraries.
fn split_retry(state: &RunState, max_retry_count: usize) -> (Option<SyncRequest>, Vec<NonFatal>) {
    let mut retry_libraries: Vec<LibraryIdentifier> = Vec::new();
    let mut report = Vec::new();
    let mut kind = state.kind;

    for error in &state.non_fatal_errors {
        match error {
            NonFatal::VersionMismatch(library_id) | NonFatal::PreconditionFailed(library_id) => {
                if !retry_libraries.contains(library_id) {
                    retry_libraries.push(*library_id);
                }
                kind = SyncKind::PrioritizeDownloads;
            }
            NonFatal::AnnotationDidSplit { library_id, .. } => {
                if !retry_libraries.contains(library_id) {
                    retry_libraries.push(*library_id);
                }
            }
            other => report.push(other.clone()),
        }
    }

    if retry_libraries.is_empty() || state.retry_attempt >= max_retry_count {
        return (None, state.non_fatal_errors.clone());
    }
    let retry = SyncRequest {
        kind,
        libraries: Libraries::Specific(retry_libraries),
        retry_attempt: state.retry_attempt + 1,
    };
    (Some(retry), report)
}

/// Fatal errors that warrant one corrective retry.
fn fatal_retry(state: &RunState, fatal: &Fatal, max_retry_count: usize) -> Option<SyncRequest> {
    if state.retry_attempt >= max_retry_count {
        return None;
    }
    match fatal {
        Fatal::UploadObjectConflict(_) => Some(SyncRequest {
            kind: SyncKind::Full,
            libraries: Libraries::All,
            retry_attempt: state.retry_attempt + 1,
        }),
        Fatal::CantSubmitAttachmentItem(_) => Some(SyncRequest {
            kind: state.kind,
            libraries: state.libraries.clone(),
            retry_attempt: state.retry_attempt + 1,
        }),
        _ => None,
    }
}

impl SyncError {
    fn into_fatal_or(self, fallback: Fatal) -> Fatal {
        match self {
            SyncError::Fatal(fatal) => fatal,
            SyncError::NonFatal(_) => fallback,
        }
    }
}
