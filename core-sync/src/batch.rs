//! Batch Download Processor
//!
//! Executes a set of download batches concurrently and merges the results.
//! A version mismatch on any batch means the remote dataset shifted while
//! the plan was in flight; the whole set is cancelled and the library plan
//! must be rebuilt.

use crate::error::{ErrorData, NonFatal, SyncError};
use bridge_traits::api::ApiClient;
use bridge_traits::data::LibraryIdentifier;
use bridge_traits::store::LocalStore;
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::types::DownloadBatch;

/// Merged outcome of one batch set.
#[derive(Debug, Default)]
pub struct BatchDownloadResult {
    /// Keys requested but not present among the stored objects.
    pub failed_keys: Vec<String>,
    /// Per-object parse failures collected across batches.
    pub parse_errors: Vec<String>,
    /// Keys that conflicted with unsubmitted local changes.
    pub conflict_keys: Vec<String>,
}

pub struct BatchProcessor {
    api: Arc<dyn ApiClient>,
    store: Arc<dyn LocalStore>,
}

enum BatchOutcome {
    Done {
        failed_keys: Vec<String>,
        parse_errors: Vec<String>,
        conflict_keys: Vec<String>,
    },
    Skipped,
    Failed(SyncError),
}

impl BatchProcessor {
    pub fn new(api: Arc<dyn ApiClient>, store: Arc<dyn LocalStore>) -> Self {
        Self { api, store }
    }

    /// Fetch and store every batch, fanning out one request per batch.
    ///
    /// The first version mismatch or transport failure cancels the rest of
    /// the set and is returned as the overall error. Individual missing or
    /// unparsable objects do not fail the set; they are reported in the
    /// merged result.
    pub async fn process(
        &self,
        batches: Vec<DownloadBatch>,
        cancel: &CancellationToken,
    ) -> Result<BatchDownloadResult, SyncError> {
        let set_cancel = cancel.child_token();

        let tasks = batches
            .iter()
            .map(|batch| self.process_batch(batch, &set_cancel));
        let outcomes = join_all(tasks).await;

        let mut result = BatchDownloadResult::default();
        let mut first_error = None;
        for outcome in outcomes {
            match outcome {
                BatchOutcome::Done {
                    failed_keys,
                    parse_errors,
                    conflict_keys,
                } => {
                    result.failed_keys.extend(failed_keys);
                    result.parse_errors.extend(parse_errors);
                    result.conflict_keys.extend(conflict_keys);
                }
                BatchOutcome::Skipped => {}
                BatchOutcome::Failed(error) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }
        if cancel.is_cancelled() {
            return Err(crate::error::Fatal::Cancelled.into());
        }

        if !result.failed_keys.is_empty() {
            warn!(
                failed = result.failed_keys.len(),
                "some objects were missing from download responses"
            );
        }
        Ok(result)
    }

    async fn process_batch(
        &self,
        batch: &DownloadBatch,
        set_cancel: &CancellationToken,
    ) -> BatchOutcome {
        if set_cancel.is_cancelled() {
            return BatchOutcome::Skipped;
        }

        let response = tokio::select! {
            _ = set_cancel.cancelled() => return BatchOutcome::Skipped,
            response = self.api.fetch_objects(batch.library_id, batch.object, &batch.keys) => response,
        };

        let response = match response {
            Ok(response) => response,
            Err(error) => {
                set_cancel.cancel();
                return BatchOutcome::Failed(SyncError::from_api_error(
                    &error,
                    Some(batch.library_id),
                    ErrorData::for_keys(batch.library_id, batch.keys.clone()),
                ));
            }
        };

        if response.last_modified_version != batch.version {
            debug!(
                library = %batch.library_id,
                object = %batch.object,
                expected = batch.version,
                got = response.last_modified_version,
                "version shifted during batched download"
            );
            set_cancel.cancel();
            return BatchOutcome::Failed(version_mismatch(batch.library_id));
        }

        let stored = match self
            .store
            .store_objects(
                batch.library_id,
                batch.object,
                &response.objects,
                batch.version,
            )
            .await
        {
            Ok(stored) => stored,
            Err(error) => {
                set_cancel.cancel();
                return BatchOutcome::Failed(error.into());
            }
        };

        let failed_keys: Vec<String> = batch
            .keys
            .iter()
            .filter(|key| !stored.parsed_keys.contains(key))
            .cloned()
            .collect();

        if !failed_keys.is_empty() {
            if let Err(error) = self
                .store
                .mark_for_resync(batch.library_id, batch.object, &failed_keys)
                .await
            {
                set_cancel.cancel();
                return BatchOutcome::Failed(error.into());
            }
        }

        BatchOutcome::Done {
            failed_keys,
            parse_errors: stored.parse_errors,
            conflict_keys: stored.conflict_keys,
        }
    }
}

fn version_mismatch(library_id: LibraryIdentifier) -> SyncError {
    NonFatal::VersionMismatch(library_id).into()
}
