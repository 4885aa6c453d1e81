//! Sync Run Types
//!
//! Engine-side value types: the sync kinds a run can be requested with, the
//! request itself and the doubling-size download chunker.

use bridge_traits::data::{Libraries, LibraryIdentifier, SyncObject};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum number of keys in one download batch.
pub const DOWNLOAD_BATCH_MAX: usize = 50;

/// Initial chunk size of the download chunker; doubles per chunk up to
/// [`DOWNLOAD_BATCH_MAX`].
pub const DOWNLOAD_BATCH_INITIAL: usize = 10;

/// The flavor of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncKind {
    /// Regular incremental sync.
    Normal,
    /// Incremental sync that skips per-object download gating.
    IgnoreIndividualDelays,
    /// Re-download everything, ignoring local version bookkeeping.
    Full,
    /// Only collections, for a quick navigation refresh.
    CollectionsOnly,
    /// Only validate the API key and load permissions.
    KeysOnly,
    /// Downloads before writes; used for engine-requested retries after a
    /// version mismatch.
    PrioritizeDownloads,
}

impl SyncKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::IgnoreIndividualDelays => "ignoreIndividualDelays",
            Self::Full => "full",
            Self::CollectionsOnly => "collectionsOnly",
            Self::KeysOnly => "keysOnly",
            Self::PrioritizeDownloads => "prioritizeDownloads",
        }
    }
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SyncKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "ignoreIndividualDelays" => Ok(Self::IgnoreIndividualDelays),
            "full" => Ok(Self::Full),
            "collectionsOnly" => Ok(Self::CollectionsOnly),
            "keysOnly" => Ok(Self::KeysOnly),
            "prioritizeDownloads" => Ok(Self::PrioritizeDownloads),
            _ => Err(format!("Unknown sync kind: {}", s)),
        }
    }
}

/// One sync request as accepted by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub kind: SyncKind,
    pub libraries: Libraries,
    /// Zero for user-initiated requests; incremented on each
    /// engine-requested retry.
    pub retry_attempt: usize,
}

impl SyncRequest {
    pub fn new(kind: SyncKind, libraries: Libraries) -> Self {
        Self {
            kind,
            libraries,
            retry_attempt: 0,
        }
    }

    pub fn is_retry(&self) -> bool {
        self.retry_attempt > 0
    }
}

/// A bounded set of keys to download in one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadBatch {
    pub library_id: LibraryIdentifier,
    pub object: SyncObject,
    pub keys: Vec<String>,
    /// Version the whole batch set was planned against; the server must
    /// still report this version or the plan is stale.
    pub version: i64,
}

impl DownloadBatch {
    /// Chunk `keys` into batches whose sizes double from
    /// [`DOWNLOAD_BATCH_INITIAL`] up to [`DOWNLOAD_BATCH_MAX`], balancing
    /// request count against per-request payload size.
    pub fn from_keys(
        library_id: LibraryIdentifier,
        object: SyncObject,
        keys: Vec<String>,
        version: i64,
    ) -> Vec<DownloadBatch> {
        let mut batches = Vec::new();
        let mut chunk_size = DOWNLOAD_BATCH_INITIAL;
        let mut remaining = keys.as_slice();

        while !remaining.is_empty() {
            let take = chunk_size.min(remaining.len());
            let (chunk, rest) = remaining.split_at(take);
            batches.push(DownloadBatch {
                library_id,
                object,
                keys: chunk.to_vec(),
                version,
            });
            remaining = rest;
            chunk_size = (chunk_size * 2).min(DOWNLOAD_BATCH_MAX);
        }

        batches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("KEY{:04}", i)).collect()
    }

    #[test]
    fn test_sync_kind_round_trip() {
        for kind in [
            SyncKind::Normal,
            SyncKind::IgnoreIndividualDelays,
            SyncKind::Full,
            SyncKind::CollectionsOnly,
            SyncKind::KeysOnly,
            SyncKind::PrioritizeDownloads,
        ] {
            assert_eq!(kind.as_str().parse::<SyncKind>().unwrap(), kind);
        }
        assert!("bogus".parse::<SyncKind>().is_err());
    }

    #[test]
    fn test_sync_request_retry_flag() {
        let request = SyncRequest::new(SyncKind::Normal, Libraries::All);
        assert!(!request.is_retry());

        let retry = SyncRequest {
            retry_attempt: 1,
            ..request
        };
        assert!(retry.is_retry());
    }

    #[test]
    fn test_chunker_doubles_up_to_cap() {
        let batches = DownloadBatch::from_keys(
            LibraryIdentifier::Custom,
            SyncObject::Item,
            keys(200),
            5,
        );
        let sizes: Vec<usize> = batches.iter().map(|b| b.keys.len()).collect();
        assert_eq!(sizes, vec![10, 20, 40, 50, 50, 30]);
        assert_eq!(sizes.iter().sum::<usize>(), 200);
        assert!(sizes.iter().all(|&s| s <= DOWNLOAD_BATCH_MAX));
    }

    #[test]
    fn test_chunker_small_input() {
        let batches = DownloadBatch::from_keys(
            LibraryIdentifier::Custom,
            SyncObject::Collection,
            keys(7),
            1,
        );
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].keys.len(), 7);
    }

    #[test]
    fn test_chunker_empty_input() {
        let batches =
            DownloadBatch::from_keys(LibraryIdentifier::Custom, SyncObject::Item, Vec::new(), 1);
        assert!(batches.is_empty());
    }

    #[test]
    fn test_chunker_preserves_order_and_version() {
        let batches = DownloadBatch::from_keys(
            LibraryIdentifier::Group(3),
            SyncObject::Search,
            keys(15),
            42,
        );
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].keys[0], "KEY0000");
        assert_eq!(batches[1].keys[0], "KEY0010");
        assert!(batches.iter().all(|b| b.version == 42));
        assert!(batches
            .iter()
            .all(|b| b.library_id == LibraryIdentifier::Group(3)));
    }

    #[test]
    fn test_chunker_partition_property() {
        for n in [1, 9, 10, 11, 30, 31, 70, 121, 500] {
            let batches = DownloadBatch::from_keys(
                LibraryIdentifier::Custom,
                SyncObject::Item,
                keys(n),
                0,
            );
            let total: usize = batches.iter().map(|b| b.keys.len()).sum();
            assert_eq!(total, n, "keys must partition exactly for n={}", n);
            assert!(batches.iter().all(|b| b.keys.len() <= DOWNLOAD_BATCH_MAX));
        }
    }
}
