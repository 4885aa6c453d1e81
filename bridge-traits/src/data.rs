//! Shared Sync Data Model
//!
//! Value types exchanged between the sync engine and its collaborators:
//! library identity, per-category version tokens, planning snapshots and
//! bounded write/delete batches.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of entries in a single write or delete batch.
pub const MAX_BATCH_SIZE: usize = 50;

/// Identifies a sync namespace: the single personal library or a shared
/// group library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "camelCase")]
pub enum LibraryIdentifier {
    /// The user's personal library.
    Custom,
    /// A shared group library, keyed by its backend group id.
    Group(i64),
}

impl LibraryIdentifier {
    /// Backend group id, if this identifies a group library.
    pub fn group_id(&self) -> Option<i64> {
        match self {
            Self::Custom => None,
            Self::Group(id) => Some(*id),
        }
    }

    /// Path component used by the remote API for this library.
    pub fn api_path(&self, user_id: i64) -> String {
        match self {
            Self::Custom => format!("users/{}", user_id),
            Self::Group(id) => format!("groups/{}", id),
        }
    }
}

impl fmt::Display for LibraryIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom => write!(f, "custom"),
            Self::Group(id) => write!(f, "group({})", id),
        }
    }
}

/// Syncable object category within a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncObject {
    Collection,
    Search,
    Item,
    Trash,
    Settings,
}

impl SyncObject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collection => "collection",
            Self::Search => "search",
            Self::Item => "item",
            Self::Trash => "trash",
            Self::Settings => "settings",
        }
    }

    /// Query-parameter key used when fetching this category by key set.
    /// Trashed items share the item endpoint.
    pub fn key_parameter(&self) -> Option<&'static str> {
        match self {
            Self::Collection => Some("collectionKey"),
            Self::Search => Some("searchKey"),
            Self::Item | Self::Trash => Some("itemKey"),
            Self::Settings => None,
        }
    }
}

impl fmt::Display for SyncObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The set of libraries a sync request targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "identifiers", rename_all = "camelCase")]
pub enum Libraries {
    All,
    Specific(Vec<LibraryIdentifier>),
}

impl Libraries {
    pub fn contains(&self, library_id: &LibraryIdentifier) -> bool {
        match self {
            Self::All => true,
            Self::Specific(ids) => ids.contains(library_id),
        }
    }
}

/// Versioned-write target inside a library: one object category or the
/// deletions log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VersionTarget {
    Object(SyncObject),
    Deletions,
}

/// Per-category version counters for one library. Acts as the
/// optimistic-concurrency token: the server rejects writes whose expected
/// version does not match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versions {
    pub collections: i64,
    pub items: i64,
    pub trash: i64,
    pub searches: i64,
    pub deletions: i64,
    pub settings: i64,
}

impl Versions {
    /// Largest of the six counters.
    pub fn max(&self) -> i64 {
        self.collections
            .max(self.items)
            .max(self.trash)
            .max(self.searches)
            .max(self.deletions)
            .max(self.settings)
    }

    pub fn version(&self, object: SyncObject) -> i64 {
        match object {
            SyncObject::Collection => self.collections,
            SyncObject::Search => self.searches,
            SyncObject::Item => self.items,
            SyncObject::Trash => self.trash,
            SyncObject::Settings => self.settings,
        }
    }
}

/// A bounded set of pending local writes for one object category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteBatch {
    pub library_id: LibraryIdentifier,
    pub object: SyncObject,
    pub version: i64,
    pub parameters: Vec<serde_json::Value>,
}

impl WriteBatch {
    /// Same batch with a fresh optimistic-concurrency token.
    pub fn copy_with_version(&self, version: i64) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }
}

/// A bounded set of pending local deletions for one object category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteBatch {
    pub library_id: LibraryIdentifier,
    pub object: SyncObject,
    pub version: i64,
    pub keys: Vec<String>,
}

impl DeleteBatch {
    pub fn copy_with_version(&self, version: i64) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }
}

/// A pending attachment upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUpload {
    pub library_id: LibraryIdentifier,
    pub key: String,
    pub filename: String,
    pub md5: String,
    pub mtime: i64,
    pub file_size: u64,
}

/// Read-only planning snapshot for one library, built once per planning
/// pass and never mutated in place.
#[derive(Debug, Clone)]
pub struct LibraryData {
    pub identifier: LibraryIdentifier,
    pub name: String,
    pub versions: Versions,
    pub can_edit_metadata: bool,
    pub can_edit_files: bool,
    pub updates: Vec<WriteBatch>,
    pub deletions: Vec<DeleteBatch>,
    pub has_upload: bool,
    pub has_web_dav_deletions: bool,
}
