//! Remote API Abstraction
//!
//! Per-object-type endpoints of the multi-tenant backend, consumed by the
//! sync engine as an abstract client. Implementations own the HTTP
//! transport, authentication headers and `If-Unmodified-Since-Version`
//! handling; the engine only sees normalized [`ApiError`] values and typed
//! responses carrying the server-reported last-modified version.

use crate::data::{LibraryIdentifier, SyncObject};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Normalized transport-level failure. The engine classifies these into its
/// fatal/non-fatal taxonomy by status code.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("no network connection")]
    NoNetwork,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("request failed with status {code}")]
    Status { code: u16, response: String },
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Edit rights granted by an API key for one library.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryAccess {
    pub can_edit_metadata: bool,
    pub can_edit_files: bool,
}

/// Result of validating the API key against the backend.
#[derive(Debug, Clone, Default)]
pub struct KeyPermissions {
    pub user_id: i64,
    pub username: String,
    pub user_access: LibraryAccess,
    /// Per-group access; groups absent from the map fall back to
    /// `default_group_access` when present.
    pub group_access: HashMap<i64, LibraryAccess>,
    pub default_group_access: Option<LibraryAccess>,
}

impl KeyPermissions {
    pub fn access_for(&self, library_id: &LibraryIdentifier) -> Option<LibraryAccess> {
        match library_id {
            LibraryIdentifier::Custom => Some(self.user_access),
            LibraryIdentifier::Group(id) => self
                .group_access
                .get(id)
                .copied()
                .or(self.default_group_access),
        }
    }
}

/// Response of a key-set object fetch.
#[derive(Debug, Clone)]
pub struct ObjectsResponse {
    pub objects: Vec<serde_json::Value>,
    pub last_modified_version: i64,
}

/// Response of a since-version listing: key to current remote version.
#[derive(Debug, Clone)]
pub struct VersionsResponse {
    pub versions: HashMap<String, i64>,
    pub last_modified_version: i64,
}

/// Remotely deleted keys since a given version.
#[derive(Debug, Clone, Default)]
pub struct DeletionsResponse {
    pub collections: Vec<String>,
    pub items: Vec<String>,
    pub searches: Vec<String>,
    pub tags: Vec<String>,
    pub last_modified_version: i64,
}

/// Library settings payload since a given version.
#[derive(Debug, Clone)]
pub struct SettingsResponse {
    pub settings: serde_json::Value,
    pub last_modified_version: i64,
}

/// Per-entry failure inside an otherwise accepted write submission.
#[derive(Debug, Clone)]
pub struct WriteFailure {
    pub index: usize,
    pub code: u16,
    pub message: String,
}

/// Response of a write-batch submission.
#[derive(Debug, Clone)]
pub struct WriteResponse {
    pub successful_keys: Vec<String>,
    pub failed: Vec<WriteFailure>,
    pub last_modified_version: i64,
}

/// Remote API client used by the sync engine.
///
/// Submissions are idempotent given the same version token. Conditional
/// requests surface HTTP 304 as `ApiError::Status { code: 304, .. }` rather
/// than an empty success.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Validate the configured API key and load its permissions.
    async fn fetch_key_permissions(&self) -> ApiResult<KeyPermissions>;

    /// Current version of every group library visible to the user.
    async fn fetch_group_versions(&self, user_id: i64) -> ApiResult<HashMap<i64, i64>>;

    /// Fetch one group's metadata object and its version.
    async fn fetch_group(&self, group_id: i64) -> ApiResult<ObjectsResponse>;

    /// List remote versions for an object category changed since `since`.
    async fn fetch_versions(
        &self,
        library_id: LibraryIdentifier,
        object: SyncObject,
        since: Option<i64>,
    ) -> ApiResult<VersionsResponse>;

    /// Fetch full objects by key set.
    async fn fetch_objects(
        &self,
        library_id: LibraryIdentifier,
        object: SyncObject,
        keys: &[String],
    ) -> ApiResult<ObjectsResponse>;

    /// Fetch library settings changed since `since`.
    async fn fetch_settings(
        &self,
        library_id: LibraryIdentifier,
        since: i64,
    ) -> ApiResult<SettingsResponse>;

    /// Fetch remote deletions since `since`.
    async fn fetch_deletions(
        &self,
        library_id: LibraryIdentifier,
        since: i64,
    ) -> ApiResult<DeletionsResponse>;

    /// Submit a batch of object writes with an expected version token.
    async fn submit_write_batch(
        &self,
        library_id: LibraryIdentifier,
        object: SyncObject,
        version: i64,
        parameters: &[serde_json::Value],
    ) -> ApiResult<WriteResponse>;

    /// Submit a batch of object deletions with an expected version token.
    /// Returns the new last-modified version.
    async fn submit_delete_batch(
        &self,
        library_id: LibraryIdentifier,
        object: SyncObject,
        version: i64,
        keys: &[String],
    ) -> ApiResult<i64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status_code() {
        let err = ApiError::Status {
            code: 412,
            response: String::new(),
        };
        assert_eq!(err.status_code(), Some(412));
        assert_eq!(ApiError::NoNetwork.status_code(), None);
    }

    #[test]
    fn test_key_permissions_access_for() {
        let mut permissions = KeyPermissions {
            user_id: 1,
            username: "user".to_string(),
            user_access: LibraryAccess {
                can_edit_metadata: true,
                can_edit_files: true,
            },
            ..Default::default()
        };
        permissions.group_access.insert(
            5,
            LibraryAccess {
                can_edit_metadata: true,
                can_edit_files: false,
            },
        );
        permissions.default_group_access = Some(LibraryAccess::default());

        let user = permissions
            .access_for(&LibraryIdentifier::Custom)
            .expect("user access");
        assert!(user.can_edit_metadata);

        let known = permissions
            .access_for(&LibraryIdentifier::Group(5))
            .expect("group access");
        assert!(known.can_edit_metadata);
        assert!(!known.can_edit_files);

        // Unknown group falls back to the default access.
        let unknown = permissions
            .access_for(&LibraryIdentifier::Group(99))
            .expect("default access");
        assert!(!unknown.can_edit_metadata);
    }
}
