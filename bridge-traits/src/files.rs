//! Attachment & WebDAV Transports
//!
//! File-transfer collaborators. The engine never touches file contents or
//! storage endpoints itself; it hands an [`AttachmentUpload`] to the
//! uploader and interprets the normalized failure, and asks the WebDAV
//! client to delete files for locally removed attachments.

use crate::api::ApiError;
use crate::data::{AttachmentUpload, LibraryIdentifier};
use async_trait::async_trait;

/// Outcome of a completed upload registration.
#[derive(Debug, Clone, Default)]
pub struct UploadOutcome {
    /// New library version reported by the backend, when the registration
    /// bumped it.
    pub new_version: Option<i64>,
    /// The backend already had this file; no transfer happened.
    pub already_uploaded: bool,
}

/// Uploads attachment files: authorization, transfer and registration are
/// implementation details. Authorization failures are surfaced as
/// `ApiError::Status` so the engine can map them (403, 404, 412, 413).
#[async_trait]
pub trait AttachmentUploader: Send + Sync {
    async fn upload(
        &self,
        upload: &AttachmentUpload,
    ) -> std::result::Result<UploadOutcome, ApiError>;
}

/// Deletes files from the user's WebDAV storage.
#[async_trait]
pub trait WebDavClient: Send + Sync {
    /// Delete the files backing the given attachment keys. Returns the keys
    /// that could not be deleted.
    async fn delete_files(
        &self,
        library_id: LibraryIdentifier,
        keys: &[String],
    ) -> std::result::Result<Vec<String>, ApiError>;
}
