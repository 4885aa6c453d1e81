//! # Host Bridge Traits
//!
//! Collaborator interfaces that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the sync engine and everything it
//! treats as external: the remote API transport, the transactional local
//! store, the push-notification socket, file transfers and connectivity
//! detection. The engine only ever sees these traits, so platforms swap in
//! their own HTTP stack, database and socket implementation without touching
//! engine code.
//!
//! ## Traits
//!
//! - [`ApiClient`](api::ApiClient) - Typed remote API endpoints with
//!   normalized status errors
//! - [`LocalStore`](store::LocalStore) - Transactional local replica
//!   (perform-style atomic operations)
//! - [`PushTransport`](push::PushTransport) / [`PushSocket`](push::PushSocket) -
//!   Duplex text channel for server-initiated change notifications
//! - [`AttachmentUploader`](files::AttachmentUploader) - Attachment file upload
//! - [`WebDavClient`](files::WebDavClient) - WebDAV file deletion
//! - [`NetworkMonitor`](network::NetworkMonitor) - Connectivity detection
//!
//! ## Error Handling
//!
//! Store and transport traits use [`BridgeError`](error::BridgeError);
//! network-facing traits use [`ApiError`](api::ApiError), which preserves the
//! HTTP status code so the engine can classify failures into its fatal /
//! non-fatal taxonomy.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds (sockets only `Send`, as
//! each is owned by a single task) to support safe concurrent usage across
//! async tasks.

pub mod api;
pub mod data;
pub mod error;
pub mod files;
pub mod network;
pub mod push;
pub mod store;

pub use error::BridgeError;

// Re-export commonly used types
pub use api::{
    ApiClient, ApiError, ApiResult, DeletionsResponse, KeyPermissions, LibraryAccess,
    ObjectsResponse, SettingsResponse, VersionsResponse, WriteFailure, WriteResponse,
};
pub use data::{
    AttachmentUpload, DeleteBatch, Libraries, LibraryData, LibraryIdentifier, SyncObject,
    VersionTarget, Versions, WriteBatch, MAX_BATCH_SIZE,
};
pub use files::{AttachmentUploader, UploadOutcome, WebDavClient};
pub use network::{NetworkMonitor, NetworkStatus};
pub use push::{PushSocket, PushTransport};
pub use store::{DeletionsToApply, GroupVersionDiff, LocalStore, StoreObjectsResult};
