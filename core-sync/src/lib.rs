//! # Sync Engine
//!
//! Keeps the local replica and the remote backend converged for every
//! library the signed-in user can reach.
//!
//! ## Overview
//!
//! A sync run is planned as an ordered queue of actions:
//! - Validating key permissions and group memberships
//! - Submitting local writes, deletions, and attachment uploads
//! - Downloading changed objects in version-checked batches
//! - Applying remote deletions and library settings
//! - Handing irreconcilable states to the host as conflicts
//!
//! ## Components
//!
//! - **Scheduler** (`scheduler`): Serializes sync requests with debouncing, dedup, and retry pacing
//! - **Controller** (`controller`): Executes one run's action queue and classifies failures
//! - **Planner** (`planner`): Expands per-library state into the action sequence for a run
//! - **Batch Downloader** (`batch`): Fetches and stores changed objects in bounded batches
//! - **Push Channel** (`push`): Long-lived notification stream that triggers targeted syncs

pub mod actions;
pub mod batch;
pub mod conflict;
pub mod controller;
pub mod error;
pub mod planner;
pub mod push;
pub mod queue;
pub mod scheduler;
pub mod types;

pub use actions::Action;
pub use batch::{BatchDownloadResult, BatchProcessor};
pub use conflict::{Conflict, ConflictResolution};
pub use controller::{SyncController, SyncReport};
pub use error::{Fatal, NonFatal, SyncError};
pub use push::{PushChannel, PushUpdate};
pub use queue::ActionQueue;
pub use scheduler::{SyncRunner, SyncScheduler};
pub use types::{DownloadBatch, SyncKind, SyncRequest};
