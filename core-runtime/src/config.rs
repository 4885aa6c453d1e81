//! # Core Configuration Module
//!
//! Configuration for the sync engine.
//!
//! ## Overview
//!
//! `CoreConfig` is built through a builder that holds all bridge
//! implementations and settings the engine needs, with fail-fast validation:
//! required collaborators must be provided before initialization.
//!
//! ## Required Dependencies
//!
//! - `ApiClient` - remote API transport
//! - `LocalStore` - transactional local replica
//!
//! ## Optional Dependencies
//!
//! - `PushTransport` - server-initiated change notifications
//! - `AttachmentUploader` - attachment file uploads
//! - `WebDavClient` - WebDAV file deletions (requires `web_dav_enabled`)
//! - `NetworkMonitor` - connectivity short-circuit
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .user_id(12345)
//!     .api_client(Arc::new(MyApiClient::new()))
//!     .store(Arc::new(MyStore::new()))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    ApiClient, AttachmentUploader, LocalStore, NetworkMonitor, PushTransport, WebDavClient,
};
use std::sync::Arc;
use std::time::Duration;

/// Product-tuned timing constants for the sync engine.
///
/// These are configuration, not protocol: tests substitute short values and
/// hosts may tune them. Defaults match the shipped application behavior.
#[derive(Debug, Clone)]
pub struct SyncTuning {
    /// Delay before starting the next queued sync after a clean finish.
    pub inter_sync_delay: Duration,
    /// Per-attempt delays for engine-requested retries, indexed by retry
    /// attempt (attempt counts past the table reuse the last entry).
    pub sync_retry_delays: Vec<Duration>,
    /// Minimum spacing between two full syncs over all libraries.
    pub full_sync_cooldown: Duration,
    /// How long to wait for the server to acknowledge a push-channel
    /// connect or subscribe message.
    pub push_response_timeout: Duration,
    /// Upper bound on a connect caller waiting for the connected callback.
    pub push_completion_timeout: Duration,
    /// Grace period after an unplanned close before reconnecting.
    pub push_disconnection_grace: Duration,
    /// Reconnect delays indexed by consecutive push-channel failures.
    pub push_reconnect_delays: Vec<Duration>,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            inter_sync_delay: Duration::from_secs(3),
            sync_retry_delays: [0, 10, 20, 40, 60, 120, 240, 300]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
            full_sync_cooldown: Duration::from_secs(60 * 60),
            push_response_timeout: Duration::from_secs(30),
            push_completion_timeout: Duration::from_millis(1500),
            push_disconnection_grace: Duration::from_secs(5),
            push_reconnect_delays: [
                2, 5, 10, 15, 30, 60, 60, 60, 60, 120, 120, 120, 120, 300, 300, 600, 1200, 1800,
                1800, 3600, 3600, 3600, 14400, 14400, 14400, 86400,
            ]
            .into_iter()
            .map(Duration::from_secs)
            .collect(),
        }
    }
}

impl SyncTuning {
    /// Retry delay for the given attempt, clamped to the table.
    pub fn retry_delay(&self, attempt: usize) -> Duration {
        match self.sync_retry_delays.last() {
            Some(last) => *self
                .sync_retry_delays
                .get(attempt)
                .unwrap_or(last),
            None => Duration::ZERO,
        }
    }

    /// Push reconnect delay for the given consecutive-failure count.
    pub fn reconnect_delay(&self, failures: usize) -> Duration {
        match self.push_reconnect_delays.last() {
            Some(last) => *self
                .push_reconnect_delays
                .get(failures)
                .unwrap_or(last),
            None => Duration::ZERO,
        }
    }
}

/// Configuration for the sync engine.
///
/// Use [`CoreConfig::builder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Backend user id of the signed-in account.
    pub user_id: i64,
    /// Remote API transport (required).
    pub api_client: Arc<dyn ApiClient>,
    /// Transactional local replica (required).
    pub store: Arc<dyn LocalStore>,
    /// Push-notification transport (optional).
    pub push_transport: Option<Arc<dyn PushTransport>>,
    /// Attachment upload transport (optional).
    pub attachment_uploader: Option<Arc<dyn AttachmentUploader>>,
    /// WebDAV file storage client (optional).
    pub web_dav_client: Option<Arc<dyn WebDavClient>>,
    /// Connectivity monitor (optional).
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,
    /// Whether attachments live on the user's WebDAV storage.
    pub web_dav_enabled: bool,
    /// Timing constants.
    pub tuning: SyncTuning,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("user_id", &self.user_id)
            .field("api_client", &"ApiClient { ... }")
            .field("store", &"LocalStore { ... }")
            .field(
                "push_transport",
                &self.push_transport.as_ref().map(|_| "PushTransport { ... }"),
            )
            .field(
                "attachment_uploader",
                &self
                    .attachment_uploader
                    .as_ref()
                    .map(|_| "AttachmentUploader { ... }"),
            )
            .field(
                "web_dav_client",
                &self.web_dav_client.as_ref().map(|_| "WebDavClient { ... }"),
            )
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field("web_dav_enabled", &self.web_dav_enabled)
            .field("tuning", &self.tuning)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.user_id <= 0 {
            return Err(Error::Config(
                "User id must be a positive backend id".to_string(),
            ));
        }

        if self.web_dav_enabled && self.web_dav_client.is_none() {
            return Err(Error::Config(
                "WebDAV enabled but no WebDavClient provided. \
                 Disable WebDAV or inject a WebDavClient implementation."
                    .to_string(),
            ));
        }

        if self.tuning.sync_retry_delays.is_empty() {
            return Err(Error::Config(
                "Sync retry delay table cannot be empty".to_string(),
            ));
        }

        if self.tuning.push_reconnect_delays.is_empty() {
            return Err(Error::Config(
                "Push reconnect delay table cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    user_id: Option<i64>,
    api_client: Option<Arc<dyn ApiClient>>,
    store: Option<Arc<dyn LocalStore>>,
    push_transport: Option<Arc<dyn PushTransport>>,
    attachment_uploader: Option<Arc<dyn AttachmentUploader>>,
    web_dav_client: Option<Arc<dyn WebDavClient>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    web_dav_enabled: bool,
    tuning: Option<SyncTuning>,
}

impl CoreConfigBuilder {
    /// Sets the backend user id (required).
    pub fn user_id(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Sets the remote API client (required).
    pub fn api_client(mut self, client: Arc<dyn ApiClient>) -> Self {
        self.api_client = Some(client);
        self
    }

    /// Sets the local store (required).
    pub fn store(mut self, store: Arc<dyn LocalStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the push transport (optional).
    pub fn push_transport(mut self, transport: Arc<dyn PushTransport>) -> Self {
        self.push_transport = Some(transport);
        self
    }

    /// Sets the attachment uploader (optional).
    pub fn attachment_uploader(mut self, uploader: Arc<dyn AttachmentUploader>) -> Self {
        self.attachment_uploader = Some(uploader);
        self
    }

    /// Sets the WebDAV client (optional, required when WebDAV is enabled).
    pub fn web_dav_client(mut self, client: Arc<dyn WebDavClient>) -> Self {
        self.web_dav_client = Some(client);
        self
    }

    /// Sets the network monitor (optional).
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Enables or disables WebDAV attachment storage.
    ///
    /// Default: false
    pub fn web_dav_enabled(mut self, enabled: bool) -> Self {
        self.web_dav_enabled = enabled;
        self
    }

    /// Overrides the timing constants.
    pub fn tuning(mut self, tuning: SyncTuning) -> Self {
        self.tuning = Some(tuning);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// Returns an error with an actionable message when a required
    /// collaborator is missing or a setting is invalid.
    pub fn build(self) -> Result<CoreConfig> {
        let user_id = self.user_id.ok_or_else(|| {
            Error::Config("User id is required. Use .user_id() to set it.".to_string())
        })?;

        let api_client = self.api_client.ok_or_else(|| Error::CapabilityMissing {
            capability: "ApiClient".to_string(),
            message: "ApiClient implementation is required for all remote operations. \
                      Inject the platform HTTP-backed client."
                .to_string(),
        })?;

        let store = self.store.ok_or_else(|| Error::CapabilityMissing {
            capability: "LocalStore".to_string(),
            message: "LocalStore implementation is required for the local replica. \
                      Inject the platform database-backed store."
                .to_string(),
        })?;

        let config = CoreConfig {
            user_id,
            api_client,
            store,
            push_transport: self.push_transport,
            attachment_uploader: self.attachment_uploader,
            web_dav_client: self.web_dav_client,
            network_monitor: self.network_monitor,
            web_dav_enabled: self.web_dav_enabled,
            tuning: self.tuning.unwrap_or_default(),
        };

        config.validate()?;

        Ok(config)
    }
}
