//! Push Notification Channel
//!
//! Maintains the subscription to the backend's notification stream and
//! turns topic-update frames into per-library change signals. The channel
//! owns its connect/subscribe handshake and reconnect policy; the raw
//! duplex socket comes from the host's [`PushTransport`].
//!
//! ## Protocol
//!
//! Every frame is a JSON object with an `event` field. After connecting,
//! the server greets with `connected`; the channel then requests its
//! subscriptions and waits for `subscriptionsCreated`. From there the
//! server pushes `topicUpdated` frames carrying a topic path and the
//! library's new version. Updates whose version does not exceed the
//! locally stored one are dropped; they are echoes of our own writes.

use bridge_traits::data::LibraryIdentifier;
use bridge_traits::error::BridgeError;
use bridge_traits::push::{PushSocket, PushTransport};
use bridge_traits::store::LocalStore;
use core_runtime::events::PushEvent;
use core_runtime::{CoreConfig, CoreEvent, EventBus, SyncTuning};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const EVENT_CONNECTED: &str = "connected";
const EVENT_SUBSCRIPTIONS_CREATED: &str = "subscriptionsCreated";
const EVENT_TOPIC_UPDATED: &str = "topicUpdated";

const TOPIC_TRANSLATORS: &str = "/translators";

/// A change signal surfaced to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushUpdate {
    /// A library moved to a newer version than the local replica.
    Library(LibraryIdentifier),
    /// The shared translator bundle changed.
    Translators,
}

#[derive(Error, Debug)]
enum PushError {
    #[error(transparent)]
    Transport(#[from] BridgeError),

    #[error("server did not respond within the handshake timeout")]
    HandshakeTimeout,

    #[error("connection closed during handshake")]
    ClosedDuringHandshake,

    #[error("unexpected frame: {0}")]
    Protocol(String),
}

/// One incoming frame. Unknown events deserialize fine and are ignored.
#[derive(Debug, Deserialize)]
struct ServerFrame {
    event: String,
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    version: Option<i64>,
}

fn subscribe_frame() -> String {
    // The transport injects credentials; the subscription set is implied
    // by the authenticated key.
    serde_json::json!({
        "action": "createSubscriptions",
        "subscriptions": [{}],
    })
    .to_string()
}

fn unsubscribe_frame() -> String {
    serde_json::json!({
        "action": "deleteSubscriptions",
        "subscriptions": [{}],
    })
    .to_string()
}

/// How a healthy session ended.
enum SessionEnd {
    Closed,
    Cancelled,
}

pub struct PushChannel {
    user_id: i64,
    transport: Arc<dyn PushTransport>,
    store: Arc<dyn LocalStore>,
    tuning: SyncTuning,
    events: EventBus,
}

impl PushChannel {
    /// Returns `None` when the host did not provide a push transport.
    pub fn new(config: &CoreConfig, events: EventBus) -> Option<Self> {
        let transport = config.push_transport.clone()?;
        Some(Self {
            user_id: config.user_id,
            transport,
            store: config.store.clone(),
            tuning: config.tuning.clone(),
            events,
        })
    }

    /// Spawn the channel actor. It reconnects until `cancel` fires; change
    /// signals arrive on the returned receiver.
    pub fn spawn(
        self,
        cancel: CancellationToken,
    ) -> (mpsc::UnboundedReceiver<PushUpdate>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(self.run(tx, cancel));
        (rx, handle)
    }

    async fn run(self, tx: mpsc::UnboundedSender<PushUpdate>, cancel: CancellationToken) {
        let mut consecutive_failures: usize = 0;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            let delay = match self.session(&tx, &cancel).await {
                Ok(SessionEnd::Cancelled) => break,
                Ok(SessionEnd::Closed) => {
                    // The server dropped a healthy session; give it a short
                    // grace period rather than the failure backoff.
                    consecutive_failures = 0;
                    debug!("push connection closed, reconnecting after grace period");
                    self.tuning.push_disconnection_grace
                }
                Err(error) => {
                    warn!(%error, failures = consecutive_failures, "push connection failed");
                    let delay = self.tuning.reconnect_delay(consecutive_failures);
                    consecutive_failures += 1;
                    delay
                }
            };

            self.emit(PushEvent::Disconnected { will_retry: true });
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.emit(PushEvent::Disconnected { will_retry: false });
    }

    /// One connection lifetime: handshake, subscribe, then pump frames
    /// until the connection drops or the channel is cancelled.
    async fn session(
        &self,
        tx: &mpsc::UnboundedSender<PushUpdate>,
        cancel: &CancellationToken,
    ) -> Result<SessionEnd, PushError> {
        let mut socket = self.transport.connect().await?;

        self.expect_event(socket.as_mut(), EVENT_CONNECTED).await?;
        socket.send(subscribe_frame()).await?;
        self.expect_event(socket.as_mut(), EVENT_SUBSCRIPTIONS_CREATED)
            .await?;

        info!("push channel subscribed");
        self.emit(PushEvent::Connected);

        loop {
            let frame = tokio::select! {
                _ = cancel.cancelled() => {
                    self.teardown(socket.as_mut()).await;
                    return Ok(SessionEnd::Cancelled);
                }
                frame = socket.next() => frame,
            };
            let Some(text) = frame else {
                return Ok(SessionEnd::Closed);
            };
            self.handle_frame(&text, tx).await;
        }
    }

    /// Unsubscribe before closing, waiting briefly for the server to
    /// acknowledge so it stops pushing to a dead connection.
    async fn teardown(&self, socket: &mut dyn PushSocket) {
        if socket.send(unsubscribe_frame()).await.is_ok() {
            let _ = timeout(self.tuning.push_completion_timeout, socket.next()).await;
        }
        socket.close().await;
    }

    /// Wait for the next frame and require the given event, skipping
    /// nothing: the handshake is strictly ordered.
    async fn expect_event(
        &self,
        socket: &mut dyn PushSocket,
        expected: &str,
    ) -> Result<(), PushError> {
        let frame = timeout(self.tuning.push_response_timeout, socket.next())
            .await
            .map_err(|_| PushError::HandshakeTimeout)?
            .ok_or(PushError::ClosedDuringHandshake)?;
        let parsed: ServerFrame = serde_json::from_str(&frame)
            .map_err(|e| PushError::Protocol(format!("unparsable frame: {}", e)))?;
        if parsed.event != expected {
            return Err(PushError::Protocol(format!(
                "expected {} but received {}",
                expected, parsed.event
            )));
        }
        Ok(())
    }

    async fn handle_frame(&self, text: &str, tx: &mpsc::UnboundedSender<PushUpdate>) {
        let frame: ServerFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(error) => {
                debug!(%error, "ignoring unparsable push frame");
                return;
            }
        };
        if frame.event != EVENT_TOPIC_UPDATED {
            return;
        }
        let Some(topic) = frame.topic.as_deref() else {
            return;
        };

        if topic == TOPIC_TRANSLATORS {
            let _ = tx.send(PushUpdate::Translators);
            return;
        }

        let Some(library_id) = self.parse_library_topic(topic) else {
            debug!(topic, "ignoring update for unknown topic");
            return;
        };
        let Some(version) = frame.version else {
            return;
        };

        // Updates at or below the local version are echoes of changes we
        // already have.
        match self.store.library_version(library_id).await {
            Ok(local) if local >= version => {
                debug!(library = %library_id, version, local, "push update already covered");
            }
            Ok(_) => {
                self.emit(PushEvent::ChangeNotified {
                    library: library_id.to_string(),
                    version,
                });
                let _ = tx.send(PushUpdate::Library(library_id));
            }
            Err(error) => {
                // Cannot verify; let the sync run sort it out.
                warn!(%error, "could not read local library version");
                let _ = tx.send(PushUpdate::Library(library_id));
            }
        }
    }

    /// `/users/{id}` is the personal library, `/groups/{id}` a group.
    /// Updates for other users' topics are not ours to act on.
    fn parse_library_topic(&self, topic: &str) -> Option<LibraryIdentifier> {
        if let Some(id) = topic.strip_prefix("/users/") {
            let id: i64 = id.parse().ok()?;
            return (id == self.user_id).then_some(LibraryIdentifier::Custom);
        }
        if let Some(id) = topic.strip_prefix("/groups/") {
            return id.parse().ok().map(LibraryIdentifier::Group);
        }
        None
    }

    fn emit(&self, event: PushEvent) {
        let _ = self.events.emit(CoreEvent::Push(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::api::{
        ApiResult, DeletionsResponse, KeyPermissions, ObjectsResponse, SettingsResponse,
        VersionsResponse, WriteResponse,
    };
    use bridge_traits::api::ApiClient;
    use bridge_traits::data::{
        AttachmentUpload, DeleteBatch, Libraries, LibraryData, SyncObject, VersionTarget,
        WriteBatch,
    };
    use bridge_traits::store::{DeletionsToApply, GroupVersionDiff, StoreObjectsResult};
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    struct ScriptSocket {
        incoming: mpsc::UnboundedReceiver<String>,
        sent: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl PushSocket for ScriptSocket {
        async fn send(&mut self, text: String) -> bridge_traits::error::Result<()> {
            self.sent
                .send(text)
                .map_err(|_| BridgeError::OperationFailed("peer gone".to_string()))
        }

        async fn next(&mut self) -> Option<String> {
            self.incoming.recv().await
        }

        async fn close(&mut self) {}
    }

    struct ScriptTransport {
        sockets: StdMutex<Vec<ScriptSocket>>,
        connect_count: StdMutex<usize>,
    }

    impl ScriptTransport {
        fn new(sockets: Vec<ScriptSocket>) -> Self {
            Self {
                sockets: StdMutex::new(sockets),
                connect_count: StdMutex::new(0),
            }
        }
    }

    #[async_trait]
    impl PushTransport for ScriptTransport {
        async fn connect(&self) -> bridge_traits::error::Result<Box<dyn PushSocket>> {
            *self.connect_count.lock().unwrap() += 1;
            let mut sockets = self.sockets.lock().unwrap();
            if sockets.is_empty() {
                return Err(BridgeError::NotAvailable("no more connections".to_string()));
            }
            Ok(Box::new(sockets.remove(0)))
        }
    }

    /// Store stub whose only meaningful method is the version lookup.
    struct VersionStore {
        versions: HashMap<LibraryIdentifier, i64>,
    }

    #[async_trait]
    impl LocalStore for VersionStore {
        async fn load_library_data(
            &self,
            _libraries: Libraries,
            _fetch_updates: bool,
            _load_versions: bool,
            _web_dav_enabled: bool,
        ) -> bridge_traits::error::Result<Vec<LibraryData>> {
            Ok(Vec::new())
        }
        async fn store_objects(
            &self,
            _library_id: LibraryIdentifier,
            _object: SyncObject,
            _objects: &[serde_json::Value],
            _version: i64,
        ) -> bridge_traits::error::Result<StoreObjectsResult> {
            Ok(StoreObjectsResult::default())
        }
        async fn sync_versions(
            &self,
            _library_id: LibraryIdentifier,
            _object: SyncObject,
            _remote_versions: &HashMap<String, i64>,
            _full: bool,
        ) -> bridge_traits::error::Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn store_version(
            &self,
            _library_id: LibraryIdentifier,
            _target: VersionTarget,
            _version: i64,
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn store_settings(
            &self,
            _library_id: LibraryIdentifier,
            _settings: &serde_json::Value,
            _version: i64,
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn perform_deletions(
            &self,
            _library_id: LibraryIdentifier,
            _deletions: &DeletionsToApply,
            _version: Option<i64>,
        ) -> bridge_traits::error::Result<Vec<(String, String)>> {
            Ok(Vec::new())
        }
        async fn restore_deletions(
            &self,
            _library_id: LibraryIdentifier,
            _collections: &[String],
            _items: &[String],
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn group_version_diff(
            &self,
            _remote_versions: &HashMap<i64, i64>,
        ) -> bridge_traits::error::Result<GroupVersionDiff> {
            Ok(GroupVersionDiff::default())
        }
        async fn store_group(
            &self,
            _group: &serde_json::Value,
            _version: i64,
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn delete_group(&self, _group_id: i64) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn mark_group_as_local_only(
            &self,
            _group_id: i64,
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn revert_library_to_original(
            &self,
            _library_id: LibraryIdentifier,
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn revert_library_files_to_original(
            &self,
            _library_id: LibraryIdentifier,
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn mark_changes_as_resolved(
            &self,
            _library_id: LibraryIdentifier,
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn mark_submitted(
            &self,
            _batch: &WriteBatch,
            _successful_keys: &[String],
            _version: i64,
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn mark_deleted(
            &self,
            _batch: &DeleteBatch,
            _version: i64,
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn pending_uploads(
            &self,
            _library_id: LibraryIdentifier,
        ) -> bridge_traits::error::Result<Vec<AttachmentUpload>> {
            Ok(Vec::new())
        }
        async fn mark_attachment_uploaded(
            &self,
            _library_id: LibraryIdentifier,
            _key: String,
            _version: Option<i64>,
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn mark_attachment_item_for_submission(
            &self,
            _library_id: LibraryIdentifier,
            _key: String,
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn mark_for_resync(
            &self,
            _library_id: LibraryIdentifier,
            _object: SyncObject,
            _keys: &[String],
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn pending_web_dav_deletions(
            &self,
            _library_id: LibraryIdentifier,
        ) -> bridge_traits::error::Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn clear_web_dav_deletions(
            &self,
            _library_id: LibraryIdentifier,
            _keys: &[String],
        ) -> bridge_traits::error::Result<()> {
            Ok(())
        }
        async fn library_version(
            &self,
            library_id: LibraryIdentifier,
        ) -> bridge_traits::error::Result<i64> {
            Ok(self.versions.get(&library_id).copied().unwrap_or(0))
        }
        async fn invalidate(&self) -> bridge_traits::error::Result<()> {
            Ok(())
        }
    }

    struct NullApi;

    #[async_trait]
    impl ApiClient for NullApi {
        async fn fetch_key_permissions(&self) -> ApiResult<KeyPermissions> {
            Ok(KeyPermissions::default())
        }
        async fn fetch_group_versions(&self, _user_id: i64) -> ApiResult<HashMap<i64, i64>> {
            Ok(HashMap::new())
        }
        async fn fetch_group(&self, _group_id: i64) -> ApiResult<ObjectsResponse> {
            Ok(ObjectsResponse {
                objects: Vec::new(),
                last_modified_version: 0,
            })
        }
        async fn fetch_versions(
            &self,
            _library_id: LibraryIdentifier,
            _object: SyncObject,
            _since: Option<i64>,
        ) -> ApiResult<VersionsResponse> {
            Ok(VersionsResponse {
                versions: HashMap::new(),
                last_modified_version: 0,
            })
        }
        async fn fetch_objects(
            &self,
            _library_id: LibraryIdentifier,
            _object: SyncObject,
            _keys: &[String],
        ) -> ApiResult<ObjectsResponse> {
            Ok(ObjectsResponse {
                objects: Vec::new(),
                last_modified_version: 0,
            })
        }
        async fn fetch_settings(
            &self,
            _library_id: LibraryIdentifier,
            _since: i64,
        ) -> ApiResult<SettingsResponse> {
            Ok(SettingsResponse {
                settings: serde_json::Value::Null,
                last_modified_version: 0,
            })
        }
        async fn fetch_deletions(
            &self,
            _library_id: LibraryIdentifier,
            _since: i64,
        ) -> ApiResult<DeletionsResponse> {
            Ok(DeletionsResponse::default())
        }
        async fn submit_write_batch(
            &self,
            _library_id: LibraryIdentifier,
            _object: SyncObject,
            _version: i64,
            _parameters: &[serde_json::Value],
        ) -> ApiResult<WriteResponse> {
            Ok(WriteResponse {
                successful_keys: Vec::new(),
                failed: Vec::new(),
                last_modified_version: 0,
            })
        }
        async fn submit_delete_batch(
            &self,
            _library_id: LibraryIdentifier,
            _object: SyncObject,
            _version: i64,
            _keys: &[String],
        ) -> ApiResult<i64> {
            Ok(0)
        }
    }

    fn frame(event: &str) -> String {
        serde_json::json!({"event": event}).to_string()
    }

    fn update_frame(topic: &str, version: i64) -> String {
        serde_json::json!({"event": "topicUpdated", "topic": topic, "version": version})
            .to_string()
    }

    struct Session {
        to_server: mpsc::UnboundedSender<String>,
        from_client: mpsc::UnboundedReceiver<String>,
        socket: Option<ScriptSocket>,
    }

    fn session() -> Session {
        let (to_server, incoming) = mpsc::unbounded_channel();
        let (sent, from_client) = mpsc::unbounded_channel();
        Session {
            to_server,
            from_client,
            socket: Some(ScriptSocket { incoming, sent }),
        }
    }

    fn channel(
        sockets: Vec<ScriptSocket>,
        versions: HashMap<LibraryIdentifier, i64>,
    ) -> (PushChannel, Arc<ScriptTransport>) {
        let transport = Arc::new(ScriptTransport::new(sockets));
        let mut tuning = SyncTuning::default();
        tuning.push_reconnect_delays = vec![Duration::from_millis(10)];
        tuning.push_disconnection_grace = Duration::from_millis(10);
        let config = CoreConfig::builder()
            .user_id(42)
            .api_client(Arc::new(NullApi))
            .store(Arc::new(VersionStore { versions }))
            .push_transport(transport.clone())
            .tuning(tuning)
            .build()
            .unwrap();
        let channel = PushChannel::new(&config, EventBus::default()).unwrap();
        (channel, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_then_updates_flow_through() {
        let mut session = session();
        let (channel, _) = channel(
            vec![session.socket.take().unwrap()],
            HashMap::from([(LibraryIdentifier::Group(9), 5)]),
        );

        let cancel = CancellationToken::new();
        let (mut updates, handle) = channel.spawn(cancel.clone());

        session.to_server.send(frame("connected")).unwrap();
        // The client must request subscriptions before updates flow.
        let subscribe = session.from_client.recv().await.unwrap();
        assert!(subscribe.contains("createSubscriptions"));
        session.to_server.send(frame("subscriptionsCreated")).unwrap();

        session
            .to_server
            .send(update_frame("/groups/9", 8))
            .unwrap();
        session.to_server.send(update_frame("/users/42", 3)).unwrap();
        session
            .to_server
            .send(update_frame("/translators", 1))
            .unwrap();

        assert_eq!(
            updates.recv().await,
            Some(PushUpdate::Library(LibraryIdentifier::Group(9)))
        );
        assert_eq!(
            updates.recv().await,
            Some(PushUpdate::Library(LibraryIdentifier::Custom))
        );
        assert_eq!(updates.recv().await, Some(PushUpdate::Translators));

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_updates_are_filtered() {
        let library = LibraryIdentifier::Group(9);
        let mut session = session();
        let (channel, _) = channel(
            vec![session.socket.take().unwrap()],
            HashMap::from([(library, 10)]),
        );

        let cancel = CancellationToken::new();
        let (mut updates, handle) = channel.spawn(cancel.clone());

        session.to_server.send(frame("connected")).unwrap();
        let _ = session.from_client.recv().await.unwrap();
        session.to_server.send(frame("subscriptionsCreated")).unwrap();

        // At and below the local version: both are echoes.
        session.to_server.send(update_frame("/groups/9", 10)).unwrap();
        session.to_server.send(update_frame("/groups/9", 7)).unwrap();
        // Newer: must come through.
        session.to_server.send(update_frame("/groups/9", 11)).unwrap();

        assert_eq!(updates.recv().await, Some(PushUpdate::Library(library)));
        assert!(updates.try_recv().is_err());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_user_topics_are_ignored() {
        let mut session = session();
        let (channel, _) = channel(vec![session.socket.take().unwrap()], HashMap::new());

        let cancel = CancellationToken::new();
        let (mut updates, handle) = channel.spawn(cancel.clone());

        session.to_server.send(frame("connected")).unwrap();
        let _ = session.from_client.recv().await.unwrap();
        session.to_server.send(frame("subscriptionsCreated")).unwrap();

        session.to_server.send(update_frame("/users/777", 5)).unwrap();
        session.to_server.send(update_frame("/users/42", 5)).unwrap();

        // Only our own user topic produced an update.
        assert_eq!(
            updates.recv().await,
            Some(PushUpdate::Library(LibraryIdentifier::Custom))
        );
        assert!(updates.try_recv().is_err());

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_connection_closes() {
        let mut first = session();
        let mut second = session();
        let (channel, transport) = channel(
            vec![first.socket.take().unwrap(), second.socket.take().unwrap()],
            HashMap::new(),
        );

        let cancel = CancellationToken::new();
        let (mut updates, handle) = channel.spawn(cancel.clone());

        first.to_server.send(frame("connected")).unwrap();
        let _ = first.from_client.recv().await.unwrap();
        first.to_server.send(frame("subscriptionsCreated")).unwrap();
        // Server drops the connection.
        drop(first.to_server);

        // The channel reconnects onto the second scripted socket.
        second.to_server.send(frame("connected")).unwrap();
        let _ = second.from_client.recv().await.unwrap();
        second.to_server.send(frame("subscriptionsCreated")).unwrap();
        second.to_server.send(update_frame("/users/42", 2)).unwrap();

        assert_eq!(
            updates.recv().await,
            Some(PushUpdate::Library(LibraryIdentifier::Custom))
        );
        assert_eq!(*transport.connect_count.lock().unwrap(), 2);

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_reconnect_attempts() {
        // Transport with no sockets fails every connect.
        let (channel, transport) = channel(Vec::new(), HashMap::new());

        let cancel = CancellationToken::new();
        let (_updates, handle) = channel.spawn(cancel.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        let connects_before_cancel = *transport.connect_count.lock().unwrap();
        assert!(connects_before_cancel >= 1);

        cancel.cancel();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(*transport.connect_count.lock().unwrap(), connects_before_cancel);
    }
}
