//! Sync Scheduler
//!
//! Serializes sync runs: at most one run is active at a time, queued
//! requests are deduplicated, engine-requested retries jump ahead of
//! ordinary requests and full syncs are rate limited. The scheduler is an
//! actor owning its queue; the public handle is a cheap clonable sender.
//!
//! ## Queue discipline
//!
//! - A full sync over all libraries supersedes everything already queued.
//! - Two queued requests with the same kind and library scope collapse
//!   into one.
//! - Retries are placed ahead of the first non-retry request and start
//!   after the per-attempt retry delay instead of the regular inter-sync
//!   delay.
//! - A full sync requested within the cooldown window of the previous one
//!   is downgraded to a normal sync; engine-requested retries bypass the
//!   cooldown.

use crate::controller::{SyncController, SyncReport};
use crate::push::PushUpdate;
use crate::types::{SyncKind, SyncRequest};
use async_trait::async_trait;
use bridge_traits::data::{Libraries, LibraryIdentifier};
use core_runtime::SyncTuning;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Executes one sync run. Abstracted so the scheduler can be tested
/// without a full controller.
#[async_trait]
pub trait SyncRunner: Send + Sync {
    async fn run(&self, request: SyncRequest, cancel: &CancellationToken) -> SyncReport;
}

#[async_trait]
impl SyncRunner for SyncController {
    async fn run(&self, request: SyncRequest, cancel: &CancellationToken) -> SyncReport {
        SyncController::run(self, request, cancel).await
    }
}

enum Command {
    Enqueue(SyncRequest),
    LibraryChanged(LibraryIdentifier),
    Cancel,
}

/// Handle to the scheduler actor. Dropping every handle shuts the actor
/// down once the current run finishes.
#[derive(Clone)]
pub struct SyncScheduler {
    tx: mpsc::UnboundedSender<Command>,
}

impl SyncScheduler {
    /// Spawn the scheduler actor onto the current runtime.
    pub fn spawn(runner: Arc<dyn SyncRunner>, tuning: SyncTuning) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(actor(runner, tuning, rx));
        (Self { tx }, handle)
    }

    /// Queue a sync over the given scope.
    pub fn request_sync(&self, kind: SyncKind, libraries: Libraries) {
        let _ = self.tx.send(Command::Enqueue(SyncRequest::new(kind, libraries)));
    }

    pub fn request(&self, request: SyncRequest) {
        let _ = self.tx.send(Command::Enqueue(request));
    }

    /// Queue a normal sync of one library in response to a remote change
    /// notification.
    pub fn notify_library_changed(&self, library_id: LibraryIdentifier) {
        let _ = self.tx.send(Command::LibraryChanged(library_id));
    }

    /// Cancel the active run and drop everything queued behind it.
    pub fn cancel(&self) {
        let _ = self.tx.send(Command::Cancel);
    }

    /// Forward push-channel updates into the queue until the channel
    /// closes. Translator updates are not the engine's to handle and are
    /// skipped.
    pub fn attach_push_updates(
        &self,
        mut updates: mpsc::UnboundedReceiver<PushUpdate>,
    ) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            while let Some(update) = updates.recv().await {
                if let PushUpdate::Library(library_id) = update {
                    scheduler.notify_library_changed(library_id);
                }
            }
        })
    }
}

struct ActorState {
    queue: VecDeque<SyncRequest>,
    last_full_sync: Option<Instant>,
}

impl ActorState {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            last_full_sync: None,
        }
    }

    fn enqueue(&mut self, request: SyncRequest) {
        if request.kind == SyncKind::Full && request.libraries == Libraries::All {
            // A full resync covers every queued request.
            self.queue.clear();
            self.queue.push_back(request);
            return;
        }
        let duplicate = self
            .queue
            .iter()
            .any(|queued| queued.kind == request.kind && queued.libraries == request.libraries);
        if duplicate {
            debug!(kind = %request.kind, "dropping duplicate sync request");
            return;
        }
        if request.is_retry() {
            let position = self
                .queue
                .iter()
                .position(|queued| !queued.is_retry())
                .unwrap_or(self.queue.len());
            self.queue.insert(position, request);
        } else {
            self.queue.push_back(request);
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Enqueue(request) => self.enqueue(request),
            Command::LibraryChanged(library_id) => {
                self.enqueue(SyncRequest::new(
                    SyncKind::Normal,
                    Libraries::Specific(vec![library_id]),
                ));
            }
            Command::Cancel => self.queue.clear(),
        }
    }

    /// Downgrade a non-retry full sync requested inside the cooldown
    /// window of the previous one. Downgraded, not dropped: the request
    /// still produces a run, just not a second full re-download within
    /// the window.
    fn apply_cooldown(&self, mut request: SyncRequest, cooldown: std::time::Duration) -> SyncRequest {
        if request.kind != SyncKind::Full || request.is_retry() {
            return request;
        }
        if let Some(last) = self.last_full_sync {
            if last.elapsed() < cooldown {
                info!("full sync within cooldown window, downgrading to normal");
                request.kind = SyncKind::Normal;
            }
        }
        request
    }
}

async fn actor(
    runner: Arc<dyn SyncRunner>,
    tuning: SyncTuning,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    let mut state = ActorState::new();

    'outer: loop {
        while state.queue.is_empty() {
            match rx.recv().await {
                Some(command) => state.apply(command),
                None => break 'outer,
            }
        }

        let Some(request) = state.queue.pop_front() else {
            continue;
        };
        let request = state.apply_cooldown(request, tuning.full_sync_cooldown);

        let delay = if request.is_retry() {
            tuning.retry_delay(request.retry_attempt)
        } else {
            tuning.inter_sync_delay
        };

        // Commands arriving during the start delay still apply; a cancel
        // drops this request too.
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        let mut abandoned = false;
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                command = rx.recv() => match command {
                    Some(Command::Cancel) => {
                        state.queue.clear();
                        abandoned = true;
                        break;
                    }
                    Some(command) => state.apply(command),
                    None => break 'outer,
                },
            }
        }
        if abandoned {
            continue;
        }

        if request.kind == SyncKind::Full && request.libraries == Libraries::All {
            state.last_full_sync = Some(Instant::now());
        }

        info!(kind = %request.kind, attempt = request.retry_attempt, "starting sync run");
        let cancel = CancellationToken::new();
        let run = runner.run(request, &cancel);
        tokio::pin!(run);
        let mut closed = false;
        let report = loop {
            tokio::select! {
                report = &mut run => break report,
                command = rx.recv(), if !closed => match command {
                    Some(Command::Cancel) => {
                        cancel.cancel();
                        state.queue.clear();
                    }
                    Some(command) => state.apply(command),
                    None => {
                        // All handles dropped; let the run finish, then exit.
                        closed = true;
                    }
                },
            }
        };

        handle_report(&mut state, report);
        if closed {
            break;
        }
    }
}

fn handle_report(state: &mut ActorState, report: SyncReport) {
    if let Some(fatal) = &report.fatal {
        warn!(error = %fatal, "sync run ended with a fatal error");
    }
    for error in &report.errors {
        warn!(%error, "sync finished with error");
    }
    if let Some(retry) = report.retry {
        debug!(attempt = retry.retry_attempt, "scheduling engine-requested retry");
        state.enqueue(retry);
    }
}
