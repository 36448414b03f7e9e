//! The sync engine: one driver task that owns all state.
//!
//! Fetches run as futures multiplexed inside the driver task, so every
//! completion is applied between two await points with no locking. The
//! presentation layer only ever sees immutable [`BundleSnapshot`]s, through a
//! `watch` channel or the [`SyncObserver`] hooks.
//!
//! Each fetch is tagged with the [`Generation`] it was issued under. Changing
//! the bundle bumps the generation; completions carrying an older tag only
//! release their guard and are otherwise dropped.

use std::sync::Arc;

use bundlesync_protocol::JsonApiDocument;
use futures::FutureExt;
use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::BundleBackend;
use crate::BundleId;
use crate::Generation;
use crate::config::SyncConfig;
use crate::content::ContentsOutcome;
use crate::content::apply_contents_outcome;
use crate::content::fetch_contents;
use crate::errors::BackendError;
use crate::errors::ErrorRecord;
use crate::errors::SyncError;
use crate::guard::FetchKind;
use crate::normalize::normalize_bundle;
use crate::scheduler::Cadence;
use crate::scheduler::PollingScheduler;
use crate::snapshot::BundleSnapshot;

/// Hooks for the embedding context. Both default to doing nothing.
pub trait SyncObserver: Send + Sync {
    /// Called with every published snapshot.
    fn on_snapshot(&self, _snapshot: &BundleSnapshot) {}

    /// Called on the keepalive timer, whatever the bundle is doing.
    fn on_keepalive(&self) {}
}

/// Presentation layer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl SyncObserver for NoopObserver {}

/// The engine's driver task has exited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("sync engine has stopped")]
pub struct EngineStopped;

#[derive(Debug)]
enum Command {
    SetBundle(BundleId),
    ClearBundle,
    Refresh(FetchKind),
}

#[derive(Debug)]
enum FetchResult {
    Metadata(Result<JsonApiDocument, BackendError>),
    Contents(ContentsOutcome),
}

impl FetchResult {
    fn kind(&self) -> FetchKind {
        match self {
            Self::Metadata(_) => FetchKind::Metadata,
            Self::Contents(_) => FetchKind::Contents,
        }
    }
}

#[derive(Debug)]
struct Completion {
    generation: Generation,
    bundle_id: BundleId,
    result: FetchResult,
}

/// Builder for a running engine.
pub struct SyncEngine {
    backend: Arc<dyn BundleBackend>,
    config: SyncConfig,
    observer: Arc<dyn SyncObserver>,
}

impl SyncEngine {
    pub fn new(backend: Arc<dyn BundleBackend>, config: SyncConfig) -> Self {
        Self {
            backend,
            config,
            observer: Arc::new(NoopObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Start the driver task on the current tokio runtime. The keepalive
    /// timer starts now; polling starts with the first [`EngineHandle::set_bundle`].
    pub fn spawn(self) -> EngineHandle {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (snapshots_tx, snapshots_rx) = watch::channel(Arc::new(BundleSnapshot::default()));
        let cancel = CancellationToken::new();

        let driver = Driver {
            scheduler: PollingScheduler::new(
                self.config.poll_interval(),
                self.config.final_contents_fetch,
            ),
            backend: self.backend,
            config: self.config,
            observer: self.observer,
            bundle: None,
            generation: Generation::default(),
            snapshot: BundleSnapshot::default(),
            publisher: snapshots_tx,
            pending: FuturesUnordered::new(),
        };

        let task = tokio::spawn(
            driver
                .run(commands_rx, cancel.clone())
                .instrument(tracing::info_span!("bundle_sync")),
        );

        EngineHandle {
            commands: commands_tx,
            snapshots: snapshots_rx,
            cancel,
            task,
        }
    }
}

/// Control surface of a running engine. Dropping it stops the engine.
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<Arc<BundleSnapshot>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// Synchronize `bundle_id` from now on. Setting the bundle already being
    /// synchronized is a no-op.
    pub fn set_bundle(&self, bundle_id: impl Into<BundleId>) -> Result<(), EngineStopped> {
        self.send(Command::SetBundle(bundle_id.into()))
    }

    /// Stop synchronizing; the snapshot goes back to empty.
    pub fn clear_bundle(&self) -> Result<(), EngineStopped> {
        self.send(Command::ClearBundle)
    }

    /// Revalidate metadata now, e.g. after the embedding context edited it.
    /// Skipped if a metadata fetch is already out.
    pub fn refresh_metadata(&self) -> Result<(), EngineStopped> {
        self.send(Command::Refresh(FetchKind::Metadata))
    }

    /// Revalidate contents now. Skipped if a contents fetch is already out.
    pub fn refresh_contents(&self) -> Result<(), EngineStopped> {
        self.send(Command::Refresh(FetchKind::Contents))
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<BundleSnapshot>> {
        self.snapshots.clone()
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<BundleSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Stop the driver and wait for it to exit. In-flight fetches are dropped.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Err(err) = (&mut self.task).await {
            tracing::warn!(error = %err, "sync engine task did not exit cleanly");
        }
    }

    fn send(&self, command: Command) -> Result<(), EngineStopped> {
        self.commands.send(command).map_err(|_| EngineStopped)
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Driver {
    backend: Arc<dyn BundleBackend>,
    config: SyncConfig,
    observer: Arc<dyn SyncObserver>,
    bundle: Option<BundleId>,
    generation: Generation,
    scheduler: PollingScheduler,
    /// Working copy; published as a fresh `Arc` after each change.
    snapshot: BundleSnapshot,
    publisher: watch::Sender<Arc<BundleSnapshot>>,
    pending: FuturesUnordered<BoxFuture<'static, Completion>>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        cancel: CancellationToken,
    ) {
        let period = self.config.keepalive_interval();
        let mut keepalive = tokio::time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!("sync engine started");
        loop {
            let metadata_due = self.scheduler.next_due(FetchKind::Metadata);
            let contents_due = self.scheduler.next_due(FetchKind::Contents);

            tokio::select! {
                _ = cancel.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = keepalive.tick() => self.observer.on_keepalive(),
                Some(done) = self.pending.next(), if !self.pending.is_empty() => {
                    self.handle_completion(done);
                }
                _ = sleep_until_due(metadata_due) => {
                    self.start_fetch(FetchKind::Metadata);
                }
                _ = sleep_until_due(contents_due) => {
                    self.start_fetch(FetchKind::Contents);
                }
            }
        }
        tracing::debug!(in_flight = self.pending.len(), "sync engine stopped");
    }

    fn handle_command(&mut self, command: Command) {
        let now = Instant::now();
        match command {
            Command::SetBundle(bundle_id) => {
                if self.bundle.as_ref() == Some(&bundle_id) {
                    tracing::debug!(%bundle_id, "bundle unchanged");
                    return;
                }
                self.generation = self.generation.next();
                tracing::info!(%bundle_id, generation = %self.generation, "synchronizing bundle");
                self.snapshot = BundleSnapshot::for_bundle(bundle_id.clone(), self.generation);
                self.bundle = Some(bundle_id);
                self.scheduler.restart(now);
                self.publish();
            }
            Command::ClearBundle => {
                if self.bundle.take().is_none() {
                    return;
                }
                self.generation = self.generation.next();
                tracing::info!(generation = %self.generation, "bundle cleared");
                self.snapshot = BundleSnapshot {
                    generation: self.generation,
                    ..BundleSnapshot::default()
                };
                self.scheduler.stop();
                self.publish();
            }
            Command::Refresh(kind) => {
                if !self.scheduler.request_now(kind, now) {
                    tracing::debug!(%kind, "refresh skipped: no bundle or fetch already in flight");
                }
            }
        }
    }

    fn start_fetch(&mut self, kind: FetchKind) {
        let Some(bundle_id) = self.bundle.clone() else {
            return;
        };
        let generation = self.generation;
        if let Err(busy) = self.scheduler.try_start(kind, generation) {
            tracing::debug!(
                %kind,
                in_flight_generation = %busy.generation,
                "tick skipped: fetch already in flight"
            );
            return;
        }

        tracing::trace!(%kind, %bundle_id, %generation, "fetch started");
        let backend = Arc::clone(&self.backend);
        let fetch = match kind {
            FetchKind::Metadata => async move {
                let result = backend.fetch_bundle(&bundle_id).await;
                Completion {
                    generation,
                    bundle_id,
                    result: FetchResult::Metadata(result),
                }
            }
            .boxed(),
            FetchKind::Contents => async move {
                let outcome = fetch_contents(backend.as_ref(), &bundle_id).await;
                Completion {
                    generation,
                    bundle_id,
                    result: FetchResult::Contents(outcome),
                }
            }
            .boxed(),
        };
        self.pending.push(fetch);
    }

    fn handle_completion(&mut self, done: Completion) {
        let now = Instant::now();
        let kind = done.result.kind();

        if done.generation != self.generation {
            tracing::debug!(
                %kind,
                bundle_id = %done.bundle_id,
                generation = %done.generation,
                current = %self.generation,
                "discarding stale completion"
            );
            self.scheduler.complete(kind, true, now);
            return;
        }

        match done.result {
            FetchResult::Metadata(Ok(document)) => match normalize_bundle(&document) {
                Ok(view) => {
                    tracing::trace!(state = ?view.state, "metadata updated");
                    self.snapshot.metadata = Some(view);
                }
                Err(err) => self.record_metadata_failure(SyncError::MalformedMetadata {
                    bundle_id: done.bundle_id.to_string(),
                    message: err.to_string(),
                }),
            },
            FetchResult::Metadata(Err(source)) => {
                self.record_metadata_failure(SyncError::MetadataFetch {
                    bundle_id: done.bundle_id.to_string(),
                    source,
                });
            }
            FetchResult::Contents(outcome) => apply_contents_outcome(
                &mut self.snapshot.content,
                &mut self.snapshot.errors,
                outcome,
                self.config.summary_error_policy,
            ),
        }

        if kind == FetchKind::Metadata {
            let cadence =
                Cadence::for_metadata(self.snapshot.metadata.as_ref(), self.config.poll_interval());
            if self.scheduler.set_cadence(cadence, now) {
                tracing::info!(?cadence, "polling cadence changed");
            }
        }
        self.scheduler.complete(kind, false, now);
        self.publish();
    }

    /// Content cannot be trusted without the bundle it belongs to, so a
    /// metadata failure clears both.
    fn record_metadata_failure(&mut self, err: SyncError) {
        tracing::warn!(error = %err, "metadata fetch failed");
        self.snapshot.errors.push(ErrorRecord::from(&err));
        self.snapshot.metadata = None;
        self.snapshot.content.clear();
    }

    fn publish(&mut self) {
        self.snapshot.polling = self.bundle.is_some() && self.scheduler.has_work();
        let snapshot = Arc::new(self.snapshot.clone());
        self.observer.on_snapshot(&snapshot);
        self.publisher.send_replace(snapshot);
    }
}

/// Resolves at `due`, or never when nothing is scheduled.
async fn sleep_until_due(due: Option<Instant>) {
    match due {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
