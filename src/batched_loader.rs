//! Buffers events in a per-batch staging list and flushes time- or
//! size-triggered batches to Disk, driving the Mem -> Disk hand-off
//! through the Search Index Manager. A single background worker performs
//! the flush; only one flush is ever in flight at a time.

use std::{
    num::NonZeroU32,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use parking_lot::Mutex;
use tokio::{sync::Notify, task::JoinHandle};

use crate::{
    disk_loader::DiskLoader,
    error::CoreError,
    event::{Indexable, Version},
    health::SharedHealth,
    listener::ListenerRegistry,
    manager::{FlushOutcome, SearchIndexManager},
    partition::PartitionId,
};

/// How often a persistently-failing flush is retried. Not part of the
/// distilled spec; added so a stuck engine can't turn the flush worker
/// into a busy loop.
const FLUSH_RETRY_PER_SECOND: u32 = 5;

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub batch_size: usize,
    pub max_batch_size: usize,
    pub batch_delay: Duration,
}

impl LoaderConfig {
    pub fn new(batch_size: usize, max_batch_size: usize, batch_delay: Duration) -> Self {
        Self {
            // "batchSize is silently clamped to >= 1" (§4.2).
            batch_size: batch_size.max(1),
            max_batch_size: max_batch_size.max(batch_size.max(1)),
            batch_delay,
        }
    }
}

/// The pipeline-facing contract shared by the Batched and Realtime
/// loaders, so the Async Consumer Front can be generic over either.
#[async_trait]
pub trait Loader<D>: Send + Sync {
    async fn consume(&self, batch: Vec<Indexable<D>>, version: Version) -> Result<(), CoreError>;
    async fn flush_events(&self, timeout: Duration) -> Result<(), CoreError>;
    /// The highest version this loader can attest has been "absorbed": for
    /// the plain Batched Loader this is the Disk-committed version (there
    /// is no independent memory-visible checkpoint before flush); the
    /// Realtime Loader overrides this to the live, memory-visible version.
    fn absorbed_version(&self) -> Version;
    /// The current Disk (persistent watermark) version, independent of
    /// `absorbed_version` — this is what `AsyncConsumerFront::get_version`
    /// reports.
    fn disk_version(&self) -> Version;
    /// Forces the `flushToMemoryIndex` admin command: applies whatever is
    /// currently staged directly to the active memory partition without
    /// removing it from the staging list (it still gets flushed to Disk on
    /// the usual cadence). A no-op where events are already applied as they
    /// arrive (the Realtime Loader).
    async fn flush_to_memory(&self) -> Result<(), CoreError>;
    fn shutdown(&self);
}

struct Staging<D> {
    items: Vec<Indexable<D>>,
    version: Version,
    window_started_at: Option<Instant>,
}

impl<D> Default for Staging<D> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            version: Version::ZERO,
            window_started_at: None,
        }
    }
}

struct Flushing<D> {
    partition_id: PartitionId,
    batch: Vec<Indexable<D>>,
    version: Version,
}

struct LoaderState<D> {
    staging: Staging<D>,
    flushing: Option<Flushing<D>>,
}

pub struct BatchedLoader<D> {
    manager: Arc<SearchIndexManager<D>>,
    disk_loader: Arc<DiskLoader<D>>,
    state: Mutex<LoaderState<D>>,
    config: Mutex<LoaderConfig>,
    health: SharedHealth,
    listeners: Arc<ListenerRegistry>,
    retry_limiter: DefaultDirectRateLimiter,
    wake_worker: Notify,
    backpressure: Notify,
    committed: Notify,
    shut_down: AtomicBool,
    /// Set by `flush_events` to force the next `next_wake` check to fire
    /// immediately regardless of `batchSize`/`batchDelay`, since an explicit
    /// flush barrier must drain whatever is staged now, not wait for the
    /// normal triggers to catch up.
    force_flush: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<D: Send + Sync + 'static> BatchedLoader<D> {
    pub fn new(
        manager: Arc<SearchIndexManager<D>>,
        disk_loader: Arc<DiskLoader<D>>,
        config: LoaderConfig,
        health: SharedHealth,
        listeners: Arc<ListenerRegistry>,
    ) -> Arc<Self> {
        let quota = Quota::per_second(NonZeroU32::new(FLUSH_RETRY_PER_SECOND).unwrap());
        let this = Arc::new(Self {
            manager,
            disk_loader,
            state: Mutex::new(LoaderState {
                staging: Staging::default(),
                flushing: None,
            }),
            config: Mutex::new(config),
            health,
            listeners,
            retry_limiter: RateLimiter::direct(quota),
            wake_worker: Notify::new(),
            backpressure: Notify::new(),
            committed: Notify::new(),
            shut_down: AtomicBool::new(false),
            force_flush: AtomicBool::new(false),
            worker: Mutex::new(None),
        });
        let worker_handle = tokio::spawn(Arc::clone(&this).run());
        *this.worker.lock() = Some(worker_handle);
        this
    }

    pub fn set_batch_size(&self, batch_size: usize) {
        self.config.lock().batch_size = batch_size.max(1);
    }

    pub fn set_max_batch_size(&self, max_batch_size: usize) {
        self.config.lock().max_batch_size = max_batch_size.max(1);
    }

    pub fn set_batch_delay(&self, batch_delay: Duration) {
        self.config.lock().batch_delay = batch_delay;
    }

    pub fn current_config(&self) -> LoaderConfig {
        self.config.lock().clone()
    }

    pub fn current_mem_batch_size(&self) -> usize {
        self.state.lock().staging.items.len()
    }

    /// Size of the batch currently being (re)attempted against Disk, if a
    /// flush is in flight; `0` otherwise. Backs the admin surface's
    /// "current disk batch size" getter.
    pub fn current_disk_batch_size(&self) -> usize {
        self.state
            .lock()
            .flushing
            .as_ref()
            .map(|f| f.batch.len())
            .unwrap_or(0)
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn manager(&self) -> &Arc<SearchIndexManager<D>> {
        &self.manager
    }

    /// Applies a batch to memory before it's durable. The base
    /// implementation is a no-op (non-realtime mode defers all engine
    /// writes until flush time); `RealtimeLoader` overrides this path.
    pub(crate) async fn apply_realtime(
        &self,
        _batch: &[Indexable<D>],
        _version: Version,
    ) -> Result<(), CoreError> {
        Ok(())
    }

    async fn stage(&self, mut batch: Vec<Indexable<D>>, version: Version) -> Result<(), CoreError> {
        loop {
            // Register as a waiter before taking the lock, so a worker that
            // drains the staging list and calls `notify_waiters()` between
            // our check below and the `.await` can't be missed.
            let notified = self.backpressure.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let should_wait = {
                let mut state = self.state.lock();
                if self.shut_down.load(Ordering::Acquire) {
                    return Err(CoreError::ConsumerClosed);
                }
                let max_batch_size = self.config.lock().max_batch_size;
                if state.staging.items.len() >= max_batch_size {
                    true
                } else {
                    if state.staging.items.is_empty() {
                        state.staging.window_started_at = Some(Instant::now());
                    }
                    state.staging.items.append(&mut batch);
                    state.staging.version = state.staging.version.max(version);
                    false
                }
            };
            if should_wait {
                self.wake_worker.notify_one();
                notified.await;
                continue;
            }
            break;
        }
        self.wake_worker.notify_one();
        Ok(())
    }

    fn next_wake(&self) -> NextWake {
        let state = self.state.lock();
        if state.flushing.is_some() {
            return NextWake::Now;
        }
        let config = self.config.lock();
        if state.staging.items.is_empty() {
            return NextWake::Indefinite;
        }
        if self.force_flush.load(Ordering::Acquire) || state.staging.items.len() >= config.batch_size {
            return NextWake::Now;
        }
        match state.staging.window_started_at {
            Some(started) => {
                let deadline = started + config.batch_delay;
                if deadline <= Instant::now() {
                    NextWake::Now
                } else {
                    NextWake::At(deadline)
                }
            },
            None => NextWake::Indefinite,
        }
    }

    async fn run(self: Arc<Self>) {
        loop {
            if self.shut_down.load(Ordering::Acquire) {
                let drained = {
                    let state = self.state.lock();
                    state.staging.items.is_empty() && state.flushing.is_none()
                };
                if drained {
                    tracing::info!("batched loader worker exiting, fully drained");
                    return;
                }
            }
            match self.next_wake() {
                NextWake::Now => self.run_flush_cycle().await,
                NextWake::At(deadline) => {
                    tokio::select! {
                        _ = self.wake_worker.notified() => {},
                        _ = tokio::time::sleep_until(deadline.into()) => {},
                    }
                },
                NextWake::Indefinite => {
                    self.wake_worker.notified().await;
                },
            }
        }
    }

    async fn run_flush_cycle(&self) {
        let is_retry = self.state.lock().flushing.is_some();
        if is_retry {
            self.retry_limiter.until_ready().await;
        }

        let (partition_id, batch, version) = {
            let mut state = self.state.lock();
            if let Some(flushing) = state.flushing.take() {
                let mut batch = flushing.batch;
                batch.append(&mut state.staging.items);
                let version = flushing.version.max(state.staging.version);
                state.staging.version = Version::ZERO;
                self.force_flush.store(false, Ordering::Release);
                (flushing.partition_id, batch, version)
            } else {
                let batch = std::mem::take(&mut state.staging.items);
                let version = state.staging.version;
                state.staging.version = Version::ZERO;
                state.staging.window_started_at = None;
                self.force_flush.store(false, Ordering::Release);
                drop(state);
                let (id, _engine, _prior_version) = self.manager.begin_flush();
                // New writes now land on the freshly-activated partition;
                // staging has room again regardless of how this flush ends.
                self.backpressure.notify_waiters();
                (id, batch, version)
            }
        };

        if batch.is_empty() {
            // Nothing to flush (can only happen if a wake-up raced an
            // already-empty staging list); nothing to do this cycle.
            return;
        }

        match self.disk_loader.load_from_index(&batch, version).await {
            Ok(()) => {
                self.manager
                    .finish_flush(partition_id, FlushOutcome::Committed(version));
                self.health.record_success();
                self.listeners.fire_disk_flush(version);
            },
            Err(e) => {
                self.manager.finish_flush(partition_id, FlushOutcome::Failed);
                self.health.record_failure();
                self.listeners.fire_error(&e);
                let mut state = self.state.lock();
                state.flushing = Some(Flushing {
                    partition_id,
                    batch,
                    version,
                });
                self.wake_worker.notify_one();
            },
        }
        self.committed.notify_waiters();
    }
}

enum NextWake {
    Now,
    At(Instant),
    Indefinite,
}

#[async_trait]
impl<D: Clone + Send + Sync + 'static> Loader<D> for BatchedLoader<D> {
    async fn consume(&self, batch: Vec<Indexable<D>>, version: Version) -> Result<(), CoreError> {
        self.stage(batch, version).await
    }

    async fn flush_events(&self, timeout: Duration) -> Result<(), CoreError> {
        let deadline = Instant::now() + timeout;
        let target = {
            let state = self.state.lock();
            state
                .staging
                .version
                .max(state.flushing.as_ref().map(|f| f.version).unwrap_or(Version::ZERO))
        };
        // An explicit barrier must drain whatever is staged now rather than
        // wait for batchSize/batchDelay to catch up on their own.
        self.force_flush.store(true, Ordering::Release);
        self.wake_worker.notify_one();
        loop {
            if self.manager.disk_version() >= target {
                return Ok(());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CoreError::FlushTimeout);
            }
            let wait = remaining.min(Duration::from_millis(200));
            let _ = tokio::time::timeout(wait, self.committed.notified()).await;
        }
    }

    fn absorbed_version(&self) -> Version {
        self.manager.disk_version()
    }

    fn disk_version(&self) -> Version {
        self.manager.disk_version()
    }

    /// Staged-but-not-yet-flushed events are applied to the active memory
    /// partition in place, without touching the staging list itself, so
    /// they remain queryable immediately and are still flushed to Disk on
    /// the usual cadence.
    async fn flush_to_memory(&self) -> Result<(), CoreError> {
        let (batch, version) = {
            let state = self.state.lock();
            (state.staging.items.clone(), state.staging.version)
        };
        if batch.is_empty() {
            return Ok(());
        }
        self.manager.apply_to_active(&batch, version).await?;
        self.listeners.fire_memory_apply(version);
        Ok(())
    }

    fn shutdown(&self) {
        self.shut_down.store(true, Ordering::Release);
        self.wake_worker.notify_one();
        self.backpressure.notify_waiters();
    }
}
