//! The Reader Cache (a single published snapshot plus its timestamp) and
//! its background Maintainer, which refreshes the cache on a cadence and
//! drains the deferred reference-count return queue.
//!
//! Decoupling publication from borrower returns keeps the hot
//! `get_index_readers` path lock-short and I/O-free; the 200ms-chunked
//! waits in `refresh_cache` bound how long a missed wake-up can stall the
//! barrier without needing perfectly reliable notification delivery.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tokio::{sync::Notify, task::JoinHandle};

use crate::{error::CoreError, manager::SearchIndexManager, snapshot::ReaderSnapshot};

struct CacheState {
    snapshot: ReaderSnapshot,
    published_at: Instant,
}

pub struct ReaderCache {
    state: tokio::sync::RwLock<CacheState>,
    return_tx: crossbeam_channel::Sender<ReaderSnapshot>,
    return_rx: crossbeam_channel::Receiver<ReaderSnapshot>,
    sla: parking_lot::RwLock<Duration>,
}

impl ReaderCache {
    pub fn new(sla: Duration) -> Self {
        let (return_tx, return_rx) = crossbeam_channel::unbounded();
        Self {
            state: tokio::sync::RwLock::new(CacheState {
                snapshot: ReaderSnapshot::empty(),
                published_at: Instant::now(),
            }),
            return_tx,
            return_rx,
            sla: parking_lot::RwLock::new(sla),
        }
    }

    pub fn set_sla(&self, sla: Duration) {
        *self.sla.write() = sla;
    }

    pub fn sla(&self) -> Duration {
        *self.sla.read()
    }

    /// Acquire a read lock, copy the current snapshot, increment every
    /// reader's refcount, release the lock, return. Exceeding the SLA is
    /// logged, never failed.
    pub async fn get_index_readers(&self) -> ReaderSnapshot {
        let start = Instant::now();
        let snapshot = {
            let guard = self.state.read().await;
            guard.snapshot.clone()
        };
        snapshot.inc_ref_all();
        let elapsed = start.elapsed();
        let sla = self.sla();
        if elapsed > sla {
            tracing::warn!(?elapsed, ?sla, "getIndexReaders exceeded SLA");
        }
        snapshot
    }

    /// Hot path: push onto the lock-free return queue and return
    /// immediately. Decrement is deferred to the Maintainer.
    pub fn return_index_readers(&self, snapshot: ReaderSnapshot) {
        if self.return_tx.send(snapshot).is_err() {
            tracing::error!("return queue receiver dropped; readers leaked");
        }
    }

    /// Swap in a freshly-published snapshot, returning the one it
    /// replaced so the caller can enqueue it for eventual release.
    async fn publish(&self, new_snapshot: ReaderSnapshot) -> ReaderSnapshot {
        let mut guard = self.state.write().await;
        let old = std::mem::replace(&mut guard.snapshot, new_snapshot);
        guard.published_at = Instant::now();
        old
    }

    async fn published_at(&self) -> Instant {
        self.state.read().await.published_at
    }

    /// Drain everything currently queued and decrement every reader in
    /// every drained snapshot.
    fn drain_returns(&self) {
        while let Ok(snapshot) = self.return_rx.try_recv() {
            snapshot.dec_ref_all();
        }
    }
}

pub struct ReaderCacheMaintainer<D> {
    manager: Arc<SearchIndexManager<D>>,
    cache: Arc<ReaderCache>,
    freshness: parking_lot::RwLock<Duration>,
    wake: Notify,
    refresh_cond: Notify,
    shutting_down: AtomicBool,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<D: Send + Sync + 'static> ReaderCacheMaintainer<D> {
    pub fn new(manager: Arc<SearchIndexManager<D>>, cache: Arc<ReaderCache>, freshness: Duration) -> Arc<Self> {
        let this = Arc::new(Self {
            manager,
            cache,
            freshness: parking_lot::RwLock::new(freshness),
            wake: Notify::new(),
            refresh_cond: Notify::new(),
            shutting_down: AtomicBool::new(false),
            worker: parking_lot::Mutex::new(None),
        });
        let handle = tokio::spawn(Arc::clone(&this).run());
        *this.worker.lock() = Some(handle);
        this
    }

    pub fn cache(&self) -> &Arc<ReaderCache> {
        &self.cache
    }

    pub fn set_freshness(&self, freshness: Duration) {
        *self.freshness.write() = freshness;
        self.wake.notify_one();
    }

    pub fn freshness(&self) -> Duration {
        *self.freshness.read()
    }

    async fn run(self: Arc<Self>) {
        loop {
            self.tick().await;
            let sleep = *self.freshness.read();
            tokio::select! {
                _ = self.wake.notified() => {},
                _ = tokio::time::sleep(sleep) => {},
            }
        }
    }

    async fn tick(&self) {
        let new_snapshot = if self.shutting_down.load(Ordering::Acquire) {
            ReaderSnapshot::empty()
        } else {
            match self.manager.get_index_readers().await {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    tracing::error!(error = %e, "maintainer failed to acquire fresh snapshot");
                    return;
                },
            }
        };
        let old_snapshot = self.cache.publish(new_snapshot).await;
        self.refresh_cond.notify_waiters();
        self.cache.return_index_readers(old_snapshot);
        self.cache.drain_returns();
    }

    /// The refresh barrier: waits, in bounded 200ms chunks (nudging the
    /// maintainer each pass), until a snapshot published after this call
    /// started is visible.
    pub async fn refresh_cache(&self, timeout: Duration) -> Result<(), CoreError> {
        let t0 = Instant::now();
        let deadline = t0 + timeout;
        loop {
            if self.cache.published_at().await > t0 {
                return Ok(());
            }
            self.wake.notify_one();
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CoreError::RefreshTimeout);
            }
            let wait = remaining.min(Duration::from_millis(200));
            let _ = tokio::time::timeout(wait, self.refresh_cond.notified()).await;
        }
    }

    /// Idempotent: bumps `freshness` way up so the maintainer sleeps
    /// longer, but keeps ticking (and therefore keeps draining the return
    /// queue) until process exit, per §5.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
        self.set_freshness(Duration::from_secs(30));
    }
}
