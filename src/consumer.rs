//! The Async Consumer Front: the producer-facing entry point. Accepts
//! versioned event batches, interprets each event in order, forwards the
//! resulting `Indexable`s to the downstream loader, and exposes the
//! flush/sync barriers producers block on.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::{
    batched_loader::Loader, engine::Interpreter, error::CoreError, event::Version,
    reader_cache::ReaderCacheMaintainer,
};

/// `E` is the raw, opaque producer payload; `D` is the document type the
/// interpreter turns it into.
pub struct AsyncConsumerFront<E, D> {
    loader: Arc<dyn Loader<D>>,
    interpreter: Arc<dyn Interpreter<E, D>>,
    maintainer: Arc<ReaderCacheMaintainer<D>>,
    observed_version: AtomicU64,
    closed: AtomicBool,
}

impl<E, D> AsyncConsumerFront<E, D>
where
    E: Send + 'static,
    D: Send + Sync + 'static,
{
    pub fn new(
        loader: Arc<dyn Loader<D>>,
        interpreter: Arc<dyn Interpreter<E, D>>,
        maintainer: Arc<ReaderCacheMaintainer<D>>,
    ) -> Self {
        Self {
            loader,
            interpreter,
            maintainer,
            observed_version: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Interprets every event in submission order and forwards the
    /// resulting batch to the loader in one call, so FIFO is preserved
    /// end-to-end within this batch (invariant 4). Blocks the caller if the
    /// loader's staging buffer is over its high-water mark (backpressure) —
    /// see `BatchedLoader::consume`. Fails with `ConsumerClosed` once
    /// `shutdown` has been called.
    pub async fn consume(&self, events: Vec<E>, version: Version) -> Result<(), CoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CoreError::ConsumerClosed);
        }
        let mut batch = Vec::with_capacity(events.len());
        for event in events {
            batch.push(self.interpreter.interpret(event)?);
        }
        self.loader.consume(batch, version).await?;
        self.observed_version.fetch_max(version.0, Ordering::AcqRel);
        Ok(())
    }

    /// The highest version any `consume` call has submitted so far —
    /// invariant 3's "Async Consumer Front's observed version", an upper
    /// bound the Disk and active-memory versions never exceed.
    pub fn observed_version(&self) -> Version {
        Version(self.observed_version.load(Ordering::Acquire))
    }

    /// Blocks until all events enqueued before this call have been
    /// absorbed by the loader's Disk tier, or until `timeout` elapses.
    pub async fn flush_events(&self, timeout: Duration) -> Result<(), CoreError> {
        self.loader.flush_events(timeout).await
    }

    /// Blocks until the loader reports it has absorbed some version ≥
    /// `version`, then triggers a reader-cache refresh barrier so a
    /// subsequent `getIndexReaders` is guaranteed to see it.
    ///
    /// "Absorbed" is taken to mean memory-applied, not disk-committed (see
    /// the open question recorded in the design notes): `flush_events`
    /// remains the separate, explicit barrier for disk durability.
    pub async fn sync_with_version(&self, timeout: Duration, version: Version) -> Result<(), CoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            let absorbed = self.loader.absorbed_version();
            if absorbed >= version {
                break;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(CoreError::SyncTimeout {
                    requested: version.0,
                    absorbed: absorbed.0,
                });
            }
            tokio::time::sleep(remaining.min(Duration::from_millis(50))).await;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.maintainer.refresh_cache(remaining).await
    }

    /// The current Disk version (persistent watermark). Per §4.1 this never
    /// propagates a failure to the caller: in this model the manager's
    /// version bookkeeping is plain in-memory state and cannot itself fail,
    /// so there is nothing to degrade from — a host wiring a real directory
    /// behind `disk_version()` is where the "log and return 0" fallback
    /// would live.
    pub fn get_version(&self) -> Version {
        self.loader.disk_version()
    }

    /// Idempotent: a second call returns immediately with a warning and
    /// does not re-invoke the loader's own (separately idempotent) shutdown.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            tracing::warn!("consumer already shut down");
            return;
        }
        self.loader.shutdown();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
