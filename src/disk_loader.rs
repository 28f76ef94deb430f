//! Applies a versioned, frozen memory partition to the Disk partition and
//! commits it, then decides (via the optimize scheduler) whether this is a
//! good moment to ask the engine to merge segments down.

use std::{
    sync::{atomic::AtomicU32, Arc},
    time::Instant,
};

use parking_lot::Mutex;

use crate::{
    error::CoreError,
    event::{Indexable, Version},
    manager::SearchIndexManager,
};

/// Decides when optimization is allowed: after a configurable number of
/// flushes have happened since the last one. Kept as its own small object
/// (rather than inlined counting in `DiskLoader`) so alternative policies
/// (idle-triggered, size-triggered) can be swapped in without touching the
/// loader.
pub struct OptimizeScheduler {
    flushes_per_optimize: u32,
    flushes_since_optimize: AtomicU32,
}

impl OptimizeScheduler {
    pub fn new(flushes_per_optimize: u32) -> Self {
        Self {
            flushes_per_optimize: flushes_per_optimize.max(1),
            flushes_since_optimize: AtomicU32::new(0),
        }
    }

    /// Call once per successful flush. Returns true exactly when this
    /// flush pushed the counter over the threshold (and resets it).
    pub fn should_optimize_after_flush(&self) -> bool {
        let count = self
            .flushes_since_optimize
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        if count >= self.flushes_per_optimize {
            self.flushes_since_optimize
                .store(0, std::sync::atomic::Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

pub struct DiskLoader<D> {
    manager: Arc<SearchIndexManager<D>>,
    optimize_scheduler: OptimizeScheduler,
    target_segments: usize,
    last_optimize_time: Mutex<Option<Instant>>,
}

impl<D: Send + Sync + 'static> DiskLoader<D> {
    pub fn new(
        manager: Arc<SearchIndexManager<D>>,
        target_segments: usize,
        flushes_per_optimize: u32,
    ) -> Self {
        Self {
            manager,
            optimize_scheduler: OptimizeScheduler::new(flushes_per_optimize),
            target_segments,
            last_optimize_time: Mutex::new(None),
        }
    }

    /// Backs the admin surface's "last optimize time" getter. `None` until
    /// the first optimize (scheduled or admin-triggered) completes.
    pub fn last_optimize_time(&self) -> Option<Instant> {
        *self.last_optimize_time.lock()
    }

    /// Merges a frozen memory partition's accumulated writes into Disk and
    /// atomically advances the Disk version. On engine failure the error
    /// is logged and re-raised; the caller (the Batched Loader) retains
    /// the memory partition for retry.
    pub async fn load_from_index(
        &self,
        batch: &[Indexable<D>],
        version: Version,
    ) -> Result<(), CoreError> {
        let disk_engine = self.manager.disk_engine().await;
        disk_engine.apply_batch(batch).await.map_err(|e| {
            tracing::error!(error = %e, "disk apply_batch failed");
            e
        })?;
        disk_engine.commit(version).await.map_err(|e| {
            tracing::error!(error = %e, "disk commit failed");
            e
        })?;
        tracing::info!(%version, docs = batch.len(), "flushed to disk");
        if self.optimize_scheduler.should_optimize_after_flush() {
            if let Err(e) = self.optimize(self.target_segments).await {
                // Optimization failures don't affect data durability; the
                // flush itself already succeeded. Log and move on.
                tracing::warn!(error = %e, "post-flush optimize failed");
            }
        }
        Ok(())
    }

    pub async fn optimize(&self, target_segments: usize) -> Result<(), CoreError> {
        let disk_engine = self.manager.disk_engine().await;
        tracing::debug!(target_segments, "optimizing disk index");
        disk_engine.optimize(target_segments).await?;
        *self.last_optimize_time.lock() = Some(Instant::now());
        Ok(())
    }

    pub async fn expunge_deletes(&self) -> Result<(), CoreError> {
        let disk_engine = self.manager.disk_engine().await;
        disk_engine.expunge_deletes().await
    }

    pub async fn export_snapshot(
        &self,
        sink: &mut (dyn std::io::Write + Send),
    ) -> Result<(), CoreError> {
        let disk_engine = self.manager.disk_engine().await;
        disk_engine.snapshot_to(sink).await
    }

    /// Replaces Disk contents atomically and bumps the Disk version to
    /// whatever is embedded in the snapshot. A corrupt snapshot fails
    /// atomically, leaving on-disk state untouched.
    pub async fn import_snapshot(
        &self,
        source: &mut (dyn std::io::Read + Send),
    ) -> Result<(), CoreError> {
        let disk_engine = self.manager.disk_engine().await;
        let version = disk_engine.restore_from(source).await?;
        self.manager.set_disk_version(version);
        tracing::info!(%version, "imported disk snapshot");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{partition::PartitionId, testing::fake_engine::FakeEngine};

    fn loader() -> (Arc<SearchIndexManager<String>>, DiskLoader<String>) {
        let manager = Arc::new(SearchIndexManager::new(
            Arc::new(FakeEngine::new()),
            Arc::new(FakeEngine::new()),
            Arc::new(FakeEngine::new()),
            Version::ZERO,
        ));
        let loader = DiskLoader::new(Arc::clone(&manager), 1, 100);
        (manager, loader)
    }

    #[tokio::test]
    async fn load_from_index_advances_disk_version() {
        let (manager, loader) = loader();
        let batch = vec![Indexable::Add {
            uid: 1,
            doc: "hello".to_string(),
        }];
        loader.load_from_index(&batch, Version(7)).await.unwrap();
        assert_eq!(manager.disk_version(), Version(7));
    }

    #[test]
    fn optimize_scheduler_fires_after_threshold() {
        let scheduler = OptimizeScheduler::new(3);
        assert!(!scheduler.should_optimize_after_flush());
        assert!(!scheduler.should_optimize_after_flush());
        assert!(scheduler.should_optimize_after_flush());
        assert!(!scheduler.should_optimize_after_flush());
    }

    #[tokio::test]
    async fn export_then_import_round_trips() {
        let (manager, loader) = loader();
        let batch = vec![Indexable::Add {
            uid: 42,
            doc: "world".to_string(),
        }];
        loader.load_from_index(&batch, Version(3)).await.unwrap();
        let mut buf = Vec::new();
        loader.export_snapshot(&mut buf).await.unwrap();

        let fresh_manager = Arc::new(SearchIndexManager::new(
            Arc::new(FakeEngine::new()),
            Arc::new(FakeEngine::new()),
            Arc::new(FakeEngine::new()),
            Version::ZERO,
        ));
        let fresh_loader = DiskLoader::new(Arc::clone(&fresh_manager), 1, 100);
        fresh_loader
            .import_snapshot(&mut buf.as_slice())
            .await
            .unwrap();
        assert_eq!(fresh_manager.disk_version(), Version(3));
        let _ = PartitionId::Disk;
    }
}
