//! The Search Index Manager: owns the three partitions and produces reader
//! snapshots. This is the hardest-to-get-right piece of the pipeline —
//! swaps happen under an exclusive lock so that no reader snapshot can
//! straddle a swap (§5): a snapshot sees either the pre-swap active memory
//! or the post-swap active memory, never both, never neither.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    engine::IndexEngine,
    error::CoreError,
    event::{Indexable, Version},
    partition::{Partition, PartitionId, PartitionState},
    snapshot::ReaderSnapshot,
};

/// Segment-policy tunables, all pass-throughs to the engine.
#[derive(Debug, Clone, Copy)]
pub struct SegmentPolicy {
    pub num_large_segments: usize,
    pub max_small_segments: usize,
    pub merge_factor: u32,
    pub max_merge_docs: u32,
    pub use_compound_file: bool,
}

impl Default for SegmentPolicy {
    fn default() -> Self {
        Self {
            num_large_segments: 1,
            max_small_segments: 4,
            merge_factor: 10,
            max_merge_docs: u32::MAX,
            use_compound_file: true,
        }
    }
}

/// Outcome of a flush attempt, reported back to the manager via
/// `finish_flush` so it can clear the flushed partition or leave it
/// populated for retry.
pub enum FlushOutcome {
    Committed(Version),
    Failed,
}

struct ManagerState<D> {
    disk: Partition<D>,
    mem_a: Partition<D>,
    mem_b: Partition<D>,
    active: PartitionId,
}

impl<D> ManagerState<D> {
    fn partition(&self, id: PartitionId) -> &Partition<D> {
        match id {
            PartitionId::Disk => &self.disk,
            PartitionId::MemA => &self.mem_a,
            PartitionId::MemB => &self.mem_b,
        }
    }

    fn partition_mut(&mut self, id: PartitionId) -> &mut Partition<D> {
        match id {
            PartitionId::Disk => &mut self.disk,
            PartitionId::MemA => &mut self.mem_a,
            PartitionId::MemB => &mut self.mem_b,
        }
    }
}

pub struct SearchIndexManager<D> {
    state: RwLock<ManagerState<D>>,
    pub segment_policy: RwLock<SegmentPolicy>,
}

impl<D: Send + Sync + 'static> SearchIndexManager<D> {
    /// Mem-A starts ACTIVE, Mem-B starts EMPTY. `disk_version` is whatever
    /// the directory manager reports as already persisted.
    pub fn new(
        disk_engine: Arc<dyn IndexEngine<D>>,
        mem_a_engine: Arc<dyn IndexEngine<D>>,
        mem_b_engine: Arc<dyn IndexEngine<D>>,
        disk_version: Version,
    ) -> Self {
        let mut disk = Partition::new(PartitionId::Disk, disk_engine, PartitionState::Active);
        disk.version = disk_version;
        let mem_a = Partition::new(PartitionId::MemA, mem_a_engine, PartitionState::Active);
        let mem_b = Partition::new(PartitionId::MemB, mem_b_engine, PartitionState::Empty);
        Self {
            state: RwLock::new(ManagerState {
                disk,
                mem_a,
                mem_b,
                active: PartitionId::MemA,
            }),
            segment_policy: RwLock::new(SegmentPolicy::default()),
        }
    }

    pub fn active_mem_id(&self) -> PartitionId {
        self.state.read().active
    }

    pub fn disk_version(&self) -> Version {
        self.state.read().disk.version
    }

    pub fn active_mem_version(&self) -> Version {
        let state = self.state.read();
        state.partition(state.active).version
    }

    /// [Disk readers ..., active-memory readers ...], each pre-incremented.
    /// The caller MUST `return_index_readers` exactly once per element.
    pub async fn get_index_readers(&self) -> Result<ReaderSnapshot, CoreError> {
        // Capture which engines to read under the lock, then open readers
        // (an async, potentially non-trivial operation) outside of it so we
        // never hold the lock across an await point.
        let (disk_engine, active_engine) = {
            let state = self.state.read();
            (
                Arc::clone(&state.disk.engine),
                Arc::clone(&state.partition(state.active).engine),
            )
        };
        let disk_reader = disk_engine.open_reader().await?;
        let mem_reader = active_engine.open_reader().await?;
        // "Each reader is pre-incremented" (§4.5): refcount starts at 1 the
        // moment a reader is published, independent of however many
        // borrowers later call `get_index_readers` on the cached snapshot.
        disk_reader.inc_ref();
        mem_reader.inc_ref();
        Ok(ReaderSnapshot {
            readers: vec![disk_reader, mem_reader],
        })
    }

    /// Applies a batch directly to whichever memory partition is currently
    /// ACTIVE (used by the realtime loader for immediate visibility).
    /// Applying the same UIDs again later (during the eventual disk flush
    /// re-application) is safe because engine writes are upsert-by-UID.
    pub async fn apply_to_active(
        &self,
        batch: &[Indexable<D>],
        version: Version,
    ) -> Result<(), CoreError> {
        let (id, engine) = {
            let state = self.state.read();
            (state.active, Arc::clone(&state.partition(state.active).engine))
        };
        engine.apply_batch(batch).await?;
        let mut state = self.state.write();
        // The active partition may have swapped out from under us if a
        // flush raced with this apply; only bump the version if we're still
        // looking at the same partition that received the write.
        if state.partition(id).state != PartitionState::Flushing {
            let partition = state.partition_mut(id);
            partition.version = partition.version.max(version);
        }
        Ok(())
    }

    /// Swap: the current active memory partition becomes FLUSHING, the
    /// other (which must be EMPTY — the loader guarantees only one flush
    /// is ever in flight) becomes ACTIVE. Returns the id, engine, and
    /// absorbed version of the newly-flushing partition.
    pub fn begin_flush(&self) -> (PartitionId, Arc<dyn IndexEngine<D>>, Version) {
        let mut state = self.state.write();
        let old_active = state.active;
        let new_active = old_active.other_mem();
        debug_assert!(
            state.partition(new_active).is_empty(),
            "only one flush should ever be in flight"
        );
        state.partition_mut(old_active).state = PartitionState::Flushing;
        state.partition_mut(new_active).state = PartitionState::Active;
        state.active = new_active;
        let flushing = state.partition(old_active);
        tracing::debug!(from = %old_active, to = %new_active, version = %flushing.version, "swapped active memory partition");
        (old_active, Arc::clone(&flushing.engine), flushing.version)
    }

    /// On success, clears the flushed partition and advances the Disk
    /// version. On failure, the partition remains FLUSHING so the next
    /// flush attempt retries it.
    pub fn finish_flush(&self, id: PartitionId, outcome: FlushOutcome) {
        let mut state = self.state.write();
        match outcome {
            FlushOutcome::Committed(version) => {
                let partition = state.partition_mut(id);
                partition.state = PartitionState::Empty;
                partition.version = Version::ZERO;
                state.disk.version = version;
                tracing::debug!(partition = %id, disk_version = %version, "flush committed");
            },
            FlushOutcome::Failed => {
                tracing::warn!(partition = %id, "flush failed, partition retained for retry");
            },
        }
    }

    pub async fn purge(&self) -> Result<(), CoreError> {
        let (disk, mem_a, mem_b) = {
            let mut state = self.state.write();
            state.disk.version = Version::ZERO;
            state.mem_a.state = PartitionState::Active;
            state.mem_a.version = Version::ZERO;
            state.mem_b.state = PartitionState::Empty;
            state.mem_b.version = Version::ZERO;
            state.active = PartitionId::MemA;
            (
                Arc::clone(&state.disk.engine),
                Arc::clone(&state.mem_a.engine),
                Arc::clone(&state.mem_b.engine),
            )
        };
        disk.clear().await?;
        mem_a.clear().await?;
        mem_b.clear().await?;
        Ok(())
    }

    pub fn in_memory_sizes(&self) -> Vec<(PartitionId, Version)> {
        let state = self.state.read();
        vec![
            (PartitionId::MemA, state.mem_a.version),
            (PartitionId::MemB, state.mem_b.version),
        ]
    }

    pub fn mem_partition_state(&self, id: PartitionId) -> PartitionState {
        self.state.read().partition(id).state
    }

    pub async fn disk_engine(&self) -> Arc<dyn IndexEngine<D>> {
        Arc::clone(&self.state.read().disk.engine)
    }

    /// The engine backing any single partition, for admin introspection
    /// (segment counts, sizes, min/max UID) that needs to look at Mem-A and
    /// Mem-B individually rather than just "whichever is active".
    pub fn engine_for(&self, id: PartitionId) -> Arc<dyn IndexEngine<D>> {
        Arc::clone(&self.state.read().partition(id).engine)
    }

    pub fn version_for(&self, id: PartitionId) -> Version {
        self.state.read().partition(id).version
    }

    /// Smallest/largest UID visible across all three partitions combined,
    /// used by the admin surface's min/max UID getters. Opens and
    /// immediately releases a reader per partition; not on the hot read
    /// path, so the extra round trip is acceptable here.
    pub async fn uid_range(&self) -> Result<Option<(crate::event::Uid, crate::event::Uid)>, CoreError> {
        let engines = {
            let state = self.state.read();
            [
                Arc::clone(&state.disk.engine),
                Arc::clone(&state.mem_a.engine),
                Arc::clone(&state.mem_b.engine),
            ]
        };
        let mut combined: Option<(crate::event::Uid, crate::event::Uid)> = None;
        for engine in engines {
            // Purely transient: never handed to a caller, so it carries no
            // ref-count obligation of its own (unlike `get_index_readers`),
            // and is simply dropped once its data has been read.
            let reader = engine.open_reader().await?;
            if let Some((lo, hi)) = reader.uid_range() {
                combined = Some(match combined {
                    Some((clo, chi)) => (clo.min(lo), chi.max(hi)),
                    None => (lo, hi),
                });
            }
        }
        Ok(combined)
    }

    /// Used after a successful `importSnapshot`: the Disk partition's
    /// engine content was just replaced wholesale, so its version needs to
    /// be set directly rather than advanced via the usual flush path.
    pub fn set_disk_version(&self, version: Version) {
        self.state.write().disk.version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fake_engine::FakeEngine;

    fn manager() -> SearchIndexManager<String> {
        SearchIndexManager::new(
            Arc::new(FakeEngine::new()),
            Arc::new(FakeEngine::new()),
            Arc::new(FakeEngine::new()),
            Version::ZERO,
        )
    }

    #[test]
    fn starts_with_mem_a_active_mem_b_empty() {
        let mgr = manager();
        assert_eq!(mgr.active_mem_id(), PartitionId::MemA);
        assert_eq!(mgr.mem_partition_state(PartitionId::MemB), PartitionState::Empty);
    }

    #[test]
    fn begin_flush_swaps_and_marks_flushing() {
        let mgr = manager();
        let (flushed_id, _, _) = mgr.begin_flush();
        assert_eq!(flushed_id, PartitionId::MemA);
        assert_eq!(mgr.active_mem_id(), PartitionId::MemB);
        assert_eq!(mgr.mem_partition_state(PartitionId::MemA), PartitionState::Flushing);
    }

    #[test]
    fn finish_flush_failure_keeps_partition_flushing() {
        let mgr = manager();
        let (flushed_id, _, _) = mgr.begin_flush();
        mgr.finish_flush(flushed_id, FlushOutcome::Failed);
        assert_eq!(mgr.mem_partition_state(flushed_id), PartitionState::Flushing);
    }

    #[test]
    fn finish_flush_success_clears_partition_and_advances_disk_version() {
        let mgr = manager();
        let (flushed_id, _, version) = mgr.begin_flush();
        mgr.finish_flush(flushed_id, FlushOutcome::Committed(Version(5)));
        assert_eq!(mgr.mem_partition_state(flushed_id), PartitionState::Empty);
        assert_eq!(mgr.disk_version(), Version(5));
        let _ = version;
    }

    #[tokio::test]
    async fn get_index_readers_returns_disk_then_active_mem() {
        let mgr = manager();
        let snapshot = mgr.get_index_readers().await.unwrap();
        assert_eq!(snapshot.readers.len(), 2);
    }
}
