//! An in-memory, single-process stand-in for a real inverted-index engine:
//! no segments, no merges, no analyzers — just a `HashMap` guarded by a
//! lock. Exercises the same `IndexEngine` contract the pipeline depends on
//! (idempotent upsert-by-UID apply, reader refcounting, atomic
//! snapshot/restore) without pulling in a real indexing library.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    engine::{IndexEngine, IndexReader},
    error::CoreError,
    event::{Indexable, Uid, Version},
};

#[derive(Debug)]
struct FakeReader {
    uids: Vec<Uid>,
    ref_count: AtomicI64,
}

impl IndexReader for FakeReader {
    fn inc_ref(&self) {
        self.ref_count.fetch_add(1, Ordering::SeqCst);
    }

    fn dec_ref(&self) {
        self.ref_count.fetch_sub(1, Ordering::SeqCst);
    }

    fn ref_count(&self) -> i64 {
        self.ref_count.load(Ordering::SeqCst)
    }

    fn num_docs(&self) -> usize {
        self.uids.len()
    }

    fn uid_range(&self) -> Option<(Uid, Uid)> {
        if self.uids.is_empty() {
            None
        } else {
            let min = *self.uids.iter().min().unwrap();
            let max = *self.uids.iter().max().unwrap();
            Some((min, max))
        }
    }
}

/// A fake engine applies writes directly (no staged-vs-committed
/// distinction) since there is nothing here that could fail to apply but
/// fail to commit; `commit` only records the version.
pub struct FakeEngine<D> {
    docs: Mutex<HashMap<Uid, D>>,
    version: AtomicU64,
    num_segments: AtomicU32,
    fail_apply: std::sync::atomic::AtomicBool,
    apply_delay_ms: AtomicU64,
}

impl<D> FakeEngine<D> {
    pub fn new() -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
            version: AtomicU64::new(0),
            num_segments: AtomicU32::new(1),
            fail_apply: std::sync::atomic::AtomicBool::new(false),
            apply_delay_ms: AtomicU64::new(0),
        }
    }

    /// Makes every subsequent `apply_batch` fail, to exercise the flush
    /// worker's retry path.
    pub fn set_fail_apply(&self, fail: bool) {
        self.fail_apply.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent `apply_batch` sleep before applying, so tests
    /// can hold a flush "in flight" long enough to observe backpressure.
    pub fn set_apply_delay(&self, delay: Duration) {
        self.apply_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn doc_count(&self) -> usize {
        self.docs.lock().len()
    }
}

impl<D> Default for FakeEngine<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct SnapshotPayload<D> {
    version: u64,
    docs: HashMap<Uid, D>,
}

#[async_trait]
impl<D: Clone + Serialize + DeserializeOwned + Send + Sync + 'static> IndexEngine<D> for FakeEngine<D> {
    async fn apply_batch(&self, batch: &[Indexable<D>]) -> Result<(), CoreError> {
        let delay_ms = self.apply_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
        if self.fail_apply.load(Ordering::SeqCst) {
            return Err(CoreError::EngineIo {
                source: anyhow::anyhow!("fake engine configured to fail apply_batch"),
            });
        }
        let mut docs = self.docs.lock();
        for item in batch {
            match item {
                Indexable::Add { uid, doc } | Indexable::Update { uid, doc } => {
                    docs.insert(*uid, doc.clone());
                },
                Indexable::Delete { uid } => {
                    docs.remove(uid);
                },
            }
        }
        Ok(())
    }

    async fn commit(&self, version: Version) -> Result<(), CoreError> {
        let mut current = self.version.load(Ordering::SeqCst);
        loop {
            if version.0 <= current {
                return Ok(());
            }
            match self.version.compare_exchange_weak(
                current,
                version.0,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    async fn open_reader(&self) -> Result<Arc<dyn IndexReader>, CoreError> {
        let uids: Vec<Uid> = self.docs.lock().keys().copied().collect();
        Ok(Arc::new(FakeReader {
            uids,
            ref_count: AtomicI64::new(0),
        }))
    }

    async fn optimize(&self, target_segments: usize) -> Result<(), CoreError> {
        self.num_segments.store(target_segments.max(1) as u32, Ordering::SeqCst);
        Ok(())
    }

    async fn expunge_deletes(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn clear(&self) -> Result<(), CoreError> {
        self.docs.lock().clear();
        self.version.store(0, Ordering::SeqCst);
        Ok(())
    }

    async fn snapshot_to(&self, sink: &mut (dyn std::io::Write + Send)) -> Result<(), CoreError> {
        let payload = SnapshotPayload {
            version: self.version.load(Ordering::SeqCst),
            docs: self.docs.lock().clone(),
        };
        serde_json::to_writer(sink, &payload)
            .map_err(|e| CoreError::EngineIo { source: anyhow::anyhow!(e) })
    }

    async fn restore_from(
        &self,
        source: &mut (dyn std::io::Read + Send),
    ) -> Result<Version, CoreError> {
        let payload: SnapshotPayload<D> = serde_json::from_reader(source)
            .map_err(|e| CoreError::EngineIo { source: anyhow::anyhow!(e) })?;
        *self.docs.lock() = payload.docs;
        self.version.store(payload.version, Ordering::SeqCst);
        Ok(Version(payload.version))
    }

    fn num_segments(&self) -> usize {
        self.num_segments.load(Ordering::SeqCst) as usize
    }

    fn size_on_disk(&self) -> u64 {
        self.docs.lock().len() as u64 * 128
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn apply_is_upsert_by_uid() {
        let engine: FakeEngine<String> = FakeEngine::new();
        engine
            .apply_batch(&[Indexable::Add { uid: 1, doc: "a".into() }])
            .await
            .unwrap();
        engine
            .apply_batch(&[Indexable::Update { uid: 1, doc: "b".into() }])
            .await
            .unwrap();
        assert_eq!(engine.doc_count(), 1);
        let reader = engine.open_reader().await.unwrap();
        assert_eq!(reader.num_docs(), 1);
    }

    #[tokio::test]
    async fn delete_removes_doc() {
        let engine: FakeEngine<String> = FakeEngine::new();
        engine
            .apply_batch(&[Indexable::Add { uid: 1, doc: "a".into() }])
            .await
            .unwrap();
        engine.apply_batch(&[Indexable::Delete { uid: 1 }]).await.unwrap();
        assert_eq!(engine.doc_count(), 0);
    }

    #[tokio::test]
    async fn refcount_tracks_inc_and_dec() {
        let engine: FakeEngine<String> = FakeEngine::new();
        let reader = engine.open_reader().await.unwrap();
        assert_eq!(reader.ref_count(), 0);
        reader.inc_ref();
        reader.inc_ref();
        assert_eq!(reader.ref_count(), 2);
        reader.dec_ref();
        assert_eq!(reader.ref_count(), 1);
    }
}
