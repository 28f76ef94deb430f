//! `CoreAdmin`: the administrative capability bag of §6/§4.8. A single
//! handle, cheap to clone (every field is itself `Arc`-backed), that reaches
//! into the manager's segment policy, the loader's batch tunables, the
//! cache's freshness/SLA, and the health cell — so a binary exposing these
//! over HTTP/RPC/JMX-equivalent only has to forward calls, never touch
//! internals directly. No transport is assumed here (that's explicitly out
//! of scope); this is just the set of methods such a transport would call.

use std::{sync::Arc, time::Duration, time::Instant, time::SystemTime};

use crate::{
    batched_loader::{BatchedLoader, Loader},
    disk_loader::DiskLoader,
    engine::DirectoryManager,
    error::{CoreError, HealthCode},
    event::{Uid, Version},
    health::SharedHealth,
    manager::SearchIndexManager,
    partition::PartitionId,
    reader_cache::ReaderCacheMaintainer,
};

pub struct CoreAdmin<D> {
    manager: Arc<SearchIndexManager<D>>,
    batched: Arc<BatchedLoader<D>>,
    disk_loader: Arc<DiskLoader<D>>,
    maintainer: Arc<ReaderCacheMaintainer<D>>,
    directory: Arc<dyn DirectoryManager>,
    health: SharedHealth,
    rt_indexing: bool,
}

impl<D: Clone + Send + Sync + 'static> CoreAdmin<D> {
    pub fn new(
        manager: Arc<SearchIndexManager<D>>,
        batched: Arc<BatchedLoader<D>>,
        disk_loader: Arc<DiskLoader<D>>,
        maintainer: Arc<ReaderCacheMaintainer<D>>,
        directory: Arc<dyn DirectoryManager>,
        health: SharedHealth,
        rt_indexing: bool,
    ) -> Self {
        Self {
            manager,
            batched,
            disk_loader,
            maintainer,
            directory,
            health,
            rt_indexing,
        }
    }

    // ---- Getters --------------------------------------------------------

    pub fn current_disk_version(&self) -> Version {
        self.manager.disk_version()
    }

    pub fn mem_a_segment_count(&self) -> usize {
        self.manager.engine_for(PartitionId::MemA).num_segments()
    }

    pub fn mem_b_segment_count(&self) -> usize {
        self.manager.engine_for(PartitionId::MemB).num_segments()
    }

    pub fn disk_segment_count(&self) -> usize {
        self.manager.engine_for(PartitionId::Disk).num_segments()
    }

    pub fn mem_a_version(&self) -> Version {
        self.manager.version_for(PartitionId::MemA)
    }

    pub fn mem_b_version(&self) -> Version {
        self.manager.version_for(PartitionId::MemB)
    }

    pub fn mem_a_size(&self) -> u64 {
        self.manager.engine_for(PartitionId::MemA).size_on_disk()
    }

    pub fn mem_b_size(&self) -> u64 {
        self.manager.engine_for(PartitionId::MemB).size_on_disk()
    }

    pub fn disk_index_size(&self) -> u64 {
        self.manager.engine_for(PartitionId::Disk).size_on_disk()
    }

    pub fn free_disk_bytes(&self) -> Option<u64> {
        self.directory.free_bytes()
    }

    pub fn realtime_mode(&self) -> bool {
        self.rt_indexing
    }

    pub fn last_optimize_time(&self) -> Option<Instant> {
        self.disk_loader.last_optimize_time()
    }

    pub fn last_modified_time(&self) -> SystemTime {
        self.directory.last_index_modified_time()
    }

    pub fn current_mem_batch_size(&self) -> usize {
        self.batched.current_mem_batch_size()
    }

    pub fn current_disk_batch_size(&self) -> usize {
        self.batched.current_disk_batch_size()
    }

    /// Smallest/largest UID visible across all three partitions combined.
    pub async fn uid_range(&self) -> Result<Option<(Uid, Uid)>, CoreError> {
        self.manager.uid_range().await
    }

    pub fn freshness(&self) -> Duration {
        self.maintainer.freshness()
    }

    pub fn sla(&self) -> Duration {
        self.maintainer.cache().sla()
    }

    pub fn health_code(&self) -> HealthCode {
        self.health.code()
    }

    // ---- Setters --------------------------------------------------------

    pub fn set_batch_size(&self, batch_size: usize) {
        self.batched.set_batch_size(batch_size);
    }

    pub fn set_batch_delay(&self, batch_delay: Duration) {
        self.batched.set_batch_delay(batch_delay);
    }

    pub fn set_max_batch_size(&self, max_batch_size: usize) {
        self.batched.set_max_batch_size(max_batch_size);
    }

    pub fn set_merge_factor(&self, merge_factor: u32) {
        self.manager.segment_policy.write().merge_factor = merge_factor.max(1);
    }

    pub fn set_max_merge_docs(&self, max_merge_docs: u32) {
        self.manager.segment_policy.write().max_merge_docs = max_merge_docs;
    }

    pub fn set_use_compound_file(&self, use_compound_file: bool) {
        self.manager.segment_policy.write().use_compound_file = use_compound_file;
    }

    pub fn set_num_large_segments(&self, num_large_segments: usize) {
        self.manager.segment_policy.write().num_large_segments = num_large_segments.max(1);
    }

    pub fn set_max_small_segments(&self, max_small_segments: usize) {
        self.manager.segment_policy.write().max_small_segments = max_small_segments;
    }

    pub fn set_freshness(&self, freshness: Duration) {
        self.maintainer.set_freshness(freshness);
    }

    pub fn set_sla(&self, sla: Duration) {
        self.maintainer.cache().set_sla(sla);
    }

    // ---- Commands ---------------------------------------------------------

    pub async fn refresh_disk_reader(&self, timeout: Duration) -> Result<(), CoreError> {
        self.maintainer.refresh_cache(timeout).await
    }

    pub async fn flush_to_disk_index(&self, timeout: Duration) -> Result<(), CoreError> {
        self.batched.flush_events(timeout).await
    }

    pub async fn flush_to_memory_index(&self) -> Result<(), CoreError> {
        self.batched.flush_to_memory().await
    }

    pub async fn optimize(&self, target_segments: usize) -> Result<(), CoreError> {
        self.disk_loader.optimize(target_segments).await
    }

    pub async fn expunge_deletes(&self) -> Result<(), CoreError> {
        self.disk_loader.expunge_deletes().await
    }

    pub async fn purge_index(&self) -> Result<(), CoreError> {
        self.manager.purge().await
    }

    pub fn reset_health(&self) {
        self.health.reset();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        batched_loader::LoaderConfig, event::Indexable, listener::ListenerRegistry,
        reader_cache::ReaderCache, testing::fake_directory::FakeDirectoryManager,
        testing::fake_engine::FakeEngine,
    };

    fn admin() -> (Arc<SearchIndexManager<String>>, CoreAdmin<String>) {
        let manager = Arc::new(SearchIndexManager::new(
            Arc::new(FakeEngine::new()),
            Arc::new(FakeEngine::new()),
            Arc::new(FakeEngine::new()),
            Version::ZERO,
        ));
        let disk_loader = Arc::new(DiskLoader::new(Arc::clone(&manager), 1, 1000));
        let batched = BatchedLoader::new(
            Arc::clone(&manager),
            Arc::clone(&disk_loader),
            LoaderConfig::new(1000, 2000, Duration::from_secs(300)),
            SharedHealth::new(),
            Arc::new(ListenerRegistry::new()),
        );
        let cache = Arc::new(ReaderCache::new(Duration::from_millis(3)));
        let maintainer = ReaderCacheMaintainer::new(Arc::clone(&manager), cache, Duration::from_millis(50));
        let directory: Arc<dyn DirectoryManager> =
            Arc::new(FakeDirectoryManager::new("/tmp/fake-index", Version::ZERO, true));
        let admin = CoreAdmin::new(
            Arc::clone(&manager),
            batched,
            disk_loader,
            maintainer,
            directory,
            SharedHealth::new(),
            false,
        );
        (manager, admin)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn setters_are_visible_through_getters() {
        let (_manager, admin) = admin();
        admin.set_merge_factor(25);
        admin.set_sla(Duration::from_millis(7));
        admin.set_freshness(Duration::from_millis(123));
        assert_eq!(admin.sla(), Duration::from_millis(7));
        assert_eq!(admin.freshness(), Duration::from_millis(123));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn flush_to_memory_index_makes_staged_events_visible() {
        let (manager, admin) = admin();
        admin
            .batched
            .consume(vec![Indexable::Add { uid: 1, doc: "a".into() }], Version(1))
            .await
            .unwrap();
        admin.flush_to_memory_index().await.unwrap();
        let snapshot = manager.get_index_readers().await.unwrap();
        assert_eq!(snapshot.readers[1].num_docs(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn purge_resets_everything() {
        let (manager, admin) = admin();
        admin
            .batched
            .consume(vec![Indexable::Add { uid: 1, doc: "a".into() }], Version(1))
            .await
            .unwrap();
        admin.batched.flush_events(Duration::from_secs(5)).await.unwrap();
        assert_eq!(manager.disk_version(), Version(1));
        admin.purge_index().await.unwrap();
        assert_eq!(admin.current_disk_version(), Version::ZERO);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn health_resets_via_admin_command() {
        let (_manager, admin) = admin();
        admin.health.record_failure();
        admin.health.record_failure();
        admin.health.record_failure();
        assert_eq!(admin.health_code(), HealthCode::Fatal);
        admin.reset_health();
        assert_eq!(admin.health_code(), HealthCode::Ok);
    }
}
