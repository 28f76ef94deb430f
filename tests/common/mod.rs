//! Shared harness for the end-to-end scenario tests under `tests/`: wires a
//! full pipeline (manager, batched/realtime loader, async consumer front,
//! reader cache + maintainer) out of the in-memory fakes, the same way a
//! real binary would wire the crate's public types together.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use realtime_index_core::{
    engine::IndexEngine,
    testing::{fake_engine::FakeEngine, fake_interpreter::PassthroughInterpreter},
    AsyncConsumerFront, BatchedLoader, DiskLoader, Indexable, ListenerRegistry, Loader,
    LoaderConfig, ReaderCache, ReaderCacheMaintainer, RealtimeLoader, SearchIndexManager,
    SharedHealth, Version,
};

pub struct Harness {
    pub manager: Arc<SearchIndexManager<String>>,
    pub batched: Arc<BatchedLoader<String>>,
    pub consumer: Arc<AsyncConsumerFront<Indexable<String>, String>>,
    pub maintainer: Arc<ReaderCacheMaintainer<String>>,
    pub disk_engine: Arc<FakeEngine<String>>,
}

/// `realtime` picks Realtime vs. plain Batched loader; the remaining
/// parameters are passed straight through to the loader config and the
/// maintainer's freshness cadence.
pub fn build(
    realtime: bool,
    batch_size: usize,
    max_batch_size: usize,
    batch_delay: Duration,
    freshness: Duration,
) -> Harness {
    let disk_engine = Arc::new(FakeEngine::new());
    let manager = Arc::new(SearchIndexManager::new(
        Arc::clone(&disk_engine) as Arc<dyn IndexEngine<String>>,
        Arc::new(FakeEngine::new()),
        Arc::new(FakeEngine::new()),
        Version::ZERO,
    ));
    let disk_loader = Arc::new(DiskLoader::new(Arc::clone(&manager), 1, 1_000_000));
    let batched = BatchedLoader::new(
        Arc::clone(&manager),
        disk_loader,
        LoaderConfig::new(batch_size, max_batch_size, batch_delay),
        SharedHealth::new(),
        Arc::new(ListenerRegistry::new()),
    );
    let loader: Arc<dyn Loader<String>> = if realtime {
        Arc::new(RealtimeLoader::new(Arc::clone(&batched)))
    } else {
        Arc::clone(&batched)
    };
    let cache = Arc::new(ReaderCache::new(Duration::from_millis(3)));
    let maintainer = ReaderCacheMaintainer::new(Arc::clone(&manager), cache, freshness);
    let consumer = Arc::new(AsyncConsumerFront::new(
        loader,
        Arc::new(PassthroughInterpreter),
        Arc::clone(&maintainer),
    ));
    Harness {
        manager,
        batched,
        consumer,
        maintainer,
        disk_engine,
    }
}
