//! Core of a real-time search-indexing system: ingests versioned update
//! events, maintains two in-memory index partitions and one disk partition,
//! and exposes refcounted reader snapshots to searchers.
//!
//! The moving parts, top to bottom:
//! - [`event`] / [`engine`] / [`partition`] / [`snapshot`]: the data model
//!   and the collaborator traits (engine, directory, interpreter) a host
//!   plugs in.
//! - [`manager`]: owns the three partitions and the atomic active/flushing
//!   swap.
//! - [`batched_loader`] / [`realtime_loader`] / [`disk_loader`]: the
//!   producer-facing pipeline and the mem-to-disk flush path.
//! - [`reader_cache`]: the published snapshot searchers actually read, kept
//!   fresh by a background maintainer.
//! - [`consumer`]: the async front end producers call into.
//! - [`admin`]: the operator-facing capability bag.
//! - [`config`]: validated, serde-deserializable tunables.
//! - [`listener`] / [`error`]: cross-cutting event hooks and error/health
//!   types.

pub mod admin;
pub mod batched_loader;
pub mod config;
pub mod consumer;
pub mod disk_loader;
pub mod engine;
pub mod error;
pub mod event;
pub mod health;
pub mod listener;
pub mod manager;
pub mod partition;
pub mod reader_cache;
pub mod realtime_loader;
pub mod snapshot;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use admin::CoreAdmin;
pub use batched_loader::{BatchedLoader, Loader, LoaderConfig};
pub use config::Config;
pub use consumer::AsyncConsumerFront;
pub use disk_loader::DiskLoader;
pub use engine::{DirectoryManager, IndexEngine, IndexReader, Interpreter};
pub use error::{CoreError, Health, HealthCode};
pub use event::{EventBatch, Indexable, Uid, Version};
pub use health::SharedHealth;
pub use listener::{IndexListener, ListenerRegistry};
pub use manager::{FlushOutcome, SearchIndexManager, SegmentPolicy};
pub use partition::{Partition, PartitionId, PartitionState};
pub use reader_cache::{ReaderCache, ReaderCacheMaintainer};
pub use realtime_loader::RealtimeLoader;
pub use snapshot::ReaderSnapshot;
