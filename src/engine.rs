//! The external collaborators this core consumes, modeled as traits rather
//! than as host-specific management beans: the inverted-index engine, the
//! persistence directory, and the document interpreter. None of these are
//! implemented here (see `testing` for in-memory fakes used by the test
//! suite) — production binaries plug in a real engine (segments, merges,
//! analyzers, similarity), a real directory (local disk, object storage),
//! and a real interpreter.

use std::{path::Path, sync::Arc, time::SystemTime};

use async_trait::async_trait;

use crate::{error::CoreError, event::Indexable};

/// A single immutable reader handle, reference-counted by the engine.
/// `getIndexReaders` hands out readers pre-incremented; callers release
/// them through `returnIndexReaders`, never by calling `dec_ref` directly.
pub trait IndexReader: Send + Sync + std::fmt::Debug {
    fn inc_ref(&self);
    fn dec_ref(&self);
    /// Current reference count. Exposed for tests verifying invariant 2
    /// (every handed-out reader is released exactly once).
    fn ref_count(&self) -> i64;
    fn num_docs(&self) -> usize;
    /// Smallest/largest UID visible through this reader, if any documents
    /// are present. Backs the admin surface's min/max UID getters.
    fn uid_range(&self) -> Option<(crate::event::Uid, crate::event::Uid)>;
}

/// An inverted-index writer/reader pair for a single partition. One engine
/// instance backs each of {Disk, Mem-A, Mem-B}.
#[async_trait]
pub trait IndexEngine<D>: Send + Sync {
    /// Apply a batch of adds/updates/deletes. Applying the same UID twice
    /// (e.g. because a realtime-applied batch is re-applied during disk
    /// flush) must be idempotent — last write for a UID wins.
    async fn apply_batch(&self, batch: &[Indexable<D>]) -> Result<(), CoreError>;

    /// Durably commit everything applied so far under the given version.
    async fn commit(&self, version: crate::event::Version) -> Result<(), CoreError>;

    async fn open_reader(&self) -> Result<Arc<dyn IndexReader>, CoreError>;

    /// Merge segments down to at most `target_segments`.
    async fn optimize(&self, target_segments: usize) -> Result<(), CoreError>;

    /// Force removal of tombstoned documents.
    async fn expunge_deletes(&self) -> Result<(), CoreError>;

    /// Discard all content; used by `purgeIndex` and by the disk loader
    /// after a successful mem-to-disk flush to reset the flushed partition.
    async fn clear(&self) -> Result<(), CoreError>;

    /// Byte-stream a consistent snapshot of this engine's committed state.
    async fn snapshot_to(&self, sink: &mut (dyn std::io::Write + Send)) -> Result<(), CoreError>;

    /// Replace this engine's content atomically from a byte stream
    /// produced by `snapshot_to`, returning the version embedded in the
    /// snapshot. Must fail atomically: a corrupt source leaves the
    /// engine's prior state untouched.
    async fn restore_from(
        &self,
        source: &mut (dyn std::io::Read + Send),
    ) -> Result<crate::event::Version, CoreError>;

    fn num_segments(&self) -> usize;
    fn size_on_disk(&self) -> u64;
}

/// Opens, commits, and enumerates the persistent storage backing the Disk
/// partition.
pub trait DirectoryManager: Send + Sync {
    fn path(&self) -> &Path;
    /// The last version committed to disk, independent of any in-process
    /// state — used to recover `getVersion()` after a restart.
    fn version(&self) -> crate::event::Version;
    fn last_index_modified_time(&self) -> SystemTime;
    fn exists(&self) -> bool;
    /// Free bytes on the volume backing `path()`, if the concrete directory
    /// implementation knows how to ask (host filesystem introspection is
    /// out of scope for this core — see §6 — so the default is "unknown"
    /// rather than a guess).
    fn free_bytes(&self) -> Option<u64> {
        None
    }
}

/// Turns a caller-supplied value into an `Indexable`. Out of scope: what a
/// "document" concretely is, analyzers, similarity — the interpreter only
/// has to produce a stable UID and an add/update/delete flag.
pub trait Interpreter<E, D>: Send + Sync {
    fn interpret(&self, value: E) -> Result<Indexable<D>, CoreError>;
}
