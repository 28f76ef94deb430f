//! The three-partition hand-off: a tagged-variant partition with explicit
//! ACTIVE/FLUSHING states and an atomic swap operation, per the redesign
//! note in the design rationale — no global mutable "current" pointer
//! except behind the `SearchIndexManager`'s lock.

use std::sync::Arc;

use crate::{engine::IndexEngine, event::Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartitionId {
    Disk,
    MemA,
    MemB,
}

impl PartitionId {
    pub fn other_mem(self) -> PartitionId {
        match self {
            PartitionId::MemA => PartitionId::MemB,
            PartitionId::MemB => PartitionId::MemA,
            PartitionId::Disk => panic!("Disk has no counterpart memory partition"),
        }
    }
}

impl std::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionId::Disk => write!(f, "disk"),
            PartitionId::MemA => write!(f, "mem-a"),
            PartitionId::MemB => write!(f, "mem-b"),
        }
    }
}

/// `EMPTY -writes-> ACTIVE -swap-> FLUSHING -commit-> EMPTY`, with a
/// `FLUSHING -fail-> FLUSHING` self-loop for retry. The Disk partition has
/// no state of its own (it's conceptually always "active" as the durable
/// tier) and is modeled separately from the two memory partitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    Empty,
    Active,
    Flushing,
}

/// One partition: an engine instance plus the highest version it has
/// absorbed. `version` for a Mem partition tracks what's been applied to
/// its engine; for Disk it tracks the last committed version.
pub struct Partition<D> {
    pub id: PartitionId,
    pub engine: Arc<dyn IndexEngine<D>>,
    pub state: PartitionState,
    pub version: Version,
}

impl<D> Partition<D> {
    pub fn new(id: PartitionId, engine: Arc<dyn IndexEngine<D>>, state: PartitionState) -> Self {
        Self {
            id,
            engine,
            state,
            version: Version::ZERO,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.state, PartitionState::Empty)
    }
}

impl<D> std::fmt::Debug for Partition<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("version", &self.version)
            .finish()
    }
}
