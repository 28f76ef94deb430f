//! A fake [`DirectoryManager`] backed by fields set at construction, so
//! tests can simulate "recovering `getVersion()` after a restart" without a
//! real filesystem.

use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::SystemTime,
};

use crate::{engine::DirectoryManager, event::Version};

pub struct FakeDirectoryManager {
    path: PathBuf,
    version: AtomicU64,
    modified_at: SystemTime,
    exists: bool,
}

impl FakeDirectoryManager {
    pub fn new(path: impl Into<PathBuf>, version: Version, exists: bool) -> Self {
        Self {
            path: path.into(),
            version: AtomicU64::new(version.0),
            modified_at: SystemTime::now(),
            exists,
        }
    }

    pub fn set_version(&self, version: Version) {
        self.version.store(version.0, Ordering::SeqCst);
    }
}

impl DirectoryManager for FakeDirectoryManager {
    fn path(&self) -> &Path {
        &self.path
    }

    fn version(&self) -> Version {
        Version(self.version.load(Ordering::SeqCst))
    }

    fn last_index_modified_time(&self) -> SystemTime {
        self.modified_at
    }

    fn exists(&self) -> bool {
        self.exists
    }
}
