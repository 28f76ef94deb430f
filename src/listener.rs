//! Event listener hooks, fired on successful memory apply, successful disk
//! flush, and on errors. Listeners are invoked in registration order;
//! a listener that panics or returns an error is caught and logged, never
//! propagated to the pipeline.

use std::panic::{catch_unwind, AssertUnwindSafe};

use parking_lot::RwLock;

use crate::{error::CoreError, event::Version};

pub trait IndexListener: Send + Sync {
    fn on_memory_apply(&self, _version: Version) {}
    fn on_disk_flush(&self, _version: Version) {}
    fn on_error(&self, _error: &CoreError) {}
}

#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<Box<dyn IndexListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Box<dyn IndexListener>) {
        self.listeners.write().push(listener);
    }

    pub fn fire_memory_apply(&self, version: Version) {
        for listener in self.listeners.read().iter() {
            if catch_unwind(AssertUnwindSafe(|| listener.on_memory_apply(version))).is_err() {
                tracing::warn!("memory-apply listener panicked");
            }
        }
    }

    pub fn fire_disk_flush(&self, version: Version) {
        for listener in self.listeners.read().iter() {
            if catch_unwind(AssertUnwindSafe(|| listener.on_disk_flush(version))).is_err() {
                tracing::warn!("disk-flush listener panicked");
            }
        }
    }

    pub fn fire_error(&self, error: &CoreError) {
        for listener in self.listeners.read().iter() {
            if catch_unwind(AssertUnwindSafe(|| listener.on_error(error))).is_err() {
                tracing::warn!("error listener panicked");
            }
        }
    }
}
