//! A cheaply-cloneable handle around the process-wide [`Health`] cell so it
//! can be shared between the flush worker, the admin surface, and tests
//! without each caller having to know it's reference-counted.

use std::sync::Arc;

use crate::error::{Health, HealthCode};

#[derive(Clone)]
pub struct SharedHealth(Arc<Health>);

impl SharedHealth {
    pub fn new() -> Self {
        Self(Arc::new(Health::new()))
    }

    pub fn code(&self) -> HealthCode {
        self.0.code()
    }

    pub fn record_success(&self) {
        self.0.record_success();
    }

    pub fn record_failure(&self) {
        self.0.record_failure();
    }

    pub fn reset(&self) {
        self.0.reset();
    }
}

impl Default for SharedHealth {
    fn default() -> Self {
        Self::new()
    }
}
