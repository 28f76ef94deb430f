//! An immutable, ordered grouping of reference-counted readers: one per
//! partition that currently serves reads, Disk first.

use std::sync::Arc;

use crate::engine::IndexReader;

#[derive(Clone)]
pub struct ReaderSnapshot {
    /// [Disk readers ..., active-memory readers ...], pre-incremented.
    pub readers: Vec<Arc<dyn IndexReader>>,
}

impl ReaderSnapshot {
    pub fn empty() -> Self {
        Self {
            readers: Vec::new(),
        }
    }

    pub fn inc_ref_all(&self) {
        for r in &self.readers {
            r.inc_ref();
        }
    }

    pub fn dec_ref_all(&self) {
        for r in &self.readers {
            r.dec_ref();
        }
    }
}
