//! The `Config` struct: the serde-deserializable realization of §6's
//! configuration object. `analyzer`/`similarity`/`docidMapperFactory`/
//! `versionComparator` are engine/interpreter concerns represented by the
//! core's generic type parameters and trait objects, not by fields here.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{error::CoreError, manager::SegmentPolicy};

fn default_batch_size() -> usize {
    1000
}

fn default_max_batch_size() -> usize {
    2000
}

fn default_batch_delay_ms() -> u64 {
    300_000
}

fn default_rt_indexing() -> bool {
    true
}

fn default_freshness_ms() -> u64 {
    10_000
}

fn default_sla_ms() -> u64 {
    3
}

fn default_num_large_segments() -> usize {
    1
}

fn default_max_small_segments() -> usize {
    4
}

fn default_merge_factor() -> u32 {
    10
}

fn default_max_merge_docs() -> u32 {
    u32::MAX
}

fn default_use_compound_file() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    #[serde(default = "default_rt_indexing")]
    pub rt_indexing: bool,
    #[serde(default = "default_freshness_ms")]
    pub freshness_ms: u64,
    #[serde(default = "default_sla_ms")]
    pub sla_ms: u64,
    #[serde(default = "default_num_large_segments")]
    pub num_large_segments: usize,
    #[serde(default = "default_max_small_segments")]
    pub max_small_segments: usize,
    #[serde(default = "default_merge_factor")]
    pub merge_factor: u32,
    #[serde(default = "default_max_merge_docs")]
    pub max_merge_docs: u32,
    #[serde(default = "default_use_compound_file")]
    pub use_compound_file: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_batch_size: default_max_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            rt_indexing: default_rt_indexing(),
            freshness_ms: default_freshness_ms(),
            sla_ms: default_sla_ms(),
            num_large_segments: default_num_large_segments(),
            max_small_segments: default_max_small_segments(),
            merge_factor: default_merge_factor(),
            max_merge_docs: default_max_merge_docs(),
            use_compound_file: default_use_compound_file(),
        }
    }
}

impl Config {
    /// Called by every constructor that takes a `Config`. `batch_size`/
    /// `max_batch_size` clamping happens in `LoaderConfig::new`, not here —
    /// this only rejects combinations that can't be repaired by clamping.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.num_large_segments == 0 {
            return Err(CoreError::config_error("num_large_segments must be >= 1"));
        }
        if self.merge_factor == 0 {
            return Err(CoreError::config_error("merge_factor must be >= 1"));
        }
        if self.sla_ms == 0 {
            return Err(CoreError::config_error("sla_ms must be >= 1"));
        }
        Ok(())
    }

    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn freshness(&self) -> Duration {
        Duration::from_millis(self.freshness_ms)
    }

    pub fn sla(&self) -> Duration {
        Duration::from_millis(self.sla_ms)
    }

    pub fn segment_policy(&self) -> SegmentPolicy {
        SegmentPolicy {
            num_large_segments: self.num_large_segments,
            max_small_segments: self.max_small_segments,
            merge_factor: self.merge_factor,
            max_merge_docs: self.max_merge_docs,
            use_compound_file: self.use_compound_file,
        }
    }
}
