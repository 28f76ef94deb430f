//! Error kinds and the process-wide health indicator.
//!
//! `CoreError` realizes the semantic error kinds of the error handling
//! design: barrier timeouts, the closed-consumer case, engine/directory I/O
//! failures, corrupt snapshot imports, and construction-time config errors.
//! Internal plumbing that doesn't need a typed error (the fake test engine,
//! glue code) is free to use `anyhow::Result` and attach a `CoreError` as
//! context via `.context(...)`.

use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("flushEvents timed out before all enqueued events were absorbed")]
    FlushTimeout,

    #[error("refreshCache timed out waiting for a newer snapshot to publish")]
    RefreshTimeout,

    #[error("syncWithVersion timed out waiting for version {requested} (last absorbed {absorbed})")]
    SyncTimeout { requested: u64, absorbed: u64 },

    #[error("consumer is shut down and no longer accepts events")]
    ConsumerClosed,

    #[error("engine or directory I/O failed: {source}")]
    EngineIo {
        #[source]
        source: anyhow::Error,
    },

    #[error("snapshot import failed integrity check: {reason}")]
    InvalidSnapshot { reason: String },

    #[error("invalid configuration: {reason}")]
    ConfigError { reason: String },
}

impl CoreError {
    pub fn engine_io(source: impl Into<anyhow::Error>) -> Self {
        CoreError::EngineIo {
            source: source.into(),
        }
    }

    pub fn invalid_snapshot(reason: impl Into<String>) -> Self {
        CoreError::InvalidSnapshot {
            reason: reason.into(),
        }
    }

    pub fn config_error(reason: impl Into<String>) -> Self {
        CoreError::ConfigError {
            reason: reason.into(),
        }
    }

    /// Whether the failure is expected to clear on its own if retried
    /// (an `EngineIo` failure keeps the responsible partition around for
    /// retry), as opposed to a barrier timeout or a closed consumer, which
    /// are terminal to the specific call that observed them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::EngineIo { .. })
    }
}

/// Process-wide health code, readable and resettable through the
/// administrative surface. Updated to `Fatal` on repeated `EngineIo`
/// failures; never downgraded except via an explicit `reset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthCode {
    Ok,
    Warn,
    Fatal,
}

impl fmt::Display for HealthCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthCode::Ok => write!(f, "OK"),
            HealthCode::Warn => write!(f, "WARN"),
            HealthCode::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Shared, lock-free-to-read health cell. A run of consecutive engine I/O
/// failures escalates `Ok -> Warn -> Fatal`; any successful flush resets it
/// to `Ok`. `resetHealth` (the admin command) forces it back to `Ok`.
#[derive(Debug)]
pub struct Health {
    code: std::sync::atomic::AtomicU8,
    consecutive_failures: std::sync::atomic::AtomicU32,
}

const FATAL_AFTER_CONSECUTIVE_FAILURES: u32 = 3;

impl Default for Health {
    fn default() -> Self {
        Self {
            code: std::sync::atomic::AtomicU8::new(0),
            consecutive_failures: std::sync::atomic::AtomicU32::new(0),
        }
    }
}

impl Health {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(&self) -> HealthCode {
        match self.code.load(std::sync::atomic::Ordering::Relaxed) {
            0 => HealthCode::Ok,
            1 => HealthCode::Warn,
            _ => HealthCode::Fatal,
        }
    }

    pub fn record_success(&self) {
        self.consecutive_failures
            .store(0, std::sync::atomic::Ordering::Relaxed);
        self.code.store(0, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        let failures = self
            .consecutive_failures
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1;
        let code = if failures >= FATAL_AFTER_CONSECUTIVE_FAILURES {
            2
        } else {
            1
        };
        self.code.store(code, std::sync::atomic::Ordering::Relaxed);
        tracing::error!(failures, code = %self.code(), "engine I/O failure recorded");
    }

    pub fn reset(&self) {
        tracing::info!("health reset requested via admin surface");
        self.record_success();
    }
}
