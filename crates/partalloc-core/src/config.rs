//! Engine configuration and runtime mode.
//!
//! The runtime mode is set via the `PARTALLOC_MODE` environment variable:
//! - `strict` (default): reference behavior. An explicit free leaves the
//!   allocation history untouched, and an invalid free is fatal under the
//!   default driver policy.
//! - `hardened`: an explicit free also purges the handle from the
//!   allocation history, and drivers treat an invalid free as recoverable.

use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::size_class::{PARTITION_SIZES, SizeClassifier};
use crate::strategy::Strategy;

/// Environment variable consulted by [`runtime_mode`].
pub const MODE_ENV_VAR: &str = "PARTALLOC_MODE";

/// Free chunks created per partition class at startup.
pub const DEFAULT_PREPOPULATE_PER_CLASS: usize = 5;

/// Lifecycle records an engine retains before dropping the oldest.
pub const DEFAULT_LOG_CAPACITY: usize = 1024;

/// Runtime operating mode for the engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    /// Reference semantics, stale history after explicit frees.
    #[default]
    Strict,
    /// History is purged on explicit free; invalid free is recoverable.
    Hardened,
}

impl RuntimeMode {
    /// Parse from string (case-insensitive). Unknown values map to `Strict`.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "hardened" | "safe" | "purge" => Self::Hardened,
            _ => Self::Strict,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Strict => "strict",
            Self::Hardened => "hardened",
        }
    }

    /// Whether an explicit free purges the handle from the history.
    #[must_use]
    pub const fn purges_history(self) -> bool {
        matches!(self, Self::Hardened)
    }

    /// Whether an invalid free should end the run.
    #[must_use]
    pub const fn invalid_free_is_fatal(self) -> bool {
        matches!(self, Self::Strict)
    }
}

impl FromStr for RuntimeMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" | "default" | "reference" => Ok(Self::Strict),
            "hardened" | "safe" | "purge" => Ok(Self::Hardened),
            _ => Err(ConfigError::UnknownMode(s.to_string())),
        }
    }
}

// 0 = unresolved, 1 = Strict, 2 = Hardened.
static CACHED_MODE: AtomicU8 = AtomicU8::new(0);

const MODE_UNRESOLVED: u8 = 0;
const MODE_STRICT: u8 = 1;
const MODE_HARDENED: u8 = 2;

fn mode_to_u8(mode: RuntimeMode) -> u8 {
    match mode {
        RuntimeMode::Strict => MODE_STRICT,
        RuntimeMode::Hardened => MODE_HARDENED,
    }
}

fn u8_to_mode(v: u8) -> RuntimeMode {
    match v {
        MODE_HARDENED => RuntimeMode::Hardened,
        _ => RuntimeMode::Strict,
    }
}

/// Configured runtime mode (reads the env var on first call, cached thereafter).
#[must_use]
pub fn runtime_mode() -> RuntimeMode {
    let cached = CACHED_MODE.load(Ordering::Relaxed);
    if cached != MODE_UNRESOLVED {
        return u8_to_mode(cached);
    }
    let mode = std::env::var(MODE_ENV_VAR)
        .map(|v| RuntimeMode::from_str_loose(&v))
        .unwrap_or_default();
    CACHED_MODE.store(mode_to_u8(mode), Ordering::Release);
    mode
}

/// Engine construction parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Ascending partition classes.
    pub partition_sizes: Vec<usize>,
    /// Free chunks reserved per class at startup.
    pub prepopulate_per_class: usize,
    /// Strategy used by [`AllocatorEngine::allocate`](crate::AllocatorEngine::allocate).
    pub strategy: Strategy,
    pub mode: RuntimeMode,
    /// Retained lifecycle records. Zero disables collection.
    pub log_capacity: usize,
}

impl EngineConfig {
    /// Default table with no pre-population.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            prepopulate_per_class: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: RuntimeMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_prepopulate(mut self, per_class: usize) -> Self {
        self.prepopulate_per_class = per_class;
        self
    }

    #[must_use]
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity;
        self
    }

    #[must_use]
    pub fn with_partition_sizes(mut self, sizes: Vec<usize>) -> Self {
        self.partition_sizes = sizes;
        self
    }

    /// Validates the partition table and returns its classifier.
    pub fn classifier(&self) -> Result<SizeClassifier, ConfigError> {
        SizeClassifier::new(&self.partition_sizes)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            partition_sizes: PARTITION_SIZES.to_vec(),
            prepopulate_per_class: DEFAULT_PREPOPULATE_PER_CLASS,
            strategy: Strategy::FirstFit,
            mode: runtime_mode(),
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}
