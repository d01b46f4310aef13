//! Structured engine lifecycle records.
//!
//! The engine appends one record per decision. Records carry a snapshot of
//! the pool counts so a log can be replayed without the engine.

use serde::Serialize;

use crate::region::RegionHandle;

/// Engine lifecycle log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl EngineLogLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Structured engine lifecycle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineLogRecord {
    /// Monotonic decision/event id.
    pub decision_id: u64,
    /// Correlation id for this record.
    pub trace_id: String,
    pub level: EngineLogLevel,
    /// API symbol (`allocate`, `deallocate`, `prepopulate`).
    pub symbol: &'static str,
    /// Event kind (`alloc_reuse`, `alloc_fresh`, `free`, ...).
    pub event: &'static str,
    /// Region involved in the event.
    pub handle: Option<RegionHandle>,
    /// Caller-requested size involved in the event.
    pub size: Option<usize>,
    /// Reservation size the request classified to.
    pub class: Option<usize>,
    /// Machine-readable outcome label.
    pub outcome: &'static str,
    /// Free-form details for debugging.
    pub details: String,
    /// Snapshot: chunks in the allocated set.
    pub allocated_count: usize,
    /// Snapshot: chunks in the free set.
    pub free_count: usize,
}
