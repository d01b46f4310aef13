//! Status reports.
//!
//! Renders an engine snapshot as the plain-text allocated/free listing or as
//! a machine-readable JSON document.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::Serialize;

use partalloc_core::{ChunkView, EngineStats, RuntimeMode, StatusSnapshot, Strategy};

/// Output format for the final status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Plain,
    Json,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "plain" | "text" => Ok(Self::Plain),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown report format '{other}' (expected plain or json)")),
        }
    }
}

/// Full status document.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub strategy: Strategy,
    pub mode: RuntimeMode,
    pub stats: EngineStats,
    pub allocated: Vec<ChunkView>,
    pub free: Vec<ChunkView>,
}

impl StatusReport {
    #[must_use]
    pub fn new(
        strategy: Strategy,
        mode: RuntimeMode,
        stats: EngineStats,
        status: StatusSnapshot,
    ) -> Self {
        Self {
            strategy,
            mode,
            stats,
            allocated: status.allocated,
            free: status.free,
        }
    }

    /// Allocated/free listing. Free entries omit the stale used size.
    #[must_use]
    pub fn to_plain(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\n----- Allocated List -----");
        for view in &self.allocated {
            let _ = writeln!(
                out,
                "Address: {:#x}, Size: {} bytes, Used: {} bytes",
                view.address, view.requested_size, view.used_size
            );
        }
        let _ = writeln!(out, "\n----- Free List -----");
        for view in &self.free {
            let _ = writeln!(
                out,
                "Address: {:#x}, Size: {} bytes",
                view.address, view.requested_size
            );
        }
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn render(&self, format: ReportFormat) -> Result<String, serde_json::Error> {
        match format {
            ReportFormat::Plain => Ok(self.to_plain()),
            ReportFormat::Json => self.to_json(),
        }
    }
}
