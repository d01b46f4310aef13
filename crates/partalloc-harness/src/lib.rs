//! Driver tooling for the partalloc engine.
//!
//! This crate provides:
//! - Script parsing: the `alloc: <bytes>` / `dealloc` command stream
//! - Script driver: runs commands against an engine under a fatal-error policy
//! - Status reports: plain-text and JSON renderings of the pool
//! - Structured logging: JSONL records for every engine decision

#![forbid(unsafe_code)]

pub mod driver;
pub mod report;
pub mod script;
pub mod structured_log;

pub use driver::{DriverError, FatalPolicy, RunSummary, ScriptDriver};
pub use report::{ReportFormat, StatusReport};
pub use script::{Command, Script, ScriptError};
