//! Script driver.
//!
//! Runs parsed commands against an engine, narrates each step, forwards the
//! engine's lifecycle records to the structured log, and decides which
//! errors end the run.

use std::io::Write;

use thiserror::Error;

use partalloc_core::{
    AllocError, AllocatorEngine, DeallocError, Placement, RegionSource, RuntimeMode,
};

use crate::report::StatusReport;
use crate::script::{Command, Script};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel};

/// Process exit status used for fatal errors.
pub const EXIT_FAILURE: i32 = 1;

/// What to do with fatal-class errors.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FatalPolicy {
    /// Stop at the first fatal error (reference behavior).
    #[default]
    Abort,
    /// Report fatal errors and keep going.
    Continue,
}

/// Error produced by one command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Alloc(#[from] AllocError),
    #[error(transparent)]
    Dealloc(#[from] DeallocError),
    /// Narration or diagnostics could not be written.
    #[error("output: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DriverError {
    /// A fatal error under [`FatalPolicy::Abort`].
    #[error("command {index} ({command}) failed: {source}")]
    Fatal {
        index: usize,
        command: Command,
        #[source]
        source: CommandError,
    },
    #[error("output: {0}")]
    Io(#[from] std::io::Error),
}

impl DriverError {
    /// Exit status for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        EXIT_FAILURE
    }
}

/// Counters for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub commands: usize,
    pub allocations: usize,
    pub deallocations: usize,
    /// Errors that were reported and skipped.
    pub recovered_errors: usize,
}

/// Drives an engine from a script.
pub struct ScriptDriver<S> {
    engine: AllocatorEngine<S>,
    policy: FatalPolicy,
    emitter: Option<LogEmitter>,
}

impl<S: RegionSource> ScriptDriver<S> {
    #[must_use]
    pub fn new(engine: AllocatorEngine<S>, policy: FatalPolicy) -> Self {
        Self {
            engine,
            policy,
            emitter: None,
        }
    }

    /// Forwards lifecycle records to `emitter`.
    #[must_use]
    pub fn with_emitter(mut self, emitter: LogEmitter) -> Self {
        self.emitter = Some(emitter);
        self
    }

    #[must_use]
    pub fn engine(&self) -> &AllocatorEngine<S> {
        &self.engine
    }

    /// Engine access between runs, e.g. for explicit frees.
    pub fn engine_mut(&mut self) -> &mut AllocatorEngine<S> {
        &mut self.engine
    }

    /// Whether `error` ends the run under the current policy and mode.
    ///
    /// Output failures always end the run.
    #[must_use]
    pub fn is_fatal(&self, error: &CommandError) -> bool {
        match error {
            CommandError::Io(_) => true,
            _ if self.policy == FatalPolicy::Continue => false,
            CommandError::Alloc(err) => err.is_fatal(),
            CommandError::Dealloc(err @ DeallocError::InvalidFree { .. }) => {
                err.is_fatal() && self.engine.mode().invalid_free_is_fatal()
            }
            CommandError::Dealloc(err) => err.is_fatal(),
        }
    }

    fn mode(&self) -> RuntimeMode {
        self.engine.mode()
    }

    fn emit(&mut self, entry: LogEntry) -> std::io::Result<()> {
        let mode = self.mode().as_str();
        let strategy = self.engine.strategy().as_str();
        if let Some(emitter) = self.emitter.as_mut() {
            emitter.emit_entry(entry.with_mode(mode).with_strategy(strategy))?;
        }
        Ok(())
    }

    /// Drains engine records into the log, tagged with the command index.
    fn flush_engine_logs(&mut self, index: Option<usize>) -> std::io::Result<()> {
        let records = self.engine.drain_logs();
        if self.emitter.is_none() {
            return Ok(());
        }
        for record in &records {
            let mut entry = LogEntry::from_engine_record(record);
            entry.command_index = index;
            self.emit(entry)?;
        }
        Ok(())
    }

    /// Runs one command. Narration goes to `out`, diagnostics to `err`.
    ///
    /// A failed write is reported as [`CommandError::Io`] even when the
    /// engine call itself succeeded.
    pub fn step(
        &mut self,
        command: Command,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<(), CommandError> {
        match command {
            Command::Alloc { bytes } => {
                let strategy = self.engine.strategy();
                match self.engine.allocate_with(bytes, strategy) {
                    Ok(allocation) => {
                        match allocation.placement {
                            Placement::Reused => writeln!(
                                out,
                                "{} Allocated: {} bytes at {:#x}",
                                strategy.label(),
                                bytes,
                                allocation.address
                            )?,
                            Placement::Fresh => writeln!(
                                out,
                                "Allocated new memory: {} bytes at {:#x}",
                                bytes, allocation.address
                            )?,
                        }
                        Ok(())
                    }
                    Err(error @ AllocError::InvalidSize { .. }) => {
                        writeln!(err, "Invalid chunk size!")?;
                        Err(error.into())
                    }
                    Err(error) => {
                        writeln!(err, "Memory allocation failed! ({error})")?;
                        Err(error.into())
                    }
                }
            }
            Command::Dealloc => match self.engine.deallocate(None) {
                Ok(release) => {
                    writeln!(
                        out,
                        "Deallocating memory using LIFO order at {:#x}",
                        release.address
                    )?;
                    Ok(())
                }
                Err(error @ DeallocError::NothingToFree) => {
                    writeln!(err, "No memory to deallocate!")?;
                    Err(error.into())
                }
                Err(error) => {
                    writeln!(err, "Attempt to free un-allocated memory! ({error})")?;
                    Err(error.into())
                }
            },
        }
    }

    /// Runs every command in order.
    ///
    /// Recoverable errors are counted and skipped. The first fatal error
    /// under [`FatalPolicy::Abort`] stops the run with [`DriverError::Fatal`].
    pub fn run(
        &mut self,
        script: &Script,
        out: &mut dyn Write,
        err: &mut dyn Write,
    ) -> Result<RunSummary, DriverError> {
        let mut summary = RunSummary::default();
        self.flush_engine_logs(None)?;
        self.emit(
            LogEntry::new(String::new(), LogLevel::Info, "run_start").with_details(
                serde_json::json!({
                    "commands": script.len(),
                    "ignored_tokens": script.ignored_tokens,
                }),
            ),
        )?;

        for (index, &command) in script.commands.iter().enumerate() {
            summary.commands += 1;
            let result = self.step(command, out, err);
            self.flush_engine_logs(Some(index))?;
            match result {
                Ok(()) => match command {
                    Command::Alloc { .. } => summary.allocations += 1,
                    Command::Dealloc => summary.deallocations += 1,
                },
                Err(CommandError::Io(error)) => {
                    self.emit_aborted(index, &error.to_string())?;
                    return Err(DriverError::Io(error));
                }
                Err(source) if self.is_fatal(&source) => {
                    self.emit_aborted(index, &source.to_string())?;
                    return Err(DriverError::Fatal {
                        index,
                        command,
                        source,
                    });
                }
                Err(_) => summary.recovered_errors += 1,
            }
        }

        self.emit(
            LogEntry::new(String::new(), LogLevel::Info, "run_complete")
                .with_outcome("success")
                .with_exit_code(0)
                .with_details(serde_json::json!({
                    "commands": summary.commands,
                    "allocations": summary.allocations,
                    "deallocations": summary.deallocations,
                    "recovered_errors": summary.recovered_errors,
                })),
        )?;
        self.flush_log()?;
        Ok(summary)
    }

    fn emit_aborted(&mut self, index: usize, error: &str) -> std::io::Result<()> {
        self.emit(
            LogEntry::new(String::new(), LogLevel::Fatal, "run_aborted")
                .with_command_index(index)
                .with_outcome("fatal")
                .with_exit_code(EXIT_FAILURE)
                .with_details(serde_json::json!({ "error": error })),
        )?;
        self.flush_log()
    }

    fn flush_log(&mut self) -> std::io::Result<()> {
        match self.emitter.as_mut() {
            Some(emitter) => emitter.flush(),
            None => Ok(()),
        }
    }

    /// Status document for the current engine state.
    #[must_use]
    pub fn report(&self) -> StatusReport {
        StatusReport::new(
            self.engine.strategy(),
            self.engine.mode(),
            self.engine.stats(),
            self.engine.status(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partalloc_core::{EngineConfig, RegionHandle, SimulatedRegionSource, Strategy};

    fn driver(mode: RuntimeMode, policy: FatalPolicy) -> ScriptDriver<SimulatedRegionSource> {
        let config = EngineConfig::default().with_mode(mode);
        let engine = AllocatorEngine::new(config, SimulatedRegionSource::new()).unwrap();
        ScriptDriver::new(engine, policy)
    }

    #[test]
    fn region_exhaustion_is_fatal_under_abort() {
        let d = driver(RuntimeMode::Hardened, FatalPolicy::Abort);
        let error = CommandError::Alloc(AllocError::RegionExhausted {
            size: 32,
            source: partalloc_core::RegionError::ZeroSize,
        });
        assert!(d.is_fatal(&error));
    }

    #[test]
    fn invalid_free_is_fatal_only_in_strict_mode() {
        let error = CommandError::Dealloc(DeallocError::InvalidFree {
            handle: RegionHandle::from_raw(1),
        });
        assert!(driver(RuntimeMode::Strict, FatalPolicy::Abort).is_fatal(&error));
        assert!(!driver(RuntimeMode::Hardened, FatalPolicy::Abort).is_fatal(&error));
        assert!(!driver(RuntimeMode::Strict, FatalPolicy::Continue).is_fatal(&error));
    }

    #[test]
    fn recoverable_errors_never_abort() {
        let d = driver(RuntimeMode::Strict, FatalPolicy::Abort);
        assert!(!d.is_fatal(&CommandError::Alloc(AllocError::InvalidSize {
            requested: 0
        })));
        assert!(!d.is_fatal(&CommandError::Dealloc(DeallocError::NothingToFree)));
    }

    #[test]
    fn step_narrates_reuse_and_growth() {
        let mut d = driver(RuntimeMode::Strict, FatalPolicy::Abort);
        let mut out = Vec::new();
        let mut err = Vec::new();
        d.step(Command::Alloc { bytes: 10 }, &mut out, &mut err)
            .unwrap();
        d.step(Command::Alloc { bytes: 600 }, &mut out, &mut err)
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert!(lines[0].starts_with("First Fit Allocated: 10 bytes at 0x"));
        assert!(lines[1].starts_with("Allocated new memory: 600 bytes at 0x"));
        assert!(err.is_empty());
        assert_eq!(d.engine().strategy(), Strategy::FirstFit);
    }

    #[test]
    fn step_reports_empty_history() {
        let mut d = driver(RuntimeMode::Strict, FatalPolicy::Abort);
        let mut out = Vec::new();
        let mut err = Vec::new();
        let result = d.step(Command::Dealloc, &mut out, &mut err);
        assert!(matches!(
            result,
            Err(CommandError::Dealloc(DeallocError::NothingToFree))
        ));
        assert_eq!(String::from_utf8(err).unwrap(), "No memory to deallocate!\n");
    }
}
