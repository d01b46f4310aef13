//! Integration tests: script driver narration, fatal policy, and reports.
//!
//! Run: cargo test -p partalloc-harness --test script_driver_test

use std::io::{self, Write};

use partalloc_core::{
    AllocError, AllocatorEngine, DeallocError, EngineConfig, RuntimeMode, SimulatedRegionSource,
    Strategy,
};
use partalloc_harness::driver::CommandError;
use partalloc_harness::{Command, DriverError, FatalPolicy, ReportFormat, Script, ScriptDriver};

/// Bytes reserved by default pre-population: 5 chunks of each class.
const PREPOPULATED_BYTES: usize = 5 * (32 + 64 + 128 + 256 + 512);

/// Writer whose every write fails like a closed pipe.
struct ClosedPipe;

impl Write for ClosedPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::from(io::ErrorKind::BrokenPipe))
    }
}

fn driver_with(
    strategy: Strategy,
    source: SimulatedRegionSource,
    policy: FatalPolicy,
) -> ScriptDriver<SimulatedRegionSource> {
    driver_in_mode(RuntimeMode::Strict, strategy, source, policy)
}

fn driver_in_mode(
    mode: RuntimeMode,
    strategy: Strategy,
    source: SimulatedRegionSource,
    policy: FatalPolicy,
) -> ScriptDriver<SimulatedRegionSource> {
    let config = EngineConfig::default()
        .with_strategy(strategy)
        .with_mode(mode);
    let engine = AllocatorEngine::new(config, source).unwrap();
    ScriptDriver::new(engine, policy)
}

fn run_text(
    driver: &mut ScriptDriver<SimulatedRegionSource>,
    text: &str,
) -> (Result<partalloc_harness::RunSummary, DriverError>, String, String) {
    let script = Script::parse(text).unwrap();
    let mut out = Vec::new();
    let mut err = Vec::new();
    let result = driver.run(&script, &mut out, &mut err);
    (
        result,
        String::from_utf8(out).unwrap(),
        String::from_utf8(err).unwrap(),
    )
}

#[test]
fn reference_scenario_narration() {
    let mut driver = driver_with(
        Strategy::FirstFit,
        SimulatedRegionSource::new(),
        FatalPolicy::Abort,
    );
    let (result, out, err) = run_text(&mut driver, "alloc: 10\nalloc: 600\ndealloc\n");
    let summary = result.unwrap();

    assert_eq!(summary.commands, 3);
    assert_eq!(summary.allocations, 2);
    assert_eq!(summary.deallocations, 1);
    assert_eq!(summary.recovered_errors, 0);
    assert!(err.is_empty(), "unexpected diagnostics: {err}");

    let fresh = 0x1_0000 + PREPOPULATED_BYTES;
    assert_eq!(
        out,
        format!(
            "First Fit Allocated: 10 bytes at 0x10000\n\
             Allocated new memory: 600 bytes at {fresh:#x}\n\
             Deallocating memory using LIFO order at {fresh:#x}\n"
        )
    );

    let report = driver.report();
    assert_eq!(report.allocated.len(), 1);
    assert_eq!(report.allocated[0].requested_size, 32);
    assert_eq!(report.allocated[0].used_size, 10);
    assert_eq!(report.free.len(), 25);
    assert_eq!(report.free.last().unwrap().requested_size, 600);
    assert_eq!(report.free.last().unwrap().address, fresh);
}

#[test]
fn best_fit_narration_uses_its_label() {
    let mut driver = driver_with(
        Strategy::BestFit,
        SimulatedRegionSource::new(),
        FatalPolicy::Abort,
    );
    let (result, out, _) = run_text(&mut driver, "alloc: 100");
    result.unwrap();
    assert!(out.starts_with("Best Fit Allocated: 100 bytes at 0x"), "{out}");
}

#[test]
fn empty_history_and_invalid_size_are_recoverable() {
    let mut driver = driver_with(
        Strategy::FirstFit,
        SimulatedRegionSource::new(),
        FatalPolicy::Abort,
    );
    let (result, out, err) = run_text(&mut driver, "dealloc alloc: 0 alloc: 5");
    let summary = result.unwrap();
    assert_eq!(summary.recovered_errors, 2);
    assert_eq!(summary.allocations, 1);
    assert_eq!(err, "No memory to deallocate!\nInvalid chunk size!\n");
    assert_eq!(out, "First Fit Allocated: 5 bytes at 0x10000\n");
}

#[test]
fn region_exhaustion_aborts_the_run() {
    let source = SimulatedRegionSource::with_budget(PREPOPULATED_BYTES);
    let mut driver = driver_with(Strategy::FirstFit, source, FatalPolicy::Abort);
    let (result, out, err) = run_text(&mut driver, "alloc: 10 alloc: 600 alloc: 20");

    match result {
        Err(DriverError::Fatal {
            index,
            command,
            source,
        }) => {
            assert_eq!(index, 1);
            assert_eq!(command, Command::Alloc { bytes: 600 });
            assert!(matches!(
                source,
                CommandError::Alloc(AllocError::RegionExhausted { size: 600, .. })
            ));
        }
        other => panic!("expected fatal error, got {other:?}"),
    }
    assert_eq!(out.lines().count(), 1, "nothing runs after the fatal command");
    assert!(err.starts_with("Memory allocation failed!"), "{err}");
    assert_eq!(driver.engine().stats().allocations, 1);
}

#[test]
fn keep_going_continues_past_exhaustion() {
    let source = SimulatedRegionSource::with_budget(PREPOPULATED_BYTES);
    let mut driver = driver_with(Strategy::FirstFit, source, FatalPolicy::Continue);
    let (result, out, _) = run_text(&mut driver, "alloc: 10 alloc: 600 alloc: 20");
    let summary = result.unwrap();
    assert_eq!(summary.recovered_errors, 1);
    assert_eq!(summary.allocations, 2);
    assert!(out.ends_with("First Fit Allocated: 20 bytes at 0x10020\n"), "{out}");
}

#[test]
fn lifo_frees_follow_reverse_allocation_order() {
    let mut driver = driver_with(
        Strategy::FirstFit,
        SimulatedRegionSource::new(),
        FatalPolicy::Abort,
    );
    let (result, out, _) = run_text(
        &mut driver,
        "alloc: 10 alloc: 40 alloc: 100 dealloc dealloc dealloc dealloc",
    );
    let summary = result.unwrap();
    assert_eq!(summary.deallocations, 3);
    assert_eq!(summary.recovered_errors, 1);

    let freed: Vec<&str> = out
        .lines()
        .filter_map(|line| line.strip_prefix("Deallocating memory using LIFO order at "))
        .collect();
    // 128-class, then 64-class, then 32-class chunk.
    assert_eq!(freed, vec!["0x101e0", "0x100a0", "0x10000"]);
    assert!(driver.engine().status().allocated.is_empty());
}

#[test]
fn json_report_renders_after_run() {
    let mut driver = driver_with(
        Strategy::FirstFit,
        SimulatedRegionSource::new(),
        FatalPolicy::Abort,
    );
    let (result, _, _) = run_text(&mut driver, "alloc: 700");
    result.unwrap();

    let rendered = driver.report().render(ReportFormat::Json).unwrap();
    let json: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    assert_eq!(json["strategy"], "first-fit");
    assert_eq!(json["mode"], "strict");
    assert_eq!(json["allocated"][0]["requested_size"], 700);
    assert_eq!(json["stats"]["fresh_regions"], 26);
    assert_eq!(json["free"].as_array().unwrap().len(), 25);
}

#[test]
fn closed_output_fails_the_run() {
    for policy in [FatalPolicy::Abort, FatalPolicy::Continue] {
        let mut driver = driver_with(Strategy::FirstFit, SimulatedRegionSource::new(), policy);
        let script = Script::parse("alloc: 10\nalloc: 600\ndealloc\n").unwrap();
        let result = driver.run(&script, &mut ClosedPipe, &mut ClosedPipe);
        match result {
            Err(DriverError::Io(error)) => assert_eq!(error.kind(), io::ErrorKind::BrokenPipe),
            other => panic!("expected output error under {policy:?}, got {other:?}"),
        }
        // The first allocation happened; nothing after it ran.
        assert_eq!(driver.engine().stats().allocations, 1);
    }
}

#[test]
fn closed_diagnostics_fail_a_recoverable_step() {
    let mut driver = driver_with(
        Strategy::FirstFit,
        SimulatedRegionSource::new(),
        FatalPolicy::Continue,
    );
    let mut out = Vec::new();
    let result = driver.step(Command::Dealloc, &mut out, &mut ClosedPipe);
    assert!(matches!(result, Err(CommandError::Io(_))));
    assert!(driver.is_fatal(&result.unwrap_err()));
}

/// Frees the most recent allocation explicitly, leaving its history entry behind.
fn free_latest_explicitly(driver: &mut ScriptDriver<SimulatedRegionSource>) {
    let handle = driver.engine().history().peek().unwrap();
    driver.engine_mut().deallocate_handle(handle).unwrap();
}

#[test]
fn strict_stale_history_aborts_with_invalid_free() {
    let mut driver = driver_with(
        Strategy::FirstFit,
        SimulatedRegionSource::new(),
        FatalPolicy::Abort,
    );
    let (result, _, _) = run_text(&mut driver, "alloc: 10");
    result.unwrap();
    free_latest_explicitly(&mut driver);

    let (result, out, err) = run_text(&mut driver, "dealloc alloc: 20");
    match result {
        Err(DriverError::Fatal {
            index: 0,
            command: Command::Dealloc,
            source: CommandError::Dealloc(DeallocError::InvalidFree { .. }),
        }) => {}
        other => panic!("expected fatal invalid free, got {other:?}"),
    }
    assert!(out.is_empty());
    assert!(err.starts_with("Attempt to free un-allocated memory!"), "{err}");
    assert_eq!(driver.engine().stats().allocations, 1);
}

#[test]
fn hardened_history_purge_keeps_run_alive() {
    let mut driver = driver_in_mode(
        RuntimeMode::Hardened,
        Strategy::FirstFit,
        SimulatedRegionSource::new(),
        FatalPolicy::Abort,
    );
    let (result, _, _) = run_text(&mut driver, "alloc: 10");
    result.unwrap();
    free_latest_explicitly(&mut driver);

    let (result, _, err) = run_text(&mut driver, "dealloc alloc: 20");
    let summary = result.unwrap();
    assert_eq!(summary.recovered_errors, 1);
    assert_eq!(summary.allocations, 1);
    assert_eq!(err, "No memory to deallocate!\n");
}
