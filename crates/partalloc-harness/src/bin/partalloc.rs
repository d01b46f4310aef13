//! CLI entrypoint for the partalloc simulator.

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use partalloc_core::{
    AllocatorEngine, DEFAULT_PREPOPULATE_PER_CLASS, EngineConfig, HeapRegionSource, RegionSource,
    Reservation, RuntimeMode, SimulatedRegionSource, SizeClassifier, Strategy,
};
use partalloc_harness::structured_log::{LogEmitter, validate_log_file};
use partalloc_harness::{FatalPolicy, ReportFormat, Script, ScriptDriver};

/// Fixed-partition allocator simulator.
#[derive(Debug, Parser)]
#[command(name = "partalloc")]
#[command(about = "Replay allocation scripts against a fixed-partition allocator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a command script and print the final status.
    Run(RunArgs),
    /// Show the reservation each byte count classifies to.
    Classify {
        /// Requested byte counts.
        #[arg(required = true)]
        bytes: Vec<usize>,
    },
    /// Validate a structured JSONL log written by `run --log`.
    ValidateLog {
        /// JSONL log path.
        path: PathBuf,
    },
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Script of `alloc: N` and `dealloc` tokens.
    script: PathBuf,
    /// Placement strategy (first-fit or best-fit).
    #[arg(long, default_value = "first-fit")]
    strategy: Strategy,
    /// Free chunks created per partition class at startup.
    #[arg(long, default_value_t = DEFAULT_PREPOPULATE_PER_CLASS)]
    prepopulate: usize,
    /// Runtime mode (strict or hardened). Defaults to PARTALLOC_MODE.
    #[arg(long)]
    mode: Option<RuntimeMode>,
    /// Report fatal errors and keep going instead of stopping.
    #[arg(long)]
    keep_going: bool,
    /// Final status format (plain or json).
    #[arg(long, default_value = "plain")]
    format: ReportFormat,
    /// Write structured JSONL lifecycle logs to this path.
    #[arg(long)]
    log: Option<PathBuf>,
    /// Cap on total reserved bytes.
    #[arg(long)]
    region_budget: Option<usize>,
    /// Use synthetic addresses instead of host memory.
    #[arg(long)]
    simulated: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            let budget = args.region_budget;
            if args.simulated {
                let source = match budget {
                    Some(bytes) => SimulatedRegionSource::with_budget(bytes),
                    None => SimulatedRegionSource::new(),
                };
                run_script(&args, source)?;
            } else {
                let source = match budget {
                    Some(bytes) => HeapRegionSource::with_budget(bytes),
                    None => HeapRegionSource::new(),
                };
                run_script(&args, source)?;
            }
        }
        Command::Classify { bytes } => {
            let classifier = SizeClassifier::default();
            for requested in bytes {
                match classifier.classify(requested) {
                    Ok(Reservation::Class { index, size }) => {
                        println!("{requested} -> class {index} ({size} bytes)");
                    }
                    Ok(Reservation::Oversized { size }) => {
                        println!("{requested} -> oversized ({size} bytes)");
                    }
                    Err(err) => println!("{requested} -> {err}"),
                }
            }
        }
        Command::ValidateLog { path } => {
            let (lines, errors) = validate_log_file(&path)?;
            for error in &errors {
                eprintln!("{error}");
            }
            println!(
                "{}: {lines} entries, {} errors",
                path.display(),
                errors.len()
            );
            if !errors.is_empty() {
                return Err(format!("{} failed validation", path.display()).into());
            }
        }
    }

    Ok(())
}

fn run_script<S: RegionSource>(
    args: &RunArgs,
    source: S,
) -> Result<(), Box<dyn std::error::Error>> {
    let script = Script::from_file(&args.script)?;

    let mut config = EngineConfig::default()
        .with_strategy(args.strategy)
        .with_prepopulate(args.prepopulate);
    if let Some(mode) = args.mode {
        config = config.with_mode(mode);
    }
    let engine = AllocatorEngine::new(config, source)?;

    let policy = if args.keep_going {
        FatalPolicy::Continue
    } else {
        FatalPolicy::Abort
    };
    let mut driver = ScriptDriver::new(engine, policy);
    if let Some(path) = &args.log {
        driver = driver.with_emitter(open_log(path, &args.script)?);
    }

    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    let mut out = stdout.lock();
    let mut err = stderr.lock();
    driver.run(&script, &mut out, &mut err)?;

    let report = driver.report().render(args.format)?;
    write!(out, "{report}")?;
    if args.format == ReportFormat::Json {
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

fn open_log(path: &Path, script: &Path) -> std::io::Result<LogEmitter> {
    let run_id = script
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map_or_else(|| format!("pid{}", std::process::id()), str::to_string);
    LogEmitter::to_file(path, "partalloc", &run_id)
}
