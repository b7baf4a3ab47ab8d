//! glreplay CLI
//!
//! Replays a captured call stream against the headless backend and reports
//! errors, frames and the optional state snapshot.

#![warn(missing_docs)]
#![warn(clippy::all)]

use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, WrapErr, bail};
use glreplay_retrace::{
    DispatchRegistry, Family, HeadlessBackend, ReplayConfig, ReplayEngine, RunResult, RunStatus,
    ThreadMode, TraceReader,
};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "glreplay")]
#[command(about = "glreplay - replay captured graphics-API call streams", long_about = None)]
struct Cli {
    /// Log every dispatched call
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a call stream
    Replay(ReplayArgs),
    /// List the calls each family handles
    Calls {
        /// Only this family
        #[arg(short, long, value_enum)]
        family: Option<FamilyArg>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug, Default)]
struct ReplayArgs {
    /// Call stream, a JSON array or JSON lines
    trace: PathBuf,
    /// Configuration file (JSON); flags override it
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Flush instead of swapping at frame boundaries
    #[arg(long)]
    single_buffer: bool,
    /// Skip driver error checks
    #[arg(short, long)]
    benchmark: bool,
    /// Dump state after this call index
    #[arg(short = 'D', long, value_name = "CALL")]
    dump_state: Option<u64>,
    /// Keep replaying after the state dump
    #[arg(long, requires = "dump_state")]
    continue_after_dump: bool,
    /// Record per-call timings
    #[arg(short, long)]
    profile: bool,
    /// Replay each captured thread on its own thread
    #[arg(long)]
    threads: bool,
    /// Windowing-system family to use instead of detecting it
    #[arg(long, value_enum)]
    family: Option<FamilyArg>,
    /// Stop after this many calls
    #[arg(long, value_name = "N")]
    max_calls: Option<u64>,
    /// Print the whole run result as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum FamilyArg {
    Gl,
    Cgl,
    Glx,
    Wgl,
    Egl,
}

impl From<FamilyArg> for Family {
    fn from(arg: FamilyArg) -> Self {
        match arg {
            FamilyArg::Gl => Family::Gl,
            FamilyArg::Cgl => Family::Cgl,
            FamilyArg::Glx => Family::Glx,
            FamilyArg::Wgl => Family::Wgl,
            FamilyArg::Egl => Family::Egl,
        }
    }
}

#[derive(Debug, Serialize)]
struct FamilyListing {
    family: Family,
    calls: Vec<String>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_logging(cli.log_json, cli.verbose);

    let mut out = std::io::stdout().lock();
    match cli.command {
        Commands::Replay(args) => {
            let config = build_config(&args, cli.verbose)?;
            let trace = load_trace(&args.trace)?;
            let result = replay(trace, &config);
            if args.json {
                serde_json::to_writer_pretty(&mut out, &result)?;
                writeln!(out)?;
            } else {
                write_report(&mut out, &result)?;
            }
            if let RunStatus::Aborted(err) = &result.status {
                bail!("replay aborted: {err}");
            }
            Ok(())
        }
        Commands::Calls { family, json } => {
            let listings = list_calls(family.map(Family::from));
            if json {
                serde_json::to_writer_pretty(&mut out, &listings)?;
                writeln!(out)?;
            } else {
                for listing in &listings {
                    writeln!(out, "{} ({} calls)", listing.family, listing.calls.len())?;
                    for name in &listing.calls {
                        writeln!(out, "  {name}")?;
                    }
                }
            }
            Ok(())
        }
    }
}

/// Filter used when `RUST_LOG` is unset; per-call logs are at debug
fn default_filter(verbose: bool) -> &'static str {
    if verbose { "glreplay=debug" } else { "glreplay=info" }
}

fn init_logging(json: bool, verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Load the configuration file, if any, then apply command-line flags
fn build_config(args: &ReplayArgs, verbose: bool) -> Result<ReplayConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .wrap_err_with(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<ReplayConfig>(&text)
                .wrap_err_with(|| format!("parsing config {}", path.display()))?
        }
        None => ReplayConfig::default(),
    };
    if args.single_buffer {
        config.double_buffered = false;
    }
    if args.benchmark {
        config.benchmarking = true;
    }
    if let Some(call) = args.dump_state {
        config = config
            .with_capture_at(call)
            .with_stop_after_capture(!args.continue_after_dump);
    }
    if args.profile {
        config.profiling = true;
    }
    if args.threads {
        config.thread_mode = ThreadMode::PerCaptureThread;
    }
    if let Some(family) = args.family {
        config.family = Some(family.into());
    }
    if let Some(max) = args.max_calls {
        config.max_calls = max;
    }
    if verbose {
        config.verbose = true;
    }
    Ok(config)
}

fn load_trace(path: &Path) -> Result<TraceReader> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading trace {}", path.display()))?;
    let reader = TraceReader::from_json(&text)
        .wrap_err_with(|| format!("decoding trace {}", path.display()))?;
    tracing::debug!(path = %path.display(), calls = reader.total(), "trace loaded");
    Ok(reader)
}

fn replay(mut trace: TraceReader, config: &ReplayConfig) -> RunResult {
    let engine = ReplayEngine::new(Arc::new(HeadlessBackend::new()));
    engine.run(&mut trace, config)
}

/// Human-readable run report: one `index<TAB>kind<TAB>message` line per
/// error, then the totals and the snapshot
fn write_report(out: &mut impl Write, result: &RunResult) -> std::io::Result<()> {
    for err in &result.errors {
        writeln!(out, "{}\t{}\t{}", err.call_index, err.kind, err.message)?;
    }
    for (name, count) in &result.unsupported.by_name {
        writeln!(out, "unsupported\t{name}\t{count}")?;
    }
    if !result.profile.is_empty() {
        writeln!(out, "call\tname\tdraw\tcpu_ns\tgpu_ns")?;
        for p in &result.profile {
            let gpu = p.gpu_ns.map_or_else(|| "-".to_string(), |ns| ns.to_string());
            writeln!(out, "{}\t{}\t{}\t{}\t{}", p.call_index, p.name, p.is_draw, p.cpu_ns, gpu)?;
        }
    }
    writeln!(
        out,
        "Rendered {} frames ({} calls, {} errors)",
        result.frames_completed,
        result.calls_replayed,
        result.errors.len()
    )?;
    if let Some(snapshot) = &result.snapshot {
        let json = snapshot.to_json_pretty().map_err(std::io::Error::other)?;
        writeln!(out, "{json}")?;
    }
    Ok(())
}

fn list_calls(only: Option<Family>) -> Vec<FamilyListing> {
    let registry = DispatchRegistry::standard();
    registry
        .families()
        .into_iter()
        .filter(|f| only.is_none_or(|o| o == *f))
        .filter_map(|family| {
            let table = registry.table(family)?;
            let mut calls: Vec<String> = table.names().map(str::to_string).collect();
            calls.sort();
            Some(FamilyListing { family, calls })
        })
        .collect()
}
