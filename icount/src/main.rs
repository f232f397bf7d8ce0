//! # icount - Main Entry Point
//!
//! Three subcommands:
//! - **replay** (`--trace run.trace`): play recorded traces through a profiling session
//! - **merge** (`a.txt b.txt -o total.txt`): combine snapshots from several runs
//! - **summary** (`total.txt`): aggregate numbers and the hottest instructions

use anyhow::{Context, Result};
use clap::Parser;
use log::warn;
use std::fs::File;
use std::io::BufWriter;

use icount::analysis::{analyze_hotspots, SizeProfile};
use icount::cli::{Args, Command, MergeArgs, ReplayArgs, SummaryArgs};
use icount::domain::ProfilerError;
use icount::export::ReportExporter;
use icount::profiling::{Registry, Session};
use icount::replay::{replay, Trace};
use icount::snapshot::{dump_snapshot, merge_from_snapshot, RegistrySummary};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

/// Hotspots included in the JSON report
const REPORT_HOTSPOTS: usize = 20;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if matches!(err.downcast_ref::<ProfilerError>(), Some(ProfilerError::ZeroCapacity)) {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    match args.command {
        Command::Replay(args) => run_replay(&args),
        Command::Merge(args) => run_merge(&args),
        Command::Summary(args) => run_summary(&args),
    }
}

fn run_replay(args: &ReplayArgs) -> Result<()> {
    let traces = args
        .traces
        .iter()
        .map(|path| Trace::load(path))
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to load traces")?;

    let session = Session::init(args.session_config())?;
    if !args.quiet {
        println!("icount v{}", env!("CARGO_PKG_VERSION"));
        println!("traces: {}", traces.len());
        println!("mode: {}", args.mode);
        let prior = session.registry().len();
        if prior > 0 {
            println!("prior instructions: {prior}");
        }
    }

    let stats = replay(&session, &traces, args.mode).context("Replay failed")?;
    let (report, records) =
        session.shutdown_with_records().context("Failed to finish profiling session")?;

    if let Some(ref report_path) = args.report {
        let file = File::create(report_path).context("Failed to create report file")?;
        ReportExporter::new(report.clone())
            .with_hotspots(analyze_hotspots(&records, REPORT_HOTSPOTS))
            .export(BufWriter::new(file))
            .context("Failed to export report")?;
        if !args.quiet {
            println!("report: {}", report_path.display());
        }
    }

    if !args.quiet {
        println!("replayed: {} events in {} regions", stats.events, stats.regions);
        println!("{report}");
    }
    Ok(())
}

fn run_merge(args: &MergeArgs) -> Result<()> {
    let registry = Registry::new();
    for input in &args.inputs {
        let stats = merge_from_snapshot(&registry, input)
            .with_context(|| format!("Failed to merge {}", input.display()))?;
        if stats.source_missing {
            warn!("skipping missing snapshot {}", input.display());
        }
    }

    dump_snapshot(&registry, Some(&args.output)).context("Failed to write merged snapshot")?;
    println!(
        "saved: {} ({} instructions, {} executions)",
        args.output.display(),
        registry.len(),
        registry.total_executions()
    );
    Ok(())
}

fn run_summary(args: &SummaryArgs) -> Result<()> {
    let registry = Registry::new();
    let stats = merge_from_snapshot(&registry, &args.input)
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    if stats.source_missing {
        anyhow::bail!("snapshot not found: {}", args.input.display());
    }

    println!("{}", RegistrySummary::of(&registry));
    let records = registry.records();
    if let Some(mean) = SizeProfile::from_records(&records).mean_executed_size() {
        println!("{mean:>12.2} bytes per executed instruction");
    }

    let hotspots = analyze_hotspots(&records, args.top);
    if !hotspots.is_empty() {
        println!();
        println!("HOTSPOTS");
        println!("─────────────────────────────────");
        for h in &hotspots {
            println!(
                "  {:<18} ({} bytes) {:>6.1}%  {}",
                h.address.to_string(),
                h.size,
                h.percentage,
                h.count
            );
        }
    }
    if stats.skipped > 0 {
        warn!("{} malformed lines skipped", stats.skipped);
    }
    Ok(())
}
