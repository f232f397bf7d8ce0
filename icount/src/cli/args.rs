//! CLI argument definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use icount_common::MAX_NUM_INS_REFS;

use crate::profiling::SessionConfig;
use crate::replay::ReplayMode;

#[derive(Parser)]
#[command(
    name = "icount",
    version,
    about = "Count instruction executions and keep mergeable per-instruction snapshots",
    after_help = "\
EXAMPLES:
    icount replay --trace run.trace -o counts.txt          Replay one trace, save counts
    icount replay --trace a.trace --trace b.trace \\
        --merge counts.txt -o counts.txt                   Accumulate into a prior snapshot
    icount merge day1.txt day2.txt -o total.txt            Combine snapshots
    icount summary total.txt --top 20                      Show the hottest instructions"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Play recorded execution traces through the engine
    Replay(ReplayArgs),

    /// Merge snapshots into one
    Merge(MergeArgs),

    /// Summarize a snapshot
    Summary(SummaryArgs),
}

#[derive(clap::Args)]
pub struct ReplayArgs {
    /// Trace file to replay, one thread per file (repeatable)
    #[arg(long = "trace", value_name = "FILE", required = true)]
    pub traces: Vec<PathBuf>,

    /// How traces are fed to the engine
    #[arg(long, value_enum, default_value_t = ReplayMode::Events)]
    pub mode: ReplayMode,

    /// Write the per-instruction snapshot here (summary only if omitted)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Prior snapshot merged before replaying
    #[arg(long, value_name = "FILE")]
    pub merge: Option<PathBuf>,

    /// Write a JSON session report
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Entries per thread trace buffer
    #[arg(long, value_name = "N", default_value_t = MAX_NUM_INS_REFS)]
    pub buffer_capacity: usize,

    /// Suppress non-essential output
    #[arg(short, long)]
    pub quiet: bool,
}

impl ReplayArgs {
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            output_path: self.output.clone(),
            merge_input_path: self.merge.clone(),
            buffer_capacity: self.buffer_capacity,
        }
    }
}

#[derive(clap::Args)]
pub struct MergeArgs {
    /// Snapshots to merge, in any order
    #[arg(value_name = "SNAPSHOT", required = true)]
    pub inputs: Vec<PathBuf>,

    /// Merged snapshot
    #[arg(short, long, value_name = "FILE")]
    pub output: PathBuf,
}

#[derive(clap::Args)]
pub struct SummaryArgs {
    /// Snapshot to summarize
    #[arg(value_name = "SNAPSHOT")]
    pub input: PathBuf,

    /// Number of hottest instructions to list
    #[arg(long, default_value = "10")]
    pub top: usize,
}
