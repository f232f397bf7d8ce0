//! Writing the registry out
//!
//! With an output path every instruction becomes one snapshot line, in
//! ascending address order so that two dumps of the same registry are
//! byte-identical. Without one, only an aggregate summary is produced.

use log::info;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::format::SnapshotRecord;
use crate::domain::{ProfilerError, SnapshotError};
use crate::profiling::Registry;

/// Aggregate view of a registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySummary {
    pub unique_instructions: usize,
    pub total_executions: u64,
    /// Instructions that executed at least once
    pub executed_instructions: usize,
    /// Sum of the sizes of all unique instructions
    pub code_bytes: u64,
}

impl RegistrySummary {
    #[must_use]
    pub fn of(registry: &Registry) -> Self {
        let mut summary = Self::default();
        registry.for_each(|r| {
            summary.unique_instructions += 1;
            summary.total_executions = summary.total_executions.saturating_add(r.exec_count);
            summary.code_bytes += u64::from(r.size);
            if r.exec_count > 0 {
                summary.executed_instructions += 1;
            }
        });
        summary
    }
}

impl fmt::Display for RegistrySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Instrumentation results:")?;
        writeln!(f, "{:>12} instruction executions", self.total_executions)?;
        writeln!(f, "{:>12} unique instructions", self.unique_instructions)?;
        writeln!(f, "{:>12} executed at least once", self.executed_instructions)?;
        write!(f, "{:>12} bytes of code", self.code_bytes)
    }
}

/// Result of [`dump_snapshot`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DumpOutcome {
    Written { path: PathBuf, records: usize },
    Summary(RegistrySummary),
}

/// Write every record of `registry` as a snapshot line.
///
/// Returns the number of lines written. The registry lock is not held while
/// writing.
///
/// # Errors
/// Any I/O error of `writer`.
pub fn write_snapshot<W: Write>(registry: &Registry, mut writer: W) -> io::Result<usize> {
    let records = registry.records();
    for record in &records {
        writeln!(writer, "{}", SnapshotRecord::from(record))?;
    }
    writer.flush()?;
    Ok(records.len())
}

/// Write the snapshot to `path`, or summarize the registry if there is none.
///
/// # Errors
/// [`SnapshotError::Write`] if the file cannot be created or written.
pub fn dump_snapshot(
    registry: &Registry,
    path: Option<&Path>,
) -> Result<DumpOutcome, ProfilerError> {
    let Some(path) = path else {
        return Ok(DumpOutcome::Summary(RegistrySummary::of(registry)));
    };

    let write_failed = |source| SnapshotError::Write { path: path.to_path_buf(), source };
    let file = File::create(path).map_err(write_failed)?;
    let records = write_snapshot(registry, BufWriter::new(file)).map_err(write_failed)?;

    info!("wrote {records} instructions to {}", path.display());
    Ok(DumpOutcome::Written { path: path.to_path_buf(), records })
}
