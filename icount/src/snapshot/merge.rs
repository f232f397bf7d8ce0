//! Folding prior snapshots into a registry
//!
//! Counts are added per address, so merging is order independent: A then B
//! gives the same registry as B then A. Sizes must agree with what the
//! registry already knows, otherwise the merge fails with a consistency error.

use log::{debug, info, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::format::parse_line;
use crate::domain::ProfilerError;
use crate::profiling::Registry;

/// What a merge did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    /// Non-blank lines read
    pub lines: usize,
    /// Lines folded into the registry
    pub merged: usize,
    /// Malformed lines skipped
    pub skipped: usize,
    /// The snapshot file did not exist or could not be opened
    pub source_missing: bool,
    /// Reading stopped early on an I/O error
    pub truncated: bool,
}

/// Fold the snapshot at `path` into `registry`.
///
/// A missing or unreadable file means there is no prior data; that is not an
/// error.
///
/// # Errors
/// [`ProfilerError::SizeMismatch`] if a line disagrees with a known size.
pub fn merge_from_snapshot(registry: &Registry, path: &Path) -> Result<MergeStats, ProfilerError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) => {
            info!("no prior snapshot at {}: {e}", path.display());
            return Ok(MergeStats { source_missing: true, ..MergeStats::default() });
        }
    };

    let stats = merge_from_reader(registry, BufReader::new(file))?;
    info!(
        "merged {} records from {} ({} malformed lines skipped)",
        stats.merged,
        path.display(),
        stats.skipped
    );
    Ok(stats)
}

/// Fold snapshot lines read from `reader` into `registry`.
///
/// # Errors
/// Same as [`merge_from_snapshot`].
pub fn merge_from_reader<R: BufRead>(
    registry: &Registry,
    reader: R,
) -> Result<MergeStats, ProfilerError> {
    let mut stats = MergeStats::default();

    for (index, line) in reader.split(b'\n').enumerate() {
        let line = match line {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("snapshot read stopped at line {}: {e}", index + 1);
                stats.truncated = true;
                break;
            }
        };
        let line = String::from_utf8_lossy(&line);
        if line.trim().is_empty() {
            continue;
        }
        stats.lines += 1;

        match parse_line(&line) {
            Ok(record) => {
                registry.observe(record.address, record.size, record.exec_count)?;
                stats.merged += 1;
            }
            Err(reason) => {
                debug!("skipping snapshot line {}: {reason}", index + 1);
                stats.skipped += 1;
            }
        }
    }

    Ok(stats)
}
