//! Trace replay
//!
//! Plays recorded execution traces through a [`Session`], one OS thread per
//! trace, the way an instrumentation layer would drive the engine.
//!
//! ```text
//! # comment
//! 0x401000:4        executed instruction <address>:<size>
//! 0x401004:2
//! ---               region boundary
//! 0x401000:4
//! ```
//!
//! Two modes:
//! - **events**: every line goes through the thread's trace buffer; a
//!   boundary forces a drain, like the end of an instrumented block.
//! - **regions**: each region is registered once as an instruction group and
//!   its counter is bumped once per occurrence. Groups are shared across
//!   threads, so concurrent replays may lose increments (never add any).

use clap::ValueEnum;
use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use icount_common::SNAPSHOT_FIELD_SEPARATOR;

use crate::domain::{Address, MalformedLine, ProfilerError, ReplayError};
use crate::profiling::{InstructionGroup, Session};
use crate::snapshot::parse_address;

/// Line separating two regions of a trace
pub const REGION_BOUNDARY: &str = "---";

/// How traces are fed to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayMode {
    /// Per-instruction events through per-thread trace buffers (exact)
    #[default]
    Events,

    /// One group counter bump per region occurrence (racy across threads)
    Regions,
}

impl fmt::Display for ReplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayMode::Events => write!(f, "events"),
            ReplayMode::Regions => write!(f, "regions"),
        }
    }
}

/// A recorded execution trace split into regions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub name: String,
    pub regions: Vec<Vec<(Address, u32)>>,
}

impl Trace {
    /// Load a trace file.
    ///
    /// # Errors
    /// [`ReplayError::Read`] if the file cannot be read, or
    /// [`ReplayError::Malformed`] for the first line that is not an event,
    /// a boundary or a comment.
    pub fn load(path: &Path) -> Result<Self, ReplayError> {
        let file = File::open(path)
            .map_err(|source| ReplayError::Read { path: path.to_path_buf(), source })?;
        let name = path.file_name().map_or_else(
            || path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        );
        Self::from_reader(name, path, BufReader::new(file))
    }

    /// Parse a trace from any reader. `path` only labels errors.
    ///
    /// # Errors
    /// Same as [`Trace::load`].
    pub fn from_reader<R: BufRead>(
        name: impl Into<String>,
        path: &Path,
        reader: R,
    ) -> Result<Self, ReplayError> {
        let mut regions = Vec::new();
        let mut current = Vec::new();

        for (index, line) in reader.lines().enumerate() {
            let line =
                line.map_err(|source| ReplayError::Read { path: path.to_path_buf(), source })?;
            let line = line.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line == REGION_BOUNDARY {
                if !current.is_empty() {
                    regions.push(std::mem::take(&mut current));
                }
                continue;
            }

            let event = parse_event(line).map_err(|reason| ReplayError::Malformed {
                path: path.to_path_buf(),
                line: index + 1,
                reason,
            })?;
            current.push(event);
        }
        if !current.is_empty() {
            regions.push(current);
        }

        Ok(Self { name: name.into(), regions })
    }

    /// Executed instructions in the whole trace
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.regions.iter().map(|r| r.len() as u64).sum()
    }
}

/// Parse one `<address>:<size>` event line.
///
/// # Errors
/// A [`MalformedLine`] describing the first bad field.
pub fn parse_event(line: &str) -> Result<(Address, u32), MalformedLine> {
    let mut fields = line.split(SNAPSHOT_FIELD_SEPARATOR);

    let address = fields.next().filter(|f| !f.trim().is_empty());
    let address = parse_address(address.ok_or(MalformedLine::MissingField("address"))?)?;

    let size = fields.next().ok_or(MalformedLine::MissingField("size"))?.trim();
    let size = size.parse::<u32>().map_err(|_| MalformedLine::InvalidSize(size.to_string()))?;

    if let Some(extra) = fields.next() {
        return Err(MalformedLine::TrailingField(extra.to_string()));
    }
    Ok((address, size))
}

/// What a replay fed into the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplayStats {
    pub traces: usize,
    /// Region occurrences replayed
    pub regions: u64,
    /// Instruction executions replayed
    pub events: u64,
}

/// Groups discovered so far, keyed by region contents
type GroupCache = Mutex<HashMap<Vec<(Address, u32)>, Arc<InstructionGroup>>>;

/// Replay every trace on its own thread and wait for all of them.
///
/// Group counters are not flushed here; `Session::shutdown` does that.
///
/// # Errors
/// The first consistency error any thread hit, or
/// [`ReplayError::ThreadPanicked`].
pub fn replay(
    session: &Session,
    traces: &[Trace],
    mode: ReplayMode,
) -> Result<ReplayStats, ReplayError> {
    info!("replaying {} trace(s) in {mode} mode", traces.len());
    let groups: GroupCache = Mutex::new(HashMap::new());

    let results: Vec<Result<(), ReplayError>> = thread::scope(|scope| {
        let handles: Vec<_> = traces
            .iter()
            .map(|trace| {
                let groups = &groups;
                let handle = scope.spawn(move || match mode {
                    ReplayMode::Events => replay_events(session, trace),
                    ReplayMode::Regions => replay_regions(session, groups, trace),
                });
                (trace, handle)
            })
            .collect();

        handles
            .into_iter()
            .map(|(trace, handle)| match handle.join() {
                Ok(result) => result.map_err(ReplayError::from),
                Err(_) => Err(ReplayError::ThreadPanicked(trace.name.clone())),
            })
            .collect()
    });
    results.into_iter().collect::<Result<(), _>>()?;

    let stats = ReplayStats {
        traces: traces.len(),
        regions: traces.iter().map(|t| t.regions.len() as u64).sum(),
        events: traces.iter().map(Trace::event_count).sum(),
    };
    debug!("replay finished: {stats:?}");
    Ok(stats)
}

fn replay_events(session: &Session, trace: &Trace) -> Result<(), ProfilerError> {
    let mut ctx = session.on_thread_start()?;
    for region in &trace.regions {
        for &(address, size) in region {
            ctx.record_event(address, size)?;
        }
        ctx.drain()?;
    }
    let drained = session.on_thread_end(ctx)?;
    debug!("{}: {drained} events drained", trace.name);
    Ok(())
}

fn replay_regions(
    session: &Session,
    groups: &GroupCache,
    trace: &Trace,
) -> Result<(), ProfilerError> {
    for region in &trace.regions {
        let group = {
            let mut cache = groups.lock().unwrap_or_else(PoisonError::into_inner);
            match cache.get(region) {
                Some(group) => Arc::clone(group),
                None => {
                    let group = session.on_region_discovered(region)?;
                    cache.insert(region.clone(), Arc::clone(&group));
                    group
                }
            }
        };
        group.counter().increment();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiling::SessionConfig;
    use std::io::Cursor;

    fn trace(text: &str) -> Trace {
        Trace::from_reader("test", Path::new("test.trace"), Cursor::new(text)).unwrap()
    }

    #[test]
    fn test_parse_event() {
        assert_eq!(parse_event("0x1000:4").unwrap(), (Address(0x1000), 4));
        assert_eq!(parse_event("4096:2").unwrap(), (Address(4096), 2));
        assert_eq!(parse_event("0x1000"), Err(MalformedLine::MissingField("size")));
        assert!(matches!(parse_event("0x1000:4:1"), Err(MalformedLine::TrailingField(_))));
    }

    #[test]
    fn test_trace_splits_regions() {
        let t = trace("# loop body\n0x1000:4\n0x1004:2\n---\n---\n0x1000:4\n0x1004:2\n---\n");
        assert_eq!(t.regions.len(), 2);
        assert_eq!(t.regions[0], vec![(Address(0x1000), 4), (Address(0x1004), 2)]);
        assert_eq!(t.event_count(), 4);
    }

    #[test]
    fn test_malformed_line_reports_position() {
        let err = Trace::from_reader("bad", Path::new("bad.trace"), Cursor::new("0x10:1\nzz:q\n"))
            .unwrap_err();
        assert!(matches!(err, ReplayError::Malformed { line: 2, .. }));
        assert!(err.to_string().starts_with("bad.trace:2:"));
    }

    #[test]
    fn test_events_and_regions_agree_single_thread() {
        let text = "0x1000:4\n0x1004:2\n---\n0x1000:4\n0x1004:2\n---\n0x2000:1\n";

        for mode in [ReplayMode::Events, ReplayMode::Regions] {
            let session = Session::init(SessionConfig::default()).unwrap();
            let stats = replay(&session, &[trace(text)], mode).unwrap();
            assert_eq!(stats.events, 5);
            session.flush_all_groups().unwrap();

            let registry = session.registry();
            assert_eq!(registry.lookup(Address(0x1000)).unwrap().exec_count, 2, "{mode}");
            assert_eq!(registry.lookup(Address(0x1004)).unwrap().exec_count, 2, "{mode}");
            assert_eq!(registry.lookup(Address(0x2000)).unwrap().exec_count, 1, "{mode}");
        }
    }

    #[test]
    fn test_regions_mode_shares_groups() {
        let session = Session::init(SessionConfig::default()).unwrap();
        let text = "0x1000:4\n---\n0x1000:4\n";
        replay(&session, &[trace(text), trace(text)], ReplayMode::Regions).unwrap();
        assert_eq!(session.groups().len(), 1);
    }

    #[test]
    fn test_size_conflict_fails_replay() {
        let session = Session::init(SessionConfig::default()).unwrap();
        let result = replay(&session, &[trace("0x1000:4\n0x1000:2\n")], ReplayMode::Events);
        assert!(matches!(result, Err(ReplayError::Profiler(ProfilerError::SizeMismatch { .. }))));
        assert!(session.fault().is_some());
    }
}
