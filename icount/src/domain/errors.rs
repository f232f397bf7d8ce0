//! Structured error types for icount
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::types::Address;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the profiling engine.
///
/// `SizeMismatch`, `EmptyGroup` and `RegistryFull` are consistency errors:
/// once one is raised the session is faulted and refuses to publish a
/// snapshot.
#[derive(Error, Debug)]
pub enum ProfilerError {
    #[error(
        "instruction at {address} observed with size {observed}, previously recorded as {recorded}"
    )]
    SizeMismatch { address: Address, recorded: u32, observed: u32 },

    #[error("instruction group must contain at least one instruction")]
    EmptyGroup,

    #[error("trace buffer capacity must be at least one entry")]
    ZeroCapacity,

    #[error("registry is full ({0} unique instructions)")]
    RegistryFull(usize),

    #[error("{0} thread context(s) were never drained")]
    ThreadsAlive(usize),

    #[error("session aborted after a consistency error: {0}")]
    SessionFaulted(String),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}

impl ProfilerError {
    /// Returns true for errors that invalidate every count of the session
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            ProfilerError::Snapshot(_)
                | ProfilerError::ZeroCapacity
                | ProfilerError::ThreadsAlive(_)
        )
    }
}

/// I/O failures around snapshot files
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Failed to read snapshot {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write snapshot {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Reasons a snapshot or trace line is skipped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedLine {
    #[error("missing {0} field")]
    MissingField(&'static str),

    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error("invalid size {0:?}")]
    InvalidSize(String),

    #[error("invalid execution count {0:?}")]
    InvalidCount(String),

    #[error("unexpected trailing field {0:?}")]
    TrailingField(String),
}

/// Failures while replaying recorded traces
#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("Failed to read trace {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: {reason}")]
    Malformed {
        path: PathBuf,
        line: usize,
        #[source]
        reason: MalformedLine,
    },

    #[error("replay thread for {0} panicked")]
    ThreadPanicked(String),

    #[error(transparent)]
    Profiler(#[from] ProfilerError),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
