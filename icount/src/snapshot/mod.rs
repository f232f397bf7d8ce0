//! Snapshot merge and dump
//!
//! A snapshot is the text form of a registry, one `address:size:exec_count`
//! line per unique instruction. Dumping a registry and merging the result
//! into an empty one reproduces it exactly; merging into a non-empty one adds
//! the counts, which is how runs of the same program accumulate.

pub mod dump;
pub mod format;
pub mod merge;

pub use dump::{dump_snapshot, write_snapshot, DumpOutcome, RegistrySummary};
pub use format::{parse_address, parse_line, SnapshotRecord};
pub use merge::{merge_from_reader, merge_from_snapshot, MergeStats};
