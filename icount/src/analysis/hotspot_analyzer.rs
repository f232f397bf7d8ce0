//! Hotspot analysis for instruction counts.
//!
//! Ranks unique instructions by execution count to show where a run spent
//! its dynamic instructions.
//!
//! # Architecture
//!
//! - **`analyze_hotspots()`** - Batch ranking of a record slice (registry
//!   copy or parsed snapshot)
//! - **`SizeProfile`** - Executions broken down by instruction length
//!
//! # Performance
//!
//! - `analyze_hotspots()`: O(n log n) where n = unique instructions (sorting)

// Percentage calculations intentionally convert u64 to f64
#![allow(clippy::cast_precision_loss)]

use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::{Address, UniqueInstruction};

// =============================================================================
// INSTRUCTION HOTSPOT (OUTPUT TYPE)
// =============================================================================

/// An instruction with its share of all executions.
///
/// ```text
/// HOTSPOTS
/// ─────────────────────────────────
///   0x401a2c  (3 bytes)   18.2%   1532019
///   0x401a2f  (2 bytes)   18.2%   1532019
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstructionHotspot {
    pub address: Address,

    /// Byte length of the instruction.
    pub size: u32,

    /// Execution count.
    pub count: u64,

    /// Percentage of all executions (0.0 - 100.0).
    pub percentage: f64,
}

/// Rank the `top` most executed instructions.
///
/// Instructions that never executed are left out. Ties are broken by
/// ascending address so the ranking is deterministic.
///
/// # Arguments
/// * `records` - Instruction records to rank
/// * `top` - Maximum number of hotspots to return
///
/// # Returns
/// A vector of hotspots sorted by count (most frequent first)
#[must_use]
pub fn analyze_hotspots(records: &[UniqueInstruction], top: usize) -> Vec<InstructionHotspot> {
    let total: u64 = records.iter().fold(0u64, |acc, r| acc.saturating_add(r.exec_count));

    let mut ranked: Vec<&UniqueInstruction> = records.iter().filter(|r| r.exec_count > 0).collect();
    ranked.sort_unstable_by(|a, b| b.exec_count.cmp(&a.exec_count).then(a.address.cmp(&b.address)));

    ranked
        .into_iter()
        .take(top)
        .map(|r| {
            let percentage =
                if total > 0 { (r.exec_count as f64 / total as f64) * 100.0 } else { 0.0 };
            InstructionHotspot { address: r.address, size: r.size, count: r.exec_count, percentage }
        })
        .collect()
}

// =============================================================================
// SIZE PROFILE
// =============================================================================

/// Executions and unique instructions per instruction length
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SizeProfile {
    /// size → (unique instructions, executions)
    pub by_size: BTreeMap<u32, (usize, u64)>,
}

impl SizeProfile {
    #[must_use]
    pub fn from_records(records: &[UniqueInstruction]) -> Self {
        let mut by_size: BTreeMap<u32, (usize, u64)> = BTreeMap::new();
        for r in records {
            let entry = by_size.entry(r.size).or_default();
            entry.0 += 1;
            entry.1 = entry.1.saturating_add(r.exec_count);
        }
        Self { by_size }
    }

    /// Average executed instruction length, weighted by execution count
    #[must_use]
    pub fn mean_executed_size(&self) -> Option<f64> {
        let (bytes, executions) = self
            .by_size
            .iter()
            .fold((0f64, 0u64), |(b, e), (&size, &(_, count))| {
                (b + f64::from(size) * count as f64, e.saturating_add(count))
            });
        (executions > 0).then(|| bytes / executions as f64)
    }
}
