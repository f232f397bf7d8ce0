//! # Instruction Groups and the Group Table
//!
//! A group represents one static code region (typically a basic block). All of
//! its instructions execute together, so one counter per group is enough: the
//! instrumented code bumps the group counter and the per-instruction counts are
//! reconciled later by [`GroupTable::flush`].
//!
//! ## Racy Counter
//!
//! [`RegionCounter::increment`] is a relaxed load followed by a relaxed store.
//! It never emits a locked read-modify-write, which keeps the hottest path
//! free of cache-line ping-pong, at the price of accepted lost updates:
//!
//! ```text
//! thread A: load 5          store 6
//! thread B:       load 5          store 6    → one increment lost
//! ```
//!
//! The result is an undercount under contention and an exact count without
//! it. It is never an overcount, and it is memory-safe because the storage
//! is an `AtomicU64`.
//!
//! ## Flush Protocol
//!
//! Flush swaps each counter to zero and adds the taken value to every member.
//! A second flush of the same interval therefore adds nothing. Flushing while
//! other threads still increment the same group is not supported: an
//! increment that loaded before the swap stores the old value back.

use log::debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::registry::Registry;
use crate::domain::{Address, InstrId, ProfilerError};

// =============================================================================
// REGION COUNTER
// =============================================================================

/// Per-group execution counter bumped by instrumented code
#[derive(Debug, Default)]
pub struct RegionCounter(AtomicU64);

impl RegionCounter {
    /// Count one execution of the region. See the module docs for the
    /// accepted race.
    #[inline]
    pub fn increment(&self) {
        let current = self.0.load(Ordering::Relaxed);
        self.0.store(current.wrapping_add(1), Ordering::Relaxed);
    }

    /// Executions counted since the last flush
    #[must_use]
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Reset to zero and return the previous value
    pub fn take(&self) -> u64 {
        self.0.swap(0, Ordering::Relaxed)
    }

    /// Storage location of the counter, for code that increments it directly.
    ///
    /// Valid for as long as the owning group is alive. Writers must only
    /// perform plain 64-bit stores to it.
    #[must_use]
    pub fn as_ptr(&self) -> *mut u64 {
        self.0.as_ptr()
    }
}

// =============================================================================
// INSTRUCTION GROUP
// =============================================================================

/// Immutable list of registry handles sharing one execution counter
#[derive(Debug)]
pub struct InstructionGroup {
    members: Box<[InstrId]>,
    counter: RegionCounter,
}

impl InstructionGroup {
    /// Register `instructions` (in order) and build a group over them.
    ///
    /// # Errors
    /// [`ProfilerError::EmptyGroup`] for an empty region, or any error of
    /// [`Registry::fetch_or_create`].
    pub fn new(
        registry: &Registry,
        instructions: &[(Address, u32)],
    ) -> Result<Self, ProfilerError> {
        if instructions.is_empty() {
            return Err(ProfilerError::EmptyGroup);
        }

        let members = instructions
            .iter()
            .map(|&(address, size)| registry.fetch_or_create(address, size))
            .collect::<Result<Box<[InstrId]>, _>>()?;

        Ok(Self { members, counter: RegionCounter::default() })
    }

    /// Member handles in region order
    #[must_use]
    pub fn members(&self) -> &[InstrId] {
        &self.members
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always false: groups are non-empty by construction
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The counter instrumented code bumps on every execution of the region
    #[must_use]
    pub fn counter(&self) -> &RegionCounter {
        &self.counter
    }

    /// Move this group's counter into its members' counts.
    ///
    /// Returns the number of executions that were propagated.
    pub fn flush_into(&self, registry: &Registry) -> u64 {
        let executions = self.counter.take();
        registry.bump_all(&self.members, executions);
        executions
    }
}

// =============================================================================
// GROUP TABLE
// =============================================================================

/// Outcome of one [`GroupTable::flush`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct FlushStats {
    /// Groups visited
    pub groups: usize,
    /// Groups whose counter was non-zero
    pub groups_executed: usize,
    /// Member instructions whose count was raised
    pub instructions_touched: usize,
    /// Sum of the group counters taken
    pub executions: u64,
}

/// Append-only collection of every group created during the run
#[derive(Debug, Default)]
pub struct GroupTable {
    groups: Mutex<Vec<Arc<InstructionGroup>>>,
}

impl GroupTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Arc<InstructionGroup>>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build a group over `instructions` and append it to the table.
    ///
    /// The registry lock is released before the table lock is taken.
    ///
    /// # Errors
    /// Same as [`InstructionGroup::new`]; nothing is appended on error.
    pub fn register(
        &self,
        registry: &Registry,
        instructions: &[(Address, u32)],
    ) -> Result<Arc<InstructionGroup>, ProfilerError> {
        let group = Arc::new(InstructionGroup::new(registry, instructions)?);
        self.lock().push(Arc::clone(&group));
        Ok(group)
    }

    /// Number of groups created so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current group list; the table lock is held only while
    /// copying.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<InstructionGroup>> {
        self.lock().clone()
    }

    /// Propagate every group's counter into its members and reset it.
    pub fn flush(&self, registry: &Registry) -> FlushStats {
        let groups = self.snapshot();
        let mut stats = FlushStats { groups: groups.len(), ..FlushStats::default() };

        for group in &groups {
            let executions = group.flush_into(registry);
            if executions > 0 {
                stats.groups_executed += 1;
                stats.instructions_touched += group.len();
                stats.executions = stats.executions.saturating_add(executions);
            }
        }

        debug!(
            "flushed {} groups ({} executed, {} executions)",
            stats.groups, stats.groups_executed, stats.executions
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> Vec<(Address, u32)> {
        vec![(Address(0x1000), 4), (Address(0x1004), 2)]
    }

    #[test]
    fn test_group_flush_propagates_counter() {
        let registry = Registry::new();
        let table = GroupTable::new();
        let group = table.register(&registry, &block()).unwrap();

        for _ in 0..5 {
            group.counter().increment();
        }
        let stats = table.flush(&registry);

        assert_eq!(registry.lookup(Address(0x1000)).unwrap().exec_count, 5);
        assert_eq!(registry.lookup(Address(0x1004)).unwrap().exec_count, 5);
        assert_eq!(group.counter().get(), 0);
        assert_eq!(
            stats,
            FlushStats { groups: 1, groups_executed: 1, instructions_touched: 2, executions: 5 }
        );
    }

    #[test]
    fn test_repeated_flush_does_not_double_count() {
        let registry = Registry::new();
        let table = GroupTable::new();
        let group = table.register(&registry, &block()).unwrap();

        group.counter().increment();
        table.flush(&registry);
        table.flush(&registry);
        group.counter().increment();
        table.flush(&registry);

        assert_eq!(registry.lookup(Address(0x1000)).unwrap().exec_count, 2);
    }

    #[test]
    fn test_groups_share_instructions() {
        let registry = Registry::new();
        let table = GroupTable::new();
        let a = table.register(&registry, &block()).unwrap();
        let b = table.register(&registry, &[(Address(0x1004), 2), (Address(0x1006), 1)]).unwrap();

        a.counter().increment();
        b.counter().increment();
        b.counter().increment();
        table.flush(&registry);

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.lookup(Address(0x1000)).unwrap().exec_count, 1);
        assert_eq!(registry.lookup(Address(0x1004)).unwrap().exec_count, 3);
        assert_eq!(registry.lookup(Address(0x1006)).unwrap().exec_count, 2);
    }

    #[test]
    fn test_members_preserve_region_order() {
        let registry = Registry::new();
        registry.fetch_or_create(Address(0x1004), 2).unwrap();
        let group = InstructionGroup::new(&registry, &block()).unwrap();

        let addrs: Vec<u64> =
            group.members().iter().map(|&id| registry.get(id).unwrap().address.0).collect();
        assert_eq!(addrs, vec![0x1000, 0x1004]);
    }

    #[test]
    fn test_empty_group_is_rejected() {
        let registry = Registry::new();
        let table = GroupTable::new();
        assert!(matches!(table.register(&registry, &[]), Err(ProfilerError::EmptyGroup)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_failed_registration_appends_nothing() {
        let registry = Registry::new();
        let table = GroupTable::new();
        table.register(&registry, &block()).unwrap();

        let result = table.register(&registry, &[(Address(0x1000), 8)]);
        assert!(matches!(result, Err(ProfilerError::SizeMismatch { .. })));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_counter_pointer_aliases_counter() {
        let counter = RegionCounter::default();
        counter.increment();
        assert_eq!(counter.get(), 1);
        assert!(!counter.as_ptr().is_null());
        assert_eq!(counter.take(), 1);
        assert_eq!(counter.get(), 0);
    }
}
