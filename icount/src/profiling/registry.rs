//! # Unique Instruction Registry
//!
//! Process-wide map from instruction address to `{size, exec_count}`.
//!
//! Records live in an arena (`Vec`) owned by the registry; everything else
//! refers to them through [`InstrId`] handles, so a group holding handles
//! never owns or frees a record. An address index maps each program counter
//! to its handle.
//!
//! ## Locking
//!
//! A single mutex protects index and arena. Every public operation takes it
//! for exactly one operation and releases it before returning; callers never
//! hold it across wider work. `bump_all` and `observe` exist so that a group
//! flush or a buffer drain pays one acquisition per group or per distinct
//! instruction instead of one per member.

use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::domain::{Address, InstrId, ProfilerError, UniqueInstruction};

/// Concurrent registry of unique instructions
#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<RegistryState>,
}

#[derive(Debug, Default)]
struct RegistryState {
    index: HashMap<Address, InstrId>,
    records: Vec<UniqueInstruction>,
}

impl RegistryState {
    fn fetch_or_create(&mut self, address: Address, size: u32) -> Result<InstrId, ProfilerError> {
        if let Some(&id) = self.index.get(&address) {
            let recorded = self.records[id.index()].size;
            if recorded != size {
                return Err(ProfilerError::SizeMismatch { address, recorded, observed: size });
            }
            return Ok(id);
        }

        let raw = u32::try_from(self.records.len())
            .map_err(|_| ProfilerError::RegistryFull(self.records.len()))?;
        let id = InstrId(raw);
        self.records.push(UniqueInstruction::new(address, size));
        self.index.insert(address, id);
        debug!("new instruction {address} size={size} -> {id}");
        Ok(id)
    }

    fn bump(&mut self, id: InstrId, delta: u64) {
        match self.records.get_mut(id.index()) {
            Some(record) => record.exec_count = record.exec_count.saturating_add(delta),
            None => debug_assert!(false, "{id} was not issued by this registry"),
        }
    }
}

impl Registry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Counts are plain integers updated in place, a panic in another holder
    // cannot leave them torn.
    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Look up `address`, creating a zero-count record if it is new.
    ///
    /// # Errors
    /// Returns [`ProfilerError::SizeMismatch`] if `address` was recorded with a
    /// different size, and [`ProfilerError::RegistryFull`] if no more handles
    /// can be issued.
    pub fn fetch_or_create(&self, address: Address, size: u32) -> Result<InstrId, ProfilerError> {
        self.lock().fetch_or_create(address, size)
    }

    /// Add `delta` to the execution count of `id`.
    pub fn bump(&self, id: InstrId, delta: u64) {
        self.lock().bump(id, delta);
    }

    /// Add `delta` to every record in `ids`, under one lock acquisition.
    pub fn bump_all(&self, ids: &[InstrId], delta: u64) {
        if delta == 0 {
            return;
        }
        let mut state = self.lock();
        for &id in ids {
            state.bump(id, delta);
        }
    }

    /// `fetch_or_create` followed by `bump`, under one lock acquisition.
    ///
    /// # Errors
    /// Same as [`Registry::fetch_or_create`]; nothing is counted on error.
    pub fn observe(
        &self,
        address: Address,
        size: u32,
        delta: u64,
    ) -> Result<InstrId, ProfilerError> {
        let mut state = self.lock();
        let id = state.fetch_or_create(address, size)?;
        state.bump(id, delta);
        Ok(id)
    }

    /// Current state of the record behind `id`
    #[must_use]
    pub fn get(&self, id: InstrId) -> Option<UniqueInstruction> {
        self.lock().records.get(id.index()).copied()
    }

    /// Current state of the record for `address`, if it was ever observed
    #[must_use]
    pub fn lookup(&self, address: Address) -> Option<UniqueInstruction> {
        let state = self.lock();
        state.index.get(&address).map(|id| state.records[id.index()])
    }

    /// Number of unique instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of all execution counts (saturating)
    #[must_use]
    pub fn total_executions(&self) -> u64 {
        self.lock().records.iter().fold(0u64, |acc, r| acc.saturating_add(r.exec_count))
    }

    /// Visit every record in ascending address order.
    ///
    /// The registry lock is held for the whole visit, so registration from
    /// other threads waits until it returns. The visitor must not call back
    /// into this registry.
    pub fn for_each<F: FnMut(&UniqueInstruction)>(&self, mut visitor: F) {
        let state = self.lock();
        let mut order: Vec<&UniqueInstruction> = state.records.iter().collect();
        order.sort_unstable_by_key(|r| r.address);
        for record in order {
            visitor(record);
        }
    }

    /// Copy of all records in ascending address order
    #[must_use]
    pub fn records(&self) -> Vec<UniqueInstruction> {
        let mut out = Vec::with_capacity(self.len());
        self.for_each(|r| out.push(*r));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_or_create_deduplicates_by_address() {
        let registry = Registry::new();
        let a = registry.fetch_or_create(Address(0x1000), 4).unwrap();
        let b = registry.fetch_or_create(Address(0x1004), 2).unwrap();
        let again = registry.fetch_or_create(Address(0x1000), 4).unwrap();

        assert_eq!(a, again);
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(a).unwrap().exec_count, 0);
    }

    #[test]
    fn test_size_mismatch_is_rejected() {
        let registry = Registry::new();
        registry.fetch_or_create(Address(0x1000), 4).unwrap();

        let err = registry.fetch_or_create(Address(0x1000), 3).unwrap_err();
        assert!(matches!(
            err,
            ProfilerError::SizeMismatch { address: Address(0x1000), recorded: 4, observed: 3 }
        ));
        // The first-seen size is kept
        assert_eq!(registry.lookup(Address(0x1000)).unwrap().size, 4);
    }

    #[test]
    fn test_bump_accumulates() {
        let registry = Registry::new();
        let id = registry.fetch_or_create(Address(0x40), 1).unwrap();
        registry.bump(id, 3);
        registry.bump(id, 4);
        assert_eq!(registry.get(id).unwrap().exec_count, 7);
    }

    #[test]
    fn test_bump_saturates() {
        let registry = Registry::new();
        let id = registry.fetch_or_create(Address(0x40), 1).unwrap();
        registry.bump(id, u64::MAX - 1);
        registry.bump(id, 10);
        assert_eq!(registry.get(id).unwrap().exec_count, u64::MAX);
        assert_eq!(registry.total_executions(), u64::MAX);
    }

    #[test]
    fn test_observe_counts_nothing_on_mismatch() {
        let registry = Registry::new();
        registry.observe(Address(0x10), 2, 5).unwrap();
        assert!(registry.observe(Address(0x10), 8, 5).is_err());
        assert_eq!(registry.lookup(Address(0x10)).unwrap().exec_count, 5);
    }

    #[test]
    fn test_bump_all() {
        let registry = Registry::new();
        let ids: Vec<InstrId> = [(0x10, 2), (0x12, 4), (0x16, 1)]
            .into_iter()
            .map(|(a, s)| registry.fetch_or_create(Address(a), s).unwrap())
            .collect();
        registry.bump_all(&ids, 9);
        assert!(registry.records().iter().all(|r| r.exec_count == 9));
        assert_eq!(registry.total_executions(), 27);
    }

    #[test]
    fn test_for_each_visits_in_address_order() {
        let registry = Registry::new();
        for addr in [0x30, 0x10, 0x20] {
            registry.fetch_or_create(Address(addr), 1).unwrap();
        }
        let mut seen = Vec::new();
        registry.for_each(|r| seen.push(r.address.0));
        assert_eq!(seen, vec![0x10, 0x20, 0x30]);
    }

    #[test]
    fn test_lookup_unknown_address() {
        let registry = Registry::new();
        assert!(registry.lookup(Address(0x1)).is_none());
        assert!(registry.is_empty());
    }
}
