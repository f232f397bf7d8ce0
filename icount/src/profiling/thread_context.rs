//! # Per-Thread Profiling Context
//!
//! Each profiled thread owns one [`ThreadContext`]: its private trace buffer
//! plus the number of events it has drained so far.
//!
//! ## Buffer Lifecycle
//!
//! ```text
//! Empty ──record_event──▶ Filling ──record_event──▶ Full
//!   ▲                        │                        │
//!   │                  drain() (region end)    next record_event
//!   │                        ▼                        ▼
//!   └─────────────────── Draining ◀───────────────────┘
//! ```
//!
//! Draining turns raw entries into registry updates. Entries are tallied per
//! `(address, size)` first, so the registry lock is taken once per distinct
//! instruction rather than once per executed instruction.
//!
//! Teardown (`Session::on_thread_end`, or dropping the context) drains what
//! is left before the buffer is freed and folds the thread's total into the
//! session's grand total.

use log::{debug, error};
use std::collections::HashMap;

use icount_common::InsRef;

use super::session::SessionShared;
use super::trace_buffer::{BufferState, TraceBuffer};
use crate::domain::{Address, ProfilerError};

/// Thread-owned trace buffer bound to a session.
///
/// Borrows the session, which therefore outlives every context.
pub struct ThreadContext<'s> {
    shared: &'s SessionShared,
    buffer: TraceBuffer,
    /// Scratch tally reused across drains
    tally: HashMap<(Address, u32), u64>,
    drained: u64,
    retired: bool,
}

impl<'s> ThreadContext<'s> {
    pub(crate) fn new(shared: &'s SessionShared) -> Result<Self, ProfilerError> {
        let buffer = TraceBuffer::new(shared.buffer_capacity())?;
        Ok(Self { shared, buffer, tally: HashMap::new(), drained: 0, retired: false })
    }

    /// Record one executed instruction.
    ///
    /// `tag` is the opcode or size stored by the instrumentation, interpreted
    /// by the session's `SizeDecoder` at drain time. A full buffer is drained
    /// before the new entry is appended.
    ///
    /// # Errors
    /// Any consistency error raised by the drain that made room.
    #[inline]
    pub fn record_event(&mut self, address: Address, tag: u32) -> Result<(), ProfilerError> {
        let entry = InsRef::new(address.0, tag);
        if !self.buffer.push(entry) {
            self.drain()?;
            // Capacity is at least one, so an empty buffer always has room
            self.buffer.push(entry);
        }
        Ok(())
    }

    /// Convert buffered entries into registry counts and reset the buffer.
    ///
    /// Returns the number of entries drained.
    ///
    /// # Errors
    /// [`ProfilerError::SizeMismatch`] if an entry disagrees with the size
    /// already recorded for its address. The session is faulted.
    pub fn drain(&mut self) -> Result<usize, ProfilerError> {
        let drained = self.buffer.len();
        if drained == 0 {
            return Ok(0);
        }

        let decoder = self.shared.decoder();
        for entry in self.buffer.filled() {
            let address = Address(entry.pc);
            let size = decoder.instruction_size(address, entry.tag);
            *self.tally.entry((address, size)).or_insert(0) += 1;
        }
        self.buffer.reset();

        let registry = self.shared.registry();
        let result = self.tally.drain().try_for_each(|((address, size), count)| {
            registry.observe(address, size, count).map(drop)
        });
        self.shared.checked(result)?;

        self.drained += drained as u64;
        debug!("drained {drained} trace entries");
        Ok(drained)
    }

    /// Entries waiting in the buffer
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    #[must_use]
    pub fn buffer_state(&self) -> BufferState {
        self.buffer.state()
    }

    /// Entries this thread has drained into the registry
    #[must_use]
    pub fn drained_total(&self) -> u64 {
        self.drained
    }

    /// Final drain and fold into the session total. Runs at most once.
    pub(crate) fn retire(&mut self) -> Result<u64, ProfilerError> {
        if self.retired {
            return Ok(self.drained);
        }
        let result = self.drain();
        self.retired = true;
        self.shared.fold_thread_total(self.drained);
        result.map(|_| self.drained)
    }
}

impl Drop for ThreadContext<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.retire() {
            error!("trace buffer lost at thread teardown: {e}");
        }
    }
}
