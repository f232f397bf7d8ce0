//! Per-thread trace buffer
//!
//! Fixed-capacity run of [`InsRef`] entries owned by exactly one thread.
//! Appending never synchronizes; the owning [`ThreadContext`] drains the
//! buffer into the registry when it fills up, on explicit request, and at
//! thread teardown.
//!
//! [`ThreadContext`]: super::ThreadContext

use icount_common::InsRef;

use crate::domain::ProfilerError;

/// Fill state of a trace buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Position at start
    Empty,
    /// Some entries, room for more
    Filling,
    /// Next append would overflow; must drain first
    Full,
}

/// Fixed-capacity buffer of executed-instruction records
#[derive(Debug)]
pub struct TraceBuffer {
    entries: Box<[InsRef]>,
    pos: usize,
}

impl TraceBuffer {
    /// Allocate a buffer holding `capacity` entries.
    ///
    /// # Errors
    /// [`ProfilerError::ZeroCapacity`] if `capacity` is zero.
    pub fn new(capacity: usize) -> Result<Self, ProfilerError> {
        if capacity == 0 {
            return Err(ProfilerError::ZeroCapacity);
        }
        Ok(Self { entries: vec![InsRef::default(); capacity].into_boxed_slice(), pos: 0 })
    }

    /// Append one entry. Returns `false`, leaving the buffer unchanged, if it
    /// is full.
    #[inline]
    pub fn push(&mut self, entry: InsRef) -> bool {
        match self.entries.get_mut(self.pos) {
            Some(slot) => {
                *slot = entry;
                self.pos += 1;
                true
            }
            None => false,
        }
    }

    /// Entries appended since the last reset
    #[must_use]
    pub fn filled(&self) -> &[InsRef] {
        &self.entries[..self.pos]
    }

    /// Move the write position back to the start
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.pos == self.entries.len()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn state(&self) -> BufferState {
        if self.is_empty() {
            BufferState::Empty
        } else if self.is_full() {
            BufferState::Full
        } else {
            BufferState::Filling
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(TraceBuffer::new(0), Err(ProfilerError::ZeroCapacity)));
    }

    #[test]
    fn test_state_transitions() {
        let mut buf = TraceBuffer::new(2).unwrap();
        assert_eq!(buf.state(), BufferState::Empty);

        assert!(buf.push(InsRef::new(0x10, 4)));
        assert_eq!(buf.state(), BufferState::Filling);

        assert!(buf.push(InsRef::new(0x14, 4)));
        assert_eq!(buf.state(), BufferState::Full);

        // Position never exceeds capacity
        assert!(!buf.push(InsRef::new(0x18, 4)));
        assert_eq!(buf.len(), 2);

        buf.reset();
        assert_eq!(buf.state(), BufferState::Empty);
        assert_eq!(buf.capacity(), 2);
    }

    #[test]
    fn test_filled_returns_entries_in_order() {
        let mut buf = TraceBuffer::new(4).unwrap();
        buf.push(InsRef::new(0x10, 1));
        buf.push(InsRef::new(0x11, 2));

        let pcs: Vec<u64> = buf.filled().iter().map(|e| e.pc).collect();
        assert_eq!(pcs, vec![0x10, 0x11]);
    }
}
