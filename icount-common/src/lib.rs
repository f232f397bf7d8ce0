//! # Shared Record Layout (Instrumentation ↔ Engine)
//!
//! Defines the raw records and constants shared between the code an
//! instrumentation layer injects into the executed instruction stream and the
//! `icount` engine that consumes them. Types use `#[repr(C)]` so injected code
//! can store fields at fixed offsets without going through Rust.
//!
//! ## Key Types
//!
//! - [`InsRef`] - One executed instruction, appended to a per-thread buffer
//!
//! ## Constants
//!
//! - [`MAX_NUM_INS_REFS`] - Default per-thread buffer capacity
//! - [`SNAPSHOT_FIELD_SEPARATOR`] - Field separator of the snapshot text format

#![cfg_attr(not(test), no_std)]

// ============================================================================
// Buffer Constants
// ============================================================================

/// Default number of [`InsRef`] entries a per-thread buffer holds.
///
/// Must be large enough to hold every entry appended between two drain
/// callbacks of the longest region, otherwise the buffer drains mid-region.
pub const MAX_NUM_INS_REFS: usize = 8192;

// ============================================================================
// Snapshot Format
// ============================================================================

/// Separator between `address`, `size` and `exec_count` in a snapshot line.
pub const SNAPSHOT_FIELD_SEPARATOR: char = ':';

/// Maximum number of non-numeric characters tolerated before the address
/// field (`0x`, `0X`, legacy single-character markers).
pub const SNAPSHOT_MAX_ADDRESS_PREFIX: usize = 2;

// ============================================================================
// Shared Data Structures
// ============================================================================

/// An executed instruction as written by injected code.
///
/// **Memory Layout**: `#[repr(C)]`, 16 bytes, `pc` at offset 0 and `tag` at
/// offset 8, so injected stores can address the fields directly.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct InsRef {
    /// Program counter of the executed instruction.
    pub pc: u64,

    /// Opcode or byte length of the instruction, depending on what the
    /// instrumentation layer stores. Interpreted at drain time.
    pub tag: u32,

    #[allow(clippy::pub_underscore_fields)]
    pub _padding: [u8; 4],
}

impl InsRef {
    /// Create a new entry for `pc` carrying `tag`.
    #[must_use]
    pub const fn new(pc: u64, tag: u32) -> Self {
        Self { pc, tag, _padding: [0; 4] }
    }
}
