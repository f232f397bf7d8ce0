//! Domain types providing compile-time safety and self-documentation
//!
//! These newtype wrappers prevent mixing up a program counter with a registry
//! handle or a plain count, and make function signatures more expressive.

use serde::Serialize;
use std::fmt;

/// Code location of an instruction (program counter)
///
/// Opaque key: the engine never dereferences it, it only uses it as the
/// identity of a unique instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Address(pub u64);

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl From<u64> for Address {
    fn from(pc: u64) -> Self {
        Address(pc)
    }
}

/// Handle to a record owned by a [`Registry`](crate::profiling::Registry)
///
/// This is an index into the registry's record arena, not an owning
/// reference. It stays valid for the lifetime of the registry that issued it
/// and means nothing to any other registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub(crate) u32);

impl InstrId {
    /// Position of the record in the registry arena
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for InstrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Instr#{}", self.0)
    }
}

/// One unique instruction and its execution count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UniqueInstruction {
    pub address: Address,
    /// Byte length of the static instruction
    pub size: u32,
    /// Number of times the instruction executed (saturating)
    pub exec_count: u64,
}

impl UniqueInstruction {
    /// A freshly observed instruction that has not executed yet
    #[must_use]
    pub fn new(address: Address, size: u32) -> Self {
        Self { address, size, exec_count: 0 }
    }
}
