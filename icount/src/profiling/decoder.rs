//! Interpretation of trace buffer tags
//!
//! Injected code stores whatever is cheapest to materialize next to each
//! program counter: usually the opcode, sometimes the byte length. The
//! registry needs the byte length, so drains ask a [`SizeDecoder`].

use crate::domain::Address;

/// Maps a buffer entry `(address, tag)` to the instruction's byte length
pub trait SizeDecoder: Send + Sync {
    fn instruction_size(&self, address: Address, tag: u32) -> u32;
}

/// The tag already is the byte length
#[derive(Debug, Clone, Copy, Default)]
pub struct TaggedSize;

impl SizeDecoder for TaggedSize {
    #[inline]
    fn instruction_size(&self, _address: Address, tag: u32) -> u32 {
        tag
    }
}

impl<F> SizeDecoder for F
where
    F: Fn(Address, u32) -> u32 + Send + Sync,
{
    fn instruction_size(&self, address: Address, tag: u32) -> u32 {
        self(address, tag)
    }
}
