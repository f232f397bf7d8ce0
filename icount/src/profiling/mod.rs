//! Profiling core modules
//!
//! This module contains the counting engine driven by an instrumentation
//! layer:
//! - Unique instruction registry (address -> size, execution count)
//! - Instruction groups and their counters
//! - Per-thread trace buffers and the context that drains them
//! - Size decoding of buffered tags
//! - The session tying them together

pub mod decoder;
pub mod group;
pub mod registry;
pub mod session;
pub mod thread_context;
pub mod trace_buffer;

// Re-export common types
pub use decoder::{SizeDecoder, TaggedSize};
pub use group::{FlushStats, GroupTable, InstructionGroup, RegionCounter};
pub use registry::Registry;
pub use session::{Session, SessionConfig};
pub use thread_context::ThreadContext;
pub use trace_buffer::{BufferState, TraceBuffer};
