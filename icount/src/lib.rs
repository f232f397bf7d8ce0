//! # icount - Instruction Execution Counting Engine
//!
//! icount counts how often every instruction of a program executes. An
//! instrumentation layer (binary translator, emulator, tracer) feeds it
//! "this instruction just executed" events; icount deduplicates them by
//! address, keeps the per-thread hot path free of shared-memory traffic, and
//! writes a deterministic text snapshot that later runs can merge into.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Instrumentation Layer                        │
//! │          (injected code, one callback per region/event)         │
//! └───────────────┬─────────────────────────────┬───────────────────┘
//!                 │ region discovered           │ instruction executed
//!                 ▼                             ▼
//! ┌───────────────────────────┐   ┌─────────────────────────────────┐
//! │     InstructionGroup      │   │   ThreadContext (per thread)    │
//! │  members + RegionCounter  │   │   TraceBuffer of InsRef         │
//! │  (bumped per execution)   │   │   (drained when full / at end)  │
//! └─────────────┬─────────────┘   └────────────────┬────────────────┘
//!               │ flush                            │ drain
//!               ▼                                  ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │              Registry: address → (size, exec_count)             │
//! └───────────────┬─────────────────────────────▲───────────────────┘
//!                 │ dump at shutdown            │ merge at init
//!                 ▼                             │
//! ┌─────────────────────────────────────────────┴───────────────────┐
//! │            Snapshot file  (0x401000:4:1532 per line)            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! ### Core Engine Modules
//!
//! - [`profiling`]: registry, instruction groups, trace buffers and the
//!   [`profiling::Session`] that owns them
//!   - `group`: region counters (racy by design) and the group table
//!   - `thread_context`: per-thread buffer with drain-before-overflow
//!   - `decoder`: turns buffered opcode tags into instruction sizes
//!
//! - [`snapshot`]: the `address:size:count` text format, merge and dump
//!
//! ### Host and Reporting Modules
//!
//! - [`replay`]: drives a session from recorded trace files, one thread each
//! - [`analysis`]: hottest instructions and size profile
//! - [`export`]: JSON session report
//! - [`cli`]: command-line argument parsing and configuration
//! - [`domain`]: core types (Address, InstrId, UniqueInstruction) and errors
//!
//! ## Counting Modes
//!
//! ### 1. Group Counters
//! - One counter per static region, incremented once per region execution
//! - Flush adds the counter to every member instruction, then resets it
//! - **Pros**: one memory write per region execution
//! - **Cons**: concurrent increments can be lost (counts never exceed truth)
//!
//! ### 2. Per-Thread Trace Buffers
//! - One `InsRef` appended per executed instruction, no lock
//! - Drained into the registry when full and at thread end
//! - **Pros**: exact counts under any number of threads
//! - **Cons**: one buffer write per executed instruction
//!
//! ## Typical Usage
//!
//! ```bash
//! # Replay a recorded trace and save the counts
//! icount replay --trace run.trace -o counts.txt
//!
//! # Accumulate another run into the same snapshot
//! icount replay --trace run2.trace --merge counts.txt -o counts.txt
//!
//! # Inspect the result
//! icount summary counts.txt --top 20
//! ```

// Expose modules for testing
pub mod analysis;
pub mod cli;
pub mod domain;
pub mod export;
pub mod profiling;
pub mod replay;
pub mod snapshot;
