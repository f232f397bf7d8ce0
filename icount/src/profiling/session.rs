//! # Profiling Session
//!
//! The one process-wide context of a profiling run. It owns the registry, the
//! group table and the grand total of drained events, and exposes the hooks
//! an instrumentation layer calls:
//!
//! | Hook                      | When                                  |
//! |---------------------------|---------------------------------------|
//! | [`Session::init`]         | process start (merges a prior snapshot) |
//! | [`Session::on_region_discovered`] | first sight of a code region  |
//! | [`Session::on_thread_start`] / [`Session::on_thread_end`] | thread lifecycle |
//! | [`Session::flush_all_groups`] | quiescent points                  |
//! | [`Session::shutdown`]     | process exit (flush, dump, release)   |
//!
//! ## Faults
//!
//! A consistency error (an address seen with two sizes, an empty region)
//! makes every count of the run suspect. The first one is recorded; from then
//! on `flush_all_groups` and `shutdown` fail with
//! [`ProfilerError::SessionFaulted`] and no snapshot is written. Memory is
//! still released normally when the session is dropped.
//!
//! ## Thread Contexts
//!
//! A [`ThreadContext`] borrows the session, so the session cannot be shut
//! down while a context is alive. Every context is drained by
//! [`Session::on_thread_end`] or by its `Drop` before `shutdown` runs. A
//! context leaked with `mem::forget` is never drained; `shutdown` then
//! refuses with [`ProfilerError::ThreadsAlive`] instead of writing an
//! incomplete snapshot.

use log::{error, info};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use icount_common::MAX_NUM_INS_REFS;

use super::decoder::{SizeDecoder, TaggedSize};
use super::group::{FlushStats, GroupTable, InstructionGroup};
use super::registry::Registry;
use super::thread_context::ThreadContext;
use crate::domain::{Address, ProfilerError, UniqueInstruction};
use crate::export::SessionReport;
use crate::snapshot::{dump_snapshot, merge_from_snapshot, MergeStats};

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Where to write the per-instruction snapshot at shutdown. Without it
    /// only an aggregate summary is produced.
    pub output_path: Option<PathBuf>,
    /// Prior snapshot folded into the registry at init
    pub merge_input_path: Option<PathBuf>,
    /// Entries per thread trace buffer
    pub buffer_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { output_path: None, merge_input_path: None, buffer_capacity: MAX_NUM_INS_REFS }
    }
}

/// State shared by the session and every live thread context
pub(crate) struct SessionShared {
    registry: Registry,
    groups: GroupTable,
    decoder: Box<dyn SizeDecoder>,
    buffer_capacity: usize,
    grand_total: Mutex<u64>,
    live_threads: AtomicUsize,
    threads_seen: AtomicUsize,
    fault: Mutex<Option<String>>,
}

impl SessionShared {
    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn decoder(&self) -> &dyn SizeDecoder {
        self.decoder.as_ref()
    }

    pub(crate) fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Record the first fatal error seen by any thread
    pub(crate) fn checked<T>(&self, result: Result<T, ProfilerError>) -> Result<T, ProfilerError> {
        if let Err(e) = &result {
            if e.is_fatal() {
                let mut fault = self.fault.lock().unwrap_or_else(PoisonError::into_inner);
                if fault.is_none() {
                    error!("profiling session faulted: {e}");
                    *fault = Some(e.to_string());
                }
            }
        }
        result
    }

    pub(crate) fn fold_thread_total(&self, drained: u64) {
        let mut total = self.grand_total.lock().unwrap_or_else(PoisonError::into_inner);
        *total = total.saturating_add(drained);
        self.live_threads.fetch_sub(1, Ordering::AcqRel);
    }

    fn fault(&self) -> Option<String> {
        self.fault.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn ensure_healthy(&self) -> Result<(), ProfilerError> {
        match self.fault() {
            Some(reason) => Err(ProfilerError::SessionFaulted(reason)),
            None => Ok(()),
        }
    }
}

/// A profiling run
pub struct Session {
    shared: SessionShared,
    config: SessionConfig,
    merge: Option<MergeStats>,
}

impl Session {
    /// Start a session whose trace buffers carry instruction sizes.
    ///
    /// # Errors
    /// [`ProfilerError::ZeroCapacity`] for an empty buffer size, or a size
    /// mismatch inside the prior snapshot.
    pub fn init(config: SessionConfig) -> Result<Self, ProfilerError> {
        Self::with_decoder(config, TaggedSize)
    }

    /// Start a session that decodes trace buffer tags with `decoder`.
    ///
    /// # Errors
    /// Same as [`Session::init`].
    pub fn with_decoder<D>(config: SessionConfig, decoder: D) -> Result<Self, ProfilerError>
    where
        D: SizeDecoder + 'static,
    {
        if config.buffer_capacity == 0 {
            return Err(ProfilerError::ZeroCapacity);
        }

        let shared = SessionShared {
            registry: Registry::new(),
            groups: GroupTable::new(),
            decoder: Box::new(decoder),
            buffer_capacity: config.buffer_capacity,
            grand_total: Mutex::new(0),
            live_threads: AtomicUsize::new(0),
            threads_seen: AtomicUsize::new(0),
            fault: Mutex::new(None),
        };

        let merge = config
            .merge_input_path
            .as_deref()
            .map(|path| merge_from_snapshot(&shared.registry, path))
            .transpose()?;

        info!(
            "profiling session started (buffer: {} entries, prior instructions: {})",
            config.buffer_capacity,
            shared.registry.len()
        );
        Ok(Self { shared, config, merge })
    }

    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.shared.registry
    }

    #[must_use]
    pub fn groups(&self) -> &GroupTable {
        &self.shared.groups
    }

    /// Register a newly discovered region and return the group whose counter
    /// the instrumented code must bump on every execution.
    ///
    /// # Errors
    /// [`ProfilerError::EmptyGroup`] or [`ProfilerError::SizeMismatch`]; both
    /// fault the session.
    pub fn on_region_discovered(
        &self,
        instructions: &[(Address, u32)],
    ) -> Result<Arc<InstructionGroup>, ProfilerError> {
        self.shared.checked(self.shared.groups.register(&self.shared.registry, instructions))
    }

    /// Allocate the calling thread's trace buffer.
    ///
    /// # Errors
    /// Only if the configured buffer capacity is invalid.
    pub fn on_thread_start(&self) -> Result<ThreadContext<'_>, ProfilerError> {
        let ctx = ThreadContext::new(&self.shared)?;
        self.shared.live_threads.fetch_add(1, Ordering::AcqRel);
        self.shared.threads_seen.fetch_add(1, Ordering::Relaxed);
        Ok(ctx)
    }

    /// Drain the thread's remaining entries, fold its total into the grand
    /// total and free its buffer. Returns the thread's drained total.
    ///
    /// # Errors
    /// Any consistency error raised by the final drain.
    pub fn on_thread_end(&self, mut ctx: ThreadContext<'_>) -> Result<u64, ProfilerError> {
        ctx.retire()
    }

    /// Propagate every group counter into the registry and reset it.
    ///
    /// No profiled code may increment the flushed groups while this runs.
    ///
    /// # Errors
    /// [`ProfilerError::SessionFaulted`] after a consistency error.
    pub fn flush_all_groups(&self) -> Result<FlushStats, ProfilerError> {
        self.shared.ensure_healthy()?;
        Ok(self.shared.groups.flush(&self.shared.registry))
    }

    /// Fold another snapshot into the registry.
    ///
    /// # Errors
    /// A size disagreement with already-known instructions faults the session.
    pub fn merge_snapshot(&self, path: &Path) -> Result<MergeStats, ProfilerError> {
        self.shared.checked(merge_from_snapshot(&self.shared.registry, path))
    }

    /// Events drained by threads that have ended
    #[must_use]
    pub fn drained_events(&self) -> u64 {
        *self.shared.grand_total.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Thread contexts started and not yet ended
    #[must_use]
    pub fn live_threads(&self) -> usize {
        self.shared.live_threads.load(Ordering::Acquire)
    }

    /// Reason the session faulted, if it did
    #[must_use]
    pub fn fault(&self) -> Option<String> {
        self.shared.fault()
    }

    /// End the session: flush groups, write the snapshot (or produce the
    /// summary) and release everything.
    ///
    /// Thread contexts borrow the session, so all of them have been drained
    /// by the time this can be called:
    ///
    /// ```compile_fail
    /// use icount::domain::Address;
    /// use icount::profiling::{Session, SessionConfig};
    ///
    /// let session = Session::init(SessionConfig::default()).unwrap();
    /// let mut ctx = session.on_thread_start().unwrap();
    /// ctx.record_event(Address(0x1000), 4).unwrap();
    /// session.shutdown().unwrap();
    /// drop(ctx);
    /// ```
    ///
    /// # Errors
    /// [`ProfilerError::SessionFaulted`] without writing anything after a
    /// consistency error, [`ProfilerError::ThreadsAlive`] if a context was
    /// leaked without being drained, or a snapshot write failure.
    pub fn shutdown(self) -> Result<SessionReport, ProfilerError> {
        self.finish()
    }

    /// Like [`Session::shutdown`], also returning the final registry
    /// contents in address order.
    ///
    /// # Errors
    /// Same as [`Session::shutdown`].
    pub fn shutdown_with_records(
        self,
    ) -> Result<(SessionReport, Vec<UniqueInstruction>), ProfilerError> {
        let report = self.finish()?;
        Ok((report, self.shared.registry.records()))
    }

    fn finish(&self) -> Result<SessionReport, ProfilerError> {
        self.shared.ensure_healthy()?;

        let live = self.live_threads();
        if live > 0 {
            error!("{live} thread context(s) never drained, snapshot not written");
            return Err(ProfilerError::ThreadsAlive(live));
        }

        let flush = self.shared.groups.flush(&self.shared.registry);
        let output = dump_snapshot(&self.shared.registry, self.config.output_path.as_deref())?;

        let report = SessionReport {
            unique_instructions: self.shared.registry.len(),
            total_executions: self.shared.registry.total_executions(),
            groups: self.shared.groups.len(),
            flush,
            drained_events: self.drained_events(),
            threads: self.shared.threads_seen.load(Ordering::Relaxed),
            merge: self.merge,
            output,
        };
        info!(
            "profiling session finished: {} unique instructions, {} executions",
            report.unique_instructions, report.total_executions
        );
        Ok(report)
    }
}
