//! OS data-source layer: raw per-process kernel state as typed records.
//!
//! This module provides:
//! - `types`: typed records for each metric category
//! - `system`: system-wide constants probed once at startup
//! - `procfs`: the Linux /proc implementation of `ProcSource`
//!
//! The `ProcSource` trait is the seam between the sampler and the platform.
//! One implementation exists per platform family; the sampler never touches
//! kernel files directly.

pub mod procfs;
pub mod system;
pub mod types;

use std::sync::Arc;

use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};

use crate::error::ProbeError;

pub use procfs::LinuxProcfs;
pub use system::SystemInfo;
pub use types::{FdUsage, ProcIo, ProcLinks, ProcMem, ProcState, ProcTime, RunState};

/// Predicate deciding whether an environment variable name is retained.
pub type EnvFilter<'a> = &'a (dyn Fn(&str) -> bool + Sync);

/// Per-platform source of raw process metrics.
///
/// Every query takes a PID and returns a populated record or a typed
/// failure; see `ProbeError` for how callers are expected to react. All
/// queries are independent bounded reads, so implementations must be safe
/// to call from parallel per-process workers.
pub trait ProcSource: Send + Sync {
    /// System-wide constants (tick rate, page size, boot time, total memory).
    fn system(&self) -> &SystemInfo;

    /// All PIDs currently visible to the caller. Failing to enumerate at
    /// all is the only error here; it aborts the whole sampling cycle.
    fn pids(&self) -> Result<Vec<u32>, ProbeError>;

    /// Name, parentage, run state, scheduling info, and owning user.
    fn state(&self, pid: u32) -> Result<ProcState, ProbeError>;

    /// Virtual/resident/shared sizes and page fault counters.
    fn memory(&self, pid: u32) -> Result<ProcMem, ProbeError>;

    /// Accumulated CPU time and absolute start time.
    fn cpu_time(&self, pid: u32) -> Result<ProcTime, ProbeError>;

    /// I/O counters. Individual missing keys are tolerated by the parser.
    fn io_counters(&self, pid: u32) -> Result<ProcIo, ProbeError>;

    /// File descriptor usage, or `None` where the kernel or permissions do
    /// not allow reading it. `None` is a normal, silent outcome.
    fn fd_usage(&self, pid: u32) -> Result<Option<FdUsage>, ProbeError>;

    /// Null-delimited argument vector.
    fn cmdline(&self, pid: u32) -> Result<Vec<String>, ProbeError>;

    /// Environment variables passing the filter. Permission-denied and
    /// unsupported platforms yield an empty map, not an error.
    fn environ(
        &self,
        pid: u32,
        filter: EnvFilter<'_>,
    ) -> Result<HashMap<String, String>, ProbeError>;

    /// Resolved exe/cwd/root symlinks.
    fn links(&self, pid: u32) -> Result<ProcLinks, ProbeError>;

    /// Capture timestamp for a sample. Overridable so deterministic sources
    /// can drive the cross-sample delta in tests.
    fn timestamp(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared ownership forwards transparently to the inner source, so a single
/// `ProcSource` can back several callers (or a sampler plus a test harness
/// holding the same handle) without giving up the `ProcSource` bound.
impl<T: ProcSource + ?Sized> ProcSource for Arc<T> {
    fn system(&self) -> &SystemInfo {
        (**self).system()
    }

    fn pids(&self) -> Result<Vec<u32>, ProbeError> {
        (**self).pids()
    }

    fn state(&self, pid: u32) -> Result<ProcState, ProbeError> {
        (**self).state(pid)
    }

    fn memory(&self, pid: u32) -> Result<ProcMem, ProbeError> {
        (**self).memory(pid)
    }

    fn cpu_time(&self, pid: u32) -> Result<ProcTime, ProbeError> {
        (**self).cpu_time(pid)
    }

    fn io_counters(&self, pid: u32) -> Result<ProcIo, ProbeError> {
        (**self).io_counters(pid)
    }

    fn fd_usage(&self, pid: u32) -> Result<Option<FdUsage>, ProbeError> {
        (**self).fd_usage(pid)
    }

    fn cmdline(&self, pid: u32) -> Result<Vec<String>, ProbeError> {
        (**self).cmdline(pid)
    }

    fn environ(
        &self,
        pid: u32,
        filter: EnvFilter<'_>,
    ) -> Result<HashMap<String, String>, ProbeError> {
        (**self).environ(pid, filter)
    }

    fn links(&self, pid: u32) -> Result<ProcLinks, ProbeError> {
        (**self).links(pid)
    }

    fn timestamp(&self) -> DateTime<Utc> {
        (**self).timestamp()
    }
}
