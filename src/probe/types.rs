//! Typed records returned by the per-process data source.
//!
//! Each struct maps to one metric category: state/ownership, memory, CPU
//! time, I/O counters, file descriptors, and the exe/cwd/root links.

use serde::Serialize;

/// Coarse process run state as reported in `/proc/<pid>/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Sleeping,
    Running,
    /// Uninterruptible disk wait.
    Idle,
    Stopped,
    Zombie,
    Unknown,
}

impl RunState {
    /// Maps the single-character state code from the kernel.
    pub fn from_code(code: u8) -> Self {
        match code {
            b'S' => RunState::Sleeping,
            b'R' => RunState::Running,
            b'D' => RunState::Idle,
            b'T' => RunState::Stopped,
            b'Z' => RunState::Zombie,
            _ => RunState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Sleeping => "sleeping",
            RunState::Running => "running",
            RunState::Idle => "idle",
            RunState::Stopped => "stopped",
            RunState::Zombie => "zombie",
            RunState::Unknown => "unknown",
        }
    }
}

/// Process identity and scheduling state from `/proc/<pid>/stat` plus the
/// owning user resolved from `/proc/<pid>/status`.
#[derive(Debug, Clone)]
pub struct ProcState {
    pub name: String,
    pub state: RunState,
    pub ppid: u32,
    pub pgid: u32,
    pub tty: i32,
    pub priority: i64,
    pub nice: i64,
    pub processor: i32,
    pub username: String,
}

/// Memory usage from `/proc/<pid>/statm` (converted to bytes) and the fault
/// counters from `/proc/<pid>/stat`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcMem {
    pub size: u64,
    pub resident: u64,
    pub share: u64,
    pub minor_faults: u64,
    pub major_faults: u64,
}

/// Accumulated CPU time in milliseconds and the absolute start time of the
/// process in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcTime {
    pub user_ms: u64,
    pub sys_ms: u64,
    pub total_ms: u64,
    pub start_time_ms: u64,
}

/// I/O counters from `/proc/<pid>/io`. Fields whose key is missing from the
/// kernel file stay zero; that is not an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcIo {
    pub read_char: u64,
    pub write_char: u64,
    pub read_count: u64,
    pub write_count: u64,
    pub read_bytes: u64,
    pub write_bytes: u64,
}

/// File descriptor usage: open count plus the soft/hard limits from
/// `/proc/<pid>/limits`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FdUsage {
    pub open: u64,
    pub soft_limit: u64,
    pub hard_limit: u64,
}

/// Resolved per-process symlinks. Empty strings mean the link could not be
/// read but the failure was tolerable (permission, unsupported).
#[derive(Debug, Clone, Default)]
pub struct ProcLinks {
    pub exe: String,
    pub cwd: String,
    pub root: String,
}
