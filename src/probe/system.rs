//! System-wide constants probed once at startup.
//!
//! Clock-tick rate and page size come from sysconf; boot time and total
//! physical memory are parsed from the system-wide /proc files. The result
//! is a small immutable value passed explicitly into every per-process
//! parse, so the data source carries no hidden global state.

use std::fs;
use std::path::Path;

use tracing::warn;

use crate::error::ProbeError;

/// Immutable system-wide constants used to normalize per-process readings.
#[derive(Debug, Clone, Copy)]
pub struct SystemInfo {
    /// Scheduler clock ticks per second (usually 100).
    pub ticks_per_sec: u64,
    /// Memory page size in bytes (usually 4096).
    pub page_size: u64,
    /// System boot time in seconds since the Unix epoch.
    pub boot_time_secs: u64,
    /// Total physical memory in bytes.
    pub total_memory_bytes: u64,
}

/// Get system clock ticks per second via sysconf.
fn clock_ticks_per_sec() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_CLK_TCK
        // Returns -1 on error, 0 if undefined - both are handled by the > 0 check
        unsafe {
            let tck = libc::sysconf(libc::_SC_CLK_TCK);
            if tck > 0 {
                return tck as u64;
            }
        }
    }
    // Fallback to common default for error cases or non-Unix platforms
    100
}

/// Get the memory page size via sysconf.
fn page_size_bytes() -> u64 {
    #[cfg(unix)]
    {
        // SAFETY: sysconf is safe to call with _SC_PAGESIZE
        unsafe {
            let sz = libc::sysconf(libc::_SC_PAGESIZE);
            if sz > 0 {
                return sz as u64;
            }
        }
    }
    4096
}

/// Parses the `btime` line from the system-wide stat file.
pub(crate) fn parse_boot_time(contents: &str) -> Option<u64> {
    for line in contents.lines() {
        if let Some(value) = line.strip_prefix("btime ") {
            return value.trim().parse::<u64>().ok();
        }
    }
    None
}

/// Parses the `MemTotal` line from meminfo. Value is in kB.
pub(crate) fn parse_mem_total(contents: &str) -> Option<u64> {
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            let kb: u64 = rest.split_whitespace().next()?.parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

impl SystemInfo {
    /// Probes system-wide state under the given /proc root. Called once at
    /// startup; boot time and total memory do not change afterwards.
    ///
    /// A missing or unparsable `MemTotal` only degrades memory percentages,
    /// so it is logged and zeroed instead of failing startup. Boot time is
    /// required to anchor process start times and is an error when absent.
    pub fn probe(root: &Path) -> Result<Self, ProbeError> {
        let stat_path = root.join("stat");
        let stat = fs::read_to_string(&stat_path)?;
        let boot_time_secs = parse_boot_time(&stat).ok_or_else(|| ProbeError::Malformed {
            pid: 0,
            file: "stat",
            reason: "btime line not found".to_string(),
        })?;

        let total_memory_bytes = match fs::read_to_string(root.join("meminfo")) {
            Ok(meminfo) => parse_mem_total(&meminfo).unwrap_or_else(|| {
                warn!("MemTotal not found in meminfo, memory percentages will be 0");
                0
            }),
            Err(e) => {
                warn!("Failed to read meminfo: {}, memory percentages will be 0", e);
                0
            }
        };

        Ok(SystemInfo {
            ticks_per_sec: clock_ticks_per_sec(),
            page_size: page_size_bytes(),
            boot_time_secs,
            total_memory_bytes,
        })
    }

    /// Converts scheduler ticks to milliseconds.
    pub fn ticks_to_millis(&self, ticks: u64) -> u64 {
        ticks * 1000 / self.ticks_per_sec
    }

    /// Absolute process start time in ms since epoch, from the
    /// ticks-since-boot value in the stat file.
    pub fn start_time_millis(&self, starttime_ticks: u64) -> u64 {
        (starttime_ticks / self.ticks_per_sec + self.boot_time_secs) * 1000
    }
}
