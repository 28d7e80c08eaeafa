//! Linux /proc implementation of the process data source.
//!
//! Reads per-PID files (stat, statm, status, io, cmdline, environ, limits,
//! fd) and symlinks (exe, cwd, root) under a configurable root directory.
//! Every read defends against the process exiting mid-read: ENOENT on a
//! per-process file maps to `ProbeError::Vanished`, never a hard failure.

use std::fs;
use std::path::{Path, PathBuf};

use ahash::AHashMap as HashMap;
use nix::unistd::{Uid, User};
use tracing::debug;

use crate::error::ProbeError;
use crate::probe::system::SystemInfo;
use crate::probe::types::{FdUsage, ProcIo, ProcLinks, ProcMem, ProcState, ProcTime, RunState};
use crate::probe::{EnvFilter, ProcSource};

/// Default mount point of the process information pseudo-filesystem.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Data source backed by the /proc pseudo-filesystem.
pub struct LinuxProcfs {
    root: PathBuf,
    system: SystemInfo,
}

impl LinuxProcfs {
    /// Creates a source rooted at the given directory, probing the
    /// system-wide constants once.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, ProbeError> {
        let root = root.into();
        let system = SystemInfo::probe(&root)?;
        Ok(LinuxProcfs { root, system })
    }

    /// Creates a source with pre-built system constants. Used by tests that
    /// fabricate /proc trees with fixed tick rates and boot times.
    pub fn with_system(root: impl Into<PathBuf>, system: SystemInfo) -> Self {
        LinuxProcfs {
            root: root.into(),
            system,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn proc_path(&self, pid: u32, name: &str) -> PathBuf {
        self.root.join(pid.to_string()).join(name)
    }

    fn read_proc_file(&self, pid: u32, name: &'static str) -> Result<Vec<u8>, ProbeError> {
        let path = self.proc_path(pid, name);
        fs::read(&path).map_err(|e| ProbeError::from_proc_io(pid, &path.to_string_lossy(), e))
    }

    fn read_proc_string(&self, pid: u32, name: &'static str) -> Result<String, ProbeError> {
        let bytes = self.read_proc_file(pid, name)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Fields of /proc/<pid>/stat needed across the state, memory, and CPU
/// queries. Parsed once per query from a single read of the file.
#[derive(Debug)]
struct StatRecord {
    name: String,
    state: u8,
    ppid: u32,
    pgid: u32,
    tty: i32,
    minor_faults: u64,
    major_faults: u64,
    utime_ticks: u64,
    stime_ticks: u64,
    priority: i64,
    nice: i64,
    starttime_ticks: u64,
    processor: i32,
}

impl StatRecord {
    /// Parses the stat line. The executable name is free-form and may itself
    /// contain spaces or parentheses, so it is taken between the first `(`
    /// and the matching last `)` rather than by field splitting; all numeric
    /// fields are indexed relative to the closer.
    fn parse(pid: u32, contents: &str) -> Result<StatRecord, ProbeError> {
        let malformed = |reason: &str| ProbeError::Malformed {
            pid,
            file: "stat",
            reason: reason.to_string(),
        };

        let open = contents.find('(').ok_or_else(|| malformed("no '(' marker"))?;
        let close = contents.rfind(')').ok_or_else(|| malformed("no ')' marker"))?;
        if close <= open {
            return Err(malformed("name markers out of order"));
        }

        let name = contents[open + 1..close].to_string();
        let fields: Vec<&str> = contents[close + 1..].split_whitespace().collect();

        // state through starttime; later fields are optional on old kernels
        if fields.len() < 20 {
            return Err(malformed(&format!(
                "expected at least 20 fields after name, got {}",
                fields.len()
            )));
        }

        let state = fields[0].bytes().next().ok_or_else(|| malformed("empty state field"))?;

        Ok(StatRecord {
            name,
            state,
            ppid: fields[1].parse().unwrap_or(0),
            pgid: fields[2].parse().unwrap_or(0),
            tty: fields[4].parse().unwrap_or(0),
            minor_faults: fields[7].parse().unwrap_or(0),
            major_faults: fields[9].parse().unwrap_or(0),
            utime_ticks: fields[11].parse().unwrap_or(0),
            stime_ticks: fields[12].parse().unwrap_or(0),
            priority: fields[15].parse().unwrap_or(0),
            nice: fields[16].parse().unwrap_or(0),
            starttime_ticks: fields[19].parse().unwrap_or(0),
            processor: fields.get(36).and_then(|f| f.parse().ok()).unwrap_or(0),
        })
    }
}

/// Extracts the real UID from the `Uid:` line of /proc/<pid>/status.
fn parse_real_uid(pid: u32, contents: &str) -> Result<u32, ProbeError> {
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("Uid:") {
            return rest
                .split_whitespace()
                .next()
                .and_then(|v| v.parse::<u32>().ok())
                .ok_or_else(|| ProbeError::Malformed {
                    pid,
                    file: "status",
                    reason: "unparsable Uid line".to_string(),
                });
        }
    }
    Err(ProbeError::Malformed {
        pid,
        file: "status",
        reason: "Uid line not found".to_string(),
    })
}

/// Resolves a UID to an account name, falling back to the numeric string.
fn resolve_username(uid: u32) -> String {
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(Some(user)) => user.name,
        _ => uid.to_string(),
    }
}

/// Parses /proc/<pid>/io into its six counters. Each key is looked up
/// independently; a missing key is logged and leaves that counter zero.
fn parse_io(pid: u32, contents: &str) -> ProcIo {
    let mut table: HashMap<&str, u64> = HashMap::new();
    for line in contents.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if let Ok(n) = value.trim().parse::<u64>() {
                table.insert(key.trim(), n);
            }
        }
    }

    let lookup = |key: &'static str| -> u64 {
        match table.get(key) {
            Some(v) => *v,
            None => {
                debug!("key '{}' not found in io file for pid {}", key, pid);
                0
            }
        }
    };

    ProcIo {
        read_char: lookup("rchar"),
        write_char: lookup("wchar"),
        read_count: lookup("syscr"),
        write_count: lookup("syscw"),
        read_bytes: lookup("read_bytes"),
        write_bytes: lookup("write_bytes"),
    }
}

/// Parses one limit value from /proc/<pid>/limits ("unlimited" maps to max).
fn parse_limit(field: &str) -> u64 {
    if field == "unlimited" {
        u64::MAX
    } else {
        field.parse().unwrap_or(0)
    }
}

/// Extracts (soft, hard) open-file limits from /proc/<pid>/limits.
fn parse_fd_limits(contents: &str) -> (u64, u64) {
    for line in contents.lines() {
        if line.starts_with("Max open files") {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() >= 5 {
                return (parse_limit(fields[3]), parse_limit(fields[4]));
            }
        }
    }
    (0, 0)
}

/// Splits a null-delimited buffer into UTF-8 strings, dropping the empty
/// trailing entry.
fn split_null_delimited(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|&b| b == 0u8)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect()
}

/// Parses a null-delimited KEY=VALUE buffer into a map, applying the
/// retention filter. Entries without '=' are skipped.
fn parse_environ(bytes: &[u8], filter: EnvFilter<'_>) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    for entry in bytes.split(|&b| b == 0u8) {
        if entry.is_empty() {
            continue;
        }
        let entry = String::from_utf8_lossy(entry);
        let Some((key, value)) = entry.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || !filter(key) {
            continue;
        }
        vars.insert(key.to_string(), value.trim().to_string());
    }
    vars
}

impl ProcSource for LinuxProcfs {
    fn system(&self) -> &SystemInfo {
        &self.system
    }

    fn pids(&self) -> Result<Vec<u32>, ProbeError> {
        let entries = fs::read_dir(&self.root)?;
        let mut pids = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.is_empty() || !name.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            if let Ok(pid) = name.parse::<u32>() {
                pids.push(pid);
            }
        }
        Ok(pids)
    }

    fn state(&self, pid: u32) -> Result<ProcState, ProbeError> {
        let stat = self.read_proc_string(pid, "stat")?;
        let record = StatRecord::parse(pid, &stat)?;

        let status = self.read_proc_string(pid, "status")?;
        let uid = parse_real_uid(pid, &status)?;

        Ok(ProcState {
            name: record.name,
            state: RunState::from_code(record.state),
            ppid: record.ppid,
            pgid: record.pgid,
            tty: record.tty,
            priority: record.priority,
            nice: record.nice,
            processor: record.processor,
            username: resolve_username(uid),
        })
    }

    fn memory(&self, pid: u32) -> Result<ProcMem, ProbeError> {
        let statm = self.read_proc_string(pid, "statm")?;
        let fields: Vec<&str> = statm.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(ProbeError::Malformed {
                pid,
                file: "statm",
                reason: format!("expected at least 3 fields, got {}", fields.len()),
            });
        }

        let pages = |field: &str| field.parse::<u64>().unwrap_or(0) * self.system.page_size;
        let size = pages(fields[0]);
        let resident = pages(fields[1]);
        let share = pages(fields[2]);

        let stat = self.read_proc_string(pid, "stat")?;
        let record = StatRecord::parse(pid, &stat)?;

        Ok(ProcMem {
            size,
            resident,
            share,
            minor_faults: record.minor_faults,
            major_faults: record.major_faults,
        })
    }

    fn cpu_time(&self, pid: u32) -> Result<ProcTime, ProbeError> {
        let stat = self.read_proc_string(pid, "stat")?;
        let record = StatRecord::parse(pid, &stat)?;

        let user_ms = self.system.ticks_to_millis(record.utime_ticks);
        let sys_ms = self.system.ticks_to_millis(record.stime_ticks);

        Ok(ProcTime {
            user_ms,
            sys_ms,
            total_ms: user_ms + sys_ms,
            start_time_ms: self.system.start_time_millis(record.starttime_ticks),
        })
    }

    fn io_counters(&self, pid: u32) -> Result<ProcIo, ProbeError> {
        let contents = self.read_proc_string(pid, "io")?;
        Ok(parse_io(pid, &contents))
    }

    fn fd_usage(&self, pid: u32) -> Result<Option<FdUsage>, ProbeError> {
        let fd_dir = self.proc_path(pid, "fd");
        let entries = match fs::read_dir(&fd_dir) {
            Ok(entries) => entries,
            Err(e) => {
                return match ProbeError::from_proc_io(pid, &fd_dir.to_string_lossy(), e) {
                    // Reading other processes' fd tables needs privilege;
                    // treat denial as "not available", not a failure.
                    err if err.is_unavailable() => Ok(None),
                    err => Err(err),
                };
            }
        };
        let open = entries.count() as u64;

        let limits = match self.read_proc_string(pid, "limits") {
            Ok(contents) => contents,
            Err(err) if err.is_unavailable() => return Ok(None),
            Err(err) => return Err(err),
        };
        let (soft_limit, hard_limit) = parse_fd_limits(&limits);

        Ok(Some(FdUsage {
            open,
            soft_limit,
            hard_limit,
        }))
    }

    fn cmdline(&self, pid: u32) -> Result<Vec<String>, ProbeError> {
        let bytes = self.read_proc_file(pid, "cmdline")?;
        Ok(split_null_delimited(&bytes))
    }

    fn environ(
        &self,
        pid: u32,
        filter: EnvFilter<'_>,
    ) -> Result<HashMap<String, String>, ProbeError> {
        match self.read_proc_file(pid, "environ") {
            Ok(bytes) => Ok(parse_environ(&bytes, filter)),
            // Only root may read other processes' environments; an empty
            // map is the expected outcome without privilege.
            Err(err) if err.is_unavailable() => Ok(HashMap::new()),
            Err(err) => Err(err),
        }
    }

    fn links(&self, pid: u32) -> Result<ProcLinks, ProbeError> {
        let mut links = ProcLinks::default();
        for (name, slot) in [
            ("exe", &mut links.exe),
            ("cwd", &mut links.cwd),
            ("root", &mut links.root),
        ] {
            let path = self.proc_path(pid, name);
            let target = fs::read_link(&path)
                .map_err(|e| ProbeError::from_proc_io(pid, &path.to_string_lossy(), e))?;
            *slot = target.to_string_lossy().into_owned();
        }
        Ok(links)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    const STAT_LINE: &str = "1234 (test proc) S 1 1234 1234 0 -1 4194304 250 0 3 0 1000 500 0 0 20 0 1 0 9000 12345678 1234 18446744073709551615 4194304 4238788 140736466511168 0 0 0 0 0 0 0 0 0 17 2 0 0 0 0 0";

    fn fixed_system() -> SystemInfo {
        SystemInfo {
            ticks_per_sec: 100,
            page_size: 4096,
            boot_time_secs: 1_600_000_000,
            total_memory_bytes: 8 * 1024 * 1024 * 1024,
        }
    }

    /// Builds a fake /proc tree with one PID directory.
    fn fixture_proc(pid: u32) -> (TempDir, LinuxProcfs) {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::create_dir(dir.path().join(pid.to_string())).expect("Failed to create pid dir");
        let source = LinuxProcfs::with_system(dir.path(), fixed_system());
        (dir, source)
    }

    fn write_proc(dir: &TempDir, pid: u32, name: &str, contents: impl AsRef<[u8]>) {
        fs::write(dir.path().join(pid.to_string()).join(name), contents)
            .expect("Failed to write proc file");
    }

    // -------------------------------------------------------------------------
    // Tests for StatRecord::parse
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_stat_basic_fields() {
        let record = StatRecord::parse(1234, STAT_LINE).expect("parse failed");
        assert_eq!(record.name, "test proc");
        assert_eq!(record.state, b'S');
        assert_eq!(record.ppid, 1);
        assert_eq!(record.pgid, 1234);
        assert_eq!(record.minor_faults, 250);
        assert_eq!(record.major_faults, 3);
        assert_eq!(record.utime_ticks, 1000);
        assert_eq!(record.stime_ticks, 500);
        assert_eq!(record.priority, 20);
        assert_eq!(record.nice, 0);
        assert_eq!(record.starttime_ticks, 9000);
        assert_eq!(record.processor, 2);
    }

    #[test]
    fn test_parse_stat_name_with_parens_and_spaces() {
        // Executable names may contain the field delimiter and parentheses;
        // everything between the first '(' and the last ')' is the name.
        let line = "99 (we)ird (name) R 1 99 99 0 -1 0 0 0 0 0 5 5 0 0 20 0 1 0 100 0 0";
        let record = StatRecord::parse(99, line).expect("parse failed");
        assert_eq!(record.name, "we)ird (name");
        assert_eq!(record.state, b'R');
        assert_eq!(record.ppid, 1);
    }

    #[test]
    fn test_parse_stat_missing_markers() {
        assert!(StatRecord::parse(1, "1 no-markers S 1 1").is_err());
        assert!(StatRecord::parse(1, "1 )backwards( S 1 1").is_err());
    }

    #[test]
    fn test_parse_stat_too_few_fields() {
        let result = StatRecord::parse(1, "1 (short) S 1 2");
        assert!(matches!(result, Err(ProbeError::Malformed { .. })));
    }

    // -------------------------------------------------------------------------
    // Tests for status / io / limits / environ parsers
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_real_uid() {
        let status = "Name:\ttest\nState:\tS (sleeping)\nUid:\t1000\t1000\t1000\t1000\nGid:\t1000\t1000\t1000\t1000\n";
        assert_eq!(parse_real_uid(1, status).unwrap(), 1000);
    }

    #[test]
    fn test_parse_real_uid_missing_line() {
        assert!(parse_real_uid(1, "Name:\ttest\n").is_err());
    }

    #[test]
    fn test_parse_io_all_keys() {
        let io = parse_io(
            1,
            "rchar: 100\nwchar: 200\nsyscr: 10\nsyscw: 20\nread_bytes: 4096\nwrite_bytes: 8192\ncancelled_write_bytes: 0\n",
        );
        assert_eq!(io.read_char, 100);
        assert_eq!(io.write_char, 200);
        assert_eq!(io.read_count, 10);
        assert_eq!(io.write_count, 20);
        assert_eq!(io.read_bytes, 4096);
        assert_eq!(io.write_bytes, 8192);
    }

    #[test]
    fn test_parse_io_missing_keys_are_zero() {
        // A key missing from the kernel file must not poison the others.
        let io = parse_io(1, "rchar: 100\nsyscw: 7\n");
        assert_eq!(io.read_char, 100);
        assert_eq!(io.write_count, 7);
        assert_eq!(io.write_char, 0);
        assert_eq!(io.read_bytes, 0);
    }

    #[test]
    fn test_parse_fd_limits() {
        let limits = "Limit                     Soft Limit           Hard Limit           Units\n\
                      Max cpu time              unlimited            unlimited            seconds\n\
                      Max open files            1024                 4096                 files\n";
        assert_eq!(parse_fd_limits(limits), (1024, 4096));
    }

    #[test]
    fn test_parse_fd_limits_unlimited() {
        let limits = "Max open files            unlimited            unlimited            files\n";
        assert_eq!(parse_fd_limits(limits), (u64::MAX, u64::MAX));
    }

    #[test]
    fn test_parse_environ_filters_and_skips() {
        let raw = b"PATH=/usr/bin\0HOME=/root\0NOEQUALS\0SECRET=x\0";
        let keep = |name: &str| name == "PATH" || name == "HOME";
        let vars = parse_environ(raw, &keep);
        assert_eq!(vars.len(), 2);
        assert_eq!(vars["PATH"], "/usr/bin");
        assert_eq!(vars["HOME"], "/root");
        assert!(!vars.contains_key("SECRET"));
        assert!(!vars.contains_key("NOEQUALS"));
    }

    #[test]
    fn test_split_null_delimited_stops_cleanly() {
        assert_eq!(
            split_null_delimited(b"/usr/bin/prog\0--flag\0value\0"),
            vec!["/usr/bin/prog", "--flag", "value"]
        );
        assert!(split_null_delimited(b"").is_empty());
    }

    // -------------------------------------------------------------------------
    // Tests against a fabricated /proc tree
    // -------------------------------------------------------------------------

    #[test]
    fn test_pids_enumerates_numeric_entries() {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::create_dir(dir.path().join("1")).unwrap();
        fs::create_dir(dir.path().join("42")).unwrap();
        fs::create_dir(dir.path().join("self")).unwrap();
        fs::write(dir.path().join("stat"), "btime 1\n").unwrap();

        let source = LinuxProcfs::with_system(dir.path(), fixed_system());
        let mut pids = source.pids().expect("pids failed");
        pids.sort_unstable();
        assert_eq!(pids, vec![1, 42]);
    }

    #[test]
    fn test_pids_enumeration_failure() {
        let source = LinuxProcfs::with_system("/nonexistent-proc-root", fixed_system());
        assert!(source.pids().is_err());
    }

    #[test]
    fn test_state_from_fixture() {
        let (dir, source) = fixture_proc(1234);
        write_proc(&dir, 1234, "stat", STAT_LINE);
        // UID that will not resolve to an account, exercising the fallback.
        write_proc(&dir, 1234, "status", "Name:\ttest proc\nUid:\t909009\t909009\t909009\t909009\n");

        let state = source.state(1234).expect("state failed");
        assert_eq!(state.name, "test proc");
        assert_eq!(state.state, RunState::Sleeping);
        assert_eq!(state.ppid, 1);
        assert_eq!(state.pgid, 1234);
        assert_eq!(state.username, "909009");
    }

    #[test]
    fn test_state_vanished_process() {
        let (_dir, source) = fixture_proc(1234);
        // No stat file written: the read maps to Vanished.
        let err = source.state(4321).unwrap_err();
        assert!(err.is_vanished());
    }

    #[test]
    fn test_memory_from_fixture() {
        let (dir, source) = fixture_proc(1234);
        // size=100 resident=50 share=25 pages
        write_proc(&dir, 1234, "statm", "100 50 25 10 0 60 0");
        write_proc(&dir, 1234, "stat", STAT_LINE);

        let mem = source.memory(1234).expect("memory failed");
        assert_eq!(mem.size, 100 * 4096);
        assert_eq!(mem.resident, 50 * 4096);
        assert_eq!(mem.share, 25 * 4096);
        assert_eq!(mem.minor_faults, 250);
        assert_eq!(mem.major_faults, 3);
    }

    #[test]
    fn test_memory_malformed_statm() {
        let (dir, source) = fixture_proc(1234);
        write_proc(&dir, 1234, "statm", "100");
        assert!(matches!(
            source.memory(1234),
            Err(ProbeError::Malformed { file: "statm", .. })
        ));
    }

    #[test]
    fn test_cpu_time_from_fixture() {
        let (dir, source) = fixture_proc(1234);
        write_proc(&dir, 1234, "stat", STAT_LINE);

        let cpu = source.cpu_time(1234).expect("cpu_time failed");
        // 1000 utime ticks at 100 Hz = 10000 ms
        assert_eq!(cpu.user_ms, 10_000);
        assert_eq!(cpu.sys_ms, 5_000);
        assert_eq!(cpu.total_ms, 15_000);
        // starttime 9000 ticks = 90 s after boot
        assert_eq!(cpu.start_time_ms, (1_600_000_000 + 90) * 1000);
    }

    #[test]
    fn test_fd_usage_from_fixture() {
        let (dir, source) = fixture_proc(1234);
        fs::create_dir(dir.path().join("1234").join("fd")).unwrap();
        fs::write(dir.path().join("1234").join("fd").join("0"), "").unwrap();
        fs::write(dir.path().join("1234").join("fd").join("1"), "").unwrap();
        write_proc(
            &dir,
            1234,
            "limits",
            "Max open files            1024                 4096                 files\n",
        );

        let fd = source.fd_usage(1234).expect("fd_usage failed").expect("available");
        assert_eq!(fd.open, 2);
        assert_eq!(fd.soft_limit, 1024);
        assert_eq!(fd.hard_limit, 4096);
    }

    #[test]
    fn test_cmdline_and_environ_from_fixture() {
        let (dir, source) = fixture_proc(1234);
        write_proc(&dir, 1234, "cmdline", &b"/usr/bin/prog\0--port\08080\0"[..]);
        write_proc(&dir, 1234, "environ", &b"PATH=/bin\0TERM=xterm\0"[..]);

        let args = source.cmdline(1234).expect("cmdline failed");
        assert_eq!(args, vec!["/usr/bin/prog", "--port", "8080"]);

        let keep_all = |_: &str| true;
        let env = source.environ(1234, &keep_all).expect("environ failed");
        assert_eq!(env.len(), 2);
        assert_eq!(env["TERM"], "xterm");
    }
}
