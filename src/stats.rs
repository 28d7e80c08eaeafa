//! Process snapshot builder: one sampling cycle over all visible processes.
//!
//! `ProcStats` owns the retained snapshot from the previous cycle and uses
//! it for CPU-delta computation and command-line/environment carry-over.
//! Each `sample()` call enumerates PIDs, builds one `Process` per matched
//! PID (detail reads fan out in parallel, they are independent reads
//! against distinct kernel files), then replaces the snapshot in one step
//! once all per-process work is done.

use ahash::AHashMap as HashMap;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{Config, IncludeTopConfig};
use crate::error::ProbeError;
use crate::event;
use crate::probe::{FdUsage, ProcIo, ProcLinks, ProcMem, ProcSource, ProcTime, RunState};
use crate::select;

/// One process's metrics at a sampling instant.
#[derive(Debug, Clone)]
pub struct Process {
    pub pid: u32,
    pub ppid: u32,
    pub pgid: u32,
    pub name: String,
    pub username: String,
    pub state: RunState,
    /// Space-joined argument vector; empty until retrieved or carried over.
    pub cmdline: String,
    pub cwd: String,
    /// Capture timestamp of this sample, baseline for the next CPU delta.
    pub ctime: DateTime<Utc>,
    pub mem: ProcMem,
    pub cpu: ProcTime,
    pub io: ProcIo,
    /// `None` when FD usage is unavailable on this platform or to this user.
    pub fd: Option<FdUsage>,
    /// Environment variables surviving the allow-list.
    pub env: HashMap<String, String>,
    /// Derived CPU share over the previous sampling interval; 0 for a
    /// first-seen PID.
    pub cpu_total_pct: f64,
}

#[cfg(test)]
impl Process {
    /// Bare process for tests that only care about a few fields.
    pub(crate) fn empty(pid: u32, name: String) -> Self {
        Process {
            pid,
            ppid: 0,
            pgid: 0,
            name,
            username: String::new(),
            state: RunState::Sleeping,
            cmdline: String::new(),
            cwd: String::new(),
            ctime: Utc::now(),
            mem: ProcMem::default(),
            cpu: ProcTime::default(),
            io: ProcIo::default(),
            fd: None,
            env: HashMap::new(),
            cpu_total_pct: 0.0,
        }
    }
}

/// Rounds half-up to 4 decimal digits. Only defined for non-negative input;
/// CPU deltas are clamped before reaching this.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0 + 0.5).floor() / 10_000.0
}

/// True when the name matches at least one compiled pattern. An empty
/// pattern list matches nothing.
fn matches_any(regexps: &[Regex], name: &str) -> bool {
    regexps.iter().any(|r| r.is_match(name))
}

/// CPU share since the previous observation of the same PID:
/// accumulated-CPU-delta over wall-clock-delta, both in milliseconds.
/// First-seen PIDs and counter resets yield 0.
fn cpu_percentage(last: Option<&Process>, current: &Process) -> f64 {
    let Some(last) = last else {
        return 0.0;
    };
    let delta_cpu_ms = current.cpu.total_ms as i64 - last.cpu.total_ms as i64;
    let delta_wall_ms = (current.ctime - last.ctime).num_milliseconds();
    if delta_cpu_ms <= 0 || delta_wall_ms <= 0 {
        return 0.0;
    }
    round4(delta_cpu_ms as f64 / delta_wall_ms as f64)
}

/// Builds the minimal `Process` from state data, seeding command line and
/// environment from the previous cycle when supplied.
fn build_process<S: ProcSource>(
    source: &S,
    pid: u32,
    cmdline: String,
    env: Option<HashMap<String, String>>,
) -> Result<Process, ProbeError> {
    let state = source.state(pid)?;

    let links = match source.links(pid) {
        Ok(links) => links,
        Err(err) if err.is_unavailable() => ProcLinks::default(),
        Err(err) => return Err(err),
    };

    Ok(Process {
        pid,
        ppid: state.ppid,
        pgid: state.pgid,
        name: state.name,
        username: state.username,
        state: state.state,
        cmdline,
        cwd: links.cwd,
        ctime: source.timestamp(),
        mem: ProcMem::default(),
        cpu: ProcTime::default(),
        io: ProcIo::default(),
        fd: None,
        env: env.unwrap_or_default(),
        cpu_total_pct: 0.0,
    })
}

/// Fetches memory, CPU, I/O, FD usage, and the command line / environment
/// unless they were carried over from the previous cycle.
fn fetch_details<S: ProcSource>(
    source: &S,
    proc: &mut Process,
    env_cached: bool,
    env_filter: &(dyn Fn(&str) -> bool + Sync),
) -> Result<(), ProbeError> {
    proc.mem = source.memory(proc.pid)?;
    proc.cpu = source.cpu_time(proc.pid)?;
    proc.io = source.io_counters(proc.pid)?;

    if proc.cmdline.is_empty() {
        match source.cmdline(proc.pid) {
            Ok(args) => proc.cmdline = args.join(" "),
            Err(ProbeError::Unsupported) => {}
            Err(err) => return Err(err),
        }
    }

    proc.fd = source.fd_usage(proc.pid)?;

    if !env_cached {
        proc.env = source.environ(proc.pid, env_filter)?;
    }

    Ok(())
}

/// Stateful per-interval process sampler.
pub struct ProcStats<S: ProcSource> {
    source: S,
    cpu_ticks: bool,
    cache_cmdline: bool,
    include_top: IncludeTopConfig,
    proc_regexps: Vec<Regex>,
    env_regexps: Vec<Regex>,
    snapshot: HashMap<u32, Process>,
}

impl<S: ProcSource> ProcStats<S> {
    /// Compiles the configured patterns and prepares an empty snapshot.
    /// With no process patterns configured the sampler stays disabled and
    /// every cycle returns an empty set.
    pub fn new(config: &Config, source: S) -> Result<Self, Box<dyn std::error::Error>> {
        let mut proc_regexps = Vec::with_capacity(config.procs.len());
        for pattern in &config.procs {
            let reg = Regex::new(pattern)
                .map_err(|e| format!("Failed to compile regexp [{}]: {}", pattern, e))?;
            proc_regexps.push(reg);
        }

        let mut env_regexps = Vec::with_capacity(config.env_whitelist.len());
        for pattern in &config.env_whitelist {
            let reg = Regex::new(pattern)
                .map_err(|e| format!("Failed to compile env whitelist regexp [{}]: {}", pattern, e))?;
            env_regexps.push(reg);
        }

        Ok(ProcStats {
            source,
            cpu_ticks: config.cpu_ticks,
            cache_cmdline: config.cache_cmdline,
            include_top: config.include_top.clone(),
            proc_regexps,
            env_regexps,
            snapshot: HashMap::new(),
        })
    }

    /// True when the process name passes the allow-list.
    pub fn match_process(&self, name: &str) -> bool {
        matches_any(&self.proc_regexps, name)
    }

    /// True when the environment variable name passes the allow-list.
    pub fn whitelisted_env(&self, name: &str) -> bool {
        matches_any(&self.env_regexps, name)
    }

    /// Runs one sampling cycle and returns one event record per surviving
    /// process. Enumeration failure aborts the cycle with the previous
    /// snapshot left intact; anything narrower is scoped to one process.
    pub fn sample(&mut self) -> Result<Vec<Value>, ProbeError> {
        if self.proc_regexps.is_empty() {
            return Ok(Vec::new());
        }

        let pids = match self.source.pids() {
            Ok(pids) => pids,
            Err(err) => {
                warn!("Failed to enumerate processes: {}", err);
                return Err(err);
            }
        };
        debug!("Enumerated {} pids", pids.len());

        let matched: Vec<Process> = {
            let source = &self.source;
            let snapshot = &self.snapshot;
            let env_regexps = &self.env_regexps;
            let cache_cmdline = self.cache_cmdline;
            let env_filter = move |name: &str| matches_any(env_regexps, name);

            pids.par_iter()
                .filter_map(|&pid| {
                    let (cmdline, env) = match snapshot.get(&pid) {
                        Some(prev) if cache_cmdline => {
                            (prev.cmdline.clone(), Some(prev.env.clone()))
                        }
                        _ => (String::new(), None),
                    };
                    let env_cached = env.is_some();

                    let mut proc = match build_process(source, pid, cmdline, env) {
                        Ok(proc) => proc,
                        Err(err) => {
                            debug!("Skip process pid={}: {}", pid, err);
                            return None;
                        }
                    };

                    if !matches_any(&self.proc_regexps, &proc.name) {
                        return None;
                    }

                    if let Err(err) = fetch_details(source, &mut proc, env_cached, &env_filter) {
                        warn!("Error getting process details pid={}: {}", pid, err);
                        return None;
                    }

                    Some(proc)
                })
                .collect()
        };

        // Sequential tail: CPU deltas against the old snapshot, then one
        // atomic replace. Scalars are copied out of the old entries, so no
        // references outlive the swap.
        let mut new_snapshot = HashMap::with_capacity(matched.len());
        let mut processes = Vec::with_capacity(matched.len());
        for mut proc in matched {
            proc.cpu_total_pct = cpu_percentage(self.snapshot.get(&proc.pid), &proc);
            new_snapshot.insert(proc.pid, proc.clone());
            processes.push(proc);
        }
        self.snapshot = new_snapshot;

        let selected = select::include_top_processes(processes, &self.include_top);
        debug!("Filtered top processes down to {} processes", selected.len());

        let system = self.source.system();
        Ok(selected
            .iter()
            .map(|proc| event::process_event(proc, system, self.cpu_ticks))
            .collect())
    }
}
