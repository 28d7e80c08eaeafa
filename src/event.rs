//! Event assembly: converts a finalized `Process` into the nested record
//! consumed by the metrics pipeline.
//!
//! This is a pure, total transformation with no failure modes. Optional
//! groups (fd, cmdline, cwd, env) appear only when they were populated.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};

use crate::probe::SystemInfo;
use crate::stats::{round4, Process};

/// Share of total physical memory held resident by the process, rounded to
/// 4 decimal digits. Zero when total memory is unknown.
pub fn mem_resident_pct(proc: &Process, total_phys_mem: u64) -> f64 {
    if total_phys_mem == 0 {
        return 0.0;
    }
    round4(proc.mem.resident as f64 / total_phys_mem as f64)
}

/// Formats a milliseconds-since-epoch value as RFC 3339 with millisecond
/// precision.
fn format_start_time(start_time_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(start_time_ms as i64)
        .unwrap_or_default()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Builds the output record for one process.
pub fn process_event(proc: &Process, system: &SystemInfo, cpu_ticks: bool) -> Value {
    let mut event = json!({
        "pid": proc.pid,
        "ppid": proc.ppid,
        "pgid": proc.pgid,
        "name": proc.name,
        "state": proc.state.as_str(),
        "username": proc.username,
        "memory": {
            "size": proc.mem.size,
            "rss": {
                "bytes": proc.mem.resident,
                "pct": mem_resident_pct(proc, system.total_memory_bytes),
            },
            "share": proc.mem.share,
            "faults": {
                "minor": proc.mem.minor_faults,
                "major": proc.mem.major_faults,
            },
        },
        "io": {
            "read_char": proc.io.read_char,
            "write_char": proc.io.write_char,
            "read_count": proc.io.read_count,
            "write_count": proc.io.write_count,
            "read_bytes": proc.io.read_bytes,
            "write_bytes": proc.io.write_bytes,
        },
    });

    let mut cpu = json!({
        "total": {
            "pct": proc.cpu_total_pct,
        },
        "start_time": format_start_time(proc.cpu.start_time_ms),
    });
    if cpu_ticks {
        let cpu_obj = cpu.as_object_mut().expect("cpu is an object");
        cpu_obj.insert("user".to_string(), json!(proc.cpu.user_ms));
        cpu_obj.insert("system".to_string(), json!(proc.cpu.sys_ms));
        cpu_obj["total"]
            .as_object_mut()
            .expect("cpu.total is an object")
            .insert("ticks".to_string(), json!(proc.cpu.total_ms));
    }

    let root = event.as_object_mut().expect("event is an object");
    root.insert("cpu".to_string(), cpu);

    if !proc.cmdline.is_empty() {
        root.insert("cmdline".to_string(), json!(proc.cmdline));
    }
    if !proc.cwd.is_empty() {
        root.insert("cwd".to_string(), json!(proc.cwd));
    }
    if !proc.env.is_empty() {
        let env: Map<String, Value> = proc
            .env
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        root.insert("env".to_string(), Value::Object(env));
    }
    if let Some(fd) = proc.fd.filter(|fd| *fd != crate::probe::FdUsage::default()) {
        root.insert(
            "fd".to_string(),
            json!({
                "open": fd.open,
                "limit": {
                    "soft": fd.soft_limit,
                    "hard": fd.hard_limit,
                },
            }),
        );
    }

    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::FdUsage;

    fn test_system() -> SystemInfo {
        SystemInfo {
            ticks_per_sec: 100,
            page_size: 4096,
            boot_time_secs: 1_600_000_000,
            total_memory_bytes: 1000,
        }
    }

    fn test_process() -> Process {
        let mut proc = Process::empty(42, "testd".to_string());
        proc.ppid = 1;
        proc.pgid = 42;
        proc.username = "nobody".to_string();
        proc.mem.size = 4096;
        proc.mem.resident = 250;
        proc.mem.share = 128;
        proc.cpu.user_ms = 700;
        proc.cpu.sys_ms = 300;
        proc.cpu.total_ms = 1000;
        proc.cpu.start_time_ms = 1_600_000_000_000;
        proc.cpu_total_pct = 0.1234;
        proc
    }

    #[test]
    fn test_event_core_fields() {
        let event = process_event(&test_process(), &test_system(), false);
        assert_eq!(event["pid"], 42);
        assert_eq!(event["ppid"], 1);
        assert_eq!(event["name"], "testd");
        assert_eq!(event["state"], "sleeping");
        assert_eq!(event["username"], "nobody");
        assert_eq!(event["memory"]["rss"]["bytes"], 250);
        // 250 / 1000 = 0.25
        assert_eq!(event["memory"]["rss"]["pct"], 0.25);
        assert_eq!(event["cpu"]["total"]["pct"], 0.1234);
        assert_eq!(event["cpu"]["start_time"], "2020-09-13T12:26:40.000Z");
    }

    #[test]
    fn test_event_optional_groups_absent() {
        let event = process_event(&test_process(), &test_system(), false);
        assert!(event.get("cmdline").is_none());
        assert!(event.get("cwd").is_none());
        assert!(event.get("env").is_none());
        // FD usage unavailable: the group is entirely absent, not zeroed.
        assert!(event.get("fd").is_none());
        // Ticks detail only on request.
        assert!(event["cpu"].get("user").is_none());
        assert!(event["cpu"]["total"].get("ticks").is_none());
    }

    #[test]
    fn test_event_optional_groups_present() {
        let mut proc = test_process();
        proc.cmdline = "/usr/bin/testd --daemon".to_string();
        proc.cwd = "/var/lib/testd".to_string();
        proc.env.insert("PATH".to_string(), "/usr/bin".to_string());
        proc.fd = Some(FdUsage {
            open: 12,
            soft_limit: 1024,
            hard_limit: 4096,
        });

        let event = process_event(&proc, &test_system(), true);
        assert_eq!(event["cmdline"], "/usr/bin/testd --daemon");
        assert_eq!(event["cwd"], "/var/lib/testd");
        assert_eq!(event["env"]["PATH"], "/usr/bin");
        assert_eq!(event["fd"]["open"], 12);
        assert_eq!(event["fd"]["limit"]["soft"], 1024);
        assert_eq!(event["fd"]["limit"]["hard"], 4096);
        assert_eq!(event["cpu"]["user"], 700);
        assert_eq!(event["cpu"]["system"], 300);
        assert_eq!(event["cpu"]["total"]["ticks"], 1000);
    }

    #[test]
    fn test_event_zero_fd_usage_omitted() {
        let mut proc = test_process();
        proc.fd = Some(FdUsage::default());
        let event = process_event(&proc, &test_system(), false);
        assert!(event.get("fd").is_none());
    }

    #[test]
    fn test_mem_pct_zero_total() {
        assert_eq!(mem_resident_pct(&test_process(), 0), 0.0);
    }

    #[test]
    fn test_mem_pct_rounding() {
        let mut proc = test_process();
        proc.mem.resident = 1;
        // 1/3 rounds half-up at 4 digits
        assert_eq!(mem_resident_pct(&proc, 3), 0.3333);
    }
}
