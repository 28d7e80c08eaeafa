//! Top-N selection over the matched process set.
//!
//! CPU and memory are independent criteria: the result is the union of the
//! top `by_cpu` processes by CPU percentage and the top `by_memory` by
//! resident memory, deduplicated by PID. Requested counts are clamped to
//! the available count before slicing.

use std::cmp::Ordering;

use crate::config::IncludeTopConfig;
use crate::stats::Process;

/// Trims the process set to the configured top consumers. With trimming
/// disabled or both counts zero the set passes through unchanged.
pub fn include_top_processes(mut processes: Vec<Process>, cfg: &IncludeTopConfig) -> Vec<Process> {
    if !cfg.enabled || (cfg.by_cpu == 0 && cfg.by_memory == 0) {
        return processes;
    }

    let mut result: Vec<Process> = Vec::new();

    if cfg.by_cpu > 0 {
        processes.sort_by(|a, b| {
            b.cpu_total_pct
                .partial_cmp(&a.cpu_total_pct)
                .unwrap_or(Ordering::Equal)
        });
        let n = cfg.by_cpu.min(processes.len());
        result.extend(processes[..n].iter().cloned());
    }

    if cfg.by_memory > 0 {
        processes.sort_by(|a, b| b.mem.resident.cmp(&a.mem.resident));
        let n = cfg.by_memory.min(processes.len());
        for proc in &processes[..n] {
            if !result.iter().any(|p| p.pid == proc.pid) {
                result.push(proc.clone());
            }
        }
    }

    result
}
