//! CLI arguments for herakles-proc-sampler.
//!
//! This module defines the command-line interface structure using the clap
//! library, including all flags and options.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Log level options for CLI parsing
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, ValueEnum)]
pub enum ConfigFormat {
    Yaml,
    Json,
    Toml,
}

/// Main CLI arguments structure
#[derive(Parser, Debug)]
#[command(
    name = "herakles-proc-sampler",
    about = "Per-process resource usage sampler emitting JSON records",
    long_about = "Per-process resource usage sampler emitting JSON records.\n\n\
                  Periodically enumerates processes, applies name filters, computes \
                  CPU usage across sampling intervals, and writes one normalized JSON \
                  record per surviving process to stdout for pipeline ingestion.",
    author = "Michael Moll <proc-sampler@herakles.io> - Herakles",
    version = "0.1.0",
    propagate_version = true,
    after_help = "Project: https://github.com/herakles-io/herakles-proc-sampler — More info: https://www.herakles.now — Support: proc-sampler@herakles.io"
)]
pub struct Args {
    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Disable all config file loading
    #[arg(long)]
    pub no_config: bool,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,

    /// Sampling interval in seconds
    #[arg(short = 'i', long)]
    pub interval: Option<u64>,

    /// Stop after N sampling cycles (default: run until interrupted)
    #[arg(long)]
    pub count: Option<u64>,

    /// Include only processes matching these patterns (comma-separated)
    #[arg(long)]
    pub procs: Option<String>,

    /// Retain only environment variables matching these patterns (comma-separated)
    #[arg(long)]
    pub env_whitelist: Option<String>,

    /// Emit raw CPU tick detail in records
    #[arg(long)]
    pub cpu_ticks: bool,

    /// Re-read command line and environment every cycle instead of caching
    #[arg(long)]
    pub no_cache_cmdline: bool,

    /// Keep only the N highest-CPU processes per cycle
    #[arg(long)]
    pub top_by_cpu: Option<usize>,

    /// Keep only the N highest-memory processes per cycle
    #[arg(long)]
    pub top_by_memory: Option<usize>,

    /// Override the process information filesystem root
    #[arg(long)]
    pub proc_root: Option<PathBuf>,

    /// Pretty-print JSON records instead of one record per line
    #[arg(long)]
    pub pretty: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["herakles-proc-sampler"]);
        assert!(args.config.is_none());
        assert!(!args.no_config);
        assert!(args.interval.is_none());
        assert!(args.count.is_none());
        assert!(!args.cpu_ticks);
        assert!(!args.pretty);
    }

    #[test]
    fn test_args_overrides() {
        let args = Args::parse_from([
            "herakles-proc-sampler",
            "--interval",
            "5",
            "--count",
            "2",
            "--procs",
            "nginx.*,postgres",
            "--top-by-cpu",
            "10",
            "--proc-root",
            "/tmp/fakeproc",
        ]);
        assert_eq!(args.interval, Some(5));
        assert_eq!(args.count, Some(2));
        assert_eq!(args.procs.as_deref(), Some("nginx.*,postgres"));
        assert_eq!(args.top_by_cpu, Some(10));
        assert_eq!(args.proc_root, Some(PathBuf::from("/tmp/fakeproc")));
    }
}
