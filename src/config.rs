//! Configuration management for herakles-proc-sampler.
//!
//! This module handles loading, merging, and validating configuration from
//! files and CLI arguments. It supports YAML, JSON, and TOML formats.

use crate::cli::Args;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

// Default configuration constants
pub use crate::probe::procfs::DEFAULT_PROC_ROOT;
pub const DEFAULT_INTERVAL_SECS: u64 = 10;

/// Top-N trimming policy. Both counts at zero mean no trimming.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncludeTopConfig {
    /// Master switch for top-N trimming (default: true)
    #[serde(default = "default_top_enabled")]
    pub enabled: bool,

    /// Keep the N highest-CPU processes; 0 disables this criterion
    #[serde(default, alias = "by-cpu")]
    pub by_cpu: usize,

    /// Keep the N highest-resident-memory processes; 0 disables this criterion
    #[serde(default, alias = "by-memory")]
    pub by_memory: usize,
}

fn default_top_enabled() -> bool {
    true
}

impl Default for IncludeTopConfig {
    fn default() -> Self {
        Self {
            enabled: default_top_enabled(),
            by_cpu: 0,
            by_memory: 0,
        }
    }
}

/// Sampler configuration consumed by `ProcStats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Process-name allow-list patterns. An empty list matches nothing, so
    /// sampling is effectively disabled (fail-closed).
    #[serde(default = "default_procs")]
    pub procs: Vec<String>,

    /// Environment-variable-name allow-list patterns. Empty retains nothing.
    #[serde(default, alias = "env-whitelist")]
    pub env_whitelist: Vec<String>,

    /// Emit raw user/system/total CPU ticks in events (default: false)
    #[serde(default, alias = "cpu-ticks")]
    pub cpu_ticks: bool,

    /// Carry command line and environment over from the previous cycle for
    /// still-live PIDs instead of re-reading them (default: true)
    #[serde(default = "default_cache_cmdline", alias = "cache-cmdline")]
    pub cache_cmdline: bool,

    /// Root of the process information pseudo-filesystem
    #[serde(default = "default_proc_root", alias = "proc-root")]
    pub proc_root: PathBuf,

    /// Sampling interval in seconds for the bundled binary
    #[serde(default = "default_interval", alias = "interval-secs")]
    pub interval_secs: u64,

    /// Top-N trimming policy. Must stay last: TOML serialization requires
    /// nested tables after all scalar values.
    #[serde(default, alias = "include-top")]
    pub include_top: IncludeTopConfig,
}

fn default_procs() -> Vec<String> {
    vec![".*".to_string()]
}
fn default_cache_cmdline() -> bool {
    true
}
fn default_proc_root() -> PathBuf {
    PathBuf::from(DEFAULT_PROC_ROOT)
}
fn default_interval() -> u64 {
    DEFAULT_INTERVAL_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            procs: default_procs(),
            env_whitelist: Vec::new(),
            cpu_ticks: false,
            cache_cmdline: default_cache_cmdline(),
            proc_root: default_proc_root(),
            interval_secs: default_interval(),
            include_top: IncludeTopConfig::default(),
        }
    }
}

/// Validate effective config (used by --check-config and at startup)
pub fn validate_effective_config(cfg: &Config) -> Result<(), Box<dyn std::error::Error>> {
    for pattern in cfg.procs.iter().chain(cfg.env_whitelist.iter()) {
        if let Err(e) = Regex::new(pattern) {
            return Err(format!("Failed to compile pattern [{}]: {}", pattern, e).into());
        }
    }

    if cfg.interval_secs == 0 {
        return Err("interval_secs must be greater than 0".into());
    }

    Ok(())
}

/// Resolves configuration from CLI args, config file, and defaults.
/// This enforces precedence: CLI (if provided) > config file > default.
pub fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref().and_then(|p| p.to_str()))?
    };

    // Parse comma-separated pattern lists
    if let Some(procs) = &args.procs {
        config.procs = procs.split(',').map(|s| s.trim().to_string()).collect();
    }
    if let Some(env) = &args.env_whitelist {
        config.env_whitelist = env.split(',').map(|s| s.trim().to_string()).collect();
    }

    if args.cpu_ticks {
        config.cpu_ticks = true;
    }
    if args.no_cache_cmdline {
        config.cache_cmdline = false;
    }

    // Top-N overrides: CLI wins if provided
    if let Some(n) = args.top_by_cpu {
        config.include_top.by_cpu = n;
    }
    if let Some(n) = args.top_by_memory {
        config.include_top.by_memory = n;
    }

    if let Some(root) = &args.proc_root {
        config.proc_root = root.clone();
    }
    if let Some(interval) = args.interval {
        config.interval_secs = interval;
    }

    Ok(config)
}

/// Enhanced configuration loading with multiple format support
pub fn load_config(path: Option<&str>) -> Result<Config, Box<dyn std::error::Error>> {
    let path = if let Some(p) = path {
        PathBuf::from(p)
    } else {
        // Try default locations
        let defaults = [
            "/etc/herakles/proc-sampler.yaml",
            "/etc/herakles/proc-sampler.yml",
            "/etc/herakles/proc-sampler.json",
            "./herakles-proc-sampler.yaml",
            "./herakles-proc-sampler.yml",
            "./herakles-proc-sampler.json",
        ];

        defaults
            .iter()
            .find(|p| Path::new(p).exists())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(""))
    };

    if !path.exists() || path.to_string_lossy().is_empty() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&path)?;

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => {
            let config: Config = serde_json::from_str(&content)?;
            info!("Loaded JSON configuration from: {}", path.display());
            Ok(config)
        }
        Some("toml") => {
            let config: Config = toml::from_str(&content)?;
            info!("Loaded TOML configuration from: {}", path.display());
            Ok(config)
        }
        _ => {
            // Default to YAML
            let config: Config = serde_yaml::from_str(&content)?;
            info!("Loaded YAML configuration from: {}", path.display());
            Ok(config)
        }
    }
}

/// Shows configuration in requested format
pub fn show_config(
    config: &Config,
    format: crate::cli::ConfigFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = match format {
        crate::cli::ConfigFormat::Json => serde_json::to_string_pretty(config)?,
        crate::cli::ConfigFormat::Toml => toml::to_string_pretty(config)?,
        crate::cli::ConfigFormat::Yaml => serde_yaml::to_string(config)?,
    };

    println!("{output}");
    Ok(())
}
