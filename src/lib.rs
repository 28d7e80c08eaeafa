//! Herakles Process Sampler Library
//!
//! Cross-platform process metrics sampling: enumerate processes, read their
//! kernel-exposed state, compute CPU usage across sampling intervals, apply
//! name/environment allow-lists, trim to the top consumers, and emit one
//! normalized JSON record per process.
//!
//! The sampler is deliberately framework-agnostic: a scheduler (the bundled
//! binary, or any embedding collector) calls [`stats::ProcStats::sample`]
//! once per interval and ships the returned records wherever it likes.
//!
//! # Usage
//!
//! ```no_run
//! use herakles_proc_sampler::config::Config;
//! use herakles_proc_sampler::probe::LinuxProcfs;
//! use herakles_proc_sampler::stats::ProcStats;
//!
//! let config = Config::default();
//! let source = LinuxProcfs::new(&config.proc_root).expect("probe /proc");
//! let mut stats = ProcStats::new(&config, source).expect("compile patterns");
//!
//! let records = stats.sample().expect("sampling cycle");
//! for record in records {
//!     println!("{record}");
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod event;
pub mod probe;
pub mod select;
pub mod stats;

// Re-export main types for convenience
pub use config::{Config, IncludeTopConfig};
pub use error::ProbeError;
pub use probe::{LinuxProcfs, ProcSource, SystemInfo};
pub use stats::{Process, ProcStats};
