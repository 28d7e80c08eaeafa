//! Probe failure taxonomy for per-process /proc reads.
//!
//! Every read against a live process can fail in one of a small number of
//! well-understood ways, and callers react differently to each: a vanished
//! process is skipped, permission problems degrade to missing fields, and
//! malformed kernel data is reported per process without touching the rest
//! of the sampling cycle.

use std::io;
use thiserror::Error;

/// Error type for all data-source queries.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The process exited between enumeration and the detail read.
    #[error("process {0} vanished during read")]
    Vanished(u32),

    /// The caller lacks privilege to read this field.
    #[error("permission denied reading {0}")]
    PermissionDenied(String),

    /// The kernel or platform does not expose this information.
    #[error("not supported on this platform")]
    Unsupported,

    /// A kernel-exposed file did not have the expected shape.
    #[error("malformed {file} for pid {pid}: {reason}")]
    Malformed {
        pid: u32,
        file: &'static str,
        reason: String,
    },

    /// Any other I/O failure (enumeration-level errors end up here).
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl ProbeError {
    /// True for outcomes that mean "field unavailable" rather than failure.
    /// Permission and unsupported are handled identically everywhere.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            ProbeError::PermissionDenied(_) | ProbeError::Unsupported
        )
    }

    /// True when the process disappeared mid-read.
    pub fn is_vanished(&self) -> bool {
        matches!(self, ProbeError::Vanished(_))
    }

    /// Classify an I/O error for a per-process file. ENOENT means the
    /// process exited (the directory is gone), not that the file is missing.
    pub fn from_proc_io(pid: u32, path: &str, err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => ProbeError::Vanished(pid),
            io::ErrorKind::PermissionDenied => ProbeError::PermissionDenied(path.to_string()),
            _ => ProbeError::Io(err),
        }
    }
}
