//! Error types for the scan engine.
//!
//! Only configuration and resolution problems are errors. Closed, filtered or
//! failing ports are reported as [`crate::probe::ProbeStatus`] values.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for scan engine operations.
pub type Result<T> = std::result::Result<T, ScanError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// A port token is neither an integer nor a `low-high` range.
    #[error("invalid port specification: {0:?}")]
    InvalidPortSpec(String),

    /// A port number outside 1..=65535.
    #[error("port out of range: {0} (expected 1-65535)")]
    PortOutOfRange(u32),

    /// A range whose low end is above its high end.
    #[error("invalid port range {0}-{1} (start > end)")]
    InvalidRange(u16, u16),

    /// The selection produced no ports at all.
    #[error("no ports selected")]
    EmptyPortSet,

    /// A ports file could not be read or parsed.
    #[error("ports file {}: {reason}", path.display())]
    PortsFile { path: PathBuf, reason: String },

    /// Any other invalid scan setting (timeout, workers, target).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The target did not resolve to an address of the requested family.
    #[error("could not resolve {target}: {reason}")]
    Resolution { target: String, reason: String },
}

impl ScanError {
    /// True for errors caught before resolution is attempted.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, ScanError::Resolution { .. })
    }
}
