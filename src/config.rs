//! Scan settings handed over by the CLI layer.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, ScanError};
use crate::ports::{self, PortSet, DEFAULT_PORT_RANGE};
use crate::resolver::AddressFamily;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_WORKERS: usize = 200;
/// Upper bound on concurrent connect attempts.
pub const MAX_WORKERS: usize = 5_000;

/// Where the scanned ports come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PortSelection {
    /// The default range, 1-1024.
    #[default]
    Default,
    Spec(String),
    WellKnown,
    File(PathBuf),
}

impl PortSelection {
    pub fn resolve(&self) -> Result<PortSet> {
        match self {
            PortSelection::Default => ports::parse_port_spec(None, DEFAULT_PORT_RANGE),
            PortSelection::Spec(spec) => {
                ports::parse_port_spec(Some(spec.as_str()), DEFAULT_PORT_RANGE)
            }
            PortSelection::WellKnown => Ok(ports::well_known_ports()),
            PortSelection::File(path) => ports::load_ports_from_path(path),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    pub target: String,
    pub ports: PortSelection,
    pub family: AddressFamily,
    pub timeout: Duration,
    pub workers: usize,
}

impl ScanConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ports: PortSelection::Default,
            family: AddressFamily::Any,
            timeout: DEFAULT_TIMEOUT,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_ports(mut self, ports: PortSelection) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_family(mut self, family: AddressFamily) -> Self {
        self.family = family;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Check the settings; returns the worker count to use (clamped to
    /// [`MAX_WORKERS`]).
    pub fn validate(&self) -> Result<usize> {
        if self.target.trim().is_empty() {
            return Err(ScanError::InvalidConfig("target must not be empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(ScanError::InvalidConfig("timeout must be positive".into()));
        }
        if self.workers == 0 {
            return Err(ScanError::InvalidConfig("worker count must be at least 1".into()));
        }
        Ok(self.workers.min(MAX_WORKERS))
    }
}

/// Convert a CLI timeout in (fractional) seconds.
pub fn timeout_from_secs(secs: f64) -> Result<Duration> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ScanError::InvalidConfig(format!(
            "timeout must be a positive number of seconds, got {secs}"
        )));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| ScanError::InvalidConfig(format!("timeout {secs}s: {e}")))
}
