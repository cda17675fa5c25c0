use std::fmt;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tracing::trace;

use crate::resolver::ResolvedAddress;

/// One (address, port) pair to probe exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProbeTask {
    pub address: ResolvedAddress,
    pub port: u16,
}

impl ProbeTask {
    pub fn socket_addr(&self) -> SocketAddr {
        self.address.socket_addr(self.port)
    }
}

/// How a single connect attempt ended.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ProbeStatus {
    Open,
    /// Actively refused.
    Closed,
    /// No answer before the probe deadline.
    Filtered,
    Error(String),
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Open => f.write_str("open"),
            ProbeStatus::Closed => f.write_str("closed"),
            ProbeStatus::Filtered => f.write_str("filtered"),
            ProbeStatus::Error(reason) => write!(f, "error ({reason})"),
        }
    }
}

/// Result of probing one [`ProbeTask`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub address: ResolvedAddress,
    pub port: u16,
    pub status: ProbeStatus,
    pub elapsed: Duration,
}

impl ProbeOutcome {
    pub fn is_open(&self) -> bool {
        self.status == ProbeStatus::Open
    }
}

/// Attempt one TCP connect to `task` bounded by `timeout`.
///
/// The socket is closed as soon as the handshake completes; nothing is read or
/// written. No retries.
pub async fn connect_probe(task: ProbeTask, timeout: Duration) -> ProbeOutcome {
    classify_connect(task, timeout, TcpStream::connect(task.socket_addr())).await
}

/// Drive `connect` under `timeout` and classify how it ended.
///
/// Only the deadline yields `Filtered`, so a filtered outcome always reports
/// `elapsed >= timeout`. OS-reported timeouts count as errors.
pub async fn classify_connect<F, S>(
    task: ProbeTask,
    timeout: Duration,
    connect: F,
) -> ProbeOutcome
where
    F: Future<Output = io::Result<S>>,
{
    let start = Instant::now();
    let status = match time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => {
            drop(stream);
            ProbeStatus::Open
        }
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => ProbeStatus::Closed,
        Ok(Err(e)) => ProbeStatus::Error(e.to_string()),
        Err(_) => ProbeStatus::Filtered,
    };
    let elapsed = start.elapsed();
    trace!(addr = %task.socket_addr(), %status, ?elapsed, "probe finished");

    ProbeOutcome {
        address: task.address,
        port: task.port,
        status,
        elapsed,
    }
}
