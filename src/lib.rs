//! Library crate for tcp-reach-rs: port selection, dual-stack resolution,
//! bounded-concurrency TCP connect scanning and report aggregation.
pub mod config;
pub mod error;
pub mod ports;
pub mod probe;
pub mod report;
pub mod resolver;
pub mod scanner;

pub use config::{PortSelection, ScanConfig};
pub use error::{Result, ScanError};
pub use report::ScanReport;
