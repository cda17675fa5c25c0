use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use time::{format_description::well_known, OffsetDateTime};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use tcp_reach_rs::config::{self, DEFAULT_WORKERS};
use tcp_reach_rs::probe::ProbeOutcome;
use tcp_reach_rs::resolver::AddressFamily;
use tcp_reach_rs::scanner::{self, ScanRun};
use tcp_reach_rs::{PortSelection, ScanConfig, ScanReport};

const RULE_WIDTH: usize = 60;
const MAX_LISTED_ERRORS: usize = 20;

/// tcp-reach-rs: concurrent IPv4/IPv6 TCP connect prober. Only scan hosts you are allowed to test.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tcp-reach-rs",
    version,
    about = "Concurrent IPv4/IPv6 TCP connect prober (use responsibly).",
    long_about = None
)]
struct Cli {
    /// Hostname or IP address to probe.
    target: String,

    /// Ports to scan, e.g. `22`, `1-1024`, `22,80-90`. Defaults to 1-1024.
    #[arg(short = 'p', long, conflicts_with_all = ["ports_file", "well_known"])]
    ports: Option<String>,

    /// Path to a ports file (one port, range or list per line, `#` comments).
    #[arg(long = "ports-file", conflicts_with = "well_known")]
    ports_file: Option<PathBuf>,

    /// Scan the preset list of well-known service ports.
    #[arg(long = "well-known", default_value_t = false)]
    well_known: bool,

    /// Only scan IPv4 addresses of the target.
    #[arg(short = '4', long, conflicts_with = "ipv6")]
    ipv4: bool,

    /// Only scan IPv6 addresses of the target.
    #[arg(short = '6', long)]
    ipv6: bool,

    /// Connect timeout per attempt, in seconds.
    #[arg(short = 't', long, default_value_t = 1.0)]
    timeout: f64,

    /// Max concurrent connect attempts.
    #[arg(short = 'w', long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Also write the report as pretty JSON to this path.
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG overrides.
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn scan_config(&self) -> Result<ScanConfig> {
        let ports = if self.well_known {
            PortSelection::WellKnown
        } else if let Some(path) = &self.ports_file {
            PortSelection::File(path.clone())
        } else if let Some(spec) = &self.ports {
            PortSelection::Spec(spec.clone())
        } else {
            PortSelection::Default
        };

        let family = match (self.ipv4, self.ipv6) {
            (true, _) => AddressFamily::Ipv4,
            (_, true) => AddressFamily::Ipv6,
            _ => AddressFamily::Any,
        };

        Ok(ScanConfig::new(self.target.clone())
            .with_ports(ports)
            .with_family(family)
            .with_timeout(config::timeout_from_secs(self.timeout)?)
            .with_workers(self.workers))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    debug!(?cli, "parsed arguments");

    let cfg = cli.scan_config()?;
    let plan = scanner::prepare(&cfg)
        .await
        .context("scan not started")?;

    let run = plan.start();
    print_header(&run);
    let report = run
        .execute(|outcome: &ProbeOutcome| {
            if outcome.is_open() {
                println!("[+] Port {} is open on {}", outcome.port, outcome.address.ip);
            }
        })
        .await;
    print_summary(&report);

    if let Some(path) = cli.output.as_deref() {
        write_report_json(path, &report)
            .with_context(|| format!("failed to write JSON to {}", path.display()))?;
        println!("Wrote JSON report to {}", path.display());
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_header(run: &ScanRun) {
    let plan = run.plan();
    println!("{}", "=".repeat(RULE_WIDTH));
    println!("Target: {}", plan.target);
    for addr in &plan.addresses {
        println!("  - {addr}");
    }
    println!(
        "Ports: {}  Timeout: {}s  Workers: {}",
        plan.ports.len(),
        plan.timeout.as_secs_f64(),
        plan.workers
    );
    println!("Started: {}", format_timestamp(run.started_at()));
    println!("{}", "=".repeat(RULE_WIDTH));
}

fn print_summary(report: &ScanReport) {
    println!("{}", "=".repeat(RULE_WIDTH));
    println!("Finished: {}", format_timestamp(report.finished_at));

    if report.addresses.len() > 1 {
        for addr in &report.addresses {
            let open = report.open_ports_for(addr.ip);
            if open.is_empty() {
                println!("  {addr}: none open");
            } else {
                println!("  {addr}: {}", join_ports(&open));
            }
        }
    }

    if report.open_ports.is_empty() {
        println!("No open ports found.");
    } else {
        println!("Open ports: {}", join_ports(&report.open_ports));
    }

    let c = &report.counts;
    println!(
        "Probes: {} (open {}, closed {}, filtered {}, error {}) in {:.2}s",
        c.total(),
        c.open,
        c.closed,
        c.filtered,
        c.error,
        report.elapsed.as_secs_f64()
    );
    for e in report.errors.iter().take(MAX_LISTED_ERRORS) {
        println!("[!] {} port {}: {}", e.address.ip, e.port, e.status);
    }
    if report.errors.len() > MAX_LISTED_ERRORS {
        println!("[!] ... and {} more errors", report.errors.len() - MAX_LISTED_ERRORS);
    }
    println!("{}", "=".repeat(RULE_WIDTH));
}

fn join_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_timestamp(ts: OffsetDateTime) -> String {
    ts.format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}

fn write_report_json(path: &Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
