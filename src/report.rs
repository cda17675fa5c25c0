use std::net::IpAddr;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::probe::{ProbeOutcome, ProbeStatus};
use crate::resolver::ResolvedAddress;

/// Outcome counts by status.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub open: u64,
    pub closed: u64,
    pub filtered: u64,
    pub error: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.open + self.closed + self.filtered + self.error
    }

    fn bump(&mut self, status: &ProbeStatus) {
        match status {
            ProbeStatus::Open => self.open += 1,
            ProbeStatus::Closed => self.closed += 1,
            ProbeStatus::Filtered => self.filtered += 1,
            ProbeStatus::Error(_) => self.error += 1,
        }
    }
}

/// Final result of one scan run.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScanReport {
    pub target: String,
    pub addresses: Vec<ResolvedAddress>,
    pub port_count: usize,
    pub timeout: Duration,
    pub workers: usize,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub finished_at: OffsetDateTime,
    pub elapsed: Duration,
    /// Open outcomes, ascending by port, then by address order.
    pub open: Vec<ProbeOutcome>,
    /// Union of open port numbers across all addresses, ascending.
    pub open_ports: Vec<u16>,
    /// Error outcomes, ordered like `open`.
    pub errors: Vec<ProbeOutcome>,
    pub counts: StatusCounts,
}

impl ScanReport {
    /// Open ports on one scanned address, ascending.
    pub fn open_ports_for(&self, ip: IpAddr) -> Vec<u16> {
        self.open
            .iter()
            .filter(|o| o.address.ip == ip)
            .map(|o| o.port)
            .collect()
    }
}

/// Collects outcomes in whatever order they arrive and produces a sorted
/// [`ScanReport`].
#[derive(Debug)]
pub struct ReportBuilder {
    target: String,
    addresses: Vec<ResolvedAddress>,
    port_count: usize,
    timeout: Duration,
    workers: usize,
    started_at: OffsetDateTime,
    clock: Instant,
    open: Vec<ProbeOutcome>,
    errors: Vec<ProbeOutcome>,
    counts: StatusCounts,
}

impl ReportBuilder {
    /// Start a report; stamps the scan start time.
    pub fn start(
        target: impl Into<String>,
        addresses: Vec<ResolvedAddress>,
        port_count: usize,
        timeout: Duration,
        workers: usize,
    ) -> Self {
        Self {
            target: target.into(),
            addresses,
            port_count,
            timeout,
            workers,
            started_at: OffsetDateTime::now_utc(),
            clock: Instant::now(),
            open: Vec::new(),
            errors: Vec::new(),
            counts: StatusCounts::default(),
        }
    }

    pub fn record(&mut self, outcome: ProbeOutcome) {
        self.counts.bump(&outcome.status);
        match outcome.status {
            ProbeStatus::Open => self.open.push(outcome),
            ProbeStatus::Error(_) => self.errors.push(outcome),
            ProbeStatus::Closed | ProbeStatus::Filtered => {}
        }
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    pub fn counts(&self) -> StatusCounts {
        self.counts
    }

    /// Sort, summarize and stamp the finish time.
    pub fn finish(mut self) -> ScanReport {
        let addresses = &self.addresses;
        let rank = |o: &ProbeOutcome| {
            addresses
                .iter()
                .position(|a| *a == o.address)
                .unwrap_or(usize::MAX)
        };
        self.open.sort_by_key(|o| (o.port, rank(o)));
        self.errors.sort_by_key(|o| (o.port, rank(o)));

        let mut open_ports: Vec<u16> = self.open.iter().map(|o| o.port).collect();
        open_ports.dedup();

        // Monotonic elapsed keeps finished_at >= started_at even if the wall clock jumps.
        let elapsed = self.clock.elapsed();
        ScanReport {
            target: self.target,
            addresses: self.addresses,
            port_count: self.port_count,
            timeout: self.timeout,
            workers: self.workers,
            started_at: self.started_at,
            finished_at: self.started_at + elapsed,
            elapsed,
            open: self.open,
            open_ports,
            errors: self.errors,
            counts: self.counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn addr4() -> ResolvedAddress {
        ResolvedAddress::from(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)))
    }

    fn addr6() -> ResolvedAddress {
        ResolvedAddress::from(IpAddr::V6(Ipv6Addr::LOCALHOST))
    }

    fn outcome(address: ResolvedAddress, port: u16, status: ProbeStatus) -> ProbeOutcome {
        ProbeOutcome {
            address,
            port,
            status,
            elapsed: Duration::from_millis(3),
        }
    }

    fn builder() -> ReportBuilder {
        ReportBuilder::start("example", vec![addr6(), addr4()], 4, Duration::from_secs(1), 8)
    }

    #[test]
    fn open_ports_sorted_regardless_of_arrival() {
        let mut arrivals = vec![
            outcome(addr4(), 443, ProbeStatus::Open),
            outcome(addr6(), 22, ProbeStatus::Closed),
            outcome(addr4(), 22, ProbeStatus::Open),
            outcome(addr6(), 443, ProbeStatus::Open),
            outcome(addr6(), 80, ProbeStatus::Open),
            outcome(addr4(), 80, ProbeStatus::Filtered),
            outcome(addr6(), 8080, ProbeStatus::Error("unreachable".into())),
            outcome(addr4(), 8080, ProbeStatus::Closed),
        ];

        let mut reports = Vec::new();
        for _ in 0..2 {
            let mut b = builder();
            for o in arrivals.iter().cloned() {
                b.record(o);
            }
            reports.push(b.finish());
            arrivals.reverse();
        }

        for report in reports {
            assert_eq!(report.open_ports, vec![22, 80, 443]);
            let pairs: Vec<(u16, IpAddr)> =
                report.open.iter().map(|o| (o.port, o.address.ip)).collect();
            assert_eq!(
                pairs,
                vec![(22, addr4().ip), (80, addr6().ip), (443, addr6().ip), (443, addr4().ip)]
            );
            assert_eq!(report.open_ports_for(addr4().ip), vec![22, 443]);
            assert_eq!(report.errors.len(), 1);
            assert_eq!(
                report.counts,
                StatusCounts {
                    open: 4,
                    closed: 2,
                    filtered: 1,
                    error: 1,
                }
            );
            assert_eq!(report.counts.total(), 8);
        }
    }

    #[test]
    fn empty_scan_is_valid() {
        let report = builder().finish();
        assert!(report.open_ports.is_empty());
        assert!(report.finished_at >= report.started_at);
        assert_eq!(report.counts.total(), 0);
        assert_eq!(report.workers, 8);
    }

    #[test]
    fn report_serializes_rfc3339_timestamps() {
        let mut b = builder();
        b.record(outcome(addr4(), 22, ProbeStatus::Open));
        let json = serde_json::to_value(b.finish()).unwrap();
        let started = json["started_at"].as_str().unwrap();
        assert!(started.contains('T') && started.ends_with('Z'));
        assert_eq!(json["open_ports"], serde_json::json!([22]));
        assert_eq!(json["addresses"][0]["family"], "ipv6");
    }
}
