use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{ScanConfig, MAX_WORKERS};
use crate::error::Result;
use crate::ports::PortSet;
use crate::probe::{connect_probe, ProbeOutcome, ProbeTask};
use crate::report::{ReportBuilder, ScanReport};
use crate::resolver::{self, ResolvedAddress};

/// A validated scan: ports selected and target resolved, nothing probed yet.
#[derive(Debug, Clone)]
pub struct ScanPlan {
    pub target: String,
    pub addresses: Vec<ResolvedAddress>,
    pub ports: PortSet,
    pub timeout: Duration,
    pub workers: usize,
}

impl ScanPlan {
    /// Number of (address, port) probes the plan will run.
    pub fn task_count(&self) -> usize {
        self.addresses.len() * self.ports.len()
    }

    /// Stamp the scan start. The returned run carries the same start time
    /// the final report will show.
    pub fn start(self) -> ScanRun {
        let report = ReportBuilder::start(
            self.target.as_str(),
            self.addresses.clone(),
            self.ports.len(),
            self.timeout,
            self.workers,
        );
        ScanRun { plan: self, report }
    }

    /// Start and run the scan, calling `on_outcome` as each probe completes.
    pub async fn execute<O>(self, on_outcome: O) -> ScanReport
    where
        O: FnMut(&ProbeOutcome),
    {
        self.start().execute(on_outcome).await
    }
}

/// A started scan that has not probed anything yet.
#[derive(Debug)]
pub struct ScanRun {
    plan: ScanPlan,
    report: ReportBuilder,
}

impl ScanRun {
    pub fn plan(&self) -> &ScanPlan {
        &self.plan
    }

    pub fn started_at(&self) -> OffsetDateTime {
        self.report.started_at()
    }

    /// Probe every (address, port) pair, calling `on_outcome` as each one
    /// completes.
    pub async fn execute<O>(self, on_outcome: O) -> ScanReport
    where
        O: FnMut(&ProbeOutcome),
    {
        let ScanRun { plan, report } = self;
        let timeout = plan.timeout;
        let tasks = build_tasks(&plan.addresses, &plan.ports);
        drive(
            &plan.target,
            report,
            tasks,
            plan.workers,
            move |task| connect_probe(task, timeout),
            on_outcome,
        )
        .await
    }
}

/// Validate `config`, select ports and resolve the target.
///
/// Fails before any socket is opened when the configuration or the resolution
/// is bad.
pub async fn prepare(config: &ScanConfig) -> Result<ScanPlan> {
    let workers = config.validate()?;
    let ports = config.ports.resolve()?;
    let addresses = resolver::resolve(&config.target, config.family).await?;
    Ok(ScanPlan {
        target: config.target.clone(),
        addresses,
        ports,
        timeout: config.timeout,
        workers,
    })
}

/// Prepare and execute a scan in one go.
pub async fn run(config: &ScanConfig) -> Result<ScanReport> {
    run_with_observer(config, |_| {}).await
}

pub async fn run_with_observer<O>(config: &ScanConfig, on_outcome: O) -> Result<ScanReport>
where
    O: FnMut(&ProbeOutcome),
{
    let plan = prepare(config).await?;
    Ok(plan.execute(on_outcome).await)
}

/// Cartesian product of addresses and ports, address-major, ports ascending.
pub fn build_tasks(addresses: &[ResolvedAddress], ports: &PortSet) -> VecDeque<ProbeTask> {
    addresses
        .iter()
        .flat_map(|&address| ports.iter().map(move |port| ProbeTask { address, port }))
        .collect()
}

/// Scan every address × port with real TCP connects.
pub async fn scan_targets(
    target: &str,
    addresses: Vec<ResolvedAddress>,
    ports: &PortSet,
    workers: usize,
    timeout: Duration,
) -> ScanReport {
    scan_targets_with(
        target,
        addresses,
        ports,
        workers,
        timeout,
        move |task| connect_probe(task, timeout),
        |_| {},
    )
    .await
}

/// Run all tasks through `prober` on a fixed pool of at most `workers` tasks.
///
/// The queue is filled upfront. Each worker pops one task, awaits its probe,
/// and sends the outcome to the collector until the queue is empty. Outcomes
/// reach `on_outcome` and the report in completion order; the report sorts
/// them when finished.
pub async fn scan_targets_with<P, Fut, O>(
    target: &str,
    addresses: Vec<ResolvedAddress>,
    ports: &PortSet,
    workers: usize,
    timeout: Duration,
    prober: P,
    on_outcome: O,
) -> ScanReport
where
    P: Fn(ProbeTask) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProbeOutcome> + Send + 'static,
    O: FnMut(&ProbeOutcome),
{
    let tasks = build_tasks(&addresses, ports);
    let workers = workers.clamp(1, MAX_WORKERS);
    let report = ReportBuilder::start(target, addresses, ports.len(), timeout, workers);
    drive(target, report, tasks, workers, prober, on_outcome).await
}

async fn drive<P, Fut, O>(
    target: &str,
    mut report: ReportBuilder,
    tasks: VecDeque<ProbeTask>,
    workers: usize,
    prober: P,
    mut on_outcome: O,
) -> ScanReport
where
    P: Fn(ProbeTask) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProbeOutcome> + Send + 'static,
    O: FnMut(&ProbeOutcome),
{
    let total = tasks.len();
    let pool = workers.clamp(1, MAX_WORKERS).min(total).max(1);
    info!(target_host = target, tasks = total, workers = pool, "scan started");

    let queue = Arc::new(Mutex::new(tasks));
    let prober = Arc::new(prober);
    let (tx, mut rx) = mpsc::unbounded_channel::<ProbeOutcome>();
    let mut set = JoinSet::new();

    for worker in 0..pool {
        let queue = queue.clone();
        let prober = prober.clone();
        let tx = tx.clone();
        set.spawn(async move {
            let mut done = 0usize;
            loop {
                let next = queue.lock().await.pop_front();
                let Some(task) = next else { break };
                let outcome = (*prober)(task).await;
                done += 1;
                if tx.send(outcome).is_err() {
                    break;
                }
            }
            debug!(worker, done, "worker drained queue");
        });
    }
    // Only worker senders remain; the channel closes when the last one exits.
    drop(tx);

    while let Some(outcome) = rx.recv().await {
        on_outcome(&outcome);
        report.record(outcome);
    }

    while let Some(res) = set.join_next().await {
        if let Err(e) = res {
            warn!("scan worker failed: {e}");
        }
    }

    let recorded = report.counts().total();
    if recorded != total as u64 {
        warn!(expected = total, recorded, "some probes produced no outcome");
    }

    let report = report.finish();
    info!(
        target_host = target,
        open = report.counts.open,
        elapsed = ?report.elapsed,
        "scan finished"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeStatus;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    fn two_addresses() -> Vec<ResolvedAddress> {
        vec![
            ResolvedAddress::from(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 7))),
            ResolvedAddress::from(IpAddr::V6(Ipv6Addr::LOCALHOST)),
        ]
    }

    #[test]
    fn tasks_cover_cartesian_product() {
        let ports: PortSet = "22,80,443".parse().unwrap();
        let tasks = build_tasks(&two_addresses(), &ports);
        assert_eq!(tasks.len(), 6);
        assert_eq!(tasks[0].port, 22);
        assert_eq!(tasks[3].address, two_addresses()[1]);
    }

    #[tokio::test]
    async fn prober_sees_each_task_once() {
        let ports: PortSet = "1-5".parse().unwrap();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = seen.clone();
        let report = scan_targets_with(
            "fake",
            two_addresses(),
            &ports,
            3,
            Duration::from_millis(10),
            move |task: ProbeTask| {
                sink.lock().unwrap().push(task);
                async move {
                    ProbeOutcome {
                        address: task.address,
                        port: task.port,
                        status: if task.port % 2 == 0 {
                            ProbeStatus::Open
                        } else {
                            ProbeStatus::Closed
                        },
                        elapsed: Duration::ZERO,
                    }
                }
            },
            |_| {},
        )
        .await;

        let mut seen = seen.lock().unwrap().clone();
        let before = seen.len();
        seen.sort_by_key(|t| (t.address.ip, t.port));
        seen.dedup();
        assert_eq!(before, 10);
        assert_eq!(seen.len(), 10);
        assert_eq!(report.open_ports, vec![2, 4]);
        assert_eq!(report.open.len(), 4);
        assert_eq!(report.counts.closed, 6);
    }
}
