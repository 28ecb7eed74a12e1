//! Scan engine: drives probes per version and assembles the final report.
//!
//! Two nested bounds throttle connections to the target: a per-version
//! semaphore and a global ceiling shared by all versions. Probe tasks finish
//! in whatever order the network dictates; results are slotted back into
//! catalog order so reports are deterministic across runs.

use crate::catalog;
use crate::model::{
    Config, ErrorReason, ProbeOutcome, ProtocolVersion, ScanReport, SuiteResult, TargetSpec,
    VersionReport,
};
use crate::probe::probe_suite;
use crate::transport::Connector;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, instrument, warn};

const CANCELLED: ProbeOutcome = ProbeOutcome::Error {
    reason: ErrorReason::Cancelled,
};

/// Scan Coordinator. Explicitly constructed with its transport factory and
/// limits; holds no global state.
pub struct Scanner {
    connector: Arc<dyn Connector>,
    cfg: Config,
}

impl Scanner {
    pub fn new(connector: Arc<dyn Connector>, cfg: Config) -> Self {
        Self { connector, cfg }
    }

    /// Probes every requested version against `target`. Fails only on
    /// invalid input; an unreachable server yields all-Error reports, never
    /// an absent version.
    #[instrument(skip(self), fields(target = %target))]
    pub async fn scan(&self, target: &TargetSpec) -> anyhow::Result<ScanReport> {
        if self.cfg.versions.is_empty() {
            anyhow::bail!("no protocol versions requested");
        }
        if target.host.is_empty() {
            anyhow::bail!("target host is empty");
        }
        if target.port == 0 {
            anyhow::bail!("target port must be nonzero");
        }

        let started_at = chrono::Utc::now();
        let deadline = self.cfg.deadline.map(|d| Instant::now() + d);
        let global = Arc::new(Semaphore::new(self.cfg.max_connections));

        // Requested order does not matter for the report (it is keyed), but
        // duplicates would probe the target twice for nothing.
        let requested: Vec<ProtocolVersion> = ProtocolVersion::ALL
            .into_iter()
            .filter(|v| self.cfg.versions.contains(v))
            .collect();

        let mut tasks = FuturesUnordered::new();
        for version in requested {
            let connector = Arc::clone(&self.connector);
            let global = Arc::clone(&global);
            let target = target.clone();
            let probe_timeout = self.cfg.probe_timeout;
            let concurrency = self.cfg.concurrency;
            tasks.push(tokio::spawn(async move {
                let report = scan_version(
                    connector, &target, version, probe_timeout, concurrency, global, deadline,
                )
                .await;
                (version, report)
            }));
        }

        let mut versions = BTreeMap::new();
        while let Some(joined) = tasks.next().await {
            match joined {
                Ok((version, report)) => {
                    versions.insert(version, report);
                }
                Err(err) => warn!(error = %err, "version scan task panicked"),
            }
        }

        Ok(ScanReport {
            target: target.clone(),
            started_at,
            versions,
        })
    }
}

/// Protocol Version Driver: one probe per catalog suite, bounded
/// concurrency, outcomes aggregated in catalog order.
pub async fn scan_version(
    connector: Arc<dyn Connector>,
    target: &TargetSpec,
    version: ProtocolVersion,
    probe_timeout: Duration,
    concurrency: usize,
    global: Arc<Semaphore>,
    deadline: Option<Instant>,
) -> VersionReport {
    let suites = catalog::suites_for(version);
    let local = Arc::new(Semaphore::new(concurrency.max(1)));

    let mut tasks = FuturesUnordered::new();
    for (idx, &suite) in suites.iter().enumerate() {
        let connector = Arc::clone(&connector);
        let local = Arc::clone(&local);
        let global = Arc::clone(&global);
        let target = target.clone();
        tasks.push(tokio::spawn(async move {
            let attempt = async {
                let _local = match local.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return CANCELLED,
                };
                let _global = match global.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return CANCELLED,
                };
                probe_with_retry(connector.as_ref(), &target, version, suite, probe_timeout).await
            };
            let outcome = match deadline {
                Some(deadline) => timeout_at(deadline, attempt).await.unwrap_or(CANCELLED),
                None => attempt.await,
            };
            (idx, outcome)
        }));
    }

    let mut slots: Vec<Option<ProbeOutcome>> = vec![None; suites.len()];
    while let Some(joined) = tasks.next().await {
        if let Ok((idx, outcome)) = joined {
            slots[idx] = Some(outcome);
        }
    }

    let outcomes = suites
        .iter()
        .zip(slots)
        .map(|(&suite, slot)| SuiteResult {
            suite,
            outcome: slot.unwrap_or(CANCELLED),
        })
        .collect();

    let report = VersionReport { version, outcomes };
    debug!(
        version = %version,
        accepted = report.accepted().len(),
        rejected = report.rejected_count(),
        errors = report.error_count(),
        "version finished"
    );
    report
}

/// Transient connection failures get exactly one retry; every other outcome
/// is final.
async fn probe_with_retry(
    connector: &dyn Connector,
    target: &TargetSpec,
    version: ProtocolVersion,
    suite: crate::model::CipherSuite,
    probe_timeout: Duration,
) -> ProbeOutcome {
    let first = probe_suite(connector, target, version, suite, probe_timeout).await;
    match first {
        ProbeOutcome::Error {
            reason: ErrorReason::ConnectionReset | ErrorReason::Timeout,
        } => {
            debug!(version = %version, suite = %suite.name, "retrying transient failure");
            probe_suite(connector, target, version, suite, probe_timeout).await
        }
        other => other,
    }
}
