//! Worker pool (§4.4): a bounded number of workers, with an
//! additional per-scan-type cap so a burst of one scan type cannot starve
//! the others of their share of the global pool. A job waits in the queue
//! even if a worker slot is free, if its own type is at its per-type cap.

use crate::{
    admission::AdmissionService,
    cancellation::{CancellationRegistry, CancellationToken},
    lifecycle::{LifecycleManager, ProgressReporter},
    queue::ScanQueue,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scan_core::{
    database::PersistenceGateway,
    model::{ComplianceHistoryPoint, Finding, ScanJob, ScanRequest, ScanResult},
    Error, ScanJobState, ScanMetrics, ScanType,
};
use std::{collections::HashMap, sync::Arc, time::Duration as StdDuration};
use tokio::sync::Semaphore;
use tracing::{info, warn};

/// Implemented by the scanner runtime (`scan-engine`) for each concrete scan
/// type; the orchestrator only ever calls this trait, never a concrete
/// scanner, so it has no compile-time dependency on scan-engine.
#[async_trait]
pub trait ScanExecutor: Send + Sync {
    async fn execute(
        &self,
        job: &ScanJob,
        request: &ScanRequest,
        cancellation: CancellationToken,
        progress: Arc<dyn ProgressReporter>,
    ) -> std::result::Result<ScanOutcome, ScanFailure>;
}

/// Implemented by the compliance score engine (`scan-engine`): scores a
/// terminal scan's deduplicated findings into a trajectory point. Kept as a
/// trait for the same reason as [`ScanExecutor`] — the orchestrator drives
/// it without depending on scan-engine directly.
#[async_trait]
pub trait ComplianceScorer: Send + Sync {
    async fn score(
        &self,
        job: &ScanJob,
        findings: &[Finding],
        at: DateTime<Utc>,
    ) -> std::result::Result<ComplianceHistoryPoint, Error>;
}

/// Successful (possibly partial) outcome of a scan run.
pub struct ScanOutcome {
    pub findings: Vec<Finding>,
    pub result: ScanResult,
}

/// A scanner-reported failure. `retry_safe` mirrors §4.4's "retries
/// only for transient errors... only if the scanner declares the failure
/// retry-safe" — the executor never guesses.
pub struct ScanFailure {
    pub message: String,
    pub retry_safe: bool,
    pub partial_findings: Vec<Finding>,
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub global_pool_size: usize,
    pub per_type_caps: HashMap<ScanType, usize>,
    pub per_type_deadline_ms: HashMap<ScanType, u64>,
    pub max_attempts: u32,
    pub backoff_ms_base: u64,
}

impl WorkerPoolConfig {
    fn deadline_for(&self, scan_type: ScanType) -> Option<StdDuration> {
        self.per_type_deadline_ms
            .get(&scan_type)
            .map(|ms| StdDuration::from_millis(*ms))
    }

    fn cap_for(&self, scan_type: ScanType) -> usize {
        self.per_type_caps
            .get(&scan_type)
            .copied()
            .unwrap_or(self.global_pool_size)
    }
}

/// Owns the global and per-scan-type semaphores and drives the dequeue loop.
pub struct WorkerPool<Q, G, E>
where
    Q: ScanQueue,
    G: PersistenceGateway,
    E: ScanExecutor,
{
    queue: Arc<Q>,
    lifecycle: Arc<LifecycleManager<G>>,
    executor: Arc<E>,
    admission: Arc<AdmissionService>,
    scorer: Arc<dyn ComplianceScorer>,
    cancellations: Arc<CancellationRegistry>,
    metrics: Arc<ScanMetrics>,
    config: WorkerPoolConfig,
    global_permits: Arc<Semaphore>,
    per_type_permits: HashMap<ScanType, Arc<Semaphore>>,
}

impl<Q, G, E> WorkerPool<Q, G, E>
where
    Q: ScanQueue + 'static,
    G: PersistenceGateway + 'static,
    E: ScanExecutor + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<Q>,
        lifecycle: Arc<LifecycleManager<G>>,
        executor: Arc<E>,
        admission: Arc<AdmissionService>,
        scorer: Arc<dyn ComplianceScorer>,
        cancellations: Arc<CancellationRegistry>,
        metrics: Arc<ScanMetrics>,
        config: WorkerPoolConfig,
    ) -> Self {
        let global_permits = Arc::new(Semaphore::new(config.global_pool_size));
        let per_type_permits = ScanType::ALL
            .iter()
            .map(|scan_type| (*scan_type, Arc::new(Semaphore::new(config.cap_for(*scan_type)))))
            .collect();

        Self {
            queue,
            lifecycle,
            executor,
            admission,
            scorer,
            cancellations,
            metrics,
            config,
            global_permits,
            per_type_permits,
        }
    }

    /// Runs the dequeue loop until `shutdown` resolves. One iteration pulls
    /// exactly one request and spawns it; it never blocks waiting on a
    /// specific tenant or scan type.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            let next = tokio::select! {
                _ = shutdown.changed() => return,
                next = self.queue.dequeue() => next,
            };

            match next {
                Ok(Some(request)) => {
                    let pool = self.clone();
                    tokio::spawn(async move {
                        pool.admit_and_run(request).await;
                    });
                }
                Ok(None) => {
                    tokio::time::sleep(StdDuration::from_millis(50)).await;
                }
                Err(err) => {
                    warn!(error = %err, "failed to dequeue scan request");
                    tokio::time::sleep(StdDuration::from_millis(200)).await;
                }
            }
        }
    }

    /// Acquires the global and per-type permits for `request.scan_type`,
    /// transitions Queued -> Admitted -> Running, and runs the scan with
    /// its deadline and retry policy.
    async fn admit_and_run(&self, request: ScanRequest) {
        let scan_type = request.scan_type;
        let per_type = self
            .per_type_permits
            .get(&scan_type)
            .expect("every ScanType has a semaphore")
            .clone();

        let _global_permit = match self.global_permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let _type_permit = match per_type.acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let mut job = self
            .lifecycle
            .snapshot(request.request_id)
            .unwrap_or_else(|| ScanJob::new(&request));
        let cancellation = self.cancellations.register(job.job_id);

        if let Err(err) = self.lifecycle.transition(&mut job, ScanJobState::Admitted, Utc::now()).await {
            warn!(job_id = %job.job_id, error = %err, "failed to record Admitted transition");
            let _ = self.admission.release_job(job.job_id).await;
            self.cancellations.remove(job.job_id);
            return;
        }

        // The job has reached Admitted: its quota reservations are kept
        // even if it is cancelled or fails from here on.
        if let Err(err) = self.admission.commit_job(job.job_id).await {
            warn!(job_id = %job.job_id, error = %err, "failed to commit quota reservations");
        }

        if cancellation.is_cancelled() {
            let at = Utc::now();
            let result = partial_result(&job, &[], at);
            let _ = self
                .lifecycle
                .finalize_terminal(&mut job, ScanJobState::Cancelled, at, &[], &result, None)
                .await;
            self.cancellations.remove(job.job_id);
            return;
        }

        if let Err(err) = self.lifecycle.transition(&mut job, ScanJobState::Running, Utc::now()).await {
            warn!(job_id = %job.job_id, error = %err, "failed to record Running transition");
            self.cancellations.remove(job.job_id);
            return;
        }
        job.started_at = Some(Utc::now());

        let progress = self.lifecycle.progress_handle(job.job_id);
        self.run_with_deadline_and_retries(&mut job, &request, cancellation.clone(), Arc::new(progress))
            .await;
        self.cancellations.remove(job.job_id);
    }

    async fn run_with_deadline_and_retries(
        &self,
        job: &mut ScanJob,
        request: &ScanRequest,
        cancellation: CancellationToken,
        progress: Arc<dyn ProgressReporter>,
    ) {
        let deadline = self.config.deadline_for(request.scan_type);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let scan_future = self.executor.execute(job, request, cancellation.clone(), progress.clone());

            let raced = async {
                tokio::select! {
                    result = scan_future => RaceOutcome::Finished(result),
                    _ = cancellation.cancelled() => RaceOutcome::Cancelled,
                }
            };

            let outcome = match deadline {
                Some(budget) => match tokio::time::timeout(budget, raced).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        warn!(job_id = %job.job_id, scan_type = %job.scan_type, "scan exceeded its deadline budget");
                        let at = Utc::now();
                        let result = partial_result(job, &[], at);
                        let _ = self
                            .lifecycle
                            .finalize_terminal(job, ScanJobState::TimedOut, at, &[], &result, None)
                            .await;
                        self.metrics
                            .scans_timed_out_total
                            .with_label_values(&[&job.tenant_id.to_string(), job.scan_type.as_str()])
                            .inc();
                        return;
                    }
                },
                None => raced.await,
            };

            match outcome {
                RaceOutcome::Cancelled => {
                    let at = Utc::now();
                    let result = partial_result(job, &[], at);
                    let _ = self
                        .lifecycle
                        .finalize_terminal(job, ScanJobState::Cancelled, at, &[], &result, None)
                        .await;
                    self.metrics
                        .scans_cancelled_total
                        .with_label_values(&[&job.tenant_id.to_string(), job.scan_type.as_str()])
                        .inc();
                    return;
                }
                RaceOutcome::Finished(Ok(outcome)) => {
                    self.finish_success(job, outcome).await;
                    return;
                }
                RaceOutcome::Finished(Err(failure)) => {
                    job.partial_findings_count = failure.partial_findings.len() as u64;
                    let can_retry = failure.retry_safe && attempt <= self.config.max_attempts;
                    if can_retry {
                        let backoff = self.config.backoff_ms_base * 2u64.pow(attempt - 1);
                        info!(job_id = %job.job_id, attempt, backoff_ms = backoff, "retrying transient scan failure");
                        tokio::time::sleep(StdDuration::from_millis(backoff)).await;
                        continue;
                    }

                    warn!(job_id = %job.job_id, error = %failure.message, "scan failed");
                    let at = Utc::now();
                    let result = partial_result(job, &failure.partial_findings, at);
                    let _ = self
                        .lifecycle
                        .finalize_terminal(job, ScanJobState::Failed, at, &failure.partial_findings, &result, None)
                        .await;
                    self.metrics
                        .scans_failed_total
                        .with_label_values(&[&job.tenant_id.to_string(), job.scan_type.as_str()])
                        .inc();
                    return;
                }
            }
        }
    }

    /// Persists findings, the aggregated `ScanResult`, and a compliance
    /// history point atomically, then transitions the job to Succeeded.
    async fn finish_success(&self, job: &mut ScanJob, outcome: ScanOutcome) {
        job.partial_findings_count = outcome.findings.len() as u64;
        let at = Utc::now();

        let history_point = match self.scorer.score(job, &outcome.findings, at).await {
            Ok(point) => Some(point),
            Err(err) => {
                warn!(job_id = %job.job_id, error = %err, "failed to score compliance result");
                None
            }
        };

        if let Err(err) = self
            .lifecycle
            .finalize_terminal(
                job,
                ScanJobState::Succeeded,
                at,
                &outcome.findings,
                &outcome.result,
                history_point.as_ref(),
            )
            .await
        {
            warn!(job_id = %job.job_id, error = %err, "failed to finalize successful scan");
            return;
        }

        self.metrics
            .scans_completed_total
            .with_label_values(&[&job.tenant_id.to_string(), job.scan_type.as_str()])
            .inc();

        for finding in &outcome.findings {
            self.metrics
                .findings_total
                .with_label_values(&[
                    &job.tenant_id.to_string(),
                    job.scan_type.as_str(),
                    &finding.severity.to_string(),
                ])
                .inc();
        }
    }
}

/// Builds a minimal `ScanResult` for a terminal state the compliance score
/// engine never scores (Failed, Cancelled, TimedOut): tallies whatever
/// findings were recovered, with no registry-based dedup or severity
/// reassignment since the orchestrator has no dependency on scan-engine's
/// registry.
fn partial_result(job: &ScanJob, findings: &[Finding], at: chrono::DateTime<Utc>) -> ScanResult {
    let mut by_severity: HashMap<scan_core::Severity, u64> = HashMap::new();
    let mut by_category: HashMap<String, u64> = HashMap::new();
    let mut pii_totals: HashMap<String, u64> = HashMap::new();

    for finding in findings {
        *by_severity.entry(finding.severity).or_insert(0) += 1;
        *by_category.entry(finding.category.clone()).or_insert(0) += 1;
        if let Some(pii_kind) = &finding.pii_kind {
            *pii_totals.entry(pii_kind.clone()).or_insert(0) += 1;
        }
    }

    let duration_ms = job
        .started_at
        .map(|started| (at - started).num_milliseconds().max(0) as u64)
        .unwrap_or(0);

    ScanResult {
        job_id: job.job_id,
        scan_type: job.scan_type,
        files_scanned: 0,
        units_scanned: 0,
        findings_total: findings.len() as u64,
        by_severity,
        by_category,
        pii_totals,
        compliance_score: 0.0,
        duration_ms,
        tenant_id: job.tenant_id,
        completed_at: at,
        partial: true,
    }
}

enum RaceOutcome {
    Finished(std::result::Result<ScanOutcome, ScanFailure>),
    Cancelled,
}

impl From<Error> for ScanFailure {
    fn from(err: Error) -> Self {
        Self {
            message: err.to_string(),
            retry_safe: false,
            partial_findings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cap_for_falls_back_to_global_pool_size() {
        let config = WorkerPoolConfig {
            global_pool_size: 32,
            per_type_caps: HashMap::new(),
            per_type_deadline_ms: HashMap::new(),
            max_attempts: 2,
            backoff_ms_base: 500,
        };
        assert_eq!(config.cap_for(ScanType::Website), 32);
    }

    #[test]
    fn cap_for_honors_explicit_per_type_override() {
        let mut per_type_caps = HashMap::new();
        per_type_caps.insert(ScanType::Database, 8);
        let config = WorkerPoolConfig {
            global_pool_size: 32,
            per_type_caps,
            per_type_deadline_ms: HashMap::new(),
            max_attempts: 2,
            backoff_ms_base: 500,
        };
        assert_eq!(config.cap_for(ScanType::Database), 8);
    }
}
