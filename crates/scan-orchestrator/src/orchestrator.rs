//! The public face of the Job Orchestrator (§4.4): `Submit`,
//! `Cancel`, `Query`, `Stream`, composing [`AdmissionService`], a
//! [`ScanQueue`], [`LifecycleManager`], and [`WorkerPool`].

use crate::{
    admission::{AdmissionService, HardwareFingerprint},
    cancellation::CancellationRegistry,
    executor::{ComplianceScorer, ScanExecutor, WorkerPool, WorkerPoolConfig},
    lifecycle::LifecycleManager,
    queue::ScanQueue,
    webhook::WebhookSink,
};
use scan_core::{
    audit::AuditLogger,
    config::QueueConfig,
    database::PersistenceGateway,
    error::{Error, Result},
    model::{ScanJob, ScanRequest},
    JobId, ScanEvent, ScanMetrics, TenantId,
};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

pub struct JobOrchestrator<Q, G, E>
where
    Q: ScanQueue + 'static,
    G: PersistenceGateway + 'static,
    E: ScanExecutor + 'static,
{
    admission: Arc<AdmissionService>,
    queue: Arc<Q>,
    gateway: Arc<G>,
    lifecycle: Arc<LifecycleManager<G>>,
    cancellations: Arc<CancellationRegistry>,
    audit: Arc<AuditLogger>,
    worker_pool: Arc<WorkerPool<Q, G, E>>,
    queue_config: QueueConfig,
    shutdown: watch::Sender<bool>,
}

impl<Q, G, E> JobOrchestrator<Q, G, E>
where
    Q: ScanQueue + 'static,
    G: PersistenceGateway + 'static,
    E: ScanExecutor + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        admission: Arc<AdmissionService>,
        queue: Arc<Q>,
        gateway: Arc<G>,
        executor: Arc<E>,
        scorer: Arc<dyn ComplianceScorer>,
        webhook: Option<Arc<dyn WebhookSink>>,
        audit: Arc<AuditLogger>,
        metrics: Arc<ScanMetrics>,
        queue_config: QueueConfig,
        worker_config: WorkerPoolConfig,
    ) -> Self {
        let cancellations = Arc::new(CancellationRegistry::new());
        let lifecycle = Arc::new(LifecycleManager::new(gateway.clone(), audit.clone(), webhook));
        let worker_pool = Arc::new(WorkerPool::new(
            queue.clone(),
            lifecycle.clone(),
            executor,
            admission.clone(),
            scorer,
            cancellations.clone(),
            metrics,
            worker_config,
        ));
        let (shutdown, _) = watch::channel(false);

        Self {
            admission,
            queue,
            gateway,
            lifecycle,
            cancellations,
            audit,
            worker_pool,
            queue_config,
            shutdown,
        }
    }

    /// Starts the worker pool's dequeue loop in the background. Returns
    /// immediately; call [`Self::shutdown`] to stop it.
    pub fn spawn_workers(&self) {
        let pool = self.worker_pool.clone();
        let receiver = self.shutdown.subscribe();
        tokio::spawn(async move {
            pool.run(receiver).await;
        });
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// `Submit(request) -> job_id | RejectedQuota | RejectedLicense |
    /// RejectedConcurrency` (§4.4).
    pub async fn submit(
        &self,
        request: ScanRequest,
        hardware_fingerprint: HardwareFingerprint,
    ) -> Result<JobId> {
        let depth = self.queue.depth().await?;
        let backpressure_threshold =
            (self.queue_config.max_admitted * self.queue_config.backpressure_threshold_pct as u64) / 100;
        if depth >= backpressure_threshold {
            return Err(Error::rejected_concurrency(format!(
                "admission queue at {depth}/{} is past its {}% backpressure threshold",
                self.queue_config.max_admitted, self.queue_config.backpressure_threshold_pct
            )));
        }

        let job = self.admission.submit(&request, hardware_fingerprint).await?;
        self.gateway.save_job(&job).await?;
        self.lifecycle.track(job.clone());
        self.queue.enqueue(request).await?;
        Ok(job.job_id)
    }

    /// `Cancel(job_id)`, idempotent. A still-queued job moves directly
    /// `Queued -> Cancelled`; an admitted or running job has its
    /// cancellation token signalled, observed by the worker within the
    /// configured latency budget.
    pub async fn cancel(&self, tenant_id: TenantId, job_id: JobId) -> Result<()> {
        if self.queue.cancel(tenant_id, job_id).await? {
            // Still Queued: never reached Admitted, so its quota
            // reservations were never committed and must be released.
            self.admission.release_job(job_id).await?;

            if let Some(mut job) = self.lifecycle.snapshot(job_id) {
                self.lifecycle
                    .transition(&mut job, scan_core::ScanJobState::Cancelled, chrono::Utc::now())
                    .await?;
            } else {
                self.gateway
                    .update_job_state(job_id, scan_core::ScanJobState::Cancelled, chrono::Utc::now())
                    .await?;
            }
            return Ok(());
        }

        // Not in the queue any more: it is admitted or running. Signalling
        // an unknown job id is harmless (Cancel is idempotent).
        self.cancellations.cancel(job_id);
        Ok(())
    }

    /// `Query(job_id)`: current state and progress.
    pub fn query(&self, job_id: JobId) -> Option<ScanJob> {
        self.lifecycle.snapshot(job_id)
    }

    /// `Stream(job_id)`: a live event subscription, restartable only while
    /// the job remains in the active job table.
    pub fn stream(&self, job_id: JobId) -> Option<broadcast::Receiver<ScanEvent>> {
        self.lifecycle.subscribe(job_id)
    }

    pub fn audit(&self) -> &Arc<AuditLogger> {
        &self.audit
    }
}
