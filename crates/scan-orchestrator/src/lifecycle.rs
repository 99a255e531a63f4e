//! Enforces the `ScanJob` state machine (§4.4) on every transition,
//! persists each change through the [`PersistenceGateway`], and maintains
//! the in-memory "active job table" (`job_id -> {state, ...}`) that backs
//! `Query` and `Stream`.

use crate::webhook::WebhookSink;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use scan_core::{
    audit::AuditLogger,
    database::PersistenceGateway,
    error::{Error, Result},
    model::{ComplianceHistoryPoint, Finding, ScanJob, ScanResult},
    JobId, ScanEvent, ScanJobState,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

const EVENT_CHANNEL_CAPACITY: usize = 64;

pub struct LifecycleManager<G: PersistenceGateway> {
    gateway: Arc<G>,
    audit: Arc<AuditLogger>,
    webhook: Option<Arc<dyn WebhookSink>>,
    active_jobs: DashMap<JobId, ScanJob>,
    events: DashMap<JobId, broadcast::Sender<ScanEvent>>,
}

impl<G: PersistenceGateway> LifecycleManager<G> {
    pub fn new(gateway: Arc<G>, audit: Arc<AuditLogger>, webhook: Option<Arc<dyn WebhookSink>>) -> Self {
        Self {
            gateway,
            audit,
            webhook,
            active_jobs: DashMap::new(),
            events: DashMap::new(),
        }
    }

    /// Registers a freshly submitted job in the active job table, opening
    /// its event channel for `Stream`. Called once, at `Submit`.
    pub fn track(&self, job: ScanJob) {
        let (sender, _receiver) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        self.events.insert(job.job_id, sender);
        self.active_jobs.insert(job.job_id, job);
    }

    /// Drops a job from the active table once its retention window for
    /// `Stream` has passed. Terminal jobs remain queryable through
    /// `PersistenceGateway::query_jobs` after this.
    pub fn untrack(&self, job_id: JobId) {
        self.active_jobs.remove(&job_id);
        self.events.remove(&job_id);
    }

    /// `Query(job_id)`: current state and progress from the active table.
    pub fn snapshot(&self, job_id: JobId) -> Option<ScanJob> {
        self.active_jobs.get(&job_id).map(|entry| entry.value().clone())
    }

    /// `Stream(job_id)`: a live subscription to this job's events, or
    /// `None` if the job isn't tracked (outside its retention window).
    pub fn subscribe(&self, job_id: JobId) -> Option<broadcast::Receiver<ScanEvent>> {
        self.events.get(&job_id).map(|sender| sender.subscribe())
    }

    pub fn record_progress(&self, job_id: JobId, progress_pct: f32, at: DateTime<Utc>) {
        if let Some(mut job) = self.active_jobs.get_mut(&job_id) {
            job.progress_pct = progress_pct;
        }
        self.broadcast(job_id, ScanEvent::Progress { job_id, progress_pct, at });
    }

    /// A narrow handle a running scan can report progress through, without
    /// depending on the whole `LifecycleManager`. Scanners must emit
    /// progress at least every 10s for liveness (§4.3).
    pub fn progress_handle(self: &Arc<Self>, job_id: JobId) -> LifecycleProgress<G> {
        LifecycleProgress { lifecycle: self.clone(), job_id }
    }

    /// Moves `job` to `next`, rejecting any edge not allowed by
    /// [`ScanJobState::can_transition_to`]. Terminal transitions stamp
    /// `finished_at`.
    pub async fn transition(&self, job: &mut ScanJob, next: ScanJobState, at: DateTime<Utc>) -> Result<()> {
        let previous = self.validate_transition(job, next, at)?;
        self.gateway.update_job_state(job.job_id, next, at).await?;
        self.after_persist(job, previous, next, at).await?;
        Ok(())
    }

    /// Moves a terminal job to `next` and persists its findings, `ScanResult`,
    /// and (when scored) compliance history point as one atomic unit via
    /// [`PersistenceGateway::finalize_scan`], instead of the bare state write
    /// [`Self::transition`] uses. Fires the webhook sink fire-and-forget once
    /// the write lands.
    #[allow(clippy::too_many_arguments)]
    pub async fn finalize_terminal(
        &self,
        job: &mut ScanJob,
        next: ScanJobState,
        at: DateTime<Utc>,
        findings: &[Finding],
        result: &ScanResult,
        history_point: Option<&ComplianceHistoryPoint>,
    ) -> Result<()> {
        let previous = self.validate_transition(job, next, at)?;
        self.gateway
            .finalize_scan(job.job_id, next, at, findings, result, history_point)
            .await?;
        self.after_persist(job, previous, next, at).await?;

        if let Some(webhook) = self.webhook.clone() {
            let tenant_id = job.tenant_id;
            let result = result.clone();
            tokio::spawn(async move {
                webhook.notify_terminal(tenant_id, next, Some(&result)).await;
            });
        }

        Ok(())
    }

    /// Validates `job.state -> next` and applies the in-memory mutation,
    /// returning the previous state. Does not persist anything.
    fn validate_transition(&self, job: &mut ScanJob, next: ScanJobState, at: DateTime<Utc>) -> Result<ScanJobState> {
        if !job.state.can_transition_to(next) {
            error!(
                job_id = %job.job_id,
                from = ?job.state,
                to = ?next,
                "rejected illegal state transition"
            );
            return Err(Error::internal(format!(
                "illegal transition for job {}: {:?} -> {:?}",
                job.job_id, job.state, next
            )));
        }

        let previous = job.state;
        job.state = next;
        if next.is_terminal() {
            job.finished_at = Some(at);
        }
        Ok(previous)
    }

    /// Shared bookkeeping after a transition has been persisted: audit log,
    /// active job table, and event broadcast.
    async fn after_persist(&self, job: &ScanJob, previous: ScanJobState, next: ScanJobState, at: DateTime<Utc>) -> Result<()> {
        self.audit
            .log_scan_state_changed(
                &job.tenant_id.to_string(),
                &job.job_id.to_string(),
                &format!("{previous:?}"),
                &format!("{next:?}"),
            )
            .await?;

        self.active_jobs.insert(job.job_id, job.clone());
        self.broadcast(job.job_id, ScanEvent::StateChanged { job_id: job.job_id, from: previous, to: next, at });
        if next.is_terminal() {
            self.broadcast(job.job_id, ScanEvent::Terminal { job_id: job.job_id, state: next, at });
        }

        info!(job_id = %job.job_id, tenant_id = %job.tenant_id, from = ?previous, to = ?next, "job state transitioned");
        Ok(())
    }

    fn broadcast(&self, job_id: JobId, event: ScanEvent) {
        if let Some(sender) = self.events.get(&job_id) {
            // No subscribers is not an error: Stream is opt-in.
            let _ = sender.send(event);
        }
    }
}

/// A scan-scoped handle into [`LifecycleManager::record_progress`], passed
/// to [`crate::executor::ScanExecutor::execute`] so a scanner can report
/// progress without seeing the rest of the orchestrator.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, progress_pct: f32);
}

#[derive(Clone)]
pub struct LifecycleProgress<G: PersistenceGateway> {
    lifecycle: Arc<LifecycleManager<G>>,
    job_id: JobId,
}

impl<G: PersistenceGateway> ProgressReporter for LifecycleProgress<G> {
    fn report(&self, progress_pct: f32) {
        self.lifecycle.record_progress(self.job_id, progress_pct, Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::{
        audit::InMemoryAuditBackend, database::InMemoryGateway, Principal, ScanType, TenantId, UserId,
    };
    use scan_core::model::ScanRequest;

    fn sample_job() -> ScanJob {
        let request = ScanRequest {
            request_id: JobId::new(),
            tenant_id: TenantId(uuid::Uuid::new_v4()),
            principal: Principal {
                tenant_id: TenantId(uuid::Uuid::new_v4()),
                user_id: UserId(uuid::Uuid::new_v4()),
                roles: vec![],
            },
            scan_type: ScanType::Code,
            target_region: "NL".into(),
            target: serde_json::json!({}),
            options: serde_json::json!({}),
            submitted_at: Utc::now(),
            deadline: None,
        };
        ScanJob::new(&request)
    }

    fn manager() -> LifecycleManager<InMemoryGateway> {
        let gateway = Arc::new(InMemoryGateway::new());
        let audit = Arc::new(AuditLogger::new(
            Arc::new(InMemoryAuditBackend::new()),
            Arc::new(scan_core::error::ErrorMetrics::new()),
        ));
        LifecycleManager::new(gateway, audit, None)
    }

    #[tokio::test]
    async fn allows_queued_to_admitted() {
        let manager = manager();
        let mut job = sample_job();

        manager.transition(&mut job, ScanJobState::Admitted, Utc::now()).await.unwrap();
        assert_eq!(job.state, ScanJobState::Admitted);
        assert!(job.finished_at.is_none());
    }

    #[tokio::test]
    async fn rejects_queued_to_running() {
        let manager = manager();
        let mut job = sample_job();

        let result = manager.transition(&mut job, ScanJobState::Running, Utc::now()).await;
        assert!(result.is_err());
        assert_eq!(job.state, ScanJobState::Queued);
    }

    #[tokio::test]
    async fn terminal_transition_stamps_finished_at() {
        let manager = manager();
        let mut job = sample_job();

        manager.transition(&mut job, ScanJobState::Admitted, Utc::now()).await.unwrap();
        manager.transition(&mut job, ScanJobState::Running, Utc::now()).await.unwrap();
        manager.transition(&mut job, ScanJobState::Succeeded, Utc::now()).await.unwrap();
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn tracked_job_is_queryable_and_streamable() {
        let manager = manager();
        let job = sample_job();
        let job_id = job.job_id;
        manager.track(job.clone());

        let mut receiver = manager.subscribe(job_id).unwrap();
        let mut job = job;
        manager.transition(&mut job, ScanJobState::Admitted, Utc::now()).await.unwrap();

        assert_eq!(manager.snapshot(job_id).unwrap().state, ScanJobState::Admitted);
        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, ScanEvent::StateChanged { to: ScanJobState::Admitted, .. }));
    }

    #[tokio::test]
    async fn untrack_removes_job_from_active_table() {
        let manager = manager();
        let job = sample_job();
        let job_id = job.job_id;
        manager.track(job);

        manager.untrack(job_id);
        assert!(manager.snapshot(job_id).is_none());
        assert!(manager.subscribe(job_id).is_none());
    }
}
