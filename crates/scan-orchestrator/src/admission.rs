//! Admission path for `Submit` (§4.4 step 1-3, §4.5): license/region
//! gating, concurrent-user cap, then quota pre-increment, in that order so a
//! job that fails any later check releases everything reserved before it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use scan_core::{
    database::PersistenceGateway,
    error::Result,
    license::{QuotaEnforcer, ReservationHandle},
    model::{License, ScanJob, ScanRequest},
    session::ConcurrentUserTracker,
    Error, JobId, TenantId,
};
use std::sync::Arc;
use tracing::{info, warn};

/// License resolution is an admin path external to the core (§3:
/// "created/updated by an admin path (external); read-only to the core").
#[async_trait]
pub trait LicenseProvider: Send + Sync {
    async fn active_license(&self, tenant_id: TenantId) -> Result<Option<License>>;
}

/// The production [`LicenseProvider`]: reads the `licenses` table through
/// whatever [`PersistenceGateway`] the binary is wired with, rather than
/// opening a second connection pool just for this one read path.
pub struct GatewayLicenseProvider<G: PersistenceGateway> {
    gateway: Arc<G>,
}

impl<G: PersistenceGateway> GatewayLicenseProvider<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl<G: PersistenceGateway + 'static> LicenseProvider for GatewayLicenseProvider<G> {
    async fn active_license(&self, tenant_id: TenantId) -> Result<Option<License>> {
        self.gateway.get_license(tenant_id).await
    }
}

/// A device fingerprint supplied by the collaborator for standalone,
/// hardware-bound licenses (§4.5). `None` when the deployment has no
/// hardware binding to check.
pub type HardwareFingerprint = Option<String>;

pub struct AdmissionService {
    license_provider: Arc<dyn LicenseProvider>,
    quotas: QuotaEnforcer,
    concurrency: ConcurrentUserTracker,
    /// Reservations pending a decision, keyed by the job they belong to
    /// (`request.request_id`, which becomes `ScanJob::job_id`). Quota is
    /// pre-incremented at `reserve` time but only kept once the job reaches
    /// Admitted (`commit_job`); a job that never gets there releases them
    /// (`release_job`).
    reservations: DashMap<JobId, Vec<ReservationHandle>>,
}

impl AdmissionService {
    pub fn new(
        license_provider: Arc<dyn LicenseProvider>,
        quotas: QuotaEnforcer,
        concurrency: ConcurrentUserTracker,
    ) -> Self {
        Self {
            license_provider,
            quotas,
            concurrency,
            reservations: DashMap::new(),
        }
    }

    /// Runs the full admission gate and, on success, returns a freshly
    /// `Queued` [`ScanJob`] ready to be handed to a [`crate::queue::ScanQueue`].
    pub async fn submit(
        &self,
        request: &ScanRequest,
        hardware_fingerprint: HardwareFingerprint,
    ) -> Result<ScanJob> {
        let tenant_id = request.tenant_id;
        let now = Utc::now();

        let license = self
            .license_provider
            .active_license(tenant_id)
            .await?
            .ok_or_else(|| Error::rejected_license(format!("no active license for tenant {tenant_id}")))?;

        self.check_license(&license, request, now, hardware_fingerprint)?;

        let would_exceed = self
            .concurrency
            .would_exceed(tenant_id, request.principal.user_id, license.max_concurrent_users)
            .await?;

        if would_exceed {
            warn!(%tenant_id, cap = license.max_concurrent_users, "rejected: concurrent-user cap exceeded");
            return Err(Error::rejected_concurrency(format!(
                "tenant {tenant_id} is at its concurrent-user cap of {}",
                license.max_concurrent_users
            )));
        }

        let reservations = match self.reserve_quotas(&license, request, now).await {
            Ok(reservations) => reservations,
            Err(err) => return Err(err),
        };

        // Quota is now pre-incremented but not yet committed: the job still
        // has to reach Admitted. `commit_job`/`release_job` settle this.
        self.reservations.insert(request.request_id, reservations);

        self.concurrency.heartbeat(tenant_id, request.principal.user_id).await?;

        info!(%tenant_id, job_id = %request.request_id, scan_type = %request.scan_type, "scan admitted to queue");
        Ok(ScanJob::new(request))
    }

    /// Confirms `job_id`'s pending quota reservations, once the worker pool
    /// has moved it to Admitted. A no-op if the job has no pending
    /// reservations (already settled, or admitted without any).
    pub async fn commit_job(&self, job_id: JobId) -> Result<()> {
        if let Some((_, reservations)) = self.reservations.remove(&job_id) {
            for reservation in &reservations {
                self.quotas.commit(reservation).await?;
            }
        }
        Ok(())
    }

    /// Releases `job_id`'s pending quota reservations, for a job cancelled
    /// before it ever reached Admitted.
    pub async fn release_job(&self, job_id: JobId) -> Result<()> {
        if let Some((_, reservations)) = self.reservations.remove(&job_id) {
            for reservation in &reservations {
                self.quotas.release(reservation).await?;
            }
        }
        Ok(())
    }

    fn check_license(
        &self,
        license: &License,
        request: &ScanRequest,
        now: DateTime<Utc>,
        hardware_fingerprint: HardwareFingerprint,
    ) -> Result<()> {
        if !license.is_active_at(now) {
            return Err(Error::rejected_license(format!(
                "license for tenant {} is not active at {now}",
                request.tenant_id
            )));
        }

        if !license.permits_scanner(request.scan_type) {
            return Err(Error::rejected_license(format!(
                "license for tenant {} does not permit {} scans",
                request.tenant_id, request.scan_type
            )));
        }

        if !license.permits_region(&request.target_region) {
            return Err(Error::rejected_region(format!(
                "license for tenant {} does not permit region {}",
                request.tenant_id, request.target_region
            )));
        }

        if let Some(binding) = &license.hardware_binding {
            match hardware_fingerprint {
                Some(ref fingerprint) if fingerprint == binding => {}
                _ => {
                    return Err(Error::hardware_binding_mismatch(format!(
                        "tenant {} license is hardware-bound",
                        request.tenant_id
                    )))
                }
            }
        }

        Ok(())
    }

    /// Reserves every applicable `scans_per_*` quota the license declares.
    /// Rolls back everything reserved so far on the first rejection.
    async fn reserve_quotas(
        &self,
        license: &License,
        request: &ScanRequest,
        at: DateTime<Utc>,
    ) -> Result<Vec<ReservationHandle>> {
        let mut reservations = Vec::new();

        for (kind, limit) in &license.quotas {
            if !kind.starts_with("scans_per") {
                continue;
            }

            let period_key = period_key(kind, at);
            match self
                .quotas
                .reserve(request.tenant_id, &period_key, kind, 1, *limit)
                .await
            {
                Ok(handle) => reservations.push(handle),
                Err(err) => {
                    for handle in &reservations {
                        let _ = self.quotas.release(handle).await;
                    }
                    return Err(err);
                }
            }
        }

        Ok(reservations)
    }
}

/// Calendar-aligned bucket for a quota kind name, per §3's "Period
/// keys are calendar-aligned buckets (day/month/year)".
pub fn period_key(kind: &str, at: DateTime<Utc>) -> String {
    if kind.ends_with("_per_day") {
        at.format("%Y-%m-%d").to_string()
    } else if kind.ends_with("_per_year") {
        at.format("%Y").to_string()
    } else {
        at.format("%Y-%m").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_key_buckets_by_suffix() {
        let at = DateTime::parse_from_rfc3339("2026-07-28T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        assert_eq!(period_key("scans_per_day", at), "2026-07-28");
        assert_eq!(period_key("scans_per_month", at), "2026-07");
        assert_eq!(period_key("scans_per_year", at), "2026");
    }
}
