//! Quota reservation for the license & quota enforcer (§4.5).
//!
//! Quota is *pre-incremented on admit* and only decremented if the job is
//! rejected before reaching `Admitted` — once a job is admitted it has
//! consumed capacity even if it later fails, which is the cheapest defense
//! against retry storms draining a tenant's quota. A reservation left
//! uncommitted and unreleased for longer than its TTL (default 60s) is
//! auto-released the next time any reservation call touches that tenant,
//! mirroring the lazy-cleanup discipline in [`crate::session`].

use crate::{error::Result, TenantId};
use chrono::{Duration, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub struct QuotaConfig {
    pub reservation_ttl: Duration,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            reservation_ttl: Duration::seconds(60),
        }
    }
}

/// A pending reservation against a single `(tenant, period_key, kind)` counter.
/// Must be resolved with [`QuotaEnforcer::commit`] or
/// [`QuotaEnforcer::release`]; left unresolved, it auto-releases after its TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationHandle {
    pub reservation_id: Uuid,
    pub tenant_id: TenantId,
    pub period_key: String,
    pub kind: String,
    pub amount: i64,
}

/// Redis-backed quota counters, scoped per tenant/period/kind (§3's Quota
/// Counter entity, §4.5's reserve/commit/release contract).
#[derive(Clone)]
pub struct QuotaEnforcer {
    redis: ConnectionManager,
    config: QuotaConfig,
}

impl QuotaEnforcer {
    pub fn new(redis: ConnectionManager, config: QuotaConfig) -> Self {
        Self { redis, config }
    }

    /// Increments the `(tenant, period_key, kind)` counter by `amount` and
    /// returns a reservation handle, unless that would push the counter past
    /// `limit`, in which case the counter is left untouched and an error is
    /// returned to the orchestrator for a `RejectedQuota` rejection.
    pub async fn reserve(
        &self,
        tenant_id: TenantId,
        period_key: &str,
        kind: &str,
        amount: i64,
        limit: i64,
    ) -> Result<ReservationHandle> {
        let mut conn = self.redis.clone();
        self.release_expired(&mut conn, tenant_id).await?;

        let counter_key = Self::counter_key(tenant_id, period_key, kind);
        let new_total: i64 = conn.incr(&counter_key, amount).await?;

        if new_total > limit {
            let _: i64 = conn.decr(&counter_key, amount).await?;
            return Err(crate::error::Error::rejected_quota(format!(
                "{kind} quota exhausted for tenant {tenant_id} in period {period_key}: {new_total} > {limit}"
            )));
        }

        let reservation_id = Uuid::new_v4();
        let meta_key = Self::meta_key(reservation_id);
        let pending_key = Self::pending_key(tenant_id);
        let ttl_seconds = self.config.reservation_ttl.num_seconds().max(1);
        let expires_at = (Utc::now() + self.config.reservation_ttl).timestamp_millis();

        let _: () = conn
            .hset_multiple(
                &meta_key,
                &[
                    ("counter_key", counter_key.as_str()),
                    ("amount", &amount.to_string()),
                ],
            )
            .await?;
        let _: () = conn.expire(&meta_key, ttl_seconds + 5).await?;
        let _: () = conn
            .zadd(&pending_key, reservation_id.to_string(), expires_at)
            .await?;

        Ok(ReservationHandle {
            reservation_id,
            tenant_id,
            period_key: period_key.to_string(),
            kind: kind.to_string(),
            amount,
        })
    }

    /// Confirms a reservation. The counter stays incremented; only the
    /// pending-release bookkeeping is cleared.
    pub async fn commit(&self, handle: &ReservationHandle) -> Result<()> {
        let mut conn = self.redis.clone();
        self.clear_pending(&mut conn, handle.tenant_id, handle.reservation_id)
            .await
    }

    /// Reverses a reservation's increment, for a job rejected before `Admitted`.
    pub async fn release(&self, handle: &ReservationHandle) -> Result<()> {
        let mut conn = self.redis.clone();
        let counter_key = Self::counter_key(handle.tenant_id, &handle.period_key, &handle.kind);
        let _: i64 = conn.decr(&counter_key, handle.amount).await?;
        self.clear_pending(&mut conn, handle.tenant_id, handle.reservation_id)
            .await
    }

    /// Side-effect-free: current usage for `(tenant, period_key, kind)`.
    pub async fn used(&self, tenant_id: TenantId, period_key: &str, kind: &str) -> Result<i64> {
        let mut conn = self.redis.clone();
        let counter_key = Self::counter_key(tenant_id, period_key, kind);
        let used: Option<i64> = conn.get(&counter_key).await?;
        Ok(used.unwrap_or(0))
    }

    async fn clear_pending(
        &self,
        conn: &mut ConnectionManager,
        tenant_id: TenantId,
        reservation_id: Uuid,
    ) -> Result<()> {
        let pending_key = Self::pending_key(tenant_id);
        let meta_key = Self::meta_key(reservation_id);
        let _: u32 = conn.zrem(&pending_key, reservation_id.to_string()).await?;
        let _: u32 = conn.del(&meta_key).await?;
        Ok(())
    }

    /// Releases any reservation under `tenant_id` whose TTL has elapsed
    /// without a commit or explicit release.
    async fn release_expired(&self, conn: &mut ConnectionManager, tenant_id: TenantId) -> Result<()> {
        let pending_key = Self::pending_key(tenant_id);
        let now = Utc::now().timestamp_millis();

        let expired: Vec<String> = conn.zrangebyscore(&pending_key, i64::MIN, now).await?;
        for reservation_id in &expired {
            let meta_key = Self::meta_key_from_str(reservation_id);
            let counter_key: Option<String> = conn.hget(&meta_key, "counter_key").await?;
            let amount: Option<i64> = conn.hget(&meta_key, "amount").await?;

            if let (Some(counter_key), Some(amount)) = (counter_key, amount) {
                let _: i64 = conn.decr(&counter_key, amount).await?;
                debug!(reservation_id, counter_key, amount, "auto-released expired quota reservation");
            }

            let _: u32 = conn.del(&meta_key).await?;
        }

        if !expired.is_empty() {
            let _: u32 = conn.zrembyscore(&pending_key, i64::MIN, now).await?;
        }

        Ok(())
    }

    fn counter_key(tenant_id: TenantId, period_key: &str, kind: &str) -> String {
        format!("quota:{}:{}:{}", tenant_id.0, period_key, kind)
    }

    fn pending_key(tenant_id: TenantId) -> String {
        format!("quota_pending:{}", tenant_id.0)
    }

    fn meta_key(reservation_id: Uuid) -> String {
        format!("quota_pending_meta:{reservation_id}")
    }

    fn meta_key_from_str(reservation_id: &str) -> String {
        format!("quota_pending_meta:{reservation_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_reservation_ttl_is_sixty_seconds() {
        assert_eq!(QuotaConfig::default().reservation_ttl, Duration::seconds(60));
    }

    #[test]
    fn counter_key_is_scoped_by_tenant_period_and_kind() {
        let tenant_id = TenantId(Uuid::nil());
        let key = QuotaEnforcer::counter_key(tenant_id, "2026-07", "scans_per_month");
        assert_eq!(key, format!("quota:{}:2026-07:scans_per_month", Uuid::nil()));
    }
}
