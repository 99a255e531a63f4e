//! Concurrent-user tracking for the license & quota enforcer (§4.5).
//!
//! A License carries `max_concurrent_users`. The enforcer maintains a sliding
//! set of distinct active users per tenant, renewed by a heartbeat with a
//! TTL (`session.ttl_ms`, default 30 minutes). A submission may be rejected
//! with `RejectedConcurrency` if admitting it would exceed the cap and the
//! submitting user is not already in the active set. The set is
//! TTL-cleaned lazily on access rather than by a background sweep (§5).

use crate::{error::Result, TenantId, UserId};
use chrono::{Duration, Utc};
use redis::{aio::ConnectionManager, AsyncCommands};
use tracing::debug;

/// Configuration for the active-user tracker, derived from `config.session.ttl_ms`.
#[derive(Debug, Clone, Copy)]
pub struct ActiveUserConfig {
    pub ttl: Duration,
}

impl Default for ActiveUserConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::milliseconds(1_800_000),
        }
    }
}

impl ActiveUserConfig {
    pub fn from_ttl_ms(ttl_ms: u64) -> Self {
        Self {
            ttl: Duration::milliseconds(ttl_ms as i64),
        }
    }
}

/// Tracks, per tenant, the set of users who have submitted a scan within the
/// last `ttl`. Backed by a Redis sorted set keyed by tenant, scored by the
/// heartbeat's timestamp so expired members can be pruned in one call.
#[derive(Clone)]
pub struct ConcurrentUserTracker {
    redis: ConnectionManager,
    config: ActiveUserConfig,
}

impl ConcurrentUserTracker {
    pub fn new(redis: ConnectionManager, config: ActiveUserConfig) -> Self {
        Self { redis, config }
    }

    /// Records a heartbeat for `user_id` under `tenant_id`, then returns the
    /// tenant's active user count after pruning expired members.
    pub async fn heartbeat(&self, tenant_id: TenantId, user_id: UserId) -> Result<u32> {
        let key = Self::active_users_key(tenant_id);
        let mut conn = self.redis.clone();
        let member = user_id.0.to_string();
        let now = Utc::now().timestamp_millis();

        let _: () = conn.zadd(&key, &member, now).await?;
        let ttl_seconds = self.config.ttl.num_seconds().max(1);
        let _: () = conn.expire(&key, ttl_seconds).await?;

        self.prune_and_count(&mut conn, &key).await
    }

    /// Whether admitting `user_id` would push the tenant over `max_concurrent_users`.
    /// A user already in the active set never counts as a new admission.
    pub async fn would_exceed(
        &self,
        tenant_id: TenantId,
        user_id: UserId,
        max_concurrent_users: u32,
    ) -> Result<bool> {
        let key = Self::active_users_key(tenant_id);
        let mut conn = self.redis.clone();
        let active_count = self.prune_and_count(&mut conn, &key).await?;

        let member = user_id.0.to_string();
        let score: Option<f64> = conn.zscore(&key, &member).await?;

        Ok(score.is_none() && active_count >= max_concurrent_users)
    }

    /// Removes members whose heartbeat fell outside `ttl` and returns the
    /// remaining cardinality.
    async fn prune_and_count(&self, conn: &mut ConnectionManager, key: &str) -> Result<u32> {
        let cutoff = (Utc::now() - self.config.ttl).timestamp_millis();
        let _: u32 = conn.zrembyscore(key, i64::MIN, cutoff).await?;
        let count: u32 = conn.zcard(key).await?;
        debug!(tenant_key = %key, active_users = count, "active user set pruned");
        Ok(count)
    }

    fn active_users_key(tenant_id: TenantId) -> String {
        format!("active_users:{}", tenant_id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ttl_is_thirty_minutes() {
        assert_eq!(ActiveUserConfig::default().ttl, Duration::minutes(30));
    }

    #[test]
    fn from_ttl_ms_matches_spec_default() {
        let config = ActiveUserConfig::from_ttl_ms(1_800_000);
        assert_eq!(config.ttl, Duration::minutes(30));
    }
}
