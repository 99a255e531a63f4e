//! The Admission queue (§4.4): FIFO per tenant, globally bounded,
//! dequeued in strict tenant-fair round-robin so one noisy tenant cannot
//! starve another's jobs that arrived later but belong to a different tenant.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::{aio::ConnectionManager, AsyncCommands};
use scan_core::{
    error::{Error, Result},
    model::ScanRequest,
    TenantId,
};
use std::collections::VecDeque;
use tokio::sync::Mutex;

#[async_trait]
pub trait ScanQueue: Send + Sync {
    /// Enqueues `request`. Fails with `RejectedConcurrency` if the queue is
    /// at its global capacity (§4.4's "globally bounded").
    async fn enqueue(&self, request: ScanRequest) -> Result<()>;

    /// Pops the next request in tenant-fair round-robin order, or `None`
    /// if the queue is empty.
    async fn dequeue(&self) -> Result<Option<ScanRequest>>;

    /// Removes a still-queued request by job id. Returns `true` if it was
    /// found and removed (the direct `Queued -> Cancelled` edge, §4.4).
    async fn cancel(&self, tenant_id: TenantId, job_id: scan_core::JobId) -> Result<bool>;

    /// Current total depth across all tenants.
    async fn depth(&self) -> Result<u64>;
}

/// In-process queue: a round-robin cursor of tenants with pending work,
/// each backed by its own FIFO deque.
pub struct InMemoryScanQueue {
    tenant_order: Mutex<VecDeque<TenantId>>,
    pending: DashMap<TenantId, VecDeque<ScanRequest>>,
    max_depth: u64,
}

impl InMemoryScanQueue {
    pub fn new(max_depth: u64) -> Self {
        Self {
            tenant_order: Mutex::new(VecDeque::new()),
            pending: DashMap::new(),
            max_depth,
        }
    }
}

#[async_trait]
impl ScanQueue for InMemoryScanQueue {
    async fn enqueue(&self, request: ScanRequest) -> Result<()> {
        if self.depth().await? >= self.max_depth {
            return Err(Error::rejected_concurrency(format!(
                "admission queue is at its global capacity of {}",
                self.max_depth
            )));
        }

        let tenant_id = request.tenant_id;
        let mut order = self.tenant_order.lock().await;
        let is_new_for_tenant = {
            let mut queue = self.pending.entry(tenant_id).or_default();
            let was_empty = queue.is_empty();
            queue.push_back(request);
            was_empty
        };
        if is_new_for_tenant {
            order.push_back(tenant_id);
        }
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<ScanRequest>> {
        let mut order = self.tenant_order.lock().await;
        let Some(tenant_id) = order.pop_front() else {
            return Ok(None);
        };

        let request = {
            let mut queue = match self.pending.get_mut(&tenant_id) {
                Some(queue) => queue,
                None => return Ok(None),
            };
            queue.pop_front()
        };

        let still_pending = self
            .pending
            .get(&tenant_id)
            .map(|queue| !queue.is_empty())
            .unwrap_or(false);
        if still_pending {
            order.push_back(tenant_id);
        }

        Ok(request)
    }

    async fn cancel(&self, tenant_id: TenantId, job_id: scan_core::JobId) -> Result<bool> {
        let mut queue = match self.pending.get_mut(&tenant_id) {
            Some(queue) => queue,
            None => return Ok(false),
        };
        let before = queue.len();
        queue.retain(|request| request.request_id != job_id);
        Ok(queue.len() != before)
    }

    async fn depth(&self) -> Result<u64> {
        Ok(self.pending.iter().map(|entry| entry.value().len() as u64).sum())
    }
}

/// Redis-backed equivalent: one list per tenant holding serialized requests,
/// plus a circular list of tenant ids used as the round-robin cursor. The
/// cursor rotates via `RPOPLPUSH key key`, which is atomic and requires no
/// separate bookkeeping of "which tenant is next".
pub struct RedisScanQueue {
    redis: ConnectionManager,
    max_depth: u64,
}

impl RedisScanQueue {
    pub fn new(redis: ConnectionManager, max_depth: u64) -> Self {
        Self { redis, max_depth }
    }

    fn cursor_key() -> &'static str {
        "scan_queue:tenant_cursor"
    }

    fn tenant_key(tenant_id: TenantId) -> String {
        format!("scan_queue:tenant:{}", tenant_id.0)
    }
}

#[async_trait]
impl ScanQueue for RedisScanQueue {
    async fn enqueue(&self, request: ScanRequest) -> Result<()> {
        if self.depth().await? >= self.max_depth {
            return Err(Error::rejected_concurrency(format!(
                "admission queue is at its global capacity of {}",
                self.max_depth
            )));
        }

        let mut conn = self.redis.clone();
        let tenant_id = request.tenant_id;
        let tenant_key = Self::tenant_key(tenant_id);
        let payload = serde_json::to_string(&request).map_err(|err| {
            Error::internal(format!("failed to serialize scan request: {err}"))
        })?;

        let new_len: i64 = conn.rpush(&tenant_key, payload).await?;
        if new_len == 1 {
            // First item for this tenant: make sure it's on the cursor
            // exactly once (lrem+rpush is simpler and cheap at this scale
            // than tracking membership in a separate set).
            let cursor_key = Self::cursor_key();
            let tenant_member = tenant_id.0.to_string();
            let _: i64 = conn.lrem(cursor_key, 0, &tenant_member).await?;
            let _: i64 = conn.rpush(cursor_key, &tenant_member).await?;
        }
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<ScanRequest>> {
        let mut conn = self.redis.clone();
        let cursor_key = Self::cursor_key();

        // Try each tenant in the cursor at most once this call; a tenant
        // whose list is empty (stale cursor entry) is dropped rather than
        // rotated back in.
        let cursor_len: i64 = conn.llen(cursor_key).await?;
        for _ in 0..cursor_len.max(0) {
            let tenant_member: Option<String> = conn.rpoplpush(cursor_key, cursor_key).await?;
            let Some(tenant_member) = tenant_member else {
                return Ok(None);
            };
            let tenant_key = format!("scan_queue:tenant:{tenant_member}");
            let payload: Option<String> = conn.lpop(&tenant_key, None).await?;
            match payload {
                Some(payload) => {
                    let request: ScanRequest = serde_json::from_str(&payload).map_err(|err| {
                        Error::internal(format!("failed to deserialize scan request: {err}"))
                    })?;
                    return Ok(Some(request));
                }
                None => {
                    let _: i64 = conn.lrem(cursor_key, 0, &tenant_member).await?;
                }
            }
        }
        Ok(None)
    }

    async fn cancel(&self, tenant_id: TenantId, job_id: scan_core::JobId) -> Result<bool> {
        let mut conn = self.redis.clone();
        let tenant_key = Self::tenant_key(tenant_id);
        let items: Vec<String> = conn.lrange(&tenant_key, 0, -1).await?;

        let mut removed = false;
        let mut survivors = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_str::<ScanRequest>(&item) {
                Ok(request) if request.request_id == job_id => {
                    removed = true;
                }
                _ => survivors.push(item),
            }
        }

        if removed {
            let _: () = conn.del(&tenant_key).await?;
            if !survivors.is_empty() {
                let _: i64 = conn.rpush(&tenant_key, survivors).await?;
            }
        }
        Ok(removed)
    }

    async fn depth(&self) -> Result<u64> {
        let mut conn = self.redis.clone();
        let cursor_key = Self::cursor_key();
        let tenant_members: Vec<String> = conn.lrange(cursor_key, 0, -1).await?;
        let mut total = 0u64;
        for tenant_member in tenant_members {
            let tenant_key = format!("scan_queue:tenant:{tenant_member}");
            let len: i64 = conn.llen(&tenant_key).await?;
            total += len.max(0) as u64;
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scan_core::{JobId, Principal, ScanType, UserId};

    fn request_for(tenant_id: TenantId) -> ScanRequest {
        ScanRequest {
            request_id: JobId::new(),
            tenant_id,
            principal: Principal {
                tenant_id,
                user_id: UserId(uuid::Uuid::new_v4()),
                roles: vec![],
            },
            scan_type: ScanType::Code,
            target_region: "NL".into(),
            target: serde_json::json!({}),
            options: serde_json::json!({}),
            submitted_at: chrono::Utc::now(),
            deadline: None,
        }
    }

    #[tokio::test]
    async fn dequeues_in_tenant_fair_round_robin_order() {
        let queue = InMemoryScanQueue::new(100);
        let tenant_a = TenantId(uuid::Uuid::new_v4());
        let tenant_b = TenantId(uuid::Uuid::new_v4());

        // a1, a2, b1 arrive in that order; fairness means b1 is served
        // before a2 even though a2 arrived first.
        let a1 = request_for(tenant_a);
        let a1_id = a1.request_id;
        queue.enqueue(a1).await.unwrap();
        let a2 = request_for(tenant_a);
        let a2_id = a2.request_id;
        queue.enqueue(a2).await.unwrap();
        let b1 = request_for(tenant_b);
        let b1_id = b1.request_id;
        queue.enqueue(b1).await.unwrap();

        assert_eq!(queue.dequeue().await.unwrap().unwrap().request_id, a1_id);
        assert_eq!(queue.dequeue().await.unwrap().unwrap().request_id, b1_id);
        assert_eq!(queue.dequeue().await.unwrap().unwrap().request_id, a2_id);
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rejects_enqueue_past_global_capacity() {
        let queue = InMemoryScanQueue::new(1);
        let tenant_id = TenantId(uuid::Uuid::new_v4());
        queue.enqueue(request_for(tenant_id)).await.unwrap();
        let result = queue.enqueue(request_for(tenant_id)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn cancel_removes_a_still_queued_job() {
        let queue = InMemoryScanQueue::new(100);
        let tenant_id = TenantId(uuid::Uuid::new_v4());
        let request = request_for(tenant_id);
        let job_id = request.request_id;
        queue.enqueue(request).await.unwrap();

        assert!(queue.cancel(tenant_id, job_id).await.unwrap());
        assert_eq!(queue.depth().await.unwrap(), 0);
        assert!(!queue.cancel(tenant_id, job_id).await.unwrap());
    }
}
