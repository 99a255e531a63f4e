use scan_core::audit::AuditLogger;
use scan_core::database::PostgresGateway;
use scan_core::license::QuotaEnforcer;
use scan_core::Config;
use scan_engine::{ComplianceScoreEngine, EngineExecutor, PatternRegistry};
use scan_orchestrator::queue::RedisScanQueue;
use scan_orchestrator::{JobOrchestrator, LicenseProvider};
use std::sync::Arc;

/// The concrete orchestrator this binary wires: a Redis-backed tenant-fair
/// queue, a PostgreSQL persistence gateway, and the scan-engine's own
/// executor. Every other crate's public surface stays generic over
/// `ScanQueue`/`PersistenceGateway`/`ScanExecutor`; only the binary commits
/// to one concrete stack.
pub type Orchestrator = JobOrchestrator<RedisScanQueue, PostgresGateway, EngineExecutor>;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub orchestrator: Arc<Orchestrator>,
    pub gateway: Arc<PostgresGateway>,
    pub registry: Arc<PatternRegistry>,
    pub score_engine: Arc<ComplianceScoreEngine>,
    pub audit: Arc<AuditLogger>,
    pub redis: redis::aio::ConnectionManager,
    /// Held alongside the orchestrator (which owns its own copies) so the
    /// usage endpoint can read current counters without a round trip
    /// through the admission path.
    pub quotas: QuotaEnforcer,
    pub license_provider: Arc<dyn LicenseProvider>,
}
