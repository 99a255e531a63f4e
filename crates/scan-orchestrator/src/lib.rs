//! Job Orchestrator (§4.4): admission, the tenant-fair queue,
//! cancellation, state-machine enforcement, and the worker pool that
//! actually runs scans. Scan execution itself is delegated through
//! [`executor::ScanExecutor`] to a crate (`scan-engine`) this crate never
//! depends on directly, so the orchestrator builds and is testable on its
//! own before a scanner implementation exists.

pub mod admission;
pub mod cancellation;
pub mod executor;
pub mod lifecycle;
pub mod orchestrator;
pub mod queue;
pub mod webhook;

pub use admission::{period_key, AdmissionService, GatewayLicenseProvider, HardwareFingerprint, LicenseProvider};
pub use cancellation::{CancellationRegistry, CancellationToken};
pub use executor::{ComplianceScorer, ScanExecutor, ScanOutcome, WorkerPool, WorkerPoolConfig};
pub use lifecycle::LifecycleManager;
pub use orchestrator::JobOrchestrator;
pub use queue::{InMemoryScanQueue, RedisScanQueue, ScanQueue};
pub use webhook::{LoggingWebhookSink, WebhookSink};
