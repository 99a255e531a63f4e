pub mod audit;
pub mod config;
pub mod database;
pub mod error;
pub mod license;
pub mod metrics;
pub mod model;
pub mod session;
pub mod types;

pub use audit::{AuditEvent, AuditLogger, AuditRepository, InMemoryAuditBackend};
pub use config::{Config, CorsConfig};
pub use database::{InMemoryGateway, PersistenceGateway, PostgresGateway};
pub use error::{Error, ErrorCode, ErrorContext, ErrorMetrics, Result};
pub use license::{QuotaConfig, QuotaEnforcer, ReservationHandle};
pub use metrics::{MetricsRegistry, MetricsService, ScanMetrics};
pub use model::{
    ComplianceHistoryPoint, Finding, License, QuotaCounter, RequestContext, ScanEvent, ScanJob,
    ScanJobState, ScanRequest, ScanResult,
};
pub use session::{ActiveUserConfig, ConcurrentUserTracker};
pub use types::*;

// Re-export commonly used types from dependencies
pub use chrono::{DateTime, Utc};
pub use uuid::Uuid;
