pub mod event;
pub mod logger;
pub mod repository;
pub mod traits;

pub use event::{AuditEvent, AuditEventBuilder, EventSeverity, EventType, EventOutcome};
pub use logger::AuditLogger;
pub use repository::{AuditRepository, DatabaseAuditRepository, InMemoryAuditBackend};
pub use traits::{AuditBackend, Auditable};