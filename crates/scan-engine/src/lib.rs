//! Scanner Abstraction Layer: Pattern & Rule Registry (C1), Detection
//! Primitives (C2), Scanner Implementations (C3), Results Aggregator (C6),
//! and Compliance Score Engine (C7). `scan-orchestrator` drives this crate
//! through the single [`scanners::EngineExecutor`]; nothing here depends on
//! the orchestrator's internals beyond the `ScanExecutor`/`ProgressReporter`
//! traits it exposes.

pub mod aggregate;
pub mod detect;
pub mod error;
pub mod registry;
pub mod scanners;
pub mod score;

pub use aggregate::{aggregate, dedupe_and_reassign_severity, evidence_hash, ScanUnitCounts};
pub use error::{EngineError, Result};
pub use registry::{PatternRegistry, RegistrySnapshot};
pub use scanners::{default_scanners, EngineExecutor, Scanner};
pub use score::{ComplianceScoreEngine, ForecastInput};
