//! # Error Handling Framework
//!
//! Structured error management for the scanning platform, shared by every
//! crate in the workspace:
//!
//! ## Core Features
//!
//! - **Structured Error Codes**: Categorized, numbered codes for consistent handling
//! - **Rich Context**: Request context and error metadata for debugging
//! - **Severity Classification**: Error categorization for appropriate responses
//! - **Metrics Integration**: Error tracking and monitoring capabilities
//!
//! ## Error Categories
//!
//! - **Validation**: Input validation and request shape violations
//! - **License**: License and quota rejections (never authentication)
//! - **Database**: Persistence layer errors and constraint violations
//! - **Network**: External service communication failures
//! - **Scan**: Job/queue/scanner execution failures
//! - **Internal**: Unexpected system errors requiring investigation
//!
//! ## Context Tracking
//!
//! - **Request Context**: HTTP request tracking with correlation IDs
//! - **Error Context**: Structured error metadata and cause chain
//! - **Tenant Context**: Multi-tenant error isolation and tracking
//!
//! ## Usage
//!
//! ```rust,ignore
//! use scan_core::error::{Error, ErrorCode, Result};
//!
//! fn admit(tenant_has_quota: bool) -> Result<()> {
//!     if !tenant_has_quota {
//!         return Err(Error::rejected_quota("monthly scan quota exhausted"));
//!     }
//!     Ok(())
//! }
//! ```

pub mod codes;
pub mod context;
pub mod framework;
pub mod metrics;

pub use codes::ErrorCode;
pub use context::{ErrorContext, RequestContext};
pub use framework::{Error, ErrorCategory, ErrorSeverity, Result};
pub use metrics::ErrorMetrics;
