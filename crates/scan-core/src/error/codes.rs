use serde::{Deserialize, Serialize};
use std::fmt;

/// Standardized error codes for the scanning platform
/// These are business-agnostic and represent technical error categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // General System Errors (1000-1999)
    InternalServerError = 1000,
    ConfigurationError = 1001,
    ServiceUnavailable = 1002,
    Timeout = 1003,
    ResourceExhausted = 1004,

    // Database Errors (2000-2999)
    DatabaseConnectionError = 2000,
    DatabaseConstraintViolation = 2001,
    DatabaseTransactionError = 2002,
    DatabaseQueryError = 2003,
    DatabaseMigrationError = 2004,
    CrossTenantQueryViolation = 2005,

    // Network & Communication Errors (3000-3999)
    NetworkError = 3000,
    NetworkTimeout = 3001,
    NetworkConnectionRefused = 3002,
    ExternalServiceError = 3003,
    SerializationError = 3004,

    // License & Quota Rejection Errors (4000-4999)
    ScanRejectedLicense = 4000,
    ScanRejectedQuota = 4001,
    ScanRejectedConcurrency = 4002,
    ScanRejectedUnknownType = 4003,
    ScanRejectedRegion = 4004,
    HardwareBindingMismatch = 4005,

    // Input Validation Errors (5000-5999)
    ValidationFailed = 5000,
    InvalidInput = 5001,
    MissingRequiredField = 5002,
    InvalidFormat = 5003,
    ValueOutOfRange = 5004,
    DuplicateValue = 5005,

    // Resource Management Errors (6000-6999)
    ResourceNotFound = 6000,
    ResourceAlreadyExists = 6001,
    ResourceLocked = 6002,
    ResourceInUse = 6003,
    ResourceQuotaExceeded = 6004,
    NotFound = 6005,
    NotImplemented = 6006,

    // Rate Limiting & Throttling Errors (7000-7999)
    RateLimitExceeded = 7000,
    TooManyRequests = 7001,
    ConcurrencyLimitExceeded = 7002,

    // Cache & Storage Errors (8000-8999)
    CacheError = 8000,
    CacheMiss = 8001,
    StorageError = 8002,
    EncryptionError = 8003,
    DecryptionError = 8004,

    // Scan & Job Errors (9000-9999)
    JobQueueError = 9000,
    ScanExecutionFailed = 9001,
    ScanTimedOut = 9002,
    JobDeserializationError = 9003,
    ScanCancelled = 9004,
    RegistryReloadRejected = 9005,
}

impl ErrorCode {
    /// Get HTTP status code for this error
    pub fn http_status(&self) -> u16 {
        match self {
            // 500 - Internal Server Error
            ErrorCode::InternalServerError
            | ErrorCode::ConfigurationError
            | ErrorCode::DatabaseConnectionError
            | ErrorCode::DatabaseTransactionError
            | ErrorCode::DatabaseQueryError
            | ErrorCode::DatabaseMigrationError
            | ErrorCode::NetworkError
            | ErrorCode::ExternalServiceError
            | ErrorCode::SerializationError
            | ErrorCode::CacheError
            | ErrorCode::StorageError
            | ErrorCode::EncryptionError
            | ErrorCode::DecryptionError
            | ErrorCode::JobQueueError
            | ErrorCode::ScanExecutionFailed
            | ErrorCode::CrossTenantQueryViolation
            | ErrorCode::RegistryReloadRejected => 500,

            // 503 - Service Unavailable
            ErrorCode::ServiceUnavailable | ErrorCode::NetworkConnectionRefused => 503,

            // 408 - Request Timeout
            ErrorCode::Timeout | ErrorCode::NetworkTimeout | ErrorCode::ScanTimedOut => 408,

            // 401 - license not valid for this tenant at all
            ErrorCode::ScanRejectedLicense => 401,

            // 403 - Forbidden (allowed to authenticate, not allowed to do this)
            ErrorCode::ScanRejectedRegion | ErrorCode::HardwareBindingMismatch => 403,

            // 400 - Bad Request
            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingRequiredField
            | ErrorCode::InvalidFormat
            | ErrorCode::ValueOutOfRange
            | ErrorCode::ScanRejectedUnknownType
            | ErrorCode::JobDeserializationError => 400,

            // 404 - Not Found
            ErrorCode::ResourceNotFound | ErrorCode::CacheMiss => 404,

            // 409 - Conflict
            ErrorCode::ResourceAlreadyExists
            | ErrorCode::DuplicateValue
            | ErrorCode::DatabaseConstraintViolation => 409,

            // 423 - Locked
            ErrorCode::ResourceLocked => 423,

            // 429 - Too Many Requests
            ErrorCode::RateLimitExceeded
            | ErrorCode::TooManyRequests
            | ErrorCode::ConcurrencyLimitExceeded
            | ErrorCode::ScanRejectedConcurrency => 429,

            // 507 - Insufficient Storage
            ErrorCode::ResourceExhausted
            | ErrorCode::ResourceQuotaExceeded
            | ErrorCode::ScanRejectedQuota => 507,

            // 422 - Unprocessable Entity
            ErrorCode::ResourceInUse | ErrorCode::ScanCancelled => 422,

            // 404 - Not Found
            ErrorCode::NotFound => 404,

            // 501 - Not Implemented
            ErrorCode::NotImplemented => 501,
        }
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::InternalServerError
            | ErrorCode::ConfigurationError
            | ErrorCode::ServiceUnavailable
            | ErrorCode::Timeout
            | ErrorCode::ResourceExhausted => "system",

            ErrorCode::DatabaseConnectionError
            | ErrorCode::DatabaseConstraintViolation
            | ErrorCode::DatabaseTransactionError
            | ErrorCode::DatabaseQueryError
            | ErrorCode::DatabaseMigrationError
            | ErrorCode::CrossTenantQueryViolation => "database",

            ErrorCode::NetworkError
            | ErrorCode::NetworkTimeout
            | ErrorCode::NetworkConnectionRefused
            | ErrorCode::ExternalServiceError
            | ErrorCode::SerializationError => "network",

            ErrorCode::ScanRejectedLicense
            | ErrorCode::ScanRejectedQuota
            | ErrorCode::ScanRejectedConcurrency
            | ErrorCode::ScanRejectedUnknownType
            | ErrorCode::ScanRejectedRegion
            | ErrorCode::HardwareBindingMismatch => "license",

            ErrorCode::ValidationFailed
            | ErrorCode::InvalidInput
            | ErrorCode::MissingRequiredField
            | ErrorCode::InvalidFormat
            | ErrorCode::ValueOutOfRange
            | ErrorCode::DuplicateValue => "validation",

            ErrorCode::ResourceNotFound
            | ErrorCode::ResourceAlreadyExists
            | ErrorCode::ResourceLocked
            | ErrorCode::ResourceInUse
            | ErrorCode::ResourceQuotaExceeded => "resource",

            ErrorCode::RateLimitExceeded
            | ErrorCode::TooManyRequests
            | ErrorCode::ConcurrencyLimitExceeded => "rate_limit",

            ErrorCode::CacheError
            | ErrorCode::CacheMiss
            | ErrorCode::StorageError
            | ErrorCode::EncryptionError
            | ErrorCode::DecryptionError => "storage",

            ErrorCode::JobQueueError
            | ErrorCode::ScanExecutionFailed
            | ErrorCode::ScanTimedOut
            | ErrorCode::JobDeserializationError
            | ErrorCode::ScanCancelled
            | ErrorCode::RegistryReloadRejected => "scan",

            ErrorCode::NotFound => "resource",
            ErrorCode::NotImplemented => "system",
        }
    }

    /// Check if error should be retried. Rule/detection failures are
    /// deterministic and must never end up here.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::NetworkTimeout
                | ErrorCode::NetworkConnectionRefused
                | ErrorCode::ServiceUnavailable
                | ErrorCode::DatabaseConnectionError
                | ErrorCode::CacheError
                | ErrorCode::ScanTimedOut
                | ErrorCode::ResourceExhausted
        )
    }

    /// Check if error should be logged at error level
    pub fn should_log_as_error(&self) -> bool {
        !matches!(
            self,
            ErrorCode::ValidationFailed
                | ErrorCode::InvalidInput
                | ErrorCode::MissingRequiredField
                | ErrorCode::InvalidFormat
                | ErrorCode::ValueOutOfRange
                | ErrorCode::ResourceNotFound
                | ErrorCode::ScanRejectedLicense
                | ErrorCode::ScanRejectedQuota
                | ErrorCode::ScanRejectedConcurrency
                | ErrorCode::ScanRejectedUnknownType
                | ErrorCode::RateLimitExceeded
                | ErrorCode::TooManyRequests
                | ErrorCode::ScanCancelled
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_codes_are_not_retryable() {
        assert!(!ErrorCode::ScanRejectedLicense.is_retryable());
        assert!(!ErrorCode::ScanRejectedQuota.is_retryable());
        assert!(!ErrorCode::ScanRejectedConcurrency.is_retryable());
        assert!(!ErrorCode::ScanRejectedUnknownType.is_retryable());
    }

    #[test]
    fn timeout_is_retryable_but_cancellation_is_not() {
        assert!(ErrorCode::ScanTimedOut.is_retryable());
        assert!(!ErrorCode::ScanCancelled.is_retryable());
    }

    #[test]
    fn every_code_has_an_http_status() {
        let codes = [
            ErrorCode::InternalServerError,
            ErrorCode::ScanRejectedLicense,
            ErrorCode::ScanRejectedQuota,
            ErrorCode::ScanRejectedConcurrency,
            ErrorCode::ScanRejectedUnknownType,
            ErrorCode::ScanExecutionFailed,
            ErrorCode::ScanTimedOut,
        ];
        for code in codes {
            assert!(code.http_status() >= 400 || code.http_status() >= 500);
        }
    }
}
