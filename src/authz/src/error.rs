//! Error types for the authorization engine
//!
//! Authorization denials are values (`AccessDecision`), not errors. Errors
//! here are operational: malformed input, unavailable dependencies, failed
//! audit writes.

use thiserror::Error;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Malformed input rejected before any decision logic runs
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Remote permission fetch or cache store failed; callers fail closed
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Audit record could not be written
    #[error("Audit write failed: {0}")]
    AuditWriteFailure(String),

    /// Catalog or policy store rejected a mutation
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
