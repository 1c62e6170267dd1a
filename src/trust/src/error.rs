//! Error types for the trust subsystem

use thiserror::Error;

/// Trust subsystem errors
#[derive(Debug, Error)]
pub enum TrustError {
    /// Signal value is not a finite number
    #[error("Invalid signal value: {0}")]
    InvalidSignal(String),

    /// Device is already registered for this user
    #[error("Device already registered: user={user_id}, device={device_id}")]
    DuplicateDevice { user_id: String, device_id: String },

    /// No record exists for the given user/device pair
    #[error("Unknown device: user={user_id}, device={device_id}")]
    UnknownDevice { user_id: String, device_id: String },
}

/// Result type for trust operations
pub type Result<T> = std::result::Result<T, TrustError>;
