//! Policy target error types.

use thiserror::Error;

/// Errors that can occur while applying a policy to a target.
#[derive(Debug, Error)]
pub enum TargetError {
    /// IO error (e.g., writing the PAC file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The target rejected the policy.
    #[error("policy rejected: {0}")]
    Rejected(String),
}

/// Result type for policy target operations.
pub type Result<T> = std::result::Result<T, TargetError>;
