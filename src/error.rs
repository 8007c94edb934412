//! Error handling.
//!
//! A closed taxonomy pattern-matched at the service boundary: not-found maps
//! to 404, invalid-argument to 400, permission-denied to 403. Collaborator
//! failures are wrapped with context and propagated unchanged.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BaselineError>;

#[derive(Debug, Error)]
pub enum BaselineError {
    /// A baseline record was required but does not exist.
    #[error("baseline not found: {0}")]
    NotFound(String),

    /// Malformed request: unsupported entity type, dangling deployment peer
    /// reference, empty id.
    #[error("invalid request: {0}")]
    InvalidArgument(String),

    /// The caller's access scope does not cover the target deployment.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Failure surfaced by a collaborator (store, lookups, notifier).
    #[error("collaborator failure: {0:#}")]
    Collaborator(#[from] anyhow::Error),

    /// Programmer error; should never surface during normal operation.
    #[error("internal error: {0}")]
    Internal(String),
}
