//! Shared primitives for all Rust crates in Relata.

#![forbid(unsafe_code)]

/// Request principal primitives shared across services.
pub mod auth;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use auth::RequestUser;

/// Result type used across Relata crates.
pub type AppResult<T> = Result<T, AppError>;

/// Tenant identifier used as the partition key for every persisted resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Creates a random tenant identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a tenant identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for TenantId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Replicating a legacy change into the relationship model failed.
    ///
    /// Callers must roll back the paired legacy write when they see this.
    #[error("dual write failed: {0}")]
    DualWrite(#[source] Box<AppError>),
}

impl AppError {
    /// Wraps a failure raised while replicating into the relationship model.
    #[must_use]
    pub fn dual_write(cause: AppError) -> Self {
        match cause {
            Self::DualWrite(_) => cause,
            other => Self::DualWrite(Box::new(other)),
        }
    }

    /// Returns whether the error signals a failed dual write.
    #[must_use]
    pub fn is_dual_write(&self) -> bool {
        matches!(self, Self::DualWrite(_))
    }
}
