//! Error types for the engine and its service contracts

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

/// Error returned by a service contract.
///
/// Callers branch on the variant rather than the message: dry-run probes
/// absorb `NotFound`, while apply and rollback propagate everything.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unprocessable entity: {0}")]
    Unprocessable(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0}s")]
    Timeout(u64),
}

impl ServiceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether a dry-run probe may treat this error as "resource absent".
    pub fn is_absorbable(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Conflict(_))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// One failed resource inside an apply stage.
#[derive(Debug, Clone)]
pub struct ApplyFailure {
    /// pkg-name of the failed resource, or a synthesized identifier for
    /// label mappings.
    pub pkg_name: String,
    pub message: String,
}

/// Failures from an apply run, grouped by resource type.
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub failures: BTreeMap<&'static str, Vec<ApplyFailure>>,
}

impl ApplyReport {
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn push(&mut self, resource: &'static str, failure: ApplyFailure) {
        self.failures.entry(resource).or_default().push(failure);
    }
}

impl fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (resource, failures) in &self.failures {
            if !first {
                writeln!(f)?;
            }
            first = false;
            write!(f, "resource_type={:?} err=\"failed to apply resource\"", resource)?;
            for failure in failures {
                write!(
                    f,
                    "\n\tpkg_name={:?} err_msg={:?}",
                    failure.pkg_name, failure.message
                )?;
            }
        }
        Ok(())
    }
}

/// Error surfaced from the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The package or a dependency inside it is invalid.
    #[error("unprocessable entity: {0}")]
    Unprocessable(String),

    /// One or more resources failed during an apply stage. The platform has
    /// been rolled back to its prior state by the time this is returned.
    #[error("{0}")]
    Apply(ApplyReport),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    pub(crate) fn internal(err: impl fmt::Display) -> Self {
        Self::Service(ServiceError::Internal(err.to_string()))
    }
}
