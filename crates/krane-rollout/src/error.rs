//! Reconcile error types and their retry classes.

use krane_state::StateError;
use thiserror::Error;

pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// How the dispatcher treats an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retried on the next invocation; never recorded on the release.
    Transient,
    /// A referenced object is missing or malformed. The release stays in
    /// its phase until an operator fixes the reference.
    Configuration,
    /// Anything else (storage corruption, encoding bugs).
    Internal,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("store error: {0}")]
    State(#[from] StateError),

    #[error("policy {0} not found")]
    MissingPolicy(String),

    #[error("routing rule {0} not found")]
    MissingRoutingRule(String),

    #[error("routing rule {rule}: {reason}")]
    MalformedRoute { rule: String, reason: String },

    #[error("routing rule {rule}: ambiguous weights for {service}: {reason}")]
    AmbiguousWeights {
        rule: String,
        service: String,
        reason: String,
    },

    #[error("encoding task environment: {0}")]
    Encode(String),
}

impl ReconcileError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ReconcileError::State(e) => match e {
                StateError::Conflict { .. }
                | StateError::AlreadyExists { .. }
                | StateError::NotFound { .. }
                | StateError::Transaction(_) => ErrorClass::Transient,
                _ => ErrorClass::Internal,
            },
            ReconcileError::MissingPolicy(_)
            | ReconcileError::MissingRoutingRule(_)
            | ReconcileError::MalformedRoute { .. }
            | ReconcileError::AmbiguousWeights { .. } => ErrorClass::Configuration,
            ReconcileError::Encode(_) => ErrorClass::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}
