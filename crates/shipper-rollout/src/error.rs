//! Rollout error types.

use std::fmt;

use serde::Serialize;
use shipper_core::{ApiError, Operation};
use thiserror::Error;

use crate::cancel::CancelCause;

/// Where a rollout was when it got cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    /// Waiting on the serialization lock.
    LockWait,
    /// Inside a remote call.
    Call(Operation),
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LockWait => f.write_str("lock wait"),
            Self::Call(op) => op.fmt(f),
        }
    }
}

/// Errors that end a rollout.
#[derive(Debug, Clone, Error)]
pub enum DeployError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no active task definition found for family {family}")]
    DefinitionNotFound { family: String },

    #[error(
        "task definition {family}: {matched} of {requested} containers matched (missing: {})",
        .missing.join(", ")
    )]
    ContainerMismatch {
        family: String,
        requested: usize,
        matched: usize,
        missing: Vec<String>,
    },

    #[error("service {service} not found in cluster {cluster}")]
    ServiceNotFound { cluster: String, service: String },

    #[error("{operation} failed for {target}: {source}")]
    Api {
        operation: Operation,
        target: String,
        source: ApiError,
    },

    #[error("cancelled during {stage}: {cause}")]
    Cancelled { stage: Stage, cause: CancelCause },
}

/// Coarse error category, stable for collaborators to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    DefinitionNotFound,
    ContainerMismatch,
    ServiceNotFound,
    Api,
    Cancelled,
}

impl ErrorKind {
    /// Machine-readable code used in status payloads.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_request",
            Self::DefinitionNotFound => "task_definition_not_found",
            Self::ContainerMismatch => "container_mismatch",
            Self::ServiceNotFound => "service_not_found",
            Self::Api => "orchestrator_error",
            Self::Cancelled => "cancelled",
        }
    }
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::DefinitionNotFound { .. } => ErrorKind::DefinitionNotFound,
            Self::ContainerMismatch { .. } => ErrorKind::ContainerMismatch,
            Self::ServiceNotFound { .. } => ErrorKind::ServiceNotFound,
            Self::Api { .. } => ErrorKind::Api,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
        }
    }
}
