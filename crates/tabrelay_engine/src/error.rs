use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::correlator::CorrelatorError;
use crate::store::StoreError;

/// Stable failure codes carried in error reports and error records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    TransportDisconnected,
    Timeout,
    AgentReportedFailure,
    InvalidPlatform,
    ValidationError,
    ExecutionError,
    TaskTimeout,
}

impl FailureKind {
    pub fn code(&self) -> &'static str {
        match self {
            FailureKind::TransportDisconnected => "TRANSPORT_DISCONNECTED",
            FailureKind::Timeout => "TIMEOUT",
            FailureKind::AgentReportedFailure => "AGENT_REPORTED_FAILURE",
            FailureKind::InvalidPlatform => "INVALID_PLATFORM",
            FailureKind::ValidationError => "VALIDATION_ERROR",
            FailureKind::ExecutionError => "EXECUTION_ERROR",
            FailureKind::TaskTimeout => "TASK_TIMEOUT",
        }
    }

    /// Whether a failed agent call of this kind is worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureKind::Timeout | FailureKind::AgentReportedFailure)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::TransportDisconnected => write!(f, "transport disconnected"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::AgentReportedFailure => write!(f, "agent reported failure"),
            FailureKind::InvalidPlatform => write!(f, "invalid platform"),
            FailureKind::ValidationError => write!(f, "validation error"),
            FailureKind::ExecutionError => write!(f, "execution error"),
            FailureKind::TaskTimeout => write!(f, "task timeout"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct TaskError {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ValidationError, message)
    }

    pub fn execution(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ExecutionError, message)
    }
}

impl From<CorrelatorError> for TaskError {
    fn from(err: CorrelatorError) -> Self {
        let kind = match err {
            CorrelatorError::Disconnected => FailureKind::TransportDisconnected,
            CorrelatorError::UnknownId(_) | CorrelatorError::AlreadyAwaited(_) => {
                FailureKind::ExecutionError
            }
        };
        TaskError::new(kind, err.to_string())
    }
}

impl From<StoreError> for TaskError {
    fn from(err: StoreError) -> Self {
        TaskError::execution(format!("result store: {err}"))
    }
}
