use thiserror::Error;

use crate::domain::employee::UserId;
use crate::domain::request::{RequestId, RequestStatus, Stage};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("request window ends before it starts")]
    InvalidWindow,
    #[error("requested quantity must be greater than zero")]
    NonPositiveQuantity,
    #[error("unknown request type `{code}`")]
    UnknownRequestType { code: String },
    #[error("employee `{employee_id}` is not in the directory")]
    UnknownEmployee { employee_id: UserId },
    #[error("shift change requests need a target shift")]
    MissingShiftTarget,
    #[error("custom field `{key}` is required")]
    MissingCustomField { key: String },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("no approver is configured for stage {stage} of employee `{employee_id}`")]
    Configuration { stage: Stage, employee_id: UserId },
    #[error("request `{request_id}` cannot transition: {reason}")]
    Conflict { request_id: RequestId, reason: String },
    #[error("actor `{actor}` may not act on stage {stage}")]
    Authorization { actor: UserId, stage: Stage },
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationFailure),
    #[error("request `{0}` not found")]
    NotFound(RequestId),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
}

impl WorkflowError {
    pub fn conflict(request_id: &RequestId, reason: impl Into<String>) -> Self {
        Self::Conflict { request_id: request_id.clone(), reason: reason.into() }
    }

    pub fn not_pending(request_id: &RequestId, status: RequestStatus) -> Self {
        Self::conflict(request_id, format!("request is already {}", status.as_str()))
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Conflict { .. } => "conflict",
            Self::Authorization { .. } => "authorization",
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Persistence(_) => "persistence",
            Self::Integration(_) => "integration",
        }
    }

    /// Conflicts and infrastructure faults may succeed after a reload; the
    /// rest never will.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Persistence(_) | Self::Integration(_))
    }
}
