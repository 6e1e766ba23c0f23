use thiserror::Error;

use super::code::ErrorCode;
use super::graph::GraphError;
use crate::executor::types::FlowStatus;

/// Failures of the external plan generator. Always fatal to the flow, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("planner unavailable: {0}")]
    PlannerUnavailable(String),

    #[error("planner timed out after {0}ms")]
    PlannerTimeout(u64),

    #[error("invalid plan: {0}")]
    InvalidPlan(String),
}

impl PlanError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::PlannerUnavailable(_) => ErrorCode::PlannerUnavailable,
            Self::PlannerTimeout(_) => ErrorCode::PlannerTimeout,
            Self::InvalidPlan(_) => ErrorCode::InvalidPlan,
        }
    }
}

/// Errors surfaced at the flow service boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("flow not found: {0}")]
    NotFound(String),

    #[error("operation '{op}' is not valid for flow {flow_id} in status {status}")]
    InvalidState {
        flow_id: String,
        status: FlowStatus,
        op: &'static str,
    },

    #[error("plan generation failed: {0}")]
    Plan(#[from] PlanError),

    #[error("invalid task graph: {0}")]
    Graph(#[from] GraphError),

    #[error("unreachable tasks: {}", .0.join(", "))]
    UnreachableTask(Vec<String>),

    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl FlowError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::FlowNotFound,
            Self::InvalidState { .. } => ErrorCode::InvalidState,
            Self::Plan(e) => e.error_code(),
            Self::Graph(e) => e.error_code(),
            Self::UnreachableTask(_) => ErrorCode::UnreachableTask,
            Self::Snapshot(_) => ErrorCode::SnapshotError,
        }
    }
}
