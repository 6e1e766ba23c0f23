use thiserror::Error;

use super::code::ErrorCode;

/// Errors raised while building, validating or growing a task graph.
///
/// All of these are fatal for the owning flow: they are detected before any
/// affected task is dispatched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),

    #[error("unknown dependency: task '{task_id}' depends on '{missing_dep}'")]
    UnknownDependency {
        task_id: String,
        missing_dep: String,
    },

    #[error("dependency cycle detected: {0}")]
    DependencyCycle(String),
}

impl GraphError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::DuplicateTaskId(_) => ErrorCode::ValidationError,
            Self::UnknownDependency { .. } => ErrorCode::DependencyError,
            Self::DependencyCycle(_) => ErrorCode::CircularDependency,
        }
    }
}
