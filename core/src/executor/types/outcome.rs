use std::fmt;

use serde::{Deserialize, Serialize};

use super::task::TaskStatus;

/// Why a task did not complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorKind {
    /// The backend failed or panicked.
    Executor,
    /// The per-task deadline expired.
    Timeout,
    /// The flow was stopped (or aborted by the failure policy).
    Cancelled,
    /// No usable backend for the task type.
    BackendUnavailable,
    /// Never dispatched because the flow halted or a dependency failed.
    Skipped,
}

impl TaskErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Executor => "executor",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::BackendUnavailable => "backend_unavailable",
            Self::Skipped => "skipped",
        }
    }

    /// Kinds that count as a task failure for the failure policy.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::Executor | Self::Timeout | Self::BackendUnavailable
        )
    }
}

impl fmt::Display for TaskErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error recorded on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: TaskErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl TaskError {
    pub fn new(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " ({cause})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    Failed,
    Cancelled,
}

impl From<OutcomeStatus> for TaskStatus {
    fn from(status: OutcomeStatus) -> Self {
        match status {
            OutcomeStatus::Completed => TaskStatus::Completed,
            OutcomeStatus::Failed => TaskStatus::Failed,
            OutcomeStatus::Cancelled => TaskStatus::Cancelled,
        }
    }
}

/// Normalized result of one backend execution, whatever the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub status: OutcomeStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<TaskError>,
    /// Backend attempts used, filled in by the orchestrator.
    #[serde(default)]
    pub attempts: u32,
}

impl Outcome {
    pub fn completed(result: Option<serde_json::Value>) -> Self {
        Self {
            status: OutcomeStatus::Completed,
            result,
            error: None,
            attempts: 0,
        }
    }

    pub fn failed(kind: TaskErrorKind, message: impl Into<String>) -> Self {
        Self::from_error(OutcomeStatus::Failed, TaskError::new(kind, message))
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::from_error(
            OutcomeStatus::Cancelled,
            TaskError::new(TaskErrorKind::Cancelled, message),
        )
    }

    pub fn from_error(status: OutcomeStatus, error: TaskError) -> Self {
        Self {
            status,
            result: None,
            error: Some(error),
            attempts: 0,
        }
    }

    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == OutcomeStatus::Completed
    }

    pub fn error_kind(&self) -> Option<TaskErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}
