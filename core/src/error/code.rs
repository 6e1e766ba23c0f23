use crate::executor::types::TaskErrorKind;

/// Numeric error codes exposed to transports and event consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    GeneralError = 1,
    ValidationError = 3,
    FlowNotFound = 10,
    DependencyError = 11,
    CircularDependency = 12,
    UnreachableTask = 13,
    InvalidState = 14,
    BackendError = 20,
    BackendUnavailable = 21,
    PlannerUnavailable = 25,
    PlannerTimeout = 26,
    InvalidPlan = 27,
    Timeout = 30,
    Cancelled = 31,
    SnapshotError = 60,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl From<TaskErrorKind> for ErrorCode {
    fn from(kind: TaskErrorKind) -> Self {
        match kind {
            TaskErrorKind::Executor => ErrorCode::BackendError,
            TaskErrorKind::Timeout => ErrorCode::Timeout,
            TaskErrorKind::Cancelled => ErrorCode::Cancelled,
            TaskErrorKind::BackendUnavailable => ErrorCode::BackendUnavailable,
            TaskErrorKind::Skipped => ErrorCode::DependencyError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FlowError, GraphError, PlanError};

    #[test]
    fn test_codes() {
        assert_eq!(
            FlowError::Graph(GraphError::DependencyCycle("a -> a".into()))
                .error_code()
                .as_u16(),
            12
        );
        assert_eq!(
            FlowError::Plan(PlanError::PlannerTimeout(5)).error_code(),
            ErrorCode::PlannerTimeout
        );
        assert_eq!(ErrorCode::from(TaskErrorKind::Timeout).as_u16(), 30);
    }
}
