//! Flow 状态转换规则和验证

use thiserror::Error;

use crate::executor::types::FlowStatus;

/// 状态转换错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("invalid flow transition from {from} to {to}")]
    InvalidTransition { from: FlowStatus, to: FlowStatus },
    #[error("flow is already terminal ({state})")]
    FromTerminalState { state: FlowStatus },
}

/// 状态转换
pub struct FlowTransition;

impl FlowTransition {
    /// 验证状态转换是否合法
    pub fn validate(from: FlowStatus, to: FlowStatus) -> Result<(), TransitionError> {
        // 终态不能转换
        if from.is_terminal() {
            return Err(TransitionError::FromTerminalState { state: from });
        }

        let is_valid = matches!(
            (from, to),
            (FlowStatus::Idle, FlowStatus::Planning)
                // Idle 也可以直接取消
                | (FlowStatus::Idle, FlowStatus::Cancelled)
                | (FlowStatus::Planning, FlowStatus::Running)
                | (FlowStatus::Planning, FlowStatus::Failed)
                | (FlowStatus::Planning, FlowStatus::Cancelled)
                | (FlowStatus::Running, FlowStatus::Paused)
                | (FlowStatus::Running, FlowStatus::Completed)
                | (FlowStatus::Running, FlowStatus::Failed)
                | (FlowStatus::Running, FlowStatus::Cancelled)
                | (FlowStatus::Paused, FlowStatus::Running)
                | (FlowStatus::Paused, FlowStatus::Cancelled)
                // 暂停排空期间的致命错误（如非法的后续任务）
                | (FlowStatus::Paused, FlowStatus::Failed)
        );

        if is_valid {
            Ok(())
        } else {
            Err(TransitionError::InvalidTransition { from, to })
        }
    }

    /// 判断是否为终态
    pub fn is_terminal(status: FlowStatus) -> bool {
        status.is_terminal()
    }

    /// 获取状态的可读描述
    pub fn description(status: FlowStatus) -> &'static str {
        match status {
            FlowStatus::Idle => "waiting to start",
            FlowStatus::Planning => "generating plan",
            FlowStatus::Running => "executing tasks",
            FlowStatus::Paused => "paused",
            FlowStatus::Completed => "completed",
            FlowStatus::Failed => "failed",
            FlowStatus::Cancelled => "cancelled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        assert!(FlowTransition::validate(FlowStatus::Idle, FlowStatus::Planning).is_ok());
        assert!(FlowTransition::validate(FlowStatus::Planning, FlowStatus::Running).is_ok());
        assert!(FlowTransition::validate(FlowStatus::Running, FlowStatus::Paused).is_ok());
        assert!(FlowTransition::validate(FlowStatus::Paused, FlowStatus::Running).is_ok());
        assert!(FlowTransition::validate(FlowStatus::Planning, FlowStatus::Cancelled).is_ok());
    }

    #[test]
    fn test_invalid_transitions() {
        assert_eq!(
            FlowTransition::validate(FlowStatus::Paused, FlowStatus::Paused),
            Err(TransitionError::InvalidTransition {
                from: FlowStatus::Paused,
                to: FlowStatus::Paused
            })
        );
        assert!(FlowTransition::validate(FlowStatus::Idle, FlowStatus::Running).is_err());
        assert!(FlowTransition::validate(FlowStatus::Paused, FlowStatus::Completed).is_err());
    }

    #[test]
    fn test_terminal_states_are_final() {
        for terminal in [FlowStatus::Completed, FlowStatus::Failed, FlowStatus::Cancelled] {
            assert!(FlowTransition::is_terminal(terminal));
            assert_eq!(
                FlowTransition::validate(terminal, FlowStatus::Running),
                Err(TransitionError::FromTerminalState { state: terminal })
            );
        }
    }
}
