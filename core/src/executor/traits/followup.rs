use crate::executor::types::{Outcome, Task, TaskSpec};

/// 后续任务钩子：任务完成后可以发现新的任务
///
/// Called outside any flow lock, once per completed task. Returned specs may
/// depend on any task already in the flow or on each other.
pub trait FollowUpHook: Send + Sync {
    fn name(&self) -> &str {
        "follow-ups"
    }

    fn follow_ups(&self, task: &Task, outcome: &Outcome) -> Vec<TaskSpec>;
}

/// Hook that never discovers anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFollowUps;

impl FollowUpHook for NoFollowUps {
    fn name(&self) -> &str {
        "none"
    }

    fn follow_ups(&self, _task: &Task, _outcome: &Outcome) -> Vec<TaskSpec> {
        Vec::new()
    }
}
