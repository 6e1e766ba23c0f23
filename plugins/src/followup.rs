use flowpilot_core::api::{FollowUpHook, Outcome, Task, TaskSpec};

/// Reads follow-up tasks from `result.follow_ups` of a completed task.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultFollowUps;

impl FollowUpHook for ResultFollowUps {
    fn name(&self) -> &str {
        "result"
    }

    fn follow_ups(&self, task: &Task, outcome: &Outcome) -> Vec<TaskSpec> {
        let Some(raw) = outcome
            .result
            .as_ref()
            .and_then(|r| r.get("follow_ups"))
        else {
            return Vec::new();
        };

        match serde_json::from_value::<Vec<TaskSpec>>(raw.clone()) {
            Ok(specs) => specs,
            Err(e) => {
                tracing::warn!(
                    target: "flowpilot.followups",
                    task_id = %task.id,
                    error.kind = "follow_ups.decode",
                    error.message = %e
                );
                Vec::new()
            }
        }
    }
}
