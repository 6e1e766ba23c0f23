use async_trait::async_trait;
use serde_json::json;

use flowpilot_core::api::{CancellationToken, Outcome, Task, TaskBackend};

/// Completes every task with its own title and description. Used for dry runs.
#[derive(Debug, Clone)]
pub struct EchoBackend {
    name: String,
}

impl EchoBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl TaskBackend for EchoBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, task: &Task, cancel: CancellationToken) -> anyhow::Result<Outcome> {
        if cancel.is_cancelled() {
            return Ok(Outcome::cancelled("cancelled before start"));
        }
        Ok(Outcome::completed(Some(json!({
            "echo": true,
            "title": task.title,
            "description": task.description,
            "task_type": task.task_type,
        }))))
    }
}
