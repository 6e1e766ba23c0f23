use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::executor::traits::TaskBackend;
use crate::executor::types::{Outcome, Task, TaskErrorKind};

/// Stands in for an integration that is not configured. Every task fails with
/// `BackendUnavailable`.
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    name: String,
    reason: String,
}

impl UnavailableBackend {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TaskBackend for UnavailableBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, task: &Task, _cancel: CancellationToken) -> anyhow::Result<Outcome> {
        Ok(Outcome::failed(
            TaskErrorKind::BackendUnavailable,
            format!(
                "backend '{}' unavailable for task type '{}': {}",
                self.name, task.task_type, self.reason
            ),
        ))
    }
}

/// Completes every task with a placeholder result and does no work.
#[derive(Debug, Clone)]
pub struct PlaceholderBackend {
    name: String,
}

impl PlaceholderBackend {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl TaskBackend for PlaceholderBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, task: &Task, _cancel: CancellationToken) -> anyhow::Result<Outcome> {
        Ok(Outcome::completed(Some(json!({
            "placeholder": true,
            "backend": self.name,
            "task_id": task.id,
        }))))
    }
}
