use async_trait::async_trait;
use serde_json::{json, Value};

use flowpilot_core::api::{
    CancellationToken, Outcome, OutcomeStatus, Task, TaskBackend, TaskError, TaskErrorKind,
};

use crate::http_client::{HttpErrorKind, JsonClient};

/// Sends each task to a remote executor as JSON.
///
/// The reply may be `{"status": "completed"|"failed"|"cancelled", "result": ..., "error": "..."}`;
/// any other JSON value is taken as the result of a completed task.
pub struct HttpBackend {
    name: String,
    client: JsonClient,
}

impl HttpBackend {
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        api_key: impl Into<String>,
        timeout_ms: u64,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            name: name.into(),
            client: JsonClient::new(url, api_key, timeout_ms)?,
        })
    }
}

#[async_trait]
impl TaskBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, task: &Task, cancel: CancellationToken) -> anyhow::Result<Outcome> {
        let payload = json!({
            "flow_id": task.flow_id,
            "task_id": task.id,
            "title": task.title,
            "description": task.description,
            "task_type": task.task_type,
            "dependencies": task.dependencies,
        });
        tracing::debug!(
            target: "flowpilot.backend.http",
            task_id = %task.id,
            url = %self.client.url(),
            "posting task"
        );

        let reply = tokio::select! {
            _ = cancel.cancelled() => return Ok(Outcome::cancelled("request abandoned")),
            reply = self.client.post(&payload) => reply,
        };

        match reply {
            Ok(value) => Ok(outcome_from_reply(value)),
            Err(e) if e.is_unreachable() => Ok(Outcome::from_error(
                OutcomeStatus::Failed,
                TaskError::new(TaskErrorKind::BackendUnavailable, "executor unreachable")
                    .with_cause(e.to_string()),
            )),
            Err(e) if e.kind() == HttpErrorKind::Status => Ok(Outcome::from_error(
                OutcomeStatus::Failed,
                TaskError::new(TaskErrorKind::Executor, "executor rejected the task")
                    .with_cause(e.to_string()),
            )),
            Err(e) => Err(e.into()),
        }
    }
}

fn outcome_from_reply(value: Value) -> Outcome {
    let status = value.get("status").and_then(Value::as_str);
    let result = value.get("result").cloned();
    let message = value
        .get("error")
        .and_then(Value::as_str)
        .unwrap_or("remote task failed")
        .to_string();

    match status {
        Some("completed") => Outcome::completed(result),
        Some("failed") => {
            let outcome = Outcome::failed(TaskErrorKind::Executor, message);
            match result {
                Some(result) => outcome.with_result(result),
                None => outcome,
            }
        }
        Some("cancelled") => Outcome::cancelled(message),
        _ => Outcome::completed(Some(value)),
    }
}
