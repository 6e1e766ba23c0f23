use async_trait::async_trait;
use serde_json::{json, Value};

use flowpilot_core::api::{Plan, PlanError, PlanGenerator, TaskSpec};

use crate::http_client::{HttpErrorKind, JsonClient};

/// Asks a remote planner service for the plan.
///
/// Request: `{"requirements": "..."}`. Reply: `{"tasks": [...]}` or a bare task array.
pub struct HttpPlanner {
    client: JsonClient,
    timeout_ms: u64,
}

impl HttpPlanner {
    pub fn new(
        url: impl Into<String>,
        api_key: impl Into<String>,
        timeout_ms: u64,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            client: JsonClient::new(url, api_key, timeout_ms)?,
            timeout_ms,
        })
    }
}

#[async_trait]
impl PlanGenerator for HttpPlanner {
    fn name(&self) -> &str {
        "http"
    }

    async fn generate_plan(&self, requirements: &str) -> Result<Plan, PlanError> {
        tracing::debug!(
            target: "flowpilot.planner",
            url = %self.client.url(),
            requirements_len = requirements.len(),
            "requesting plan"
        );
        let reply = self
            .client
            .post(&json!({ "requirements": requirements }))
            .await
            .map_err(|e| match e.kind() {
                HttpErrorKind::Timeout => PlanError::PlannerTimeout(self.timeout_ms),
                HttpErrorKind::Decode => PlanError::InvalidPlan(e.to_string()),
                _ => PlanError::PlannerUnavailable(e.to_string()),
            })?;

        plan_from_reply(reply)
    }
}

fn plan_from_reply(reply: Value) -> Result<Plan, PlanError> {
    let invalid = |e: serde_json::Error| PlanError::InvalidPlan(e.to_string());
    match reply {
        Value::Array(_) => serde_json::from_value::<Vec<TaskSpec>>(reply)
            .map(Plan::new)
            .map_err(invalid),
        Value::Object(_) => serde_json::from_value::<Plan>(reply).map_err(invalid),
        other => Err(PlanError::InvalidPlan(format!(
            "expected a task list, got {other}"
        ))),
    }
}
