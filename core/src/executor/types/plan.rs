use serde::{Deserialize, Serialize};

use crate::error::PlanError;

use super::task::Task;

/// A task as described by a planner or a follow-up hook, before it joins a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_task_type")]
    pub task_type: String,
    #[serde(default, alias = "depends_on")]
    pub dependencies: Vec<String>,
}

fn default_task_type() -> String {
    "default".to_string()
}

impl TaskSpec {
    pub fn new(title: impl Into<String>, task_type: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            description: String::new(),
            task_type: task_type.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn depends_on<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(deps.into_iter().map(Into::into));
        self
    }
}

/// Planner output: the initial task list for a flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub tasks: Vec<TaskSpec>,
}

impl Plan {
    pub fn new(tasks: Vec<TaskSpec>) -> Self {
        Self { tasks }
    }

    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        serde_json::from_str(json).map_err(|e| PlanError::InvalidPlan(e.to_string()))
    }

    pub fn from_toml(text: &str) -> Result<Self, PlanError> {
        toml::from_str(text).map_err(|e| PlanError::InvalidPlan(e.to_string()))
    }

    /// The opaque plan blob kept on the flow.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn into_tasks(self, flow_id: &str) -> Vec<Task> {
        self.tasks
            .into_iter()
            .map(|spec| Task::from_spec(flow_id, spec, None))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_from_json_accepts_optional_fields() {
        let plan = Plan::from_json(
            r#"{"tasks":[
                {"id":"T1","title":"scaffold"},
                {"title":"wire up","task_type":"code","depends_on":["T1"]}
            ]}"#,
        )
        .unwrap();

        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[0].task_type, "default");
        assert_eq!(plan.tasks[1].id, None);
        assert_eq!(plan.tasks[1].dependencies, vec!["T1".to_string()]);
    }

    #[test]
    fn test_plan_from_toml() {
        let plan = Plan::from_toml(
            r#"
[[tasks]]
id = "a"
title = "first"

[[tasks]]
id = "b"
title = "second"
dependencies = ["a"]
"#,
        )
        .unwrap();
        assert_eq!(plan.tasks[1].dependencies, vec!["a".to_string()]);
    }

    #[test]
    fn test_invalid_plan_is_typed() {
        let err = Plan::from_json("{not json").unwrap_err();
        assert!(matches!(err, PlanError::InvalidPlan(_)));
    }
}
