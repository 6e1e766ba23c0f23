use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::outcome::TaskError;
use super::plan::TaskSpec;

pub type TaskId = String;

/// Task lifecycle status. `Completed`, `Failed`, `Cancelled` and `Skipped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Skipped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common task interface for graph handling.
pub trait TaskLike: Clone + Send + Sync {
    fn id(&self) -> &str;
    fn dependencies(&self) -> &[String];
    fn status(&self) -> TaskStatus;
}

/// One atomic unit of work inside a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub flow_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub task_type: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub dependencies: Vec<TaskId>,
    /// Task whose completion produced this one, for follow-ups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<TaskError>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub attempts: u32,
}

impl Task {
    /// Materialize a planned or follow-up task. Missing ids are generated and
    /// duplicate dependency ids are collapsed, keeping first occurrence order.
    pub fn from_spec(flow_id: &str, spec: TaskSpec, parent_id: Option<&str>) -> Self {
        let id = spec
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("task-{}", uuid::Uuid::new_v4().simple()));

        let mut dependencies: Vec<TaskId> = Vec::with_capacity(spec.dependencies.len());
        for dep in spec.dependencies {
            if !dependencies.contains(&dep) {
                dependencies.push(dep);
            }
        }

        Self {
            id,
            flow_id: flow_id.to_string(),
            title: spec.title,
            description: spec.description,
            task_type: spec.task_type,
            status: TaskStatus::Pending,
            dependencies,
            parent_id: parent_id.map(str::to_string),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
            attempts: 0,
        }
    }

    /// Pending -> InProgress. Returns false (and changes nothing) from any other status.
    pub fn mark_in_progress(&mut self) -> bool {
        if self.status != TaskStatus::Pending {
            return false;
        }
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
        true
    }

    /// Move to a terminal status. Terminal statuses are sticky: returns false if the
    /// task already resolved or if `status` is not terminal.
    pub fn resolve(
        &mut self,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<TaskError>,
    ) -> bool {
        if self.status.is_terminal() || !status.is_terminal() {
            return false;
        }
        self.status = status;
        self.result = result;
        self.error = error;
        self.completed_at = Some(Utc::now());
        true
    }

    /// Undo an interrupted dispatch (used when restoring a checkpoint).
    pub(crate) fn reset_interrupted(&mut self) {
        if self.status == TaskStatus::InProgress {
            self.status = TaskStatus::Pending;
            self.started_at = None;
        }
    }
}

impl TaskLike for Task {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    fn status(&self) -> TaskStatus {
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::types::TaskErrorKind;

    fn spec(id: &str, deps: &[&str]) -> TaskSpec {
        TaskSpec {
            id: Some(id.to_string()),
            title: id.to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            ..TaskSpec::default()
        }
    }

    #[test]
    fn test_from_spec_generates_missing_id_and_dedupes_deps() {
        let mut s = spec("", &["a", "b", "a"]);
        s.id = None;
        let task = Task::from_spec("flow-1", s, None);

        assert!(task.id.starts_with("task-"));
        assert_eq!(task.dependencies, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.flow_id, "flow-1");
    }

    #[test]
    fn test_terminal_status_is_sticky() {
        let mut task = Task::from_spec("f", spec("t1", &[]), None);
        assert!(task.mark_in_progress());
        assert!(!task.mark_in_progress());

        assert!(task.resolve(TaskStatus::Completed, Some(serde_json::json!("ok")), None));
        assert!(!task.resolve(
            TaskStatus::Failed,
            None,
            Some(TaskError::new(TaskErrorKind::Executor, "late"))
        ));
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result, Some(serde_json::json!("ok")));
    }

    #[test]
    fn test_resolve_rejects_non_terminal_target() {
        let mut task = Task::from_spec("f", spec("t1", &[]), None);
        assert!(!task.resolve(TaskStatus::InProgress, None, None));
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[test]
    fn test_reset_interrupted() {
        let mut task = Task::from_spec("f", spec("t1", &[]), None);
        task.mark_in_progress();
        task.reset_interrupted();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.started_at.is_none());
    }
}
