use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::TaskId;

pub type FlowId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStatus {
    Idle,
    Planning,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl FlowStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Planning => "planning",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FlowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution of a plan for one project requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    pub id: FlowId,
    pub project_id: String,
    pub name: String,
    pub status: FlowStatus,
    /// Discovery order; append-only.
    #[serde(default)]
    pub task_ids: Vec<TaskId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error: Option<String>,
    pub requirements: String,
    #[serde(default)]
    pub plan: Option<serde_json::Value>,
}

const FLOW_NAME_MAX_CHARS: usize = 60;

impl Flow {
    pub fn new(project_id: impl Into<String>, requirements: impl Into<String>) -> Self {
        let requirements = requirements.into();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            name: flow_name(&requirements),
            status: FlowStatus::Idle,
            task_ids: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            requirements,
            plan: None,
        }
    }
}

/// First non-empty line of the requirement, truncated on a char boundary.
fn flow_name(requirements: &str) -> String {
    let line = requirements
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("untitled flow");
    if line.chars().count() <= FLOW_NAME_MAX_CHARS {
        return line.to_string();
    }
    let mut name: String = line.chars().take(FLOW_NAME_MAX_CHARS).collect();
    name.push('…');
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_flow_is_idle() {
        let flow = Flow::new("proj", "Build X\nwith details");
        assert_eq!(flow.status, FlowStatus::Idle);
        assert_eq!(flow.name, "Build X");
        assert!(flow.task_ids.is_empty());
    }

    #[test]
    fn test_flow_name_truncates_long_lines() {
        let long = "x".repeat(200);
        let flow = Flow::new("proj", long);
        assert_eq!(flow.name.chars().count(), FLOW_NAME_MAX_CHARS + 1);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(FlowStatus::Completed.is_terminal());
        assert!(FlowStatus::Cancelled.is_terminal());
        assert!(!FlowStatus::Paused.is_terminal());
    }
}
