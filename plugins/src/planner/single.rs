use async_trait::async_trait;

use flowpilot_core::api::{Plan, PlanError, PlanGenerator, TaskSpec};

const TITLE_LIMIT: usize = 80;

/// One task carrying the whole requirement as its description.
#[derive(Debug, Clone)]
pub struct SingleTaskPlanner {
    task_type: String,
}

impl SingleTaskPlanner {
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
        }
    }
}

#[async_trait]
impl PlanGenerator for SingleTaskPlanner {
    fn name(&self) -> &str {
        "single"
    }

    async fn generate_plan(&self, requirements: &str) -> Result<Plan, PlanError> {
        let requirements = requirements.trim();
        let first_line = requirements.lines().next().unwrap_or_default().trim();
        if first_line.is_empty() {
            return Err(PlanError::InvalidPlan("requirements are empty".to_string()));
        }

        let title: String = first_line.chars().take(TITLE_LIMIT).collect();
        Ok(Plan::new(vec![TaskSpec::new(title, self.task_type.clone())
            .with_id("task-1")
            .with_description(requirements)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_single_task_plan() {
        let planner = SingleTaskPlanner::new("shell");
        let plan = planner
            .generate_plan("  cargo build\ncargo test  ")
            .await
            .unwrap();

        assert_eq!(plan.tasks.len(), 1);
        let task = &plan.tasks[0];
        assert_eq!(task.title, "cargo build");
        assert_eq!(task.description, "cargo build\ncargo test");
        assert_eq!(task.task_type, "shell");
    }

    #[tokio::test]
    async fn test_empty_requirements_rejected() {
        let planner = SingleTaskPlanner::new("default");
        assert!(matches!(
            planner.generate_plan("   ").await,
            Err(PlanError::InvalidPlan(_))
        ));
    }
}
