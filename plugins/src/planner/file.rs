use std::path::{Path, PathBuf};

use async_trait::async_trait;

use flowpilot_core::api::{Plan, PlanError, PlanGenerator};

/// Reads a fixed plan from disk: TOML for `.toml` files, JSON otherwise.
#[derive(Debug, Clone)]
pub struct FilePlanner {
    path: PathBuf,
}

impl FilePlanner {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse plan text by file extension.
    pub fn parse(path: &Path, text: &str) -> Result<Plan, PlanError> {
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        if is_toml {
            Plan::from_toml(text)
        } else {
            Plan::from_json(text)
        }
    }
}

#[async_trait]
impl PlanGenerator for FilePlanner {
    fn name(&self) -> &str {
        "file"
    }

    async fn generate_plan(&self, _requirements: &str) -> Result<Plan, PlanError> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            PlanError::PlannerUnavailable(format!("cannot read {}: {e}", self.path.display()))
        })?;
        let plan = Self::parse(&self.path, &text)?;
        tracing::debug!(
            target: "flowpilot.planner",
            path = %self.path.display(),
            tasks = plan.tasks.len(),
            "plan loaded from file"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_json_plan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(
            &path,
            r#"{"tasks":[{"id":"a","title":"A"},{"id":"b","title":"B","dependencies":["a"]}]}"#,
        )
        .unwrap();

        let plan = FilePlanner::new(&path).generate_plan("").await.unwrap();
        assert_eq!(plan.tasks.len(), 2);
        assert_eq!(plan.tasks[1].dependencies, vec!["a"]);
    }

    #[tokio::test]
    async fn test_toml_plan() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.toml");
        std::fs::write(
            &path,
            r#"
[[tasks]]
id = "build"
title = "Build"
task_type = "shell"
description = "cargo build"

[[tasks]]
id = "test"
title = "Test"
depends_on = ["build"]
"#,
        )
        .unwrap();

        let plan = FilePlanner::new(&path).generate_plan("").await.unwrap();
        assert_eq!(plan.tasks[0].task_type, "shell");
        assert_eq!(plan.tasks[1].dependencies, vec!["build"]);
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let planner = FilePlanner::new("/no/such/plan.json");
        assert!(matches!(
            planner.generate_plan("").await,
            Err(PlanError::PlannerUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_plan_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(matches!(
            FilePlanner::new(&path).generate_plan("").await,
            Err(PlanError::InvalidPlan(_))
        ));
    }
}
