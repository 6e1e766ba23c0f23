use flowpilot_core::api::{AppConfig, FilePlannerConfig, PlannerConfig};

use crate::commands::cli::RunArgs;
use crate::error::CliError;
use crate::session::{apply_exec_overrides, Session};

/// Inline text wins; otherwise read the file. Blank input is rejected.
pub fn read_requirements(args: &RunArgs) -> Result<String, CliError> {
    let text = match (&args.requirements, &args.requirements_file) {
        (Some(text), _) => text.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)?,
        (None, None) => {
            return Err(CliError::Command(
                "one of --requirements or --requirements-file is required".to_string(),
            ))
        }
    };
    if text.trim().is_empty() {
        return Err(CliError::Command("requirements are empty".to_string()));
    }
    Ok(text)
}

pub fn apply_run_overrides(cfg: &mut AppConfig, args: &RunArgs) {
    if let Some(plan) = &args.plan {
        cfg.planner = PlannerConfig::File(FilePlannerConfig {
            path: plan.display().to_string(),
        });
    }
    apply_exec_overrides(cfg, &args.exec);
}

pub async fn run(args: RunArgs, mut cfg: AppConfig) -> Result<i32, CliError> {
    let requirements = read_requirements(&args)?;
    apply_run_overrides(&mut cfg, &args);
    let project = args.project.clone().unwrap_or_else(|| cfg.project_id.clone());

    let session = Session::start(&cfg, !args.exec.no_progress).await?;
    let flow = session.service().start_flow(project, requirements).await;
    tracing::info!(target: "flowpilot.cli", flow_id = %flow.id, name = %flow.name, "flow started");

    let snapshot = session.drive(&flow.id).await?;
    session
        .finish(&snapshot, args.exec.snapshot_out.as_deref())
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cli::ExecArgs;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn args() -> RunArgs {
        RunArgs {
            project: None,
            requirements: None,
            requirements_file: None,
            plan: None,
            exec: ExecArgs::default(),
        }
    }

    #[test]
    fn test_requirements_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("req.md");
        std::fs::write(&path, "build the thing\n").unwrap();

        let mut a = args();
        a.requirements_file = Some(path);
        assert_eq!(read_requirements(&a).unwrap(), "build the thing\n");
    }

    #[test]
    fn test_requirements_missing_or_blank() {
        assert!(matches!(read_requirements(&args()), Err(CliError::Command(_))));

        let mut a = args();
        a.requirements = Some("   ".to_string());
        assert!(matches!(read_requirements(&a), Err(CliError::Command(_))));
    }

    #[test]
    fn test_plan_flag_selects_file_planner() {
        let mut cfg = AppConfig::default();
        let mut a = args();
        a.plan = Some(PathBuf::from("plan.toml"));
        apply_run_overrides(&mut cfg, &a);
        assert_eq!(
            cfg.planner,
            PlannerConfig::File(FilePlannerConfig {
                path: "plan.toml".to_string()
            })
        );
    }
}
