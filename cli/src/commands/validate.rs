use std::fmt::Write as _;

use flowpilot_core::api::{FlowError, Plan, PlanError, TaskGraph};
use flowpilot_plugins::planner::FilePlanner;

use crate::commands::cli::ValidateArgs;
use crate::error::CliError;

/// One line per execution stage; tasks within a stage may run concurrently.
pub fn render_stages(plan: Plan) -> Result<String, CliError> {
    if plan.tasks.is_empty() {
        return Err(PlanError::InvalidPlan("plan has no tasks".to_string()).into());
    }
    let tasks = plan.into_tasks("validate");
    let mut graph = TaskGraph::from_tasks(tasks).map_err(FlowError::from)?;
    graph.validate().map_err(FlowError::from)?;
    let stages = graph.topological_stages().map_err(FlowError::from)?;

    let mut out = String::new();
    for (i, stage) in stages.iter().enumerate() {
        let _ = writeln!(out, "stage {}: {}", i + 1, stage.join(", "));
    }
    Ok(out)
}

pub fn validate(args: ValidateArgs) -> Result<i32, CliError> {
    let text = std::fs::read_to_string(&args.plan)?;
    let plan = FilePlanner::parse(&args.plan, &text)?;
    print!("{}", render_stages(plan)?);
    Ok(0)
}
