use flowpilot_core::api::{AppConfig, FlowSnapshot, FlowStatus};

use crate::commands::cli::ResumeArgs;
use crate::error::CliError;
use crate::session::{apply_exec_overrides, Session};

pub async fn resume(args: ResumeArgs, mut cfg: AppConfig) -> Result<i32, CliError> {
    let snapshot = FlowSnapshot::load_from_file(&args.snapshot)?;
    apply_exec_overrides(&mut cfg, &args.exec);

    let session = Session::start(&cfg, !args.exec.no_progress).await?;
    let flow = session.service().restore_flow(snapshot).await?;
    tracing::info!(
        target: "flowpilot.cli",
        flow_id = %flow.id,
        status = %flow.status,
        "flow restored"
    );
    // Restore keeps a paused flow paused; resuming from the command line means continue.
    if flow.status == FlowStatus::Paused {
        session.service().resume_flow(&flow.id).await?;
    }

    let snapshot = session.drive(&flow.id).await?;
    session
        .finish(&snapshot, args.exec.snapshot_out.as_deref())
        .await
}
