use std::path::Path;
use std::sync::Arc;

use flowpilot_core::api::{
    start_events_out, AppConfig, EventEmitter, EventProgressTracker, FailurePolicy, FanoutEmitter,
    FlowService, FlowSnapshot, FlowStatus, JsonlEmitter, ProgressFanout, ProgressTracker,
};
use flowpilot_plugins::factory::build_engine;

use crate::commands::cli::{ExecArgs, FailurePolicyArg};
use crate::error::CliError;
use crate::progress::ProgressMonitor;

/// Command-line overrides win over config file and environment.
pub fn apply_exec_overrides(cfg: &mut AppConfig, exec: &ExecArgs) {
    if let Some(n) = exec.max_concurrency {
        cfg.engine.max_concurrency = n.max(1);
    }
    if let Some(ms) = exec.task_timeout_ms {
        cfg.engine.task_timeout_ms = ms;
    }
    if let Some(policy) = exec.failure_policy {
        cfg.engine.failure_policy = match policy {
            FailurePolicyArg::Drain => FailurePolicy::Drain,
            FailurePolicyArg::Abort => FailurePolicy::Abort,
            FailurePolicyArg::Continue => FailurePolicy::Continue,
        };
    }
}

/// 0 completed, 1 failed, 130 cancelled.
pub fn exit_code_for_status(status: FlowStatus) -> i32 {
    match status {
        FlowStatus::Completed => 0,
        FlowStatus::Cancelled => 130,
        _ => 1,
    }
}

/// A flow service wired to the configured event sink and terminal progress.
pub struct Session {
    service: FlowService,
}

impl Session {
    pub async fn start(cfg: &AppConfig, show_progress: bool) -> Result<Self, CliError> {
        let mut fanout = FanoutEmitter::new();
        if let Some(out) = start_events_out(&cfg.events_out).await? {
            fanout = fanout.with(Arc::new(JsonlEmitter::new(out)));
        }
        let emitter: Arc<dyn EventEmitter> = Arc::new(fanout);

        let trackers: Vec<Arc<dyn ProgressTracker>> = vec![
            Arc::new(EventProgressTracker::new(emitter.clone())),
            Arc::new(ProgressMonitor::new(
                show_progress && atty::is(atty::Stream::Stderr),
            )),
        ];

        let engine = build_engine(cfg)
            .map_err(|e| CliError::Config(format!("{e:#}")))?
            .emitter(emitter)
            .progress(Arc::new(ProgressFanout::new(trackers)))
            .build();

        Ok(Self {
            service: FlowService::new(engine),
        })
    }

    pub fn service(&self) -> &FlowService {
        &self.service
    }

    /// Wait for the flow to settle. Ctrl-C stops it and waits for the stop
    /// to land before returning.
    pub async fn drive(&self, flow_id: &str) -> Result<FlowSnapshot, CliError> {
        let snapshot = tokio::select! {
            res = self.service.wait_for_terminal(flow_id) => res?,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!(target: "flowpilot.cli", flow_id = %flow_id, "interrupted, stopping flow");
                if let Err(e) = self.service.stop_flow(flow_id).await {
                    tracing::debug!(target: "flowpilot.cli", flow_id = %flow_id, error = %e);
                }
                self.service.wait_for_terminal(flow_id).await?
            }
        };
        Ok(snapshot)
    }

    /// Print the final snapshot, optionally persist it, and shut down.
    pub async fn finish(
        self,
        snapshot: &FlowSnapshot,
        snapshot_out: Option<&Path>,
    ) -> Result<i32, CliError> {
        self.service.shutdown().await;

        if let Some(path) = snapshot_out {
            snapshot.save_to_file(path)?;
            tracing::info!(target: "flowpilot.cli", path = %path.display(), "snapshot written");
        }
        println!("{}", snapshot.to_json()?);

        tracing::info!(
            target: "flowpilot.cli",
            flow_id = %snapshot.flow.id,
            status = %snapshot.flow.status,
            tasks = snapshot.tasks.len(),
            "flow finished"
        );
        Ok(exit_code_for_status(snapshot.flow.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code_for_status(FlowStatus::Completed), 0);
        assert_eq!(exit_code_for_status(FlowStatus::Failed), 1);
        assert_eq!(exit_code_for_status(FlowStatus::Cancelled), 130);
    }

    #[test]
    fn test_exec_overrides() {
        let mut cfg = AppConfig::default();
        let exec = ExecArgs {
            max_concurrency: Some(0),
            task_timeout_ms: Some(0),
            failure_policy: Some(FailurePolicyArg::Continue),
            ..ExecArgs::default()
        };
        apply_exec_overrides(&mut cfg, &exec);
        assert_eq!(cfg.engine.max_concurrency, 1);
        assert_eq!(cfg.engine.task_timeout_ms, 0);
        assert_eq!(cfg.engine.failure_policy, FailurePolicy::Continue);
    }

    #[test]
    fn test_no_overrides_keep_config() {
        let mut cfg = AppConfig::default();
        let before = cfg.engine.max_concurrency;
        apply_exec_overrides(&mut cfg, &ExecArgs::default());
        assert_eq!(cfg.engine.max_concurrency, before);
    }
}
