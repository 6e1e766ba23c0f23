use std::sync::Arc;

use anyhow::{bail, Context, Result};

use flowpilot_core::api::{
    snapshot_dir, AppConfig, BackendConfig, BackendKind, ConcurrencyConfig,
    ConcurrencyStrategyPlugin, ExecutionEngine, ExecutionEngineBuilder, Orchestrator,
    PlaceholderBackend, PlanGenerator, PlannerConfig, RetryConfig, RetryStrategyPlugin,
    SnapshotManager, TaskBackend, TaskTypeMatcher, UnavailableBackend,
};

use crate::backend::{EchoBackend, HttpBackend, ShellBackend};
use crate::executor::{
    AdaptiveConcurrencyPlugin, ExponentialBackoffPlugin, FixedConcurrencyPlugin,
    LinearRetryPlugin,
};
use crate::followup::ResultFollowUps;
use crate::planner::{FilePlanner, HttpPlanner, SingleTaskPlanner};

pub fn build_backend(cfg: &BackendConfig) -> Result<Arc<dyn TaskBackend>> {
    let backend: Arc<dyn TaskBackend> = match cfg.kind {
        BackendKind::Shell => {
            let mut shell = ShellBackend::new(&cfg.name).with_capture_bytes(cfg.capture_bytes);
            if let Some(command) = cfg.command.as_deref() {
                shell = shell.with_command(command);
            }
            if let Some(dir) = cfg.workdir.as_deref() {
                shell = shell.with_workdir(dir);
            }
            Arc::new(shell)
        }
        BackendKind::Http => {
            let Some(url) = cfg.url.as_deref() else {
                bail!("backend '{}': http backends need a url", cfg.name);
            };
            Arc::new(HttpBackend::new(
                &cfg.name,
                url,
                cfg.api_key.clone().unwrap_or_default(),
                cfg.timeout_ms,
            )?)
        }
        BackendKind::Echo => Arc::new(EchoBackend::new(&cfg.name)),
        BackendKind::Placeholder => Arc::new(PlaceholderBackend::new(&cfg.name)),
        BackendKind::Unavailable => Arc::new(UnavailableBackend::new(
            &cfg.name,
            "configured as unavailable",
        )),
    };
    Ok(backend)
}

/// Routes in config order; the first backend marked `default` catches the rest.
pub fn build_orchestrator(cfg: &AppConfig) -> Result<Orchestrator> {
    let mut orchestrator = Orchestrator::new();
    let mut has_default = false;

    for backend_cfg in &cfg.backends {
        let backend = build_backend(backend_cfg)?;
        if !backend_cfg.task_types.is_empty() {
            let matchers = TaskTypeMatcher::parse_all(&backend_cfg.task_types)
                .with_context(|| format!("backend '{}': bad task_types", backend_cfg.name))?;
            orchestrator.register_matcher(&backend_cfg.name, matchers, backend.clone());
        }
        if backend_cfg.default && !has_default {
            orchestrator.register_default(&backend_cfg.name, backend);
            has_default = true;
        } else if backend_cfg.task_types.is_empty() {
            tracing::warn!(
                target: "flowpilot.factory",
                backend = %backend_cfg.name,
                "backend has no task_types and is not the default; it will never be used"
            );
        }
    }

    if let Some(retry) = build_retry_strategy(&cfg.retry) {
        orchestrator = orchestrator.with_retry_strategy(retry);
    }
    Ok(orchestrator)
}

pub fn build_planner(cfg: &PlannerConfig) -> Result<Arc<dyn PlanGenerator>> {
    let planner: Arc<dyn PlanGenerator> = match cfg {
        PlannerConfig::File(file) => Arc::new(FilePlanner::new(&file.path)),
        PlannerConfig::Http(http) => Arc::new(HttpPlanner::new(
            &http.url,
            &http.api_key,
            http.timeout_ms,
        )?),
        PlannerConfig::Single(single) => Arc::new(SingleTaskPlanner::new(&single.task_type)),
    };
    Ok(planner)
}

/// `None` when only one attempt is allowed.
pub fn build_retry_strategy(cfg: &RetryConfig) -> Option<Arc<dyn RetryStrategyPlugin>> {
    if cfg.max_attempts <= 1 {
        return None;
    }
    match cfg.strategy.as_str() {
        "linear" => Some(Arc::new(LinearRetryPlugin::new(cfg.clone()))),
        _ => Some(Arc::new(ExponentialBackoffPlugin::new(cfg.clone()))),
    }
}

pub fn build_concurrency_strategy(
    cfg: &ConcurrencyConfig,
) -> Option<Arc<dyn ConcurrencyStrategyPlugin>> {
    match cfg.strategy.as_str() {
        "adaptive" => Some(Arc::new(AdaptiveConcurrencyPlugin::new(cfg.clone()))),
        "fixed" => Some(Arc::new(FixedConcurrencyPlugin::new(cfg.base_concurrency))),
        _ => None,
    }
}

/// Everything but the event sink and progress tracking, which belong to the caller.
pub fn build_engine(cfg: &AppConfig) -> Result<ExecutionEngineBuilder> {
    let planner = build_planner(&cfg.planner)?;
    let mut builder = ExecutionEngine::builder(planner)
        .config(cfg.engine.clone())
        .orchestrator(build_orchestrator(cfg)?)
        .follow_ups(Arc::new(ResultFollowUps));

    if let Some(strategy) = build_concurrency_strategy(&cfg.concurrency) {
        builder = builder.concurrency_strategy(strategy);
    }
    if cfg.snapshots.enabled {
        let dir = snapshot_dir(cfg)?;
        let manager = SnapshotManager::new(dir, cfg.snapshots.max_snapshots)?;
        builder = builder.snapshots(Arc::new(manager));
    }
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowpilot_core::api::{FilePlannerConfig, FlowService, FlowStatus};
    use pretty_assertions::assert_eq;

    fn backend(name: &str, kind: BackendKind, types: &[&str], default: bool) -> BackendConfig {
        BackendConfig {
            task_types: types.iter().map(|s| s.to_string()).collect(),
            default,
            ..BackendConfig::new(name, kind)
        }
    }

    #[test]
    fn test_orchestrator_routes_by_config() {
        let cfg = AppConfig {
            backends: vec![
                backend("sh", BackendKind::Shell, &["build", "test*"], false),
                backend("docs", BackendKind::Echo, &["re:^doc(s)?$"], false),
                backend("fallback", BackendKind::Placeholder, &[], true),
            ],
            ..AppConfig::default()
        };
        let orchestrator = build_orchestrator(&cfg).unwrap();

        assert_eq!(orchestrator.resolve("build"), Some("sh"));
        assert_eq!(orchestrator.resolve("test-unit"), Some("sh"));
        assert_eq!(orchestrator.resolve("docs"), Some("docs"));
        assert_eq!(orchestrator.resolve("deploy"), Some("fallback"));
    }

    #[test]
    fn test_no_default_leaves_gaps() {
        let cfg = AppConfig {
            backends: vec![backend("sh", BackendKind::Shell, &["build"], false)],
            ..AppConfig::default()
        };
        let orchestrator = build_orchestrator(&cfg).unwrap();
        assert_eq!(orchestrator.resolve("deploy"), None);
    }

    #[test]
    fn test_bad_matcher_is_rejected() {
        let cfg = AppConfig {
            backends: vec![backend("sh", BackendKind::Shell, &["re:("], false)],
            ..AppConfig::default()
        };
        assert!(build_orchestrator(&cfg).is_err());
    }

    #[test]
    fn test_http_backend_requires_url() {
        let cfg = backend("remote", BackendKind::Http, &[], true);
        assert!(build_backend(&cfg).is_err());
    }

    #[test]
    fn test_retry_strategy_selection() {
        let mut cfg = RetryConfig::default();
        cfg.max_attempts = 1;
        assert!(build_retry_strategy(&cfg).is_none());

        cfg.max_attempts = 3;
        cfg.strategy = "linear".to_string();
        assert_eq!(build_retry_strategy(&cfg).unwrap().name(), "linear");

        cfg.strategy = "exponential-backoff".to_string();
        assert_eq!(
            build_retry_strategy(&cfg).unwrap().name(),
            "exponential-backoff"
        );
    }

    #[test]
    fn test_concurrency_strategy_selection() {
        let mut cfg = ConcurrencyConfig::default();
        cfg.strategy = "adaptive".to_string();
        assert_eq!(build_concurrency_strategy(&cfg).unwrap().name(), "adaptive");
        cfg.strategy = "none".to_string();
        assert!(build_concurrency_strategy(&cfg).is_none());
    }

    #[tokio::test]
    async fn test_engine_from_config_runs_plan_file() {
        let dir = tempfile::tempdir().unwrap();
        let plan = dir.path().join("plan.json");
        std::fs::write(
            &plan,
            r#"{"tasks":[
                {"id":"a","title":"first"},
                {"id":"b","title":"second","depends_on":["a"]}
            ]}"#,
        )
        .unwrap();

        let cfg = AppConfig {
            planner: PlannerConfig::File(FilePlannerConfig {
                path: plan.display().to_string(),
            }),
            ..AppConfig::default()
        };
        let service = FlowService::new(build_engine(&cfg).unwrap().build());
        let flow = service.start_flow("p", "from file").await;

        let snapshot = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            service.wait_for_terminal(&flow.id),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(snapshot.flow.status, FlowStatus::Completed);
        assert_eq!(snapshot.task("b").unwrap().result.as_ref().unwrap()["echo"], true);
    }
}
