use serde::{Deserialize, Serialize};

pub use crate::executor::types::{ConcurrencyConfig, EngineConfig, FailurePolicy, RetryConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_project_id")]
    pub project_id: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub events_out: EventsOutConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub concurrency: ConcurrencyConfig,

    #[serde(default)]
    pub planner: PlannerConfig,

    #[serde(default = "default_backends")]
    pub backends: Vec<BackendConfig>,

    #[serde(default)]
    pub snapshots: SnapshotConfig,
}

fn default_project_id() -> String {
    "default".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            project_id: default_project_id(),
            logging: LoggingConfig::default(),
            engine: EngineConfig::default(),
            events_out: EventsOutConfig::default(),
            retry: RetryConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            planner: PlannerConfig::default(),
            backends: default_backends(),
            snapshots: SnapshotConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "flowpilot_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsOutConfig {
    #[serde(default)]
    pub enabled: bool,
    /// File path, or `stdout:`.
    #[serde(default = "default_events_path")]
    pub path: String,
    #[serde(default = "default_events_capacity")]
    pub channel_capacity: usize,
    #[serde(default = "default_drop_when_full")]
    pub drop_when_full: bool,
}

fn default_events_path() -> String {
    "./flow.events.jsonl".to_string()
}

fn default_events_capacity() -> usize {
    2048
}

fn default_drop_when_full() -> bool {
    true
}

impl Default for EventsOutConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_events_path(),
            channel_capacity: default_events_capacity(),
            drop_when_full: default_drop_when_full(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider")]
pub enum PlannerConfig {
    /// Read a JSON or TOML plan from disk.
    #[serde(rename = "file")]
    File(FilePlannerConfig),
    #[serde(rename = "http")]
    Http(HttpPlannerConfig),
    /// One task carrying the whole requirement.
    #[serde(rename = "single")]
    Single(SinglePlannerConfig),
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig::Single(SinglePlannerConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FilePlannerConfig {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpPlannerConfig {
    #[serde(default = "default_planner_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_planner_url() -> String {
    "http://localhost:8080/plan".to_string()
}

fn default_http_timeout_ms() -> u64 {
    60_000
}

impl Default for HttpPlannerConfig {
    fn default() -> Self {
        Self {
            url: default_planner_url(),
            api_key: String::new(),
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinglePlannerConfig {
    #[serde(default = "default_task_type")]
    pub task_type: String,
}

fn default_task_type() -> String {
    "default".to_string()
}

impl Default for SinglePlannerConfig {
    fn default() -> Self {
        Self {
            task_type: default_task_type(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Shell,
    Http,
    Echo,
    Placeholder,
    Unavailable,
}

/// One backend route. `task_types` entries use the task-type matcher syntax
/// (`*`, `a,b`, `prefix*`, `re:...`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub kind: BackendKind,
    #[serde(default)]
    pub task_types: Vec<String>,
    /// Catch-all route for unmatched task types.
    #[serde(default)]
    pub default: bool,

    /// shell: program used to run the task description (`sh -c` when empty).
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub workdir: Option<String>,
    /// shell: max bytes kept from each of stdout/stderr.
    #[serde(default = "default_capture_bytes")]
    pub capture_bytes: usize,

    /// http: executor endpoint.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_capture_bytes() -> usize {
    64 * 1024
}

impl BackendConfig {
    pub fn new(name: impl Into<String>, kind: BackendKind) -> Self {
        Self {
            name: name.into(),
            kind,
            task_types: Vec::new(),
            default: false,
            command: None,
            workdir: None,
            capture_bytes: default_capture_bytes(),
            url: None,
            api_key: None,
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

fn default_backends() -> Vec<BackendConfig> {
    vec![BackendConfig {
        default: true,
        ..BackendConfig::new("echo", BackendKind::Echo)
    }]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Defaults to `~/.flowpilot/snapshots`.
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,
}

fn default_max_snapshots() -> usize {
    5
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: None,
            max_snapshots: default_max_snapshots(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.engine.max_concurrency, 8);
        assert_eq!(cfg.engine.failure_policy, FailurePolicy::Drain);
        assert_eq!(cfg.planner, PlannerConfig::default());
        assert_eq!(cfg.backends.len(), 1);
        assert!(cfg.backends[0].default);
        assert!(!cfg.events_out.enabled);
    }

    #[test]
    fn test_full_toml() {
        let cfg: AppConfig = toml::from_str(
            r#"
project_id = "shop"

[engine]
max_concurrency = 2
failure_policy = "abort"
task_timeout_ms = 0

[planner]
provider = "http"
url = "http://planner.local/plan"

[[backends]]
name = "sh"
kind = "shell"
task_types = ["build", "test*"]

[[backends]]
name = "fallback"
kind = "placeholder"
default = true
"#,
        )
        .unwrap();

        assert_eq!(cfg.project_id, "shop");
        assert_eq!(cfg.engine.max_concurrency, 2);
        assert_eq!(cfg.engine.failure_policy, FailurePolicy::Abort);
        assert_eq!(cfg.engine.task_timeout(), None);
        assert_eq!(cfg.engine.planner_timeout_ms, 120_000);
        match &cfg.planner {
            PlannerConfig::Http(http) => {
                assert_eq!(http.url, "http://planner.local/plan");
                assert_eq!(http.timeout_ms, 60_000);
            }
            other => panic!("unexpected planner: {other:?}"),
        }
        assert_eq!(cfg.backends[0].kind, BackendKind::Shell);
        assert_eq!(cfg.backends[0].task_types, vec!["build", "test*"]);
        assert_eq!(cfg.backends[1].kind, BackendKind::Placeholder);
    }
}
