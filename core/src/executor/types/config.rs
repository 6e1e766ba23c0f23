use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens to the rest of a flow once one task fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop new dispatch; let in-flight siblings finish on their own.
    #[default]
    Drain,
    /// Stop new dispatch and signal cancellation to in-flight siblings.
    Abort,
    /// Keep running independent branches; skip only dependents of the failure.
    Continue,
}

impl FailurePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drain => "drain",
            Self::Abort => "abort",
            Self::Continue => "continue",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drain" => Ok(Self::Drain),
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => Err(format!("unknown failure policy: {other}")),
        }
    }
}

/// Scheduling knobs for the execution engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound on tasks in flight per flow.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Per-task deadline; 0 disables it.
    #[serde(default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,

    #[serde(default = "default_planner_timeout_ms")]
    pub planner_timeout_ms: u64,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_max_concurrency() -> usize {
    8
}

fn default_task_timeout_ms() -> u64 {
    600_000
}

fn default_planner_timeout_ms() -> u64 {
    120_000
}

fn default_event_channel_capacity() -> usize {
    1024
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            task_timeout_ms: default_task_timeout_ms(),
            planner_timeout_ms: default_planner_timeout_ms(),
            failure_policy: FailurePolicy::default(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

impl EngineConfig {
    pub fn task_timeout(&self) -> Option<Duration> {
        (self.task_timeout_ms > 0).then(|| Duration::from_millis(self.task_timeout_ms))
    }

    pub fn planner_timeout(&self) -> Duration {
        Duration::from_millis(self.planner_timeout_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_strategy")]
    pub strategy: String,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Total attempts per task, including the first one. 1 disables retries.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            strategy: default_retry_strategy(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_retry_strategy() -> String {
    "exponential-backoff".to_string()
}

fn default_max_attempts() -> u32 {
    1
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_concurrency_strategy")]
    pub strategy: String,
    #[serde(default = "default_min_concurrency")]
    pub min_concurrency: usize,
    #[serde(default = "default_max_strategy_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_max_concurrency")]
    pub base_concurrency: usize,
    /// Below this CPU usage (percent) the adaptive strategy scales up.
    #[serde(default = "default_cpu_threshold_low")]
    pub cpu_threshold_low: f32,
    /// Above this CPU usage (percent) the adaptive strategy scales down.
    #[serde(default = "default_cpu_threshold_high")]
    pub cpu_threshold_high: f32,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            strategy: default_concurrency_strategy(),
            min_concurrency: default_min_concurrency(),
            max_concurrency: default_max_strategy_concurrency(),
            base_concurrency: default_max_concurrency(),
            cpu_threshold_low: default_cpu_threshold_low(),
            cpu_threshold_high: default_cpu_threshold_high(),
        }
    }
}

fn default_concurrency_strategy() -> String {
    "fixed".to_string()
}

fn default_min_concurrency() -> usize {
    1
}

fn default_max_strategy_concurrency() -> usize {
    32
}

fn default_cpu_threshold_low() -> f32 {
    50.0
}

fn default_cpu_threshold_high() -> f32 {
    80.0
}
