//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `flowpilot_core::api` instead of reaching into internal modules.

pub use crate::config::{
    apply_env_overrides, load, load_default, load_from_path, snapshot_dir, AppConfig,
    BackendConfig, BackendKind, ConcurrencyConfig, EngineConfig, EventsOutConfig, FailurePolicy,
    FilePlannerConfig, HttpPlannerConfig, LoggingConfig, PlannerConfig, RetryConfig,
    SinglePlannerConfig, SnapshotConfig,
};
pub use crate::error::{ErrorCode, FlowError, GraphError, PlanError};
pub use crate::events::{
    BroadcastEmitter, EventEmitter, EventEnvelope, EventType, FanoutEmitter, JsonlEmitter,
    NoopEmitter,
};
pub use crate::events_out::{start_events_out, EventsOutTx};
pub use crate::executor::traits::{
    ConcurrencyContext, ConcurrencyStrategyPlugin, FollowUpHook, NoFollowUps, PlanGenerator,
    RetryStrategyPlugin, TaskBackend,
};
pub use crate::executor::types::{
    Flow, FlowId, FlowStatus, Outcome, OutcomeStatus, Plan, Task, TaskError, TaskErrorKind,
    TaskId, TaskSpec, TaskStatus,
};
pub use crate::executor::{
    EventProgressTracker, ExecutionEngine, ExecutionEngineBuilder, FlowProgress, ProgressFanout,
    ProgressTracker, TaskGraph,
};
pub use crate::orchestrator::{
    DispatchHandle, Orchestrator, PlaceholderBackend, TaskTypeMatcher, UnavailableBackend,
};
pub use crate::service::FlowService;
pub use crate::state::{FlowSnapshot, FlowTransition, SnapshotManager};

pub use tokio_util::sync::CancellationToken;
