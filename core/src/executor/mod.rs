//! Task dependency graph (DAG) execution.
//!
//! # Architecture
//!
//! ```text
//! PlanGenerator::generate_plan()
//!   ↓
//! TaskGraph::from_tasks() → validate()  (DuplicateTaskId / UnknownDependency / DependencyCycle)
//!   ↓
//! ExecutionEngine driver loop, one per flow
//!   ├─ TaskGraph::ready()           Pending tasks whose dependencies all Completed
//!   ├─ Orchestrator::dispatch()     backend chosen by task type, bounded by max_concurrency
//!   ├─ InFlight::next()             first dispatch to finish, or a pause/resume/stop wakeup
//!   └─ FollowUpHook → TaskGraph::append()
//!   ↓
//! Flow: Completed | Failed | Cancelled
//! ```

mod engine;
mod graph;
mod progress;
mod scheduler;
pub mod traits;
pub mod types;

pub use engine::{ExecutionEngine, ExecutionEngineBuilder};
pub use graph::TaskGraph;
pub use progress::{EventProgressTracker, FlowProgress, ProgressFanout, ProgressTracker};
pub use scheduler::{Completion, InFlight};
