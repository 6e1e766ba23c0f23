#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use flowpilot_core::api::{
    BroadcastEmitter, CancellationToken, EngineConfig, EventEnvelope, ExecutionEngine,
    FlowService, FlowSnapshot, FlowStatus, FollowUpHook, Orchestrator, Outcome, Plan, PlanError,
    PlanGenerator, Task, TaskBackend, TaskErrorKind, TaskSpec, TaskStatus,
};

pub const WAIT: Duration = Duration::from_secs(5);

/// What the scripted backend does for one task id.
#[derive(Clone)]
pub enum Step {
    Ok { delay_ms: u64, result: Option<Value> },
    Fail { delay_ms: u64, message: String },
    /// Never finishes on its own; returns Cancelled once the token fires.
    Hang,
    /// Finishes after the delay even if cancelled.
    IgnoreCancel { delay_ms: u64 },
    Panic,
    /// Blocks until the gate is opened, then completes.
    Gate(Arc<Notify>),
}

impl Step {
    pub fn ok() -> Self {
        Step::Ok {
            delay_ms: 0,
            result: None,
        }
    }

    pub fn ok_after(delay_ms: u64) -> Self {
        Step::Ok {
            delay_ms,
            result: None,
        }
    }

    pub fn fail(message: &str) -> Self {
        Step::Fail {
            delay_ms: 0,
            message: message.to_string(),
        }
    }
}

pub struct ScriptedBackend {
    script: Mutex<HashMap<String, Step>>,
    default: Step,
    active: AtomicUsize,
    max_active: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::with_default(Step::ok())
    }

    pub fn with_default(default: Step) -> Self {
        Self {
            script: Mutex::new(HashMap::new()),
            default,
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn on(self, task_id: &str, step: Step) -> Self {
        self.script.lock().unwrap().insert(task_id.to_string(), step);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, task_id: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == task_id).count()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn execute(&self, task: &Task, cancel: CancellationToken) -> anyhow::Result<Outcome> {
        self.calls.lock().unwrap().push(task.id.clone());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        let step = self
            .script
            .lock()
            .unwrap()
            .get(&task.id)
            .cloned()
            .unwrap_or_else(|| self.default.clone());

        match step {
            Step::Ok { delay_ms, result } => {
                tokio::select! {
                    _ = cancel.cancelled() => Ok(Outcome::cancelled("cancelled")),
                    _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {
                        Ok(Outcome::completed(Some(result.unwrap_or_else(|| json!({ "done": task.id })))))
                    }
                }
            }
            Step::Fail { delay_ms, message } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(Outcome::failed(TaskErrorKind::Executor, message))
            }
            Step::Hang => {
                cancel.cancelled().await;
                Ok(Outcome::cancelled("cancelled"))
            }
            Step::IgnoreCancel { delay_ms } => {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok(Outcome::completed(Some(json!("late"))))
            }
            Step::Panic => panic!("scripted panic in {}", task.id),
            Step::Gate(gate) => {
                tokio::select! {
                    _ = cancel.cancelled() => Ok(Outcome::cancelled("cancelled")),
                    _ = gate.notified() => Ok(Outcome::completed(None)),
                }
            }
        }
    }
}

pub enum PlannerStep {
    Plan(Plan),
    Fail(PlanError),
    Slow(Duration, Plan),
}

pub struct StaticPlanner {
    step: PlannerStep,
}

impl StaticPlanner {
    pub fn new(plan: Plan) -> Self {
        Self {
            step: PlannerStep::Plan(plan),
        }
    }

    pub fn failing(err: PlanError) -> Self {
        Self {
            step: PlannerStep::Fail(err),
        }
    }

    pub fn slow(delay: Duration, plan: Plan) -> Self {
        Self {
            step: PlannerStep::Slow(delay, plan),
        }
    }
}

#[async_trait]
impl PlanGenerator for StaticPlanner {
    fn name(&self) -> &str {
        "static"
    }

    async fn generate_plan(&self, _requirements: &str) -> Result<Plan, PlanError> {
        match &self.step {
            PlannerStep::Plan(plan) => Ok(plan.clone()),
            PlannerStep::Fail(err) => Err(err.clone()),
            PlannerStep::Slow(delay, plan) => {
                tokio::time::sleep(*delay).await;
                Ok(plan.clone())
            }
        }
    }
}

/// Follow-ups keyed by parent task id, each handed out once.
#[derive(Default)]
pub struct ScriptedFollowUps {
    by_parent: Mutex<HashMap<String, Vec<TaskSpec>>>,
}

impl ScriptedFollowUps {
    pub fn on(self, parent: &str, specs: Vec<TaskSpec>) -> Self {
        self.by_parent
            .lock()
            .unwrap()
            .insert(parent.to_string(), specs);
        self
    }
}

impl FollowUpHook for ScriptedFollowUps {
    fn follow_ups(&self, task: &Task, _outcome: &Outcome) -> Vec<TaskSpec> {
        self.by_parent
            .lock()
            .unwrap()
            .remove(&task.id)
            .unwrap_or_default()
    }
}

pub fn spec(id: &str, deps: &[&str]) -> TaskSpec {
    TaskSpec::new(format!("task {id}"), "default")
        .with_id(id)
        .depends_on(deps.iter().copied())
}

pub fn plan(tasks: &[(&str, &[&str])]) -> Plan {
    Plan::new(tasks.iter().map(|(id, deps)| spec(id, deps)).collect())
}

pub struct Harness {
    pub service: FlowService,
    pub backend: Arc<ScriptedBackend>,
    pub events: BroadcastEmitter,
}

pub struct HarnessBuilder {
    planner: Arc<dyn PlanGenerator>,
    backend: ScriptedBackend,
    config: EngineConfig,
    follow_ups: Option<Arc<dyn FollowUpHook>>,
}

impl HarnessBuilder {
    pub fn new(plan: Plan) -> Self {
        Self::with_planner(StaticPlanner::new(plan))
    }

    pub fn with_planner(planner: impl PlanGenerator + 'static) -> Self {
        Self {
            planner: Arc::new(planner),
            backend: ScriptedBackend::new(),
            config: EngineConfig::default(),
            follow_ups: None,
        }
    }

    pub fn backend(mut self, backend: ScriptedBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn config(mut self, f: impl FnOnce(&mut EngineConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn follow_ups(mut self, hook: impl FollowUpHook + 'static) -> Self {
        self.follow_ups = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Harness {
        let backend = Arc::new(self.backend);
        let events = BroadcastEmitter::new(1024);

        let mut orchestrator = Orchestrator::new();
        orchestrator.register_default("scripted", backend.clone());

        let mut builder = ExecutionEngine::builder(self.planner)
            .config(self.config)
            .orchestrator(orchestrator)
            .emitter(Arc::new(events.clone()));
        if let Some(hook) = self.follow_ups {
            builder = builder.follow_ups(hook);
        }

        Harness {
            service: FlowService::new(builder.build()),
            backend,
            events,
        }
    }
}

impl Harness {
    pub async fn start(&self) -> String {
        self.service.start_flow("project", "build the thing").await.id
    }

    pub async fn wait_terminal(&self, flow_id: &str) -> FlowSnapshot {
        tokio::time::timeout(WAIT, self.service.wait_for_terminal(flow_id))
            .await
            .expect("flow did not finish in time")
            .unwrap()
    }

    pub async fn wait_for<F>(&self, flow_id: &str, pred: F) -> FlowSnapshot
    where
        F: Fn(&FlowSnapshot) -> bool,
    {
        tokio::time::timeout(WAIT, self.service.wait_until(flow_id, pred))
            .await
            .expect("condition not reached in time")
            .unwrap()
    }

    pub async fn wait_task(&self, flow_id: &str, task_id: &str, status: TaskStatus) -> FlowSnapshot {
        let task_id = task_id.to_string();
        self.wait_for(flow_id, move |s| {
            s.task(&task_id).map(|t| t.status) == Some(status)
        })
        .await
    }

    pub async fn wait_status(&self, flow_id: &str, status: FlowStatus) -> FlowSnapshot {
        self.wait_for(flow_id, move |s| s.flow.status == status).await
    }
}

pub fn status_of(snapshot: &FlowSnapshot, task_id: &str) -> TaskStatus {
    snapshot
        .task(task_id)
        .map(|t| t.status)
        .unwrap_or_else(|| panic!("no task {task_id}"))
}

/// Everything currently buffered on an event receiver.
pub fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<EventEnvelope>) -> Vec<EventEnvelope> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}
