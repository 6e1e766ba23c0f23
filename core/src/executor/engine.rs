use std::sync::Arc;

use serde_json::json;

use crate::error::{FlowError, PlanError};
use crate::events::{EventEmitter, EventEnvelope, EventType, NoopEmitter};
use crate::orchestrator::Orchestrator;
use crate::state::{FlowHandle, FlowRecord, SnapshotManager};

use super::graph::TaskGraph;
use super::progress::ProgressTracker;
use super::scheduler::{Completion, InFlight};
use super::traits::{
    ConcurrencyContext, ConcurrencyStrategyPlugin, FollowUpHook, NoFollowUps, PlanGenerator,
};
use super::types::{
    EngineConfig, FailurePolicy, Flow, FlowStatus, Outcome, Task, TaskError, TaskErrorKind,
    TaskStatus,
};

/// Drives flows through planning and execution.
///
/// Cheap to clone. Each flow gets one driver task; control calls only flip state
/// under the flow lock and wake that driver.
#[derive(Clone)]
pub struct ExecutionEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    orchestrator: Orchestrator,
    planner: Arc<dyn PlanGenerator>,
    follow_ups: Arc<dyn FollowUpHook>,
    concurrency_strategy: Option<Arc<dyn ConcurrencyStrategyPlugin>>,
    emitter: Arc<dyn EventEmitter>,
    progress: Option<Arc<dyn ProgressTracker>>,
    snapshots: Option<Arc<SnapshotManager>>,
}

pub struct ExecutionEngineBuilder {
    config: EngineConfig,
    orchestrator: Orchestrator,
    planner: Arc<dyn PlanGenerator>,
    follow_ups: Arc<dyn FollowUpHook>,
    concurrency_strategy: Option<Arc<dyn ConcurrencyStrategyPlugin>>,
    emitter: Arc<dyn EventEmitter>,
    progress: Option<Arc<dyn ProgressTracker>>,
    snapshots: Option<Arc<SnapshotManager>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverMode {
    Plan,
    Drive,
}

enum Step {
    Wait,
    Exit,
}

impl ExecutionEngine {
    pub fn builder(planner: Arc<dyn PlanGenerator>) -> ExecutionEngineBuilder {
        ExecutionEngineBuilder::new(planner)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.inner.orchestrator
    }

    /// Idle -> Planning, then hand the flow to a fresh driver.
    pub async fn launch(&self, handle: Arc<FlowHandle>) -> Flow {
        let mut record = handle.lock().await;
        if record.flow.status != FlowStatus::Idle {
            return record.flow.clone();
        }

        self.inner.emitter.emit(EventEnvelope::flow(
            EventType::FlowCreated,
            record.flow.id.clone(),
            json!({
                "project_id": record.flow.project_id,
                "name": record.flow.name,
            }),
        ));
        self.set_status(&mut record, FlowStatus::Planning);
        record.driver_active = true;
        self.commit(&handle, &mut record);
        self.spawn_driver(handle.clone(), DriverMode::Plan);
        record.flow.clone()
    }

    /// Pick a restored flow back up according to its status.
    pub async fn adopt(&self, handle: Arc<FlowHandle>) -> Flow {
        let status = handle.lock().await.flow.status;
        if status == FlowStatus::Idle {
            return self.launch(handle).await;
        }

        let mut record = handle.lock().await;
        let mode = match record.flow.status {
            FlowStatus::Planning => Some(DriverMode::Plan),
            FlowStatus::Running => Some(DriverMode::Drive),
            _ => None,
        };
        if let Some(mode) = mode {
            if !record.driver_active {
                record.driver_active = true;
                self.spawn_driver(handle.clone(), mode);
            }
        }
        self.commit(&handle, &mut record);
        record.flow.clone()
    }

    /// Running -> Paused. In-flight tasks keep running and are recorded.
    pub async fn try_pause(&self, handle: &Arc<FlowHandle>) -> Result<Flow, FlowError> {
        let mut record = handle.lock().await;
        if record.flow.status != FlowStatus::Running {
            return Err(invalid_state(&record, "pause"));
        }
        self.set_status(&mut record, FlowStatus::Paused);
        self.commit(handle, &mut record);
        handle.wake();
        Ok(record.flow.clone())
    }

    /// Paused -> Running. Reuses the draining driver when there still is one.
    pub async fn try_resume(&self, handle: &Arc<FlowHandle>) -> Result<Flow, FlowError> {
        let mut record = handle.lock().await;
        if record.flow.status != FlowStatus::Paused {
            return Err(invalid_state(&record, "resume"));
        }
        self.set_status(&mut record, FlowStatus::Running);
        self.commit(handle, &mut record);
        if record.driver_active {
            handle.wake();
        } else {
            record.driver_active = true;
            self.spawn_driver(handle.clone(), DriverMode::Drive);
        }
        Ok(record.flow.clone())
    }

    /// Cancel the flow token, cancel every unfinished task and end the flow
    /// Cancelled. Results that arrive later are discarded.
    pub async fn try_stop(&self, handle: &Arc<FlowHandle>) -> Result<Flow, FlowError> {
        let mut record = handle.lock().await;
        if record.flow.status.is_terminal() {
            return Err(invalid_state(&record, "stop"));
        }

        handle.cancel_token().cancel();
        let flow_id = record.flow.id.clone();
        let unfinished: Vec<String> = record
            .graph
            .iter()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.id.clone())
            .collect();
        for task_id in unfinished {
            let Some(task) = record.graph.get_mut(&task_id) else {
                continue;
            };
            let error = TaskError::new(TaskErrorKind::Cancelled, "flow stopped");
            if task.resolve(TaskStatus::Cancelled, None, Some(error)) {
                self.inner.emitter.emit(EventEnvelope::task(
                    EventType::TaskCancelled,
                    flow_id.clone(),
                    task_id,
                    json!({ "reason": "flow stopped" }),
                ));
            }
        }

        self.set_status(&mut record, FlowStatus::Cancelled);
        self.commit(handle, &mut record);
        handle.wake();
        Ok(record.flow.clone())
    }

    pub async fn flush_events(&self) {
        self.inner.emitter.flush().await;
    }

    fn spawn_driver(&self, handle: Arc<FlowHandle>, mode: DriverMode) {
        let engine = self.clone();
        tokio::spawn(async move {
            tracing::debug!(
                target: "flowpilot.engine",
                flow_id = %handle.id(),
                mode = ?mode,
                "driver started"
            );
            if mode == DriverMode::Plan && !engine.plan(&handle).await {
                return;
            }
            engine.drive(&handle).await;
            tracing::debug!(target: "flowpilot.engine", flow_id = %handle.id(), "driver exited");
        });
    }

    /// Planning phase. Returns true when the flow moved to Running.
    async fn plan(&self, handle: &Arc<FlowHandle>) -> bool {
        let requirements = handle.flow().requirements;
        let timeout = self.inner.config.planner_timeout();
        let token = handle.cancel_token().clone();

        let generated = tokio::select! {
            _ = token.cancelled() => None,
            res = tokio::time::timeout(timeout, self.inner.planner.generate_plan(&requirements)) => {
                Some(match res {
                    Ok(res) => res,
                    Err(_) => Err(PlanError::PlannerTimeout(self.inner.config.planner_timeout_ms)),
                })
            }
        };

        let mut record = handle.lock().await;
        if record.flow.status != FlowStatus::Planning {
            // stopped while the planner was running
            record.driver_active = false;
            return false;
        }
        let Some(generated) = generated else {
            record.driver_active = false;
            return false;
        };

        let plan = match generated {
            Ok(plan) if plan.tasks.is_empty() => {
                Err(PlanError::InvalidPlan("plan contains no tasks".to_string()))
            }
            other => other,
        };
        let plan = match plan {
            Ok(plan) => plan,
            Err(e) => {
                tracing::error!(
                    target: "flowpilot.engine",
                    flow_id = %record.flow.id,
                    planner = self.inner.planner.name(),
                    error.kind = "plan",
                    error.message = %e
                );
                self.fail_flow(handle, &mut record, FlowError::Plan(e));
                record.driver_active = false;
                return false;
            }
        };

        record.flow.plan = Some(plan.to_value());
        let flow_id = record.flow.id.clone();
        let tasks = plan.into_tasks(&flow_id);
        let built = TaskGraph::from_tasks(tasks).and_then(|mut graph| {
            let validated = graph.validate();
            record.flow.task_ids = graph.ids().to_vec();
            record.graph = graph;
            validated
        });
        if let Err(e) = built {
            tracing::error!(
                target: "flowpilot.engine",
                flow_id = %flow_id,
                error.kind = "graph",
                error.message = %e
            );
            self.fail_flow(handle, &mut record, FlowError::Graph(e));
            record.driver_active = false;
            return false;
        }

        let task_count = record.graph.len();
        let stages = record.graph.topological_stages().unwrap_or_default();
        self.inner.emitter.emit(EventEnvelope::flow(
            EventType::FlowPlanned,
            flow_id.clone(),
            json!({ "task_count": task_count, "stages": stages }),
        ));
        tracing::info!(
            target: "flowpilot.engine",
            flow_id = %flow_id,
            task_count,
            stages = stages.len(),
            "plan accepted"
        );
        self.set_status(&mut record, FlowStatus::Running);
        self.commit(handle, &mut record);
        true
    }

    async fn drive(&self, handle: &Arc<FlowHandle>) {
        let mut in_flight = InFlight::new();
        loop {
            if let Step::Exit = self.schedule(handle, &mut in_flight).await {
                break;
            }
            tokio::select! {
                done = in_flight.next() => self.complete(handle, done).await,
                _ = handle.notified() => {}
            }
        }
        if !in_flight.is_empty() {
            // terminal flow: leave remaining backend calls behind
            in_flight.cancel_all();
        }
    }

    /// One scheduling pass under the flow lock.
    async fn schedule(&self, handle: &Arc<FlowHandle>, in_flight: &mut InFlight) -> Step {
        let mut record = handle.lock().await;
        let paused = match record.flow.status {
            FlowStatus::Running => false,
            FlowStatus::Paused => true,
            _ => {
                record.driver_active = false;
                return Step::Exit;
            }
        };

        if let Err(e) = record.graph.validate() {
            self.fail_flow(handle, &mut record, FlowError::Graph(e));
            record.driver_active = false;
            return Step::Exit;
        }

        let policy = self.inner.config.failure_policy;
        let has_failure = record.graph.iter().any(|t| t.status == TaskStatus::Failed);
        if has_failure && policy == FailurePolicy::Abort && !in_flight.is_empty() {
            in_flight.cancel_all();
        }

        if paused {
            if !in_flight.is_empty() {
                return Step::Wait;
            }
            // Drain and abort never dispatch again after a failure, so a
            // resume could only settle the flow: settle it now.
            if has_failure && policy != FailurePolicy::Continue {
                self.finish(handle, &mut record);
            }
            record.driver_active = false;
            return Step::Exit;
        }

        if !has_failure || policy == FailurePolicy::Continue {
            let ready = record.graph.ready();
            let limit = self.concurrency_limit(&record.flow.id, in_flight.len(), ready.len());
            let slots = limit.saturating_sub(in_flight.len());
            let flow_id = record.flow.id.clone();
            let mut dispatched = 0usize;

            for task_id in ready.into_iter().take(slots) {
                let Some(task) = record.graph.get_mut(&task_id) else {
                    continue;
                };
                if !task.mark_in_progress() {
                    continue;
                }
                let task = task.clone();
                let dispatch = self
                    .inner
                    .orchestrator
                    .dispatch(&task, handle.cancel_token().child_token());
                self.inner.emitter.emit(EventEnvelope::task(
                    EventType::TaskDispatched,
                    flow_id.clone(),
                    task_id.clone(),
                    json!({ "backend": dispatch.backend(), "task_type": task.task_type }),
                ));
                tracing::info!(
                    target: "flowpilot.engine",
                    flow_id = %flow_id,
                    task_id = %task_id,
                    backend = %dispatch.backend(),
                    "task dispatched"
                );
                in_flight.push(dispatch);
                dispatched += 1;
            }

            if dispatched > 0 {
                self.commit(handle, &mut record);
            }
        }

        if !in_flight.is_empty() {
            return Step::Wait;
        }

        self.finish(handle, &mut record);
        record.driver_active = false;
        Step::Exit
    }

    /// Nothing in flight and nothing left to dispatch: settle the flow.
    fn finish(&self, handle: &FlowHandle, record: &mut FlowRecord) {
        let failed: Vec<(String, String)> = record
            .graph
            .iter()
            .filter(|t| t.status == TaskStatus::Failed)
            .map(|t| {
                let message = t
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "failed".to_string());
                (t.id.clone(), message)
            })
            .collect();

        if record.graph.all_terminal() && failed.is_empty() {
            self.set_status(record, FlowStatus::Completed);
            self.commit(handle, record);
            return;
        }

        let pending = record.graph.ids_with_status(TaskStatus::Pending);
        let error = if failed.is_empty() {
            FlowError::UnreachableTask(pending.clone()).to_string()
        } else {
            let details: Vec<String> = failed
                .iter()
                .map(|(id, message)| format!("{id}: {message}"))
                .collect();
            format!("{} task(s) failed: {}", failed.len(), details.join("; "))
        };

        let reason = if failed.is_empty() {
            "dependencies can never complete"
        } else {
            "not run after a task failure"
        };
        self.skip_tasks(record, &pending, reason);
        record.flow.error = Some(error);
        self.set_status(record, FlowStatus::Failed);
        self.commit(handle, record);
    }

    /// Record a finished dispatch, then run the follow-up hook outside the lock.
    async fn complete(&self, handle: &Arc<FlowHandle>, done: Completion) {
        let Completion { task_id, outcome } = done;

        let completed_task = {
            let mut record = handle.lock().await;
            if record.flow.status.is_terminal() {
                tracing::debug!(
                    target: "flowpilot.engine",
                    flow_id = %record.flow.id,
                    task_id = %task_id,
                    "discarding result for terminal flow"
                );
                return;
            }
            let flow_id = record.flow.id.clone();
            let Some(task) = record.graph.get_mut(&task_id) else {
                return;
            };
            if task.status != TaskStatus::InProgress {
                return;
            }

            task.attempts = outcome.attempts;
            let status: TaskStatus = outcome.status.into();
            task.resolve(status, outcome.result.clone(), outcome.error.clone());
            let task = task.clone();

            self.emit_task_outcome(&flow_id, &task, &outcome);
            self.commit(handle, &mut record);
            (status == TaskStatus::Completed).then_some(task)
        };

        let Some(task) = completed_task else {
            return;
        };
        let specs = self.inner.follow_ups.follow_ups(&task, &outcome);
        if specs.is_empty() {
            return;
        }

        let mut record = handle.lock().await;
        if record.flow.status.is_terminal() {
            return;
        }
        let flow_id = record.flow.id.clone();
        let batch: Vec<Task> = specs
            .into_iter()
            .map(|spec| Task::from_spec(&flow_id, spec, Some(&task.id)))
            .collect();

        match record.graph.append(batch) {
            Ok(ids) => {
                record.flow.task_ids.extend(ids.iter().cloned());
                for id in &ids {
                    if let Some(new_task) = record.graph.get(id) {
                        self.inner.emitter.emit(EventEnvelope::task(
                            EventType::TaskAppended,
                            flow_id.clone(),
                            id.clone(),
                            json!({
                                "parent_id": task.id,
                                "title": new_task.title,
                                "task_type": new_task.task_type,
                                "dependencies": new_task.dependencies,
                            }),
                        ));
                    }
                }
                tracing::info!(
                    target: "flowpilot.engine",
                    flow_id = %flow_id,
                    parent_id = %task.id,
                    added = ids.len(),
                    hook = self.inner.follow_ups.name(),
                    "follow-up tasks appended"
                );
                self.commit(handle, &mut record);
            }
            Err(e) => {
                tracing::error!(
                    target: "flowpilot.engine",
                    flow_id = %flow_id,
                    parent_id = %task.id,
                    error.kind = "follow_up",
                    error.message = %e
                );
                self.fail_flow(handle, &mut record, FlowError::Graph(e));
            }
        }
    }

    fn emit_task_outcome(&self, flow_id: &str, task: &Task, outcome: &Outcome) {
        let event_type = match task.status {
            TaskStatus::Completed => EventType::TaskCompleted,
            TaskStatus::Cancelled => EventType::TaskCancelled,
            _ => EventType::TaskFailed,
        };
        self.inner.emitter.emit(EventEnvelope::task(
            event_type,
            flow_id.to_string(),
            task.id.clone(),
            json!({
                "status": task.status,
                "attempts": outcome.attempts,
                "error": task.error,
            }),
        ));

        match &task.error {
            Some(error) if task.status == TaskStatus::Failed => tracing::warn!(
                target: "flowpilot.engine",
                flow_id = %flow_id,
                task_id = %task.id,
                status = %task.status,
                error.kind = %error.kind,
                error.message = %error.message,
                "task failed"
            ),
            _ => tracing::info!(
                target: "flowpilot.engine",
                flow_id = %flow_id,
                task_id = %task.id,
                status = %task.status,
                attempts = outcome.attempts,
                "task finished"
            ),
        }
    }

    /// End the flow Failed: running tasks are cancelled, pending ones skipped.
    fn fail_flow(&self, handle: &FlowHandle, record: &mut FlowRecord, error: FlowError) {
        handle.cancel_token().cancel();

        let flow_id = record.flow.id.clone();
        for task_id in record.graph.ids_with_status(TaskStatus::InProgress) {
            if let Some(task) = record.graph.get_mut(&task_id) {
                let cancelled = TaskError::new(TaskErrorKind::Cancelled, "flow failed");
                if task.resolve(TaskStatus::Cancelled, None, Some(cancelled)) {
                    self.inner.emitter.emit(EventEnvelope::task(
                        EventType::TaskCancelled,
                        flow_id.clone(),
                        task_id,
                        json!({ "reason": "flow failed" }),
                    ));
                }
            }
        }
        let pending = record.graph.ids_with_status(TaskStatus::Pending);
        self.skip_tasks(record, &pending, "flow failed");

        record.flow.error = Some(error.to_string());
        self.set_status(record, FlowStatus::Failed);
        self.commit(handle, record);
    }

    fn skip_tasks(&self, record: &mut FlowRecord, task_ids: &[String], reason: &str) {
        let flow_id = record.flow.id.clone();
        for task_id in task_ids {
            let Some(task) = record.graph.get_mut(task_id) else {
                continue;
            };
            let error = TaskError::new(TaskErrorKind::Skipped, reason);
            if task.resolve(TaskStatus::Skipped, None, Some(error)) {
                self.inner.emitter.emit(EventEnvelope::task(
                    EventType::TaskSkipped,
                    flow_id.clone(),
                    task_id.clone(),
                    json!({ "reason": reason }),
                ));
            }
        }
    }

    /// Validated status change plus its event. Invalid changes are logged and
    /// ignored.
    fn set_status(&self, record: &mut FlowRecord, to: FlowStatus) -> bool {
        match record.transition(to) {
            Ok(from) => {
                tracing::info!(
                    target: "flowpilot.engine",
                    flow_id = %record.flow.id,
                    from = %from,
                    to = %to,
                    "flow status changed"
                );
                self.inner.emitter.emit(EventEnvelope::flow(
                    EventType::FlowStatusChanged,
                    record.flow.id.clone(),
                    json!({
                        "from": from,
                        "to": to,
                        "error": record.flow.error,
                    }),
                ));
                true
            }
            Err(e) => {
                tracing::warn!(
                    target: "flowpilot.engine",
                    flow_id = %record.flow.id,
                    error.kind = "transition",
                    error.message = %e
                );
                false
            }
        }
    }

    /// Publish the record and notify progress and persistence.
    fn commit(&self, handle: &FlowHandle, record: &mut FlowRecord) {
        handle.publish(record);
        if self.inner.progress.is_none() && self.inner.snapshots.is_none() {
            return;
        }

        let snapshot = handle.snapshot();
        if let Some(progress) = &self.inner.progress {
            progress.on_snapshot(&snapshot);
        }
        if let Some(snapshots) = &self.inner.snapshots {
            let snapshots = snapshots.clone();
            tokio::task::spawn_blocking(move || {
                if let Err(e) = snapshots.save(&snapshot) {
                    tracing::warn!(
                        target: "flowpilot.snapshot",
                        flow_id = %snapshot.flow.id,
                        error.kind = "snapshot.save",
                        error.message = %format!("{e:#}")
                    );
                }
            });
        }
    }

    fn concurrency_limit(&self, flow_id: &str, active: usize, ready: usize) -> usize {
        let base = self.inner.config.max_concurrency.max(1);
        match &self.inner.concurrency_strategy {
            Some(strategy) => {
                let context = ConcurrencyContext {
                    flow_id: flow_id.to_string(),
                    active_tasks: active,
                    ready_tasks: ready,
                    base_concurrency: base,
                };
                strategy.calculate_concurrency(&context).clamp(1, base)
            }
            None => base,
        }
    }
}

fn invalid_state(record: &FlowRecord, op: &'static str) -> FlowError {
    FlowError::InvalidState {
        flow_id: record.flow.id.clone(),
        status: record.flow.status,
        op,
    }
}

impl ExecutionEngineBuilder {
    pub fn new(planner: Arc<dyn PlanGenerator>) -> Self {
        Self {
            config: EngineConfig::default(),
            orchestrator: Orchestrator::new(),
            planner,
            follow_ups: Arc::new(NoFollowUps),
            concurrency_strategy: None,
            emitter: Arc::new(NoopEmitter),
            progress: None,
            snapshots: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn orchestrator(mut self, orchestrator: Orchestrator) -> Self {
        self.orchestrator = orchestrator;
        self
    }

    pub fn follow_ups(mut self, hook: Arc<dyn FollowUpHook>) -> Self {
        self.follow_ups = hook;
        self
    }

    pub fn concurrency_strategy(mut self, strategy: Arc<dyn ConcurrencyStrategyPlugin>) -> Self {
        self.concurrency_strategy = Some(strategy);
        self
    }

    pub fn emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitter = emitter;
        self
    }

    pub fn progress(mut self, tracker: Arc<dyn ProgressTracker>) -> Self {
        self.progress = Some(tracker);
        self
    }

    pub fn snapshots(mut self, manager: Arc<SnapshotManager>) -> Self {
        self.snapshots = Some(manager);
        self
    }

    /// The engine's task deadline overrides whatever the orchestrator carried.
    pub fn build(self) -> ExecutionEngine {
        let mut orchestrator = self.orchestrator;
        orchestrator.set_task_timeout(self.config.task_timeout());

        ExecutionEngine {
            inner: Arc::new(EngineInner {
                config: self.config,
                orchestrator,
                planner: self.planner,
                follow_ups: self.follow_ups,
                concurrency_strategy: self.concurrency_strategy,
                emitter: self.emitter,
                progress: self.progress,
                snapshots: self.snapshots,
            }),
        }
    }
}
