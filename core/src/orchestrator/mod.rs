//! Backend routing for ready tasks.
//!
//! The orchestrator picks a [`TaskBackend`] by task type, runs it on its own
//! tokio task and folds every way a backend can end (outcome, error, panic,
//! deadline, cancellation) into a single [`Outcome`].

mod matcher;
mod stub;

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::executor::traits::{RetryStrategyPlugin, TaskBackend};
use crate::executor::types::{Outcome, OutcomeStatus, Task, TaskError, TaskErrorKind};

pub use matcher::TaskTypeMatcher;
pub use stub::{PlaceholderBackend, UnavailableBackend};

type Predicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

struct Route {
    name: String,
    predicate: Predicate,
    backend: Arc<dyn TaskBackend>,
}

/// Routes tasks to backends. Predicates are tried in registration order and the
/// first match wins; the default route catches everything else.
#[derive(Default)]
pub struct Orchestrator {
    routes: Vec<Route>,
    default_route: Option<Route>,
    task_timeout: Option<Duration>,
    retry_strategy: Option<Arc<dyn RetryStrategyPlugin>>,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn set_task_timeout(&mut self, timeout: Option<Duration>) {
        self.task_timeout = timeout;
    }

    pub fn task_timeout(&self) -> Option<Duration> {
        self.task_timeout
    }

    pub fn with_retry_strategy(mut self, strategy: Arc<dyn RetryStrategyPlugin>) -> Self {
        self.retry_strategy = Some(strategy);
        self
    }

    pub fn register<F>(
        &mut self,
        name: impl Into<String>,
        predicate: F,
        backend: Arc<dyn TaskBackend>,
    ) -> &mut Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        let route = make_route(name.into(), Arc::new(predicate), backend);
        self.routes.push(route);
        self
    }

    pub fn register_matcher(
        &mut self,
        name: impl Into<String>,
        matchers: Vec<TaskTypeMatcher>,
        backend: Arc<dyn TaskBackend>,
    ) -> &mut Self {
        self.register(
            name,
            move |task_type| matchers.iter().any(|m| m.matches(task_type)),
            backend,
        )
    }

    /// Install the catch-all route. A later call replaces the earlier default.
    pub fn register_default(
        &mut self,
        name: impl Into<String>,
        backend: Arc<dyn TaskBackend>,
    ) -> &mut Self {
        self.default_route = Some(make_route(name.into(), Arc::new(|_: &str| true), backend));
        self
    }

    pub fn route_names(&self) -> Vec<&str> {
        self.routes
            .iter()
            .chain(self.default_route.as_ref())
            .map(|r| r.name.as_str())
            .collect()
    }

    /// Backend name chosen for a task type, if any.
    pub fn resolve(&self, task_type: &str) -> Option<&str> {
        self.route_for(task_type).map(|r| r.name.as_str())
    }

    fn route_for(&self, task_type: &str) -> Option<&Route> {
        self.routes
            .iter()
            .find(|r| (r.predicate)(task_type))
            .or(self.default_route.as_ref())
    }

    /// Start a task on its backend. Never fails: routing gaps, backend errors and
    /// panics all come back through [`DispatchHandle::wait`] as a failed outcome.
    pub fn dispatch(&self, task: &Task, token: CancellationToken) -> DispatchHandle {
        let Some(route) = self.route_for(&task.task_type) else {
            tracing::warn!(
                target: "flowpilot.orchestrator",
                task_id = %task.id,
                task_type = %task.task_type,
                "no backend registered for task type"
            );
            let message = format!("no backend for task type '{}'", task.task_type);
            return DispatchHandle {
                task_id: task.id.clone(),
                backend: String::new(),
                token,
                join: tokio::spawn(async move {
                    Outcome::failed(TaskErrorKind::BackendUnavailable, message)
                }),
            };
        };

        tracing::debug!(
            target: "flowpilot.orchestrator",
            task_id = %task.id,
            task_type = %task.task_type,
            backend = %route.name,
            "dispatch"
        );

        let attempt = Attempt {
            backend: route.backend.clone(),
            task: task.clone(),
            token: token.clone(),
            timeout: self.task_timeout,
            retry: self.retry_strategy.clone(),
        };

        DispatchHandle {
            task_id: task.id.clone(),
            backend: route.name.clone(),
            token,
            join: tokio::spawn(attempt.run()),
        }
    }
}

fn make_route(name: String, predicate: Predicate, backend: Arc<dyn TaskBackend>) -> Route {
    if backend.is_available() {
        return Route {
            name,
            predicate,
            backend,
        };
    }
    tracing::warn!(
        target: "flowpilot.orchestrator",
        backend = %name,
        "backend reports unavailable, routing its tasks to a stub"
    );
    let stub = UnavailableBackend::new(name.clone(), "backend reported unavailable");
    Route {
        name,
        predicate,
        backend: Arc::new(stub),
    }
}

/// An in-flight dispatch.
pub struct DispatchHandle {
    task_id: String,
    backend: String,
    token: CancellationToken,
    join: JoinHandle<Outcome>,
}

impl DispatchHandle {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Signal the backend to stop. The outcome still arrives through `wait`.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub async fn wait(self) -> Outcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Outcome::failed(
                TaskErrorKind::Executor,
                format!("dispatch panicked: {}", panic_message(e.into_panic())),
            ),
            Err(_) => Outcome::cancelled("dispatch aborted"),
        }
    }
}

struct Attempt {
    backend: Arc<dyn TaskBackend>,
    task: Task,
    token: CancellationToken,
    timeout: Option<Duration>,
    retry: Option<Arc<dyn RetryStrategyPlugin>>,
}

impl Attempt {
    async fn run(self) -> Outcome {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let outcome = self.once().await;

            if outcome.error_kind() != Some(TaskErrorKind::Executor) {
                return outcome.with_attempts(attempt);
            }
            let Some(retry) = self.retry.as_ref() else {
                return outcome.with_attempts(attempt);
            };

            let message = outcome
                .error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_default();
            if !retry.should_retry(attempt, &message) {
                return outcome.with_attempts(attempt);
            }
            let Some(delay) = retry.next_delay(attempt, &message) else {
                return outcome.with_attempts(attempt);
            };

            tracing::warn!(
                target: "flowpilot.orchestrator",
                task_id = %self.task.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                strategy = retry.name(),
                error.message = %message,
                "retrying task"
            );

            tokio::select! {
                _ = self.token.cancelled() => {
                    return Outcome::cancelled("cancelled while waiting to retry")
                        .with_attempts(attempt);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One backend call. The call runs on its own task so a panic is contained
    /// and so a timed-out or cancelled call can be left behind.
    async fn once(&self) -> Outcome {
        let backend = self.backend.clone();
        let task = self.task.clone();
        let token = self.token.clone();
        let mut join = tokio::spawn(async move { backend.execute(&task, token).await });

        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            joined = &mut join => match joined {
                Ok(Ok(outcome)) => normalize(outcome),
                Ok(Err(e)) => Outcome::from_error(
                    OutcomeStatus::Failed,
                    TaskError::new(TaskErrorKind::Executor, "backend returned an error")
                        .with_cause(format!("{e:#}")),
                ),
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic());
                    tracing::error!(
                        target: "flowpilot.orchestrator",
                        task_id = %self.task.id,
                        backend = self.backend.name(),
                        error.kind = "backend.panic",
                        error.message = %message
                    );
                    Outcome::failed(
                        TaskErrorKind::Executor,
                        format!("backend panicked: {message}"),
                    )
                }
                Err(_) => Outcome::cancelled("backend call aborted"),
            },
            _ = self.token.cancelled() => Outcome::cancelled("task cancelled"),
            _ = deadline => {
                self.token.cancel();
                self.backend.cancel(&self.task.id).await;
                let ms = timeout.map(|d| d.as_millis()).unwrap_or_default();
                tracing::warn!(
                    target: "flowpilot.orchestrator",
                    task_id = %self.task.id,
                    backend = self.backend.name(),
                    timeout_ms = ms as u64,
                    "task timed out"
                );
                Outcome::failed(TaskErrorKind::Timeout, format!("task exceeded {ms}ms"))
            }
        }
    }
}

/// Backends may return a failed or cancelled outcome without an error record.
fn normalize(mut outcome: Outcome) -> Outcome {
    if outcome.error.is_none() {
        match outcome.status {
            OutcomeStatus::Completed => {}
            OutcomeStatus::Failed => {
                outcome.error = Some(TaskError::new(
                    TaskErrorKind::Executor,
                    "backend reported failure",
                ));
            }
            OutcomeStatus::Cancelled => {
                outcome.error = Some(TaskError::new(TaskErrorKind::Cancelled, "task cancelled"));
            }
        }
    }
    outcome
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
