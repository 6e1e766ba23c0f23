use std::collections::HashMap;

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::executor::types::Outcome;
use crate::orchestrator::DispatchHandle;

/// A finished dispatch.
#[derive(Debug)]
pub struct Completion {
    pub task_id: String,
    pub outcome: Outcome,
}

/// Dispatches started by one flow driver that have not reported back yet.
///
/// Owned by the driver task only, so it needs no lock. Completions come back in
/// whatever order the backends finish.
#[derive(Default)]
pub struct InFlight {
    futs: FuturesUnordered<BoxFuture<'static, Completion>>,
    tokens: HashMap<String, CancellationToken>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.tokens.contains_key(task_id)
    }

    pub fn push(&mut self, handle: DispatchHandle) {
        let task_id = handle.task_id().to_string();
        self.tokens.insert(task_id.clone(), handle.token().clone());
        self.futs.push(
            async move {
                let outcome = handle.wait().await;
                Completion { task_id, outcome }
            }
            .boxed(),
        );
    }

    /// Wait for any dispatch to finish. Pending forever when empty, so it can sit
    /// in a `select!` next to a wakeup.
    pub async fn next(&mut self) -> Completion {
        match self.futs.next().await {
            Some(done) => {
                self.tokens.remove(&done.task_id);
                done
            }
            None => std::future::pending().await,
        }
    }

    /// Signal cancellation to every in-flight backend. Outcomes still arrive
    /// through [`InFlight::next`].
    pub fn cancel_all(&self) {
        for token in self.tokens.values() {
            token.cancel();
        }
    }
}
