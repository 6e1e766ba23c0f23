//! Flow 注册表：flow id -> 句柄

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex, MutexGuard, Notify, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::GraphError;
use crate::executor::types::{Flow, FlowId, FlowStatus, Task};
use crate::executor::TaskGraph;

use super::snapshot::FlowSnapshot;
use super::transitions::{FlowTransition, TransitionError};

/// Mutable state of one flow. Only reachable through [`FlowHandle::lock`].
#[derive(Debug)]
pub struct FlowRecord {
    pub flow: Flow,
    pub graph: TaskGraph<Task>,
    /// A driver task is running (or about to run) for this flow.
    pub driver_active: bool,
    version: u64,
}

impl FlowRecord {
    pub fn new(flow: Flow) -> Self {
        Self {
            flow,
            graph: TaskGraph::default(),
            driver_active: false,
            version: 0,
        }
    }

    /// Rebuild from a checkpoint. Interrupted tasks go back to Pending.
    pub fn from_snapshot(snapshot: FlowSnapshot) -> Result<Self, GraphError> {
        let FlowSnapshot {
            version,
            mut flow,
            tasks,
            ..
        } = snapshot;

        let tasks: Vec<Task> = tasks
            .into_iter()
            .map(|mut t| {
                t.reset_interrupted();
                t
            })
            .collect();
        let mut graph = TaskGraph::from_tasks(tasks)?;
        graph.validate()?;
        flow.task_ids = graph.ids().to_vec();

        Ok(Self {
            flow,
            graph,
            driver_active: false,
            version,
        })
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn status(&self) -> FlowStatus {
        self.flow.status
    }

    /// Apply a validated status change and stamp the flow timestamps.
    pub fn transition(&mut self, to: FlowStatus) -> Result<FlowStatus, TransitionError> {
        let from = self.flow.status;
        FlowTransition::validate(from, to)?;
        self.flow.status = to;
        if to == FlowStatus::Running && self.flow.started_at.is_none() {
            self.flow.started_at = Some(Utc::now());
        }
        if to.is_terminal() {
            self.flow.completed_at = Some(Utc::now());
        }
        Ok(from)
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot::new(
            self.version,
            self.flow.clone(),
            self.graph.iter().cloned().collect(),
        )
    }
}

/// 单个 flow 的共享句柄
///
/// Writers take the record lock; readers go through the watch channel and
/// never contend with the driver.
pub struct FlowHandle {
    id: FlowId,
    record: Mutex<FlowRecord>,
    snapshot_tx: watch::Sender<FlowSnapshot>,
    wake: Notify,
    cancel: CancellationToken,
}

impl FlowHandle {
    pub fn new(record: FlowRecord) -> Arc<Self> {
        let (snapshot_tx, _) = watch::channel(record.snapshot());
        Arc::new(Self {
            id: record.flow.id.clone(),
            record: Mutex::new(record),
            snapshot_tx,
            wake: Notify::new(),
            cancel: CancellationToken::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn lock(&self) -> MutexGuard<'_, FlowRecord> {
        self.record.lock().await
    }

    /// Bump the version and publish a fresh snapshot. Call with the lock held.
    pub fn publish(&self, record: &mut FlowRecord) {
        record.version += 1;
        self.snapshot_tx.send_replace(record.snapshot());
    }

    /// Latest published snapshot (copy-on-read).
    pub fn snapshot(&self) -> FlowSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn flow(&self) -> Flow {
        self.snapshot_tx.borrow().flow.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FlowSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Wake the driver. A wakeup sent while the driver is busy is kept until
    /// it next waits.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    pub async fn notified(&self) {
        self.wake.notified().await;
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// 进程内 flow 注册表
#[derive(Clone, Default)]
pub struct FlowRegistry {
    flows: Arc<RwLock<HashMap<FlowId, Arc<FlowHandle>>>>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, handle: Arc<FlowHandle>) {
        self.flows
            .write()
            .await
            .insert(handle.id().to_string(), handle);
    }

    /// Insert unless the id is already registered. Returns false and keeps
    /// the existing handle when it is.
    pub async fn insert_new(&self, handle: Arc<FlowHandle>) -> bool {
        match self.flows.write().await.entry(handle.id().to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    pub async fn get(&self, flow_id: &str) -> Option<Arc<FlowHandle>> {
        self.flows.read().await.get(flow_id).cloned()
    }

    pub async fn contains(&self, flow_id: &str) -> bool {
        self.flows.read().await.contains_key(flow_id)
    }

    pub async fn list(&self) -> Vec<Arc<FlowHandle>> {
        self.flows.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.flows.read().await.len()
    }

    pub async fn remove(&self, flow_id: &str) -> Option<Arc<FlowHandle>> {
        self.flows.write().await.remove(flow_id)
    }

    /// Drop every terminal flow. Returns how many were removed.
    pub async fn prune_terminal(&self) -> usize {
        let mut flows = self.flows.write().await;
        let before = flows.len();
        flows.retain(|_, h| !h.flow().status.is_terminal());
        before - flows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::types::{TaskSpec, TaskStatus};

    fn record_with_tasks() -> FlowRecord {
        let flow = Flow::new("p", "req");
        let a = Task::from_spec(&flow.id, TaskSpec::new("a", "default").with_id("a"), None);
        let mut b = Task::from_spec(
            &flow.id,
            TaskSpec::new("b", "default").with_id("b").depends_on(["a"]),
            None,
        );
        b.mark_in_progress();
        let mut record = FlowRecord::new(flow);
        record.graph = TaskGraph::from_tasks(vec![a, b]).unwrap();
        record
    }

    #[tokio::test]
    async fn test_publish_bumps_version() {
        let handle = FlowHandle::new(FlowRecord::new(Flow::new("p", "r")));
        let mut rx = handle.subscribe();
        assert_eq!(handle.snapshot().version, 0);

        {
            let mut record = handle.lock().await;
            record.transition(FlowStatus::Planning).unwrap();
            handle.publish(&mut record);
        }

        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().version, 1);
        assert_eq!(handle.flow().status, FlowStatus::Planning);
    }

    #[test]
    fn test_transition_stamps_times() {
        let mut record = FlowRecord::new(Flow::new("p", "r"));
        assert!(record.transition(FlowStatus::Running).is_err());
        record.transition(FlowStatus::Planning).unwrap();
        record.transition(FlowStatus::Running).unwrap();
        assert!(record.flow.started_at.is_some());
        record.transition(FlowStatus::Completed).unwrap();
        assert!(record.flow.completed_at.is_some());
        assert!(record.transition(FlowStatus::Running).is_err());
    }

    #[test]
    fn test_from_snapshot_resets_interrupted_tasks() {
        let record = record_with_tasks();
        let snapshot = record.snapshot();
        assert_eq!(snapshot.task("b").unwrap().status, TaskStatus::InProgress);

        let restored = FlowRecord::from_snapshot(snapshot).unwrap();
        assert_eq!(restored.graph.get("b").unwrap().status, TaskStatus::Pending);
        assert_eq!(restored.flow.task_ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_prune_terminal() {
        let registry = FlowRegistry::new();
        let live = FlowHandle::new(FlowRecord::new(Flow::new("p", "live")));
        let mut done = FlowRecord::new(Flow::new("p", "done"));
        done.flow.status = FlowStatus::Completed;
        registry.insert(live.clone()).await;
        registry.insert(FlowHandle::new(done)).await;

        assert_eq!(registry.prune_terminal().await, 1);
        assert!(registry.contains(live.id()).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_insert_new_keeps_existing_handle() {
        let registry = FlowRegistry::new();
        let first = FlowHandle::new(FlowRecord::new(Flow::new("p", "r")));
        let mut dup = FlowRecord::new(Flow::new("p", "other"));
        dup.flow.id = first.id().to_string();
        let dup = FlowHandle::new(dup);

        assert!(registry.insert_new(first.clone()).await);
        assert!(!registry.insert_new(dup).await);
        let kept = registry.get(first.id()).await.unwrap();
        assert!(Arc::ptr_eq(&kept, &first));
        assert_eq!(registry.len().await, 1);
    }
}
