//! Control surface for flows: start, inspect, pause, resume, stop, restore.

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::FlowError;
use crate::executor::types::Flow;
use crate::executor::ExecutionEngine;
use crate::state::{FlowHandle, FlowRecord, FlowRegistry, FlowSnapshot};

/// Owns the flow registry and the engine. Cheap to clone.
#[derive(Clone)]
pub struct FlowService {
    engine: ExecutionEngine,
    registry: FlowRegistry,
}

impl FlowService {
    pub fn new(engine: ExecutionEngine) -> Self {
        Self::with_registry(engine, FlowRegistry::new())
    }

    pub fn with_registry(engine: ExecutionEngine, registry: FlowRegistry) -> Self {
        Self { engine, registry }
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    pub fn registry(&self) -> &FlowRegistry {
        &self.registry
    }

    /// Create a flow and start planning it. Returns as soon as the flow is
    /// registered; planning and execution continue in the background.
    pub async fn start_flow(
        &self,
        project_id: impl Into<String>,
        requirements: impl Into<String>,
    ) -> Flow {
        let flow = Flow::new(project_id, requirements);
        let handle = FlowHandle::new(FlowRecord::new(flow));
        self.registry.insert(handle.clone()).await;
        self.engine.launch(handle).await
    }

    async fn handle(&self, flow_id: &str) -> Result<Arc<FlowHandle>, FlowError> {
        self.registry
            .get(flow_id)
            .await
            .ok_or_else(|| FlowError::NotFound(flow_id.to_string()))
    }

    pub async fn get_flow(&self, flow_id: &str) -> Result<Flow, FlowError> {
        Ok(self.handle(flow_id).await?.flow())
    }

    pub async fn get_snapshot(&self, flow_id: &str) -> Result<FlowSnapshot, FlowError> {
        Ok(self.handle(flow_id).await?.snapshot())
    }

    pub async fn pause_flow(&self, flow_id: &str) -> Result<Flow, FlowError> {
        let handle = self.handle(flow_id).await?;
        no_op_on_invalid_state(&handle, self.engine.try_pause(&handle).await)
    }

    pub async fn resume_flow(&self, flow_id: &str) -> Result<Flow, FlowError> {
        let handle = self.handle(flow_id).await?;
        no_op_on_invalid_state(&handle, self.engine.try_resume(&handle).await)
    }

    pub async fn stop_flow(&self, flow_id: &str) -> Result<Flow, FlowError> {
        let handle = self.handle(flow_id).await?;
        no_op_on_invalid_state(&handle, self.engine.try_stop(&handle).await)
    }

    pub async fn subscribe(&self, flow_id: &str) -> Result<watch::Receiver<FlowSnapshot>, FlowError> {
        Ok(self.handle(flow_id).await?.subscribe())
    }

    /// Wait for the first published snapshot matching `pred` (the current one
    /// included).
    pub async fn wait_until<F>(&self, flow_id: &str, pred: F) -> Result<FlowSnapshot, FlowError>
    where
        F: Fn(&FlowSnapshot) -> bool,
    {
        let handle = self.handle(flow_id).await?;
        let mut rx = handle.subscribe();
        loop {
            {
                let current = rx.borrow_and_update();
                if pred(&*current) {
                    return Ok((*current).clone());
                }
            }
            if rx.changed().await.is_err() {
                return Ok(handle.snapshot());
            }
        }
    }

    pub async fn wait_for_terminal(&self, flow_id: &str) -> Result<FlowSnapshot, FlowError> {
        self.wait_until(flow_id, |s| s.flow.status.is_terminal())
            .await
    }

    /// All registered flows, oldest first.
    pub async fn list_flows(&self) -> Vec<Flow> {
        let mut flows: Vec<Flow> = self
            .registry
            .list()
            .await
            .iter()
            .map(|h| h.flow())
            .collect();
        flows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        flows
    }

    /// Register a checkpointed flow and continue it from where it stopped.
    pub async fn restore_flow(&self, snapshot: FlowSnapshot) -> Result<Flow, FlowError> {
        let flow_id = snapshot.flow.id.clone();
        let record = FlowRecord::from_snapshot(snapshot)?;
        let status = record.flow.status;
        let tasks = record.graph.len();
        let handle = FlowHandle::new(record);
        if !self.registry.insert_new(handle.clone()).await {
            return Err(FlowError::Snapshot(format!(
                "flow {flow_id} is already registered"
            )));
        }
        tracing::info!(
            target: "flowpilot.service",
            flow_id = %flow_id,
            status = %status,
            tasks,
            "restoring flow"
        );
        Ok(self.engine.adopt(handle).await)
    }

    /// Drop terminal flows from the registry.
    pub async fn prune_finished(&self) -> usize {
        self.registry.prune_terminal().await
    }

    /// Stop every live flow and flush pending events.
    pub async fn shutdown(&self) {
        for handle in self.registry.list().await {
            if handle.flow().status.is_terminal() {
                continue;
            }
            if let Err(e) = self.engine.try_stop(&handle).await {
                tracing::debug!(target: "flowpilot.service", flow_id = %handle.id(), error = %e);
            }
        }
        self.engine.flush_events().await;
        tracing::info!(target: "flowpilot.service", "flow service shut down");
    }
}

fn no_op_on_invalid_state(
    handle: &FlowHandle,
    result: Result<Flow, FlowError>,
) -> Result<Flow, FlowError> {
    match result {
        Err(FlowError::InvalidState { op, status, .. }) => {
            tracing::debug!(
                target: "flowpilot.service",
                flow_id = %handle.id(),
                op,
                status = %status,
                "control call ignored"
            );
            Ok(handle.flow())
        }
        other => other,
    }
}
