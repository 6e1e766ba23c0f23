use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "flow.created")]
    FlowCreated,
    #[serde(rename = "flow.status_changed")]
    FlowStatusChanged,
    #[serde(rename = "flow.planned")]
    FlowPlanned,
    #[serde(rename = "flow.progress")]
    FlowProgress,
    #[serde(rename = "task.dispatched")]
    TaskDispatched,
    #[serde(rename = "task.completed")]
    TaskCompleted,
    #[serde(rename = "task.failed")]
    TaskFailed,
    #[serde(rename = "task.cancelled")]
    TaskCancelled,
    #[serde(rename = "task.skipped")]
    TaskSkipped,
    #[serde(rename = "task.appended")]
    TaskAppended,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FlowCreated => "flow.created",
            Self::FlowStatusChanged => "flow.status_changed",
            Self::FlowPlanned => "flow.planned",
            Self::FlowProgress => "flow.progress",
            Self::TaskDispatched => "task.dispatched",
            Self::TaskCompleted => "task.completed",
            Self::TaskFailed => "task.failed",
            Self::TaskCancelled => "task.cancelled",
            Self::TaskSkipped => "task.skipped",
            Self::TaskAppended => "task.appended",
        }
    }
}

/// One state-change notification, serialized as a single JSONL line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub flow_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub payload: Value,
}

impl EventEnvelope {
    pub fn flow(event_type: EventType, flow_id: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type,
            flow_id: flow_id.into(),
            task_id: None,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn task(
        event_type: EventType,
        flow_id: impl Into<String>,
        task_id: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            task_id: Some(task_id.into()),
            ..Self::flow(event_type, flow_id, payload)
        }
    }

    pub fn to_line(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape() {
        let ev = EventEnvelope::task(EventType::TaskFailed, "f1", "t1", json!({"kind": "timeout"}));
        let v: Value = serde_json::from_str(&ev.to_line().unwrap()).unwrap();
        assert_eq!(v["type"], "task.failed");
        assert_eq!(v["flow_id"], "f1");
        assert_eq!(v["task_id"], "t1");
        assert_eq!(v["payload"]["kind"], "timeout");

        let flow_ev = EventEnvelope::flow(EventType::FlowCreated, "f1", Value::Null);
        assert!(!flow_ev.to_line().unwrap().contains("task_id"));
    }
}
