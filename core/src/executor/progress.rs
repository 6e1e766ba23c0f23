use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::events::{EventEmitter, EventEnvelope, EventType};
use crate::executor::types::TaskStatus;
use crate::state::FlowSnapshot;

/// Task counts for one flow at one snapshot version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowProgress {
    pub total: usize,
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
}

impl FlowProgress {
    pub fn from_snapshot(snapshot: &FlowSnapshot) -> Self {
        let mut progress = Self {
            total: snapshot.tasks.len(),
            ..Self::default()
        };
        for task in &snapshot.tasks {
            match task.status {
                TaskStatus::Pending => progress.pending += 1,
                TaskStatus::InProgress => progress.in_progress += 1,
                TaskStatus::Completed => progress.completed += 1,
                TaskStatus::Failed => progress.failed += 1,
                TaskStatus::Cancelled => progress.cancelled += 1,
                TaskStatus::Skipped => progress.skipped += 1,
            }
        }
        progress
    }

    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.cancelled + self.skipped
    }

    /// Share of tasks in a terminal status, 0..=100. The total can still grow
    /// through follow-ups, so this is not monotonic.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.finished() as f64 / self.total as f64) * 100.0
    }
}

/// 进度跟踪器：每次发布快照时调用
pub trait ProgressTracker: Send + Sync {
    fn on_snapshot(&self, snapshot: &FlowSnapshot);
}

/// Emits `flow.progress` whenever a flow's task counts change.
pub struct EventProgressTracker {
    emitter: Arc<dyn EventEmitter>,
    last: Mutex<HashMap<String, FlowProgress>>,
}

impl EventProgressTracker {
    pub fn new(emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            emitter,
            last: Mutex::new(HashMap::new()),
        }
    }
}

impl ProgressTracker for EventProgressTracker {
    fn on_snapshot(&self, snapshot: &FlowSnapshot) {
        let progress = FlowProgress::from_snapshot(snapshot);
        let flow_id = &snapshot.flow.id;

        {
            let Ok(mut last) = self.last.lock() else {
                return;
            };
            if snapshot.flow.status.is_terminal() {
                last.remove(flow_id);
            } else if last.get(flow_id) == Some(&progress) {
                return;
            } else {
                last.insert(flow_id.clone(), progress);
            }
        }

        self.emitter.emit(EventEnvelope::flow(
            EventType::FlowProgress,
            flow_id.clone(),
            serde_json::json!({
                "status": snapshot.flow.status,
                "percent": progress.percent(),
                "counts": progress,
            }),
        ));
    }
}

/// Tracker that fans out to several trackers.
#[derive(Default)]
pub struct ProgressFanout {
    trackers: Vec<Arc<dyn ProgressTracker>>,
}

impl ProgressFanout {
    pub fn new(trackers: Vec<Arc<dyn ProgressTracker>>) -> Self {
        Self { trackers }
    }
}

impl ProgressTracker for ProgressFanout {
    fn on_snapshot(&self, snapshot: &FlowSnapshot) {
        for tracker in &self.trackers {
            tracker.on_snapshot(snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::BroadcastEmitter;
    use crate::executor::types::{Flow, Task, TaskSpec};

    fn snapshot(statuses: &[TaskStatus]) -> FlowSnapshot {
        let flow = Flow::new("p", "r");
        let tasks = statuses
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let mut t = Task::from_spec(
                    &flow.id,
                    TaskSpec::new("t", "default").with_id(format!("t{i}")),
                    None,
                );
                t.status = *s;
                t
            })
            .collect();
        FlowSnapshot::new(1, flow, tasks)
    }

    #[test]
    fn test_percent() {
        let p = FlowProgress::from_snapshot(&snapshot(&[
            TaskStatus::Completed,
            TaskStatus::Skipped,
            TaskStatus::InProgress,
            TaskStatus::Pending,
        ]));
        assert_eq!(p.finished(), 2);
        assert_eq!(p.percent(), 50.0);
        assert_eq!(FlowProgress::default().percent(), 0.0);
    }

    #[tokio::test]
    async fn test_progress_event_only_on_change() {
        let emitter = BroadcastEmitter::new(16);
        let mut rx = emitter.subscribe();
        let tracker = EventProgressTracker::new(Arc::new(emitter));

        let snap = snapshot(&[TaskStatus::Completed, TaskStatus::Pending]);
        tracker.on_snapshot(&snap);
        tracker.on_snapshot(&snap);

        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.event_type, EventType::FlowProgress);
        assert_eq!(ev.payload["percent"], 50.0);
        assert!(rx.try_recv().is_err());
    }
}
