use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::events_out::EventsOutTx;

use super::envelope::EventEnvelope;

/// 事件发射器：引擎在每次状态变化时调用
///
/// `emit` is called while the flow lock is held and must not block.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    fn emit(&self, event: EventEnvelope);

    /// Wait for queued events to reach their sink.
    async fn flush(&self) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEmitter;

impl EventEmitter for NoopEmitter {
    fn emit(&self, _event: EventEnvelope) {}
}

/// In-process fan-out to any number of subscribers. Slow subscribers lag
/// rather than block the engine.
#[derive(Debug, Clone)]
pub struct BroadcastEmitter {
    tx: broadcast::Sender<EventEnvelope>,
}

impl BroadcastEmitter {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }
}

impl EventEmitter for BroadcastEmitter {
    fn emit(&self, event: EventEnvelope) {
        // no receivers is fine
        let _ = self.tx.send(event);
    }
}

/// Writes each event as one JSON line through the events_out sink.
#[derive(Clone)]
pub struct JsonlEmitter {
    out: EventsOutTx,
}

impl JsonlEmitter {
    pub fn new(out: EventsOutTx) -> Self {
        Self { out }
    }

    pub fn dropped_count(&self) -> u64 {
        self.out.dropped_count()
    }
}

#[async_trait]
impl EventEmitter for JsonlEmitter {
    fn emit(&self, event: EventEnvelope) {
        if let Some(line) = event.to_line() {
            self.out.try_send_line(line);
        }
    }

    async fn flush(&self) {
        self.out.flush().await;
    }
}

#[derive(Clone, Default)]
pub struct FanoutEmitter {
    emitters: Vec<Arc<dyn EventEmitter>>,
}

impl FanoutEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.emitters.push(emitter);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }
}

#[async_trait]
impl EventEmitter for FanoutEmitter {
    fn emit(&self, event: EventEnvelope) {
        if let Some((last, rest)) = self.emitters.split_last() {
            for emitter in rest {
                emitter.emit(event.clone());
            }
            last.emit(event);
        }
    }

    async fn flush(&self) {
        for emitter in &self.emitters {
            emitter.flush().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventType;
    use serde_json::Value;

    #[tokio::test]
    async fn test_fanout_reaches_every_subscriber() {
        let a = BroadcastEmitter::new(8);
        let b = BroadcastEmitter::new(8);
        let mut rx_a = a.subscribe();
        let mut rx_b = b.subscribe();

        let fanout = FanoutEmitter::new()
            .with(Arc::new(a))
            .with(Arc::new(NoopEmitter))
            .with(Arc::new(b));
        fanout.emit(EventEnvelope::flow(EventType::FlowCreated, "f", Value::Null));
        fanout.flush().await;

        assert_eq!(rx_a.recv().await.unwrap().event_type, EventType::FlowCreated);
        assert_eq!(rx_b.recv().await.unwrap().flow_id, "f");
    }
}
