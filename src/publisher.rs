//! Push updates for dashboard subscribers.
//!
//! The pipeline publishes through the `Publisher` trait and never learns
//! whether anyone is listening; delivery is best effort. The shipped
//! implementation fans out over a broadcast channel that the WebSocket
//! layer subscribes to.

use crate::record::{FlowRecord, ResponseRecord};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

/// Events pushed to subscribers. Serialized with an `event` discriminant so
/// dashboard clients can dispatch on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    NewFlow(FlowRecord),
    NewResponse(ResponseRecord),
    SystemStatus {
        state: String,
        message: String,
    },
    StatsUpdate(Value),
    ResponseExecuted {
        response_id: String,
        stage: u8,
        category: String,
        success: bool,
        duration_ms: u64,
        actions: Vec<String>,
    },
    BatchIngested {
        source: String,
        rows: usize,
        anomalies: usize,
    },
}

/// Sink for push events. Implementations must not fail the caller; a lost
/// update is acceptable, a stalled pipeline is not.
pub trait Publisher: Send + Sync {
    fn broadcast(&self, event: PushEvent);
}

/// Broadcast-channel publisher backing the WebSocket layer.
pub struct ChannelPublisher {
    tx: broadcast::Sender<PushEvent>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
        self.tx.subscribe()
    }
}

impl Publisher for ChannelPublisher {
    fn broadcast(&self, event: PushEvent) {
        // send() only errs when no receiver exists, which is fine here.
        if self.tx.send(event).is_err() {
            debug!("push event dropped, no subscribers connected");
        }
    }
}

/// Discards everything. Used in tests and headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPublisher;

impl Publisher for NullPublisher {
    fn broadcast(&self, _event: PushEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_carry_discriminant() {
        let event = PushEvent::SystemStatus {
            state: "running".to_string(),
            message: "pipeline started".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "system_status");
        assert_eq!(json["data"]["state"], "running");
    }

    #[tokio::test]
    async fn channel_publisher_fans_out() {
        let publisher = ChannelPublisher::new(16);
        let mut rx_a = publisher.subscribe();
        let mut rx_b = publisher.subscribe();

        publisher.broadcast(PushEvent::StatsUpdate(serde_json::json!({"total_events": 1})));

        for rx in [&mut rx_a, &mut rx_b] {
            match rx.recv().await.unwrap() {
                PushEvent::StatsUpdate(value) => assert_eq!(value["total_events"], 1),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[test]
    fn broadcast_without_subscribers_is_silent() {
        let publisher = ChannelPublisher::new(4);
        publisher.broadcast(PushEvent::SystemStatus {
            state: "stopped".to_string(),
            message: "no listeners".to_string(),
        });
    }
}
