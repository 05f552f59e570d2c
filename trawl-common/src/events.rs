//! Pipeline event types and the EventBus
//!
//! The orchestrator reports progress as events on a tokio broadcast channel.
//! Nobody is required to listen: a run without subscribers behaves exactly
//! like one with subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Ingest,
    Prefilter,
    LiteScore,
    AutoPick,
    FullEscalate,
    Compose,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Prefilter => "prefilter",
            Self::LiteScore => "lite_score",
            Self::AutoPick => "auto_pick",
            Self::FullEscalate => "full_escalate",
            Self::Compose => "compose",
        }
    }
}

/// Event emitted while a pipeline run progresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// Budget plan accepted, run is starting
    RunStarted {
        persona_id: String,
        planned_calls: u32,
        estimated_cost: f64,
        timestamp: DateTime<Utc>,
    },

    StageStarted {
        stage: Stage,
        timestamp: DateTime<Utc>,
    },

    /// `summary` is the human-readable stage statistics line
    StageFinished {
        stage: Stage,
        summary: String,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// One unit failed and was isolated; the run continues
    ItemFailed {
        stage: Stage,
        item_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Source fetch failed and was isolated
    SourceFailed {
        source_id: String,
        error: String,
        timestamp: DateTime<Utc>,
    },

    RunFinished {
        persona_id: String,
        draft_id: Option<uuid::Uuid>,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for pipeline events
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
    capacity: usize,
}

impl EventBus {
    /// `capacity` events are buffered before slow receivers start lagging
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: PipelineEvent,
    ) -> Result<usize, broadcast::error::SendError<PipelineEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: PipelineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(8);
        let event = PipelineEvent::StageStarted {
            stage: Stage::Prefilter,
            timestamp: Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        // Lossy emission never fails
        bus.emit_lossy(event);
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        bus.emit_lossy(PipelineEvent::StageStarted {
            stage: Stage::LiteScore,
            timestamp: Utc::now(),
        });
        bus.emit_lossy(PipelineEvent::ItemFailed {
            stage: Stage::LiteScore,
            item_id: "i-1".to_string(),
            error: "timeout".to_string(),
            timestamp: Utc::now(),
        });

        match rx.recv().await.unwrap() {
            PipelineEvent::StageStarted { stage, .. } => assert_eq!(stage, Stage::LiteScore),
            other => panic!("unexpected event: {:?}", other),
        }
        match rx.recv().await.unwrap() {
            PipelineEvent::ItemFailed { item_id, .. } => assert_eq!(item_id, "i-1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(PipelineEvent::StageFinished {
            stage: Stage::FullEscalate,
            summary: "ok".to_string(),
            elapsed_ms: 12,
            timestamp: Utc::now(),
        })
        .unwrap();
        assert_eq!(json["type"], "StageFinished");
        assert_eq!(json["stage"], "full_escalate");
    }
}
