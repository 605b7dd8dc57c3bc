use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::result::Level;

#[derive(Debug, Clone)]
pub enum RunEvent {
    Started {
        run_id: Uuid,
        at: DateTime<Utc>,
    },
    StageStarted {
        run_id: Uuid,
        stage: String,
        actions: usize,
    },
    ActionStarted {
        run_id: Uuid,
        action: String,
    },
    ActionFinished {
        run_id: Uuid,
        action: String,
        level: Level,
        duration: Duration,
    },
    ActionSkipped {
        run_id: Uuid,
        action: String,
        blocked_by: Vec<String>,
    },
    RollbackStarted {
        run_id: Uuid,
    },
    RollbackCompleted {
        run_id: Uuid,
        restored: usize,
        failures: usize,
    },
    Completed {
        run_id: Uuid,
        at: DateTime<Utc>,
        blocking: bool,
    },
    Failed {
        run_id: Uuid,
        error: String,
    },
}

/// Sink for run events.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: RunEvent);
}

/// Deliver one event to every sink, in registration order.
pub async fn broadcast(sinks: &[Arc<dyn EventSink>], event: RunEvent) {
    for sink in sinks {
        sink.emit(event.clone()).await;
    }
}

/// Channel-based event sink that forwards events to a receiver.
pub struct ChannelEventSink {
    tx: tokio::sync::mpsc::UnboundedSender<RunEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelEventSink {
    async fn emit(&self, event: RunEvent) {
        let _ = self.tx.send(event);
    }
}

/// Simple tracing-based event sink.
pub struct TracingEventSink;

#[async_trait]
impl EventSink for TracingEventSink {
    async fn emit(&self, event: RunEvent) {
        tracing::debug!(?event, "run_event");
    }
}
