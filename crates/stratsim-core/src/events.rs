//! Per-run ordered event log with fan-out to sinks.
//!
//! Event ids are assigned under a lock so each run's stream is gapless and
//! strictly increasing from 0. Sinks are called after the lock is released,
//! so a slow sink never blocks id assignment.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::domain::{EventType, RunEvent};
use crate::metrics::METRICS;

/// Receives every emitted event. Delivery is fire-and-forget.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &RunEvent);
}

/// Severity carried in `log` event payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Default)]
pub struct EventEmitter {
    logs: Mutex<HashMap<String, Vec<RunEvent>>>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Append an event to `run_id`'s log and deliver it to every sink.
    pub fn emit(&self, run_id: &str, event_type: EventType, payload: Value) -> RunEvent {
        let event = {
            let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
            let log = logs.entry(run_id.to_string()).or_default();
            let event = RunEvent {
                event_id: log.len() as u64,
                run_id: run_id.to_string(),
                timestamp: Utc::now(),
                event_type,
                payload,
            };
            log.push(event.clone());
            event
        };

        METRICS.inc_events_emitted();
        for sink in &self.sinks {
            sink.publish(&event);
        }
        event
    }

    /// Emit a `log` event. `extra` object fields are merged into the payload.
    pub fn log(
        &self,
        run_id: &str,
        level: LogLevel,
        node: &str,
        message: &str,
        extra: Value,
    ) -> RunEvent {
        let mut payload = json!({
            "level": level.as_str(),
            "node": node,
            "message": message,
        });
        if let (Some(target), Value::Object(extra)) = (payload.as_object_mut(), extra) {
            for (k, v) in extra {
                target.entry(k).or_insert(v);
            }
        }
        self.emit(run_id, EventType::Log, payload)
    }

    /// Events of `run_id` with `event_id >= from`, in id order.
    pub fn events(&self, run_id: &str, from: u64) -> Vec<RunEvent> {
        let logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.get(run_id)
            .map(|log| log.iter().skip(from as usize).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of events emitted for `run_id`.
    pub fn count(&self, run_id: &str) -> u64 {
        let logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.get(run_id).map(|l| l.len() as u64).unwrap_or(0)
    }

    /// Drop a run's log. Later emits for the same id start again at 0.
    pub fn forget(&self, run_id: &str) {
        let mut logs = self.logs.lock().unwrap_or_else(PoisonError::into_inner);
        logs.remove(run_id);
    }
}

/// Live fan-out over a tokio broadcast channel.
///
/// Subscribers that fall behind by more than the channel capacity receive
/// `RecvError::Lagged` instead of stalling the emitter; they can catch up from
/// [`EventEmitter::events`].
pub struct BroadcastSink {
    tx: broadcast::Sender<RunEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.tx.subscribe()
    }
}

impl EventSink for BroadcastSink {
    fn publish(&self, event: &RunEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event.clone());
    }
}
