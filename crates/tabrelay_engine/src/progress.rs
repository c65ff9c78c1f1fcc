use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tabrelay_core::{Action, Params};
use tabrelay_logging::{relay_debug, relay_warn};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::correlator::Correlator;
use crate::store::{utc_clock, Clock, IncrementalStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event_type: String,
    pub platform: String,
    pub timestamp: String,
    pub elapsed_seconds: f64,
    pub data: Value,
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: &ProgressEvent);
}

pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: &ProgressEvent) {
        let _ = self.tx.send(event.clone());
    }
}

/// Forwards each event to the agent as a fire-and-forget `progress_update` command.
pub struct AgentProgressSink {
    correlator: Arc<Correlator>,
}

impl AgentProgressSink {
    pub fn new(correlator: Arc<Correlator>) -> Self {
        Self { correlator }
    }
}

impl ProgressSink for AgentProgressSink {
    fn emit(&self, event: &ProgressEvent) {
        let mut params = Params::new();
        params.insert("event".into(), json!(event));
        if let Err(err) = self.correlator.notify(Action::ProgressUpdate, params) {
            relay_debug!("Progress update not forwarded: {err}");
        }
    }
}

/// Records progress events into the run's result file.
pub struct StoreProgressSink {
    store: Arc<IncrementalStore>,
}

impl StoreProgressSink {
    pub fn new(store: Arc<IncrementalStore>) -> Self {
        Self { store }
    }
}

impl ProgressSink for StoreProgressSink {
    fn emit(&self, event: &ProgressEvent) {
        let data = json!({
            "event_type": event.event_type,
            "elapsed_seconds": event.elapsed_seconds,
            "data": event.data,
        });
        if let Err(err) = self.store.append_progress(data) {
            relay_warn!("Recording progress failed: {err}");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub platform: String,
    pub duration_seconds: f64,
    pub total_events: usize,
    pub events_by_type: BTreeMap<String, usize>,
}

/// Ordered log of one run's progress events, fanned out to the attached sinks.
pub struct ProgressTracker {
    platform: String,
    started: Instant,
    events: Vec<ProgressEvent>,
    sinks: Vec<Arc<dyn ProgressSink>>,
    clock: Clock,
}

impl ProgressTracker {
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            started: Instant::now(),
            events: Vec::new(),
            sinks: Vec::new(),
            clock: utc_clock(),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn emit(&mut self, event_type: &str, data: Value) {
        let event = ProgressEvent {
            event_type: event_type.to_string(),
            platform: self.platform.clone(),
            timestamp: (self.clock)(),
            elapsed_seconds: self.started.elapsed().as_secs_f64(),
            data,
        };
        relay_debug!("[{}] {}: {}", self.platform, event.event_type, event.data);
        for sink in &self.sinks {
            sink.emit(&event);
        }
        self.events.push(event);
    }

    pub fn events(&self) -> &[ProgressEvent] {
        &self.events
    }

    pub fn summary(&self) -> ProgressSummary {
        let mut events_by_type = BTreeMap::new();
        for event in &self.events {
            *events_by_type.entry(event.event_type.clone()).or_insert(0) += 1;
        }
        ProgressSummary {
            platform: self.platform.clone(),
            duration_seconds: self.started.elapsed().as_secs_f64(),
            total_events: self.events.len(),
            events_by_type,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_sinks_in_order_and_are_summarised() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut tracker =
            ProgressTracker::new("duckduckgo").with_sink(Arc::new(ChannelProgressSink::new(tx)));

        tracker.emit("task_start", json!({"query": "rust"}));
        tracker.emit("items_collected", json!({"count": 10}));
        tracker.emit("items_collected", json!({"count": 20}));

        let received: Vec<String> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|event| event.event_type)
            .collect();
        assert_eq!(received, ["task_start", "items_collected", "items_collected"]);

        let summary = tracker.summary();
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.events_by_type["items_collected"], 2);
        assert_eq!(tracker.events()[0].platform, "duckduckgo");
    }
}
