//! Funnel analytics: page-level events (zip entry, lead capture, scans, deal
//! clicks, modal opens, hand-offs) and the sinks they are routed to.
//!
//! The controller holds an `Arc<dyn EventSink>`; hosts pick the sink.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use crate::types::{FunnelEvent, FunnelEventType};

pub trait EventSink: Send + Sync {
    fn emit(&self, event: FunnelEvent);
}

impl FunnelEvent {
    /// A bare event for `run_id`, stamped now.
    pub fn new(event_type: FunnelEventType, run_id: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type,
            run_id: run_id.into(),
            postal_code: None,
            item_id: None,
            source: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_postal_code(mut self, postal_code: Option<String>) -> Self {
        self.postal_code = postal_code;
        self
    }

    pub fn with_item(mut self, item_id: Option<String>) -> Self {
        self.item_id = item_id;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Drops everything.
pub struct NoOpSink;

impl EventSink for NoOpSink {
    fn emit(&self, _event: FunnelEvent) {}
}

/// One debug line per event, fields flattened for JSON log output.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: FunnelEvent) {
        tracing::debug!(
            event_type = ?event.event_type,
            run_id = %event.run_id,
            zip = ?event.postal_code,
            item_id = ?event.item_id,
            source = ?event.source,
            "Funnel event"
        );
    }
}

/// Keeps events in memory, in emission order.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<FunnelEvent>>,
}

impl CaptureSink {
    pub fn events(&self) -> Vec<FunnelEvent> {
        self.events.lock().expect("capture sink poisoned").clone()
    }

    pub fn count_type(&self, event_type: FunnelEventType) -> usize {
        self.events
            .lock()
            .expect("capture sink poisoned")
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }
}

impl EventSink for CaptureSink {
    fn emit(&self, event: FunnelEvent) {
        self.events.lock().expect("capture sink poisoned").push(event);
    }
}

pub fn noop_sink() -> Arc<dyn EventSink> {
    Arc::new(NoOpSink)
}

pub fn capture_sink() -> Arc<CaptureSink> {
    Arc::new(CaptureSink::default())
}
