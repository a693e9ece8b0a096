//! Fire-and-forget telemetry seam.
//!
//! Sinks may fail; [`emit`] logs the failure at debug level and carries on.

use serde_json::Value;
use std::sync::{Arc, Mutex};

pub type SinkResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: &str, payload: &Value) -> SinkResult;
}

/// Send `event` to `sink`, swallowing any failure.
pub fn emit(sink: &dyn TelemetrySink, event: &str, payload: Value) {
    if let Err(e) = sink.emit(event, &payload) {
        tracing::debug!(event, error = %e, "telemetry sink failed");
    }
}

/// Drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn emit(&self, _event: &str, _payload: &Value) -> SinkResult {
        Ok(())
    }
}

/// Forwards events to `tracing` under the `canvas::telemetry` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: &str, payload: &Value) -> SinkResult {
        tracing::info!(target: "canvas::telemetry", event, %payload);
        Ok(())
    }
}

/// Keeps every event in memory. Handy for tests and for replaying a session.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(String, Value)> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|(name, _)| name == event).count()
    }
}

impl TelemetrySink for MemorySink {
    fn emit(&self, event: &str, payload: &Value) -> SinkResult {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((event.to_string(), payload.clone()));
        Ok(())
    }
}
