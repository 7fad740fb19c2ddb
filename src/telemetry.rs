//! Telemetry abstraction for transport events
//!
//! Provides a trait-based interface for publishing sequencer state transitions
//! to any transport mechanism (MQTT, HTTP, a log file, etc.)

use crate::sequencer::TransportState;
use crate::topology::{Direction, PodIndex};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One state transition of a transport request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub request_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub from_pod: PodIndex,
    pub to_pod: PodIndex,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    pub state: TransportState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransitionEvent {
    pub fn new(
        request_id: Uuid,
        from_pod: PodIndex,
        to_pod: PodIndex,
        direction: Option<Direction>,
        state: TransportState,
    ) -> Self {
        Self {
            request_id,
            timestamp: Utc::now(),
            from_pod,
            to_pod,
            direction,
            state,
            error: None,
        }
    }

    pub fn with_error(mut self, error: &crate::PodError) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

/// Trait for publishing transport telemetry
///
/// Publishing failures are logged by the sequencer and never abort a transport.
#[async_trait]
pub trait TelemetryPublisher: Send + Sync {
    async fn publish_transition(&self, event: &TransitionEvent) -> anyhow::Result<()>;
}

/// Discards all telemetry
#[derive(Debug, Clone)]
pub struct NoOpTelemetry;

#[async_trait]
impl TelemetryPublisher for NoOpTelemetry {
    async fn publish_transition(&self, _event: &TransitionEvent) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Prints every event to stdout as JSON
#[derive(Debug, Clone)]
pub struct ConsoleTelemetry {
    pub pretty_print: bool,
}

impl ConsoleTelemetry {
    pub fn new() -> Self {
        Self { pretty_print: false }
    }

    pub fn pretty() -> Self {
        Self { pretty_print: true }
    }

    fn render(&self, event: &TransitionEvent) -> anyhow::Result<String> {
        Ok(if self.pretty_print {
            serde_json::to_string_pretty(event)?
        } else {
            serde_json::to_string(event)?
        })
    }
}

impl Default for ConsoleTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetryPublisher for ConsoleTelemetry {
    async fn publish_transition(&self, event: &TransitionEvent) -> anyhow::Result<()> {
        println!("[TRANSPORT] {}", self.render(event)?);
        Ok(())
    }
}
