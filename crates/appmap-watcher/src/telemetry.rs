//! `tracing`-backed telemetry sink.

use appmap_core::{Telemetry, TelemetryEvent};

/// Emits every telemetry event as a structured `tracing` record on the
/// `appmap::telemetry` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn send(&self, event: TelemetryEvent) {
        let name = event.name();
        let payload = serde_json::to_string(&event).unwrap_or_default();
        match &event {
            TelemetryEvent::TickFailed { root, error } => {
                tracing::warn!(target: "appmap::telemetry", event = name, root = %root.display(), %error, "tick failed");
            }
            _ => {
                tracing::info!(target: "appmap::telemetry", event = name, %payload);
            }
        }
    }
}
