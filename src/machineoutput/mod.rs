//! Machine-readable output events
//!
//! Structured, timestamped JSON events emitted on stdout when the caller is
//! in machine mode. Human-oriented logging goes through `tracing` and is
//! kept off stdout so the JSON stream stays parseable.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MachineEvent {
    Success { timestamp: String, message: String },
    Error { timestamp: String, message: String },
}

/// Event sink writing one JSON object per line to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct MachineEventClient;

impl MachineEventClient {
    pub fn new() -> Self {
        Self
    }

    pub fn report_success(&self, message: &str, at: DateTime<Utc>) {
        self.emit(&MachineEvent::Success {
            timestamp: format_timestamp(at),
            message: message.to_string(),
        });
    }

    pub fn report_error(&self, err: &anyhow::Error, at: DateTime<Utc>) {
        self.emit(&MachineEvent::Error {
            timestamp: format_timestamp(at),
            message: format!("{:#}", err),
        });
    }

    fn emit(&self, event: &MachineEvent) {
        match serde_json::to_string(event) {
            Ok(line) => println!("{}", line),
            Err(e) => tracing::error!(error = %e, "failed to serialize machine event"),
        }
    }
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_event_shape() {
        let event = MachineEvent::Error {
            timestamp: format_timestamp(Utc::now()),
            message: "push failed".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"error\""), "{}", json);
        assert!(json.contains("push failed"), "{}", json);

        let parsed: MachineEvent = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, MachineEvent::Error { .. }));
    }
}
