//! Scan Event Logger
//!
//! Lifecycle events of a scan session (acquisition, camera, dispatch, outcome)
//! written through `tracing` under the `scan_events` target.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum ScanTraceEvent {
    ImageAcquired {
        source: String,
        bytes: usize,
    },
    CameraOpened {
        camera_id: String,
    },
    CameraClosed {
        camera_id: String,
    },
    DispatchStarted {
        request_id: u64,
        mode: String,
        transport: String,
    },
    Outcome {
        request_id: u64,
        outcome: String,
    },
    StaleOutcomeDiscarded {
        request_id: u64,
    },
    Reset,
    Error {
        error_msg: String,
    },
}

#[derive(Debug, Serialize)]
pub struct ScanEventLogEntry {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: ScanTraceEvent,
}

pub struct EventLogger;

impl EventLogger {
    /// Logs a scan event, scrubbing secrets from its free-form strings first.
    pub fn log_event(session_id: &str, event: ScanTraceEvent) {
        let entry = Self::entry(session_id, event);
        info!(target: "scan_events", event = ?entry, "Scan trace event");
    }

    fn entry(session_id: &str, mut event: ScanTraceEvent) -> ScanEventLogEntry {
        match &mut event {
            ScanTraceEvent::Outcome { outcome, .. } => {
                *outcome = redact_sensitive_data(outcome);
            }
            ScanTraceEvent::Error { error_msg } => {
                *error_msg = redact_sensitive_data(error_msg);
            }
            _ => {}
        }

        ScanEventLogEntry {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            event,
        }
    }
}
