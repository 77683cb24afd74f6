//! Telemetry and structured logging for NutriLens.
//!
//! Handles log redaction, console/NDJSON output, and scan lifecycle event logging.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{EventLogger, ScanEventLogEntry, ScanTraceEvent};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;
