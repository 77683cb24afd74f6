use thiserror::Error;

use crate::types::ScanPhase;

/// Every failure the scanner can surface to its caller.
///
/// All variants carry human-readable text so the presentation layer can show
/// them verbatim. `Clone` because errors are stored in controller and transfer
/// state as well as returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("transport error{}: {message}", fmt_status(.status))]
    TransportError { status: Option<u16>, message: String },

    #[error("analysis response could not be parsed: {0}")]
    ResponseParseError(String),

    #[error("image file unreadable: {0}")]
    FileUnreadable(String),

    #[error("cannot {operation} while {phase}")]
    InvalidTransition {
        operation: &'static str,
        phase: ScanPhase,
    },
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl ScanError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::TransportError {
            status,
            message: message.into(),
        }
    }

    /// Whether the user can recover without resetting the flow.
    pub fn is_recoverable_in_place(&self) -> bool {
        matches!(self, Self::DeviceUnavailable(_) | Self::CaptureUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_includes_status_when_known() {
        let err = ScanError::transport(Some(502), "bad gateway");
        assert_eq!(err.to_string(), "transport error (HTTP 502): bad gateway");
    }

    #[test]
    fn transport_error_without_status() {
        let err = ScanError::transport(None, "connection refused");
        assert_eq!(err.to_string(), "transport error: connection refused");
    }

    #[test]
    fn invalid_transition_names_phase() {
        let err = ScanError::InvalidTransition {
            operation: "request analysis",
            phase: ScanPhase::Empty,
        };
        assert_eq!(err.to_string(), "cannot request analysis while empty");
    }
}
