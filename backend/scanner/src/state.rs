//! Controller state: phases, the pending image and dispatch outcomes.

use nutrilens_core::{
    AcquiredImage, AnalysisRecord, DispatchRequest, PreviewHandle, RawResponse, RequestId,
    ScanError, ScanPhase, TransferState,
};
use nutrilens_understanding::Diagnostic;

/// What the user gets to see once a dispatch finished successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Record(AnalysisRecord),
    /// The service answered but nothing usable could be extracted.
    Unrecognized(Diagnostic),
}

impl ScanOutcome {
    pub fn record(&self) -> Option<&AnalysisRecord> {
        match self {
            Self::Record(record) => Some(record),
            Self::Unrecognized(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScanState {
    #[default]
    Empty,
    CameraActive,
    ImageSelected,
    Analyzing {
        request_id: RequestId,
    },
    ResultReady(ScanOutcome),
    Error(ScanError),
}

impl ScanState {
    pub fn phase(&self) -> ScanPhase {
        match self {
            Self::Empty => ScanPhase::Empty,
            Self::CameraActive => ScanPhase::CameraActive,
            Self::ImageSelected => ScanPhase::ImageSelected,
            Self::Analyzing { .. } => ScanPhase::Analyzing,
            Self::ResultReady(_) => ScanPhase::ResultReady,
            Self::Error(_) => ScanPhase::Error,
        }
    }

    pub fn outcome(&self) -> Option<&ScanOutcome> {
        match self {
            Self::ResultReady(outcome) => Some(outcome),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ScanError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// The image waiting to be analyzed.
#[derive(Debug, Clone)]
pub enum PendingImage {
    Acquired(AcquiredImage),
    /// The service takes the photo itself; there is no local payload.
    ServerCapture,
}

impl PendingImage {
    pub fn preview(&self) -> Option<&PreviewHandle> {
        match self {
            Self::Acquired(image) => Some(&image.preview),
            Self::ServerCapture => None,
        }
    }

    pub fn to_request(&self) -> DispatchRequest {
        match self {
            Self::Acquired(image) => DispatchRequest::Upload(image.payload.clone()),
            Self::ServerCapture => DispatchRequest::ServerCapture,
        }
    }
}

/// Transfer state tagged with the request it belongs to.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TransferSnapshot {
    pub request_id: Option<RequestId>,
    pub state: TransferState,
}

/// Completion of one dispatch, delivered back to the controller.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub request_id: RequestId,
    pub result: Result<RawResponse, ScanError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutrilens_core::{ImagePayload, ImageSource};

    #[test]
    fn phases_follow_variants() {
        assert_eq!(ScanState::default().phase(), ScanPhase::Empty);
        assert_eq!(
            ScanState::Analyzing {
                request_id: RequestId(4)
            }
            .phase(),
            ScanPhase::Analyzing
        );
        let failed = ScanState::Error(ScanError::FileUnreadable("gone".into()));
        assert_eq!(failed.phase(), ScanPhase::Error);
        assert!(failed.error().is_some());
        assert!(failed.outcome().is_none());
    }

    #[test]
    fn server_capture_has_no_preview() {
        let pending = PendingImage::ServerCapture;
        assert!(pending.preview().is_none());
        assert_eq!(pending.to_request(), DispatchRequest::ServerCapture);
    }

    #[test]
    fn acquired_image_becomes_upload() {
        let payload = ImagePayload::new(vec![0xFFu8, 0xD8], "image/jpeg", "a.jpg");
        let image = AcquiredImage::new(
            ImageSource::Camera,
            payload.clone(),
            PreviewHandle::new("data:image/jpeg;base64,/9g="),
        );
        let pending = PendingImage::Acquired(image);
        assert_eq!(pending.to_request(), DispatchRequest::Upload(payload));
        assert!(pending.preview().is_some());
    }
}
