use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScanError;

/// Untyped JSON returned by the analysis service. Nothing about its shape is assumed.
pub type RawResponse = serde_json::Value;

/// Name used when the service did not return a usable medication name.
pub const PLACEHOLDER_NAME: &str = "Unknown";

/// Where an acquired image came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ImageSource {
    /// Chosen from the local filesystem.
    File { path: PathBuf },
    /// Captured from a live camera session.
    Camera,
}

/// Encoded image bytes ready for transmission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Bytes,
    pub mime_type: String,
    /// File name announced in the multipart part.
    pub file_name: String,
}

impl ImagePayload {
    pub fn new(bytes: impl Into<Bytes>, mime_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            file_name: file_name.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Display-ready preview of an image, as a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewHandle(String);

impl PreviewHandle {
    pub fn new(data_url: impl Into<String>) -> Self {
        Self(data_url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The image currently pending analysis, with its preview.
#[derive(Debug, Clone)]
pub struct AcquiredImage {
    pub id: Uuid,
    pub source: ImageSource,
    pub payload: ImagePayload,
    pub preview: PreviewHandle,
    pub acquired_at: DateTime<Utc>,
}

impl AcquiredImage {
    pub fn new(source: ImageSource, payload: ImagePayload, preview: PreviewHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            payload,
            preview,
            acquired_at: Utc::now(),
        }
    }
}

/// What a single dispatch sends to the analysis endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchRequest {
    /// Upload a locally acquired image.
    Upload(ImagePayload),
    /// Ask the service to capture the image itself; no body is sent.
    ServerCapture,
}

impl DispatchRequest {
    pub fn has_payload(&self) -> bool {
        matches!(self, Self::Upload(_))
    }

    pub fn mode(&self) -> &'static str {
        match self {
            Self::Upload(_) => "upload",
            Self::ServerCapture => "server_capture",
        }
    }
}

/// Monotonically increasing identifier tagging one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle of one transfer.
///
/// `Idle → InFlight → (Succeeded | Failed)`. Progress inside `InFlight` only
/// moves forward and stays `None` when no payload is uploaded.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TransferState {
    #[default]
    Idle,
    InFlight { progress: Option<u8> },
    Succeeded(RawResponse),
    Failed(ScanError),
}

impl TransferState {
    pub fn in_flight() -> Self {
        Self::InFlight { progress: None }
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded(_) | Self::Failed(_))
    }

    /// Upload progress while in flight. Terminal states carry none, so a
    /// server capture that never reported progress does not gain a value.
    pub fn progress(&self) -> Option<u8> {
        match self {
            Self::InFlight { progress } => *progress,
            _ => None,
        }
    }

    /// Apply a progress update. Returns false when the update was ignored
    /// because the transfer is not in flight or the value would move backwards.
    pub fn advance(&mut self, percent: u8) -> bool {
        let percent = percent.min(100);
        match self {
            Self::InFlight { progress } => match progress {
                Some(current) if percent < *current => false,
                _ => {
                    *progress = Some(percent);
                    true
                }
            },
            _ => false,
        }
    }
}

/// Normalized description of a medication label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub name: String,
    pub generic_name: String,
    pub dosage: String,
    pub frequency: String,
    pub instructions: Vec<String>,
    pub warnings: Vec<String>,
    pub side_effects: Vec<String>,
    pub plain_language_summary: String,
}

impl Default for AnalysisRecord {
    fn default() -> Self {
        Self {
            name: PLACEHOLDER_NAME.to_string(),
            generic_name: String::new(),
            dosage: String::new(),
            frequency: String::new(),
            instructions: Vec::new(),
            warnings: Vec::new(),
            side_effects: Vec::new(),
            plain_language_summary: String::new(),
        }
    }
}

impl AnalysisRecord {
    pub fn has_placeholder_name(&self) -> bool {
        self.name == PLACEHOLDER_NAME
    }
}

/// Coarse phase of the acquisition flow, used in messages and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    Empty,
    CameraActive,
    ImageSelected,
    Analyzing,
    ResultReady,
    Error,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Empty => "empty",
            Self::CameraActive => "camera active",
            Self::ImageSelected => "image selected",
            Self::Analyzing => "analyzing",
            Self::ResultReady => "result ready",
            Self::Error => "in error",
        };
        f.write_str(s)
    }
}
