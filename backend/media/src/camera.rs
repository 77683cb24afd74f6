//! Camera session lifecycle.
//!
//! A [`CameraSessionManager`] owns at most one open [`CameraSession`]. The
//! session owns the device stream; closing it stops every track and is safe to
//! repeat. Dropping either the session or the manager closes the stream.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::RgbImage;
use nutrilens_core::ScanError;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Which way the requested camera faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FacingMode {
    /// Rear camera, pointed at the label.
    #[default]
    Environment,
    /// Front (selfie) camera.
    User,
}

/// What a caller asks of the capture device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    pub facing: FacingMode,
    pub audio: bool,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            audio: false,
        }
    }
}

/// Why a device could not be opened.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("permission to use the camera was denied ({0})")]
    PermissionDenied(String),

    #[error("no camera found ({0})")]
    NotFound(String),

    #[error("camera hardware error ({0})")]
    Hardware(String),
}

impl From<DeviceError> for ScanError {
    fn from(err: DeviceError) -> Self {
        ScanError::DeviceUnavailable(err.to_string())
    }
}

/// A live video stream handed out by a [`VideoDevice`].
pub trait VideoStream: Send {
    /// Native frame size, or `None` until the first frame has arrived.
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// The most recent decoded frame.
    fn latest_frame(&self) -> Option<RgbImage>;

    /// Stop every track and release the device. Must tolerate repeated calls.
    fn stop(&mut self);

    /// Whether the source stopped producing frames on its own.
    fn has_ended(&self) -> bool {
        false
    }
}

/// Something that can open a video stream.
#[async_trait]
pub trait VideoDevice: Send + Sync {
    fn name(&self) -> &str;

    async fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, DeviceError>;
}

/// An open (or already closed) device stream.
pub struct CameraSession {
    id: Uuid,
    opened_at: DateTime<Utc>,
    stream: Option<Box<dyn VideoStream>>,
}

impl CameraSession {
    pub fn new(stream: Box<dyn VideoStream>) -> Self {
        Self {
            id: Uuid::new_v4(),
            opened_at: Utc::now(),
            stream: Some(stream),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn opened_at(&self) -> DateTime<Utc> {
        self.opened_at
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    pub fn stream(&self) -> Option<&dyn VideoStream> {
        self.stream.as_deref()
    }

    /// Release the device. Closing a closed session does nothing.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            stream.stop();
            info!(session_id = %self.id, "Camera session closed");
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for CameraSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CameraSession")
            .field("id", &self.id)
            .field("opened_at", &self.opened_at)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Owns the single camera session of one acquisition flow.
pub struct CameraSessionManager {
    device: Arc<dyn VideoDevice>,
    constraints: StreamConstraints,
    session: Option<CameraSession>,
}

impl CameraSessionManager {
    pub fn new(device: Arc<dyn VideoDevice>) -> Self {
        Self {
            device,
            constraints: StreamConstraints::default(),
            session: None,
        }
    }

    pub fn with_constraints(mut self, constraints: StreamConstraints) -> Self {
        self.constraints = constraints;
        self
    }

    /// Open the rear camera. An already open session is returned as is.
    pub async fn open(&mut self) -> Result<&CameraSession, ScanError> {
        if self.is_open() {
            debug!("Camera session already open; reusing it");
        } else {
            let stream = self.device.open(&self.constraints).await.map_err(|e| {
                warn!(device = self.device.name(), error = %e, "Failed to open camera");
                ScanError::from(e)
            })?;
            let session = CameraSession::new(stream);
            info!(session_id = %session.id(), device = self.device.name(), "Camera session opened");
            self.session = Some(session);
        }
        self.session
            .as_ref()
            .ok_or_else(|| ScanError::DeviceUnavailable("camera session was not retained".into()))
    }

    /// Close the current session, if any. Returns whether a live stream was released.
    pub fn close(&mut self) -> bool {
        match self.session.take() {
            Some(mut session) => {
                let was_open = session.is_open();
                session.close();
                was_open
            }
            None => false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.as_ref().is_some_and(CameraSession::is_open)
    }

    pub fn session(&self) -> Option<&CameraSession> {
        self.session.as_ref()
    }
}

impl Drop for CameraSessionManager {
    fn drop(&mut self) {
        self.close();
    }
}
