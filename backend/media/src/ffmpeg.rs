//! ffmpeg-backed camera device.
//!
//! Spawns `ffmpeg` against a capture device and reads raw RGB24 frames from
//! its stdout on a background task. Stopping the stream kills the child, which
//! releases the device node.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::RgbImage;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::camera::{DeviceError, FacingMode, StreamConstraints, VideoDevice, VideoStream};

pub const DEFAULT_FFMPEG_PATH: &str = "ffmpeg";
pub const DEFAULT_INPUT_FORMAT: &str = "v4l2";
pub const DEFAULT_ENVIRONMENT_DEVICE: &str = "/dev/video0";
pub const DEFAULT_WIDTH: u32 = 1280;
pub const DEFAULT_HEIGHT: u32 = 720;

/// A camera reached through an `ffmpeg` input device.
#[derive(Debug, Clone)]
pub struct FfmpegDevice {
    ffmpeg_path: PathBuf,
    input_format: String,
    environment_device: String,
    user_device: Option<String>,
    width: u32,
    height: u32,
}

impl Default for FfmpegDevice {
    fn default() -> Self {
        Self::new(DEFAULT_ENVIRONMENT_DEVICE)
    }
}

impl FfmpegDevice {
    pub fn new(environment_device: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: PathBuf::from(DEFAULT_FFMPEG_PATH),
            input_format: DEFAULT_INPUT_FORMAT.to_string(),
            environment_device: environment_device.into(),
            user_device: None,
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }

    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    pub fn with_input_format(mut self, format: impl Into<String>) -> Self {
        self.input_format = format.into();
        self
    }

    pub fn with_user_device(mut self, device: impl Into<String>) -> Self {
        self.user_device = Some(device.into());
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    fn device_for(&self, facing: FacingMode) -> Result<&str, DeviceError> {
        match facing {
            FacingMode::Environment => Ok(&self.environment_device),
            FacingMode::User => self
                .user_device
                .as_deref()
                .ok_or_else(|| DeviceError::NotFound("no front-facing camera configured".into())),
        }
    }

    fn command(&self, device: &str) -> Command {
        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.arg("-hide_banner")
            .arg("-loglevel")
            .arg("error")
            .arg("-f")
            .arg(&self.input_format)
            .arg("-video_size")
            .arg(format!("{}x{}", self.width, self.height))
            .arg("-i")
            .arg(device)
            .arg("-an")
            .arg("-vf")
            .arg(format!("scale={}:{}", self.width, self.height))
            .arg("-pix_fmt")
            .arg("rgb24")
            .arg("-f")
            .arg("rawvideo")
            .arg("-");
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        cmd
    }
}

/// Check that a device node exists and is readable before handing it to ffmpeg,
/// so permission problems surface as such instead of as an ffmpeg exit.
fn check_device_node(device: &str) -> Result<(), DeviceError> {
    let path = Path::new(device);
    if !device.starts_with("/dev/") {
        return Ok(());
    }
    match std::fs::File::open(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(DeviceError::NotFound(format!("{device} does not exist")))
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(DeviceError::PermissionDenied(format!("cannot read {device}")))
        }
        Err(e) => Err(DeviceError::Hardware(format!("{device}: {e}"))),
    }
}

#[async_trait]
impl VideoDevice for FfmpegDevice {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, DeviceError> {
        if self.width == 0 || self.height == 0 {
            return Err(DeviceError::Hardware(format!(
                "invalid capture resolution {}x{}",
                self.width, self.height
            )));
        }
        let device = self.device_for(constraints.facing)?;
        check_device_node(device)?;

        let mut child = self.command(device).spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DeviceError::Hardware(format!("ffmpeg not found at {}", self.ffmpeg_path.display()))
            } else {
                DeviceError::Hardware(format!("failed to start ffmpeg: {e}"))
            }
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DeviceError::Hardware("ffmpeg stdout was not captured".into()))?;

        let shared = Arc::new(FrameSlot::default());
        let reader = tokio::spawn(read_frames(stdout, self.width, self.height, shared.clone()));
        info!(device, width = self.width, height = self.height, "Started ffmpeg capture");

        Ok(Box::new(FfmpegStream {
            child: Some(child),
            reader: Some(reader),
            shared,
        }))
    }
}

#[derive(Default)]
struct FrameSlot {
    latest: Mutex<Option<RgbImage>>,
    ended: AtomicBool,
}

/// Live stream backed by an ffmpeg child process.
pub struct FfmpegStream {
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    shared: Arc<FrameSlot>,
}

impl VideoStream for FfmpegStream {
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.shared
            .latest
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(RgbImage::dimensions))
    }

    fn latest_frame(&self) -> Option<RgbImage> {
        self.shared.latest.lock().ok().and_then(|slot| slot.clone())
    }

    fn has_ended(&self) -> bool {
        self.shared.ended.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "ffmpeg already exited");
            }
        }
        self.shared.ended.store(true, Ordering::SeqCst);
    }
}

impl Drop for FfmpegStream {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn read_frames(mut stdout: ChildStdout, width: u32, height: u32, shared: Arc<FrameSlot>) {
    let frame_len = width as usize * height as usize * 3;
    // An empty read completes immediately and would spin without yielding.
    if frame_len == 0 {
        shared.ended.store(true, Ordering::SeqCst);
        return;
    }
    let mut buf = vec![0u8; frame_len];
    loop {
        match stdout.read_exact(&mut buf).await {
            Ok(_) => {
                let Some(frame) = RgbImage::from_raw(width, height, buf.clone()) else {
                    warn!(width, height, "Discarding frame with unexpected size");
                    continue;
                };
                if let Ok(mut slot) = shared.latest.lock() {
                    *slot = Some(frame);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                debug!("ffmpeg stream ended");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read frame from ffmpeg");
                break;
            }
        }
    }
    shared.ended.store(true, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_device_node_is_not_found() {
        let device = FfmpegDevice::new("/dev/video-nutrilens-missing");
        let err = device.open(&StreamConstraints::default()).await.err().unwrap();
        assert!(matches!(err, DeviceError::NotFound(_)));
    }

    #[tokio::test]
    async fn front_camera_requires_configuration() {
        let device = FfmpegDevice::default();
        let constraints = StreamConstraints {
            facing: FacingMode::User,
            ..Default::default()
        };
        let err = device.open(&constraints).await.err().unwrap();
        assert_eq!(err, DeviceError::NotFound("no front-facing camera configured".into()));
    }

    #[tokio::test]
    async fn zero_resolution_is_rejected_before_spawning() {
        let device = FfmpegDevice::new("not-a-dev-node")
            .with_ffmpeg_path("/bin/true")
            .with_resolution(0, 720);
        let err = device.open(&StreamConstraints::default()).await.err().unwrap();
        assert_eq!(err, DeviceError::Hardware("invalid capture resolution 0x720".into()));
    }

    #[test]
    fn command_requests_raw_rgb_without_audio() {
        let device = FfmpegDevice::new("/dev/video2").with_resolution(640, 480);
        let cmd = device.command("/dev/video2");
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.windows(2).any(|w| w == ["-video_size", "640x480"]));
        assert!(args.windows(2).any(|w| w == ["-pix_fmt", "rgb24"]));
        assert!(args.contains(&"-an".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("-"));
    }
}
