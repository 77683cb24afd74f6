//! `nutrilens scan`: one acquisition and analysis, end to end.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use nutrilens_config::ScannerConfig;
use nutrilens_core::{ProgressSink, ScanError};
use nutrilens_media::{CameraSessionManager, FfmpegDevice, FrameCapturer};
use nutrilens_scanner::{AcquisitionController, ScanOutcome, ScanState};
use nutrilens_understanding::TransferDispatcher;
use serde_json::json;
use tracing::debug;

use crate::terminal_output::{self, Style};

/// How long `--camera` keeps retrying while the stream warms up.
const CAPTURE_ATTEMPTS: u32 = 50;
const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanSource {
    File(PathBuf),
    Camera,
    ServerCapture,
}

pub async fn run(config: &ScannerConfig, source: ScanSource, json_output: bool) -> Result<()> {
    let mut controller = build_controller(config, !json_output)?;

    match source {
        ScanSource::File(path) => controller.select_file(&path).await?,
        ScanSource::Camera => capture_from_camera(&mut controller).await?,
        ScanSource::ServerCapture => controller.select_server_capture()?,
    }

    if !json_output {
        terminal_output::note_info(&format!("Sending image to {}", config.endpoint_url()));
    }
    controller.request_analysis()?;
    controller.await_outcome().await;

    match controller.state() {
        ScanState::ResultReady(outcome) => {
            let raw = controller.last_response().cloned().unwrap_or_default();
            if json_output {
                println!("{}", serde_json::to_string_pretty(&outcome_json(outcome, raw))?);
            } else {
                print_outcome(outcome);
            }
            Ok(())
        }
        ScanState::Error(err) => {
            if json_output {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "status": "error", "error": err.to_string() }))?
                );
            }
            Err(err.clone()).context("Scan failed")
        }
        other => bail!("scan ended unexpectedly while {}", other.phase()),
    }
}

fn build_controller(config: &ScannerConfig, show_progress: bool) -> Result<AcquisitionController> {
    let mut device = FfmpegDevice::new(config.environment_device())
        .with_ffmpeg_path(config.ffmpeg_path())
        .with_input_format(config.input_format());
    if let Some(user) = config.user_device() {
        device = device.with_user_device(user);
    }
    let (width, height) = config.resolution();
    let device = device.with_resolution(width, height);

    let dispatcher = TransferDispatcher::new(&config.endpoint_url())?
        .with_timeout(config.timeout())?
        .with_chunk_size(config.chunk_size())
        .with_capture_param(config.capture_param())
        .with_api_key(config.api_key().map(str::to_string));

    let controller = AcquisitionController::new(
        CameraSessionManager::new(Arc::new(device)),
        FrameCapturer::new(config.jpeg_quality()),
        Arc::new(dispatcher),
    );

    if !show_progress {
        return Ok(controller);
    }
    let observer: Arc<dyn ProgressSink> = Arc::new(|percent: u8| {
        let _ = terminal_output::draw_progress(&mut io::stderr(), percent);
    });
    Ok(controller.with_progress_observer(observer))
}

async fn capture_from_camera(controller: &mut AcquisitionController) -> Result<()> {
    controller.start_camera_capture().await?;
    for attempt in 1..=CAPTURE_ATTEMPTS {
        match controller.capture_frame() {
            Ok(()) => return Ok(()),
            Err(ScanError::CaptureUnavailable(reason)) => {
                debug!(attempt, %reason, "Frame not ready; retrying");
                tokio::time::sleep(CAPTURE_RETRY_DELAY).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
    controller.cancel_camera()?;
    bail!("camera did not produce a frame after {CAPTURE_ATTEMPTS} attempts")
}

fn print_outcome(outcome: &ScanOutcome) {
    let style = Style::detect();
    match outcome {
        ScanOutcome::Record(record) => {
            terminal_output::note_success("Label recognized");
            print!("{}", terminal_output::render_record(record, style));
        }
        ScanOutcome::Unrecognized(diagnostic) => {
            terminal_output::note_warn("The response did not contain a recognizable label");
            print!("{}", terminal_output::render_diagnostic(diagnostic, style));
        }
    }
}

fn outcome_json(outcome: &ScanOutcome, raw: serde_json::Value) -> serde_json::Value {
    match outcome {
        ScanOutcome::Record(record) => json!({ "status": "recognized", "record": record }),
        ScanOutcome::Unrecognized(diagnostic) => json!({
            "status": "unrecognized",
            "diagnostic": { "headline": diagnostic.headline, "detail": diagnostic.detail },
            "raw": raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nutrilens_core::AnalysisRecord;
    use nutrilens_understanding::Diagnostic;

    #[test]
    fn recognized_json_carries_record() {
        let outcome = ScanOutcome::Record(AnalysisRecord {
            name: "Aspirin".into(),
            ..Default::default()
        });
        let value = outcome_json(&outcome, json!({}));
        assert_eq!(value["status"], "recognized");
        assert_eq!(value["record"]["name"], "Aspirin");
        assert!(value.get("raw").is_none());
    }

    #[test]
    fn unrecognized_json_carries_raw() {
        let raw = json!({ "text": "no label visible" });
        let outcome = ScanOutcome::Unrecognized(Diagnostic::for_unrecognized(&raw));
        let value = outcome_json(&outcome, raw.clone());
        assert_eq!(value["status"], "unrecognized");
        assert_eq!(value["raw"], raw);
        assert_eq!(value["diagnostic"]["headline"], "Analysis Diagnostics");
    }

    #[test]
    fn controller_builds_from_default_config() {
        let config = nutrilens_config::apply_all_defaults(ScannerConfig::default());
        let controller = build_controller(&config, false).unwrap();
        assert_eq!(controller.phase(), nutrilens_core::ScanPhase::Empty);
    }
}
