//! Acquisition controller.
//!
//! Unifies the three ways of getting an image (file, camera frame, server
//! capture) into one pending image, dispatches it to the analysis service and
//! turns the answer into a [`ScanOutcome`].
//!
//! Each dispatch runs on its own task and is tagged with a [`RequestId`].
//! Outcomes and progress for any request other than the current one are
//! discarded, so a `reset()` during a dispatch never lets the old answer
//! resurface.

use std::path::Path;
use std::sync::Arc;

use nutrilens_core::{
    AnalysisTransport, ImageSource, PreviewHandle, ProgressSink, RawResponse, RequestId,
    ScanError, ScanPhase, TransferState,
};
use nutrilens_logging::{EventLogger, ScanTraceEvent};
use nutrilens_media::{CameraSession, CameraSessionManager, FrameCapturer, load_image_file};
use nutrilens_understanding::{Diagnostic, Normalization, normalize};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::state::{DispatchOutcome, PendingImage, ScanOutcome, ScanState, TransferSnapshot};

pub struct AcquisitionController {
    session_id: String,
    camera: CameraSessionManager,
    capturer: FrameCapturer,
    transport: Arc<dyn AnalysisTransport>,
    state: ScanState,
    pending: Option<PendingImage>,
    last_response: Option<RawResponse>,
    last_error: Option<ScanError>,
    next_request_id: u64,
    transfer: Arc<watch::Sender<TransferSnapshot>>,
    progress_observer: Option<Arc<dyn ProgressSink>>,
    outcome_tx: mpsc::UnboundedSender<DispatchOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<DispatchOutcome>,
}

impl AcquisitionController {
    pub fn new(
        camera: CameraSessionManager,
        capturer: FrameCapturer,
        transport: Arc<dyn AnalysisTransport>,
    ) -> Self {
        let (transfer, _) = watch::channel(TransferSnapshot::default());
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            camera,
            capturer,
            transport,
            state: ScanState::Empty,
            pending: None,
            last_response: None,
            last_error: None,
            next_request_id: 0,
            transfer: Arc::new(transfer),
            progress_observer: None,
            outcome_tx,
            outcome_rx,
        }
    }

    /// Receive every accepted progress value of the current dispatch, in order.
    pub fn with_progress_observer(mut self, observer: Arc<dyn ProgressSink>) -> Self {
        self.progress_observer = Some(observer);
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn phase(&self) -> ScanPhase {
        self.state.phase()
    }

    pub fn pending(&self) -> Option<&PendingImage> {
        self.pending.as_ref()
    }

    pub fn preview(&self) -> Option<&PreviewHandle> {
        self.pending.as_ref().and_then(PendingImage::preview)
    }

    pub fn last_response(&self) -> Option<&RawResponse> {
        self.last_response.as_ref()
    }

    /// The most recent failure, including recoverable ones that did not
    /// change the phase (camera denied, frame not ready).
    pub fn last_error(&self) -> Option<&ScanError> {
        self.last_error.as_ref()
    }

    pub fn camera_session(&self) -> Option<&CameraSession> {
        self.camera.session()
    }

    pub fn current_request(&self) -> Option<RequestId> {
        match self.state {
            ScanState::Analyzing { request_id } => Some(request_id),
            _ => None,
        }
    }

    pub fn transfer(&self) -> TransferState {
        self.transfer.borrow().state.clone()
    }

    pub fn subscribe_transfer(&self) -> watch::Receiver<TransferSnapshot> {
        self.transfer.subscribe()
    }

    // -----------------------------------------------------------------------
    // Acquisition
    // -----------------------------------------------------------------------

    /// Load an image from disk and make it the pending image.
    ///
    /// An active camera is closed first. Any previous image and result are
    /// discarded, also when the file turns out to be unreadable.
    pub async fn select_file(&mut self, path: impl AsRef<Path>) -> Result<(), ScanError> {
        self.ensure_not_analyzing("select_file")?;
        self.close_camera();
        self.discard_image_and_result();

        match load_image_file(path).await {
            Ok(image) => {
                self.log(ScanTraceEvent::ImageAcquired {
                    source: source_label(&image.source).to_string(),
                    bytes: image.payload.len(),
                });
                self.pending = Some(PendingImage::Acquired(image));
                self.state = ScanState::ImageSelected;
                Ok(())
            }
            Err(err) => Err(self.enter_error(err)),
        }
    }

    /// Open the rear camera. On failure the phase is left as it was.
    pub async fn start_camera_capture(&mut self) -> Result<(), ScanError> {
        self.ensure_not_analyzing("start_camera_capture")?;

        let opened = self.camera.open().await.map(CameraSession::id);
        let camera_id = opened.map_err(|err| self.record_error(err))?;
        self.log(ScanTraceEvent::CameraOpened {
            camera_id: camera_id.to_string(),
        });
        self.last_error = None;
        self.state = ScanState::CameraActive;
        Ok(())
    }

    /// Grab the current frame, close the camera and make the frame pending.
    ///
    /// `CaptureUnavailable` keeps the camera open so the caller can retry.
    pub fn capture_frame(&mut self) -> Result<(), ScanError> {
        self.ensure_phase("capture_frame", &[ScanPhase::CameraActive])?;

        let captured = match self.camera.session() {
            Some(session) => self.capturer.capture(session),
            None => Err(ScanError::CaptureUnavailable("no camera session is open".into())),
        };
        let image = captured.map_err(|err| self.record_error(err))?;

        self.close_camera();
        self.discard_image_and_result();
        self.log(ScanTraceEvent::ImageAcquired {
            source: source_label(&image.source).to_string(),
            bytes: image.payload.len(),
        });
        self.pending = Some(PendingImage::Acquired(image));
        self.state = ScanState::ImageSelected;
        Ok(())
    }

    /// Close the camera and go back to the pending image, or to empty.
    pub fn cancel_camera(&mut self) -> Result<(), ScanError> {
        self.ensure_phase("cancel_camera", &[ScanPhase::CameraActive])?;
        self.close_camera();
        self.state = if self.pending.is_some() {
            ScanState::ImageSelected
        } else {
            ScanState::Empty
        };
        Ok(())
    }

    /// Ask the service to take the photo itself.
    pub fn select_server_capture(&mut self) -> Result<(), ScanError> {
        self.ensure_not_analyzing("select_server_capture")?;
        self.close_camera();
        self.discard_image_and_result();
        self.pending = Some(PendingImage::ServerCapture);
        self.state = ScanState::ImageSelected;
        Ok(())
    }

    /// Back to empty from any phase.
    ///
    /// An in-flight dispatch keeps running; its outcome is discarded on arrival.
    pub fn reset(&mut self) {
        self.close_camera();
        self.discard_image_and_result();
        self.transfer.send_modify(|snap| *snap = TransferSnapshot::default());
        self.state = ScanState::Empty;
        self.log(ScanTraceEvent::Reset);
    }

    // -----------------------------------------------------------------------
    // Dispatch
    // -----------------------------------------------------------------------

    /// Send the pending image (or capture instruction) to the service.
    ///
    /// Must be called within a tokio runtime. Completion is picked up by
    /// [`Self::await_outcome`] or [`Self::poll_outcomes`].
    pub fn request_analysis(&mut self) -> Result<RequestId, ScanError> {
        self.ensure_phase("request_analysis", &[ScanPhase::ImageSelected])?;
        let Some(pending) = &self.pending else {
            return Err(ScanError::InvalidTransition {
                operation: "request_analysis",
                phase: self.phase(),
            });
        };
        let request = pending.to_request();

        self.next_request_id += 1;
        let request_id = RequestId(self.next_request_id);
        self.transfer.send_modify(|snap| {
            *snap = TransferSnapshot {
                request_id: Some(request_id),
                state: TransferState::in_flight(),
            }
        });
        self.last_response = None;
        self.last_error = None;
        self.state = ScanState::Analyzing { request_id };

        self.log(ScanTraceEvent::DispatchStarted {
            request_id: request_id.0,
            mode: request.mode().to_string(),
            transport: self.transport.name().to_string(),
        });
        info!(%request_id, mode = request.mode(), "Dispatching scan");

        let sink = self.progress_sink(request_id);
        let transport = self.transport.clone();
        let outcome_tx = self.outcome_tx.clone();
        tokio::spawn(async move {
            let result = transport.dispatch(request, sink).await;
            // The receiver lives as long as the controller.
            let _ = outcome_tx.send(DispatchOutcome { request_id, result });
        });

        Ok(request_id)
    }

    /// Wait for the current dispatch to finish and apply its outcome.
    ///
    /// Stale outcomes that arrive first are discarded. Returns immediately
    /// when nothing is being analyzed.
    pub async fn await_outcome(&mut self) -> ScanPhase {
        while self.current_request().is_some() {
            match self.outcome_rx.recv().await {
                Some(outcome) => {
                    self.apply_outcome(outcome);
                }
                None => break,
            }
        }
        self.phase()
    }

    /// Apply every outcome that has already arrived. Returns how many were
    /// accepted.
    pub fn poll_outcomes(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            if self.apply_outcome(outcome) {
                applied += 1;
            }
        }
        applied
    }

    /// Apply one dispatch outcome. Returns `false` when it belongs to a
    /// request that is no longer current.
    pub fn apply_outcome(&mut self, outcome: DispatchOutcome) -> bool {
        let DispatchOutcome { request_id, result } = outcome;
        if self.current_request() != Some(request_id) {
            debug!(%request_id, "Discarding stale dispatch outcome");
            self.log(ScanTraceEvent::StaleOutcomeDiscarded {
                request_id: request_id.0,
            });
            return false;
        }

        match result {
            Ok(raw) => {
                let outcome = match normalize(&raw) {
                    Normalization::Recognized(record) => ScanOutcome::Record(record),
                    Normalization::Unrecognized => {
                        warn!(%request_id, "Response could not be normalized");
                        ScanOutcome::Unrecognized(Diagnostic::for_unrecognized(&raw))
                    }
                };
                self.log(ScanTraceEvent::Outcome {
                    request_id: request_id.0,
                    outcome: describe(&outcome),
                });
                self.finish_transfer(request_id, TransferState::Succeeded(raw.clone()));
                self.last_response = Some(raw);
                self.pending = None;
                self.state = ScanState::ResultReady(outcome);
            }
            Err(err) => {
                self.log(ScanTraceEvent::Outcome {
                    request_id: request_id.0,
                    outcome: format!("failed: {err}"),
                });
                self.finish_transfer(request_id, TransferState::Failed(err.clone()));
                self.enter_error(err);
            }
        }
        true
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Progress for `request_id` only; values for any other request are dropped.
    ///
    /// The observer runs after the watch lock is released. Callers invoke the
    /// sink under the dispatcher's progress lock, which keeps values ordered.
    fn progress_sink(&self, request_id: RequestId) -> Arc<dyn ProgressSink> {
        let transfer = self.transfer.clone();
        let observer = self.progress_observer.clone();
        Arc::new(move |percent: u8| {
            let mut accepted = None;
            transfer.send_if_modified(|snap| {
                if snap.request_id != Some(request_id) || !snap.state.advance(percent) {
                    return false;
                }
                accepted = snap.state.progress();
                true
            });
            if let (Some(observer), Some(p)) = (&observer, accepted) {
                observer.on_progress(p);
            }
        })
    }

    fn finish_transfer(&self, request_id: RequestId, terminal: TransferState) {
        self.transfer.send_if_modified(|snap| {
            if snap.request_id != Some(request_id) {
                return false;
            }
            snap.state = terminal;
            true
        });
    }

    fn ensure_phase(&self, operation: &'static str, allowed: &[ScanPhase]) -> Result<(), ScanError> {
        let phase = self.phase();
        if allowed.contains(&phase) {
            Ok(())
        } else {
            Err(ScanError::InvalidTransition { operation, phase })
        }
    }

    fn ensure_not_analyzing(&self, operation: &'static str) -> Result<(), ScanError> {
        self.ensure_phase(
            operation,
            &[
                ScanPhase::Empty,
                ScanPhase::CameraActive,
                ScanPhase::ImageSelected,
                ScanPhase::ResultReady,
                ScanPhase::Error,
            ],
        )
    }

    fn close_camera(&mut self) {
        let camera_id = self.camera.session().map(CameraSession::id);
        if self.camera.close() {
            if let Some(camera_id) = camera_id {
                self.log(ScanTraceEvent::CameraClosed {
                    camera_id: camera_id.to_string(),
                });
            }
        }
    }

    fn discard_image_and_result(&mut self) {
        self.pending = None;
        self.last_response = None;
        self.last_error = None;
    }

    /// Record a failure without changing the phase.
    fn record_error(&mut self, err: ScanError) -> ScanError {
        if err.is_recoverable_in_place() {
            debug!(phase = %self.phase(), error = %err, "Scan operation not ready");
        } else {
            warn!(phase = %self.phase(), error = %err, "Scan operation failed");
        }
        self.log(ScanTraceEvent::Error {
            error_msg: err.to_string(),
        });
        self.last_error = Some(err.clone());
        err
    }

    fn enter_error(&mut self, err: ScanError) -> ScanError {
        let err = self.record_error(err);
        self.state = ScanState::Error(err.clone());
        err
    }

    fn log(&self, event: ScanTraceEvent) {
        EventLogger::log_event(&self.session_id, event);
    }
}

impl Drop for AcquisitionController {
    fn drop(&mut self) {
        self.close_camera();
    }
}

fn source_label(source: &ImageSource) -> &'static str {
    match source {
        ImageSource::File { .. } => "file",
        ImageSource::Camera => "camera",
    }
}

fn describe(outcome: &ScanOutcome) -> String {
    match outcome {
        ScanOutcome::Record(record) => format!("recognized: {}", record.name),
        ScanOutcome::Unrecognized(_) => "unrecognized".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use nutrilens_core::DispatchRequest;
    use nutrilens_media::{DeviceError, StreamConstraints, VideoDevice, VideoStream};
    use serde_json::json;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    // --- fake camera -------------------------------------------------------

    struct FakeStream {
        frame: Option<RgbImage>,
        stopped: Arc<AtomicUsize>,
        running: bool,
    }

    impl VideoStream for FakeStream {
        fn dimensions(&self) -> Option<(u32, u32)> {
            self.frame.as_ref().map(RgbImage::dimensions)
        }

        fn latest_frame(&self) -> Option<RgbImage> {
            self.frame.clone()
        }

        fn stop(&mut self) {
            if self.running {
                self.running = false;
                self.stopped.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    struct FakeCamera {
        deny: bool,
        warm: AtomicBool,
        opened: AtomicUsize,
        stopped: Arc<AtomicUsize>,
    }

    impl FakeCamera {
        fn new(warm: bool) -> Arc<Self> {
            Arc::new(Self {
                deny: false,
                warm: AtomicBool::new(warm),
                opened: AtomicUsize::new(0),
                stopped: Arc::new(AtomicUsize::new(0)),
            })
        }

        fn denied() -> Arc<Self> {
            Arc::new(Self {
                deny: true,
                warm: AtomicBool::new(false),
                opened: AtomicUsize::new(0),
                stopped: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    #[async_trait]
    impl VideoDevice for FakeCamera {
        fn name(&self) -> &str {
            "fake"
        }

        async fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, DeviceError> {
            assert!(!constraints.audio);
            if self.deny {
                return Err(DeviceError::PermissionDenied("user dismissed the prompt".into()));
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            let frame = self
                .warm
                .load(Ordering::SeqCst)
                .then(|| RgbImage::from_pixel(8, 6, Rgb([200, 30, 30])));
            Ok(Box::new(FakeStream {
                frame,
                stopped: self.stopped.clone(),
                running: true,
            }))
        }
    }

    // --- fake transport ----------------------------------------------------

    type Gate = oneshot::Receiver<Result<RawResponse, ScanError>>;

    /// Reports the scripted progress, then waits for the test to release the answer.
    struct GatedTransport {
        progress: Vec<u8>,
        gates: Mutex<VecDeque<Gate>>,
        requests: Mutex<Vec<DispatchRequest>>,
        sinks: Mutex<Vec<Arc<dyn ProgressSink>>>,
    }

    impl GatedTransport {
        fn new(progress: Vec<u8>) -> Arc<Self> {
            Arc::new(Self {
                progress,
                gates: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
                sinks: Mutex::new(Vec::new()),
            })
        }

        async fn wait_for_requests(&self, n: usize) {
            while self.requests.lock().unwrap().len() < n {
                tokio::task::yield_now().await;
            }
        }

        /// The progress sink handed to the `n`th dispatch.
        fn sink(&self, n: usize) -> Arc<dyn ProgressSink> {
            self.sinks.lock().unwrap()[n].clone()
        }

        fn gate(&self) -> oneshot::Sender<Result<RawResponse, ScanError>> {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().push_back(rx);
            tx
        }
    }

    #[async_trait]
    impl AnalysisTransport for GatedTransport {
        fn name(&self) -> &str {
            "gated"
        }

        async fn dispatch(
            &self,
            request: DispatchRequest,
            progress: Arc<dyn ProgressSink>,
        ) -> Result<RawResponse, ScanError> {
            // Gates are handed out in dispatch order.
            let gate = {
                let mut requests = self.requests.lock().unwrap();
                requests.push(request.clone());
                self.sinks.lock().unwrap().push(progress.clone());
                self.gates.lock().unwrap().pop_front()
            };
            if request.has_payload() {
                for p in &self.progress {
                    progress.on_progress(*p);
                }
            }
            match gate {
                Some(gate) => gate
                    .await
                    .unwrap_or_else(|_| Err(ScanError::transport(None, "gate dropped"))),
                None => Err(ScanError::transport(None, "no gate")),
            }
        }
    }

    fn controller(camera: Arc<FakeCamera>, transport: Arc<GatedTransport>) -> AcquisitionController {
        AcquisitionController::new(
            CameraSessionManager::new(camera),
            FrameCapturer::default(),
            transport,
        )
    }

    fn label_file() -> PathBuf {
        let path = std::env::temp_dir().join(format!("nutrilens-label-{}.jpg", uuid::Uuid::new_v4()));
        std::fs::write(&path, [0xFFu8, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F']).unwrap();
        path
    }

    fn record_named(name: &str) -> RawResponse {
        json!({ "text": { "medicationName": name, "instructions": ["Take with food"] } })
    }

    // --- scenarios ---------------------------------------------------------

    #[tokio::test]
    async fn file_upload_reports_progress_and_yields_record() {
        let transport = GatedTransport::new(vec![0, 37, 100]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observer: Arc<dyn ProgressSink> = {
            let seen = seen.clone();
            Arc::new(move |p: u8| seen.lock().unwrap().push(p))
        };
        let mut ctl = controller(FakeCamera::new(true), transport.clone()).with_progress_observer(observer);

        let path = label_file();
        ctl.select_file(&path).await.unwrap();
        assert_eq!(ctl.phase(), ScanPhase::ImageSelected);
        assert!(ctl.preview().unwrap().as_str().starts_with("data:image/jpeg;base64,"));

        let release = transport.gate();
        let id = ctl.request_analysis().unwrap();
        assert_eq!(id, RequestId(1));
        assert_eq!(ctl.phase(), ScanPhase::Analyzing);

        release
            .send(Ok(json!({
                "text": {
                    "medicationName": "Metformin HCl",
                    "dosage": "500mg",
                    "instructions": ["Take with food"]
                }
            })))
            .unwrap();
        assert_eq!(ctl.await_outcome().await, ScanPhase::ResultReady);

        let record = ctl.state().outcome().and_then(ScanOutcome::record).unwrap();
        assert_eq!(record.name, "Metformin HCl");
        assert_eq!(record.dosage, "500mg");
        assert_eq!(record.instructions, vec!["Take with food"]);
        assert_eq!(*seen.lock().unwrap(), vec![0, 37, 100]);
        assert!(matches!(ctl.transfer(), TransferState::Succeeded(_)));
        assert!(ctl.last_response().is_some());
        assert!(ctl.pending().is_none());
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn denied_camera_leaves_state_empty() {
        let mut ctl = controller(FakeCamera::denied(), GatedTransport::new(vec![]));
        let err = ctl.start_camera_capture().await.unwrap_err();
        assert!(matches!(err, ScanError::DeviceUnavailable(_)));
        assert!(err.to_string().contains("denied"));
        assert_eq!(ctl.phase(), ScanPhase::Empty);
        assert_eq!(ctl.last_error(), Some(&err));
    }

    #[tokio::test]
    async fn stale_outcome_is_discarded_after_reset() {
        let transport = GatedTransport::new(vec![50]);
        let mut ctl = controller(FakeCamera::new(true), transport.clone());
        let path = label_file();

        ctl.select_file(&path).await.unwrap();
        let first_gate = transport.gate();
        let first = ctl.request_analysis().unwrap();
        transport.wait_for_requests(1).await;

        ctl.reset();
        assert_eq!(ctl.phase(), ScanPhase::Empty);
        assert_eq!(ctl.transfer(), TransferState::Idle);

        ctl.select_file(&path).await.unwrap();
        let second_gate = transport.gate();
        let second = ctl.request_analysis().unwrap();
        assert!(second > first);

        first_gate.send(Ok(record_named("Stale"))).unwrap();
        second_gate.send(Ok(record_named("Fresh"))).unwrap();
        assert_eq!(ctl.await_outcome().await, ScanPhase::ResultReady);
        let name = &ctl.state().outcome().and_then(ScanOutcome::record).unwrap().name;
        assert_eq!(name, "Fresh");

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ctl.poll_outcomes(), 0);
        let name = &ctl.state().outcome().and_then(ScanOutcome::record).unwrap().name;
        assert_eq!(name, "Fresh");
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn stale_progress_is_discarded_after_reset() {
        let transport = GatedTransport::new(vec![20]);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observer: Arc<dyn ProgressSink> = {
            let seen = seen.clone();
            Arc::new(move |p: u8| seen.lock().unwrap().push(p))
        };
        let mut ctl = controller(FakeCamera::new(true), transport.clone()).with_progress_observer(observer);
        let path = label_file();

        ctl.select_file(&path).await.unwrap();
        let first_gate = transport.gate();
        ctl.request_analysis().unwrap();
        transport.wait_for_requests(1).await;

        ctl.reset();
        ctl.select_file(&path).await.unwrap();
        let second_gate = transport.gate();
        ctl.request_analysis().unwrap();
        transport.wait_for_requests(2).await;
        assert_eq!(ctl.transfer(), TransferState::InFlight { progress: Some(20) });
        assert_eq!(*seen.lock().unwrap(), vec![20, 20]);

        transport.sink(0).on_progress(90);
        assert_eq!(ctl.transfer(), TransferState::InFlight { progress: Some(20) });
        assert_eq!(*seen.lock().unwrap(), vec![20, 20]);

        transport.sink(1).on_progress(60);
        assert_eq!(ctl.transfer(), TransferState::InFlight { progress: Some(60) });
        assert_eq!(*seen.lock().unwrap(), vec![20, 20, 60]);

        first_gate.send(Ok(record_named("Stale"))).unwrap();
        second_gate.send(Ok(record_named("Fresh"))).unwrap();
        assert_eq!(ctl.await_outcome().await, ScanPhase::ResultReady);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn observer_can_read_transfer_while_notified() {
        let transport = GatedTransport::new(vec![10, 60]);
        let ctl = controller(FakeCamera::new(true), transport.clone());
        let rx = ctl.subscribe_transfer();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let observer: Arc<dyn ProgressSink> = {
            let seen = seen.clone();
            Arc::new(move |_: u8| seen.lock().unwrap().push(rx.borrow().state.progress()))
        };
        let mut ctl = ctl.with_progress_observer(observer);
        let path = label_file();

        ctl.select_file(&path).await.unwrap();
        let release = transport.gate();
        ctl.request_analysis().unwrap();
        transport.wait_for_requests(1).await;
        assert_eq!(*seen.lock().unwrap(), vec![Some(10), Some(60)]);

        release.send(Ok(record_named("Aspirin"))).unwrap();
        assert_eq!(ctl.await_outcome().await, ScanPhase::ResultReady);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn outcome_for_unknown_request_is_rejected() {
        let transport = GatedTransport::new(vec![]);
        let mut ctl = controller(FakeCamera::new(true), transport.clone());
        ctl.select_server_capture().unwrap();
        let _gate = transport.gate();
        let id = ctl.request_analysis().unwrap();

        let accepted = ctl.apply_outcome(DispatchOutcome {
            request_id: RequestId(id.0 + 7),
            result: Ok(record_named("Ghost")),
        });
        assert!(!accepted);
        assert_eq!(ctl.current_request(), Some(id));
    }

    #[tokio::test]
    async fn camera_capture_retries_until_frame_arrives() {
        let camera = FakeCamera::new(false);
        let mut ctl = controller(camera.clone(), GatedTransport::new(vec![]));

        ctl.start_camera_capture().await.unwrap();
        assert_eq!(ctl.phase(), ScanPhase::CameraActive);

        let err = ctl.capture_frame().unwrap_err();
        assert!(matches!(err, ScanError::CaptureUnavailable(_)));
        assert_eq!(ctl.phase(), ScanPhase::CameraActive);
        assert!(ctl.camera_session().is_some_and(CameraSession::is_open));

        // Reopening a fresh stream that has frames.
        ctl.cancel_camera().unwrap();
        camera.warm.store(true, Ordering::SeqCst);
        ctl.start_camera_capture().await.unwrap();
        ctl.capture_frame().unwrap();

        assert_eq!(ctl.phase(), ScanPhase::ImageSelected);
        assert!(ctl.camera_session().is_none());
        assert_eq!(camera.opened.load(Ordering::SeqCst), 2);
        assert_eq!(camera.stopped.load(Ordering::SeqCst), 2);
        match ctl.pending() {
            Some(PendingImage::Acquired(image)) => {
                assert_eq!(image.source, ImageSource::Camera);
                assert_eq!(image.payload.mime_type, "image/jpeg");
            }
            other => panic!("expected captured frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn second_start_reuses_open_session() {
        let camera = FakeCamera::new(true);
        let mut ctl = controller(camera.clone(), GatedTransport::new(vec![]));
        ctl.start_camera_capture().await.unwrap();
        ctl.start_camera_capture().await.unwrap();
        assert_eq!(camera.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_camera_returns_to_pending_image() {
        let camera = FakeCamera::new(true);
        let mut ctl = controller(camera.clone(), GatedTransport::new(vec![]));
        ctl.select_server_capture().unwrap();
        ctl.start_camera_capture().await.unwrap();
        ctl.cancel_camera().unwrap();
        assert_eq!(ctl.phase(), ScanPhase::ImageSelected);
        assert!(matches!(ctl.pending(), Some(PendingImage::ServerCapture)));
        assert_eq!(camera.stopped.load(Ordering::SeqCst), 1);

        ctl.reset();
        ctl.start_camera_capture().await.unwrap();
        ctl.cancel_camera().unwrap();
        assert_eq!(ctl.phase(), ScanPhase::Empty);
    }

    #[tokio::test]
    async fn reset_and_drop_close_the_camera() {
        let camera = FakeCamera::new(true);
        {
            let mut ctl = controller(camera.clone(), GatedTransport::new(vec![]));
            ctl.start_camera_capture().await.unwrap();
            ctl.reset();
            assert_eq!(camera.stopped.load(Ordering::SeqCst), 1);
            assert_eq!(ctl.phase(), ScanPhase::Empty);

            ctl.start_camera_capture().await.unwrap();
        }
        assert_eq!(camera.stopped.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn server_capture_sends_no_payload_and_no_progress() {
        let transport = GatedTransport::new(vec![10, 20]);
        let mut ctl = controller(FakeCamera::new(true), transport.clone());
        ctl.select_server_capture().unwrap();
        assert!(ctl.preview().is_none());

        let release = transport.gate();
        ctl.request_analysis().unwrap();
        assert_eq!(ctl.transfer(), TransferState::InFlight { progress: None });
        release.send(Ok(json!({ "text": {} }))).unwrap();

        assert_eq!(ctl.await_outcome().await, ScanPhase::ResultReady);
        assert!(matches!(
            ctl.state().outcome(),
            Some(ScanOutcome::Unrecognized(_))
        ));
        assert_eq!(
            transport.requests.lock().unwrap().as_slice(),
            &[DispatchRequest::ServerCapture]
        );
    }

    #[tokio::test]
    async fn transport_failure_moves_to_error() {
        let transport = GatedTransport::new(vec![0, 100]);
        let mut ctl = controller(FakeCamera::new(true), transport.clone());
        ctl.select_server_capture().unwrap();
        let release = transport.gate();
        ctl.request_analysis().unwrap();
        release
            .send(Err(ScanError::transport(Some(502), "bad gateway")))
            .unwrap();

        assert_eq!(ctl.await_outcome().await, ScanPhase::Error);
        assert_eq!(
            ctl.state().error(),
            Some(&ScanError::transport(Some(502), "bad gateway"))
        );
        assert!(matches!(ctl.transfer(), TransferState::Failed(_)));

        ctl.reset();
        assert_eq!(ctl.phase(), ScanPhase::Empty);
        assert!(ctl.last_error().is_none());
    }

    #[tokio::test]
    async fn unreadable_file_moves_to_error() {
        let mut ctl = controller(FakeCamera::new(true), GatedTransport::new(vec![]));
        let missing = std::env::temp_dir().join(format!("nutrilens-missing-{}.jpg", uuid::Uuid::new_v4()));
        let err = ctl.select_file(&missing).await.unwrap_err();
        assert!(matches!(err, ScanError::FileUnreadable(_)));
        assert_eq!(ctl.phase(), ScanPhase::Error);
    }

    #[tokio::test]
    async fn invalid_transitions_leave_state_untouched() {
        let transport = GatedTransport::new(vec![]);
        let mut ctl = controller(FakeCamera::new(true), transport.clone());

        assert!(matches!(
            ctl.request_analysis(),
            Err(ScanError::InvalidTransition { operation: "request_analysis", phase: ScanPhase::Empty })
        ));
        assert!(matches!(
            ctl.capture_frame(),
            Err(ScanError::InvalidTransition { .. })
        ));
        assert!(ctl.cancel_camera().is_err());
        assert_eq!(ctl.phase(), ScanPhase::Empty);
        assert!(ctl.last_error().is_none());

        ctl.select_server_capture().unwrap();
        let _gate = transport.gate();
        ctl.request_analysis().unwrap();
        assert!(ctl.request_analysis().is_err());
        assert!(ctl.select_server_capture().is_err());
        assert!(ctl.start_camera_capture().await.is_err());
        assert_eq!(ctl.phase(), ScanPhase::Analyzing);
    }
}
