use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ScanError;
use crate::types::{DispatchRequest, RawResponse};

/// Receives upload progress for one dispatch, as a percentage in `0..=100`.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, percent: u8);
}

impl<F> ProgressSink for F
where
    F: Fn(u8) + Send + Sync,
{
    fn on_progress(&self, percent: u8) {
        self(percent)
    }
}

/// A sink that drops every update. Used for the server-capture path and in tests.
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_progress(&self, _percent: u8) {}
}

/// Sends one request to the remote analysis service.
///
/// Implementations perform exactly one attempt and never retry. Progress is
/// only reported for requests that carry a payload.
#[async_trait]
pub trait AnalysisTransport: Send + Sync {
    /// Transport name for logs (e.g., "http").
    fn name(&self) -> &str;

    async fn dispatch(
        &self,
        request: DispatchRequest,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<RawResponse, ScanError>;
}
