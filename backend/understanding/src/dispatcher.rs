//! HTTP transfer to the label analysis service.
//!
//! Uploads go out as a multipart form with a single `file` part whose body is
//! streamed in chunks; each chunk handed to the connection advances the
//! progress tracker. Server-side capture is a bodyless POST carrying the
//! capture query flag.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use nutrilens_core::{AnalysisTransport, DispatchRequest, ImagePayload, ProgressSink, RawResponse, ScanError};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, Url};
use tracing::{debug, info, warn};

use crate::progress::ProgressTracker;

pub const DEFAULT_CHUNK_SIZE: usize = 16 * 1024;
pub const DEFAULT_CAPTURE_PARAM: &str = "capture";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const UPLOAD_FIELD: &str = "file";
const MAX_ERROR_BODY: usize = 512;

/// Sends images (or capture instructions) to the analysis endpoint.
pub struct TransferDispatcher {
    client: Client,
    endpoint: Url,
    capture_param: String,
    chunk_size: usize,
    api_key: Option<String>,
}

impl TransferDispatcher {
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("Invalid analysis endpoint URL: {endpoint}"))?;
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint,
            capture_param: DEFAULT_CAPTURE_PARAM.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            api_key: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(self)
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_capture_param(mut self, param: impl Into<String>) -> Self {
        self.capture_param = param.into();
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.filter(|k| !k.is_empty());
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Endpoint URL with the capture flag set.
    pub fn capture_url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair(&self.capture_param, "true");
        url
    }

    /// Upload a payload, reporting progress as chunks are handed to the connection.
    ///
    /// The tracker is sealed before this returns, whatever the outcome.
    pub async fn upload(
        &self,
        payload: ImagePayload,
        tracker: Arc<ProgressTracker>,
    ) -> Result<RawResponse, ScanError> {
        let total = payload.len() as u64;
        tracker.report(0);

        let body = chunked_body(payload.bytes, self.chunk_size, tracker.clone());
        let part = Part::stream_with_length(body, total)
            .file_name(payload.file_name)
            .mime_str(&payload.mime_type)
            .map_err(|e| ScanError::transport(None, format!("invalid image MIME type: {e}")));

        let result = match part {
            Ok(part) => {
                let form = Form::new().part(UPLOAD_FIELD, part);
                debug!(url = %self.endpoint, bytes = total, "Uploading image for analysis");
                self.execute(self.authorize(self.client.post(self.endpoint.clone())).multipart(form))
                    .await
            }
            Err(e) => Err(e),
        };
        tracker.seal();
        result
    }

    /// Ask the service to capture the image itself. No body, no progress.
    pub async fn request_capture(&self) -> Result<RawResponse, ScanError> {
        let url = self.capture_url();
        debug!(url = %url, "Requesting server-side capture");
        self.execute(self.authorize(self.client.post(url))).await
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn execute(&self, request: RequestBuilder) -> Result<RawResponse, ScanError> {
        let response = request.send().await.map_err(|e| {
            ScanError::transport(e.status().map(|s| s.as_u16()), describe_request_error(&e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                truncate(body.trim(), MAX_ERROR_BODY)
            };
            return Err(ScanError::transport(Some(status.as_u16()), message));
        }

        let body = response.bytes().await.map_err(|e| {
            ScanError::transport(Some(status.as_u16()), format!("failed to read response body: {e}"))
        })?;
        serde_json::from_slice::<RawResponse>(&body)
            .map_err(|e| ScanError::ResponseParseError(e.to_string()))
    }
}

#[async_trait]
impl AnalysisTransport for TransferDispatcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn dispatch(
        &self,
        request: DispatchRequest,
        progress: Arc<dyn ProgressSink>,
    ) -> Result<RawResponse, ScanError> {
        let mode = request.mode();
        let result = match request {
            DispatchRequest::Upload(payload) => {
                self.upload(payload, Arc::new(ProgressTracker::new(progress))).await
            }
            DispatchRequest::ServerCapture => self.request_capture().await,
        };
        match &result {
            Ok(_) => info!(mode, "Analysis request completed"),
            Err(e) => warn!(mode, error = %e, "Analysis request failed"),
        }
        result
    }
}

/// Split a payload into a streamed body that reports progress per chunk.
fn chunked_body(bytes: Bytes, chunk_size: usize, tracker: Arc<ProgressTracker>) -> Body {
    let total = bytes.len() as u64;
    let chunk_size = chunk_size.max(1);
    let chunks: Vec<Bytes> = (0..bytes.len())
        .step_by(chunk_size)
        .map(|start| bytes.slice(start..(start + chunk_size).min(bytes.len())))
        .collect();

    let mut sent = 0u64;
    let stream = futures::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        tracker.report_bytes(sent, total);
        Ok::<Bytes, std::io::Error>(chunk)
    });
    Body::wrap_stream(stream)
}

fn describe_request_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request to analysis service timed out".to_string()
    } else if e.is_connect() {
        format!("could not connect to analysis service: {e}")
    } else {
        e.to_string()
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &s[..end])
}
