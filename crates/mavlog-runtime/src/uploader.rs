//! HTTP log uploader
//!
//! Each upload is a multipart POST running in its own task. Progress and the
//! final outcome are reported back to the coordinator through the event
//! channel; an abort cancels the request and reports a failure.

use futures::StreamExt;
use mavlog_core::{Event, EventSender, UploadError, UploadOutcome, UploadRequest};
use reqwest::multipart::{Form, Part};
use reqwest::Body;
use std::io;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{RuntimeError, RuntimeResult};

/// Multipart field carrying the log file
pub const FILE_FIELD: &str = "filearg";

/// Redirect hops followed before giving up
const MAX_REDIRECTS: usize = 10;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

// ----------------------------------------------------------------------------
// Uploader Trait
// ----------------------------------------------------------------------------

/// Performs uploads requested by the coordinator
pub trait LogUploader: Send {
    /// Start uploading; progress and completion are sent on `events`
    fn begin(&mut self, request: UploadRequest, events: EventSender);

    /// Best-effort abort of the in-flight upload
    fn abort(&mut self);
}

// ----------------------------------------------------------------------------
// HTTP Uploader
// ----------------------------------------------------------------------------

/// reqwest-backed multipart uploader
pub struct HttpUploader {
    client: reqwest::Client,
    cancel: Option<CancellationToken>,
}

impl HttpUploader {
    pub fn new() -> RuntimeResult<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("mavlog/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RuntimeError::HttpClient)?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            cancel: None,
        }
    }
}

impl LogUploader for HttpUploader {
    fn begin(&mut self, request: UploadRequest, events: EventSender) {
        if let Some(previous) = self.cancel.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        self.cancel = Some(token.clone());
        let client = self.client.clone();

        tokio::spawn(async move {
            let name = request.name.clone();
            let outcome = tokio::select! {
                result = send_multipart(&client, &request, &events) => match result {
                    Ok((status, body)) => UploadOutcome::Response { status, body },
                    Err(e) => {
                        warn!(log = %name, "Upload failed: {}", e);
                        UploadOutcome::Failed { reason: e.to_string() }
                    }
                },
                _ = token.cancelled() => {
                    info!(log = %name, "Upload aborted");
                    UploadOutcome::Failed { reason: UploadError::Aborted.to_string() }
                }
            };
            if events
                .send(Event::UploadFinished { name, outcome })
                .await
                .is_err()
            {
                debug!("Event channel closed before upload completion was reported");
            }
        });
    }

    fn abort(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }
}

fn transport(e: impl std::fmt::Display) -> UploadError {
    UploadError::Transport {
        reason: e.to_string(),
    }
}

/// POST the log and its metadata; returns the status code and response body
async fn send_multipart(
    client: &reqwest::Client,
    request: &UploadRequest,
    events: &EventSender,
) -> Result<(u16, String), UploadError> {
    let file = match tokio::fs::File::open(&request.file_path).await {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(UploadError::FileMissing {
                path: request.file_path.clone(),
            })
        }
        Err(e) => return Err(transport(format!("could not open log file: {}", e))),
    };
    let total = file.metadata().await.map_err(transport)?.len();
    let file_name = request
        .file_path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}.ulg", request.name));

    let progress = events.clone();
    let name = request.name.clone();
    let mut sent = 0u64;
    let stream = ReaderStream::new(file).map(move |chunk| {
        if let Ok(bytes) = &chunk {
            sent += bytes.len() as u64;
            // Progress is advisory; a full channel just skips an update
            let _ = progress.try_send(Event::UploadProgress {
                name: name.clone(),
                bytes_sent: sent,
                bytes_total: total,
            });
        }
        chunk
    });

    let part = Part::stream_with_length(Body::wrap_stream(stream), total)
        .file_name(file_name)
        .mime_str("application/octet-stream")
        .map_err(transport)?;
    let form = Form::new()
        .text("email", request.email.clone())
        .text("description", request.description.clone())
        .text("source", request.source.clone())
        .text("version", request.version.clone())
        .part(FILE_FIELD, part);

    info!(log = %request.name, bytes = total, url = %request.url, "Uploading log");
    let response = client
        .post(&request.url)
        .multipart(form)
        .send()
        .await
        .map_err(transport)?;
    let status = response.status().as_u16();
    let body = response.text().await.map_err(transport)?;
    debug!(log = %request.name, status, "Upload response received");
    Ok((status, body))
}
