use std::fmt;
use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::{AiProvider, SendMessageBody};
use crate::core::frame_decoder::{decode_stream, DecodeSummary, FrameHandler};
use crate::utils::url::construct_api_url;

pub const SEND_ENDPOINT: &str = "chat/send";
pub const DEFAULT_SEND_ERROR: &str = "Failed to send message";
pub const NO_STREAM_ERROR: &str = "No response stream available";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamMessage {
    Meta(String),
    Chunk(String),
    Done,
    Error(String),
    /// The session is over: the body was exhausted, the request failed, or
    /// the stream was cancelled. Always the last message of a stream id.
    End,
}

/// A file sent as a `files` part of the multipart request.
#[derive(Clone, Debug)]
pub struct Attachment {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let mime_type = guess_mime_type(&name).to_string();
        Ok(Self {
            name,
            mime_type,
            data,
        })
    }
}

pub fn guess_mime_type(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("pdf") => "application/pdf",
        Some("txt" | "log") => "text/plain",
        Some("md" | "markdown") => "text/markdown",
        Some("csv") => "text/csv",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// Everything needed for one `chat/send` exchange.
#[derive(Clone, Debug)]
pub struct StreamRequest {
    pub base_url: String,
    pub token: Option<String>,
    pub provider: AiProvider,
    pub message: String,
    pub conversation_id: Option<String>,
    pub attachments: Vec<Attachment>,
}

/// Why a session ended before any frame could be decoded.
#[derive(Debug)]
pub enum SessionFailure {
    Request(reqwest::Error),
    Status(StatusCode),
    NoBody(StatusCode),
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionFailure::Request(err) => write!(f, "request failed: {err}"),
            SessionFailure::Status(status) => write!(f, "server responded with {status}"),
            SessionFailure::NoBody(status) => write!(f, "response {status} carried no body"),
        }
    }
}

#[derive(Debug)]
pub enum SessionOutcome {
    Streamed(DecodeSummary),
    Rejected(SessionFailure),
}

impl SessionOutcome {
    pub fn summary(&self) -> Option<&DecodeSummary> {
        match self {
            SessionOutcome::Streamed(summary) => Some(summary),
            SessionOutcome::Rejected(_) => None,
        }
    }
}

fn build_request(
    client: &reqwest::Client,
    request: &StreamRequest,
) -> Result<reqwest::RequestBuilder, reqwest::Error> {
    let url = construct_api_url(&request.base_url, SEND_ENDPOINT);
    let mut builder = client.post(url);

    if let Some(token) = request.token.as_deref().filter(|t| !t.is_empty()) {
        builder = builder.bearer_auth(token);
    }

    if request.attachments.is_empty() {
        let body = SendMessageBody {
            provider: request.provider,
            message: &request.message,
            conversation_id: request.conversation_id.as_deref(),
        };
        return Ok(builder.json(&body));
    }

    // reqwest picks the multipart boundary and sets the content type.
    let mut form = Form::new()
        .text("provider", request.provider.as_str())
        .text("message", request.message.clone());
    if let Some(conversation_id) = &request.conversation_id {
        form = form.text("conversationId", conversation_id.clone());
    }
    for attachment in &request.attachments {
        let part = Part::bytes(attachment.data.clone())
            .file_name(attachment.name.clone())
            .mime_str(&attachment.mime_type)?;
        form = form.part("files", part);
    }
    Ok(builder.multipart(form))
}

/// Pull the `message` field out of an error response body.
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    value
        .get("message")
        .and_then(|message| message.as_str())
        .map(str::trim)
        .filter(|message| !message.is_empty())
        .map(str::to_owned)
}

/// Send one message and feed the response body through the frame decoder.
///
/// Failures before streaming starts produce exactly one `on_error` call and
/// the body is never read.
pub async fn send_message_stream<H>(
    client: &reqwest::Client,
    request: &StreamRequest,
    handler: &mut H,
) -> SessionOutcome
where
    H: FrameHandler + ?Sized,
{
    let response = match build_request(client, request) {
        Ok(builder) => builder.send().await,
        Err(err) => Err(err),
    };

    let response = match response {
        Ok(response) => response,
        Err(err) => {
            warn!(error = %err, "chat request failed before streaming");
            handler.on_error(DEFAULT_SEND_ERROR.to_string());
            return SessionOutcome::Rejected(SessionFailure::Request(err));
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message =
            extract_error_message(&body).unwrap_or_else(|| DEFAULT_SEND_ERROR.to_string());
        warn!(%status, %message, "chat request rejected");
        handler.on_error(message);
        return SessionOutcome::Rejected(SessionFailure::Status(status));
    }

    if matches!(status, StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT) {
        handler.on_error(NO_STREAM_ERROR.to_string());
        return SessionOutcome::Rejected(SessionFailure::NoBody(status));
    }

    debug!(provider = %request.provider, "streaming chat response");
    let summary = decode_stream(response.bytes_stream(), handler).await;
    debug!(?summary, "chat stream finished");
    SessionOutcome::Streamed(summary)
}

pub struct StreamParams {
    pub client: reqwest::Client,
    pub request: StreamRequest,
    pub cancel_token: CancellationToken,
    pub stream_id: u64,
}

struct ChannelHandler {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
    stream_id: u64,
}

impl ChannelHandler {
    fn send(&self, message: StreamMessage) {
        let _ = self.tx.send((message, self.stream_id));
    }
}

impl FrameHandler for ChannelHandler {
    fn on_meta(&mut self, conversation_id: String) {
        self.send(StreamMessage::Meta(conversation_id));
    }

    fn on_chunk(&mut self, content: String) {
        self.send(StreamMessage::Chunk(content));
    }

    fn on_done(&mut self) {
        self.send(StreamMessage::Done);
    }

    fn on_error(&mut self, message: String) {
        self.send(StreamMessage::Error(message));
    }
}

/// Runs sessions on background tasks and forwards their events, tagged with
/// the stream id, to a single receiver.
#[derive(Clone)]
pub struct ChatStreamService {
    tx: mpsc::UnboundedSender<(StreamMessage, u64)>,
}

impl ChatStreamService {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(StreamMessage, u64)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn spawn_stream(&self, params: StreamParams) -> tokio::task::JoinHandle<()> {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let StreamParams {
                client,
                request,
                cancel_token,
                stream_id,
            } = params;

            let mut handler = ChannelHandler {
                tx: tx.clone(),
                stream_id,
            };

            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    debug!(stream_id, "chat stream cancelled");
                }
                _ = send_message_stream(&client, &request, &mut handler) => {}
            }

            let _ = tx.send((StreamMessage::End, stream_id));
        })
    }
}
