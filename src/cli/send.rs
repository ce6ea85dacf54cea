use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::api::AiProvider;
use crate::core::chat_stream::{send_message_stream, Attachment, SessionOutcome};
use crate::core::client::ChatClient;
use crate::core::frame_decoder::{FrameHandler, TerminalFrame};

/// Writes reply text to `out` as it arrives and remembers the first error.
pub struct PrintHandler<W: Write> {
    out: W,
    pub conversation_id: Option<String>,
    pub error: Option<String>,
    pub wrote_text: bool,
}

impl<W: Write> PrintHandler<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            conversation_id: None,
            error: None,
            wrote_text: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> FrameHandler for PrintHandler<W> {
    fn on_meta(&mut self, conversation_id: String) {
        self.conversation_id = Some(conversation_id);
    }

    fn on_chunk(&mut self, content: String) {
        let _ = self.out.write_all(content.as_bytes());
        let _ = self.out.flush();
        self.wrote_text = true;
    }

    fn on_done(&mut self) {
        if self.wrote_text {
            let _ = writeln!(self.out);
        }
    }

    fn on_error(&mut self, message: String) {
        if self.error.is_none() {
            self.error = Some(message);
        }
    }
}

pub async fn load_attachments(paths: &[PathBuf]) -> Result<Vec<Attachment>, Box<dyn Error>> {
    let mut attachments = Vec::with_capacity(paths.len());
    for path in paths {
        let attachment = Attachment::from_path(path)
            .await
            .map_err(|err| format!("Failed to read {}: {err}", path.display()))?;
        attachments.push(attachment);
    }
    Ok(attachments)
}

pub async fn send_once(
    client: &ChatClient,
    provider: AiProvider,
    message: &str,
    conversation_id: Option<String>,
    files: &[PathBuf],
) -> Result<(), Box<dyn Error>> {
    let message = message.trim();
    if message.is_empty() && files.is_empty() {
        return Err("Nothing to send: provide a message or --file".into());
    }

    let attachments = load_attachments(files).await?;
    let request = client.stream_request(provider, message, conversation_id.as_deref(), attachments);

    let mut handler = PrintHandler::new(io::stdout());
    let outcome = send_message_stream(client.http(), &request, &mut handler).await;

    if let Some(id) = &handler.conversation_id {
        eprintln!("conversation: {id}");
    }
    if let Some(error) = handler.error {
        return Err(error.into());
    }
    if let SessionOutcome::Streamed(summary) = outcome {
        if summary.terminal != Some(TerminalFrame::Done) {
            let reason = summary
                .interrupted
                .unwrap_or_else(|| "connection closed".to_string());
            return Err(format!("Response ended early: {reason}").into());
        }
    }
    Ok(())
}
