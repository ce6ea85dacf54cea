//! Incremental decoder for the chat event stream.
//!
//! The backend answers `chat/send` with newline-delimited `data: {json}`
//! lines. Bytes arrive in arbitrary chunks, so a [`FrameDecoder`] keeps the
//! unfinished tail of the current line (and of any multi-byte UTF-8
//! sequence) between calls to [`FrameDecoder::push`]. Complete lines are
//! parsed into [`Frame`]s and dispatched to a [`FrameHandler`] in order.
//!
//! Decoding never fails outward. Lines without the `data: ` prefix are
//! ignored, malformed JSON is skipped, and whatever is left unterminated when
//! the stream ends is dropped.

use std::fmt::Display;

use futures_util::{Stream, StreamExt};
use memchr::memchr;
use tracing::{debug, warn};

use crate::api::{Frame, FrameKind};

pub const DATA_PREFIX: &str = "data: ";
pub const DEFAULT_PROVIDER_ERROR: &str = "AI provider error";

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Receives decoded frames. Empty `meta`/`chunk` payloads never reach it.
pub trait FrameHandler {
    fn on_meta(&mut self, conversation_id: String);
    fn on_chunk(&mut self, content: String);
    fn on_done(&mut self);
    fn on_error(&mut self, message: String);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    pub frames_dispatched: usize,
    pub malformed_frames: usize,
    pub ignored_lines: usize,
    pub discarded_bytes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalFrame {
    Done,
    Error,
}

/// What a finished decode loop observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    pub stats: DecodeStats,
    /// The first `done` or `error` frame seen, if any.
    pub terminal: Option<TerminalFrame>,
    /// Set when the byte source failed before reaching end-of-stream.
    pub interrupted: Option<String>,
}

#[derive(Debug, Default)]
pub struct FrameDecoder {
    utf8_carry: Vec<u8>,
    buffer: String,
    stats: DecodeStats,
    terminal: Option<TerminalFrame>,
    bom_checked: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of the response body.
    pub fn push<H>(&mut self, chunk: &[u8], handler: &mut H)
    where
        H: FrameHandler + ?Sized,
    {
        self.decode_text(chunk);

        let mut start = 0;
        while let Some(relative) = memchr(b'\n', &self.buffer.as_bytes()[start..]) {
            let end = start + relative;
            let line = &self.buffer[start..end];
            let terminal = dispatch_line(line, handler, &mut self.stats);
            if self.terminal.is_none() {
                self.terminal = terminal;
            }
            start = end + 1;
        }

        if start > 0 {
            self.buffer.drain(..start);
        }
    }

    /// End of stream. Drops any unterminated line and returns how many bytes
    /// were thrown away.
    pub fn finish(&mut self) -> usize {
        let discarded = self.buffer.len() + self.utf8_carry.len();
        if discarded > 0 {
            debug!(discarded, "dropping unterminated tail of event stream");
        }
        self.buffer.clear();
        self.utf8_carry.clear();
        self.stats.discarded_bytes += discarded;
        discarded
    }

    /// The not-yet-terminated line.
    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats
    }

    pub fn terminal(&self) -> Option<TerminalFrame> {
        self.terminal
    }

    fn decode_text(&mut self, chunk: &[u8]) {
        self.utf8_carry.extend_from_slice(chunk);

        // A byte order mark is only stripped at the very start of the body.
        if !self.bom_checked {
            if self.utf8_carry.len() < UTF8_BOM.len() && UTF8_BOM.starts_with(&self.utf8_carry) {
                return;
            }
            if self.utf8_carry.starts_with(UTF8_BOM) {
                self.utf8_carry.drain(..UTF8_BOM.len());
            }
            self.bom_checked = true;
        }

        let mut consumed = 0;
        loop {
            match std::str::from_utf8(&self.utf8_carry[consumed..]) {
                Ok(text) => {
                    self.buffer.push_str(text);
                    consumed = self.utf8_carry.len();
                    break;
                }
                Err(err) => {
                    let valid_end = consumed + err.valid_up_to();
                    if let Ok(valid) = std::str::from_utf8(&self.utf8_carry[consumed..valid_end])
                    {
                        self.buffer.push_str(valid);
                    }
                    match err.error_len() {
                        Some(invalid_len) => {
                            self.buffer.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid_end + invalid_len;
                        }
                        // Incomplete sequence at the end: wait for the next chunk.
                        None => {
                            consumed = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.utf8_carry.drain(..consumed);
    }
}

fn dispatch_line<H>(line: &str, handler: &mut H, stats: &mut DecodeStats) -> Option<TerminalFrame>
where
    H: FrameHandler + ?Sized,
{
    let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
        stats.ignored_lines += 1;
        return None;
    };

    let payload = rest.trim();
    if payload.is_empty() {
        return None;
    }

    let frame = match serde_json::from_str::<Frame>(payload) {
        Ok(frame) => frame,
        Err(err) => {
            stats.malformed_frames += 1;
            debug!(error = %err, "skipping malformed stream frame");
            return None;
        }
    };

    stats.frames_dispatched += 1;
    dispatch_frame(frame, handler)
}

fn dispatch_frame<H>(frame: Frame, handler: &mut H) -> Option<TerminalFrame>
where
    H: FrameHandler + ?Sized,
{
    match frame.kind {
        FrameKind::Meta => {
            if let Some(id) = frame.conversation_id.filter(|id| !id.is_empty()) {
                handler.on_meta(id);
            }
            None
        }
        FrameKind::Chunk => {
            if let Some(content) = frame.content.filter(|content| !content.is_empty()) {
                handler.on_chunk(content);
            }
            None
        }
        FrameKind::Done => {
            handler.on_done();
            Some(TerminalFrame::Done)
        }
        FrameKind::Error => {
            let message = frame
                .message
                .filter(|message| !message.is_empty())
                .unwrap_or_else(|| DEFAULT_PROVIDER_ERROR.to_string());
            handler.on_error(message);
            Some(TerminalFrame::Error)
        }
        FrameKind::Unknown => None,
    }
}

/// Drive a [`FrameDecoder`] over a body stream until it is exhausted.
///
/// Reading continues after `done`/`error` so the connection is drained. A
/// transport error ends the loop like end-of-stream and is reported only in
/// the returned summary.
pub async fn decode_stream<S, B, E, H>(stream: S, handler: &mut H) -> DecodeSummary
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
    H: FrameHandler + ?Sized,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = FrameDecoder::new();
    let mut interrupted = None;

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => decoder.push(bytes.as_ref(), handler),
            Err(err) => {
                warn!(error = %err, "event stream interrupted");
                interrupted = Some(err.to_string());
                break;
            }
        }
    }

    decoder.finish();
    DecodeSummary {
        stats: decoder.stats(),
        terminal: decoder.terminal(),
        interrupted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Meta(String),
        Chunk(String),
        Done,
        Error(String),
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
    }

    impl FrameHandler for Recorder {
        fn on_meta(&mut self, conversation_id: String) {
            self.events.push(Event::Meta(conversation_id));
        }

        fn on_chunk(&mut self, content: String) {
            self.events.push(Event::Chunk(content));
        }

        fn on_done(&mut self) {
            self.events.push(Event::Done);
        }

        fn on_error(&mut self, message: String) {
            self.events.push(Event::Error(message));
        }
    }

    const TRANSCRIPT: &str = concat!(
        ": keep-alive\n",
        "data: {\"type\":\"meta\",\"conversationId\":\"conv-1\"}\n",
        "\n",
        "data: {\"type\":\"chunk\",\"content\":\"Grüß \"}\n",
        "data: {\"type\":\"chunk\",\"content\":\"dich 👋\"}\r\n",
        "data: {not json}\n",
        "data: {\"type\":\"chunk\",\"content\":\"!\"}\n",
        "data: {\"type\":\"done\"}\n",
    );

    fn decode_chunks(chunks: &[&[u8]]) -> (Vec<Event>, FrameDecoder) {
        let mut decoder = FrameDecoder::new();
        let mut recorder = Recorder::default();
        for chunk in chunks {
            decoder.push(chunk, &mut recorder);
        }
        (recorder.events, decoder)
    }

    fn expected_transcript_events() -> Vec<Event> {
        vec![
            Event::Meta("conv-1".to_string()),
            Event::Chunk("Grüß ".to_string()),
            Event::Chunk("dich 👋".to_string()),
            Event::Chunk("!".to_string()),
            Event::Done,
        ]
    }

    #[test]
    fn whole_transcript_dispatches_in_order() {
        let (events, decoder) = decode_chunks(&[TRANSCRIPT.as_bytes()]);
        assert_eq!(events, expected_transcript_events());
        assert_eq!(decoder.buffered(), "");
        assert_eq!(decoder.stats().malformed_frames, 1);
        assert_eq!(decoder.stats().ignored_lines, 2);
        assert_eq!(decoder.terminal(), Some(TerminalFrame::Done));
    }

    #[test]
    fn every_two_way_split_matches_single_chunk() {
        let bytes = TRANSCRIPT.as_bytes();
        let expected = expected_transcript_events();
        for split in 0..=bytes.len() {
            let (events, _) = decode_chunks(&[&bytes[..split], &bytes[split..]]);
            assert_eq!(events, expected, "split at byte {split}");
        }
    }

    #[test]
    fn byte_at_a_time_matches_single_chunk() {
        let chunks: Vec<&[u8]> = TRANSCRIPT.as_bytes().chunks(1).collect();
        let (events, decoder) = decode_chunks(&chunks);
        assert_eq!(events, expected_transcript_events());
        assert_eq!(decoder.stats().malformed_frames, 1);
    }

    #[test]
    fn consecutive_chunks_then_done() {
        let (events, _) = decode_chunks(&[
            b"data: {\"type\":\"chunk\",\"content\":\"hi\"}\n",
            b"data: {\"type\":\"chunk\",\"content\":\" there\"}\ndata: {\"type\":\"done\"}\n",
        ]);
        assert_eq!(
            events,
            vec![
                Event::Chunk("hi".to_string()),
                Event::Chunk(" there".to_string()),
                Event::Done,
            ]
        );
    }

    #[test]
    fn malformed_line_between_frames_is_skipped() {
        let (events, decoder) = decode_chunks(&[concat!(
            "data: {\"type\":\"chunk\",\"content\":\"a\"}\n",
            "data: {not json}\n",
            "data: {\"type\":\"chunk\",\"content\":\"b\"}\n",
        )
        .as_bytes()]);
        assert_eq!(
            events,
            vec![Event::Chunk("a".to_string()), Event::Chunk("b".to_string())]
        );
        assert_eq!(decoder.stats().malformed_frames, 1);
        assert_eq!(decoder.stats().frames_dispatched, 2);
    }

    #[test]
    fn empty_meta_and_chunk_payloads_are_ignored() {
        let (events, _) = decode_chunks(&[concat!(
            "data: {\"type\":\"meta\",\"conversationId\":\"\"}\n",
            "data: {\"type\":\"meta\"}\n",
            "data: {\"type\":\"chunk\",\"content\":\"\"}\n",
            "data: {\"type\":\"chunk\"}\n",
        )
        .as_bytes()]);
        assert!(events.is_empty());
    }

    #[test]
    fn error_frame_without_message_uses_default() {
        let (events, decoder) = decode_chunks(&[b"data: {\"type\":\"error\"}\n"]);
        assert_eq!(events, vec![Event::Error(DEFAULT_PROVIDER_ERROR.to_string())]);
        assert_eq!(decoder.terminal(), Some(TerminalFrame::Error));

        let (events, _) =
            decode_chunks(&[b"data: {\"type\":\"error\",\"message\":\"quota exceeded\"}\n"]);
        assert_eq!(events, vec![Event::Error("quota exceeded".to_string())]);
    }

    #[test]
    fn prefix_must_match_exactly() {
        let (events, decoder) = decode_chunks(&[concat!(
            "data:{\"type\":\"done\"}\n",
            " data: {\"type\":\"done\"}\n",
            "event: done\n",
            "data:    \n",
        )
        .as_bytes()]);
        assert!(events.is_empty());
        assert_eq!(decoder.stats().ignored_lines, 3);
        assert_eq!(decoder.stats().malformed_frames, 0);
    }

    #[test]
    fn unterminated_tail_is_discarded_at_finish() {
        let (events, mut decoder) = decode_chunks(&[
            b"data: {\"type\":\"chunk\",\"content\":\"kept\"}\n",
            b"data: {\"type\":\"chunk\",\"content\":\"lost\"}",
        ]);
        assert_eq!(events, vec![Event::Chunk("kept".to_string())]);
        assert_eq!(
            decoder.buffered(),
            "data: {\"type\":\"chunk\",\"content\":\"lost\"}"
        );

        let discarded = decoder.finish();
        assert_eq!(discarded, 39);
        assert_eq!(decoder.buffered(), "");
        assert_eq!(decoder.stats().discarded_bytes, 39);
    }

    #[test]
    fn split_multibyte_character_is_reassembled() {
        let line = "data: {\"type\":\"chunk\",\"content\":\"é\"}\n".as_bytes();
        let accent = line.iter().position(|b| *b == 0xC3).unwrap();
        let (events, _) = decode_chunks(&[&line[..=accent], &line[accent + 1..]]);
        assert_eq!(events, vec![Event::Chunk("é".to_string())]);
    }

    #[test]
    fn invalid_utf8_becomes_replacement_character() {
        let mut line = b"data: {\"type\":\"chunk\",\"content\":\"a".to_vec();
        line.push(0xFF);
        line.extend_from_slice(b"b\"}\n");
        let (events, _) = decode_chunks(&[&line]);
        assert_eq!(events, vec![Event::Chunk("a\u{FFFD}b".to_string())]);
    }

    #[test]
    fn frames_after_done_are_still_dispatched() {
        let (events, decoder) = decode_chunks(&[concat!(
            "data: {\"type\":\"done\"}\n",
            "data: {\"type\":\"chunk\",\"content\":\"late\"}\n",
        )
        .as_bytes()]);
        assert_eq!(events, vec![Event::Done, Event::Chunk("late".to_string())]);
        assert_eq!(decoder.terminal(), Some(TerminalFrame::Done));
    }

    #[test]
    fn unknown_frame_types_are_ignored() {
        let (events, decoder) = decode_chunks(&[b"data: {\"type\":\"usage\",\"tokens\":3}\n"]);
        assert!(events.is_empty());
        assert_eq!(decoder.stats().malformed_frames, 0);
    }

    #[test]
    fn leading_byte_order_mark_is_stripped_across_chunks() {
        let body = concat!(
            "data: {\"type\":\"meta\",\"conversationId\":\"c1\"}\n",
            "data: {\"type\":\"done\"}\n",
        );
        let (events, decoder) = decode_chunks(&[b"\xEF\xBB", b"\xBF", body.as_bytes()]);

        assert_eq!(events, vec![Event::Meta("c1".to_string()), Event::Done]);
        assert_eq!(decoder.stats().ignored_lines, 0);
    }

    #[test]
    fn byte_order_mark_after_the_first_byte_is_kept() {
        let (events, decoder) = decode_chunks(&[
            b"data: {\"type\":\"done\"}\n",
            b"\xEF\xBB\xBFdata: {\"type\":\"done\"}\n",
        ]);
        assert_eq!(events, vec![Event::Done]);
        assert_eq!(decoder.stats().ignored_lines, 1);
    }

    #[test]
    fn finish_counts_unfinished_utf8_sequence() {
        let mut decoder = FrameDecoder::new();
        let mut recorder = Recorder::default();
        decoder.push(b"data: x\n\xC3", &mut recorder);

        assert_eq!(decoder.buffered(), "");
        assert_eq!(decoder.finish(), 1);
        assert_eq!(decoder.stats().discarded_bytes, 1);
        assert_eq!(decoder.stats().malformed_frames, 1);
    }

    #[tokio::test]
    async fn decode_stream_reads_to_exhaustion() {
        let chunks: Vec<Result<&[u8], String>> = vec![
            Ok(b"data: {\"type\":\"chunk\",\"con"),
            Ok(b"tent\":\"x\"}\ndata: {\"type\":\"done\"}\n"),
            Ok(b"data: {\"type\":\"chunk\",\"content\":\"tail\"}"),
        ];
        let mut recorder = Recorder::default();
        let summary = decode_stream(stream::iter(chunks), &mut recorder).await;

        assert_eq!(
            recorder.events,
            vec![Event::Chunk("x".to_string()), Event::Done]
        );
        assert_eq!(summary.terminal, Some(TerminalFrame::Done));
        assert_eq!(summary.interrupted, None);
        assert!(summary.stats.discarded_bytes > 0);
    }

    #[tokio::test]
    async fn decode_stream_stops_on_transport_error() {
        let chunks: Vec<Result<&[u8], String>> = vec![
            Ok(b"data: {\"type\":\"chunk\",\"content\":\"partial\"}\n"),
            Err("connection reset".to_string()),
            Ok(b"data: {\"type\":\"done\"}\n"),
        ];
        let mut recorder = Recorder::default();
        let summary = decode_stream(stream::iter(chunks), &mut recorder).await;

        assert_eq!(recorder.events, vec![Event::Chunk("partial".to_string())]);
        assert_eq!(summary.terminal, None);
        assert_eq!(summary.interrupted.as_deref(), Some("connection reset"));
    }
}
