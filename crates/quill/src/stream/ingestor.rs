//! Streaming protocol state machine.
//!
//! Consumes the chunked generation response byte-by-byte and yields decoded
//! [`StreamEvent`]s. The decoder is deliberately synchronous and pull-based:
//! the read loop feeds it raw chunks and applies whatever events come out, so
//! the whole state machine is testable without a transport.
//!
//! Framing rules:
//! - Chunk boundaries are arbitrary; a line is only acted on once its
//!   terminator has been observed. The trailing partial line is retained and
//!   prefixed to the next chunk. UTF-8 sequences split across chunks are
//!   handled by buffering bytes, not decoded text.
//! - In event mode, `data:`-prefixed lines carry JSON events with a `type`
//!   discriminator. The literal `[DONE]` marker is a no-op terminator and is
//!   never JSON-parsed. A malformed line is skipped; it never aborts the
//!   stream.
//! - In raw-token mode, lines are content fragments as-is. Raw lines are
//!   never JSON-parsed.
//!
//! The mode is sniffed from the first non-empty line. This heuristic is
//! fragile when an answer legitimately opens with "data:"; an explicit
//! protocol-version marker from the backend would remove the ambiguity.

use tracing::{debug, warn};

use super::event::{DONE_MARKER, EVENT_PREFIX, StreamEvent};

/// Which response shape the stream turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMode {
    /// Not yet determined; no non-empty line seen.
    Unknown,
    /// Structured `data:<json>` event stream.
    Events,
    /// Plain lines treated directly as content fragments.
    RawTokens,
}

/// Incremental newline framer over raw bytes.
///
/// Buffers bytes (not text) so multi-byte UTF-8 sequences may split across
/// chunks. Lines are decoded lossily once complete; `\r\n` terminators are
/// normalized.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop(); // the '\n'
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Drain the trailing partial line, if any. Called once at end of
    /// transport.
    pub fn take_remainder(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buf);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Decoder for one generation stream.
pub struct StreamIngestor {
    framer: LineFramer,
    mode: ProtocolMode,
    terminal_seen: bool,
}

impl StreamIngestor {
    pub fn new() -> Self {
        Self {
            framer: LineFramer::new(),
            mode: ProtocolMode::Unknown,
            terminal_seen: false,
        }
    }

    pub fn mode(&self) -> ProtocolMode {
        self.mode
    }

    /// Whether a terminal condition (`done`, `error`, or the literal marker)
    /// has been observed. Once set, further input is ignored.
    pub fn terminal_seen(&self) -> bool {
        self.terminal_seen
    }

    /// Feed one transport chunk, returning the events it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.terminal_seen {
            return Vec::new();
        }
        let mut events = Vec::new();
        for line in self.framer.push(chunk) {
            if self.terminal_seen {
                break;
            }
            if let Some(event) = self.decode_line(&line, false) {
                if event.is_terminal() {
                    self.terminal_seen = true;
                }
                events.push(event);
            }
        }
        events
    }

    /// Flush the trailing partial line at end of transport. The caller is
    /// responsible for finalizing the turn if no terminal event was seen.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        if self.terminal_seen {
            return Vec::new();
        }
        let Some(rest) = self.framer.take_remainder() else {
            return Vec::new();
        };
        match self.decode_line(&rest, true) {
            Some(event) => {
                if event.is_terminal() {
                    self.terminal_seen = true;
                }
                vec![event]
            }
            None => Vec::new(),
        }
    }

    fn decode_line(&mut self, line: &str, partial: bool) -> Option<StreamEvent> {
        if line.trim().is_empty() {
            return None;
        }

        // Sniff the shape from the first non-empty line.
        if self.mode == ProtocolMode::Unknown {
            self.mode = if line.trim_start().starts_with(EVENT_PREFIX) {
                ProtocolMode::Events
            } else {
                ProtocolMode::RawTokens
            };
            debug!("stream protocol detected: {:?}", self.mode);
        }

        match self.mode {
            ProtocolMode::RawTokens => {
                // Framed raw lines lost their terminator; restore it so the
                // concatenated fragments reproduce the text. The trailing
                // partial line never had one.
                if partial {
                    Some(StreamEvent::Content {
                        text: line.to_string(),
                    })
                } else {
                    Some(StreamEvent::Content {
                        text: format!("{line}\n"),
                    })
                }
            }
            ProtocolMode::Events => {
                let payload = match line.trim_start().strip_prefix(EVENT_PREFIX) {
                    Some(rest) => rest.trim(),
                    None => {
                        warn!("unmarked line in event stream, skipping: {}", excerpt(line));
                        return None;
                    }
                };
                if payload == DONE_MARKER {
                    // Terminal no-op; distinct from any event.
                    self.terminal_seen = true;
                    return None;
                }
                match serde_json::from_str::<StreamEvent>(payload) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        // Protocol error on one line never aborts the stream.
                        warn!("malformed stream event, skipping: {e}: {}", excerpt(line));
                        None
                    }
                }
            }
            ProtocolMode::Unknown => unreachable!("mode sniffed above"),
        }
    }
}

impl Default for StreamIngestor {
    fn default() -> Self {
        Self::new()
    }
}

/// Truncate a line for logging, respecting char boundaries.
fn excerpt(line: &str) -> String {
    line.chars().take(120).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(chunks: &[&[u8]]) -> (Vec<StreamEvent>, StreamIngestor) {
        let mut ingestor = StreamIngestor::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(ingestor.feed(chunk));
        }
        events.extend(ingestor.finish());
        (events, ingestor)
    }

    fn content_of(events: &[StreamEvent]) -> String {
        let mut out = String::new();
        for event in events {
            match event {
                StreamEvent::Content { text } => out.push_str(text),
                StreamEvent::Done { full_answer, .. } => {
                    out = full_answer.clone();
                }
                _ => {}
            }
        }
        out
    }

    #[test]
    fn test_event_stream_single_chunk() {
        let (events, ingestor) = collect(&[
            b"data: {\"type\":\"content\",\"text\":\"Hello \"}\n\
              data: {\"type\":\"content\",\"text\":\"world\"}\n\
              data: {\"type\":\"done\",\"fullAnswer\":\"Hello world!\"}\n",
        ]);
        assert_eq!(ingestor.mode(), ProtocolMode::Events);
        assert!(ingestor.terminal_seen());
        assert_eq!(content_of(&events), "Hello world!");
    }

    #[test]
    fn test_split_invariance_across_arbitrary_chunks() {
        let full = "data: {\"type\":\"sources\",\"sources\":[{\"title\":\"a\",\"url\":\"u\",\"originName\":\"o\",\"category\":\"c\",\"excerpt\":\"e\"},{\"title\":\"b\",\"url\":\"u\",\"originName\":\"o\",\"category\":\"c\",\"excerpt\":\"e\"}]}\n\
                    data: {\"type\":\"content\",\"text\":\"Hello \"}\n\
                    data: {\"type\":\"content\",\"text\":\"world\"}\n\
                    data: {\"type\":\"done\",\"fullAnswer\":\"Hello world!\"}\n";
        let bytes = full.as_bytes();

        // Any 3-way split must decode to the same events, including splits
        // inside a JSON payload.
        for i in (1..bytes.len()).step_by(7) {
            for j in ((i + 1)..bytes.len()).step_by(13) {
                let (events, _) = collect(&[&bytes[..i], &bytes[i..j], &bytes[j..]]);
                assert_eq!(events.len(), 4, "split at ({i},{j})");
                match &events[0] {
                    StreamEvent::Sources { sources } => assert_eq!(sources.len(), 2),
                    other => panic!("expected sources first, got {other:?}"),
                }
                assert_eq!(content_of(&events), "Hello world!", "split at ({i},{j})");
            }
        }
    }

    #[test]
    fn test_content_concatenation_matches_fragment_order() {
        let fragments = ["The ", "quick ", "brown ", "fox"];
        let mut body = String::new();
        for fragment in &fragments {
            body.push_str(&format!(
                "data: {}\n",
                serde_json::json!({"type": "content", "text": fragment})
            ));
        }
        let (events, _) = collect(&[body.as_bytes()]);
        assert_eq!(content_of(&events), fragments.concat());
    }

    #[test]
    fn test_literal_done_marker_is_noop_terminal() {
        let (events, ingestor) = collect(&[
            b"data: {\"type\":\"content\",\"text\":\"hi\"}\ndata: [DONE]\n",
        ]);
        assert_eq!(events.len(), 1);
        assert!(ingestor.terminal_seen());
    }

    #[test]
    fn test_lines_after_terminal_are_ignored() {
        let (events, _) = collect(&[
            b"data: {\"type\":\"error\",\"detail\":\"boom\"}\n\
              data: {\"type\":\"content\",\"text\":\"late\"}\n",
        ]);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Error { .. }));
    }

    #[test]
    fn test_malformed_json_line_is_skipped() {
        let (events, _) = collect(&[
            b"data: {\"type\":\"content\",\"text\":\"a\"}\n\
              data: {not json at all\n\
              data: {\"type\":\"content\",\"text\":\"b\"}\n",
        ]);
        assert_eq!(content_of(&events), "ab");
    }

    #[test]
    fn test_raw_token_mode_detected_and_never_json_parsed() {
        let (events, ingestor) = collect(&[b"plain first line\n{\"type\":\"content\"}\ntail"]);
        assert_eq!(ingestor.mode(), ProtocolMode::RawTokens);
        // The JSON-looking line stays literal content in raw mode.
        assert_eq!(
            content_of(&events),
            "plain first line\n{\"type\":\"content\"}\ntail"
        );
    }

    #[test]
    fn test_trailing_partial_line_flushed_on_finish() {
        let mut ingestor = StreamIngestor::new();
        let events = ingestor.feed(b"data: {\"type\":\"content\",\"text\":\"a\"}\ndata: {\"type\":\"co");
        assert_eq!(events.len(), 1);
        // Transport closes mid-line; the partial is malformed JSON, skipped.
        let flushed = ingestor.finish();
        assert!(flushed.is_empty());
        assert!(!ingestor.terminal_seen());
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let line = "data: {\"type\":\"content\",\"text\":\"héllo\"}\n";
        let bytes = line.as_bytes();
        // Split inside the two-byte 'é'.
        let mid = line.find('é').unwrap() + 1;
        let (events, _) = collect(&[&bytes[..mid], &bytes[mid..]]);
        assert_eq!(content_of(&events), "héllo");
    }

    #[test]
    fn test_crlf_terminators_normalized() {
        let (events, _) = collect(&[b"data: {\"type\":\"content\",\"text\":\"hi\"}\r\ndata: [DONE]\r\n"]);
        assert_eq!(content_of(&events), "hi");
    }

    #[test]
    fn test_empty_lines_do_not_decide_mode() {
        let (events, ingestor) = collect(&[b"\n\ndata: {\"type\":\"content\",\"text\":\"x\"}\n"]);
        assert_eq!(ingestor.mode(), ProtocolMode::Events);
        assert_eq!(content_of(&events), "x");
    }
}
