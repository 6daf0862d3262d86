//! SSE (Server-Sent Events) parser
//!
//! Parses the SSE wire format into events. Payloads are kept as text; no
//! structure is imposed on them.

use std::time::Duration;

use bytes::Bytes;
use tracing::trace;

use super::types::{SseEvent, SseMessage, DEFAULT_EVENT_TYPE};

const BOM: &[u8] = b"\xEF\xBB\xBF";

/// SSE parser state
#[derive(Debug, Default)]
pub struct SseParser {
    /// Buffer for incomplete lines
    buffer: Vec<u8>,
    /// Prefix of `buffer` already searched for a line break
    scanned: usize,
    /// Current event data being accumulated
    data_buffer: String,
    /// Whether any `data` field was seen for the current event
    has_data: bool,
    /// Current event type (if any)
    event_type: Option<String>,
    /// Last event ID; persists across events
    last_id: Option<String>,
    /// Whether the start of the stream has been checked for a BOM
    bom_checked: bool,
}

impl SseParser {
    /// Create a new SSE parser
    pub fn new() -> Self {
        Self::default()
    }

    /// Last event ID seen on this stream
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_id.as_deref()
    }

    /// Feed bytes into the parser and extract any complete events
    pub fn feed(&mut self, bytes: Bytes) -> Vec<SseEvent> {
        let mut events = Vec::new();

        self.buffer.extend_from_slice(&bytes);

        if !self.bom_checked {
            if self.buffer.len() < BOM.len() && BOM.starts_with(&self.buffer) {
                // Could still be the start of a BOM
                return events;
            }
            if self.buffer.starts_with(BOM) {
                self.buffer.drain(..BOM.len());
            }
            self.bom_checked = true;
        }

        // Bytes before `scanned` are known to hold no line break
        let mut buffer = std::mem::take(&mut self.buffer);
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = buffer[from..].iter().position(|&b| b == b'\n') {
            let end = from + offset;
            let line = &buffer[start..end];

            // Handle \r\n line endings
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            if let Some(event) = self.process_line(line) {
                events.push(event);
            }
            start = end + 1;
            from = start;
        }

        buffer.drain(..start);
        self.scanned = buffer.len();
        self.buffer = buffer;

        events
    }

    /// Bytes of the current, still unterminated line
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Process a single line of SSE data
    fn process_line(&mut self, line: &[u8]) -> Option<SseEvent> {
        // Empty line signals end of event
        if line.is_empty() {
            return self.dispatch_event();
        }

        // Comment line (keepalive)
        if line.starts_with(b":") {
            trace!("SSE keepalive/comment");
            return None;
        }

        let line_str = String::from_utf8_lossy(line);

        // Split on first colon
        let (field, value) = match line_str.find(':') {
            Some(colon_pos) => {
                let (f, v) = line_str.split_at(colon_pos);
                // Skip the colon and one optional leading space
                let v = &v[1..];
                (f, v.strip_prefix(' ').unwrap_or(v))
            }
            // Field with no value
            None => (&*line_str, ""),
        };

        match field {
            "data" => {
                // Multiple data lines are joined with newlines
                if self.has_data {
                    self.data_buffer.push('\n');
                }
                self.data_buffer.push_str(value);
                self.has_data = true;
            }
            "event" => {
                self.event_type = Some(value.to_string());
            }
            "id" => {
                if value.contains('\0') {
                    trace!("SSE id with NUL ignored");
                } else if value.is_empty() {
                    self.last_id = None;
                } else {
                    self.last_id = Some(value.to_string());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(ms) = value.parse::<u64>() {
                        return Some(SseEvent::Retry(Duration::from_millis(ms)));
                    }
                }
                trace!("SSE invalid retry: {}", value);
            }
            _ => {
                // Unknown field, ignored
                trace!("SSE unknown field: {}", field);
            }
        }

        None
    }

    /// Dispatch the accumulated event
    fn dispatch_event(&mut self) -> Option<SseEvent> {
        let event_type = self.event_type.take();

        if !self.has_data {
            return None;
        }

        self.has_data = false;
        let data = std::mem::take(&mut self.data_buffer);

        let event = match event_type {
            Some(t) if !t.is_empty() => t,
            _ => DEFAULT_EVENT_TYPE.to_string(),
        };

        Some(SseEvent::Message(SseMessage {
            event,
            data,
            id: self.last_id.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn messages(events: Vec<SseEvent>) -> Vec<SseMessage> {
        events
            .into_iter()
            .filter_map(|e| match e {
                SseEvent::Message(m) => Some(m),
                SseEvent::Retry(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_parse_simple_event() {
        let mut parser = SseParser::new();

        let events = parser.feed(Bytes::from_static(b"data: healthy\n\n"));

        assert_eq!(events, vec![SseEvent::Message(SseMessage::new("healthy"))]);
    }

    #[test]
    fn test_parse_multiple_events() {
        let mut parser = SseParser::new();

        let input = b"data: healthy\n\ndata: degraded\n\n";
        let msgs = messages(parser.feed(Bytes::from_static(input)));

        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].data, "healthy");
        assert_eq!(msgs[1].data, "degraded");
    }

    #[test]
    fn test_parse_chunked_data() {
        let mut parser = SseParser::new();

        // First chunk - incomplete
        let events1 = parser.feed(Bytes::from_static(b"data: {\"http_resp"));
        assert!(events1.is_empty());

        // Second chunk - completes the event
        let events2 = messages(parser.feed(Bytes::from_static(b"onse\": 200}\n\n")));
        assert_eq!(events2.len(), 1);
        assert_eq!(events2[0].data, "{\"http_response\": 200}");
    }

    #[test]
    fn test_ignore_comments() {
        let mut parser = SseParser::new();

        let input = b": keepalive\ndata: up\n\n";
        let msgs = messages(parser.feed(Bytes::from_static(input)));

        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].data, "up");
    }

    #[test]
    fn test_multiline_data_joined_with_newline() {
        let mut parser = SseParser::new();

        let msgs = messages(parser.feed(Bytes::from_static(b"data: line one\ndata: line two\n\n")));

        assert_eq!(msgs[0].data, "line one\nline two");
    }

    #[test]
    fn test_payload_kept_verbatim() {
        let mut parser = SseParser::new();

        // Only the single space after the colon is stripped
        let msgs = messages(parser.feed(Bytes::from_static(b"data:   padded  \n\n")));

        assert_eq!(msgs[0].data, "  padded  ");
    }

    #[test]
    fn test_empty_data_dispatches_empty_payload() {
        let mut parser = SseParser::new();

        let msgs = messages(parser.feed(Bytes::from_static(b"data:\n\ndata\n\n")));

        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].data, "");
        assert_eq!(msgs[1].data, "");
    }

    #[test]
    fn test_blank_line_without_data_dispatches_nothing() {
        let mut parser = SseParser::new();

        let events = parser.feed(Bytes::from_static(b"event: ping\n\n\n\n"));

        assert!(events.is_empty());
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut parser = SseParser::new();

        let msgs = messages(parser.feed(Bytes::from_static(b"data: up\r\n\r\n")));

        assert_eq!(msgs[0].data, "up");
    }

    #[test]
    fn test_named_event_type() {
        let mut parser = SseParser::new();

        let msgs = messages(parser.feed(Bytes::from_static(b"event: heartbeat\ndata: x\n\ndata: y\n\n")));

        assert_eq!(msgs[0].event, "heartbeat");
        assert!(!msgs[0].is_message());
        // Type does not leak into the next event
        assert!(msgs[1].is_message());
    }

    #[test]
    fn test_last_event_id_persists() {
        let mut parser = SseParser::new();

        let msgs = messages(parser.feed(Bytes::from_static(b"id: 7\ndata: a\n\ndata: b\n\n")));

        assert_eq!(msgs[0].id.as_deref(), Some("7"));
        assert_eq!(msgs[1].id.as_deref(), Some("7"));
        assert_eq!(parser.last_event_id(), Some("7"));

        parser.feed(Bytes::from_static(b"id\n"));
        assert_eq!(parser.last_event_id(), None);
    }

    #[test]
    fn test_id_with_nul_ignored() {
        let mut parser = SseParser::new();

        parser.feed(Bytes::from_static(b"id: 1\nid: 2\0\n"));

        assert_eq!(parser.last_event_id(), Some("1"));
    }

    #[test]
    fn test_retry_field() {
        let mut parser = SseParser::new();

        let events = parser.feed(Bytes::from_static(b"retry: 2500\nretry: soon\n"));

        assert_eq!(events, vec![SseEvent::Retry(Duration::from_millis(2500))]);
    }

    #[test]
    fn test_leading_bom_stripped_across_chunks() {
        let mut parser = SseParser::new();

        assert!(parser.feed(Bytes::from_static(b"\xEF\xBB")).is_empty());
        let msgs = messages(parser.feed(Bytes::from_static(b"\xBFdata: up\n\n")));

        assert_eq!(msgs[0].data, "up");
    }

    #[test]
    fn test_invalid_utf8_decoded_lossily() {
        let mut parser = SseParser::new();

        let msgs = messages(parser.feed(Bytes::from_static(b"data: a\xFFb\n\n")));

        assert_eq!(msgs[0].data, "a\u{FFFD}b");
    }

    #[test]
    fn test_long_line_across_many_chunks() {
        let mut parser = SseParser::new();

        assert!(parser.feed(Bytes::from_static(b"data: ")).is_empty());
        for _ in 0..100 {
            assert!(parser.feed(Bytes::from_static(b"xxxxxxxxxx")).is_empty());
        }
        assert_eq!(parser.pending_len(), 6 + 1000);

        let msgs = messages(parser.feed(Bytes::from_static(b"\n\ndata: next\n")));
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].data, "x".repeat(1000));
        assert_eq!(parser.pending_len(), 0);

        let msgs = messages(parser.feed(Bytes::from_static(b"\n")));
        assert_eq!(msgs[0].data, "next");
    }
}
