//! Incremental decoder for the assistant's line-oriented event framing.
//!
//! The server streams repeated blocks of `event: <type>\ndata: <json>\n\n`
//! over a chunked response body. Chunk boundaries can fall anywhere,
//! including inside a multi-byte UTF-8 sequence, so decoding is buffered at
//! the byte level and only complete lines are ever interpreted.

use serde_json::Value;

/// One decoded frame from the assistant stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    SessionId { session_id: String },
    TextDelta { text: String },
    ToolStart { tool: String, message: String },
    ToolResult { tool: String, success: bool, mutated: bool },
    Error { message: String },
    Done,
}

/// Decode state carried across chunk reads: the pending `event:` register
/// and the unterminated tail of the byte buffer.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending_event: Option<String>,
    buffer: Vec<u8>,
}

impl FrameDecoder {
    /// Feed one raw chunk and collect every frame completed by it.
    ///
    /// The trailing fragment after the last newline stays buffered for the
    /// next call, so a frame split mid-line (or mid-code-point) across two
    /// reads decodes intact.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            self.process_line(&line, &mut events);
        }
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<StreamEvent>) {
        if let Some(name) = line.strip_prefix("event: ") {
            self.pending_event = Some(name.trim().to_string());
        } else if let Some(raw) = line.strip_prefix("data: ") {
            // A data line only counts when an event type is pending; the
            // register is consumed either way.
            let Some(name) = self.pending_event.take() else {
                tracing::debug!("Dropping data line with no preceding event type");
                return;
            };
            match serde_json::from_str::<Value>(raw) {
                Ok(payload) => match map_event(&name, &payload) {
                    Some(event) => events.push(event),
                    None => tracing::debug!("Dropping unrecognized event '{}'", name),
                },
                Err(error) => {
                    tracing::debug!("Dropping malformed payload for '{}': {}", name, error);
                }
            }
        }
        // Blank separator lines and anything else fall through.
    }
}

fn map_event(name: &str, payload: &Value) -> Option<StreamEvent> {
    match name {
        "session_id" => {
            let session_id = payload.get("session_id")?.as_str()?;
            Some(StreamEvent::SessionId {
                session_id: session_id.to_string(),
            })
        }
        "text_delta" => Some(StreamEvent::TextDelta {
            text: payload
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        "tool_start" => Some(StreamEvent::ToolStart {
            tool: payload
                .get("tool")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            message: payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }),
        "tool_result" => Some(StreamEvent::ToolResult {
            tool: payload
                .get("tool")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            success: payload
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            mutated: payload
                .get("mutated")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }),
        "error" => Some(StreamEvent::Error {
            message: payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Unknown assistant error")
                .to_string(),
        }),
        "done" => Some(StreamEvent::Done),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(decoder: &mut FrameDecoder, body: &str) -> Vec<StreamEvent> {
        decoder.feed(body.as_bytes())
    }

    #[test]
    fn decodes_complete_frame_sequence() {
        let mut decoder = FrameDecoder::default();
        let events = feed_all(
            &mut decoder,
            "event: text_delta\ndata: {\"text\":\"Hel\"}\n\nevent: text_delta\ndata: {\"text\":\"lo\"}\n\nevent: done\ndata: {}\n\n",
        );

        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta {
                    text: "Hel".to_string()
                },
                StreamEvent::TextDelta {
                    text: "lo".to_string()
                },
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn carries_partial_line_across_feeds() {
        let mut decoder = FrameDecoder::default();

        let first = feed_all(&mut decoder, "event: text_del");
        assert!(first.is_empty());

        let second = feed_all(&mut decoder, "ta\ndata: {\"te");
        assert!(second.is_empty());

        let third = feed_all(&mut decoder, "xt\":\"hi\"}\n\n");
        assert_eq!(
            third,
            vec![StreamEvent::TextDelta {
                text: "hi".to_string()
            }]
        );
    }

    #[test]
    fn multibyte_utf8_split_across_chunks_survives() {
        let mut decoder = FrameDecoder::default();
        let body = "event: text_delta\ndata: {\"text\":\"héllo\"}\n\n".as_bytes();

        // Split inside the two-byte encoding of 'é'.
        let split = body.iter().position(|&b| b == 0xC3).expect("utf8 lead byte") + 1;
        let mut events = decoder.feed(&body[..split]);
        events.extend(decoder.feed(&body[split..]));

        assert_eq!(
            events,
            vec![StreamEvent::TextDelta {
                text: "héllo".to_string()
            }]
        );
    }

    #[test]
    fn data_without_pending_event_is_dropped() {
        let mut decoder = FrameDecoder::default();
        let events = feed_all(
            &mut decoder,
            "data: {\"text\":\"orphan\"}\n\nevent: done\ndata: {}\n\n",
        );
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[test]
    fn malformed_payload_does_not_abort_stream() {
        let mut decoder = FrameDecoder::default();
        let events = feed_all(
            &mut decoder,
            "event: text_delta\ndata: {not json\n\nevent: text_delta\ndata: {\"text\":\"ok\"}\n\n",
        );
        assert_eq!(
            events,
            vec![StreamEvent::TextDelta {
                text: "ok".to_string()
            }]
        );
    }

    #[test]
    fn unknown_event_type_is_dropped() {
        let mut decoder = FrameDecoder::default();
        let events = feed_all(
            &mut decoder,
            "event: heartbeat\ndata: {}\n\nevent: done\ndata: {}\n\n",
        );
        assert_eq!(events, vec![StreamEvent::Done]);
    }

    #[test]
    fn crlf_line_endings_are_tolerated() {
        let mut decoder = FrameDecoder::default();
        let events = feed_all(
            &mut decoder,
            "event: session_id\r\ndata: {\"session_id\":\"abc\"}\r\n\r\n",
        );
        assert_eq!(
            events,
            vec![StreamEvent::SessionId {
                session_id: "abc".to_string()
            }]
        );
    }

    #[test]
    fn tool_result_fields_default_to_false() {
        let mut decoder = FrameDecoder::default();
        let events = feed_all(&mut decoder, "event: tool_result\ndata: {\"tool\":\"search_items\"}\n\n");
        assert_eq!(
            events,
            vec![StreamEvent::ToolResult {
                tool: "search_items".to_string(),
                success: false,
                mutated: false,
            }]
        );
    }
}
