use crate::error::RelayError;
use serde::Serialize;
use tokio::sync::mpsc;

/// Progress hooks for a streamed request. Every hook is optional.
pub trait StreamCallbacks: Send {
    fn on_start(&mut self) {}

    /// A piece of visible answer text, in upstream order.
    fn on_token(&mut self, _token: &str) {}

    /// The full visible answer, once the upstream stream has ended.
    fn on_complete(&mut self, _content: &str, _reasoning: Option<&str>) {}

    fn on_error(&mut self, _error: &RelayError) {}
}

/// Receives raw upstream chunks from a provider handler.
pub trait TokenSink: Send {
    fn push(&mut self, chunk: &str);
}

/// Stream events forwarded over a channel to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Start,
    Delta { token: String },
    Done {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        reasoning: Option<String>,
    },
    Error { error: String },
}

/// Callbacks that forward every hook as a [`StreamEvent`].
pub struct ChannelCallbacks {
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl ChannelCallbacks {
    pub fn new(tx: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self { tx }
    }

    fn send(&self, event: StreamEvent) {
        // The receiver is gone once the client disconnects; keep draining upstream.
        if self.tx.send(event).is_err() {
            tracing::trace!("Stream receiver dropped");
        }
    }
}

impl StreamCallbacks for ChannelCallbacks {
    fn on_start(&mut self) {
        self.send(StreamEvent::Start);
    }

    fn on_token(&mut self, token: &str) {
        self.send(StreamEvent::Delta {
            token: token.to_string(),
        });
    }

    fn on_complete(&mut self, content: &str, reasoning: Option<&str>) {
        self.send(StreamEvent::Done {
            content: content.to_string(),
            reasoning: reasoning.map(str::to_string),
        });
    }

    fn on_error(&mut self, error: &RelayError) {
        self.send(StreamEvent::Error {
            error: error.to_string(),
        });
    }
}

/// Callbacks that ignore everything.
pub struct NoopCallbacks;

impl StreamCallbacks for NoopCallbacks {}

/// One decoded line of an upstream `data:` event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseLine {
    Data(String),
    Done,
}

/// Splits a byte stream into `data:` payloads.
///
/// Bytes are buffered until a full line is available, so JSON payloads and
/// multi-byte characters split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseLine> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            if let Some(decoded) = decode_line(line.trim_end_matches(['\n', '\r'])) {
                lines.push(decoded);
            }
        }

        lines
    }

    /// Decode whatever is left once the upstream closes without a newline.
    pub fn finish(&mut self) -> Option<SseLine> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&raw);
        decode_line(line.trim_end_matches(['\n', '\r']))
    }
}

fn decode_line(line: &str) -> Option<SseLine> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() {
        return None;
    }
    if data == "[DONE]" {
        return Some(SseLine::Done);
    }
    Some(SseLine::Data(data.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ProviderKind;

    #[test]
    fn test_decoder_handles_split_lines() {
        let mut decoder = SseLineDecoder::new();
        assert!(decoder.feed(b"data: {\"a\":").is_empty());
        let lines = decoder.feed(b"1}\n\ndata: [DONE]\n\n");
        assert_eq!(
            lines,
            vec![SseLine::Data("{\"a\":1}".to_string()), SseLine::Done]
        );
    }

    #[test]
    fn test_decoder_ignores_comments_and_other_fields() {
        let mut decoder = SseLineDecoder::new();
        let lines = decoder.feed(b": keep-alive\r\nevent: ping\r\ndata: x\r\n");
        assert_eq!(lines, vec![SseLine::Data("x".to_string())]);
    }

    #[test]
    fn test_decoder_multibyte_split() {
        let mut decoder = SseLineDecoder::new();
        let bytes = "data: ✓\n".as_bytes();
        let (a, b) = bytes.split_at(8);
        assert!(decoder.feed(a).is_empty());
        assert_eq!(decoder.feed(b), vec![SseLine::Data("✓".to_string())]);
    }

    #[test]
    fn test_decoder_finish_without_newline() {
        let mut decoder = SseLineDecoder::new();
        assert!(decoder.feed(b"data: [DONE]").is_empty());
        assert_eq!(decoder.finish(), Some(SseLine::Done));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_channel_callbacks_forward_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut callbacks = ChannelCallbacks::new(tx);

        callbacks.on_start();
        callbacks.on_token("Hi");
        callbacks.on_complete("Hi", None);
        callbacks.on_error(&RelayError::upstream(ProviderKind::Gemini, None, "boom"));

        assert_eq!(rx.try_recv().unwrap(), StreamEvent::Start);
        assert_eq!(
            rx.try_recv().unwrap(),
            StreamEvent::Delta {
                token: "Hi".to_string()
            }
        );
        assert!(matches!(rx.try_recv().unwrap(), StreamEvent::Done { .. }));
        assert!(matches!(rx.try_recv().unwrap(), StreamEvent::Error { .. }));
    }
}
