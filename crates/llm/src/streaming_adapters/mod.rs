//! Provider-Specific Stream Adapters
//!
//! Each adapter handles the unique streaming format of its provider. The
//! HTTP providers share [`drive_sse_stream`] to turn a response body into
//! forwarded events plus one accumulated [`LlmResponse`].

pub mod gemini;
pub mod openai;

pub use gemini::GeminiStreamAdapter;
pub use openai::OpenAIStreamAdapter;

use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::types::{LlmError, LlmResponse, LlmResult, StopReason, UsageStats};
use theory_cascade_core::streaming::{StreamAdapter, UnifiedStreamEvent};

/// Accumulates raw bytes and yields complete newline-terminated lines.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
    }

    /// Pop the next complete, non-empty line.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let line_end = self.buffer.find('\n')?;
            let line: String = self.buffer.drain(..=line_end).collect();
            let line = line.trim_end_matches(['\r', '\n']);
            if !line.trim().is_empty() {
                return Some(line.to_string());
            }
        }
    }

    /// Whatever remains once the body has ended without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        (!rest.is_empty()).then(|| rest.to_string())
    }
}

/// Read an SSE response to the end, forwarding text and error events to `tx`
/// and returning the accumulated response.
pub async fn drive_sse_stream<A: StreamAdapter>(
    response: reqwest::Response,
    mut adapter: A,
    tx: &mpsc::Sender<UnifiedStreamEvent>,
    model: &str,
) -> LlmResult<LlmResponse> {
    let mut accumulated = StreamAccumulator::default();
    let mut lines = SseLineBuffer::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| LlmError::NetworkError {
            message: e.to_string(),
        })?;
        lines.push(&chunk);
        while let Some(line) = lines.next_line() {
            accumulated.feed(&mut adapter, &line, tx).await;
        }
    }
    if let Some(line) = lines.finish() {
        accumulated.feed(&mut adapter, &line, tx).await;
    }

    Ok(accumulated.into_response(model))
}

#[derive(Default)]
struct StreamAccumulator {
    content: String,
    usage: UsageStats,
    stop_reason: Option<StopReason>,
}

impl StreamAccumulator {
    async fn feed<A: StreamAdapter>(
        &mut self,
        adapter: &mut A,
        line: &str,
        tx: &mpsc::Sender<UnifiedStreamEvent>,
    ) {
        let events = match adapter.adapt(line) {
            Ok(events) => events,
            Err(e) => {
                tracing::debug!(provider = adapter.provider_name(), error = %e, "Skipping malformed stream line");
                let _ = tx
                    .send(UnifiedStreamEvent::Error {
                        message: e.to_string(),
                        code: None,
                    })
                    .await;
                return;
            }
        };

        for event in events {
            match &event {
                UnifiedStreamEvent::TextDelta { content } => self.content.push_str(content),
                UnifiedStreamEvent::Usage {
                    input_tokens,
                    output_tokens,
                } => {
                    self.usage.input_tokens = *input_tokens;
                    self.usage.output_tokens = *output_tokens;
                }
                UnifiedStreamEvent::Complete {
                    stop_reason: Some(reason),
                } => {
                    self.stop_reason = Some(StopReason::from(reason.as_str()));
                }
                _ => {}
            }
            // Receivers may have gone away; the stream is still read to the end.
            let _ = tx.send(event).await;
        }
    }

    fn into_response(self, model: &str) -> LlmResponse {
        LlmResponse {
            content: (!self.content.is_empty()).then_some(self.content),
            stop_reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
            usage: self.usage,
            model: model.to_string(),
        }
    }
}
