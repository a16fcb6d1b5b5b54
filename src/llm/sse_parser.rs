use crate::errors::{BotError, BotResult};
use crate::llm::types::{StreamChunk, StreamChunkKind};

/// Reassembles SSE lines from arbitrarily split network chunks.
///
/// Bytes are buffered until a newline arrives, so a multi-byte character cut in
/// half by the transport is decoded only once it is complete.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    /// Feed one chunk; returns the complete, non-blank lines it finished.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }
        lines
    }

    /// Whatever is left once the stream ends without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        let pending = std::mem::take(&mut self.pending);
        let rest = String::from_utf8_lossy(&pending).trim().to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

/// Interpret one SSE line of an OpenAI-compatible chat stream.
///
/// `Ok(None)` for comments, non-data fields and deltas that carry no answer text
/// (reasoning-only deltas included).
pub fn parse_sse_line(line: &str) -> BotResult<Option<StreamChunk>> {
    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return Ok(None);
    };
    if data == "[DONE]" {
        return Ok(Some(chunk(StreamChunkKind::Done, "")));
    }

    let event: serde_json::Value =
        serde_json::from_str(data).map_err(|e| BotError::SseParsing(e.to_string()))?;
    let Some(choice) = event["choices"].get(0) else {
        return Ok(None);
    };

    if let Some(content) = choice["delta"]["content"].as_str().filter(|s| !s.is_empty()) {
        return Ok(Some(chunk(StreamChunkKind::Content, content)));
    }
    if choice["finish_reason"].is_string() {
        return Ok(Some(chunk(StreamChunkKind::Done, "")));
    }
    Ok(None)
}

fn chunk(kind: StreamChunkKind, content: &str) -> StreamChunk {
    StreamChunk {
        kind,
        content: content.to_string(),
    }
}
