use thiserror::Error;
use tracing::warn;

/// Prefix of a record carrying a piece of assistant text.
pub const CONTENT_PREFIX: &str = "0:";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid content record {line:?}: {source}")]
    InvalidJson {
        line: String,
        #[source]
        source: serde_json::Error,
    },
}

/// One decoded line of the completion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRecord {
    ContentDelta(String),
    /// Any record type other than content (tool calls, metadata, ...).
    Ignored,
}

impl StreamRecord {
    pub fn parse(line: &str) -> Result<Self, DecodeError> {
        let Some(payload) = line.strip_prefix(CONTENT_PREFIX) else {
            return Ok(StreamRecord::Ignored);
        };
        serde_json::from_str::<String>(payload)
            .map(StreamRecord::ContentDelta)
            .map_err(|source| DecodeError::InvalidJson {
                line: line.to_string(),
                source,
            })
    }
}

/// Splits a byte stream into lines.
///
/// Bytes are buffered until a `\n` arrives, so a line (or a multi-byte UTF-8
/// sequence) split across reads is reassembled before decoding.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|b| *b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.buffer[start..end]));
            start = end + 1;
        }
        // Keep incomplete line in buffer
        self.buffer.drain(..start);
        lines
    }

    /// The unterminated tail left when the stream ends, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = decode_line(&self.buffer);
        self.buffer.clear();
        Some(line)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Accumulates the assistant reply from raw stream bytes.
#[derive(Debug, Default)]
pub struct ReplyDecoder {
    lines: LineDecoder,
    text: String,
}

impl ReplyDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk. Returns true when the accumulated text changed.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        let lines = self.lines.push(chunk);
        let mut changed = false;
        for line in lines {
            changed |= self.apply(&line);
        }
        changed
    }

    /// Process the unterminated final line. Returns true when the text changed.
    pub fn finish(&mut self) -> bool {
        match self.lines.finish() {
            Some(line) => self.apply(&line),
            None => false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    fn apply(&mut self, line: &str) -> bool {
        match StreamRecord::parse(line) {
            Ok(StreamRecord::ContentDelta(delta)) if !delta.is_empty() => {
                self.text.push_str(&delta);
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(error = %e, "Skipping malformed stream record");
                false
            }
        }
    }
}
