//! Incremental frame decoder.
//!
//! Turns raw transport bytes into [`ProtocolEvent`]s. Frames are
//! newline-delimited JSON objects; a frame may be split across any number of
//! reads. Only the trailing partial frame is buffered.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::anomaly::{AnomalyLog, ProtocolAnomaly};
use crate::event::{ProtocolEvent, KNOWN_FRAME_TYPES};

/// Default maximum size of a single frame (1 MiB).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Decoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Frames larger than this are dropped
    pub max_frame_bytes: usize,
    /// Strip server-sent-event `data:` prefixes and skip SSE control lines
    pub accept_sse: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            accept_sse: true,
        }
    }
}

/// Incremental decoder for one connection.
///
/// Not restartable: once [`finish`](Self::finish) has been called further
/// input is ignored.
#[derive(Debug)]
pub struct FrameDecoder {
    config: DecoderConfig,
    buffer: Vec<u8>,
    // Start of the first undecoded byte in `buffer`
    cursor: usize,
    // Dropping the remainder of an oversized frame
    discarding: bool,
    finished: bool,
    frames_decoded: u64,
    anomalies: AnomalyLog,
}

impl FrameDecoder {
    /// Create a decoder with default settings.
    pub fn new() -> Self {
        Self::with_config(DecoderConfig::default())
    }

    /// Create a decoder with explicit settings.
    pub fn with_config(config: DecoderConfig) -> Self {
        Self {
            config,
            buffer: Vec::new(),
            cursor: 0,
            discarding: false,
            finished: false,
            frames_decoded: 0,
            anomalies: AnomalyLog::new(),
        }
    }

    /// Append bytes read from the transport.
    pub fn feed(&mut self, chunk: &[u8]) {
        if self.finished {
            debug!(bytes = chunk.len(), "Ignoring input after decoder finished");
            return;
        }

        if self.cursor > 0 {
            self.buffer.drain(..self.cursor);
            self.cursor = 0;
        }

        let mut chunk = chunk;
        if self.discarding {
            match chunk.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    self.discarding = false;
                    chunk = &chunk[pos + 1..];
                }
                None => return,
            }
        }

        self.buffer.extend_from_slice(chunk);
        self.enforce_frame_limit();
    }

    /// Mark end of input. A trailing frame without newline is still decoded.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if !self.discarding && self.cursor < self.buffer.len() {
            self.buffer.push(b'\n');
        }
    }

    /// Decode the next complete frame, if one is buffered.
    ///
    /// Malformed frames are skipped and recorded as anomalies.
    pub fn next_event(&mut self) -> Option<ProtocolEvent> {
        loop {
            let offset = self.buffer[self.cursor..]
                .iter()
                .position(|&b| b == b'\n')?;
            let start = self.cursor;
            let end = start + offset;
            self.cursor = end + 1;

            let decoded =
                Self::decode_line(&self.buffer[start..end], &self.config, &mut self.anomalies);

            if let Some(event) = decoded {
                self.frames_decoded += 1;
                trace!(event = event.kind_name(), "Decoded frame");
                return Some(event);
            }
        }
    }

    /// Drain every currently decodable event.
    pub fn events(&mut self) -> impl Iterator<Item = ProtocolEvent> + '_ {
        std::iter::from_fn(move || self.next_event())
    }

    /// Whether [`finish`](Self::finish) has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Bytes held for a frame that has not been completed yet.
    pub fn pending_bytes(&self) -> usize {
        self.buffer.len() - self.cursor
    }

    /// Number of frames successfully decoded.
    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Anomalies seen on this connection.
    pub fn anomalies(&self) -> &AnomalyLog {
        &self.anomalies
    }

    /// Move retained anomalies out of the decoder.
    pub fn take_anomalies(&mut self) -> Vec<ProtocolAnomaly> {
        self.anomalies.drain()
    }

    fn enforce_frame_limit(&mut self) {
        let pending_start = self.buffer[self.cursor..]
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|pos| self.cursor + pos + 1)
            .unwrap_or(self.cursor);

        if self.buffer.len() - pending_start > self.config.max_frame_bytes {
            self.buffer.truncate(pending_start);
            self.discarding = true;
            self.anomalies.record(ProtocolAnomaly::OversizedFrame {
                limit: self.config.max_frame_bytes,
            });
        }
    }

    fn decode_line(
        raw: &[u8],
        config: &DecoderConfig,
        anomalies: &mut AnomalyLog,
    ) -> Option<ProtocolEvent> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

        if raw.len() > config.max_frame_bytes {
            anomalies.record(ProtocolAnomaly::OversizedFrame {
                limit: config.max_frame_bytes,
            });
            return None;
        }

        let text = match std::str::from_utf8(raw) {
            Ok(text) => text.trim(),
            Err(e) => {
                anomalies.record(ProtocolAnomaly::MalformedFrame {
                    reason: format!("invalid UTF-8: {}", e),
                });
                return None;
            }
        };

        if text.is_empty() {
            return None;
        }

        let payload = if config.accept_sse {
            sse_payload(text)?
        } else {
            text
        };

        let value: serde_json::Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                anomalies.record(ProtocolAnomaly::MalformedFrame {
                    reason: format!("invalid JSON: {}", e),
                });
                return None;
            }
        };

        let frame_type = match value.get("type").and_then(|t| t.as_str()) {
            Some(frame_type) => frame_type.to_string(),
            None => {
                anomalies.record(ProtocolAnomaly::MalformedFrame {
                    reason: "missing type discriminator".to_string(),
                });
                return None;
            }
        };

        if !KNOWN_FRAME_TYPES.contains(&frame_type.as_str()) {
            anomalies.record(ProtocolAnomaly::UnknownFrameType { frame_type });
            return None;
        }

        match serde_json::from_value::<ProtocolEvent>(value) {
            Ok(mut event) => {
                if let ProtocolEvent::Citation(citation) = &mut event {
                    if citation.normalize() {
                        debug!(number = citation.number, "Normalized out-of-range citation fields");
                    }
                }
                Some(event)
            }
            Err(e) => {
                anomalies.record(ProtocolAnomaly::InvalidPayload {
                    frame_type,
                    reason: e.to_string(),
                });
                None
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the JSON payload from a server-sent-event line.
///
/// Returns `None` for SSE comments and control fields.
fn sse_payload(line: &str) -> Option<&str> {
    if line.starts_with(':') {
        return None;
    }
    if let Some(data) = line.strip_prefix("data:") {
        let data = data.trim_start();
        return if data.is_empty() { None } else { Some(data) };
    }
    if ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
    {
        return None;
    }
    Some(line)
}

/// Decode a complete capture in one call.
pub fn decode_all(input: &[u8], config: DecoderConfig) -> (Vec<ProtocolEvent>, Vec<ProtocolAnomaly>) {
    let mut decoder = FrameDecoder::with_config(config);
    decoder.feed(input);
    decoder.finish();
    let events: Vec<ProtocolEvent> = decoder.events().collect();
    (events, decoder.take_anomalies())
}
