//! Protocol anomalies.
//!
//! Non-fatal inconsistencies in the inbound stream. They are logged and kept
//! in a bounded log; generation always continues.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default number of anomalies retained before pruning.
pub const DEFAULT_ANOMALY_CAPACITY: usize = 256;

/// A non-fatal protocol inconsistency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "anomaly", rename_all = "snake_case")]
pub enum ProtocolAnomaly {
    /// Frame was not valid UTF-8 or not valid JSON
    #[error("Malformed frame: {reason}")]
    MalformedFrame { reason: String },

    /// Frame carried a `type` this client does not understand
    #[error("Unknown frame type: {frame_type}")]
    UnknownFrameType { frame_type: String },

    /// Frame type was known but the payload had the wrong shape
    #[error("Invalid {frame_type} payload: {reason}")]
    InvalidPayload { frame_type: String, reason: String },

    /// Frame exceeded the configured size limit and was dropped
    #[error("Frame exceeded {limit} bytes and was dropped")]
    OversizedFrame { limit: usize },

    /// Citation numbers are 1-based
    #[error("Invalid citation number: {number}")]
    InvalidCitationNumber { number: u32 },

    /// Second citation with an already recorded number
    #[error("Duplicate citation number {number}; keeping the first")]
    DuplicateCitation { number: u32 },

    /// Event arrived before the session was started
    #[error("{event} event discarded before the session started")]
    EventBeforeStart { event: String },

    /// Event arrived after the session reached a terminal state
    #[error("Late {event} event discarded in {state} state")]
    LateEvent { event: String, state: String },
}

impl ProtocolAnomaly {
    /// Stable short code for metrics and log fields.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MalformedFrame { .. } => "malformed_frame",
            Self::UnknownFrameType { .. } => "unknown_frame_type",
            Self::InvalidPayload { .. } => "invalid_payload",
            Self::OversizedFrame { .. } => "oversized_frame",
            Self::InvalidCitationNumber { .. } => "invalid_citation_number",
            Self::DuplicateCitation { .. } => "duplicate_citation",
            Self::EventBeforeStart { .. } => "event_before_start",
            Self::LateEvent { .. } => "late_event",
        }
    }
}

/// Bounded record of anomalies seen on one connection or session.
#[derive(Debug, Clone)]
pub struct AnomalyLog {
    entries: VecDeque<ProtocolAnomaly>,
    capacity: usize,
    total: u64,
}

impl AnomalyLog {
    /// Create a log with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_ANOMALY_CAPACITY)
    }

    /// Create a log retaining at most `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(DEFAULT_ANOMALY_CAPACITY)),
            capacity: capacity.max(1),
            total: 0,
        }
    }

    /// Record an anomaly, pruning the oldest entry when full.
    pub fn record(&mut self, anomaly: ProtocolAnomaly) {
        warn!(code = anomaly.code(), "Protocol anomaly: {}", anomaly);
        self.push(anomaly);
    }

    /// Take over anomalies already logged by another log.
    pub fn absorb(&mut self, anomalies: impl IntoIterator<Item = ProtocolAnomaly>) {
        for anomaly in anomalies {
            self.push(anomaly);
        }
    }

    fn push(&mut self, anomaly: ProtocolAnomaly) {
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(anomaly);
        self.total += 1;
    }

    /// Number of anomalies ever recorded, including pruned ones.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Maximum number of retained entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Iterate retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &ProtocolAnomaly> {
        self.entries.iter()
    }

    /// Most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ProtocolAnomaly> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Move all retained entries out, keeping the running total.
    pub fn drain(&mut self) -> Vec<ProtocolAnomaly> {
        self.entries.drain(..).collect()
    }
}

impl Default for AnomalyLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_prunes_oldest() {
        let mut log = AnomalyLog::with_capacity(2);
        for number in 1..=3 {
            log.record(ProtocolAnomaly::DuplicateCitation { number });
        }

        assert_eq!(log.len(), 2);
        assert_eq!(log.total(), 3);
        assert_eq!(
            log.recent(1),
            vec![ProtocolAnomaly::DuplicateCitation { number: 3 }]
        );
    }

    #[test]
    fn test_drain_keeps_total() {
        let mut log = AnomalyLog::new();
        log.record(ProtocolAnomaly::OversizedFrame { limit: 8 });

        assert_eq!(log.drain().len(), 1);
        assert_eq!(log.len(), 0);
        assert_eq!(log.total(), 1);
        assert!(!log.is_empty());
    }

    #[test]
    fn test_absorb_counts_moved_entries() {
        let mut decoder_log = AnomalyLog::new();
        decoder_log.record(ProtocolAnomaly::UnknownFrameType {
            frame_type: "mystery".into(),
        });

        let mut session_log = AnomalyLog::with_capacity(4);
        session_log.record(ProtocolAnomaly::DuplicateCitation { number: 1 });
        session_log.absorb(decoder_log.drain());

        assert_eq!(session_log.total(), 2);
        assert_eq!(session_log.recent(1)[0].code(), "unknown_frame_type");
    }
}
