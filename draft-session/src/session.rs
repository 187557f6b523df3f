//! Generation session state machine.
//!
//! A session is a synchronous reducer over [`ProtocolEvent`]s:
//!
//! ```text
//! Idle ──start──▶ Requesting ──first event──▶ Streaming ──done──▶ Completed
//!                     │                          │  └────error──▶ Errored
//!                     └──────────cancel──────────┴─────cancel───▶ Cancelled
//! ```
//!
//! Content and citations only change while streaming. Terminal states freeze
//! them; any later event is discarded and logged as an anomaly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use draft_protocol::{AnomalyLog, CitationLedger, ProtocolAnomaly, ProtocolEvent};

use crate::classifier::{ClassifiedError, ErrorClassifier};
use crate::config::EngineConfig;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Lifecycle status of a generation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Idle,
    Requesting,
    Streaming,
    Completed,
    Cancelled,
    Errored,
}

impl SessionStatus {
    /// Whether no further event can change the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Errored)
    }

    /// Whether the session has an open request.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Requesting | Self::Streaming)
    }

    /// Lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting => "requesting",
            Self::Streaming => "streaming",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Errored => "errored",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters of a generation request, passed through to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Document template to generate
    pub template_type: String,
    /// Free-form user context
    pub context: String,
    /// Knowledge bases the backend may retrieve from
    pub kb_scope: Vec<String>,
    /// Caller deadline override (ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline_ms: Option<u64>,
}

impl GenerationRequest {
    /// Create a request for a template.
    pub fn new(template_type: impl Into<String>, context: impl Into<String>) -> Self {
        Self {
            template_type: template_type.into(),
            context: context.into(),
            kb_scope: Vec::new(),
            deadline_ms: None,
        }
    }

    /// Restrict retrieval to the given knowledge bases.
    pub fn with_kb_scope<I, S>(mut self, kb_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.kb_scope = kb_ids.into_iter().map(Into::into).collect();
        self
    }

    /// Set a caller deadline.
    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }
}

/// Why a session was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// The user asked to stop
    User,
    /// The caller deadline passed
    DeadlineExceeded,
    /// A newer generation replaced this one in the same slot
    Superseded,
}

/// Result of a cancel call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The session moved to `Cancelled`
    Cancelled,
    /// The session had already ended; nothing changed
    AlreadyTerminal(SessionStatus),
    /// The session was never started; nothing changed
    NotStarted,
}

/// Result of applying one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Event was applied without a status change
    Applied,
    /// Event was applied and changed the status
    Transitioned {
        from: SessionStatus,
        to: SessionStatus,
    },
    /// Event was not applied
    Discarded(ProtocolAnomaly),
}

/// Invalid use of the session API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Operation is not allowed in the current state
    #[error("Cannot {operation} a session in {from} state")]
    InvalidTransition {
        from: SessionStatus,
        operation: &'static str,
    },
}

/// Immutable view of a session for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub status: SessionStatus,
    pub content: String,
    pub fragment_count: usize,
    pub citations: CitationLedger,
    pub progress_status: Option<String>,
    pub confidence: Option<f32>,
    pub error: Option<ClassifiedError>,
    pub cancel_reason: Option<CancelReason>,
    pub request: Option<GenerationRequest>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub anomaly_count: u64,
}

impl SessionSnapshot {
    /// Whether partial work exists that the caller could save.
    pub fn has_partial_work(&self) -> bool {
        !self.content.is_empty() || !self.citations.is_empty()
    }
}

/// One generation request and everything it has produced so far.
#[derive(Debug, Clone)]
pub struct GenerationSession {
    id: String,
    status: SessionStatus,
    request: Option<GenerationRequest>,
    content: String,
    fragment_count: usize,
    citations: CitationLedger,
    progress_status: Option<String>,
    confidence: Option<f32>,
    error: Option<ClassifiedError>,
    cancel_reason: Option<CancelReason>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
    anomalies: AnomalyLog,
    classifier: ErrorClassifier,
}

impl GenerationSession {
    /// Create an idle session with default settings.
    pub fn new() -> Self {
        Self::with_parts(AnomalyLog::new(), ErrorClassifier::default())
    }

    /// Create an idle session from engine configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::with_parts(
            AnomalyLog::with_capacity(config.session.anomaly_capacity),
            ErrorClassifier::new(config.classifier.clone()),
        )
    }

    fn with_parts(anomalies: AnomalyLog, classifier: ErrorClassifier) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: SessionStatus::Idle,
            request: None,
            content: String::new(),
            fragment_count: 0,
            citations: CitationLedger::new(),
            progress_status: None,
            confidence: None,
            error: None,
            cancel_reason: None,
            started_at: None,
            finished_at: None,
            anomalies,
            classifier,
        }
    }

    /// Session identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Accumulated content.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Number of token fragments appended.
    pub fn fragment_count(&self) -> usize {
        self.fragment_count
    }

    /// Accumulated citations.
    pub fn citations(&self) -> &CitationLedger {
        &self.citations
    }

    /// Last progress message.
    pub fn progress_status(&self) -> Option<&str> {
        self.progress_status.as_deref()
    }

    /// Confidence reported on completion.
    pub fn confidence(&self) -> Option<f32> {
        self.confidence
    }

    /// Classified error, if the session errored.
    pub fn error(&self) -> Option<&ClassifiedError> {
        self.error.as_ref()
    }

    /// Cancel reason, if the session was cancelled.
    pub fn cancel_reason(&self) -> Option<CancelReason> {
        self.cancel_reason
    }

    /// Request recorded on start.
    pub fn request(&self) -> Option<&GenerationRequest> {
        self.request.as_ref()
    }

    /// Anomalies observed by this session.
    pub fn anomalies(&self) -> &AnomalyLog {
        &self.anomalies
    }

    /// Count anomalies the frame decoder already logged for this session.
    pub fn absorb_anomalies(&mut self, anomalies: Vec<ProtocolAnomaly>) {
        if !anomalies.is_empty() {
            self.anomalies.absorb(anomalies);
        }
    }

    /// Begin a request. Only valid from `Idle`.
    pub fn start(&mut self, request: GenerationRequest) -> Result<(), SessionError> {
        if self.status != SessionStatus::Idle {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                operation: "start",
            });
        }

        info!(
            session_id = %self.id,
            template = %request.template_type,
            kb_count = request.kb_scope.len(),
            "Starting generation"
        );

        self.request = Some(request);
        self.started_at = Some(Utc::now());
        self.status = SessionStatus::Requesting;
        Ok(())
    }

    /// Apply one event in arrival order.
    pub fn apply(&mut self, event: ProtocolEvent) -> ApplyOutcome {
        let from = self.status;

        match from {
            SessionStatus::Idle => {
                let anomaly = ProtocolAnomaly::EventBeforeStart {
                    event: event.kind_name().to_string(),
                };
                self.anomalies.record(anomaly.clone());
                ApplyOutcome::Discarded(anomaly)
            }
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::Errored => {
                let anomaly = ProtocolAnomaly::LateEvent {
                    event: event.kind_name().to_string(),
                    state: from.to_string(),
                };
                self.anomalies.record(anomaly.clone());
                ApplyOutcome::Discarded(anomaly)
            }
            SessionStatus::Requesting | SessionStatus::Streaming => {
                self.status = SessionStatus::Streaming;
                let rejected = self.apply_streaming(event);
                let to = self.status;

                if from != to {
                    debug!(session_id = %self.id, %from, %to, "Session transition");
                    ApplyOutcome::Transitioned { from, to }
                } else if let Some(anomaly) = rejected {
                    ApplyOutcome::Discarded(anomaly)
                } else {
                    ApplyOutcome::Applied
                }
            }
        }
    }

    fn apply_streaming(&mut self, event: ProtocolEvent) -> Option<ProtocolAnomaly> {
        match event {
            ProtocolEvent::Status { text } => {
                self.progress_status = Some(text);
            }
            ProtocolEvent::Token { text } => {
                self.content.push_str(&text);
                self.fragment_count += 1;
            }
            ProtocolEvent::Citation(citation) => {
                let number = citation.number;
                if let Err(anomaly) = self.citations.record(citation) {
                    self.anomalies.record(anomaly.clone());
                    return Some(anomaly);
                }
                debug!(session_id = %self.id, number, "Recorded citation");
            }
            ProtocolEvent::Error { message, kind } => {
                let classified = self.classifier.classify(kind.as_deref(), &message);
                info!(
                    session_id = %self.id,
                    kind = %classified.kind,
                    "Generation failed: {}",
                    message
                );
                self.error = Some(classified);
                self.finish(SessionStatus::Errored);
            }
            ProtocolEvent::Done { confidence } => {
                if self.confidence.is_none() {
                    self.confidence = confidence
                        .filter(|c| !c.is_nan())
                        .map(|c| c.clamp(0.0, 1.0));
                }
                info!(
                    session_id = %self.id,
                    fragments = self.fragment_count,
                    citations = self.citations.len(),
                    "Generation completed"
                );
                self.finish(SessionStatus::Completed);
            }
        }
        None
    }

    /// Cancel an open request, keeping everything accumulated so far.
    ///
    /// Idempotent: cancelling an idle or ended session changes nothing.
    pub fn cancel(&mut self, reason: CancelReason) -> CancelOutcome {
        match self.status {
            SessionStatus::Idle => CancelOutcome::NotStarted,
            status if status.is_terminal() => {
                debug!(session_id = %self.id, %status, "Cancel ignored, session already ended");
                CancelOutcome::AlreadyTerminal(status)
            }
            _ => {
                info!(
                    session_id = %self.id,
                    reason = ?reason,
                    fragments = self.fragment_count,
                    "Generation cancelled"
                );
                self.cancel_reason = Some(reason);
                self.finish(SessionStatus::Cancelled);
                CancelOutcome::Cancelled
            }
        }
    }

    /// End an open request because the transport failed or closed early.
    ///
    /// Always classified as `Unknown`. No effect on idle or ended sessions.
    pub fn fail_transport(&mut self, message: impl Into<String>) -> ApplyOutcome {
        let from = self.status;
        if !from.is_active() {
            return ApplyOutcome::Applied;
        }

        let message = message.into();
        info!(session_id = %self.id, "Transport failed: {}", message);
        self.error = Some(self.classifier.transport_failure(&message));
        self.finish(SessionStatus::Errored);
        ApplyOutcome::Transitioned {
            from,
            to: SessionStatus::Errored,
        }
    }

    /// Return an ended session to `Idle` with a new identifier.
    ///
    /// This is the only operation that discards content.
    pub fn reset(&mut self) -> Result<(), SessionError> {
        if self.status.is_active() {
            return Err(SessionError::InvalidTransition {
                from: self.status,
                operation: "reset",
            });
        }

        let anomalies = AnomalyLog::with_capacity(self.anomalies_capacity());
        let classifier = self.classifier.clone();
        *self = Self::with_parts(anomalies, classifier);
        Ok(())
    }

    fn anomalies_capacity(&self) -> usize {
        self.anomalies.capacity()
    }

    fn finish(&mut self, status: SessionStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Immutable copy of the current state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            status: self.status,
            content: self.content.clone(),
            fragment_count: self.fragment_count,
            citations: self.citations.clone(),
            progress_status: self.progress_status.clone(),
            confidence: self.confidence,
            error: self.error.clone(),
            cancel_reason: self.cancel_reason,
            request: self.request.clone(),
            started_at: self.started_at,
            finished_at: self.finished_at,
            anomaly_count: self.anomalies.total(),
        }
    }
}

impl Default for GenerationSession {
    fn default() -> Self {
        Self::new()
    }
}
