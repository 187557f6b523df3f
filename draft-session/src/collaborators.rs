//! Interfaces to external collaborators.
//!
//! The engine never talks to the network, a database or a feedback service
//! directly. It goes through these traits, which the host application
//! implements. In-memory versions live in [`crate::mock`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::fmt;

use draft_protocol::CitationLedger;
pub use draft_protocol::TransportError;

use crate::feedback::FeedbackRecord;
use crate::session::{GenerationRequest, SessionSnapshot, SessionStatus};

/// Failure reported by a draft store or feedback sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// Collaborator could not be reached
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    /// Collaborator refused the request
    #[error("Collaborator rejected request: {0}")]
    Rejected(String),
}

/// Closes an open connection. Runs at most once.
pub struct CloseHandle {
    close: Option<Box<dyn FnOnce() + Send>>,
}

impl CloseHandle {
    /// Wrap a close callback.
    pub fn new(close: impl FnOnce() + Send + 'static) -> Self {
        Self {
            close: Some(Box::new(close)),
        }
    }

    /// Handle for connections that need no explicit close.
    pub fn noop() -> Self {
        Self { close: None }
    }

    /// Close the connection.
    pub fn close(mut self) {
        if let Some(close) = self.close.take() {
            close();
        }
    }
}

impl fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloseHandle")
            .field("armed", &self.close.is_some())
            .finish()
    }
}

/// One open generation stream.
pub struct Connection {
    /// Raw byte chunks as they arrive; chunk boundaries are arbitrary
    pub frames: BoxStream<'static, Result<Vec<u8>, TransportError>>,
    /// Aborts the underlying request
    pub close: CloseHandle,
}

impl Connection {
    pub fn new(
        frames: BoxStream<'static, Result<Vec<u8>, TransportError>>,
        close: CloseHandle,
    ) -> Self {
        Self { frames, close }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("close", &self.close)
            .finish_non_exhaustive()
    }
}

/// Opens generation streams against the backend.
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    /// Send a generation request and return the response stream.
    async fn open(&self, request: &GenerationRequest) -> Result<Connection, TransportError>;
}

/// Whether a saved draft is the full generation or what existed at cancel
/// or error time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftStatus {
    Complete,
    Partial,
}

/// Identifier assigned by the draft store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DraftId(pub String);

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Draft not saved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    #[error("Cannot save a draft in {0} state")]
    NotSaveable(SessionStatus),

    #[error("Draft store failed: {0}")]
    Store(#[from] CollaboratorError),
}

/// What gets persisted for a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftPayload {
    pub content: String,
    pub citations: CitationLedger,
    pub status: DraftStatus,
    pub session_id: String,
}

impl DraftPayload {
    /// Build a payload from a finished snapshot.
    ///
    /// Completed sessions save as complete; cancelled and errored sessions
    /// save as partial. Running or idle sessions cannot be saved.
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Result<Self, DraftError> {
        let status = match snapshot.status {
            SessionStatus::Completed => DraftStatus::Complete,
            SessionStatus::Cancelled | SessionStatus::Errored => DraftStatus::Partial,
            other => return Err(DraftError::NotSaveable(other)),
        };

        Ok(Self {
            content: snapshot.content.clone(),
            citations: snapshot.citations.clone(),
            status,
            session_id: snapshot.id.clone(),
        })
    }
}

/// Persists drafts.
#[async_trait]
pub trait DraftStore: Send + Sync {
    async fn save(&self, draft: DraftPayload) -> Result<DraftId, CollaboratorError>;
}

/// Receipt for submitted feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackAck {
    pub feedback_id: String,
    pub received_at: DateTime<Utc>,
}

/// Stores user feedback.
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn submit(&self, record: &FeedbackRecord) -> Result<FeedbackAck, CollaboratorError>;
}
