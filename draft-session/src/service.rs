//! GenerationService - entry point for hosts.
//!
//! Ties the transport, draft store and feedback sink to the session engine
//! and tracks one running generation per slot.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::collaborators::{
    CollaboratorError, DraftError, DraftId, DraftPayload, DraftStore, FeedbackAck, FeedbackSink,
    GenerationTransport, TransportError,
};
use crate::config::EngineConfig;
use crate::controller::{ActorOptions, CancelHandle, SessionActor};
use crate::export::{ExportError, ExportFormat, ExportGate, ExportVerification};
use crate::feedback::{FeedbackError, FeedbackRecord};
use crate::recovery::{RecoveryAdvisor, RecoveryAlternative};
use crate::session::{CancelReason, GenerationRequest, GenerationSession, SessionError, SessionSnapshot};
use crate::warnings::{WarningEngine, WarningReport};

/// Error types for the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Draft error: {0}")]
    Draft(#[from] DraftError),

    #[error("Feedback error: {0}")]
    Feedback(#[from] FeedbackError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// The session task panicked or was aborted
    #[error("Session task failed: {0}")]
    TaskFailed(String),
}

/// A generation in progress.
#[derive(Debug)]
pub struct RunningGeneration {
    pub session_id: String,
    pub cancel: CancelHandle,
    /// Latest snapshot, updated after every change
    pub updates: watch::Receiver<SessionSnapshot>,
    pub task: JoinHandle<SessionSnapshot>,
}

impl RunningGeneration {
    /// Wait for the session to end.
    pub async fn finish(self) -> Result<SessionSnapshot, ServiceError> {
        self.task
            .await
            .map_err(|e| ServiceError::TaskFailed(e.to_string()))
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.updates.borrow().clone()
    }
}

/// Feedback receipt plus what to offer the user next.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub ack: FeedbackAck,
    /// Never empty
    pub alternatives: Vec<RecoveryAlternative>,
}

/// Main entry point for grounded draft generation.
pub struct GenerationService {
    config: EngineConfig,
    transport: Arc<dyn GenerationTransport>,
    drafts: Arc<dyn DraftStore>,
    feedback: Arc<dyn FeedbackSink>,
    warnings: WarningEngine,
    export: ExportGate,
    /// Cancel handle of the latest generation per slot
    slots: Arc<Mutex<HashMap<String, CancelHandle>>>,
}

impl GenerationService {
    /// Create a service with default configuration.
    pub fn new(
        transport: Arc<dyn GenerationTransport>,
        drafts: Arc<dyn DraftStore>,
        feedback: Arc<dyn FeedbackSink>,
    ) -> Self {
        let config = EngineConfig::default();
        Self {
            warnings: WarningEngine::new(config.review.clone()),
            export: ExportGate::new(config.review.clone()),
            config,
            transport,
            drafts,
            feedback,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.warnings = WarningEngine::new(config.review.clone());
        self.export = ExportGate::new(config.review.clone());
        self.config = config;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start a generation in `slot`.
    ///
    /// A generation still running in the same slot is cancelled as
    /// superseded once the new connection is open.
    pub async fn generate(
        &self,
        slot: &str,
        request: GenerationRequest,
    ) -> Result<RunningGeneration, ServiceError> {
        let mut session = GenerationSession::from_config(&self.config);
        session.start(request.clone())?;
        let session_id = session.id().to_string();

        let connection = self.transport.open(&request).await.map_err(|e| {
            warn!(session_id = %session_id, error = %e, "Failed to open generation stream");
            e
        })?;

        let options = ActorOptions::from_config(&self.config, request.deadline_ms);
        let (actor, cancel, updates) = SessionActor::new(session, connection, options);

        {
            let mut slots = self.slots.lock().await;
            if let Some(previous) = slots.insert(slot.to_string(), cancel.clone()) {
                if previous.cancel_with(CancelReason::Superseded) {
                    info!(
                        slot,
                        previous = %previous.session_id(),
                        session_id = %session_id,
                        "Superseded running generation"
                    );
                }
            }
        }

        debug!(slot, session_id = %session_id, "Spawning session actor");
        let task = actor.spawn();

        Ok(RunningGeneration {
            session_id,
            cancel,
            updates,
            task,
        })
    }

    /// Cancel whatever runs in `slot`. Returns whether a running generation
    /// was signalled.
    pub async fn cancel_slot(&self, slot: &str) -> bool {
        match self.slots.lock().await.get(slot) {
            Some(handle) => handle.cancel(),
            None => false,
        }
    }

    /// Slots with a generation still running.
    pub async fn active_slots(&self) -> Vec<String> {
        let mut slots = self.slots.lock().await;
        slots.retain(|_, handle| !handle.is_finished());
        slots.keys().cloned().collect()
    }

    /// Persist a finished draft.
    ///
    /// Completed drafts save as complete; cancelled or errored ones as partial.
    pub async fn save_draft(&self, snapshot: &SessionSnapshot) -> Result<DraftId, ServiceError> {
        let payload = DraftPayload::from_snapshot(snapshot)?;
        let status = payload.status;

        let id = self
            .drafts
            .save(payload)
            .await
            .map_err(DraftError::Store)?;

        info!(session_id = %snapshot.id, draft_id = %id, ?status, "Saved draft");
        Ok(id)
    }

    /// Forward feedback and return recovery alternatives.
    pub async fn submit_feedback(
        &self,
        record: FeedbackRecord,
    ) -> Result<FeedbackResponse, ServiceError> {
        let ack = self.feedback.submit(&record).await?;
        let alternatives =
            RecoveryAdvisor::with_fallback(RecoveryAdvisor::suggest_for(record.feedback_type()));

        debug!(
            feedback_type = %record.feedback_type(),
            alternatives = alternatives.len(),
            "Feedback submitted"
        );

        Ok(FeedbackResponse { ack, alternatives })
    }

    /// Review a finished draft.
    pub fn review(&self, snapshot: &SessionSnapshot) -> WarningReport {
        self.warnings.evaluate(snapshot)
    }

    /// Verify a draft before export.
    pub fn export_gate(
        &self,
        snapshot: &SessionSnapshot,
        report: &WarningReport,
        format: ExportFormat,
    ) -> Result<ExportVerification, ServiceError> {
        Ok(self.export.verify(snapshot, report, format)?)
    }
}
