//! Draft Session - Streaming Generation Engine
//!
//! Consumes a generation stream and keeps one draft consistent while it
//! materializes:
//! - A session state machine that accumulates content and citations
//! - A single-consumer actor that serializes events, cancels and deadlines
//! - Terminal error classification with retry and recovery hints
//! - Feedback-driven recovery suggestions
//! - Citation review with dismissible warnings and an export gate
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                    GenerationService                      │
//! │   (one running generation per slot, supersedes the old)   │
//! └─────────────┬───────────────────────────────┬─────────────┘
//!               │ open                          │ save / submit
//!               ▼                               ▼
//! ┌──────────────────────┐          ┌───────────────────────┐
//! │ GenerationTransport  │          │ DraftStore            │
//! └──────────┬───────────┘          │ FeedbackSink          │
//!            │ Connection           └───────────────────────┘
//!            ▼
//! ┌──────────────────────┐  watch   ┌───────────────────────┐
//! │    SessionActor      │ ───────▶ │   SessionSnapshot     │
//! │  GenerationSession   │          └──────────┬────────────┘
//! └──────────────────────┘                     │
//!                              ┌───────────────┼───────────────┐
//!                              ▼               ▼               ▼
//!                        WarningEngine    ExportGate    RecoveryAdvisor
//! ```

pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod controller;
pub mod export;
pub mod feedback;
pub mod mock;
pub mod recovery;
pub mod service;
pub mod session;
pub mod warnings;

// Re-export main types for convenience
pub use classifier::{ClassifiedError, ErrorClassifier, ErrorKind, RetryPolicy};
pub use collaborators::{
    CloseHandle, CollaboratorError, Connection, DraftError, DraftId, DraftPayload, DraftStatus,
    DraftStore, FeedbackAck, FeedbackSink, GenerationTransport, TransportError,
};
pub use config::{ConfigError, EngineConfig};
pub use controller::{ActorOptions, CancelHandle, SessionActor};
pub use export::{ExportError, ExportFormat, ExportGate, ExportVerification};
pub use feedback::{FeedbackError, FeedbackRecord};
pub use recovery::{AlternativeType, FeedbackType, RecoveryAction, RecoveryAdvisor, RecoveryAlternative};
pub use service::{FeedbackResponse, GenerationService, RunningGeneration, ServiceError};
pub use session::{
    ApplyOutcome, CancelOutcome, CancelReason, GenerationRequest, GenerationSession, SessionError,
    SessionSnapshot, SessionStatus,
};
pub use warnings::{AutoFix, ValidationWarning, WarningEngine, WarningKind, WarningReport};
