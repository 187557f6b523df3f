//! Pre-export verification.
//!
//! Rendering is done elsewhere. The gate only decides whether a draft may be
//! exported and what the user must confirm first.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ReviewConfig;
use crate::session::{SessionSnapshot, SessionStatus};
use crate::warnings::{ValidationWarning, WarningReport};

/// Target document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Docx,
    Pdf,
    Markdown,
}

impl ExportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Pdf => "pdf",
            Self::Markdown => "markdown",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "docx" => Ok(Self::Docx),
            "pdf" => Ok(Self::Pdf),
            "markdown" | "md" => Ok(Self::Markdown),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

/// Export refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExportError {
    #[error("Cannot export a draft in {0} state")]
    NotExportable(SessionStatus),

    #[error("Warning report belongs to session {report}, not {session}")]
    ReportMismatch { session: String, report: String },

    #[error("Unknown export format: {0}")]
    UnknownFormat(String),
}

/// What the user sees before confirming an export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportVerification {
    pub format: ExportFormat,
    pub citation_count: usize,
    pub document_count: usize,
    /// Active warnings only
    pub warnings: Vec<ValidationWarning>,
    /// Whether the export is partial (cancelled draft)
    pub partial: bool,
    pub requires_confirmation: bool,
}

/// Decides whether a draft may be exported.
#[derive(Debug, Clone, Default)]
pub struct ExportGate {
    config: ReviewConfig,
}

impl ExportGate {
    pub fn new(config: ReviewConfig) -> Self {
        Self { config }
    }

    /// Verify a completed or cancelled draft for export.
    pub fn verify(
        &self,
        snapshot: &SessionSnapshot,
        report: &WarningReport,
        format: ExportFormat,
    ) -> Result<ExportVerification, ExportError> {
        if !matches!(
            snapshot.status,
            SessionStatus::Completed | SessionStatus::Cancelled
        ) {
            return Err(ExportError::NotExportable(snapshot.status));
        }
        if report.session_id != snapshot.id {
            return Err(ExportError::ReportMismatch {
                session: snapshot.id.clone(),
                report: report.session_id.clone(),
            });
        }

        let summary = snapshot.citations.summary();
        let warnings: Vec<ValidationWarning> = report.active().into_iter().cloned().collect();
        let partial = snapshot.status == SessionStatus::Cancelled;
        let requires_confirmation =
            partial || (self.config.confirm_export_with_warnings && !warnings.is_empty());

        Ok(ExportVerification {
            format,
            citation_count: summary.citation_count,
            document_count: summary.document_count,
            warnings,
            partial,
            requires_confirmation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{CancelReason, GenerationRequest, GenerationSession};
    use crate::warnings::WarningEngine;
    use draft_protocol::{Citation, ProtocolEvent};

    fn session_with(content: &str) -> GenerationSession {
        let mut session = GenerationSession::new();
        session.start(GenerationRequest::new("memo", "")).unwrap();
        session.apply(ProtocolEvent::token(content));
        session.apply(ProtocolEvent::Citation(Citation::new(1, "doc-a", "A")));
        session.apply(ProtocolEvent::Citation(Citation::new(2, "doc-a", "A")));
        session
    }

    #[test]
    fn test_clean_completed_export() {
        let mut session = session_with("One [1] two [2].");
        session.apply(ProtocolEvent::done(Some(0.9)));
        let snapshot = session.snapshot();
        let report = WarningEngine::default().evaluate(&snapshot);

        let verification = ExportGate::default()
            .verify(&snapshot, &report, ExportFormat::Docx)
            .unwrap();

        assert_eq!(verification.citation_count, 2);
        assert_eq!(verification.document_count, 1);
        assert!(verification.warnings.is_empty());
        assert!(!verification.requires_confirmation);
    }

    #[test]
    fn test_active_warnings_need_confirmation() {
        let mut session = session_with("One [1].");
        session.apply(ProtocolEvent::done(None));
        let snapshot = session.snapshot();
        let mut report = WarningEngine::default().evaluate(&snapshot);
        let gate = ExportGate::default();

        let verification = gate.verify(&snapshot, &report, ExportFormat::Pdf).unwrap();
        assert!(verification.requires_confirmation);
        assert_eq!(verification.warnings.len(), 1);

        report.dismiss("unused-2");
        let verification = gate.verify(&snapshot, &report, ExportFormat::Pdf).unwrap();
        assert!(!verification.requires_confirmation);
    }

    #[test]
    fn test_cancelled_export_is_partial() {
        let mut session = session_with("Half [1]");
        session.cancel(CancelReason::User);
        let snapshot = session.snapshot();
        let report = WarningEngine::default().evaluate(&snapshot);

        let verification = ExportGate::default()
            .verify(&snapshot, &report, ExportFormat::Markdown)
            .unwrap();
        assert!(verification.partial);
        assert!(verification.requires_confirmation);
    }

    #[test]
    fn test_errored_and_streaming_rejected() {
        let mut session = session_with("Text");
        let report = WarningEngine::default().evaluate(&session.snapshot());
        assert_eq!(
            ExportGate::default().verify(&session.snapshot(), &report, ExportFormat::Pdf),
            Err(ExportError::NotExportable(SessionStatus::Streaming))
        );

        session.apply(ProtocolEvent::error("boom", None));
        assert!(matches!(
            ExportGate::default().verify(&session.snapshot(), &report, ExportFormat::Pdf),
            Err(ExportError::NotExportable(SessionStatus::Errored))
        ));
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("MD".parse::<ExportFormat>(), Ok(ExportFormat::Markdown));
        assert!("rtf".parse::<ExportFormat>().is_err());
    }
}
