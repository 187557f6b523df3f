//! Replay report and its text rendering.

use serde::Serialize;
use std::fmt::Write;

use draft_session::{
    DraftId, ExportVerification, RecoveryAlternative, SessionSnapshot, SessionStatus,
    WarningReport,
};

/// Everything a replay produced.
#[derive(Debug, Clone, Serialize)]
pub struct ReplayReport {
    pub snapshot: SessionSnapshot,
    pub review: WarningReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportVerification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft_id: Option<DraftId>,
    /// Auto-fixed content, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_content: Option<String>,
    pub recovery: Vec<RecoveryAlternative>,
}

impl ReplayReport {
    /// Human-readable summary.
    pub fn render_text(&self) -> String {
        let s = &self.snapshot;
        let mut out = String::new();

        let _ = writeln!(out, "Session {} - {}", s.id, s.status);
        if let Some(progress) = &s.progress_status {
            let _ = writeln!(out, "Last status: {}", progress);
        }
        if let Some(confidence) = s.confidence {
            let _ = writeln!(out, "Confidence: {:.0}%", confidence * 100.0);
        }
        if let Some(reason) = s.cancel_reason {
            let _ = writeln!(out, "Cancelled: {:?}", reason);
        }
        if let Some(error) = &s.error {
            let _ = writeln!(out, "Error: {} ({})", error.kind.title(), error.message);
            if let Some(retry) = error.retry {
                let _ = writeln!(
                    out,
                    "Retry: up to {} attempt(s) after {} ms",
                    retry.max_attempts, retry.delay_ms
                );
            }
        }
        if s.anomaly_count > 0 {
            let _ = writeln!(out, "Anomalies: {}", s.anomaly_count);
        }

        let _ = writeln!(out, "\n--- Content ({} fragments) ---", s.fragment_count);
        let _ = writeln!(out, "{}", self.fixed_content.as_deref().unwrap_or(&s.content));

        if !s.citations.is_empty() {
            let _ = writeln!(out, "\n--- Citations ---");
            for citation in s.citations.iter() {
                let _ = writeln!(out, "[{}] {}", citation.number, citation.label());
            }
        }

        if s.status == SessionStatus::Completed {
            let _ = writeln!(out, "\n--- Review ---");
            if self.review.is_empty() {
                let _ = writeln!(out, "No warnings");
            }
            for warning in self.review.all() {
                let fix = if warning.auto_fix.is_some() { " (auto-fix)" } else { "" };
                let _ = writeln!(out, "{}: {}{}", warning.id, warning.message, fix);
            }
        }

        let _ = writeln!(out, "\n--- Export ---");
        match (&self.export, &self.export_error) {
            (Some(export), _) => {
                let _ = writeln!(
                    out,
                    "{}: {} citation(s) from {} document(s){}{}",
                    export.format,
                    export.citation_count,
                    export.document_count,
                    if export.partial { ", partial" } else { "" },
                    if export.requires_confirmation {
                        ", needs confirmation"
                    } else {
                        ""
                    }
                );
            }
            (None, Some(error)) => {
                let _ = writeln!(out, "Not exportable: {}", error);
            }
            (None, None) => {}
        }

        if let Some(id) = &self.draft_id {
            let _ = writeln!(out, "Saved draft: {}", id);
        }

        if !self.recovery.is_empty() {
            let _ = writeln!(out, "\n--- Next steps ---");
            for (i, alternative) in self.recovery.iter().enumerate() {
                let _ = writeln!(out, "{}. {}", i + 1, alternative.description);
            }
        }

        out
    }
}
