//! Citation review of finished drafts.
//!
//! The warning engine checks a completed snapshot for marker/ledger
//! inconsistencies and low confidence. Warnings never block completion; they
//! can be dismissed one at a time, and orphaned markers carry an auto-fix.

use serde::{Deserialize, Serialize};
use tracing::debug;

use draft_protocol::markers;
use draft_protocol::CitationWarning;

use crate::config::ReviewConfig;
use crate::session::{SessionSnapshot, SessionStatus};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Category of a review warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// Content cites `[n]` but no citation `n` exists
    OrphanedCitation,
    /// Citation `n` is never cited in content
    UnusedCitation,
    /// Reported confidence is below the review threshold
    LowConfidence,
}

/// Mechanical correction attached to a warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(tag = "fix", rename_all = "snake_case")]
pub enum AutoFix {
    /// Remove every `[number]` marker from content
    StripMarker { number: u32 },
}

impl AutoFix {
    /// Apply the fix to `content`, returning the corrected copy.
    pub fn apply(&self, content: &str) -> String {
        match self {
            Self::StripMarker { number } => markers::strip_marker(content, *number),
        }
    }
}

/// One dismissible review warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ValidationWarning {
    /// Stable within a report, e.g. `orphaned-3`
    pub id: String,
    pub kind: WarningKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<u32>,
    pub message: String,
    #[serde(default)]
    pub dismissed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_fix: Option<AutoFix>,
}

impl ValidationWarning {
    fn from_citation(warning: CitationWarning) -> Self {
        match warning {
            CitationWarning::Orphaned { number } => Self {
                id: format!("orphaned-{}", number),
                kind: WarningKind::OrphanedCitation,
                number: Some(number),
                message: format!("Marker [{}] has no matching citation", number),
                dismissed: false,
                auto_fix: Some(AutoFix::StripMarker { number }),
            },
            CitationWarning::Unused { number } => Self {
                id: format!("unused-{}", number),
                kind: WarningKind::UnusedCitation,
                number: Some(number),
                message: format!("Citation [{}] is not referenced in the draft", number),
                dismissed: false,
                auto_fix: None,
            },
        }
    }

    fn low_confidence(confidence: f32, threshold: f32) -> Self {
        Self {
            id: "low-confidence".to_string(),
            kind: WarningKind::LowConfidence,
            number: None,
            message: format!(
                "Confidence {:.0}% is below the review threshold of {:.0}%",
                confidence * 100.0,
                threshold * 100.0
            ),
            dismissed: false,
            auto_fix: None,
        }
    }
}

/// Warnings for one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarningReport {
    /// Session the report was computed for
    pub session_id: String,
    warnings: Vec<ValidationWarning>,
}

impl WarningReport {
    fn empty(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            warnings: Vec::new(),
        }
    }

    /// All warnings, dismissed ones included.
    pub fn all(&self) -> &[ValidationWarning] {
        &self.warnings
    }

    /// Warnings that have not been dismissed.
    pub fn active(&self) -> Vec<&ValidationWarning> {
        self.warnings.iter().filter(|w| !w.dismissed).collect()
    }

    /// Whether any warning is still active.
    pub fn has_active(&self) -> bool {
        self.warnings.iter().any(|w| !w.dismissed)
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Dismiss one warning. Returns whether a warning with `id` exists.
    pub fn dismiss(&mut self, id: &str) -> bool {
        match self.warnings.iter_mut().find(|w| w.id == id) {
            Some(warning) => {
                warning.dismissed = true;
                true
            }
            None => false,
        }
    }

    /// Apply the auto-fixes of all active warnings to a copy of `content`.
    pub fn apply_auto_fixes(&self, content: &str) -> String {
        self.warnings
            .iter()
            .filter(|w| !w.dismissed)
            .filter_map(|w| w.auto_fix)
            .fold(content.to_string(), |fixed, fix| fix.apply(&fixed))
    }
}

/// Produces review warnings for finished drafts.
#[derive(Debug, Clone, Default)]
pub struct WarningEngine {
    config: ReviewConfig,
}

impl WarningEngine {
    pub fn new(config: ReviewConfig) -> Self {
        Self { config }
    }

    /// Review a snapshot.
    ///
    /// Only completed drafts are reviewed; any other status yields an empty
    /// report.
    pub fn evaluate(&self, snapshot: &SessionSnapshot) -> WarningReport {
        if snapshot.status != SessionStatus::Completed {
            return WarningReport::empty(&snapshot.id);
        }

        let mut warnings: Vec<ValidationWarning> = snapshot
            .citations
            .validate(&snapshot.content)
            .into_iter()
            .map(ValidationWarning::from_citation)
            .collect();

        if let Some(confidence) = snapshot.confidence {
            if confidence < self.config.low_confidence_threshold {
                warnings.push(ValidationWarning::low_confidence(
                    confidence,
                    self.config.low_confidence_threshold,
                ));
            }
        }

        debug!(
            session_id = %snapshot.id,
            warnings = warnings.len(),
            "Reviewed draft"
        );

        WarningReport {
            session_id: snapshot.id.clone(),
            warnings,
        }
    }
}
