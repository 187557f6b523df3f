//! Recovery advisor.
//!
//! Maps negative feedback (or a classified terminal error) to an ordered list
//! of next actions. The mapping is a static table: the cheapest, most targeted
//! fix comes first.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::classifier::ErrorKind;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Kind of judgment a user submitted on a finished draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    NotRelevant,
    Inaccurate,
    Incomplete,
    WrongFormat,
    LowConfidence,
    Other,
}

impl FeedbackType {
    /// Wire name, e.g. `"wrong_format"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotRelevant => "not_relevant",
            Self::Inaccurate => "inaccurate",
            Self::Incomplete => "incomplete",
            Self::WrongFormat => "wrong_format",
            Self::LowConfidence => "low_confidence",
            Self::Other => "other",
        }
    }

    /// All feedback types.
    pub fn all() -> [Self; 6] {
        [
            Self::NotRelevant,
            Self::Inaccurate,
            Self::Incomplete,
            Self::WrongFormat,
            Self::LowConfidence,
            Self::Other,
        ]
    }
}

impl fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised feedback type string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown feedback type: {0}")]
pub struct UnknownFeedbackType(pub String);

impl FromStr for FeedbackType {
    type Err = UnknownFeedbackType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownFeedbackType(s.to_string()))
    }
}

/// Category of a recovery alternative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum AlternativeType {
    Search,
    KnowledgeBase,
    Context,
    Template,
    Regenerate,
    Sources,
    Proceed,
    Retry,
    Access,
    Support,
}

/// Concrete action a caller can wire to a button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    RefineSearchQuery,
    SwitchKnowledgeBase,
    AddContext,
    SelectTemplate,
    RegenerateWithStructure,
    AddSections,
    AddInstructions,
    RegenerateWithFeedback,
    FindMoreSources,
    AcknowledgeAndProceed,
    StartFreshDraft,
    ChangeSearch,
    ContactSupport,
    WaitAndRetry,
    RetryNow,
    SimplifyRequest,
    BroadenSearch,
    RequestAccess,
}

impl RecoveryAction {
    /// Whether the action leads to template selection.
    pub fn targets_template_selection(&self) -> bool {
        matches!(self, Self::SelectTemplate)
    }
}

/// A suggested next action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct RecoveryAlternative {
    #[serde(rename = "type")]
    pub alternative_type: AlternativeType,
    pub description: String,
    pub action: RecoveryAction,
}

type Row = (AlternativeType, &'static str, RecoveryAction);

const NOT_RELEVANT: &[Row] = &[
    (AlternativeType::Search, "Refine your search query", RecoveryAction::RefineSearchQuery),
    (AlternativeType::KnowledgeBase, "Try a different knowledge base", RecoveryAction::SwitchKnowledgeBase),
    (AlternativeType::Context, "Add more context to your request", RecoveryAction::AddContext),
];

const WRONG_FORMAT: &[Row] = &[
    (AlternativeType::Template, "Select a different template", RecoveryAction::SelectTemplate),
    (AlternativeType::Regenerate, "Regenerate with an explicit structure", RecoveryAction::RegenerateWithStructure),
];

const INCOMPLETE: &[Row] = &[
    (AlternativeType::Context, "Add the missing sections", RecoveryAction::AddSections),
    (AlternativeType::Context, "Provide additional instructions", RecoveryAction::AddInstructions),
    (AlternativeType::Regenerate, "Regenerate using your feedback", RecoveryAction::RegenerateWithFeedback),
];

const LOW_CONFIDENCE: &[Row] = &[
    (AlternativeType::Sources, "Search for more or better sources", RecoveryAction::FindMoreSources),
    (AlternativeType::Proceed, "Acknowledge the confidence level and proceed", RecoveryAction::AcknowledgeAndProceed),
];

const GENERAL: &[Row] = &[
    (AlternativeType::Regenerate, "Start a fresh draft", RecoveryAction::StartFreshDraft),
    (AlternativeType::Search, "Change your search", RecoveryAction::ChangeSearch),
    (AlternativeType::Support, "Contact support", RecoveryAction::ContactSupport),
];

const ON_TIMEOUT: &[Row] = &[
    (AlternativeType::Retry, "Try again", RecoveryAction::RetryNow),
    (AlternativeType::Context, "Simplify the request", RecoveryAction::SimplifyRequest),
];

const ON_INSUFFICIENT_SOURCES: &[Row] = &[
    (AlternativeType::Search, "Search with a broader query", RecoveryAction::BroadenSearch),
    (AlternativeType::Template, "Use a template instead", RecoveryAction::SelectTemplate),
];

const ON_RATE_LIMITED: &[Row] = &[
    (AlternativeType::Retry, "Wait and retry automatically", RecoveryAction::WaitAndRetry),
];

const ON_PERMISSION_DENIED: &[Row] = &[
    (AlternativeType::Access, "Request access to the knowledge base", RecoveryAction::RequestAccess),
    (AlternativeType::KnowledgeBase, "Choose a knowledge base you can access", RecoveryAction::SwitchKnowledgeBase),
];

const ON_NOT_FOUND: &[Row] = &[
    (AlternativeType::KnowledgeBase, "Choose another knowledge base", RecoveryAction::SwitchKnowledgeBase),
    (AlternativeType::Template, "Select a different template", RecoveryAction::SelectTemplate),
];

const ON_UNKNOWN: &[Row] = &[
    (AlternativeType::Retry, "Try again", RecoveryAction::RetryNow),
    (AlternativeType::Support, "Contact support", RecoveryAction::ContactSupport),
];

const FALLBACK: Row = (
    AlternativeType::Regenerate,
    "Start over with a new draft",
    RecoveryAction::StartFreshDraft,
);

fn build(rows: &[Row]) -> Vec<RecoveryAlternative> {
    rows.iter().map(to_alternative).collect()
}

fn to_alternative(row: &Row) -> RecoveryAlternative {
    let (alternative_type, description, action) = *row;
    RecoveryAlternative {
        alternative_type,
        description: description.to_string(),
        action,
    }
}

/// Static mapping from feedback and errors to recovery alternatives.
pub struct RecoveryAdvisor;

impl RecoveryAdvisor {
    /// Alternatives for a feedback type given as its wire name.
    ///
    /// Unknown types yield an empty list.
    pub fn suggest(feedback_type: &str) -> Vec<RecoveryAlternative> {
        match feedback_type.parse::<FeedbackType>() {
            Ok(feedback_type) => Self::suggest_for(feedback_type),
            Err(_) => Vec::new(),
        }
    }

    /// Alternatives for a typed feedback type.
    pub fn suggest_for(feedback_type: FeedbackType) -> Vec<RecoveryAlternative> {
        build(match feedback_type {
            FeedbackType::NotRelevant => NOT_RELEVANT,
            FeedbackType::WrongFormat => WRONG_FORMAT,
            FeedbackType::Incomplete => INCOMPLETE,
            FeedbackType::LowConfidence => LOW_CONFIDENCE,
            FeedbackType::Inaccurate | FeedbackType::Other => GENERAL,
        })
    }

    /// Default alternatives attached to a classified terminal error.
    pub fn for_error(kind: ErrorKind) -> Vec<RecoveryAlternative> {
        build(match kind {
            ErrorKind::Timeout => ON_TIMEOUT,
            ErrorKind::InsufficientSources => ON_INSUFFICIENT_SOURCES,
            ErrorKind::RateLimited => ON_RATE_LIMITED,
            ErrorKind::PermissionDenied => ON_PERMISSION_DENIED,
            ErrorKind::NotFound => ON_NOT_FOUND,
            ErrorKind::Unknown => ON_UNKNOWN,
        })
    }

    /// Generic action offered when nothing more specific applies.
    pub fn fallback() -> RecoveryAlternative {
        to_alternative(&FALLBACK)
    }

    /// Return `alternatives`, or the generic fallback if it is empty.
    pub fn with_fallback(alternatives: Vec<RecoveryAlternative>) -> Vec<RecoveryAlternative> {
        if alternatives.is_empty() {
            vec![Self::fallback()]
        } else {
            alternatives
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrong_format_leads_with_template() {
        let alternatives = RecoveryAdvisor::suggest("wrong_format");
        assert!(!alternatives.is_empty());
        assert!(alternatives[0].action.targets_template_selection());
    }

    #[test]
    fn test_unknown_type_is_empty() {
        assert!(RecoveryAdvisor::suggest("unknown_type").is_empty());
        assert!(RecoveryAdvisor::suggest("").is_empty());
    }

    #[test]
    fn test_table_order() {
        let actions: Vec<_> = RecoveryAdvisor::suggest("not_relevant")
            .into_iter()
            .map(|a| a.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                RecoveryAction::RefineSearchQuery,
                RecoveryAction::SwitchKnowledgeBase,
                RecoveryAction::AddContext,
            ]
        );

        let low: Vec<_> = RecoveryAdvisor::suggest_for(FeedbackType::LowConfidence)
            .into_iter()
            .map(|a| a.action)
            .collect();
        assert_eq!(
            low,
            vec![RecoveryAction::FindMoreSources, RecoveryAction::AcknowledgeAndProceed]
        );
    }

    #[test]
    fn test_inaccurate_and_other_share_general_list() {
        assert_eq!(
            RecoveryAdvisor::suggest("inaccurate"),
            RecoveryAdvisor::suggest("other")
        );
        assert_eq!(
            RecoveryAdvisor::suggest("other").last().map(|a| a.action),
            Some(RecoveryAction::ContactSupport)
        );
    }

    #[test]
    fn test_every_feedback_type_has_alternatives() {
        for feedback_type in FeedbackType::all() {
            assert!(!RecoveryAdvisor::suggest_for(feedback_type).is_empty());
            assert_eq!(feedback_type.as_str().parse::<FeedbackType>(), Ok(feedback_type));
        }
    }

    #[test]
    fn test_error_defaults() {
        let rate_limited = RecoveryAdvisor::for_error(ErrorKind::RateLimited);
        assert_eq!(rate_limited[0].action, RecoveryAction::WaitAndRetry);

        let insufficient = RecoveryAdvisor::for_error(ErrorKind::InsufficientSources);
        assert_eq!(insufficient[0].action, RecoveryAction::BroadenSearch);
        assert_eq!(insufficient[1].action, RecoveryAction::SelectTemplate);
    }

    #[test]
    fn test_with_fallback() {
        let filled = RecoveryAdvisor::with_fallback(RecoveryAdvisor::suggest("nope"));
        assert_eq!(filled, vec![RecoveryAdvisor::fallback()]);

        let kept = RecoveryAdvisor::with_fallback(RecoveryAdvisor::suggest("incomplete"));
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn test_serializes_type_field() {
        let json = serde_json::to_value(&RecoveryAdvisor::suggest("wrong_format")[0]).unwrap();
        assert_eq!(json["type"], "template");
        assert_eq!(json["action"], "select_template");
    }
}
