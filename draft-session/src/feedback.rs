//! User feedback on finished drafts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::recovery::FeedbackType;

/// Maximum feedback comment length, in characters.
pub const MAX_COMMENT_CHARS: usize = 500;

/// Rejected feedback submission.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedbackError {
    #[error("Feedback comment is {length} characters; the limit is {limit}")]
    CommentTooLong { length: usize, limit: usize },
}

/// A user judgment on a completed or cancelled draft. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    #[serde(rename = "type")]
    feedback_type: FeedbackType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    related_request_id: Option<String>,
    submitted_at: DateTime<Utc>,
}

impl FeedbackRecord {
    /// Feedback without a comment.
    pub fn new(feedback_type: FeedbackType) -> Self {
        Self {
            feedback_type,
            comment: None,
            related_request_id: None,
            submitted_at: Utc::now(),
        }
    }

    /// Feedback with a free-text comment.
    pub fn with_comment(
        feedback_type: FeedbackType,
        comment: impl Into<String>,
    ) -> Result<Self, FeedbackError> {
        let comment = comment.into();
        let length = comment.chars().count();
        if length > MAX_COMMENT_CHARS {
            return Err(FeedbackError::CommentTooLong {
                length,
                limit: MAX_COMMENT_CHARS,
            });
        }

        let mut record = Self::new(feedback_type);
        record.comment = Some(comment).filter(|c| !c.trim().is_empty());
        Ok(record)
    }

    /// Link the feedback to the session that produced the draft.
    pub fn related_to(mut self, request_id: impl Into<String>) -> Self {
        self.related_request_id = Some(request_id.into());
        self
    }

    pub fn feedback_type(&self) -> FeedbackType {
        self.feedback_type
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn related_request_id(&self) -> Option<&str> {
        self.related_request_id.as_deref()
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}
