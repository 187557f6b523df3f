//! Terminal error classification.
//!
//! Maps the backend's opaque `{kind, message}` error payload into a closed
//! taxonomy. The backend taxonomy evolves independently, so anything
//! unrecognised becomes [`ErrorKind::Unknown`]. The classifier only annotates;
//! retrying is always the caller's decision.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::config::ClassifierConfig;
use crate::recovery::{RecoveryAdvisor, RecoveryAlternative};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Closed set of terminal error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub enum ErrorKind {
    Timeout,
    InsufficientSources,
    RateLimited,
    PermissionDenied,
    NotFound,
    Unknown,
}

impl ErrorKind {
    /// Human-readable title for error banners.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Timeout => "Generation timed out",
            Self::InsufficientSources => "Not enough sources found",
            Self::RateLimited => "Too many requests",
            Self::PermissionDenied => "Access denied",
            Self::NotFound => "Resource not found",
            Self::Unknown => "Generation failed",
        }
    }

    fn from_kind(kind: &str) -> Option<Self> {
        let normalized: String = kind
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match normalized.as_str() {
            "timeout" | "timedout" | "deadlineexceeded" | "gatewaytimeout" => Some(Self::Timeout),
            "insufficientsources" | "nosources" | "nosourcesfound" | "norelevantsources" => {
                Some(Self::InsufficientSources)
            }
            "ratelimited" | "ratelimit" | "toomanyrequests" | "quotaexceeded" => {
                Some(Self::RateLimited)
            }
            "permissiondenied" | "forbidden" | "unauthorized" | "accessdenied" => {
                Some(Self::PermissionDenied)
            }
            "notfound" | "kbnotfound" | "templatenotfound" => Some(Self::NotFound),
            _ => None,
        }
    }

    fn from_message(message: &str) -> Option<Self> {
        let message = message.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

        if has(&["timeout", "timed out", "deadline exceeded"]) {
            Some(Self::Timeout)
        } else if has(&["rate limit", "too many requests", "quota"]) {
            Some(Self::RateLimited)
        } else if has(&["insufficient sources", "no relevant sources", "no sources"]) {
            Some(Self::InsufficientSources)
        } else if has(&["permission", "forbidden", "unauthorized", "access denied"]) {
            Some(Self::PermissionDenied)
        } else if has(&["not found"]) {
            Some(Self::NotFound)
        } else {
            None
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Retry hint attached to retryable kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Suggested wait before the first retry
    pub delay_ms: u64,
    /// Suggested maximum number of retries
    pub max_attempts: u32,
}

/// A terminal error after classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedError {
    /// Classified kind
    pub kind: ErrorKind,
    /// Message from the backend, verbatim
    pub message: String,
    /// Kind string from the backend, verbatim
    pub raw_kind: Option<String>,
    /// Retry hint, if the kind is retryable
    pub retry: Option<RetryPolicy>,
    /// Default recovery alternatives for the kind
    pub recovery: Vec<RecoveryAlternative>,
}

/// Classifies terminal error events.
#[derive(Debug, Clone, Default)]
pub struct ErrorClassifier {
    config: ClassifierConfig,
}

impl ErrorClassifier {
    /// Create a classifier with explicit retry settings.
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Classify an error kind string.
    ///
    /// A present but unrecognized kind is `Unknown`. Keywords in `message`
    /// are only consulted when the backend sent no kind at all.
    pub fn kind_of(kind: Option<&str>, message: &str) -> ErrorKind {
        match kind {
            Some(kind) => ErrorKind::from_kind(kind),
            None => ErrorKind::from_message(message),
        }
        .unwrap_or(ErrorKind::Unknown)
    }

    /// Classify an error payload and attach retry and recovery hints.
    pub fn classify(&self, kind: Option<&str>, message: &str) -> ClassifiedError {
        let classified = Self::kind_of(kind, message);
        debug!(raw_kind = ?kind, kind = %classified, "Classified terminal error");
        self.with_hints(classified, kind, message)
    }

    /// Transport failures and early end of stream are always `Unknown`.
    pub fn transport_failure(&self, message: &str) -> ClassifiedError {
        self.with_hints(ErrorKind::Unknown, None, message)
    }

    fn with_hints(&self, kind: ErrorKind, raw_kind: Option<&str>, message: &str) -> ClassifiedError {
        ClassifiedError {
            kind,
            message: message.to_string(),
            raw_kind: raw_kind.map(String::from),
            retry: self.retry_policy(kind),
            recovery: RecoveryAdvisor::for_error(kind),
        }
    }

    /// Retry hint for a kind.
    pub fn retry_policy(&self, kind: ErrorKind) -> Option<RetryPolicy> {
        match kind {
            ErrorKind::RateLimited => Some(RetryPolicy {
                delay_ms: self.config.rate_limit_retry_delay_ms,
                max_attempts: self.config.rate_limit_max_attempts,
            }),
            ErrorKind::Timeout if self.config.timeout_retry_attempts > 0 => Some(RetryPolicy {
                delay_ms: 0,
                max_attempts: self.config.timeout_retry_attempts,
            }),
            _ => None,
        }
    }
}
