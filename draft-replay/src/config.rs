//! Configuration for draft-replay
//!
//! CLI arguments with environment variable fallbacks.

use clap::Parser;
use std::path::PathBuf;

use draft_session::{EngineConfig, ExportFormat, FeedbackType};

/// draft-replay - run a captured generation stream through the session engine
#[derive(Parser, Debug, Clone)]
#[command(name = "draft-replay")]
#[command(about = "Replay a captured generation stream and review the resulting draft")]
pub struct Args {
    /// Captured stream: newline-delimited JSON frames, optionally SSE-prefixed
    #[arg(env = "DRAFT_REPLAY_INPUT")]
    pub input: PathBuf,

    /// Engine config YAML (defaults apply when omitted)
    #[arg(long, env = "DRAFT_ENGINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Template type recorded on the request
    #[arg(long, env = "DRAFT_TEMPLATE", default_value = "replay")]
    pub template: String,

    /// Knowledge bases recorded on the request (comma-separated)
    #[arg(long, env = "DRAFT_KB_SCOPE", value_delimiter = ',')]
    pub kb_scope: Vec<String>,

    /// Bytes per simulated read
    #[arg(long, env = "DRAFT_CHUNK_SIZE", default_value = "4096")]
    pub chunk_size: usize,

    /// Delay between simulated reads (ms)
    #[arg(long, env = "DRAFT_CHUNK_DELAY_MS", default_value = "0")]
    pub chunk_delay_ms: u64,

    /// Cancel the generation after this long (ms), as a user would
    #[arg(long, env = "DRAFT_CANCEL_AFTER_MS")]
    pub cancel_after_ms: Option<u64>,

    /// Generation deadline (ms), overrides the config file
    #[arg(long, env = "DRAFT_DEADLINE_MS")]
    pub deadline_ms: Option<u64>,

    /// Export format to verify the draft for
    #[arg(long, env = "DRAFT_EXPORT_FORMAT", default_value = "markdown")]
    pub export_format: ExportFormat,

    /// Submit this feedback type and print the suggested alternatives
    #[arg(long, env = "DRAFT_FEEDBACK")]
    pub feedback: Option<FeedbackType>,

    /// Optional feedback comment
    #[arg(long, env = "DRAFT_FEEDBACK_COMMENT")]
    pub feedback_comment: Option<String>,

    /// Save the finished draft to the in-memory store
    #[arg(long, env = "DRAFT_SAVE", default_value = "false")]
    pub save: bool,

    /// Print the auto-fixed content instead of the raw content
    #[arg(long, env = "DRAFT_APPLY_FIXES", default_value = "false")]
    pub apply_fixes: bool,

    /// Emit the report as JSON on stdout
    #[arg(long, env = "DRAFT_JSON", default_value = "false")]
    pub json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Validate argument combinations.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("DRAFT_CHUNK_SIZE must be greater than zero".to_string());
        }
        if self.feedback_comment.is_some() && self.feedback.is_none() {
            return Err("DRAFT_FEEDBACK_COMMENT requires DRAFT_FEEDBACK".to_string());
        }
        Ok(())
    }

    /// Load the engine config and apply CLI overrides.
    pub fn engine_config(&self) -> Result<EngineConfig, draft_session::ConfigError> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)?,
            None => EngineConfig::default(),
        };
        if let Some(deadline_ms) = self.deadline_ms {
            config.session.deadline_ms = Some(deadline_ms);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("draft-replay").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["capture.ndjson"]);
        assert_eq!(args.chunk_size, 4096);
        assert_eq!(args.export_format, ExportFormat::Markdown);
        assert!(args.feedback.is_none());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_typed_values() {
        let args = parse(&[
            "capture.ndjson",
            "--feedback",
            "wrong_format",
            "--export-format",
            "pdf",
            "--kb-scope",
            "kb-a,kb-b",
        ]);
        assert_eq!(args.feedback, Some(FeedbackType::WrongFormat));
        assert_eq!(args.export_format, ExportFormat::Pdf);
        assert_eq!(args.kb_scope, vec!["kb-a", "kb-b"]);
    }

    #[test]
    fn test_comment_requires_feedback() {
        let args = parse(&["capture.ndjson", "--feedback-comment", "meh"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_deadline_override() {
        let args = parse(&["capture.ndjson", "--deadline-ms", "250"]);
        assert_eq!(args.engine_config().unwrap().session.deadline_ms, Some(250));
    }
}
