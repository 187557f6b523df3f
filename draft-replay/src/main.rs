//! draft-replay - offline driver for the grounded draft engine
//!
//! Replays a captured generation stream through the same session actor,
//! review and export path a live host uses.

mod config;
mod report;
mod transport;

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use draft_session::mock::{InMemoryDraftStore, RecordingFeedbackSink};
use draft_session::{
    EngineConfig, FeedbackRecord, GenerationRequest, GenerationService, SessionStatus,
};

use crate::config::Args;
use crate::report::ReplayReport;
use crate::transport::FileTransport;

const SLOT: &str = "replay";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Logs go to stderr so stdout stays clean for the report
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "draft_replay={0},draft_session={0},draft_protocol={0},warn",
                    log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let config = args
        .engine_config()
        .context("failed to load engine config")?;

    let report = replay(&args, config).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render_text());
    }

    Ok(())
}

async fn replay(args: &Args, config: EngineConfig) -> anyhow::Result<ReplayReport> {
    let transport = FileTransport::new(&args.input)
        .with_chunk_size(args.chunk_size)
        .with_chunk_delay(Duration::from_millis(args.chunk_delay_ms));

    let service = GenerationService::new(
        Arc::new(transport),
        Arc::new(InMemoryDraftStore::new()),
        Arc::new(RecordingFeedbackSink::new()),
    )
    .with_config(config);

    let request = GenerationRequest::new(&args.template, format!("replay of {}", args.input.display()))
        .with_kb_scope(args.kb_scope.iter().cloned());

    info!(input = %args.input.display(), "Replaying capture");
    let running = service
        .generate(SLOT, request)
        .await
        .context("failed to open capture")?;

    if let Some(after_ms) = args.cancel_after_ms {
        let cancel = running.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(after_ms)).await;
            if cancel.cancel() {
                info!(after_ms, "Cancelled replay");
            }
        });
    }

    let mut updates = running.updates.clone();
    tokio::spawn(async move {
        let mut last = SessionStatus::Idle;
        while updates.changed().await.is_ok() {
            let status = updates.borrow_and_update().status;
            if status != last {
                debug!(%status, "Session status changed");
                last = status;
            }
        }
    });

    let snapshot = running.finish().await?;
    let review = service.review(&snapshot);

    let (export, export_error) =
        match service.export_gate(&snapshot, &review, args.export_format) {
            Ok(verification) => (Some(verification), None),
            Err(e) => (None, Some(e.to_string())),
        };

    let draft_id = if args.save {
        Some(service.save_draft(&snapshot).await?)
    } else {
        None
    };

    let fixed_content = args
        .apply_fixes
        .then(|| review.apply_auto_fixes(&snapshot.content));

    let recovery = match args.feedback {
        Some(feedback_type) => {
            let record = match &args.feedback_comment {
                Some(comment) => FeedbackRecord::with_comment(feedback_type, comment.clone())?,
                None => FeedbackRecord::new(feedback_type),
            }
            .related_to(snapshot.id.clone());
            service.submit_feedback(record).await?.alternatives
        }
        None => snapshot
            .error
            .as_ref()
            .map(|e| e.recovery.clone())
            .unwrap_or_default(),
    };

    Ok(ReplayReport {
        snapshot,
        review,
        export,
        export_error,
        draft_id,
        fixed_content,
        recovery,
    })
}
