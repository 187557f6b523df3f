//! End-to-end generation integration tests
//!
//! Drives the service through in-memory collaborators:
//! - Full scenarios from status frames to a reviewed draft
//! - Cancellation, deadline and supersede behaviour of the session actor
//! - Partial saves and feedback-driven recovery

use std::sync::Arc;
use std::time::Duration;

use draft_protocol::{Citation, ProtocolEvent, TransportError};
use draft_session::mock::{ChannelTransport, InMemoryDraftStore, RecordingFeedbackSink, ScriptedTransport};
use draft_session::{
    CancelReason, DraftStatus, EngineConfig, ErrorKind, ExportFormat, FeedbackRecord,
    FeedbackType, GenerationRequest, GenerationService, GenerationTransport, RecoveryAction,
    SessionStatus, WarningKind,
};

fn request() -> GenerationRequest {
    GenerationRequest::new("security_overview", "Summarize our OAuth setup")
        .with_kb_scope(["kb-security"])
}

fn oauth_script() -> Vec<ProtocolEvent> {
    vec![
        ProtocolEvent::status("Retrieving sources..."),
        ProtocolEvent::token("OAuth is "),
        ProtocolEvent::token("secure."),
        ProtocolEvent::Citation(
            Citation::new(1, "doc-oauth", "OAuth Guide")
                .with_page(4)
                .with_excerpt("Tokens are short-lived", 120, 142),
        ),
        ProtocolEvent::done(Some(0.92)),
    ]
}

struct Harness {
    service: GenerationService,
    drafts: Arc<InMemoryDraftStore>,
    feedback: Arc<RecordingFeedbackSink>,
}

fn harness(transport: Arc<dyn GenerationTransport>) -> Harness {
    let drafts = Arc::new(InMemoryDraftStore::new());
    let feedback = Arc::new(RecordingFeedbackSink::new());
    let service = GenerationService::new(transport, drafts.clone(), feedback.clone());
    Harness {
        service,
        drafts,
        feedback,
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_successful_generation() {
    let transport = Arc::new(ScriptedTransport::from_events(&oauth_script()));
    let h = harness(transport.clone());

    let running = h.service.generate("editor", request()).await.unwrap();
    let snapshot = running.finish().await.unwrap();

    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.content, "OAuth is secure.");
    assert_eq!(snapshot.citations.numbers(), vec![1]);
    assert_eq!(snapshot.progress_status.as_deref(), Some("Retrieving sources..."));
    assert_eq!(snapshot.confidence, Some(0.92));
    assert_eq!(transport.last_request(), Some(request()));
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn test_error_after_partial_content() {
    let transport = Arc::new(ScriptedTransport::from_events(&[
        ProtocolEvent::token("Partial"),
        ProtocolEvent::error("LLM timeout", Some("Timeout")),
    ]));
    let h = harness(transport);

    let snapshot = h
        .service
        .generate("editor", request())
        .await
        .unwrap()
        .finish()
        .await
        .unwrap();

    assert_eq!(snapshot.status, SessionStatus::Errored);
    assert_eq!(snapshot.content, "Partial");
    let error = snapshot.error.unwrap();
    assert_eq!(error.kind, ErrorKind::Timeout);
    assert!(error.retry.is_some());
    assert!(!error.recovery.is_empty());
}

#[tokio::test]
async fn test_frames_split_across_reads() {
    let whole = ScriptedTransport::from_events(&oauth_script());
    let split = ScriptedTransport::from_events(&oauth_script()).rechunked(3);

    let a = harness(Arc::new(whole))
        .service
        .generate("s", request())
        .await
        .unwrap()
        .finish()
        .await
        .unwrap();
    let b = harness(Arc::new(split))
        .service
        .generate("s", request())
        .await
        .unwrap()
        .finish()
        .await
        .unwrap();

    assert_eq!(a.content, b.content);
    assert_eq!(a.citations, b.citations);
    assert_eq!(a.status, b.status);
}

#[tokio::test]
async fn test_malformed_frames_are_skipped() {
    let mut chunks: Vec<Vec<u8>> = vec![
        b"{\"type\":\"token\",\"content\":\"Kept\"}\n".to_vec(),
        b"{not json}\n".to_vec(),
        b"{\"type\":\"mystery\"}\n".to_vec(),
    ];
    chunks.push(b"{\"type\":\"done\"}\n".to_vec());
    let h = harness(Arc::new(ScriptedTransport::from_chunks(chunks)));

    let snapshot = h
        .service
        .generate("s", request())
        .await
        .unwrap()
        .finish()
        .await
        .unwrap();

    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.content, "Kept");
    assert_eq!(snapshot.anomaly_count, 2);
}

#[tokio::test]
async fn test_frames_after_done_in_same_read_are_logged() {
    let transport = ScriptedTransport::from_events(&[
        ProtocolEvent::token("A"),
        ProtocolEvent::done(None),
        ProtocolEvent::token("late"),
    ])
    .rechunked(4096);
    let h = harness(Arc::new(transport));

    let snapshot = h
        .service
        .generate("s", request())
        .await
        .unwrap()
        .finish()
        .await
        .unwrap();

    assert_eq!(snapshot.status, SessionStatus::Completed);
    assert_eq!(snapshot.content, "A");
    assert_eq!(snapshot.anomaly_count, 1);
}

#[tokio::test]
async fn test_transport_failure_keeps_partial_work() {
    let transport = ScriptedTransport::from_events(&[ProtocolEvent::token("So far")])
        .fail_after(TransportError::Read("reset by peer".into()));
    let h = harness(Arc::new(transport));

    let snapshot = h
        .service
        .generate("s", request())
        .await
        .unwrap()
        .finish()
        .await
        .unwrap();

    assert_eq!(snapshot.status, SessionStatus::Errored);
    assert_eq!(snapshot.content, "So far");
    assert_eq!(snapshot.error.unwrap().kind, ErrorKind::Unknown);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn test_cancel_before_any_event() {
    let transport = Arc::new(ChannelTransport::new());
    let sender = transport.connection().await;
    let h = harness(transport.clone());

    let running = h.service.generate("s", request()).await.unwrap();
    assert!(running.cancel.cancel());
    let snapshot = running.finish().await.unwrap();

    assert_eq!(snapshot.status, SessionStatus::Cancelled);
    assert_eq!(snapshot.content, "");
    assert!(snapshot.citations.is_empty());
    assert!(sender.is_closed());
}

#[tokio::test]
async fn test_cancel_twice_same_as_once() {
    let transport = Arc::new(ChannelTransport::new());
    let sender = transport.connection().await;
    let h = harness(transport.clone());

    let mut running = h.service.generate("s", request()).await.unwrap();
    sender.send(&ProtocolEvent::token("Draft ")).await;
    running
        .updates
        .wait_for(|s| s.fragment_count == 1)
        .await
        .unwrap();

    running.cancel.cancel();
    running.cancel.cancel_with(CancelReason::DeadlineExceeded);
    let snapshot = running.finish().await.unwrap();

    assert_eq!(snapshot.status, SessionStatus::Cancelled);
    assert_eq!(snapshot.cancel_reason, Some(CancelReason::User));
    assert_eq!(snapshot.content, "Draft ");
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn test_cancel_racing_done_has_one_winner() {
    let transport = Arc::new(ChannelTransport::new());
    let sender = transport.connection().await;
    let h = harness(transport.clone());

    let running = h.service.generate("s", request()).await.unwrap();
    sender.send(&ProtocolEvent::token("Body")).await;
    sender.send(&ProtocolEvent::done(None)).await;
    running.cancel.cancel();
    let snapshot = running.finish().await.unwrap();

    match snapshot.status {
        // Done was applied first; the cancel found an ended session
        SessionStatus::Completed => {
            assert_eq!(snapshot.content, "Body");
            assert_eq!(snapshot.cancel_reason, None);
        }
        // Cancel was applied first; done was never read
        SessionStatus::Cancelled => {
            assert_eq!(snapshot.cancel_reason, Some(CancelReason::User));
            assert_eq!(snapshot.content.is_empty(), snapshot.fragment_count == 0);
            if snapshot.fragment_count > 0 {
                assert_eq!(snapshot.content, "Body");
            }
        }
        other => panic!("unexpected status {other}"),
    }
    assert!(snapshot.error.is_none());
    assert_eq!(snapshot.anomaly_count, 0);
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test]
async fn test_deadline_reported_distinctly() {
    let transport = ScriptedTransport::from_events(&[ProtocolEvent::token("Slow start")]).hang_after();
    let mut config = EngineConfig::default();
    config.session.deadline_ms = Some(30);
    let h = harness(Arc::new(transport));
    let service = h.service.with_config(config);

    let snapshot = service
        .generate("s", request())
        .await
        .unwrap()
        .finish()
        .await
        .unwrap();

    assert_eq!(snapshot.status, SessionStatus::Cancelled);
    assert_eq!(snapshot.cancel_reason, Some(CancelReason::DeadlineExceeded));
    assert_eq!(snapshot.content, "Slow start");
}

#[tokio::test]
async fn test_request_deadline_overrides_config() {
    let transport = ScriptedTransport::from_events(&[]).hang_after();
    let h = harness(Arc::new(transport));

    let running = h
        .service
        .generate("s", request().with_deadline_ms(20))
        .await
        .unwrap();
    let snapshot = tokio::time::timeout(Duration::from_secs(5), running.finish())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(snapshot.cancel_reason, Some(CancelReason::DeadlineExceeded));
}

#[tokio::test]
async fn test_new_generation_supersedes_slot() {
    let transport = Arc::new(ChannelTransport::new());
    let first_sender = transport.connection().await;
    let second_sender = transport.connection().await;
    let h = harness(transport.clone());

    let first = h.service.generate("editor", request()).await.unwrap();
    first_sender.send(&ProtocolEvent::token("Old")).await;

    let second = h.service.generate("editor", request()).await.unwrap();
    let old = first.finish().await.unwrap();

    assert_eq!(old.status, SessionStatus::Cancelled);
    assert_eq!(old.cancel_reason, Some(CancelReason::Superseded));
    assert!(first_sender.is_closed());

    second_sender.send(&ProtocolEvent::token("New")).await;
    second_sender.send(&ProtocolEvent::done(None)).await;
    let new = second.finish().await.unwrap();
    assert_eq!(new.status, SessionStatus::Completed);
    assert_eq!(new.content, "New");
}

#[tokio::test]
async fn test_other_slots_are_independent() {
    let transport = Arc::new(ChannelTransport::new());
    let a_sender = transport.connection().await;
    let b_sender = transport.connection().await;
    let h = harness(transport.clone());

    let a = h.service.generate("a", request()).await.unwrap();
    let b = h.service.generate("b", request()).await.unwrap();

    assert!(h.service.cancel_slot("a").await);
    assert!(!h.service.cancel_slot("missing").await);
    assert_eq!(a.finish().await.unwrap().status, SessionStatus::Cancelled);

    b_sender.send(&ProtocolEvent::done(None)).await;
    assert_eq!(b.finish().await.unwrap().status, SessionStatus::Completed);
    drop(a_sender);
}

// =============================================================================
// Drafts, Review & Feedback
// =============================================================================

#[tokio::test]
async fn test_partial_save_after_cancel() {
    let transport = Arc::new(ChannelTransport::new());
    let sender = transport.connection().await;
    let h = harness(transport.clone());

    let mut running = h.service.generate("s", request()).await.unwrap();
    sender.send(&ProtocolEvent::token("Half [1]")).await;
    sender
        .send(&ProtocolEvent::Citation(Citation::new(1, "doc", "Doc")))
        .await;
    running
        .updates
        .wait_for(|s| s.citations.len() == 1)
        .await
        .unwrap();
    running.cancel.cancel();
    let snapshot = running.finish().await.unwrap();

    h.service.save_draft(&snapshot).await.unwrap();

    let drafts = h.drafts.drafts().await;
    assert_eq!(drafts.len(), 1);
    assert_eq!(drafts[0].1.status, DraftStatus::Partial);
    assert_eq!(drafts[0].1.content, "Half [1]");
    assert_eq!(drafts[0].1.citations.len(), 1);
}

#[tokio::test]
async fn test_review_and_export_completed_draft() {
    let transport = ScriptedTransport::from_events(&[
        ProtocolEvent::token("See [1] and [3]."),
        ProtocolEvent::Citation(Citation::new(1, "doc-a", "A")),
        ProtocolEvent::Citation(Citation::new(2, "doc-b", "B")),
        ProtocolEvent::done(Some(0.3)),
    ]);
    let h = harness(Arc::new(transport));

    let snapshot = h
        .service
        .generate("s", request())
        .await
        .unwrap()
        .finish()
        .await
        .unwrap();

    let mut report = h.service.review(&snapshot);
    let kinds: Vec<WarningKind> = report.all().iter().map(|w| w.kind).collect();
    assert_eq!(
        kinds,
        vec![
            WarningKind::OrphanedCitation,
            WarningKind::UnusedCitation,
            WarningKind::LowConfidence
        ]
    );
    assert_eq!(report.apply_auto_fixes(&snapshot.content), "See [1] and.");

    let verification = h
        .service
        .export_gate(&snapshot, &report, ExportFormat::Docx)
        .unwrap();
    assert_eq!(verification.citation_count, 2);
    assert_eq!(verification.document_count, 2);
    assert!(verification.requires_confirmation);

    for id in ["orphaned-3", "unused-2", "low-confidence"] {
        assert!(report.dismiss(id));
    }
    let verification = h
        .service
        .export_gate(&snapshot, &report, ExportFormat::Docx)
        .unwrap();
    assert!(!verification.requires_confirmation);
}

#[tokio::test]
async fn test_feedback_drives_recovery() {
    let h = harness(Arc::new(ScriptedTransport::from_events(&oauth_script())));

    let record = FeedbackRecord::with_comment(FeedbackType::NotRelevant, "Wrong product line")
        .unwrap()
        .related_to("session-1");
    let response = h.service.submit_feedback(record).await.unwrap();

    assert_eq!(response.alternatives[0].action, RecoveryAction::RefineSearchQuery);
    let recorded = h.feedback.records().await;
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].comment(), Some("Wrong product line"));
}
