//! Cancellation controller.
//!
//! A [`SessionActor`] owns one session on a single task and is the only code
//! that mutates it. Transport events, cancel commands and the optional
//! deadline are serialized through one `select!` loop, so a cancel racing a
//! terminal event resolves to whichever the actor applies first; the other is
//! discarded.
//!
//! ```text
//!  CancelHandle ──mpsc──┐
//!  deadline ────────────┼──▶ SessionActor ──watch──▶ SessionSnapshot
//!  Connection ──frames──┘        │
//!                                └──▶ CloseHandle (once)
//! ```

use futures::stream::BoxStream;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info};

use draft_protocol::{DecoderConfig, EventStream, TransportError};

use crate::collaborators::{CloseHandle, Connection};
use crate::config::EngineConfig;
use crate::session::{CancelOutcome, CancelReason, GenerationSession, SessionSnapshot};

/// Message recorded when the stream ends without a terminal event.
pub const STREAM_CLOSED_EARLY: &str = "stream closed before completion";

/// Requests cancellation of a running session. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    session_id: String,
    tx: mpsc::Sender<CancelReason>,
}

impl CancelHandle {
    /// Session this handle controls.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Cancel on behalf of the user.
    ///
    /// Returns whether the request reached a running actor. Cancelling an
    /// ended session does nothing.
    pub fn cancel(&self) -> bool {
        self.cancel_with(CancelReason::User)
    }

    /// Cancel with an explicit reason.
    pub fn cancel_with(&self, reason: CancelReason) -> bool {
        match self.tx.try_send(reason) {
            Ok(()) => true,
            // A cancel is already queued; the first one wins anyway
            Err(mpsc::error::TrySendError::Full(_)) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(session_id = %self.session_id, "Cancel ignored, session already ended");
                false
            }
        }
    }

    /// Whether the actor has stopped.
    pub fn is_finished(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Actor settings.
#[derive(Debug, Clone)]
pub struct ActorOptions {
    pub decoder: DecoderConfig,
    /// Cancel with `DeadlineExceeded` after this long
    pub deadline: Option<Duration>,
    pub command_buffer: usize,
}

impl ActorOptions {
    /// Options from engine config, with an optional per-request deadline
    /// override in milliseconds.
    pub fn from_config(config: &EngineConfig, deadline_ms: Option<u64>) -> Self {
        Self {
            decoder: config.decoder.clone(),
            deadline: deadline_ms
                .or(config.session.deadline_ms)
                .map(Duration::from_millis),
            command_buffer: config.session.command_buffer.max(1),
        }
    }
}

impl Default for ActorOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default(), None)
    }
}

type Frames = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// Single consumer of one generation stream.
pub struct SessionActor {
    session: GenerationSession,
    events: EventStream<Frames>,
    close: Option<CloseHandle>,
    commands: mpsc::Receiver<CancelReason>,
    updates: watch::Sender<SessionSnapshot>,
    deadline: Option<Duration>,
}

impl SessionActor {
    /// Bind a started session to its connection.
    ///
    /// Returns the actor, a cancel handle and a receiver that observes a new
    /// snapshot after every change.
    pub fn new(
        session: GenerationSession,
        connection: Connection,
        options: ActorOptions,
    ) -> (Self, CancelHandle, watch::Receiver<SessionSnapshot>) {
        let (tx, commands) = mpsc::channel(options.command_buffer.max(1));
        let (updates, snapshots) = watch::channel(session.snapshot());

        let handle = CancelHandle {
            session_id: session.id().to_string(),
            tx,
        };

        let actor = Self {
            session,
            events: EventStream::with_config(connection.frames, options.decoder),
            close: Some(connection.close),
            commands,
            updates,
            deadline: options.deadline,
        };

        (actor, handle, snapshots)
    }

    /// Run on a new task.
    pub fn spawn(self) -> JoinHandle<SessionSnapshot> {
        tokio::spawn(self.run())
    }

    /// Drive the session until it ends and return its final snapshot.
    pub async fn run(mut self) -> SessionSnapshot {
        let deadline = self.deadline.map(|d| Instant::now() + d);

        while self.session.status().is_active() {
            tokio::select! {
                biased;

                Some(reason) = self.commands.recv() => {
                    self.cancel(reason);
                }
                _ = deadline_elapsed(deadline) => {
                    info!(session_id = %self.session.id(), "Generation deadline exceeded");
                    self.cancel(CancelReason::DeadlineExceeded);
                }
                item = self.events.next() => match item {
                    Some(Ok(event)) => {
                        self.session.apply(event);
                    }
                    Some(Err(error)) => {
                        self.session.fail_transport(error.to_string());
                    }
                    None => {
                        self.session.fail_transport(STREAM_CLOSED_EARLY);
                    }
                },
            }

            self.absorb_decoder_anomalies();
            self.updates.send_replace(self.session.snapshot());
        }

        self.close_connection();

        // Frames that arrived in the same read as the terminal event
        for event in self.events.buffered_events() {
            self.session.apply(event);
        }
        self.absorb_decoder_anomalies();

        let frames = self.events.frames_decoded();
        let dropped = self.events.anomalies().total();
        debug!(
            session_id = %self.session.id(),
            status = %self.session.status(),
            frames,
            dropped,
            "Session actor finished"
        );

        let snapshot = self.session.snapshot();
        self.updates.send_replace(snapshot.clone());
        snapshot
    }

    fn absorb_decoder_anomalies(&mut self) {
        let anomalies = self.events.take_anomalies();
        self.session.absorb_anomalies(anomalies);
    }

    fn cancel(&mut self, reason: CancelReason) {
        if self.session.cancel(reason) == CancelOutcome::Cancelled {
            self.close_connection();
        }
    }

    fn close_connection(&mut self) {
        if let Some(close) = self.close.take() {
            debug!(session_id = %self.session.id(), "Closing connection");
            close.close();
        }
    }
}

async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::GenerationTransport;
    use crate::mock::{ChannelTransport, ScriptedTransport};
    use crate::classifier::ErrorKind;
    use crate::session::{GenerationRequest, SessionStatus};
    use draft_protocol::{Citation, ProtocolEvent};

    async fn actor_for(
        transport: &dyn GenerationTransport,
        options: ActorOptions,
    ) -> (SessionActor, CancelHandle, watch::Receiver<SessionSnapshot>) {
        let request = GenerationRequest::new("brief", "context");
        let mut session = GenerationSession::new();
        session.start(request.clone()).unwrap();
        let connection = transport.open(&request).await.unwrap();
        SessionActor::new(session, connection, options)
    }

    #[tokio::test]
    async fn test_runs_script_to_completion() {
        let transport = ScriptedTransport::from_events(&[
            ProtocolEvent::token("Hello [1]"),
            ProtocolEvent::Citation(Citation::new(1, "d", "D")),
            ProtocolEvent::done(Some(0.7)),
        ]);
        let (actor, handle, _rx) = actor_for(&transport, ActorOptions::default()).await;

        let snapshot = actor.run().await;
        assert_eq!(snapshot.status, SessionStatus::Completed);
        assert_eq!(snapshot.content, "Hello [1]");
        assert_eq!(transport.close_count(), 1);
        assert!(handle.is_finished());
        assert!(!handle.cancel());
    }

    #[tokio::test]
    async fn test_early_end_is_error() {
        let transport = ScriptedTransport::from_events(&[ProtocolEvent::token("Partial")]);
        let (actor, _handle, _rx) = actor_for(&transport, ActorOptions::default()).await;

        let snapshot = actor.run().await;
        assert_eq!(snapshot.status, SessionStatus::Errored);
        assert_eq!(snapshot.error.unwrap().message, STREAM_CLOSED_EARLY);
        assert_eq!(snapshot.content, "Partial");
    }

    #[tokio::test]
    async fn test_transport_error_is_error() {
        let transport = ScriptedTransport::from_events(&[ProtocolEvent::token("Partial")])
            .fail_after(TransportError::Read("connection reset".into()));
        let (actor, _handle, _rx) = actor_for(&transport, ActorOptions::default()).await;

        let snapshot = actor.run().await;
        assert_eq!(snapshot.status, SessionStatus::Errored);
        assert!(snapshot.error.unwrap().message.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_transport_error_kind_is_unknown() {
        let transport = ScriptedTransport::from_events(&[ProtocolEvent::token("Partial")])
            .fail_after(TransportError::Read("KB document not found on proxy".into()));
        let (actor, _handle, _rx) = actor_for(&transport, ActorOptions::default()).await;

        let error = actor.run().await.error.unwrap();
        assert_eq!(error.kind, ErrorKind::Unknown);
        assert!(error.message.contains("not found"));
    }

    #[tokio::test]
    async fn test_decoder_anomalies_reach_snapshot() {
        let mut chunks = vec![ProtocolEvent::token("Body").to_frame().unwrap().into_bytes()];
        chunks.push(b"{not json}\n".to_vec());
        chunks.push(b"{\"type\":\"mystery\"}\n".to_vec());
        chunks.push(ProtocolEvent::done(None).to_frame().unwrap().into_bytes());
        let transport = ScriptedTransport::from_chunks(chunks);
        let (actor, _handle, rx) = actor_for(&transport, ActorOptions::default()).await;

        let snapshot = actor.run().await;
        assert_eq!(snapshot.status, SessionStatus::Completed);
        assert_eq!(snapshot.content, "Body");
        assert_eq!(snapshot.anomaly_count, 2);
        assert_eq!(rx.borrow().anomaly_count, 2);
    }

    #[tokio::test]
    async fn test_frames_behind_done_are_late() {
        let transport = ScriptedTransport::from_events(&[
            ProtocolEvent::token("A"),
            ProtocolEvent::done(None),
            ProtocolEvent::token("late"),
        ])
        .rechunked(4096)
        .hang_after();
        let (actor, _handle, rx) = actor_for(&transport, ActorOptions::default()).await;

        let snapshot = actor.run().await;
        assert_eq!(snapshot.status, SessionStatus::Completed);
        assert_eq!(snapshot.content, "A");
        assert_eq!(snapshot.anomaly_count, 1);
        assert_eq!(rx.borrow().anomaly_count, 1);
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_closes_once() {
        let transport = ChannelTransport::new();
        let sender = transport.connection().await;
        let (actor, handle, mut rx) = actor_for(&transport, ActorOptions::default()).await;
        let task = actor.spawn();

        sender.send(&ProtocolEvent::token("Some text")).await;
        rx.wait_for(|s| s.content == "Some text").await.unwrap();

        assert!(handle.cancel());
        let snapshot = task.await.unwrap();

        assert_eq!(snapshot.status, SessionStatus::Cancelled);
        assert_eq!(snapshot.cancel_reason, Some(CancelReason::User));
        assert_eq!(snapshot.content, "Some text");
        assert_eq!(transport.close_count(), 1);
        assert!(sender.is_closed());

        // Late frames and cancels change nothing
        sender.send(&ProtocolEvent::done(None)).await;
        assert!(!handle.cancel());
        assert_eq!(transport.close_count(), 1);
    }

    #[tokio::test]
    async fn test_deadline_cancels() {
        let transport = ScriptedTransport::from_events(&[ProtocolEvent::token("Slow")]).hang_after();
        let options = ActorOptions {
            deadline: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let (actor, _handle, _rx) = actor_for(&transport, options).await;

        let snapshot = actor.run().await;
        assert_eq!(snapshot.status, SessionStatus::Cancelled);
        assert_eq!(snapshot.cancel_reason, Some(CancelReason::DeadlineExceeded));
        assert_eq!(snapshot.content, "Slow");
        assert_eq!(transport.close_count(), 1);
    }

    #[test]
    fn test_cancel_queued_before_run() {
        tokio_test::block_on(async {
            let transport = ScriptedTransport::from_events(&[ProtocolEvent::token("x")]).hang_after();
            let (actor, handle, rx) = actor_for(&transport, ActorOptions::default()).await;

            assert!(handle.cancel_with(CancelReason::Superseded));
            let snapshot = actor.run().await;

            assert_eq!(snapshot.cancel_reason, Some(CancelReason::Superseded));
            assert_eq!(snapshot.content, "");
            assert_eq!(rx.borrow().status, SessionStatus::Cancelled);
        });
    }

    #[test]
    fn test_options_deadline_override() {
        let mut config = EngineConfig::default();
        config.session.deadline_ms = Some(5_000);

        assert_eq!(
            ActorOptions::from_config(&config, None).deadline,
            Some(Duration::from_millis(5_000))
        );
        assert_eq!(
            ActorOptions::from_config(&config, Some(100)).deadline,
            Some(Duration::from_millis(100))
        );
    }
}
