//! In-memory collaborators for tests and offline replay.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_stream::wrappers::ReceiverStream;

use draft_protocol::ProtocolEvent;

use crate::collaborators::{
    CloseHandle, CollaboratorError, Connection, DraftId, DraftPayload, DraftStore, FeedbackAck,
    FeedbackSink, GenerationTransport, TransportError,
};
use crate::feedback::FeedbackRecord;
use crate::session::GenerationRequest;

type Frames = BoxStream<'static, Result<Vec<u8>, TransportError>>;

/// How a scripted stream behaves after its last chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ScriptEnd {
    /// Stream ends
    Close,
    /// Stream stays open without further data
    Hang,
    /// Stream yields a transport error
    Fail(TransportError),
}

/// Transport that replays the same byte script on every open.
#[derive(Debug)]
pub struct ScriptedTransport {
    chunks: Vec<Vec<u8>>,
    end: ScriptEnd,
    open_error: Option<TransportError>,
    opened: AtomicUsize,
    closed: Arc<AtomicUsize>,
    last_request: std::sync::Mutex<Option<GenerationRequest>>,
}

impl ScriptedTransport {
    /// Replay raw chunks as given.
    pub fn from_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            end: ScriptEnd::Close,
            open_error: None,
            opened: AtomicUsize::new(0),
            closed: Arc::new(AtomicUsize::new(0)),
            last_request: std::sync::Mutex::new(None),
        }
    }

    /// Replay events, one frame per chunk.
    pub fn from_events(events: &[ProtocolEvent]) -> Self {
        let chunks = events
            .iter()
            .filter_map(|event| event.to_frame().ok())
            .map(String::into_bytes)
            .collect();
        Self::from_chunks(chunks)
    }

    /// Re-split the script into chunks of `size` bytes, ignoring frame
    /// boundaries.
    pub fn rechunked(mut self, size: usize) -> Self {
        let bytes: Vec<u8> = self.chunks.concat();
        self.chunks = bytes.chunks(size.max(1)).map(<[u8]>::to_vec).collect();
        self
    }

    /// Keep the stream open after the last chunk.
    pub fn hang_after(mut self) -> Self {
        self.end = ScriptEnd::Hang;
        self
    }

    /// Fail the stream after the last chunk.
    pub fn fail_after(mut self, error: TransportError) -> Self {
        self.end = ScriptEnd::Fail(error);
        self
    }

    /// Refuse every open.
    pub fn fail_open(mut self, error: TransportError) -> Self {
        self.open_error = Some(error);
        self
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of connections closed through their close handle.
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Request passed to the latest open.
    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl GenerationTransport for ScriptedTransport {
    async fn open(&self, request: &GenerationRequest) -> Result<Connection, TransportError> {
        if let Some(error) = &self.open_error {
            return Err(error.clone());
        }

        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }
        self.opened.fetch_add(1, Ordering::SeqCst);

        let body = stream::iter(self.chunks.clone().into_iter().map(Ok));
        let frames: Frames = match self.end.clone() {
            ScriptEnd::Close => body.boxed(),
            ScriptEnd::Hang => body.chain(stream::pending()).boxed(),
            ScriptEnd::Fail(error) => body.chain(stream::once(async move { Err(error) })).boxed(),
        };

        let closed = self.closed.clone();
        let close = CloseHandle::new(move || {
            closed.fetch_add(1, Ordering::SeqCst);
        });

        Ok(Connection::new(frames, close))
    }
}

/// Feeds one connection opened through a [`ChannelTransport`].
#[derive(Debug, Clone)]
pub struct FrameSender {
    tx: mpsc::Sender<Result<Vec<u8>, TransportError>>,
    closed: Arc<AtomicBool>,
}

impl FrameSender {
    /// Send raw bytes. Returns false once the reader is gone.
    pub async fn send_bytes(&self, bytes: impl Into<Vec<u8>>) -> bool {
        self.tx.send(Ok(bytes.into())).await.is_ok()
    }

    /// Send one event as a frame.
    pub async fn send(&self, event: &ProtocolEvent) -> bool {
        match event.to_frame() {
            Ok(frame) => self.send_bytes(frame).await,
            Err(_) => false,
        }
    }

    /// Fail the connection.
    pub async fn fail(&self, error: TransportError) -> bool {
        self.tx.send(Err(error)).await.is_ok()
    }

    /// Whether the connection's close handle has run.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Transport driven live by the test through [`FrameSender`]s.
///
/// Each open consumes the next connection queued with
/// [`ChannelTransport::connection`]; dropping every sender ends the stream.
#[derive(Debug, Default)]
pub struct ChannelTransport {
    queued: Mutex<VecDeque<Connection>>,
    closed: Arc<AtomicUsize>,
}

impl ChannelTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a connection for the next open and return its sender.
    pub async fn connection(&self) -> FrameSender {
        let (tx, rx) = mpsc::channel(64);
        let flag = Arc::new(AtomicBool::new(false));

        let closed = self.closed.clone();
        let on_close = flag.clone();
        let close = CloseHandle::new(move || {
            on_close.store(true, Ordering::SeqCst);
            closed.fetch_add(1, Ordering::SeqCst);
        });

        let frames: Frames = ReceiverStream::new(rx).boxed();
        self.queued.lock().await.push_back(Connection::new(frames, close));

        FrameSender { tx, closed: flag }
    }

    /// Number of connections closed through their close handle.
    pub fn close_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationTransport for ChannelTransport {
    async fn open(&self, _request: &GenerationRequest) -> Result<Connection, TransportError> {
        self.queued
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| TransportError::Connect("no connection queued".to_string()))
    }
}

/// Draft store that keeps everything in memory.
#[derive(Debug)]
pub struct InMemoryDraftStore {
    drafts: RwLock<Vec<(DraftId, DraftPayload)>>,
    available: AtomicBool,
}

impl InMemoryDraftStore {
    pub fn new() -> Self {
        Self {
            drafts: RwLock::new(Vec::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Make every save fail.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Saved drafts, oldest first.
    pub async fn drafts(&self) -> Vec<(DraftId, DraftPayload)> {
        self.drafts.read().await.clone()
    }
}

impl Default for InMemoryDraftStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DraftStore for InMemoryDraftStore {
    async fn save(&self, draft: DraftPayload) -> Result<DraftId, CollaboratorError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(CollaboratorError::Unavailable("draft store disabled".to_string()));
        }

        let id = DraftId(uuid::Uuid::new_v4().to_string());
        self.drafts.write().await.push((id.clone(), draft));
        Ok(id)
    }
}

/// Feedback sink that records submissions.
#[derive(Debug, Default)]
pub struct RecordingFeedbackSink {
    records: RwLock<Vec<FeedbackRecord>>,
}

impl RecordingFeedbackSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submitted records, oldest first.
    pub async fn records(&self) -> Vec<FeedbackRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl FeedbackSink for RecordingFeedbackSink {
    async fn submit(&self, record: &FeedbackRecord) -> Result<FeedbackAck, CollaboratorError> {
        self.records.write().await.push(record.clone());
        Ok(FeedbackAck {
            feedback_id: uuid::Uuid::new_v4().to_string(),
            received_at: Utc::now(),
        })
    }
}
