//! Async adapter from transport byte chunks to protocol events.

use futures::Stream;
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::anomaly::{AnomalyLog, ProtocolAnomaly};
use crate::event::ProtocolEvent;
use crate::parser::{DecoderConfig, FrameDecoder};

/// Error raised by the underlying transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be opened
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Reading from an open connection failed
    #[error("Transport read failed: {0}")]
    Read(String),

    /// Connection was closed by the peer
    #[error("Connection closed")]
    Closed,
}

pin_project! {
    /// Stream of protocol events decoded from one connection.
    ///
    /// Yields each decoded event in source order, at most one transport error,
    /// and then ends. One instance per connection.
    pub struct EventStream<S> {
        #[pin]
        inner: S,
        decoder: FrameDecoder,
        // Inner stream ended or failed
        done: bool,
    }
}

impl<S> EventStream<S> {
    /// Wrap a byte-chunk stream with default decoder settings.
    pub fn new(inner: S) -> Self {
        Self::with_config(inner, DecoderConfig::default())
    }

    /// Wrap a byte-chunk stream.
    pub fn with_config(inner: S, config: DecoderConfig) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::with_config(config),
            done: false,
        }
    }

    /// Anomalies seen so far on this connection.
    pub fn anomalies(&self) -> &AnomalyLog {
        self.decoder.anomalies()
    }

    /// Number of frames decoded so far.
    pub fn frames_decoded(&self) -> u64 {
        self.decoder.frames_decoded()
    }

    /// Move anomalies recorded since the last call out of the decoder.
    pub fn take_anomalies(&mut self) -> Vec<ProtocolAnomaly> {
        self.decoder.take_anomalies()
    }

    /// Events already decodable from received bytes, without polling the
    /// transport.
    pub fn buffered_events(&mut self) -> Vec<ProtocolEvent> {
        self.decoder.events().collect()
    }

    /// Whether the underlying transport has ended.
    pub fn is_done(&self) -> bool {
        self.done
    }
}

impl<S, B> Stream for EventStream<S>
where
    S: Stream<Item = Result<B, TransportError>>,
    B: AsRef<[u8]>,
{
    type Item = Result<ProtocolEvent, TransportError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(event) = this.decoder.next_event() {
                return Poll::Ready(Some(Ok(event)));
            }

            if *this.done {
                return Poll::Ready(None);
            }

            match this.inner.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    this.decoder.feed(chunk.as_ref());
                }
                Poll::Ready(Some(Err(e))) => {
                    // A partial frame at this point is truncated; do not flush it
                    *this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.decoder.finish();
                    *this.done = true;
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
