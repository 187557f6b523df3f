//! File-backed generation transport.
//!
//! Replays a captured stream as if it arrived over the network, in fixed-size
//! reads with an optional delay between them.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use draft_session::{CloseHandle, Connection, GenerationRequest, GenerationTransport, TransportError};

/// Transport that reads its stream from a capture file.
#[derive(Debug, Clone)]
pub struct FileTransport {
    path: PathBuf,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl FileTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            chunk_size: 4096,
            chunk_delay: Duration::ZERO,
        }
    }

    /// Bytes per simulated read.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Pause between simulated reads.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }
}

#[async_trait]
impl GenerationTransport for FileTransport {
    async fn open(&self, request: &GenerationRequest) -> Result<Connection, TransportError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            TransportError::Connect(format!("{}: {}", self.path.display(), e))
        })?;

        info!(
            path = %self.path.display(),
            bytes = bytes.len(),
            template = %request.template_type,
            "Opened capture"
        );

        let chunks: Vec<Vec<u8>> = bytes.chunks(self.chunk_size).map(<[u8]>::to_vec).collect();
        let delay = self.chunk_delay;

        let frames = stream::iter(chunks)
            .then(move |chunk| async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok::<_, TransportError>(chunk)
            })
            .boxed();

        let path = self.path.clone();
        let close = CloseHandle::new(move || {
            debug!(path = %path.display(), "Capture closed");
        });

        Ok(Connection::new(frames, close))
    }
}
