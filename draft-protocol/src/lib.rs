//! Draft Protocol - Streaming Generation Wire Protocol
//!
//! Provides the leaf layer of grounded draft generation:
//! - Typed protocol events decoded from newline-delimited JSON frames
//! - An incremental frame decoder that tolerates split and malformed frames
//! - An async event stream over any byte-chunk transport
//! - The citation ledger and `[n]` marker consistency checks
//!
//! # Architecture
//!
//! ```text
//! transport bytes ──▶ FrameDecoder ──▶ ProtocolEvent ──▶ (session state machine)
//!                          │                  │
//!                          ▼                  ▼
//!                     AnomalyLog        CitationLedger ──▶ CitationWarning
//! ```

pub mod anomaly;
pub mod citation;
pub mod event;
pub mod ledger;
pub mod markers;
pub mod parser;
pub mod stream;

// Re-export main types for convenience
pub use anomaly::{AnomalyLog, ProtocolAnomaly};
pub use citation::Citation;
pub use event::ProtocolEvent;
pub use ledger::{CitationLedger, CitationWarning, LedgerSummary};
pub use parser::{DecoderConfig, FrameDecoder};
pub use stream::{EventStream, TransportError};
