//! Tracepipe Protocol - Core wire types for the delivery pipeline
//!
//! This crate provides the foundational types that flow through the pipeline:
//! - `SequencedRecord` - One serialized event plus its sequence number
//! - `FrameKind` / sentinel constants - In-band control frame detection
//! - `Batch` / `BatchBuilder` - Ordered record collections between sentinels
//!
//! # Design Principles
//!
//! - **Opaque payloads**: the pipeline never interprets event contents; the
//!   only inspection performed on a frame is sentinel classification
//! - **Zero-copy**: payloads use `bytes::Bytes` for reference-counted sharing
//! - **Sentinel safety**: sentinel frames are exactly 4 bytes while every
//!   encoded record carries an 8-byte sequence header, so no record can ever
//!   be mistaken for a control frame

mod batch;
mod error;
mod record;
mod sentinel;

pub use batch::{Batch, BatchBuilder};
pub use error::ProtocolError;
pub use record::{SequencedRecord, RECORD_HEADER_LEN};
pub use sentinel::{classify, FrameKind, BATCH_MARK, SENTINEL_LEN, STREAM_END};

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

// Test modules - only compiled during testing
#[cfg(test)]
mod batch_test;
