//! Protocol error types

use thiserror::Error;

/// Errors raised by the record codec
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Frame shorter than the record header (and not a sentinel)
    #[error("frame too short for a record: {len} bytes")]
    FrameTooShort { len: usize },
}
