//! SequencedRecord - one serialized event with its queue sequence number
//!
//! The codec assigns nothing itself: the caller (the producer handle) hands
//! every record a monotonically increasing sequence number. The wire form is
//! `[u64 BE sequence][payload bytes]`, so an encoded record is always at
//! least [`RECORD_HEADER_LEN`] bytes long - the property that makes 4-byte
//! sentinel frames unambiguous.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::ProtocolError;
use crate::Result;

/// Length of the sequence-number header in an encoded record
pub const RECORD_HEADER_LEN: usize = 8;

/// One serialized event plus its pipeline sequence number
///
/// The payload is opaque to the pipeline; only the concrete event codec
/// upstream knows its layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencedRecord {
    /// Monotonically increasing sequence number, assigned by the producer
    sequence: u64,

    /// Opaque serialized event bytes - zero-copy via Bytes
    payload: Bytes,
}

impl SequencedRecord {
    /// Create a record from a sequence number and an opaque payload
    pub fn new(sequence: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            payload: payload.into(),
        }
    }

    /// Get the sequence number
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Get the payload bytes
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the record, returning the payload
    #[inline]
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Length of the encoded frame in bytes
    #[inline]
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_LEN + self.payload.len()
    }

    /// Encode to the wire form `[u64 BE sequence][payload]`
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u64(self.sequence);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Decode a frame produced by [`encode`](Self::encode)
    ///
    /// Fails on frames shorter than the sequence header. Sentinel frames are
    /// 4 bytes and must be filtered out with [`classify`](crate::classify)
    /// before decoding.
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < RECORD_HEADER_LEN {
            return Err(ProtocolError::FrameTooShort { len: frame.len() });
        }

        let sequence = u64::from_be_bytes(frame[..RECORD_HEADER_LEN].try_into().expect("8 bytes"));
        Ok(Self {
            sequence,
            payload: Bytes::copy_from_slice(&frame[RECORD_HEADER_LEN..]),
        })
    }
}
