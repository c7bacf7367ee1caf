use std::error;

use bytes::{Buf, BufMut};
use snafu::Snafu;

/// An item that can serialize itself into, and parse itself back out of, a
/// flat byte buffer.
///
/// Adapted from `vector_buffers::encoding::FixedEncodable`: we drop that
/// trait's schema-versioning `Metadata` associated type, since a substream's
/// item type is fixed for the stream's whole lifetime (there is no
/// schema-evolution concern for a single DAG run), and keep only the encode
/// and decode halves.
pub trait Encodable: Sized {
    type EncodeError: error::Error + Send + Sync + 'static;
    type DecodeError: error::Error + Send + Sync + 'static;

    /// Serializes `self` into `buffer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented.
    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<(), Self::EncodeError>;

    /// Parses a value out of exactly `buffer`'s remaining bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if `buffer` does not hold a valid encoding of `Self`.
    fn decode<B: Buf>(buffer: B) -> Result<Self, Self::DecodeError>;
}

#[derive(Debug, Snafu)]
pub struct FrameError {
    pub(crate) reason: String,
}

impl Encodable for u64 {
    type EncodeError = std::convert::Infallible;
    type DecodeError = FrameError;

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<(), Self::EncodeError> {
        buffer.put_u64(*self);
        Ok(())
    }

    fn decode<B: Buf>(mut buffer: B) -> Result<Self, Self::DecodeError> {
        if buffer.remaining() < 8 {
            return Err(FrameError {
                reason: format!("expected 8 bytes for u64, got {}", buffer.remaining()),
            });
        }
        Ok(buffer.get_u64())
    }
}

impl Encodable for Vec<u8> {
    type EncodeError = std::convert::Infallible;
    type DecodeError = std::convert::Infallible;

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<(), Self::EncodeError> {
        buffer.put_slice(self);
        Ok(())
    }

    fn decode<B: Buf>(mut buffer: B) -> Result<Self, Self::DecodeError> {
        let mut out = vec![0u8; buffer.remaining()];
        buffer.copy_to_slice(&mut out);
        Ok(out)
    }
}

impl Encodable for String {
    type EncodeError = std::convert::Infallible;
    type DecodeError = FrameError;

    fn encode<B: BufMut>(&self, buffer: &mut B) -> Result<(), Self::EncodeError> {
        buffer.put_slice(self.as_bytes());
        Ok(())
    }

    fn decode<B: Buf>(mut buffer: B) -> Result<Self, Self::DecodeError> {
        let mut out = vec![0u8; buffer.remaining()];
        buffer.copy_to_slice(&mut out);
        String::from_utf8(out).map_err(|source| FrameError {
            reason: format!("invalid utf-8 in decoded string: {source}"),
        })
    }
}
