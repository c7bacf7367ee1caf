use std::marker::PhantomData;

use snafu::Snafu;

use crate::block::Block;
use crate::encodable::Encodable;
use crate::typecode::typecode_hash;

#[derive(Debug, Snafu)]
pub enum ReaderError<T: Encodable> {
    #[snafu(display(
        "typecode mismatch: block was written for a different item type (expected {expected:x}, got {got:x})"
    ))]
    TypecodeMismatch { expected: u64, got: u64 },

    #[snafu(display("first block fed to a fresh reader has no item start in it"))]
    NoItemStart,

    #[snafu(display("failed to decode item: {source}"))]
    Decode { source: T::DecodeError },

    #[snafu(display("stream ended with {trailing} undecoded trailing bytes"))]
    TrailingBytes { trailing: usize },
}

/// Reconstructs items of type `T` from a sequence of [`Block`]s, the inverse
/// of [`crate::BlockWriter`].
///
/// Concatenates block bytes into a running buffer and decodes
/// length-prefixed records out of it as they become complete, so an item
/// that was split across a block boundary at write time is transparently
/// reassembled. A freshly-constructed reader uses the first fed block's
/// `first_item_offset` to skip past any continuation bytes belonging to an
/// item it never saw the start of.
pub struct BlockReader<T: Encodable> {
    pending: Vec<u8>,
    started: bool,
    typecode_hash: u64,
    _marker: PhantomData<T>,
}

impl<T: Encodable> BlockReader<T> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            started: false,
            typecode_hash: typecode_hash::<T>(),
            _marker: PhantomData,
        }
    }

    /// Feeds one block's bytes into the reassembly buffer.
    #[instrument(skip(self, block), level = "trace")]
    pub fn feed(&mut self, block: &Block) -> Result<(), ReaderError<T>> {
        if block.typecode_hash() != self.typecode_hash {
            return Err(ReaderError::TypecodeMismatch {
                expected: self.typecode_hash,
                got: block.typecode_hash(),
            });
        }

        let bytes = block.as_slice();
        if !self.started {
            let offset = block.first_item_offset().ok_or(ReaderError::NoItemStart)? as usize;
            self.pending.extend_from_slice(&bytes[offset..]);
            self.started = true;
        } else {
            self.pending.extend_from_slice(bytes);
        }
        Ok(())
    }

    /// Decodes and removes the next complete item, if one is fully buffered.
    pub fn try_next(&mut self) -> Result<Option<T>, ReaderError<T>> {
        if self.pending.len() < 4 {
            return Ok(None);
        }
        let len = u32::from_be_bytes(self.pending[0..4].try_into().unwrap()) as usize;
        if self.pending.len() < 4 + len {
            return Ok(None);
        }

        let record: Vec<u8> = self.pending.drain(0..4 + len).collect();
        let payload = &record[4..];
        let item = T::decode(payload).map_err(|source| ReaderError::Decode { source })?;
        Ok(Some(item))
    }

    /// Drains every item fully buffered so far, in order.
    pub fn drain_ready(&mut self) -> Result<Vec<T>, ReaderError<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.try_next()? {
            items.push(item);
        }
        Ok(items)
    }

    /// Asserts the reassembly buffer is empty, i.e. every byte fed in has
    /// been consumed into a complete item. Call after the sender's last
    /// block to catch a truncated stream.
    pub fn finish(self) -> Result<(), ReaderError<T>> {
        if self.pending.is_empty() {
            Ok(())
        } else {
            Err(ReaderError::TrailingBytes {
                trailing: self.pending.len(),
            })
        }
    }
}

impl<T: Encodable> Default for BlockReader<T> {
    fn default() -> Self {
        Self::new()
    }
}
