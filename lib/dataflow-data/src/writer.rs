use std::marker::PhantomData;

use bytes::BufMut;
use dataflow_block_pool::{BlockPool, PoolError};
use dataflow_common::LocalWorkerId;
use snafu::Snafu;

use crate::block::Block;
use crate::encodable::Encodable;
use crate::sink::BlockSink;
use crate::typecode::typecode_hash;

#[derive(Debug, Snafu)]
pub enum WriterError<T: Encodable, S: BlockSink> {
    #[snafu(display("failed to encode item: {source}"))]
    Encode { source: T::EncodeError },

    #[snafu(display("block pool error: {source}"))]
    Pool { source: PoolError },

    #[snafu(display("block sink error: {source}"))]
    Sink { source: S::Error },

    #[snafu(display("put() called on a writer that has already been closed"))]
    Closed,
}

/// Serializes items of a single fixed type into a logical byte stream,
/// chunked into fixed-capacity [`Block`]s and handed off to a [`BlockSink`]
/// as each one fills.
///
/// Grounded on `vector_buffers::disk_v2::writer::RecordWriter`'s
/// length-prefix-then-serialize shape, generalized so a record's bytes may
/// be split across two (or more) sealed blocks rather than always fitting
/// whole within one write (§4.2 of the design).
pub struct BlockWriter<T: Encodable, S: BlockSink> {
    pool: BlockPool,
    worker: LocalWorkerId,
    block_size: usize,
    sink: Option<S>,
    staging: Vec<u8>,
    first_item_offset: Option<u32>,
    num_items: u32,
    typecode_hash: u64,
    closed: bool,
    _marker: PhantomData<T>,
}

impl<T: Encodable, S: BlockSink> BlockWriter<T, S> {
    pub fn new(pool: BlockPool, worker: LocalWorkerId, block_size: usize, sink: S) -> Self {
        assert!(block_size > 4, "block size must be large enough to hold a length prefix");
        Self {
            pool,
            worker,
            block_size,
            sink: Some(sink),
            staging: Vec::with_capacity(block_size),
            first_item_offset: None,
            num_items: 0,
            typecode_hash: typecode_hash::<T>(),
            closed: false,
            _marker: PhantomData,
        }
    }

    pub fn sink(&self) -> &S {
        self.sink.as_ref().expect("sink already taken via into_sink()")
    }

    /// Closes the writer (if not already) and returns the sink, consuming
    /// the writer. Useful in tests and in single-process wiring where the
    /// sink's contents (e.g. [`crate::VecBlockSink`]) are read back directly.
    pub async fn into_sink(mut self) -> Result<S, WriterError<T, S>> {
        self.close().await?;
        Ok(self.sink.take().expect("sink already taken via into_sink()"))
    }

    /// Appends one item to the stream, sealing and handing off as many
    /// blocks as needed to make room for it.
    #[instrument(skip(self, item), level = "trace")]
    pub async fn put(&mut self, item: &T) -> Result<(), WriterError<T, S>> {
        if self.closed {
            return Err(WriterError::Closed);
        }

        let mut record = Vec::new();
        record.put_u32(0);
        item.encode(&mut record)
            .map_err(|source| WriterError::Encode { source })?;
        let payload_len = (record.len() - 4) as u32;
        record[0..4].copy_from_slice(&payload_len.to_be_bytes());

        self.append_record(&record).await
    }

    async fn append_record(&mut self, mut data: &[u8]) -> Result<(), WriterError<T, S>> {
        let mut item_start = true;
        while !data.is_empty() {
            if self.staging.len() == self.block_size {
                self.seal_block().await?;
            }
            if item_start {
                if self.first_item_offset.is_none() {
                    self.first_item_offset = Some(self.staging.len() as u32);
                }
                self.num_items += 1;
                item_start = false;
            }
            let capacity = self.block_size - self.staging.len();
            let take = capacity.min(data.len());
            self.staging.extend_from_slice(&data[..take]);
            data = &data[take..];
        }
        Ok(())
    }

    async fn seal_block(&mut self) -> Result<(), WriterError<T, S>> {
        if self.staging.is_empty() {
            return Ok(());
        }
        let bytes = std::mem::replace(&mut self.staging, Vec::with_capacity(self.block_size));
        let pinned = self
            .pool
            .allocate_filled_byte_block(bytes, self.worker)
            .await
            .map_err(|source| WriterError::Pool { source })?;
        let block = Block::from_parts(
            pinned,
            self.first_item_offset.take(),
            std::mem::take(&mut self.num_items),
            self.typecode_hash,
        );
        debug!(len = block.len(), num_items = block.num_items(), "sealed block");
        self.sink
            .as_mut()
            .expect("sink already taken via into_sink()")
            .accept(block)
            .await
            .map_err(|source| WriterError::Sink { source })
    }

    /// Seals any partially-filled block and signals end of stream. Calling
    /// `put` after `close` returns [`WriterError::Closed`].
    pub async fn close(&mut self) -> Result<(), WriterError<T, S>> {
        if self.closed {
            return Ok(());
        }
        self.seal_block().await?;
        self.closed = true;
        self.sink
            .as_mut()
            .expect("sink already taken via into_sink()")
            .close()
            .await
            .map_err(|source| WriterError::Sink { source })
    }
}

impl<T: Encodable, S: BlockSink> Drop for BlockWriter<T, S> {
    fn drop(&mut self) {
        if !self.closed && !self.staging.is_empty() {
            warn!("block writer dropped with unsealed bytes still staged; call close() to flush");
        }
    }
}
