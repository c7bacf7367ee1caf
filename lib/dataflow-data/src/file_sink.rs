use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Buf, BufMut};
use snafu::Snafu;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};

use dataflow_profiler::{DiaId, FileEvent, ProfileRecorder};

use crate::block::Block;
use crate::sink::BlockSink;

/// Identifies the materialized file a [`FileBlockSink`] reports `File`
/// profile events under. Carried separately from the sink's own `path`
/// because the profile log correlates files by `(id, dia_id)`, not by
/// filesystem path (§6).
#[derive(Clone)]
pub struct FileProfile {
    pub recorder: Arc<ProfileRecorder>,
    pub id: u64,
    pub dia_id: DiaId,
}

/// Sentinel stored on disk for "no item begins in this block", matching the
/// wire frame's `NO_ITEM_START` (§6).
const NO_ITEM_START: u32 = u32::MAX;

/// `size(4) + num_items(4) + first_item(4) + typecode_verify(8)`: the
/// materialized-file header is the wire [`crate::Block`] header minus the
/// `sender_worker`/`recv_worker` fields, which have no meaning once a block
/// is local rather than in flight (§6 "Materialized file layout").
const FILE_HEADER_LEN: usize = 4 + 4 + 4 + 8;

#[derive(Debug, Snafu)]
pub enum FileSinkError {
    #[snafu(display("materialized file I/O error: {source}"))]
    Io { source: std::io::Error },

    #[snafu(display("put() on a materialized file sink that has already been closed"))]
    Closed,
}

impl From<std::io::Error> for FileSinkError {
    fn from(source: std::io::Error) -> Self {
        FileSinkError::Io { source }
    }
}

/// A [`BlockSink`] that appends every sealed block, back to back, to a file —
/// the materialization path a `DOp` writes its output through (§3, §4.2).
/// Append-only and sealed at `close()`, matching a `ByteBlock`'s own
/// allocate-once-write-once-read-many lifecycle.
pub struct FileBlockSink {
    file: BufWriter<File>,
    closed: bool,
    bytes_written: u64,
    blocks_written: u64,
    profile: Option<FileProfile>,
}

impl FileBlockSink {
    pub async fn create(path: impl AsRef<std::path::Path>) -> Result<Self, FileSinkError> {
        Self::create_with_profile(path, None).await
    }

    /// Same as [`Self::create`], additionally emitting `File` profile events
    /// (create now, close with final item/byte totals) under `profile`.
    pub async fn create_with_profile(
        path: impl AsRef<std::path::Path>,
        profile: Option<FileProfile>,
    ) -> Result<Self, FileSinkError> {
        let file = File::create(path).await?;
        if let Some(p) = &profile {
            p.recorder.record_file(FileEvent::Create, p.id, p.dia_id, 0, 0);
        }
        Ok(Self {
            file: BufWriter::new(file),
            closed: false,
            bytes_written: 0,
            blocks_written: 0,
            profile,
        })
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }
}

#[async_trait]
impl BlockSink for FileBlockSink {
    type Error = FileSinkError;

    async fn accept(&mut self, block: Block) -> Result<(), Self::Error> {
        if self.closed {
            return Err(FileSinkError::Closed);
        }
        let mut header = Vec::with_capacity(FILE_HEADER_LEN);
        header.put_u32(block.len() as u32);
        header.put_u32(block.num_items());
        header.put_u32(block.first_item_offset().unwrap_or(NO_ITEM_START));
        header.put_u64(block.typecode_hash());
        self.file.write_all(&header).await?;
        self.file.write_all(block.as_slice()).await?;
        self.bytes_written += (header.len() + block.len()) as u64;
        self.blocks_written += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        if self.closed {
            return Ok(());
        }
        self.file.flush().await?;
        self.closed = true;
        if let Some(p) = &self.profile {
            p.recorder
                .record_file(FileEvent::Close, p.id, p.dia_id, self.blocks_written, self.bytes_written);
        }
        Ok(())
    }
}

/// Reads a materialized file back into its sealed blocks, for a `DOp`'s
/// `push_data` to re-emit from disk. Unlike [`crate::BlockReader`] this does
/// not own the pool allocation for the bytes it reads — callers that need a
/// pinned block hand the returned bytes to
/// [`dataflow_block_pool::BlockPool::allocate_filled_byte_block`] themselves,
/// keeping this reader decoupled from any particular pool instance.
pub struct FileBlockReader {
    file: File,
}

/// One block's worth of bytes plus its header metadata, read back from a
/// materialized file.
pub struct RawBlock {
    pub bytes: Vec<u8>,
    pub first_item_offset: Option<u32>,
    pub num_items: u32,
    pub typecode_hash: u64,
}

impl FileBlockReader {
    pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self, FileSinkError> {
        Ok(Self {
            file: File::open(path).await?,
        })
    }

    /// Reads the next block, or `None` on a clean end of file between
    /// blocks.
    pub async fn next_block(&mut self) -> Result<Option<RawBlock>, FileSinkError> {
        let mut header_buf = [0u8; FILE_HEADER_LEN];
        match self.file.read_exact(&mut header_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(source) => return Err(FileSinkError::Io { source }),
        }
        let mut header = &header_buf[..];
        let size = header.get_u32() as usize;
        let num_items = header.get_u32();
        let raw_first_item = header.get_u32();
        let first_item_offset = if raw_first_item == NO_ITEM_START {
            None
        } else {
            Some(raw_first_item)
        };
        let typecode_hash = header.get_u64();

        let mut bytes = vec![0u8; size];
        self.file.read_exact(&mut bytes).await?;

        Ok(Some(RawBlock {
            bytes,
            first_item_offset,
            num_items,
            typecode_hash,
        }))
    }
}

/// Wraps an inner [`BlockSink`] with a cumulative byte cap, refusing any
/// append that would push the running total past it rather than forwarding a
/// partial write (§4.2: "a bounded sink with a max-size cap"; §8 boundary
/// behavior: "a block exactly equal to the size cap is accepted; size-cap + 1
/// raises `SinkFull`").
pub struct BoundedBlockSink<S> {
    inner: S,
    cap: u64,
    written: u64,
}

#[derive(Debug, Snafu)]
pub enum BoundedSinkError<E: std::error::Error + 'static> {
    #[snafu(display("sink full: append of {attempted} bytes would exceed cap of {cap} (already wrote {written})"))]
    Full { attempted: u64, cap: u64, written: u64 },

    #[snafu(display("inner sink error: {source}"))]
    Inner { source: E },
}

impl<S: BlockSink> BoundedBlockSink<S> {
    pub fn new(inner: S, cap: u64) -> Self {
        Self { inner, cap, written: 0 }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn cap(&self) -> u64 {
        self.cap
    }
}

#[async_trait]
impl<S: BlockSink> BlockSink for BoundedBlockSink<S> {
    type Error = BoundedSinkError<S::Error>;

    async fn accept(&mut self, block: Block) -> Result<(), Self::Error> {
        let attempted = block.len() as u64;
        if self.written + attempted > self.cap {
            return Err(BoundedSinkError::Full {
                attempted,
                cap: self.cap,
                written: self.written,
            });
        }
        self.inner
            .accept(block)
            .await
            .map_err(|source| BoundedSinkError::Inner { source })?;
        self.written += attempted;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.inner.close().await.map_err(|source| BoundedSinkError::Inner { source })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::VecBlockSink;
    use dataflow_block_pool::{BlockPool, BlockPoolConfig};
    use dataflow_common::LocalWorkerId;

    async fn pool() -> (BlockPool, tempdir::TempDir) {
        let dir = tempdir::TempDir::new("dataflow-data-file-sink").unwrap();
        let pool = BlockPool::new(BlockPoolConfig::builder(dir.path()).hard_cap(16 * 1024 * 1024).build());
        (pool, dir)
    }

    async fn make_block(pool: &BlockPool, payload: &[u8], first_item_offset: Option<u32>, num_items: u32) -> Block {
        let pinned = pool
            .allocate_filled_byte_block(payload.to_vec(), LocalWorkerId(0))
            .await
            .unwrap();
        Block::from_parts(pinned, first_item_offset, num_items, 0xabcd)
    }

    #[tokio::test]
    async fn file_sink_round_trips_blocks() {
        let (pool, _dir) = pool().await;
        let file_dir = tempdir::TempDir::new("dataflow-data-file").unwrap();
        let path = file_dir.path().join("materialized.blk");

        let mut sink = FileBlockSink::create(&path).await.unwrap();
        let a = make_block(&pool, b"hello world", Some(0), 2).await;
        let b = make_block(&pool, b"second block", None, 0).await;
        sink.accept(a).await.unwrap();
        sink.accept(b).await.unwrap();
        sink.close().await.unwrap();

        let mut reader = FileBlockReader::open(&path).await.unwrap();
        let first = reader.next_block().await.unwrap().unwrap();
        assert_eq!(first.bytes, b"hello world");
        assert_eq!(first.first_item_offset, Some(0));
        assert_eq!(first.num_items, 2);
        assert_eq!(first.typecode_hash, 0xabcd);

        let second = reader.next_block().await.unwrap().unwrap();
        assert_eq!(second.bytes, b"second block");
        assert_eq!(second.first_item_offset, None);

        assert!(reader.next_block().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn bounded_sink_accepts_exactly_the_cap_and_rejects_one_byte_more() {
        let (pool, _dir) = pool().await;

        let cap = 8u64;
        let mut sink = BoundedBlockSink::new(VecBlockSink::new(), cap);
        let exact = make_block(&pool, &[0u8; 8], Some(0), 1).await;
        sink.accept(exact).await.expect("block exactly at cap is accepted");

        let over = make_block(&pool, &[0u8; 1], Some(0), 1).await;
        let error = sink.accept(over).await.expect_err("one byte over cap must be rejected");
        assert!(matches!(error, BoundedSinkError::Full { .. }));
    }
}
