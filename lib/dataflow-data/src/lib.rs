//! The typed block-oriented substream: `Encodable` items get serialized into
//! a logical byte stream that is chunked into fixed-size blocks backed by a
//! [`dataflow_block_pool::BlockPool`], and reconstructed on the other side by
//! a [`reader::BlockReader`].
//!
//! Grounded on `vector_buffers::encoding` for the item (de)serialization
//! contract and on `vector_buffers::disk_v2::writer::RecordWriter` for the
//! length-prefixed framing, generalized so a single item's bytes may straddle
//! a block boundary (§3/§4.2 of the design).

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

#[macro_use]
extern crate tracing;

mod block;
mod encodable;
mod file_sink;
mod reader;
mod sink;
mod typecode;
mod writer;

pub use block::Block;
pub use encodable::{Encodable, FrameError};
pub use file_sink::{BoundedBlockSink, BoundedSinkError, FileBlockReader, FileBlockSink, FileProfile, FileSinkError, RawBlock};
pub use reader::{BlockReader, ReaderError};
pub use sink::{BlockSink, VecBlockSink};
pub use typecode::typecode_hash;
pub use writer::{BlockWriter, WriterError};
