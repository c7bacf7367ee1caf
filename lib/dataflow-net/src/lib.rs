//! Stream transport: wire framing, per-connection egress ordering, and the
//! per-host [`Multiplexer`] that routes inbound blocks to the right
//! `CatStream`/`MixStream` and fans outbound blocks to the right peer.
//!
//! Grounded on `original_source/thrill/data/multiplexer.cpp`,
//! `stream_sink.hpp`, and `net/tcp/connection.hpp`, generalized the way
//! `vector`'s `vector_buffers` crate generalizes "a byte sink with bounded
//! in-flight capacity" into something that doesn't care whether the backing
//! transport is a socket or an in-process loopback.

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

#[macro_use]
extern crate tracing;

mod connection;
mod frame;
mod multiplexer;
mod queue;
mod repository;
mod stream;
mod stream_sink;

pub use connection::{ConnectionReader, ConnectionWriter};
pub use frame::{FrameError, FrameHeader, Magic, DEFAULT_ALIGN, HEADER_LEN};
pub use multiplexer::Multiplexer;
pub use repository::{IdAllocator, Repository};
pub use stream::{CatStream, MixStream, StreamMeta};
pub use stream_sink::{LoopbackTarget, StreamSink, StreamSinkError, DEFAULT_IN_FLIGHT};
