use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use snafu::Snafu;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;

use dataflow_common::{StreamId, WorkerRank};
use dataflow_data::{Block, BlockSink};

use crate::frame::{FrameHeader, Magic};
use crate::stream::{CatStream, MixStream};

/// Number of in-flight blocks a [`StreamSink`] allows on one connection
/// before `append` suspends the caller, grounded exactly in
/// `original_source/thrill/data/stream_sink.hpp`'s `num_queue_ = 8`
/// (SPEC_FULL §4.3).
pub const DEFAULT_IN_FLIGHT: usize = 8;

#[derive(Debug, Snafu)]
pub enum StreamSinkError {
    #[snafu(display("put() on a stream sink that has already been closed"))]
    Closed,
    #[snafu(display("peer connection is gone"))]
    Disconnected,
}

/// The receiving side a loopback [`StreamSink`] delivers directly into,
/// bypassing the network and the semaphore entirely when sender and
/// receiver share a host (§4.3: "Loopback optimization").
#[derive(Clone)]
pub enum LoopbackTarget {
    Cat(Arc<CatStream>),
    Mix(Arc<MixStream>),
}

impl LoopbackTarget {
    pub(crate) fn deliver(&self, sender: WorkerRank, block: Block) {
        match self {
            LoopbackTarget::Cat(stream) => stream.deliver(sender, block),
            LoopbackTarget::Mix(stream) => stream.deliver(sender, block),
        }
    }

    pub(crate) fn close_sender(&self, sender: WorkerRank) {
        match self {
            LoopbackTarget::Cat(stream) => stream.close_sender(sender),
            LoopbackTarget::Mix(stream) => stream.close_sender(sender),
        }
    }
}

/// One item on a connection's egress channel: either a data block (carrying
/// the semaphore permit that is released once the write completes) or an
/// end-of-stream marker (unthrottled, since it carries no payload to hold in
/// flight).
pub(crate) enum EgressItem {
    Data {
        header: FrameHeader,
        block: Block,
        _permit: tokio::sync::OwnedSemaphorePermit,
    },
    End { header: FrameHeader },
}

/// Handle to a connection's single egress task. Cloning and sharing this
/// across every [`StreamSink`] destined for the same remote host is what
/// keeps per-sender block order intact end to end: the channel is FIFO and
/// has exactly one consumer (`multiplexer::spawn_egress_task`).
#[derive(Clone)]
pub struct EgressHandle {
    pub(crate) tx: mpsc::UnboundedSender<EgressItem>,
}

impl EgressHandle {
    fn send(&self, item: EgressItem) -> Result<(), StreamSinkError> {
        self.tx.send(item).map_err(|_| StreamSinkError::Disconnected)
    }
}

enum SinkTarget {
    Loopback(LoopbackTarget),
    Remote { egress: EgressHandle },
}

/// Per-remote-peer `BlockSink`: the egress side of one stream's shuffle,
/// backpressured by a counting semaphore (§4.3).
///
/// Grounded in `original_source/thrill/data/stream_sink.hpp`: `AppendBlock`
/// becomes [`BlockSink::accept`], the semaphore acquire/release bracket is
/// identical in spirit, and `Close` sends the end-of-stream frame exactly
/// once (idempotent here via `closed`).
pub struct StreamSink {
    semaphore: Arc<Semaphore>,
    stream_id: StreamId,
    magic: Magic,
    sender_worker: WorkerRank,
    recv_worker: WorkerRank,
    target: SinkTarget,
    closed: bool,
    tx_items: AtomicU64,
    tx_bytes: AtomicU64,
}

impl StreamSink {
    pub fn loopback(
        stream_id: StreamId,
        magic: Magic,
        sender_worker: WorkerRank,
        recv_worker: WorkerRank,
        target: LoopbackTarget,
    ) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(DEFAULT_IN_FLIGHT)),
            stream_id,
            magic,
            sender_worker,
            recv_worker,
            target: SinkTarget::Loopback(target),
            closed: false,
            tx_items: AtomicU64::new(0),
            tx_bytes: AtomicU64::new(0),
        }
    }

    pub fn remote(
        stream_id: StreamId,
        magic: Magic,
        sender_worker: WorkerRank,
        recv_worker: WorkerRank,
        egress: EgressHandle,
    ) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(DEFAULT_IN_FLIGHT)),
            stream_id,
            magic,
            sender_worker,
            recv_worker,
            target: SinkTarget::Remote { egress },
            closed: false,
            tx_items: AtomicU64::new(0),
            tx_bytes: AtomicU64::new(0),
        }
    }

    pub fn tx_items(&self) -> u64 {
        self.tx_items.load(Ordering::Acquire)
    }

    pub fn tx_bytes(&self) -> u64 {
        self.tx_bytes.load(Ordering::Acquire)
    }

    fn header_for(&self, block: &Block) -> FrameHeader {
        FrameHeader {
            magic: self.magic,
            stream_id: self.stream_id,
            size: block.len() as u32,
            num_items: block.num_items(),
            first_item: block.first_item_offset(),
            typecode_verify: block.typecode_hash(),
            sender_worker: self.sender_worker,
            recv_worker: self.recv_worker,
        }
    }
}

#[async_trait]
impl BlockSink for StreamSink {
    type Error = StreamSinkError;

    /// Acquires one in-flight permit, then either delivers directly (the
    /// loopback path acquires and releases the permit immediately, since
    /// there is no network hop to bound) or hands the block to the egress
    /// task, which releases the permit once the write completes (§4.3).
    async fn accept(&mut self, block: Block) -> Result<(), Self::Error> {
        if self.closed {
            return Err(StreamSinkError::Closed);
        }
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| StreamSinkError::Disconnected)?;

        self.tx_items.fetch_add(u64::from(block.num_items()), Ordering::AcqRel);
        self.tx_bytes.fetch_add(block.len() as u64, Ordering::AcqRel);

        match &self.target {
            SinkTarget::Loopback(target) => {
                target.deliver(self.sender_worker, block);
                drop(permit);
                Ok(())
            }
            SinkTarget::Remote { egress } => {
                let header = self.header_for(&block);
                egress.send(EgressItem::Data {
                    header,
                    block,
                    _permit: permit,
                })
            }
        }
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match &self.target {
            SinkTarget::Loopback(target) => {
                target.close_sender(self.sender_worker);
                Ok(())
            }
            SinkTarget::Remote { egress } => egress.send(EgressItem::End {
                header: FrameHeader::end_of_stream(self.magic, self.stream_id, self.sender_worker, self.recv_worker),
            }),
        }
    }
}

impl Drop for StreamSink {
    fn drop(&mut self) {
        if !self.closed {
            warn!(stream_id = %self.stream_id, "stream sink dropped without close(); peer will never see end-of-stream");
        }
    }
}
