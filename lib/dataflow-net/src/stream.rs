use std::sync::atomic::{AtomicU64, Ordering};

use dataflow_common::{StreamId, WorkerRank};
use dataflow_data::Block;

use crate::queue::{MixQueue, PeerQueue};

/// Per-stream bookkeeping shared by both stream flavors: the late-bound
/// `dia_id` (Open Question 2, resolved in SPEC_FULL §9) and the receive-side
/// byte/item counters the `Stream` profile event class reports (§6). The
/// send side is tracked symmetrically by [`crate::stream_sink::StreamSink`],
/// whose `accept` is the single call site both the loopback and the remote
/// path go through — which is how invariant 2 in §8 (received items equal
/// sent items, summed over the whole job) holds unconditionally rather than
/// by convention between two divergent code paths.
pub struct StreamMeta {
    id: StreamId,
    /// 0 means "unset". Sentinel chosen to match the wire encoding, which
    /// likewise uses 0 as "no dia_id known yet" (§4.4).
    dia_id: AtomicU64,
    rx_items: AtomicU64,
    rx_bytes: AtomicU64,
}

impl StreamMeta {
    fn new(id: StreamId) -> Self {
        Self {
            id,
            dia_id: AtomicU64::new(0),
            rx_items: AtomicU64::new(0),
            rx_bytes: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn dia_id(&self) -> u64 {
        self.dia_id.load(Ordering::Acquire)
    }

    /// Sets the owning DIA node's id exactly once: `0 -> n`. A later call
    /// with the same `n` is a no-op (a retried, already-applied update); a
    /// later call with a *different* nonzero value is an
    /// [`dataflow_common::Error::InvariantViolation`] (SPEC_FULL §9, Open
    /// Question 2).
    pub fn set_dia_id(&self, new: u64) -> Result<(), dataflow_common::Error> {
        match self
            .dia_id
            .compare_exchange(0, new, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(existing) if existing == new => Ok(()),
            Err(existing) => Err(dataflow_common::Error::InvariantViolation {
                reason: format!(
                    "stream {} dia_id already set to {existing}, cannot overwrite with {new}",
                    self.id
                ),
            }),
        }
    }

    pub(crate) fn record_rx(&self, block: &Block) {
        self.rx_items.fetch_add(u64::from(block.num_items()), Ordering::AcqRel);
        self.rx_bytes.fetch_add(block.len() as u64, Ordering::AcqRel);
    }

    pub fn rx_items(&self) -> u64 {
        self.rx_items.load(Ordering::Acquire)
    }

    pub fn rx_bytes(&self) -> u64 {
        self.rx_bytes.load(Ordering::Acquire)
    }
}

/// A stream whose reader concatenates each sender's blocks in rank order:
/// every block from peer 0, then every block from peer 1, and so on (§3,
/// §4.3).
pub struct CatStream {
    meta: StreamMeta,
    peers: Vec<PeerQueue>,
    cursor: std::sync::atomic::AtomicUsize,
}

impl CatStream {
    pub fn new(id: StreamId, num_peers: usize) -> Self {
        Self {
            meta: StreamMeta::new(id),
            peers: (0..num_peers).map(|_| PeerQueue::new()).collect(),
            cursor: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    pub fn num_peers(&self) -> usize {
        self.peers.len()
    }

    /// Delivers one block that arrived from `sender`, whether over the
    /// network or via the loopback path (§4.3).
    pub fn deliver(&self, sender: WorkerRank, block: Block) {
        self.meta.record_rx(&block);
        self.peers[sender.0 as usize].push(block);
    }

    /// Signals end-of-stream for `sender`.
    pub fn close_sender(&self, sender: WorkerRank) {
        self.peers[sender.0 as usize].close();
    }

    /// Returns the next block in sender-rank order, or `None` once every
    /// peer has closed with nothing left buffered. Intended for a single
    /// logical reader, matching §5's "one writer, one reader per (sender,
    /// receiver) pair".
    pub async fn next(&self) -> Option<Block> {
        loop {
            let idx = self.cursor.load(Ordering::Acquire);
            if idx >= self.peers.len() {
                return None;
            }
            match self.peers[idx].pop().await {
                Some(block) => return Some(block),
                None => {
                    self.cursor.fetch_add(1, Ordering::AcqRel);
                }
            }
        }
    }
}

/// A stream whose reader sees blocks in arrival order across all senders,
/// preserving only per-sender FIFO (§3, §4.3).
pub struct MixStream {
    meta: StreamMeta,
    queue: MixQueue,
}

impl MixStream {
    pub fn new(id: StreamId, num_peers: usize) -> Self {
        Self {
            meta: StreamMeta::new(id),
            queue: MixQueue::new(num_peers),
        }
    }

    pub fn meta(&self) -> &StreamMeta {
        &self.meta
    }

    pub fn deliver(&self, _sender: WorkerRank, block: Block) {
        self.meta.record_rx(&block);
        self.queue.push(block);
    }

    pub fn close_sender(&self, _sender: WorkerRank) {
        self.queue.close_sender();
    }

    pub async fn next(&self) -> Option<Block> {
        self.queue.pop().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataflow_block_pool::{BlockPool, BlockPoolConfig};
    use dataflow_common::LocalWorkerId;
    use dataflow_data::{Block, BlockWriter, VecBlockSink};

    /// Builds a single-item block of the requested byte length, for tests
    /// that only care about block identity/length/arrival order rather than
    /// the serialized contents.
    async fn test_block(dir: &tempdir::TempDir, len: usize) -> Block {
        let pool = BlockPool::new(BlockPoolConfig::builder(dir.path()).hard_cap(16 * 1024 * 1024).build());
        let mut writer: BlockWriter<Vec<u8>, VecBlockSink> =
            BlockWriter::new(pool, LocalWorkerId(0), len + 8, VecBlockSink::new());
        writer.put(&vec![0u8; len]).await.unwrap();
        let sink = writer.into_sink().await.unwrap();
        sink.into_blocks().into_iter().next().unwrap()
    }

    #[tokio::test]
    async fn cat_stream_concatenates_senders_in_rank_order() {
        let dir = tempdir::TempDir::new("dataflow-net-stream").unwrap();
        let stream = CatStream::new(StreamId(0), 3);
        stream.deliver(WorkerRank(1), test_block(&dir, 1).await);
        stream.deliver(WorkerRank(0), test_block(&dir, 2).await);
        stream.deliver(WorkerRank(0), test_block(&dir, 3).await);
        stream.close_sender(WorkerRank(0));
        stream.close_sender(WorkerRank(1));
        stream.close_sender(WorkerRank(2));

        let mut order = Vec::new();
        while let Some(block) = stream.next().await {
            order.push(block.len());
        }
        // Block length includes the 4-byte record length prefix.
        assert_eq!(order, vec![2 + 4, 3 + 4, 1 + 4]);
        assert_eq!(stream.meta().rx_items(), 3);
    }

    #[tokio::test]
    async fn mix_stream_reads_in_arrival_order() {
        let dir = tempdir::TempDir::new("dataflow-net-stream").unwrap();
        let stream = MixStream::new(StreamId(0), 2);
        stream.deliver(WorkerRank(1), test_block(&dir, 1).await);
        stream.deliver(WorkerRank(0), test_block(&dir, 2).await);
        stream.close_sender(WorkerRank(0));
        stream.close_sender(WorkerRank(1));

        let first = stream.next().await.unwrap();
        assert_eq!(first.len(), 1 + 4);
        let second = stream.next().await.unwrap();
        assert_eq!(second.len(), 2 + 4);
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn dia_id_set_once_then_rejects_conflicting_update() {
        let meta = StreamMeta::new(StreamId(0));
        meta.set_dia_id(42).unwrap();
        // Same value again: idempotent no-op.
        meta.set_dia_id(42).unwrap();
        // Different value: invariant violation.
        assert!(meta.set_dia_id(43).is_err());
        assert_eq!(meta.dia_id(), 42);
    }
}
