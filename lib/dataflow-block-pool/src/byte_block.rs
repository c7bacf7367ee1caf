use std::sync::Arc;

use crate::pool::{BlockId, BlockPool};

/// Swap state of a [`ByteBlock`](crate::pool::BlockId) as tracked internally
/// by the pool (§3 of the design).
///
/// ```text
/// Allocated ─► Resident ◄──► Writing ─► OnDisk ─► Reading ─► Resident
///                    └────► Disposed
/// ```
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum SwapState {
    Resident,
    Writing,
    OnDisk,
    Reading,
}

/// A pinned, resident view onto a block's bytes.
///
/// Holding one guarantees the underlying bytes stay resident: the pool will
/// not evict a block with a nonzero pin count. Dropping it (or calling
/// [`BlockPool::unpin`] explicitly) releases the pin.
pub struct PinnedByteBlock {
    pub(crate) pool: BlockPool,
    pub(crate) id: BlockId,
    pub(crate) bytes: Arc<Vec<u8>>,
}

impl PinnedByteBlock {
    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Returns a clone of the pinned bytes, bumping the pin count so the
    /// clone can outlive this handle independently.
    pub fn clone_pin(&self) -> Self {
        self.pool.pin_again(self.id);
        Self {
            pool: self.pool.clone(),
            id: self.id,
            bytes: Arc::clone(&self.bytes),
        }
    }
}

impl Drop for PinnedByteBlock {
    fn drop(&mut self) {
        self.pool.unpin(self.id);
    }
}

impl std::fmt::Debug for PinnedByteBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedByteBlock")
            .field("id", &self.id)
            .field("len", &self.bytes.len())
            .finish()
    }
}
