use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dataflow_common::LocalWorkerId;
use snafu::Snafu;

use crate::byte_block::{PinnedByteBlock, SwapState};
use crate::config::BlockPoolConfig;
use crate::ledger::{IoSpeedTrackers, Ledger};
use crate::profile::MemProfileSample;

/// Identifier of a block within a single [`BlockPool`]. Not meaningful
/// across pools (each host owns exactly one pool; see §5 of the design).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct BlockId(u64);

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

#[derive(Debug, Snafu)]
pub enum PoolError {
    #[snafu(display("block pool out of memory: could not satisfy allocation of {requested} bytes (hard cap {hard_cap})"))]
    OutOfMemory { requested: u64, hard_cap: u64 },

    #[snafu(display("block pool I/O error: {source}"))]
    Io { source: std::io::Error },

    #[snafu(display("block pool invariant violation: {reason}"))]
    InvariantViolation { reason: String },
}

impl From<PoolError> for dataflow_common::Error {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::OutOfMemory { requested, .. } => {
                dataflow_common::Error::OutOfMemory { requested }
            }
            PoolError::Io { source } => dataflow_common::Error::NetIo { host: 0, source },
            PoolError::InvariantViolation { reason } => {
                dataflow_common::Error::InvariantViolation { reason }
            }
        }
    }
}

enum Storage {
    Resident(Arc<Vec<u8>>),
    OnDisk(std::path::PathBuf),
}

struct Entry {
    storage: Storage,
    state: SwapState,
    pin_count: u32,
    size: u64,
    owner: LocalWorkerId,
}

#[derive(Default)]
struct Inner {
    blocks: HashMap<BlockId, Entry>,
    /// Unpinned blocks, oldest-unpin-first. Entries for blocks that have
    /// since been re-pinned or evicted are left in place and skipped over
    /// when popped (cheaper than a linked-hashmap for our purposes).
    lru: VecDeque<BlockId>,
}

struct Shared {
    config: BlockPoolConfig,
    ledger: Ledger,
    io: IoSpeedTrackers,
    inner: parking_lot::Mutex<Inner>,
    next_id: AtomicU64,
}

/// Owns byte-block storage for one host: pin/unpin, swap-out/swap-in, and
/// the aggregate counters the profiler samples (§4.1 of the design).
///
/// Cheaply `Clone`-able; every clone shares the same underlying pool, the
/// way `Arc<Ledger>` is shared across `vector_buffers::disk_v2::{Reader,
/// Writer}` instances in the teacher crate.
#[derive(Clone)]
pub struct BlockPool(Arc<Shared>);

impl BlockPool {
    pub fn new(config: BlockPoolConfig) -> Self {
        Self(Arc::new(Shared {
            config,
            ledger: Ledger::new(),
            io: IoSpeedTrackers::default(),
            inner: parking_lot::Mutex::new(Inner::default()),
            next_id: AtomicU64::new(0),
        }))
    }

    pub fn total_bytes(&self) -> u64 {
        self.0.ledger.total_bytes()
    }

    pub fn ram_bytes(&self) -> u64 {
        self.0.ledger.floating_bytes()
    }

    pub fn pinned_bytes(&self) -> u64 {
        self.0.ledger.pinned_bytes()
    }

    pub fn unpinned_bytes(&self) -> u64 {
        self.0.ledger.unpinned_bytes()
    }

    pub fn swapped_bytes(&self) -> u64 {
        self.0.ledger.swapped_bytes()
    }

    pub fn sample_mem_profile(&self) -> MemProfileSample {
        self.0.ledger.sample_mem_profile()
    }

    pub fn read_speed(&self) -> f64 {
        self.0.io.read.lock().sample()
    }

    pub fn write_speed(&self) -> f64 {
        self.0.io.write.lock().sample()
    }

    fn next_id(&self) -> BlockId {
        BlockId(self.0.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn swap_path(&self, id: BlockId) -> std::path::PathBuf {
        self.0.config.swap_dir().join(format!("block-{}.blk", id.0))
    }

    /// Allocates a pinned, resident block of exactly `size` bytes.
    ///
    /// Fails with [`PoolError::OutOfMemory`] only if satisfying the
    /// allocation would push pinned usage above the hard cap and no
    /// unpinned block remains to evict (§4.1).
    pub async fn allocate_byte_block(
        &self,
        size: u64,
        worker: LocalWorkerId,
    ) -> Result<PinnedByteBlock, PoolError> {
        self.allocate_resident(Arc::new(vec![0u8; size as usize]), worker)
            .await
    }

    /// Allocates a pinned, resident block seeded with `bytes` (no
    /// zero-fill-then-copy). Used by callers that have already assembled the
    /// block's contents in memory, such as a streaming writer sealing a full
    /// block.
    pub async fn allocate_filled_byte_block(
        &self,
        bytes: Vec<u8>,
        worker: LocalWorkerId,
    ) -> Result<PinnedByteBlock, PoolError> {
        self.allocate_resident(Arc::new(bytes), worker).await
    }

    #[instrument(skip(self, bytes), level = "trace")]
    async fn allocate_resident(
        &self,
        bytes: Arc<Vec<u8>>,
        worker: LocalWorkerId,
    ) -> Result<PinnedByteBlock, PoolError> {
        let size = bytes.len() as u64;
        loop {
            let victim = {
                let mut inner = self.0.inner.lock();
                if self.0.ledger.pinned_bytes() + size <= self.0.config.hard_cap() {
                    let id = self.next_id();
                    inner.blocks.insert(
                        id,
                        Entry {
                            storage: Storage::Resident(Arc::clone(&bytes)),
                            state: SwapState::Resident,
                            pin_count: 1,
                            size,
                            owner: worker,
                        },
                    );
                    self.0.ledger.add_pinned(size);
                    trace!(block_id = ?id, size, "allocated byte block");
                    return Ok(PinnedByteBlock {
                        pool: self.clone(),
                        id,
                        bytes,
                    });
                }

                find_eviction_candidate(&mut inner)
            };

            match victim {
                Some(id) => {
                    self.evict_to_disk(id).await?;
                }
                None => {
                    return Err(PoolError::OutOfMemory {
                        requested: size,
                        hard_cap: self.0.config.hard_cap(),
                    });
                }
            }
        }
    }

    /// Pins a block, returning a resident view. Suspends on an in-progress
    /// swap, same as `pin()` in the C++ original (§4.1).
    #[instrument(skip(self), level = "trace")]
    pub async fn pin(&self, id: BlockId) -> Result<PinnedByteBlock, PoolError> {
        loop {
            enum Next {
                Ready(PinnedByteBlock),
                WaitForProgress,
                SwapIn,
            }

            // Subscribed before the state check below (and before the lock
            // guarding it is dropped), so a concurrent evict_to_disk/swap_in
            // that completes and calls notify_progress() in the gap between
            // the check and the eventual `.await` still wakes this waiter
            // instead of being lost.
            let notified = self.0.ledger.notified();

            let next = {
                let mut inner = self.0.inner.lock();
                let entry = inner.blocks.get_mut(&id).ok_or_else(|| {
                    PoolError::InvariantViolation {
                        reason: format!("pin() on unknown block {id:?}"),
                    }
                })?;

                match entry.state {
                    SwapState::Resident => {
                        let was_unpinned = entry.pin_count == 0;
                        entry.pin_count += 1;
                        let size = entry.size;
                        let bytes = match &entry.storage {
                            Storage::Resident(b) => Arc::clone(b),
                            Storage::OnDisk(_) => unreachable!(),
                        };
                        if was_unpinned {
                            self.0.ledger.sub_unpinned(size);
                            self.0.ledger.add_pinned(size);
                        }
                        Next::Ready(PinnedByteBlock {
                            pool: self.clone(),
                            id,
                            bytes,
                        })
                    }
                    SwapState::Writing | SwapState::Reading => Next::WaitForProgress,
                    SwapState::OnDisk => Next::SwapIn,
                }
            };

            match next {
                Next::Ready(block) => return Ok(block),
                Next::WaitForProgress => notified.await,
                Next::SwapIn => self.swap_in(id).await?,
            }
        }
    }

    /// Bumps the pin count on an already-pinned block (used by
    /// [`PinnedByteBlock::clone_pin`]); never changes the byte ledger since
    /// the block was already in the pinned bucket.
    pub(crate) fn pin_again(&self, id: BlockId) {
        let mut inner = self.0.inner.lock();
        if let Some(entry) = inner.blocks.get_mut(&id) {
            entry.pin_count += 1;
        }
    }

    /// Releases one pin. When the count reaches zero the block becomes
    /// eligible for eviction and a background sweep is kicked off if the
    /// soft cap is now exceeded.
    #[instrument(skip(self), level = "trace")]
    pub(crate) fn unpin(&self, id: BlockId) {
        let became_unpinned = {
            let mut inner = self.0.inner.lock();
            match inner.blocks.get_mut(&id) {
                Some(entry) => {
                    entry.pin_count = entry.pin_count.saturating_sub(1);
                    if entry.pin_count == 0 {
                        inner.lru.push_back(id);
                        self.0.ledger.sub_pinned(entry.size);
                        self.0.ledger.add_unpinned(entry.size);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };

        if became_unpinned {
            self.0.ledger.notify_progress();
            if self.0.ledger.floating_bytes() > self.0.config.soft_cap() {
                let pool = self.clone();
                tokio::spawn(async move { pool.evict_sweep().await });
            }
        }
    }

    async fn evict_sweep(&self) {
        while self.0.ledger.floating_bytes() > self.0.config.soft_cap() {
            let victim = {
                let mut inner = self.0.inner.lock();
                find_eviction_candidate(&mut inner)
            };
            match victim {
                Some(id) => {
                    if let Err(error) = self.evict_to_disk(id).await {
                        warn!(block_id = ?id, %error, "eviction sweep failed");
                        break;
                    }
                }
                None => break,
            }
        }
    }

    /// Transitions a resident, unpinned block `Resident -> Writing -> OnDisk`.
    #[instrument(skip(self), level = "debug")]
    pub async fn evict_to_disk(&self, id: BlockId) -> Result<(), PoolError> {
        let (bytes, size) = {
            let mut inner = self.0.inner.lock();
            let entry = inner.blocks.get_mut(&id).ok_or_else(|| {
                PoolError::InvariantViolation {
                    reason: format!("evict_to_disk() on unknown block {id:?}"),
                }
            })?;
            if entry.pin_count != 0 {
                return Err(PoolError::InvariantViolation {
                    reason: format!("evict_to_disk() on pinned block {id:?}"),
                });
            }
            let bytes = match &entry.storage {
                Storage::Resident(b) => Arc::clone(b),
                Storage::OnDisk(_) => {
                    // Already evicted (could race with another sweep); no-op.
                    return Ok(());
                }
            };
            entry.state = SwapState::Writing;
            (bytes, entry.size)
        };

        let path = self.swap_path(id);
        tokio::fs::create_dir_all(self.0.config.swap_dir())
            .await
            .map_err(|source| PoolError::Io { source })?;
        tokio::fs::write(&path, bytes.as_slice())
            .await
            .map_err(|source| PoolError::Io { source })?;

        {
            let mut inner = self.0.inner.lock();
            if let Some(entry) = inner.blocks.get_mut(&id) {
                entry.storage = Storage::OnDisk(path);
                entry.state = SwapState::OnDisk;
            }
            // The LRU entry for this id is now stale (it no longer names a
            // resident block); pop_front skips entries that don't resolve.
        }

        self.0.ledger.sub_unpinned(size);
        self.0.ledger.add_swapped(size);
        self.0.ledger.record_write(size);
        self.0.io.write.lock().record(size);
        self.0.ledger.notify_progress();

        debug!(block_id = ?id, size, "evicted block to disk");
        Ok(())
    }

    /// Transitions `OnDisk -> Reading -> Resident`. Does not pin; a
    /// subsequent loop iteration in [`Self::pin`] re-checks the now-resident
    /// state and pins it there.
    #[instrument(skip(self), level = "debug")]
    async fn swap_in(&self, id: BlockId) -> Result<(), PoolError> {
        let (path, size) = {
            let mut inner = self.0.inner.lock();
            let entry = inner.blocks.get_mut(&id).ok_or_else(|| {
                PoolError::InvariantViolation {
                    reason: format!("swap_in() on unknown block {id:?}"),
                }
            })?;
            let path = match &entry.storage {
                Storage::OnDisk(p) => p.clone(),
                Storage::Resident(_) => return Ok(()),
            };
            entry.state = SwapState::Reading;
            (path, entry.size)
        };

        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| PoolError::Io { source })?;
        let _ = tokio::fs::remove_file(&path).await;

        {
            let mut inner = self.0.inner.lock();
            if let Some(entry) = inner.blocks.get_mut(&id) {
                entry.storage = Storage::Resident(Arc::new(bytes));
                entry.state = SwapState::Resident;
            }
        }

        self.0.ledger.sub_swapped(size);
        self.0.ledger.add_unpinned(size);
        self.0.ledger.record_read(size);
        self.0.io.read.lock().record(size);
        self.0.ledger.notify_progress();

        debug!(block_id = ?id, size, "swapped block in from disk");
        Ok(())
    }

    /// Permanently removes a block. The caller must not hold a pin on it.
    pub fn dispose(&self, id: BlockId) -> Result<(), PoolError> {
        let mut inner = self.0.inner.lock();
        let entry = inner.blocks.remove(&id).ok_or_else(|| {
            PoolError::InvariantViolation {
                reason: format!("dispose() on unknown block {id:?}"),
            }
        })?;
        if entry.pin_count != 0 {
            return Err(PoolError::InvariantViolation {
                reason: format!("dispose() on pinned block {id:?}"),
            });
        }
        match entry.state {
            SwapState::Resident => self.0.ledger.sub_unpinned(entry.size),
            SwapState::OnDisk => self.0.ledger.sub_swapped(entry.size),
            other => {
                return Err(PoolError::InvariantViolation {
                    reason: format!("dispose() on block {id:?} mid-transition ({other:?})"),
                })
            }
        }
        Ok(())
    }
}

/// Finds the oldest unpinned, resident block to evict, discarding stale
/// (already-evicted or re-pinned) LRU entries as it goes.
fn find_eviction_candidate(inner: &mut Inner) -> Option<BlockId> {
    while let Some(id) = inner.lru.pop_front() {
        if let Some(entry) = inner.blocks.get(&id) {
            if entry.pin_count == 0 && matches!(entry.state, SwapState::Resident) {
                return Some(id);
            }
        }
    }
    None
}
