use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;

use crate::profile::Ohlc;
use crate::rate::RateTracker;

/// Aggregate byte counters and swap-progress notification, shared by every
/// clone of a [`crate::BlockPool`].
///
/// Grounded on `vector_buffers::variants::disk_v2::ledger::Ledger`: atomic
/// counters for the hot path, paired with a `tokio::sync::Notify` that
/// callers blocked on a full pool (here: allocators waiting on eviction, or
/// pinners waiting on swap-in) can await without holding the pool's lock.
#[derive(Debug)]
pub(crate) struct Ledger {
    pinned_bytes: AtomicU64,
    unpinned_bytes: AtomicU64,
    swapped_bytes: AtomicU64,
    read_bytes_total: AtomicU64,
    write_bytes_total: AtomicU64,
    progress: Notify,
    last_total_close: AtomicU64,
    last_float_close: AtomicU64,
    last_base_close: AtomicU64,
}

impl Ledger {
    pub(crate) fn new() -> Self {
        Self {
            pinned_bytes: AtomicU64::new(0),
            unpinned_bytes: AtomicU64::new(0),
            swapped_bytes: AtomicU64::new(0),
            read_bytes_total: AtomicU64::new(0),
            write_bytes_total: AtomicU64::new(0),
            progress: Notify::new(),
            last_total_close: AtomicU64::new(0),
            last_float_close: AtomicU64::new(0),
            last_base_close: AtomicU64::new(0),
        }
    }

    pub(crate) fn pinned_bytes(&self) -> u64 {
        self.pinned_bytes.load(Ordering::Acquire)
    }

    pub(crate) fn unpinned_bytes(&self) -> u64 {
        self.unpinned_bytes.load(Ordering::Acquire)
    }

    pub(crate) fn swapped_bytes(&self) -> u64 {
        self.swapped_bytes.load(Ordering::Acquire)
    }

    pub(crate) fn total_bytes(&self) -> u64 {
        self.pinned_bytes() + self.unpinned_bytes() + self.swapped_bytes()
    }

    pub(crate) fn floating_bytes(&self) -> u64 {
        self.pinned_bytes() + self.unpinned_bytes()
    }

    pub(crate) fn add_pinned(&self, amount: u64) {
        self.pinned_bytes.fetch_add(amount, Ordering::AcqRel);
    }

    pub(crate) fn sub_pinned(&self, amount: u64) {
        self.pinned_bytes.fetch_sub(amount, Ordering::AcqRel);
    }

    pub(crate) fn add_unpinned(&self, amount: u64) {
        self.unpinned_bytes.fetch_add(amount, Ordering::AcqRel);
    }

    pub(crate) fn sub_unpinned(&self, amount: u64) {
        self.unpinned_bytes.fetch_sub(amount, Ordering::AcqRel);
    }

    pub(crate) fn add_swapped(&self, amount: u64) {
        self.swapped_bytes.fetch_add(amount, Ordering::AcqRel);
    }

    pub(crate) fn sub_swapped(&self, amount: u64) {
        self.swapped_bytes.fetch_sub(amount, Ordering::AcqRel);
    }

    pub(crate) fn record_read(&self, bytes: u64) {
        self.read_bytes_total.fetch_add(bytes, Ordering::AcqRel);
    }

    pub(crate) fn record_write(&self, bytes: u64) {
        self.write_bytes_total.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Notifies every task awaiting pool progress (an eviction completed, a
    /// swap-in finished, an unpin freed capacity).
    pub(crate) fn notify_progress(&self) {
        self.progress.notify_waiters();
    }

    /// Returns a future that resolves on the next [`Self::notify_progress`]
    /// call. Callers must obtain this *before* re-checking the condition
    /// they're waiting on and dropping whatever lock guards that check, so a
    /// `notify_progress()` racing with the check is never missed: `Notify`
    /// guarantees a `notified()` future created before a `notify_waiters()`
    /// call observes it, even if the future isn't polled until afterwards.
    pub(crate) fn notified(&self) -> tokio::sync::futures::Notified<'_> {
        self.progress.notified()
    }

    /// Produces one OHLC sample across `total`/`float`/`base` and advances
    /// the rolling "previous close" used as the next sample's open.
    pub(crate) fn sample_mem_profile(&self) -> crate::profile::MemProfileSample {
        let total = self.total_bytes();
        let float = self.floating_bytes();
        let base = self.swapped_bytes();

        let total_ohlc = Ohlc::sample(self.last_total_close.swap(total, Ordering::AcqRel), &[total]);
        let float_ohlc = Ohlc::sample(self.last_float_close.swap(float, Ordering::AcqRel), &[float]);
        let base_ohlc = Ohlc::sample(self.last_base_close.swap(base, Ordering::AcqRel), &[base]);

        crate::profile::MemProfileSample {
            total: total_ohlc,
            float: float_ohlc,
            base: base_ohlc,
        }
    }
}

/// Tracks rolling disk I/O speeds; separate from the atomic byte counters
/// above because sampling resets its internal window.
#[derive(Debug, Default)]
pub(crate) struct IoSpeedTrackers {
    pub(crate) read: parking_lot::Mutex<RateTracker>,
    pub(crate) write: parking_lot::Mutex<RateTracker>,
}
