use std::collections::VecDeque;

use tokio::sync::Notify;

use dataflow_data::Block;

/// A single sender's FIFO queue of arrived blocks, backed by a mutex and a
/// `Notify` rather than a channel so that [`crate::stream::CatStream`] can
/// poll a specific peer's queue without also racing its neighbors (§5:
/// "internal mutex + condvar; one writer, one reader per (sender, receiver)
/// pair").
#[derive(Default)]
pub(crate) struct PeerQueue {
    inner: parking_lot::Mutex<VecDeque<Block>>,
    closed: std::sync::atomic::AtomicBool,
    notify: Notify,
}

impl PeerQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, block: Block) {
        self.inner.lock().push_back(block);
        self.notify.notify_waiters();
    }

    /// Marks this sender closed (end-of-stream). Idempotent.
    pub(crate) fn close(&self) {
        self.closed.store(true, std::sync::atomic::Ordering::Release);
        self.notify.notify_waiters();
    }

    /// Pops the next block, suspending until one arrives or the sender
    /// closes with nothing left buffered.
    pub(crate) async fn pop(&self) -> Option<Block> {
        loop {
            // Subscribed before the condition check below, so a push()/
            // close() that calls notify_waiters() in the gap between the
            // check and the eventual `.await` still wakes this waiter
            // instead of being lost (see ledger.rs's `notified()` for the
            // same pattern).
            let notified = self.notify.notified();

            if let Some(block) = self.inner.lock().pop_front() {
                return Some(block);
            }
            if self.closed.load(std::sync::atomic::Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }
}

struct MixQueueInner {
    items: VecDeque<Block>,
    open_senders: usize,
}

/// A single queue fed by every peer, preserving arrival order across senders
/// (§4.3: "MixStream reader consumes from whichever peer queue has a ready
/// block"). Per-sender order is still preserved because each sender's pushes
/// are individually ordered; there is simply no cross-sender guarantee.
pub(crate) struct MixQueue {
    inner: parking_lot::Mutex<MixQueueInner>,
    notify: Notify,
}

impl MixQueue {
    pub(crate) fn new(num_senders: usize) -> Self {
        Self {
            inner: parking_lot::Mutex::new(MixQueueInner {
                items: VecDeque::new(),
                open_senders: num_senders,
            }),
            notify: Notify::new(),
        }
    }

    pub(crate) fn push(&self, block: Block) {
        self.inner.lock().items.push_back(block);
        self.notify.notify_waiters();
    }

    /// Marks one sender closed. Once every sender has closed, subsequent
    /// `pop` calls drain remaining items and then return `None`.
    pub(crate) fn close_sender(&self) {
        let mut inner = self.inner.lock();
        inner.open_senders = inner.open_senders.saturating_sub(1);
        drop(inner);
        self.notify.notify_waiters();
    }

    pub(crate) async fn pop(&self) -> Option<Block> {
        loop {
            // Subscribed before the condition check below; see PeerQueue::pop.
            let notified = self.notify.notified();

            {
                let mut inner = self.inner.lock();
                if let Some(block) = inner.items.pop_front() {
                    return Some(block);
                }
                if inner.open_senders == 0 {
                    return None;
                }
            }
            notified.await;
        }
    }
}
