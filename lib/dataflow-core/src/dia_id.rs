use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifier of one operator node, stable for the life of a job and used as
/// the correlation key the profiler's `DIABase`/`Stream` event classes join
/// on (spec §6).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct DiaId(pub u64);

impl fmt::Debug for DiaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DiaId({})", self.0)
    }
}

impl fmt::Display for DiaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out monotonically increasing node ids within one worker's DAG.
/// Every worker builds the identical DAG in the identical order (the program
/// is deterministic across workers), so the same node gets the same id on
/// every host without any coordination — the same property the multiplexer's
/// stream id allocator relies on.
#[derive(Debug, Default)]
pub struct DiaIdAllocator {
    next: AtomicU64,
}

impl DiaIdAllocator {
    pub fn new() -> Self {
        Self { next: AtomicU64::new(0) }
    }

    pub fn allocate(&self) -> DiaId {
        DiaId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_sequential_ids() {
        let alloc = DiaIdAllocator::new();
        assert_eq!(alloc.allocate(), DiaId(0));
        assert_eq!(alloc.allocate(), DiaId(1));
        assert_eq!(alloc.allocate(), DiaId(2));
    }
}
