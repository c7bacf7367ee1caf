use std::collections::HashMap;

use dataflow_common::{LocalWorkerId, StreamId};

/// Hands out the monotonic per-local-worker id sequence that makes
/// `(local_worker, StreamId)` globally unique (§4.4, §9): every host runs the
/// same deterministic DAG, so every host's allocator is called in the same
/// order and therefore produces the same sequence without a coordinator.
///
/// Grounded in `original_source/thrill/data/multiplexer.cpp`'s
/// `Repository::AllocateId`. The original shares one counter between its
/// `AllocateCatStreamId`/`AllocateMixStreamId` entry points by routing both
/// through the same `Repository<StreamSetBase>`; we keep that single shared
/// sequence but split out the id allocator from the object map so Cat and
/// Mix streams can live in differently-typed Rust maps ([`Repository<T>`]
/// below) while still drawing ids from one counter.
#[derive(Debug)]
pub struct IdAllocator {
    next_id: Vec<u64>,
}

impl IdAllocator {
    pub fn new(workers_per_host: usize) -> Self {
        Self {
            next_id: vec![0; workers_per_host],
        }
    }

    /// Allocates the next id for `local_worker`. Calls alter internal state;
    /// callers must invoke this in the same order on every host for ids to
    /// line up across the job.
    pub fn allocate_id(&mut self, local_worker: LocalWorkerId) -> StreamId {
        let slot = &mut self.next_id[local_worker.0 as usize];
        let id = StreamId(*slot);
        *slot += 1;
        id
    }
}

/// A keyed store of same-kind stream objects, addressed by [`StreamId`].
/// Objects are constructed in place on first access, matching
/// `Repository::GetOrCreate`'s semantics in the original.
pub struct Repository<T> {
    map: HashMap<StreamId, T>,
}

impl<T> Repository<T> {
    pub fn new() -> Self {
        Self { map: HashMap::new() }
    }

    /// Returns the existing object for `id`, constructing it in place via
    /// `ctor` if absent.
    pub fn get_or_create<F: FnOnce() -> T>(&mut self, id: StreamId, ctor: F) -> &mut T {
        self.map.entry(id).or_insert_with(ctor)
    }

    pub fn get(&self, id: StreamId) -> Option<&T> {
        self.map.get(&id)
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.map.values()
    }
}

impl<T> Default for Repository<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_id_is_monotonic_per_worker() {
        let mut alloc = IdAllocator::new(2);
        assert_eq!(alloc.allocate_id(LocalWorkerId(0)), StreamId(0));
        assert_eq!(alloc.allocate_id(LocalWorkerId(0)), StreamId(1));
        assert_eq!(alloc.allocate_id(LocalWorkerId(1)), StreamId(0));
        assert_eq!(alloc.allocate_id(LocalWorkerId(0)), StreamId(2));
    }

    #[test]
    fn get_or_create_constructs_exactly_once() {
        let mut repo: Repository<u32> = Repository::new();
        let id = StreamId(7);
        *repo.get_or_create(id, || 100) += 1;
        *repo.get_or_create(id, || panic!("should not reconstruct")) += 1;
        assert_eq!(*repo.get(id).unwrap(), 102);
    }
}
