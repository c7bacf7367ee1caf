use std::fmt;

use serde::Serialize;

/// Rank of a host within the job's network group.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Debug, Default, Serialize)]
pub struct HostRank(pub u32);

impl fmt::Display for HostRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Id of a worker thread local to a host (`0..workers_per_host`).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Debug, Default, Serialize)]
pub struct LocalWorkerId(pub u32);

impl fmt::Display for LocalWorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Global rank of a worker: `host_rank * workers_per_host + local_worker_id`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Debug, Default, Serialize)]
pub struct WorkerRank(pub u32);

impl fmt::Display for WorkerRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A stream id drawn from a per-local-worker monotonic sequence. Paired with
/// a [`LocalWorkerId`], `(local_worker, StreamId)` is globally unique by
/// construction because every host runs the same deterministic DAG and
/// therefore allocates ids in the same order (see §4.4 of the design).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Debug, Default, Serialize)]
pub struct StreamId(pub u64);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
