use std::fmt;

use serde::Serialize;

/// Mirrors `dataflow_core::DiaId` as a bare correlation key. The profile
/// sink only ever needs to print this id next to a label; it never needs
/// the DAG itself, so it doesn't take a dependency on `dataflow-core` for
/// what amounts to one `u64`.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize)]
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

impl From<u64> for DiaId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}
