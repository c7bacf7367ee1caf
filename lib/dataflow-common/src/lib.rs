//! Support types shared by every layer of the dataflow runtime: the error
//! enum raised at scope boundaries, and small worker/host identifiers
//! threaded through the DAG, block pool, and multiplexer alike.

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod ids;

pub use error::{Error, Result};
pub use ids::{HostRank, LocalWorkerId, StreamId, WorkerRank};
