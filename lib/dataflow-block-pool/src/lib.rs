//! The block pool: the substrate for every byte buffer moving through the
//! runtime (materialized files, in-flight shuffle blocks alike).
//!
//! Grounded on `vector_buffers::variants::disk_v2::ledger::Ledger` for the
//! counters-plus-`Notify` coordination pattern, generalized here from
//! "writer/reader progress" to "pin/unpin/evict/swap-in progress" against a
//! soft and hard RAM budget (§4.1 of the design).

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

#[macro_use]
extern crate tracing;

mod byte_block;
mod config;
mod ledger;
mod pool;
mod profile;
mod rate;

pub use byte_block::{PinnedByteBlock, SwapState};
pub use config::BlockPoolConfig;
pub use pool::{BlockId, BlockPool, PoolError};
pub use profile::{MemProfileSample, Ohlc};
