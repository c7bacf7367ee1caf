//! Operator lifecycle and the scope planner: the generic bookkeeping that
//! sits underneath every concrete collection operator (map, sort,
//! reduce-by-key, ...), none of which this crate knows anything about.
//!
//! Grounded on `original_source/thrill/api/dia_node.hpp` and
//! `original_source/thrill/core/stage_builder.hpp`, restated as a tagged
//! `NodeKind` variant plus owning-parent/weak-child `Rc` edges in place of
//! the original's `shared_ptr`/raw-pointer pair (Design Notes §9).

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

#[macro_use]
extern crate tracing;

mod dia_id;
mod node;
mod stage_builder;

pub use dia_id::{DiaId, DiaIdAllocator};
pub use node::{DiaNode, NodeKind, NodeState, Operator};
pub use stage_builder::{find_stages, run_scope};
