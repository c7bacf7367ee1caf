//! Profiling and observability glue: the `ProfileEvent` taxonomy, the
//! recorder that fans each event out to `metrics` and an optional NDJSON
//! sink, the periodic memory-profile sampler task, and a `/proc` reader for
//! the `LinuxProcStats` class. `NetManager` figures live outside this crate
//! (the multiplexer computes them) since this crate deliberately carries no
//! dependency on `dataflow-net`.
//!
//! Grounded on the teacher's `internal_events` + `metrics` pairing (every
//! subsystem emits a typed event, one place turns it into gauges/counters)
//! and on `THRILL_MEM_PROFILE` from the original runtime for the sampler's
//! gating (Design Notes §6).

#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]

#[macro_use]
extern crate tracing;

mod dia_id;
mod env;
mod event;
mod linux_stats;
mod recorder;
mod sampler;
mod writer;

pub use dia_id::DiaId;
pub use env::{mem_profile_path, MEM_PROFILE_ENV_VAR};
pub use event::{
    DiaBaseEvent, FileEvent, OhlcRecord, ProfileEvent, ProfileRecord, StageBuilderEvent,
    StreamEvent,
};
pub use linux_stats::{LinuxProcSample, LinuxProcSampler};
pub use recorder::ProfileRecorder;
pub use sampler::{spawn_mem_profile_sampler, SAMPLE_INTERVAL};
pub use writer::ProfileWriter;
