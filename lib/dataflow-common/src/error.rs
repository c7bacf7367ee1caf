use snafu::Snafu;

/// Errors that can surface at a scope boundary (see §7 of the design).
///
/// Every crate in the workspace defines its own narrower, `snafu`-derived
/// error enum for the failures specific to that layer (e.g.
/// `dataflow_block_pool::PoolError`, `dataflow_data::WriterError<T>`); this
/// type is what those get converted into once they cross out of their owning
/// subsystem, so the stage builder has one thing to catch, log, and rethrow.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// The block pool could not satisfy an allocation and had no unpinned
    /// block left to evict.
    #[snafu(display("out of memory: could not allocate {requested} bytes"))]
    OutOfMemory { requested: u64 },

    /// A bounded sink (materialization file or network stream) hit its
    /// configured size cap on append.
    #[snafu(display("sink full: append of {attempted} bytes exceeds cap of {cap}"))]
    SinkFull { attempted: u64, cap: u64 },

    /// A socket read or write failed; the connection is considered dead.
    #[snafu(display("network I/O error on connection to host {host}: {source}"))]
    NetIo {
        host: u32,
        source: std::io::Error,
    },

    /// A malformed frame, unknown magic byte, or typecode mismatch.
    #[snafu(display("protocol violation: {reason}"))]
    ProtocolViolation { reason: String },

    /// An internal invariant was violated (pin-count underflow, a block
    /// freed with the wrong sentinel, and the like). These indicate a bug
    /// in the runtime itself, not caller misuse.
    #[snafu(display("invariant violation: {reason}"))]
    InvariantViolation { reason: String },

    /// Caller misuse: `put` after `close`, consuming an already-consumed
    /// stage without `.keep()`, and similar.
    #[snafu(display("user error: {reason}"))]
    UserError { reason: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
