//! Command-line entry point for one host process. Deliberately thin: the
//! engine's own job-submission tooling (cluster launch scripts, the
//! original runtime's DSL argument parsing) stays out of scope per
//! SPEC_FULL §1 — this only accepts enough to stand one host up.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[clap(name = "dataflow-engine", about = "Host process for the dataflow runtime core")]
pub struct Cli {
    /// Path to a TOML config file. CLI flags below override whatever it sets.
    #[clap(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// This host's rank within `--peer`'s order (0-based).
    #[clap(long)]
    pub host_rank: Option<u32>,

    /// One peer address per host, in rank order. Repeat for each host,
    /// including this one.
    #[clap(long = "peer", value_name = "HOST:PORT")]
    pub peers: Vec<SocketAddr>,

    /// Worker threads per host.
    #[clap(long)]
    pub workers_per_host: Option<u32>,

    /// Directory the block pool swaps evicted blocks into.
    #[clap(long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Hard RAM cap for the block pool, in MiB.
    #[clap(long)]
    pub hard_cap_mb: Option<u64>,

    /// Soft RAM cap for the block pool, in MiB. Defaults to the hard cap.
    #[clap(long)]
    pub soft_cap_mb: Option<u64>,

    /// Path to append newline-delimited JSON profile records to.
    #[clap(long, value_name = "FILE")]
    pub profile_log: Option<PathBuf>,

    /// Address to serve Prometheus-formatted metrics on. Omit to disable
    /// the exporter entirely.
    #[clap(long, value_name = "HOST:PORT")]
    pub metrics_addr: Option<SocketAddr>,
}
