//! The two periodic profile classes that need data from outside
//! `dataflow-profiler` itself: `NetManager` (from the multiplexer's byte
//! counters) and `LinuxProcStats` (from `/proc`). Kept in the binary rather
//! than the profiler crate because pulling in a `Multiplexer` reference
//! would give `dataflow-profiler` a dependency on `dataflow-net`, the
//! reverse of every other dependency edge between those two crates.
//!
//! Gated on the same `THRILL_MEM_PROFILE` env var as
//! [`dataflow_profiler::spawn_mem_profile_sampler`] and run on the same
//! interval, since both are the one "periodic profiler thread" the design
//! calls for (§5/§6) split across two tasks only by dependency direction.

use std::sync::Arc;

use dataflow_net::Multiplexer;
use dataflow_profiler::{LinuxProcSampler, ProfileRecorder, SAMPLE_INTERVAL};
use tokio::task::JoinHandle;

pub fn spawn_host_stats_sampler(recorder: Arc<ProfileRecorder>, multiplexer: Arc<Multiplexer>) -> Option<JoinHandle<()>> {
    dataflow_profiler::mem_profile_path()?;
    Some(tokio::spawn(async move {
        let mut proc_sampler = LinuxProcSampler::new();
        let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
        loop {
            interval.tick().await;

            let (tx_speed, rx_speed, tx_per_host, rx_per_host) = multiplexer.net_rates();
            recorder.record_net_manager(tx_speed, rx_speed, tx_per_host, rx_per_host);

            if let Some(sample) = proc_sampler.sample() {
                recorder.record_linux_proc_stats(
                    sample.cpu_user,
                    sample.cpu_sys,
                    sample.pr_rss,
                    sample.net_tx_speed,
                    sample.net_rx_speed,
                    sample.diskstats,
                );
            }
        }
    }))
}
