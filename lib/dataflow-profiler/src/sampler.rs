use std::sync::Arc;
use std::time::Duration;

use dataflow_block_pool::BlockPool;
use tokio::task::JoinHandle;

use crate::env::mem_profile_path;
use crate::recorder::ProfileRecorder;

/// How often the sampler takes a reading. The design doc doesn't pin this
/// down beyond "periodic"; one second matches the teacher's buffer-usage
/// reporter's order of magnitude (it reports every two seconds).
pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(1);

/// Spawns the low-priority profiler task the design's concurrency model
/// calls for: "a low-priority profiler thread that samples counters" (§5).
/// Modeled as a periodic `tokio` task rather than a dedicated OS thread,
/// gated on `THRILL_MEM_PROFILE` being set -- its absence disables periodic
/// sampling entirely (§6). Returns `None` without spawning anything when
/// the variable is unset.
pub fn spawn_mem_profile_sampler(
    recorder: Arc<ProfileRecorder>,
    pool: BlockPool,
) -> Option<JoinHandle<()>> {
    mem_profile_path()?;
    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
        loop {
            interval.tick().await;
            let sample = pool.sample_mem_profile();
            recorder.record_mem_profile(sample.total.into(), sample.float.into(), sample.base.into());
            recorder.record_block_pool(
                pool.total_bytes(),
                pool.ram_bytes(),
                pool.pinned_bytes(),
                pool.unpinned_bytes(),
                pool.swapped_bytes(),
                pool.read_speed(),
                pool.write_speed(),
            );
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn does_not_spawn_without_the_env_var() {
        std::env::remove_var(crate::env::MEM_PROFILE_ENV_VAR);
        let recorder = Arc::new(ProfileRecorder::new(dataflow_common::HostRank(0), None));
        let dir = tempdir::TempDir::new("profiler-sampler-test").unwrap();
        let config = dataflow_block_pool::BlockPoolConfig::builder(dir.path())
            .hard_cap(1024 * 1024)
            .build();
        let pool = BlockPool::new(config);
        assert!(spawn_mem_profile_sampler(recorder, pool).is_none());
    }
}
