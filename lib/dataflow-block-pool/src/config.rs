use std::path::{Path, PathBuf};

/// Configuration for a [`crate::BlockPool`].
///
/// Mirrors the shape of `vector_buffers::disk_v2::common::DiskBufferConfig`:
/// a builder over a handful of size knobs, with the swap directory standing
/// in for that crate's `data_dir`.
#[derive(Clone, Debug)]
pub struct BlockPoolConfig {
    /// Directory swapped-out blocks are written to.
    pub(crate) swap_dir: PathBuf,
    /// Hard cap, in bytes, on pinned memory. Allocation fails once pinned
    /// usage would exceed this and no unpinned block is available to evict.
    pub(crate) hard_cap: u64,
    /// Soft cap, in bytes, on (pinned + unpinned) resident memory. Crossing
    /// it triggers eviction of unpinned LRU blocks to disk. Defaults to
    /// `hard_cap` when unset.
    pub(crate) soft_cap: u64,
}

impl BlockPoolConfig {
    pub fn builder<P: AsRef<Path>>(swap_dir: P) -> BlockPoolConfigBuilder {
        BlockPoolConfigBuilder {
            swap_dir: swap_dir.as_ref().to_path_buf(),
            hard_cap: None,
            soft_cap: None,
        }
    }

    pub fn hard_cap(&self) -> u64 {
        self.hard_cap
    }

    pub fn soft_cap(&self) -> u64 {
        self.soft_cap
    }

    pub fn swap_dir(&self) -> &Path {
        &self.swap_dir
    }
}

pub struct BlockPoolConfigBuilder {
    swap_dir: PathBuf,
    hard_cap: Option<u64>,
    soft_cap: Option<u64>,
}

impl BlockPoolConfigBuilder {
    /// Sets the hard RAM cap, in bytes. Defaults to 256 MiB.
    #[must_use]
    pub fn hard_cap(mut self, bytes: u64) -> Self {
        self.hard_cap = Some(bytes);
        self
    }

    /// Sets the soft RAM cap, in bytes. Defaults to the hard cap.
    #[must_use]
    pub fn soft_cap(mut self, bytes: u64) -> Self {
        self.soft_cap = Some(bytes);
        self
    }

    pub fn build(self) -> BlockPoolConfig {
        let hard_cap = self.hard_cap.unwrap_or(256 * 1024 * 1024);
        let soft_cap = self.soft_cap.unwrap_or(hard_cap).min(hard_cap);

        BlockPoolConfig {
            swap_dir: self.swap_dir,
            hard_cap,
            soft_cap,
        }
    }
}
