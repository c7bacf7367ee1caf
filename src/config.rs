//! Host-process configuration: a `serde`-deserializable layer loaded from an
//! optional TOML file and overridden by CLI flags, in the style of
//! `vector_buffers::config` (SPEC_FULL §1 "Ambient stack").

use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use snafu::{ResultExt, Snafu};

use crate::cli::Cli;

fn default_workers_per_host() -> u32 {
    1
}

fn default_hard_cap_mb() -> u64 {
    256
}

/// Configuration for one host process in the job. `peers[host_rank]` is
/// this host's own listen address; every other entry is a peer this host
/// either dials out to or accepts a connection from, depending on rank
/// order (§5 "Concurrency & resource model").
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub host_rank: u32,
    pub peers: Vec<SocketAddr>,
    #[serde(default = "default_workers_per_host")]
    pub workers_per_host: u32,
    pub data_dir: PathBuf,
    #[serde(default = "default_hard_cap_mb")]
    pub hard_cap_mb: u64,
    pub soft_cap_mb: Option<u64>,
    pub profile_log: Option<PathBuf>,
    pub metrics_addr: Option<SocketAddr>,
}

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("failed to read config file {path:?}: {source}"))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse config file {path:?}: {source}"))]
    ParseFile {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display("no config file given and --host-rank/--peer/--data-dir were not all supplied"))]
    Incomplete,

    #[snafu(display("host_rank {host_rank} is out of range for {peer_count} peers"))]
    RankOutOfRange { host_rank: u32, peer_count: usize },
}

impl EngineConfig {
    /// Loads the base config from `--config` if given, then applies every
    /// CLI override on top. A config file is optional: a single-host run
    /// can be fully specified on the command line.
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = match &cli.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
                toml::from_str(&text).context(ParseFileSnafu { path })?
            }
            None => Self {
                host_rank: 0,
                peers: Vec::new(),
                workers_per_host: default_workers_per_host(),
                data_dir: PathBuf::new(),
                hard_cap_mb: default_hard_cap_mb(),
                soft_cap_mb: None,
                profile_log: None,
                metrics_addr: None,
            },
        };

        if let Some(host_rank) = cli.host_rank {
            config.host_rank = host_rank;
        }
        if !cli.peers.is_empty() {
            config.peers = cli.peers.clone();
        }
        if let Some(workers_per_host) = cli.workers_per_host {
            config.workers_per_host = workers_per_host;
        }
        if let Some(data_dir) = &cli.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Some(hard_cap_mb) = cli.hard_cap_mb {
            config.hard_cap_mb = hard_cap_mb;
        }
        if cli.soft_cap_mb.is_some() {
            config.soft_cap_mb = cli.soft_cap_mb;
        }
        if let Some(profile_log) = &cli.profile_log {
            config.profile_log = Some(profile_log.clone());
        }
        if cli.metrics_addr.is_some() {
            config.metrics_addr = cli.metrics_addr;
        }

        if config.peers.is_empty() || config.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::Incomplete);
        }
        if config.host_rank as usize >= config.peers.len() {
            return Err(ConfigError::RankOutOfRange {
                host_rank: config.host_rank,
                peer_count: config.peers.len(),
            });
        }

        Ok(config)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.peers[self.host_rank as usize]
    }

    pub fn hard_cap_bytes(&self) -> u64 {
        self.hard_cap_mb * 1024 * 1024
    }

    pub fn soft_cap_bytes(&self) -> Option<u64> {
        self.soft_cap_mb.map(|mb| mb * 1024 * 1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["dataflow-engine"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn rejects_an_incomplete_configuration() {
        let cli = cli(&["--host-rank", "0"]);
        assert!(matches!(EngineConfig::from_cli(&cli), Err(ConfigError::Incomplete)));
    }

    #[test]
    fn builds_a_single_host_config_from_flags_alone() {
        let cli = cli(&[
            "--host-rank", "0",
            "--peer", "127.0.0.1:9000",
            "--data-dir", "/tmp/dataflow-engine-test",
        ]);
        let config = EngineConfig::from_cli(&cli).unwrap();
        assert_eq!(config.host_rank, 0);
        assert_eq!(config.peers.len(), 1);
        assert_eq!(config.workers_per_host, 1);
        assert_eq!(config.hard_cap_bytes(), 256 * 1024 * 1024);
    }

    #[test]
    fn rejects_a_rank_beyond_the_peer_list() {
        let cli = cli(&[
            "--host-rank", "3",
            "--peer", "127.0.0.1:9000",
            "--data-dir", "/tmp/dataflow-engine-test",
        ]);
        assert!(matches!(
            EngineConfig::from_cli(&cli),
            Err(ConfigError::RankOutOfRange { host_rank: 3, peer_count: 1 })
        ));
    }
}
