//! Host-level wiring: the one object a running host process holds,
//! bundling the block pool, the multiplexer, the profile recorder, and the
//! DAG's id allocator (Design Notes §9: "pass the pool by shared reference
//! through a host-level Context object; tests construct isolated contexts").

use std::sync::Arc;

use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use dataflow_block_pool::{BlockPool, BlockPoolConfig};
use dataflow_common::HostRank;
use dataflow_core::DiaIdAllocator;
use dataflow_net::Multiplexer;
use dataflow_profiler::{ProfileRecorder, ProfileWriter};

use crate::config::EngineConfig;

#[derive(Debug, Snafu)]
pub enum BootstrapError {
    #[snafu(display("failed to create data directory {path:?}: {source}"))]
    CreateDataDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to open profile log {path:?}: {source}"))]
    OpenProfileLog {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to bind listener on {addr}: {source}"))]
    Bind {
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    #[snafu(display("failed to connect to host {peer} at {addr}: {source}"))]
    Connect {
        peer: u32,
        addr: std::net::SocketAddr,
        source: std::io::Error,
    },

    #[snafu(display("handshake with host {peer} failed: {source}"))]
    Handshake {
        peer: u32,
        source: std::io::Error,
    },
}

/// Everything one host process needs to run its share of the job.
pub struct Context {
    pub host_rank: HostRank,
    pub pool: BlockPool,
    pub multiplexer: Arc<Multiplexer>,
    pub profiler: Arc<ProfileRecorder>,
    pub dia_ids: DiaIdAllocator,
    acceptor: Option<JoinHandle<()>>,
}

impl Context {
    /// Brings up the block pool, multiplexer, and profiler for `config`, then
    /// connects this host to the rest of the job.
    ///
    /// Connection setup follows a fixed rank order to avoid every pair of
    /// hosts racing to dial each other: host `i` listens for the `i` hosts
    /// ranked below it and dials out to every host ranked above it. A host
    /// with no peers below or above it (the single-host case) does neither.
    pub async fn bootstrap(config: EngineConfig) -> Result<Self, BootstrapError> {
        std::fs::create_dir_all(&config.data_dir).context(CreateDataDirSnafu {
            path: config.data_dir.clone(),
        })?;

        let mut pool_config = BlockPoolConfig::builder(&config.data_dir).hard_cap(config.hard_cap_bytes());
        if let Some(soft_cap) = config.soft_cap_bytes() {
            pool_config = pool_config.soft_cap(soft_cap);
        }
        let pool = BlockPool::new(pool_config.build());

        let writer = match &config.profile_log {
            Some(path) => Some(Arc::new(
                ProfileWriter::create(path).context(OpenProfileLogSnafu { path: path.clone() })?,
            )),
            None => None,
        };
        let profiler = Arc::new(ProfileRecorder::new(HostRank(config.host_rank), writer));

        let multiplexer = Multiplexer::new(
            HostRank(config.host_rank),
            config.workers_per_host as usize,
            config.peers.len(),
            pool.clone(),
            profiler.clone(),
        );

        let listen_addr = config.listen_addr();
        let listener = TcpListener::bind(listen_addr)
            .await
            .context(BindSnafu { addr: listen_addr })?;
        info!(%listen_addr, host_rank = config.host_rank, "bound listener");

        let expected_inbound = config.host_rank as usize;
        let acceptor = if expected_inbound > 0 {
            let mux = Arc::clone(&multiplexer);
            Some(tokio::spawn(async move {
                for _ in 0..expected_inbound {
                    match accept_one(&listener).await {
                        Ok((peer, stream)) => {
                            info!(peer = peer.0, "accepted inbound connection");
                            Arc::clone(&mux).register_connection(peer, stream);
                        }
                        Err(error) => {
                            error!(%error, "failed to accept an expected inbound connection");
                            break;
                        }
                    }
                }
            }))
        } else {
            None
        };

        for (rank, addr) in config.peers.iter().enumerate().skip(config.host_rank as usize + 1) {
            let peer = HostRank(rank as u32);
            let stream = connect_and_handshake(config.host_rank, peer, *addr).await?;
            info!(peer = rank, %addr, "connected outbound");
            Arc::clone(&multiplexer).register_connection(peer, stream);
        }

        Ok(Self {
            host_rank: HostRank(config.host_rank),
            pool,
            multiplexer,
            profiler,
            dia_ids: DiaIdAllocator::new(),
            acceptor,
        })
    }

    /// Tears the multiplexer down and waits for the acceptor task (if any)
    /// to drain.
    pub async fn shutdown(self) {
        self.multiplexer.close();
        if let Some(acceptor) = self.acceptor {
            acceptor.abort();
        }
    }
}

async fn accept_one(listener: &TcpListener) -> std::io::Result<(HostRank, TcpStream)> {
    let (mut stream, _) = listener.accept().await?;
    let rank = stream.read_u32().await?;
    Ok((HostRank(rank), stream))
}

async fn connect_and_handshake(
    own_rank: u32,
    peer: HostRank,
    addr: std::net::SocketAddr,
) -> Result<TcpStream, BootstrapError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .context(ConnectSnafu { peer: peer.0, addr })?;
    stream
        .write_u32(own_rank)
        .await
        .context(HandshakeSnafu { peer: peer.0 })?;
    Ok(stream)
}
