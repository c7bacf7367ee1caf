use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpStream;
use tokio::sync::mpsc;

use dataflow_block_pool::BlockPool;
use dataflow_common::{Error as DataflowError, HostRank, LocalWorkerId, StreamId, WorkerRank};
use dataflow_data::Block;
use dataflow_profiler::{DiaId as ProfileDiaId, ProfileRecorder};

use crate::connection::{self, ConnectionReader, ConnectionWriter};
use crate::frame::{FrameHeader, Magic};
use crate::repository::{IdAllocator, Repository};
use crate::stream::{CatStream, MixStream};
use crate::stream_sink::{EgressHandle, EgressItem, LoopbackTarget, StreamSink};

/// One id's worth of per-local-worker stream objects. A stream id names one
/// shuffle, but each local worker on this host receives its own private
/// partition of it, so the repository holds one concrete `CatStream`/
/// `MixStream` per local worker per id — matching
/// `original_source/thrill/data/multiplexer.cpp`'s `StreamSet::peer()`.
struct StreamSet<T> {
    per_worker: Vec<Arc<T>>,
}

impl<T> StreamSet<T> {
    fn new(id: StreamId, workers_per_host: usize, num_peers: usize, ctor: fn(StreamId, usize) -> T) -> Self {
        Self {
            per_worker: (0..workers_per_host).map(|_| Arc::new(ctor(id, num_peers))).collect(),
        }
    }

    fn peer(&self, local_worker: LocalWorkerId) -> Arc<T> {
        Arc::clone(&self.per_worker[local_worker.0 as usize])
    }
}

struct State {
    ids: IdAllocator,
    cat: Repository<Arc<StreamSet<CatStream>>>,
    mix: Repository<Arc<StreamSet<MixStream>>>,
    egress: HashMap<HostRank, EgressHandle>,
}

/// Cumulative byte counters for one peer host's connection, plus the
/// snapshot a sampler needs to turn "bytes total" into "bytes/sec since last
/// sample" — the same reduction `dataflow_block_pool::rate::RateTracker`
/// does for pool read/write speed, generalized here to per-host network
/// traffic for the `NetManager` profile event class (§6).
struct HostTraffic {
    tx_total: AtomicU64,
    rx_total: AtomicU64,
    last_sample: parking_lot::Mutex<(Instant, u64, u64)>,
}

impl HostTraffic {
    fn new() -> Self {
        Self {
            tx_total: AtomicU64::new(0),
            rx_total: AtomicU64::new(0),
            last_sample: parking_lot::Mutex::new((Instant::now(), 0, 0)),
        }
    }

    fn record_tx(&self, bytes: u64) {
        self.tx_total.fetch_add(bytes, Ordering::Relaxed);
    }

    fn record_rx(&self, bytes: u64) {
        self.rx_total.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Returns `(tx bytes/sec, rx bytes/sec)` since the last call, then
    /// resets the snapshot.
    fn sample(&self) -> (f64, f64) {
        let tx_now = self.tx_total.load(Ordering::Relaxed);
        let rx_now = self.rx_total.load(Ordering::Relaxed);
        let mut last = self.last_sample.lock();
        let elapsed = last.0.elapsed().as_secs_f64();
        let rates = if elapsed > 0.0 {
            ((tx_now.saturating_sub(last.1)) as f64 / elapsed, (rx_now.saturating_sub(last.2)) as f64 / elapsed)
        } else {
            (0.0, 0.0)
        };
        *last = (Instant::now(), tx_now, rx_now);
        rates
    }
}

/// Single per-host object routing inbound framed blocks to the correct
/// stream and funneling outbound blocks through per-peer egress tasks
/// (§4.4).
///
/// Grounded in `original_source/thrill/data/multiplexer.cpp`: one mutex
/// guards the repository (`State` here), matching "Thread safety" in §5;
/// `OnMultiplexerHeader`'s magic-byte dispatch becomes
/// [`Multiplexer::deliver_frame`]; `CatLoopback`/`MixLoopback` become
/// [`Multiplexer::cat_sink`]/[`Multiplexer::mix_sink`] choosing a
/// [`LoopbackTarget`] instead of returning a raw queue pointer.
pub struct Multiplexer {
    host_rank: HostRank,
    workers_per_host: usize,
    num_hosts: usize,
    block_pool: BlockPool,
    state: parking_lot::Mutex<State>,
    closing: AtomicBool,
    profiler: Arc<ProfileRecorder>,
    traffic: parking_lot::Mutex<HashMap<HostRank, Arc<HostTraffic>>>,
}

impl Multiplexer {
    pub fn new(
        host_rank: HostRank,
        workers_per_host: usize,
        num_hosts: usize,
        block_pool: BlockPool,
        profiler: Arc<ProfileRecorder>,
    ) -> Arc<Self> {
        Arc::new(Self {
            host_rank,
            workers_per_host,
            num_hosts,
            block_pool,
            state: parking_lot::Mutex::new(State {
                ids: IdAllocator::new(workers_per_host),
                cat: Repository::new(),
                mix: Repository::new(),
                egress: HashMap::new(),
            }),
            closing: AtomicBool::new(false),
            profiler,
            traffic: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    fn traffic_for(&self, host: HostRank) -> Arc<HostTraffic> {
        Arc::clone(self.traffic.lock().entry(host).or_insert_with(|| Arc::new(HostTraffic::new())))
    }

    /// Samples `(tx bytes/sec total, rx bytes/sec total, tx bytes/sec per
    /// host, rx bytes/sec per host)` since the previous call, for the
    /// `NetManager` profile event class. Hosts with no connection
    /// registered yet report zero rather than being omitted, so the
    /// per-host vectors are always `num_hosts` long.
    pub fn net_rates(&self) -> (f64, f64, Vec<f64>, Vec<f64>) {
        let traffic = self.traffic.lock();
        let mut tx_per_host = vec![0.0; self.num_hosts];
        let mut rx_per_host = vec![0.0; self.num_hosts];
        for (host, entry) in traffic.iter() {
            let (tx, rx) = entry.sample();
            if let Some(slot) = tx_per_host.get_mut(host.0 as usize) {
                *slot = tx;
            }
            if let Some(slot) = rx_per_host.get_mut(host.0 as usize) {
                *slot = rx;
            }
        }
        let tx_speed = tx_per_host.iter().sum();
        let rx_speed = rx_per_host.iter().sum();
        (tx_speed, rx_speed, tx_per_host, rx_per_host)
    }

    fn num_peers(&self) -> usize {
        self.workers_per_host * self.num_hosts
    }

    fn global_rank(&self, local_worker: LocalWorkerId) -> WorkerRank {
        WorkerRank(self.host_rank.0 * self.workers_per_host as u32 + local_worker.0)
    }

    fn host_of(&self, worker: WorkerRank) -> HostRank {
        HostRank(worker.0 / self.workers_per_host as u32)
    }

    fn local_of(&self, worker: WorkerRank) -> LocalWorkerId {
        LocalWorkerId(worker.0 % self.workers_per_host as u32)
    }

    pub fn allocate_cat_stream_id(&self, local_worker: LocalWorkerId) -> StreamId {
        self.state.lock().ids.allocate_id(local_worker)
    }

    pub fn allocate_mix_stream_id(&self, local_worker: LocalWorkerId) -> StreamId {
        // Same shared counter as AllocateCatStreamId: the original routes
        // both through one `Repository::AllocateId`, which is what keeps
        // Cat and Mix stream ids from ever colliding (§9).
        self.state.lock().ids.allocate_id(local_worker)
    }

    /// Returns the `local_worker`'s instance of stream `id`, constructing it
    /// (and every other local worker's sibling instance) if this is the
    /// first reference to `id` on this host. `dia_id` is applied via the
    /// monotonic 0→n update in [`crate::stream::StreamMeta::set_dia_id`]:
    /// a stream discovered from an inbound frame before its owning DIANode
    /// is known locally is created with `dia_id == 0` and updated here once
    /// the real id is known (§4.4, §9).
    pub fn get_or_create_cat_stream(
        &self,
        id: StreamId,
        local_worker: LocalWorkerId,
        dia_id: u64,
    ) -> Result<Arc<CatStream>, DataflowError> {
        let (workers_per_host, num_peers) = (self.workers_per_host, self.num_peers());
        let (stream, is_new) = {
            let mut state = self.state.lock();
            let is_new = state.cat.get(id).is_none();
            let set = state
                .cat
                .get_or_create(id, || Arc::new(StreamSet::new(id, workers_per_host, num_peers, CatStream::new)));
            (set.peer(local_worker), is_new)
        };
        stream.meta().set_dia_id(dia_id)?;
        if is_new {
            self.profiler
                .record_stream_create(id, ProfileDiaId::from(dia_id), self.global_rank(local_worker));
        }
        Ok(stream)
    }

    pub fn get_new_cat_stream(&self, local_worker: LocalWorkerId, dia_id: u64) -> Result<Arc<CatStream>, DataflowError> {
        let id = self.allocate_cat_stream_id(local_worker);
        self.get_or_create_cat_stream(id, local_worker, dia_id)
    }

    pub fn get_or_create_mix_stream(
        &self,
        id: StreamId,
        local_worker: LocalWorkerId,
        dia_id: u64,
    ) -> Result<Arc<MixStream>, DataflowError> {
        let (workers_per_host, num_peers) = (self.workers_per_host, self.num_peers());
        let (stream, is_new) = {
            let mut state = self.state.lock();
            let is_new = state.mix.get(id).is_none();
            let set = state
                .mix
                .get_or_create(id, || Arc::new(StreamSet::new(id, workers_per_host, num_peers, MixStream::new)));
            (set.peer(local_worker), is_new)
        };
        stream.meta().set_dia_id(dia_id)?;
        if is_new {
            self.profiler
                .record_stream_create(id, ProfileDiaId::from(dia_id), self.global_rank(local_worker));
        }
        Ok(stream)
    }

    pub fn get_new_mix_stream(&self, local_worker: LocalWorkerId, dia_id: u64) -> Result<Arc<MixStream>, DataflowError> {
        let id = self.allocate_mix_stream_id(local_worker);
        self.get_or_create_mix_stream(id, local_worker, dia_id)
    }

    /// Builds the egress-side `BlockSink` a `BlockWriter` writes into for
    /// one peer of a `CatStream`'s shuffle: a direct [`LoopbackTarget`] if
    /// `to_worker` lives on this host, or a semaphore-bounded network sink
    /// otherwise (§4.3 "Loopback optimization").
    pub fn cat_sink(&self, id: StreamId, local_worker: LocalWorkerId, to_worker: WorkerRank) -> Result<StreamSink, DataflowError> {
        let sender_worker = self.global_rank(local_worker);
        if self.host_of(to_worker) == self.host_rank {
            let stream = self.get_or_create_cat_stream(id, self.local_of(to_worker), 0)?;
            Ok(StreamSink::loopback(
                id,
                Magic::CatStreamBlock,
                sender_worker,
                to_worker,
                LoopbackTarget::Cat(stream),
            ))
        } else {
            let egress = self.egress_handle(self.host_of(to_worker))?;
            Ok(StreamSink::remote(id, Magic::CatStreamBlock, sender_worker, to_worker, egress))
        }
    }

    pub fn mix_sink(&self, id: StreamId, local_worker: LocalWorkerId, to_worker: WorkerRank) -> Result<StreamSink, DataflowError> {
        let sender_worker = self.global_rank(local_worker);
        if self.host_of(to_worker) == self.host_rank {
            let stream = self.get_or_create_mix_stream(id, self.local_of(to_worker), 0)?;
            Ok(StreamSink::loopback(
                id,
                Magic::MixStreamBlock,
                sender_worker,
                to_worker,
                LoopbackTarget::Mix(stream),
            ))
        } else {
            let egress = self.egress_handle(self.host_of(to_worker))?;
            Ok(StreamSink::remote(id, Magic::MixStreamBlock, sender_worker, to_worker, egress))
        }
    }

    fn egress_handle(&self, host: HostRank) -> Result<EgressHandle, DataflowError> {
        self.state
            .lock()
            .egress
            .get(&host)
            .cloned()
            .ok_or_else(|| DataflowError::NetIo {
                host: host.0,
                source: std::io::Error::new(std::io::ErrorKind::NotConnected, "no connection registered for host"),
            })
    }

    /// Connects to `peer` and registers the resulting connection. Called
    /// once per remote host at job startup. Takes `self` by `Arc` since the
    /// dispatcher task it spawns needs its own owning handle; callers hold
    /// the multiplexer as `Arc<Multiplexer>` and clone it at the call site.
    pub async fn connect_to(self: Arc<Self>, peer: HostRank, addr: SocketAddr) -> Result<(), DataflowError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| DataflowError::NetIo { host: peer.0, source })?;
        self.register_connection(peer, stream);
        Ok(())
    }

    /// Registers an already-established connection to `peer`: spawns its
    /// egress task and its inbound dispatcher task.
    pub fn register_connection(self: Arc<Self>, peer: HostRank, stream: TcpStream) {
        let (reader, writer) = connection::split(stream, peer);
        let egress = spawn_egress_task(writer, self.traffic_for(peer));
        self.state.lock().egress.insert(peer, egress);
        self.spawn_dispatcher(reader);
    }

    fn spawn_dispatcher(self: Arc<Self>, mut reader: ConnectionReader) {
        let mux = self;
        tokio::spawn(async move {
            loop {
                if mux.closing.load(Ordering::Acquire) {
                    break;
                }
                match reader.read_frame_header().await {
                    Ok(None) => break,
                    Ok(Some(header)) => {
                        if let Err(error) = mux.handle_frame(&mut reader, header).await {
                            error!(peer = ?reader.peer(), %error, "dispatcher aborting on protocol/IO error");
                            break;
                        }
                    }
                    Err(error) => {
                        error!(peer = ?reader.peer(), %error, "connection read failed, dispatcher aborting");
                        break;
                    }
                }
            }
        });
    }

    #[instrument(skip(self, reader), level = "trace")]
    async fn handle_frame(&self, reader: &mut ConnectionReader, header: FrameHeader) -> Result<(), DataflowError> {
        let local_worker = self.local_of(header.recv_worker);

        if header.is_end_of_stream() {
            match header.magic {
                Magic::CatStreamBlock => {
                    self.get_or_create_cat_stream(header.stream_id, local_worker, 0)?
                        .close_sender(header.sender_worker);
                }
                Magic::MixStreamBlock => {
                    self.get_or_create_mix_stream(header.stream_id, local_worker, 0)?
                        .close_sender(header.sender_worker);
                }
            }
            return Ok(());
        }

        let payload = reader
            .read_payload(header.size as usize)
            .await
            .map_err(|source| DataflowError::NetIo { host: reader.peer().0, source })?;
        self.traffic_for(reader.peer()).record_rx(header.size as u64);
        // Round the pool allocation up to the next power of two (floor
        // DEFAULT_ALIGN) rather than sizing it to the exact frame, matching
        // §4.4; the block's logical length stays the true frame size.
        let alloc_size = FrameHeader::alloc_size(header.size) as usize;
        let mut buffer = payload;
        buffer.resize(alloc_size, 0);
        let pinned = self
            .block_pool
            .allocate_filled_byte_block(buffer, local_worker)
            .await
            .map_err(dataflow_common::Error::from)?;
        let block = Block::from_wire(
            pinned,
            header.size as usize,
            header.first_item,
            header.num_items,
            header.typecode_verify,
        );

        match header.magic {
            Magic::CatStreamBlock => {
                self.get_or_create_cat_stream(header.stream_id, local_worker, 0)?
                    .deliver(header.sender_worker, block);
            }
            Magic::MixStreamBlock => {
                self.get_or_create_mix_stream(header.stream_id, local_worker, 0)?
                    .deliver(header.sender_worker, block);
            }
        }
        Ok(())
    }

    /// Tears down every open connection: closes each egress channel (which
    /// drains and exits its task) and stops dispatcher tasks from accepting
    /// further frames (§5 "Cancellation": a failure tears down the running
    /// scope).
    pub fn close(&self) {
        self.closing.store(true, Ordering::Release);
        let mut state = self.state.lock();
        for set in state.cat.values() {
            for (local_worker, peer) in set.per_worker.iter().enumerate() {
                self.emit_stream_close(peer.meta(), LocalWorkerId(local_worker as u32));
            }
        }
        for set in state.mix.values() {
            for (local_worker, peer) in set.per_worker.iter().enumerate() {
                self.emit_stream_close(peer.meta(), LocalWorkerId(local_worker as u32));
            }
        }
        state.egress.clear();
    }

    /// Tx totals aren't retained centrally (each `StreamSink` is ephemeral,
    /// owned by whichever `BlockWriter` created it), so this reports only
    /// the rx side the repository actually keeps. rx itself is unified
    /// across the loopback and network paths by construction (both go
    /// through `StreamMeta::record_rx`), so the same figure is reported for
    /// both the net and int counters.
    fn emit_stream_close(&self, meta: &crate::stream::StreamMeta, local_worker: LocalWorkerId) {
        self.profiler.record_stream_close(
            meta.id(),
            ProfileDiaId::from(meta.dia_id()),
            self.global_rank(local_worker),
            meta.rx_items(),
            meta.rx_bytes(),
            meta.rx_items(),
            meta.rx_bytes(),
            0,
            0,
            0,
            0,
        );
    }
}

/// Spawns the single task that owns a connection's write half: a channel
/// consumer that writes frames in the order they were enqueued, releasing
/// each block's in-flight permit only once its write completes (§4.3).
pub(crate) fn spawn_egress_task(mut writer: ConnectionWriter, traffic: Arc<HostTraffic>) -> EgressHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<EgressItem>();
    tokio::spawn(async move {
        while let Some(item) = rx.recv().await {
            // The permit bound by `_permit` below stays alive for the whole
            // arm, including the write — it must not be released until the
            // block has actually gone out, or the semaphore would admit more
            // in-flight blocks than the connection can really absorb.
            let result = match item {
                EgressItem::Data { header, block, _permit } => {
                    let len = block.as_slice().len() as u64;
                    let result = writer.write_frame(&header, block.as_slice()).await;
                    drop(_permit);
                    if result.is_ok() {
                        traffic.record_tx(len);
                    }
                    result
                }
                EgressItem::End { header } => writer.write_frame(&header, &[]).await,
            };
            if let Err(error) = result {
                error!(peer = ?writer.peer(), %error, "egress write failed, terminating task");
                break;
            }
        }
    });
    EgressHandle { tx }
}
