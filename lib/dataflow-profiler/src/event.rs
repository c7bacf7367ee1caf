use dataflow_block_pool::Ohlc;
use dataflow_common::{HostRank, LocalWorkerId, StreamId, WorkerRank};
use serde::Serialize;

use crate::dia_id::DiaId;

/// Serializable mirror of [`Ohlc`] (open/high/low/close over one sampling
/// window) — the block pool crate has no reason to depend on `serde` itself,
/// so the profile sink owns the wire shape and converts into it.
#[derive(Copy, Clone, Debug, Default, Serialize)]
pub struct OhlcRecord {
    pub open: u64,
    pub high: u64,
    pub low: u64,
    pub close: u64,
}

impl From<Ohlc> for OhlcRecord {
    fn from(o: Ohlc) -> Self {
        Self {
            open: o.open,
            high: o.high,
            low: o.low,
            close: o.close,
        }
    }
}

/// One profile event class (design doc §6 table). Every class is emitted at
/// most once per sampling interval by whichever subsystem owns the counters
/// it reports.
#[derive(Debug, Serialize)]
#[serde(tag = "class")]
pub enum ProfileEvent {
    Cmdline {
        event: &'static str,
        program: String,
        argv: Vec<String>,
    },
    NetManager {
        tx_speed: f64,
        rx_speed: f64,
        tx_per_host: Vec<f64>,
        rx_per_host: Vec<f64>,
    },
    MemProfile {
        total: OhlcRecord,
        float: OhlcRecord,
        base: OhlcRecord,
    },
    BlockPool {
        total_bytes: u64,
        ram_bytes: u64,
        pinned_bytes: u64,
        unpinned_bytes: u64,
        swapped_bytes: u64,
        rd_speed: f64,
        wr_speed: f64,
    },
    LinuxProcStats {
        cpu_user: f64,
        cpu_sys: f64,
        pr_rss: u64,
        net_tx_speed: f64,
        net_rx_speed: f64,
        diskstats: String,
    },
    Stream {
        event: StreamEvent,
        id: StreamId,
        dia_id: DiaId,
        worker_rank: WorkerRank,
        rx_net_items: u64,
        rx_net_bytes: u64,
        rx_int_items: u64,
        rx_int_bytes: u64,
        tx_net_items: u64,
        tx_net_bytes: u64,
        tx_int_items: u64,
        tx_int_bytes: u64,
    },
    File {
        event: FileEvent,
        id: u64,
        dia_id: DiaId,
        items: u64,
        bytes: u64,
    },
    DiaBase {
        event: DiaBaseEvent,
        id: DiaId,
        label: String,
        r#type: String,
        parents: Vec<DiaId>,
    },
    StageBuilder {
        event: StageBuilderEvent,
        worker_rank: WorkerRank,
        id: DiaId,
        label: String,
    },
}

#[derive(Copy, Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StreamEvent {
    Create,
    Close,
}

#[derive(Copy, Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileEvent {
    Create,
    Close,
}

#[derive(Copy, Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiaBaseEvent {
    Create,
    Dispose,
    PushdataStart,
    PushdataEnd,
}

#[derive(Copy, Clone, Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageBuilderEvent {
    PushdataStart,
    PushdataEnd,
    ExecuteStart,
    ExecuteEnd,
}

/// One line of the profile log: every event carries a process-local
/// timestamp and the emitting host's rank (design doc §6: "Each record
/// includes `ts` ... and `host_rank`").
#[derive(Debug, Serialize)]
pub struct ProfileRecord {
    pub ts_micros: u64,
    pub host_rank: HostRank,
    #[serde(flatten)]
    pub event: ProfileEvent,
}
