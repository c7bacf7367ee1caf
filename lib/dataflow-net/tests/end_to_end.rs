use std::time::Duration;

use std::sync::Arc;

use dataflow_block_pool::{BlockPool, BlockPoolConfig};
use dataflow_common::{HostRank, LocalWorkerId, WorkerRank};
use dataflow_data::{BlockReader, BlockWriter};
use dataflow_net::Multiplexer;
use dataflow_profiler::ProfileRecorder;

fn pool(dir: &tempdir::TempDir) -> BlockPool {
    BlockPool::new(
        BlockPoolConfig::builder(dir.path())
            .hard_cap(64 * 1024 * 1024)
            .build(),
    )
}

fn profiler(host_rank: HostRank) -> Arc<ProfileRecorder> {
    Arc::new(ProfileRecorder::new(host_rank, None))
}

/// Scenario 6 (spec §8): four senders each emit 1 000 items on one
/// `CatStream`; a single receiver sees exactly 4 000 items, the first 1 000
/// from sender 0, and so on. Exercises the multiplexer's loopback path
/// (every peer lives on the same host here) end to end.
#[tokio::test]
async fn cat_stream_four_senders_one_thousand_items_each() {
    let dir = tempdir::TempDir::new("dataflow-net-e2e").unwrap();
    let pool = pool(&dir);
    let mux = Multiplexer::new(HostRank(0), 4, 1, pool.clone(), profiler(HostRank(0)));

    let stream_id = mux.allocate_cat_stream_id(LocalWorkerId(0));
    let receiver = mux
        .get_or_create_cat_stream(stream_id, LocalWorkerId(0), 0)
        .unwrap();

    for sender in 0..4u32 {
        let sink = mux
            .cat_sink(stream_id, LocalWorkerId(sender), WorkerRank(0))
            .unwrap();
        let mut writer: BlockWriter<u64, _> =
            BlockWriter::new(pool.clone(), LocalWorkerId(sender), 4096, sink);
        for _ in 0..1000 {
            writer.put(&u64::from(sender)).await.unwrap();
        }
        writer.close().await.unwrap();
    }

    let mut reader = BlockReader::<u64>::new();
    let mut items = Vec::new();
    while let Some(block) = receiver.next().await {
        reader.feed(&block).unwrap();
        items.extend(reader.drain_ready().unwrap());
    }
    reader.finish().unwrap();

    assert_eq!(items.len(), 4000);
    for sender in 0..4u64 {
        let start = (sender * 1000) as usize;
        let end = start + 1000;
        assert!(
            items[start..end].iter().all(|&v| v == sender),
            "sender {sender}'s run was not contiguous and in rank order"
        );
    }
    assert_eq!(receiver.meta().rx_items(), 4000);
}

/// End-of-stream with zero blocks sent is well-formed and produces a
/// zero-item reader (spec §8 boundary behavior).
#[tokio::test]
async fn empty_cat_stream_yields_no_items() {
    let dir = tempdir::TempDir::new("dataflow-net-e2e").unwrap();
    let pool = pool(&dir);
    let mux = Multiplexer::new(HostRank(0), 2, 1, pool.clone(), profiler(HostRank(0)));

    let stream_id = mux.allocate_cat_stream_id(LocalWorkerId(0));
    let receiver = mux
        .get_or_create_cat_stream(stream_id, LocalWorkerId(0), 0)
        .unwrap();

    for sender in 0..2u32 {
        let sink = mux
            .cat_sink(stream_id, LocalWorkerId(sender), WorkerRank(0))
            .unwrap();
        let mut writer: BlockWriter<u64, _> =
            BlockWriter::new(pool.clone(), LocalWorkerId(sender), 4096, sink);
        writer.close().await.unwrap();
    }

    assert!(receiver.next().await.is_none());
    assert_eq!(receiver.meta().rx_items(), 0);
}

/// The same shuffle, but between two distinct hosts over a real TCP
/// connection, exercising the wire frame format end to end rather than the
/// loopback shortcut (spec §6 frame format, §4.4 dispatcher routing).
#[tokio::test]
async fn multiplexer_routes_blocks_over_a_real_tcp_connection() {
    let dir_a = tempdir::TempDir::new("dataflow-net-e2e-a").unwrap();
    let dir_b = tempdir::TempDir::new("dataflow-net-e2e-b").unwrap();
    let pool_a = pool(&dir_a);
    let pool_b = pool(&dir_b);

    let mux_a = Multiplexer::new(HostRank(0), 1, 2, pool_a.clone(), profiler(HostRank(0)));
    let mux_b = Multiplexer::new(HostRank(1), 1, 2, pool_b.clone(), profiler(HostRank(1)));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mux_b_accept = mux_b.clone();
    let accept_task = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        mux_b_accept.register_connection(HostRank(0), stream);
    });

    mux_a.clone().connect_to(HostRank(1), addr).await.unwrap();
    accept_task.await.unwrap();
    // Give the dispatcher a moment to register before the first frame lands.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stream_id = mux_a.allocate_cat_stream_id(LocalWorkerId(0));
    let receiver = mux_b
        .get_or_create_cat_stream(stream_id, LocalWorkerId(0), 0)
        .unwrap();

    let sink = mux_a
        .cat_sink(stream_id, LocalWorkerId(0), WorkerRank(1))
        .unwrap();
    let mut writer: BlockWriter<u64, _> = BlockWriter::new(pool_a.clone(), LocalWorkerId(0), 4096, sink);
    for value in 0..100u64 {
        writer.put(&value).await.unwrap();
    }
    writer.close().await.unwrap();

    let mut reader = BlockReader::<u64>::new();
    let mut items = Vec::new();
    while let Some(block) = receiver.next().await {
        reader.feed(&block).unwrap();
        items.extend(reader.drain_ready().unwrap());
    }
    reader.finish().unwrap();

    assert_eq!(items, (0..100).collect::<Vec<_>>());
}
