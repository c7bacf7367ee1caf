use dataflow_block_pool::{BlockPool, BlockPoolConfig};
use dataflow_common::LocalWorkerId;
use dataflow_data::{BlockReader, BlockWriter, VecBlockSink};

fn worker() -> LocalWorkerId {
    LocalWorkerId(0)
}

fn pool(dir: &tempdir::TempDir) -> BlockPool {
    BlockPool::new(
        BlockPoolConfig::builder(dir.path())
            .hard_cap(64 * 1024 * 1024)
            .build(),
    )
}

/// Items that each fit comfortably within one block never need to span.
#[tokio::test]
async fn small_items_round_trip_within_one_block() {
    let dir = tempdir::TempDir::new("dataflow-data").unwrap();
    let mut writer: BlockWriter<u64, VecBlockSink> =
        BlockWriter::new(pool(&dir), worker(), 256, VecBlockSink::new());

    for value in 0u64..10 {
        writer.put(&value).await.unwrap();
    }
    let sink = writer.into_sink().await.unwrap();

    let mut reader = BlockReader::<u64>::new();
    for block in sink.blocks() {
        reader.feed(block).unwrap();
    }
    let items = reader.drain_ready().unwrap();
    assert_eq!(items, (0u64..10).collect::<Vec<_>>());
}

/// A block size far smaller than one encoded item forces every item to span
/// several blocks; the reader must reassemble them transparently (§4.2).
#[tokio::test]
async fn large_items_span_multiple_blocks() {
    let dir = tempdir::TempDir::new("dataflow-data").unwrap();
    // u64 encodes as a 4-byte length prefix plus an 8-byte payload (12
    // bytes); a 5-byte block forces every item across 2-3 blocks.
    let mut writer: BlockWriter<u64, VecBlockSink> =
        BlockWriter::new(pool(&dir), worker(), 5, VecBlockSink::new());

    let values: Vec<u64> = (0..20).collect();
    for value in &values {
        writer.put(value).await.unwrap();
    }
    let sink = writer.into_sink().await.unwrap();
    let blocks = sink.blocks();
    assert!(blocks.len() > values.len(), "expected many small blocks");

    // Some interior blocks should have no item starting in them at all.
    assert!(blocks.iter().any(|b| b.first_item_offset().is_none()));

    let mut reader = BlockReader::<u64>::new();
    for block in blocks {
        reader.feed(block).unwrap();
    }
    let items = reader.drain_ready().unwrap();
    assert_eq!(items, values);
    reader.finish().unwrap();
}

#[tokio::test]
async fn reader_rejects_mismatched_typecode() {
    let dir = tempdir::TempDir::new("dataflow-data").unwrap();
    let mut writer: BlockWriter<u64, VecBlockSink> =
        BlockWriter::new(pool(&dir), worker(), 64, VecBlockSink::new());
    writer.put(&7u64).await.unwrap();
    let sink = writer.into_sink().await.unwrap();
    let blocks = sink.blocks();

    let mut reader = BlockReader::<String>::new();
    let result = reader.feed(&blocks[0]);
    assert!(result.is_err());
}
