use async_trait::async_trait;

use crate::block::Block;

/// Destination for sealed blocks. Implemented by the network stream sink in
/// the multiplexer layer, and by [`VecBlockSink`] here for tests and for
/// writers that materialize entirely in memory.
///
/// Mirrors the role of `BlockSink` in the original C++ runtime: `BlockWriter`
/// knows nothing about where its blocks end up, only that it can hand them
/// off and eventually signal end of stream.
#[async_trait]
pub trait BlockSink: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    async fn accept(&mut self, block: Block) -> Result<(), Self::Error>;

    async fn close(&mut self) -> Result<(), Self::Error>;
}

/// An in-memory sink that simply collects every sealed block, in order.
#[derive(Default)]
pub struct VecBlockSink {
    blocks: Vec<Block>,
    closed: bool,
}

impl VecBlockSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl BlockSink for VecBlockSink {
    type Error = std::convert::Infallible;

    async fn accept(&mut self, block: Block) -> Result<(), Self::Error> {
        self.blocks.push(block);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Self::Error> {
        self.closed = true;
        Ok(())
    }
}
