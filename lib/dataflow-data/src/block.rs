use dataflow_block_pool::PinnedByteBlock;

/// A pinned, fixed-capacity chunk of a substream's byte stream, plus the
/// bookkeeping a reader needs to find item boundaries inside it (§3 of the
/// design).
///
/// Items are not required to align with block boundaries: a `Block`'s bytes
/// may begin with the tail of an item started in a previous block. When that
/// happens `first_item_offset` names the byte offset of the first item that
/// *begins* in this block, and is `None` when no item starts here at all
/// (the whole block is continuation bytes of one very large item).
pub struct Block {
    pub(crate) bytes: PinnedByteBlock,
    /// Byte offset within `bytes` at which this block's logical content
    /// starts. The pool allocation backing `bytes` may be padded past the
    /// logical content (see [`Self::from_wire`]), so `offset + size` is not
    /// always `bytes.len()` — only `offset + size <= bytes.len()` (§3
    /// invariant).
    pub(crate) offset: usize,
    pub(crate) size: usize,
    pub(crate) first_item_offset: Option<u32>,
    pub(crate) num_items: u32,
    pub(crate) typecode_hash: u64,
}

impl Block {
    /// Builds a block that owns exactly the bytes it was handed, offset 0 —
    /// the shape a local [`crate::BlockWriter`] always produces.
    pub fn from_parts(
        bytes: PinnedByteBlock,
        first_item_offset: Option<u32>,
        num_items: u32,
        typecode_hash: u64,
    ) -> Self {
        let size = bytes.len();
        Self {
            bytes,
            offset: 0,
            size,
            first_item_offset,
            num_items,
            typecode_hash,
        }
    }

    /// Builds a block over a pool allocation that may be larger than the
    /// frame it carries — the multiplexer rounds inbound allocations up to
    /// the next power of two (§4.4) rather than sizing the pool block to the
    /// exact wire frame, so `size` here is the true payload length and may be
    /// smaller than `bytes.len()`.
    pub fn from_wire(
        bytes: PinnedByteBlock,
        size: usize,
        first_item_offset: Option<u32>,
        num_items: u32,
        typecode_hash: u64,
    ) -> Self {
        assert!(size <= bytes.len(), "frame size exceeds backing allocation");
        Self {
            bytes,
            offset: 0,
            size,
            first_item_offset,
            num_items,
            typecode_hash,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes.as_slice()[self.offset..self.offset + self.size]
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Byte offset within this block of the first item that begins here.
    /// `None` if every byte in this block belongs to an item started earlier.
    pub fn first_item_offset(&self) -> Option<u32> {
        self.first_item_offset
    }

    /// Count of items that begin somewhere in this block (not necessarily
    /// finish in it).
    pub fn num_items(&self) -> u32 {
        self.num_items
    }

    pub fn typecode_hash(&self) -> u64 {
        self.typecode_hash
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("len", &self.len())
            .field("first_item_offset", &self.first_item_offset)
            .field("num_items", &self.num_items)
            .finish()
    }
}
