use bytes::{Buf, BufMut};
use dataflow_common::{StreamId, WorkerRank};
use snafu::Snafu;

/// Minimum alignment the multiplexer rounds incoming allocation sizes up to,
/// matching `THRILL_DEFAULT_ALIGN` in the original C++ runtime.
pub const DEFAULT_ALIGN: u32 = 16 * 1024;

/// Wire-level tag distinguishing which stream flavor a frame belongs to
/// (§6: "magic ∈ {CatStreamBlock=1, MixStreamBlock=2}; any other value is a
/// hard error").
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u8)]
pub enum Magic {
    CatStreamBlock = 1,
    MixStreamBlock = 2,
}

impl Magic {
    fn from_u8(byte: u8) -> Result<Self, FrameError> {
        match byte {
            1 => Ok(Magic::CatStreamBlock),
            2 => Ok(Magic::MixStreamBlock),
            other => Err(FrameError::BadMagic { byte: other }),
        }
    }
}

#[derive(Debug, Snafu)]
pub enum FrameError {
    #[snafu(display("unknown magic byte {byte}"))]
    BadMagic { byte: u8 },
    #[snafu(display("truncated frame header: need {need} bytes, have {have}"))]
    Truncated { need: usize, have: usize },
}

/// The fixed-size frame header that precedes every block on the wire
/// (§6). `size == 0 && num_items == 0` denotes end-of-stream for the
/// `(stream_id, sender_worker)` pair; `typecode_verify == 0` means "no check
/// requested".
#[derive(Copy, Clone, Debug)]
pub struct FrameHeader {
    pub magic: Magic,
    pub stream_id: StreamId,
    pub size: u32,
    pub num_items: u32,
    pub first_item: Option<u32>,
    pub typecode_verify: u64,
    pub sender_worker: WorkerRank,
    pub recv_worker: WorkerRank,
}

/// Encoded header length in bytes: magic(1) + stream_id(8) + size(4) +
/// num_items(4) + first_item(4) + typecode_verify(8) + sender(4) + recv(4).
pub const HEADER_LEN: usize = 1 + 8 + 4 + 4 + 4 + 8 + 4 + 4;

/// Sentinel stored on the wire for "no item begins in this block".
const NO_ITEM_START: u32 = u32::MAX;

impl FrameHeader {
    pub fn is_end_of_stream(&self) -> bool {
        self.size == 0 && self.num_items == 0
    }

    pub fn end_of_stream(
        magic: Magic,
        stream_id: StreamId,
        sender_worker: WorkerRank,
        recv_worker: WorkerRank,
    ) -> Self {
        Self {
            magic,
            stream_id,
            size: 0,
            num_items: 0,
            first_item: None,
            typecode_verify: 0,
            sender_worker,
            recv_worker,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u8(self.magic as u8);
        buf.put_u64(self.stream_id.0);
        buf.put_u32(self.size);
        buf.put_u32(self.num_items);
        buf.put_u32(self.first_item.unwrap_or(NO_ITEM_START));
        buf.put_u64(self.typecode_verify);
        buf.put_u32(self.sender_worker.0);
        buf.put_u32(self.recv_worker.0);
    }

    pub fn decode<B: Buf>(mut buf: B) -> Result<Self, FrameError> {
        if buf.remaining() < HEADER_LEN {
            return Err(FrameError::Truncated {
                need: HEADER_LEN,
                have: buf.remaining(),
            });
        }
        let magic = Magic::from_u8(buf.get_u8())?;
        let stream_id = StreamId(buf.get_u64());
        let size = buf.get_u32();
        let num_items = buf.get_u32();
        let raw_first_item = buf.get_u32();
        let first_item = if raw_first_item == NO_ITEM_START {
            None
        } else {
            Some(raw_first_item)
        };
        let typecode_verify = buf.get_u64();
        let sender_worker = WorkerRank(buf.get_u32());
        let recv_worker = WorkerRank(buf.get_u32());
        Ok(Self {
            magic,
            stream_id,
            size,
            num_items,
            first_item,
            typecode_verify,
            sender_worker,
            recv_worker,
        })
    }

    /// Rounds `size` up to the next power of two, with a floor of
    /// [`DEFAULT_ALIGN`] (§4.4: "allocates a byte block sized to the next
    /// power of two ≥ frame size").
    pub fn alloc_size(size: u32) -> u32 {
        size.max(DEFAULT_ALIGN).next_power_of_two()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let header = FrameHeader {
            magic: Magic::CatStreamBlock,
            stream_id: StreamId(42),
            size: 1024,
            num_items: 3,
            first_item: Some(12),
            typecode_verify: 0xdead_beef,
            sender_worker: WorkerRank(1),
            recv_worker: WorkerRank(2),
        };
        let mut buf = Vec::new();
        header.encode(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);

        let decoded = FrameHeader::decode(&buf[..]).unwrap();
        assert_eq!(decoded.stream_id, header.stream_id);
        assert_eq!(decoded.size, header.size);
        assert_eq!(decoded.first_item, header.first_item);
        assert_eq!(decoded.typecode_verify, header.typecode_verify);
    }

    #[test]
    fn no_item_start_round_trips_as_none() {
        let header = FrameHeader {
            first_item: None,
            ..FrameHeader::end_of_stream(Magic::MixStreamBlock, StreamId(1), WorkerRank(0), WorkerRank(1))
        };
        let mut buf = Vec::new();
        header.encode(&mut buf);
        let decoded = FrameHeader::decode(&buf[..]).unwrap();
        assert_eq!(decoded.first_item, None);
    }

    #[test]
    fn end_of_stream_detected_by_zero_size_and_items() {
        let header = FrameHeader::end_of_stream(Magic::CatStreamBlock, StreamId(5), WorkerRank(0), WorkerRank(1));
        assert!(header.is_end_of_stream());
    }

    #[test]
    fn rejects_unknown_magic() {
        let mut buf = vec![9u8];
        buf.extend_from_slice(&[0u8; HEADER_LEN - 1]);
        assert!(FrameHeader::decode(&buf[..]).is_err());
    }

    #[test]
    fn alloc_size_rounds_up_to_power_of_two_with_floor() {
        assert_eq!(FrameHeader::alloc_size(1), DEFAULT_ALIGN);
        assert_eq!(FrameHeader::alloc_size(DEFAULT_ALIGN + 1), (DEFAULT_ALIGN + 1).next_power_of_two());
    }
}
