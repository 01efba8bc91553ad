//! Test-support builder for well-formed tagged logs.
//!
//! Fixtures built here follow the same rules the decoder checks: every
//! tag header carries the parity of the running checksum at its write
//! position, payloads of non-checksum records are folded into the
//! checksum, and a commit record stores the running checksum accumulated
//! since the previous commit (including its own header).
//!
//! This crate is a dev-dependency only; the engine never writes.

use rbydfs_types::cksum::{crc32c, parity};
use rbydfs_types::encoding::{tag_bytes, to_le32, to_leb128};
use rbydfs_types::tag::{Tag, TAG_CRC};

/// Incrementally builds one rbyd log block.
#[derive(Debug, Clone)]
pub struct LogBuilder {
    data: Vec<u8>,
    crc: u32,
}

impl LogBuilder {
    /// Start a log with the given 32-bit revision counter.
    #[must_use]
    pub fn new(rev: u32) -> Self {
        let data = to_le32(rev).to_vec();
        let crc = crc32c(&data, 0);
        Self { data, crc }
    }

    /// Byte offset the next record will land at.
    #[must_use]
    pub fn off(&self) -> usize {
        self.data.len()
    }

    fn push_header(&mut self, tag: u16, w: u32, size: u32) {
        let hdr = tag_bytes(parity(self.crc), Tag(tag), w, size);
        self.crc = crc32c(&hdr, self.crc);
        self.data.extend_from_slice(&hdr);
    }

    /// Append a leaf (non-alt) record with a payload. Returns the
    /// record's offset.
    pub fn leaf(&mut self, tag: u16, w: u32, payload: &[u8]) -> usize {
        let off = self.off();
        self.push_header(tag, w, payload.len() as u32);
        self.crc = crc32c(payload, self.crc);
        self.data.extend_from_slice(payload);
        off
    }

    /// Append an alt record jumping back to `to_off`. `tag` must carry
    /// the alt bit plus any direction/color flags and the 12-bit key.
    pub fn alt(&mut self, tag: u16, w: u32, to_off: usize) -> usize {
        let off = self.off();
        assert!(tag & 0x4000 != 0, "alt record without the alt bit");
        assert!(to_off < off, "alt must jump backward");
        self.push_header(tag, w, (off - to_off) as u32);
        off
    }

    /// Append a commit (checksum) record, sealing everything since the
    /// previous commit. Returns the record's offset.
    pub fn commit(&mut self) -> usize {
        let off = self.off();
        self.push_header(TAG_CRC, 0, 4);
        // stored value covers everything up to and including this header
        let stored = self.crc;
        self.data.extend_from_slice(&to_le32(stored));
        off
    }

    /// Finish the block, padding to `block_size` with erased-flash bytes.
    #[must_use]
    pub fn finish(mut self, block_size: usize) -> Vec<u8> {
        assert!(self.data.len() <= block_size, "log overflows block");
        self.data.resize(block_size, 0xff);
        self.data
    }

    /// The raw log bytes without padding.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Encode a B-tree descriptor payload (embedded checksum, weight, trunk,
/// block).
#[must_use]
pub fn btree_ptr_bytes(weight: u32, trunk: u32, block: u32, cksum: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&to_le32(cksum));
    out.extend_from_slice(&to_leb128(weight));
    out.extend_from_slice(&to_leb128(trunk));
    out.extend_from_slice(&to_leb128(block));
    out
}

/// Encode a directory-reference payload (a redundant block set).
#[must_use]
pub fn mdir_bytes(blocks: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    for &block in blocks {
        out.extend_from_slice(&to_leb128(block));
    }
    out
}
