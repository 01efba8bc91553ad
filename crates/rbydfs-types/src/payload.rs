//! Payload codecs for the structural record kinds.
//!
//! Two record payloads carry structure the decoders must chase: the
//! B-tree pointer (`TAG_BTREE`/`TAG_MTREE`) and the directory reference
//! (`TAG_MROOT`/`TAG_MDIR`), which is just a redundant block set.

use crate::encoding::{from_le32, from_leb128};

/// Decoded B-tree descriptor payload: a 4-byte little-endian embedded
/// checksum, then weight, trunk offset, and block id as leb128, in that
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BtreePtr {
    pub weight: u32,
    pub trunk: u32,
    pub block: u32,
    pub cksum: u32,
}

impl BtreePtr {
    #[must_use]
    pub fn parse(data: &[u8]) -> Self {
        let cksum = from_le32(data);
        let rest = data.get(4..).unwrap_or(&[]);
        let (weight, d1) = from_leb128(rest);
        let (trunk, d2) = from_leb128(rest.get(d1..).unwrap_or(&[]));
        let (block, _) = from_leb128(rest.get(d1 + d2..).unwrap_or(&[]));
        Self {
            weight,
            trunk,
            block,
            cksum,
        }
    }
}

/// Decode a directory-reference payload: the redundant block set for a
/// directory node, as a sequence of leb128 block ids.
#[must_use]
pub fn mdir_blocks(data: &[u8]) -> Vec<u32> {
    let mut blocks = Vec::new();
    let mut off = 0;
    while off < data.len() {
        let (block, d) = from_leb128(&data[off..]);
        blocks.push(block);
        off += d;
    }
    blocks
}
