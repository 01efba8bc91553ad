//! On-disk integer and tag-record codecs.
//!
//! All decoders are total: short input behaves as if zero-padded, so a
//! read that runs off the end of a block decodes to a null tag instead of
//! failing. The log scanner relies on this to treat trailing garbage as
//! end-of-log rather than as an error.

use crate::tag::Tag;

/// Read up to 4 bytes as a little-endian u32, zero-padding short input.
#[must_use]
pub fn from_le32(data: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    let n = data.len().min(4);
    raw[..n].copy_from_slice(&data[..n]);
    u32::from_le_bytes(raw)
}

/// Decode a little-endian base-128 varint: 7 data bits plus a
/// continuation bit per byte, value truncated to 32 bits.
///
/// Returns the value and the number of bytes consumed. Input that ends
/// without a terminating byte consumes the whole slice.
#[must_use]
pub fn from_leb128(data: &[u8]) -> (u32, usize) {
    let mut word: u64 = 0;
    for (i, &b) in data.iter().enumerate() {
        if 7 * i < 64 {
            word |= u64::from(b & 0x7f) << (7 * i);
        }
        word &= 0xffff_ffff;
        if b & 0x80 == 0 {
            return (word as u32, i + 1);
        }
    }
    (word as u32, data.len())
}

/// Decode a tag record header: a 2-byte big-endian word (bit 15 =
/// valid-parity, bits 0-14 = type), then weight and size as leb128.
///
/// Returns (parity, tag, weight, size, total header length). Input
/// shorter than 4 bytes is zero-padded first.
#[must_use]
pub fn from_tag(data: &[u8]) -> (bool, Tag, u32, u32, usize) {
    if data.len() >= 4 {
        from_tag_inner(data)
    } else {
        let mut pad = [0u8; 4];
        pad[..data.len()].copy_from_slice(data);
        from_tag_inner(&pad)
    }
}

fn from_tag_inner(data: &[u8]) -> (bool, Tag, u32, u32, usize) {
    let v = (u16::from(data[0]) << 8) | u16::from(data[1]);
    let (weight, d) = from_leb128(&data[2..]);
    let (size, d2) = from_leb128(&data[2 + d..]);
    (v & 0x8000 != 0, Tag(v & 0x7fff), weight, size, 2 + d + d2)
}

/// Encode a u32 as 4 little-endian bytes. Fixture/test support; the
/// engine itself never writes.
#[must_use]
pub fn to_le32(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

/// Encode a u32 as a little-endian base-128 varint.
#[must_use]
pub fn to_leb128(mut value: u32) -> Vec<u8> {
    let mut out = Vec::with_capacity(5);
    loop {
        let b = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            out.push(b | 0x80);
        } else {
            out.push(b);
            return out;
        }
    }
}

/// Encode a tag record header (parity bit, type, weight, size).
#[must_use]
pub fn tag_bytes(parity: bool, tag: Tag, weight: u32, size: u32) -> Vec<u8> {
    let v = (u16::from(parity) << 15) | (tag.0 & 0x7fff);
    let mut out = Vec::with_capacity(6);
    out.extend_from_slice(&v.to_be_bytes());
    out.extend_from_slice(&to_leb128(weight));
    out.extend_from_slice(&to_leb128(size));
    out
}
