//! Tag model and binary primitives for the rbydfs on-disk format.
//!
//! Everything here is a pure function over byte slices or a plain value
//! type: the CRC-32C fold and its parity bit, the little-endian and
//! leb128 codecs, the tag-record codec, and the payload codecs for
//! B-tree pointers and directory block lists. No module in this crate
//! touches storage.

pub mod cksum;
pub mod encoding;
pub mod payload;
pub mod tag;

pub use payload::{mdir_blocks, BtreePtr};
pub use tag::{tag_repr, Tag, TagKind};
