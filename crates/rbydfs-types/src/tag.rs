//! Tag types and classification.
//!
//! A tag is the 15-bit type field of a log record (bit 15 of the on-disk
//! header is the valid-parity bit and is stripped during decode). The
//! reserved ranges distinguish superblock kinds, name kinds, structural
//! kinds, attribute namespaces, checksum records, and alt (branch)
//! records; alt records pack direction and color sub-flags into the type
//! itself.

use std::fmt;

pub const TAG_NULL: u16 = 0x0000;
pub const TAG_SUPERMAGIC: u16 = 0x0003;
pub const TAG_SUPERCONFIG: u16 = 0x0004;
pub const TAG_NAME: u16 = 0x0100;
pub const TAG_BRANCH: u16 = 0x0100;
pub const TAG_REG: u16 = 0x0101;
pub const TAG_DIR: u16 = 0x0102;
pub const TAG_STRUCT: u16 = 0x0300;
pub const TAG_INLINED: u16 = 0x0300;
pub const TAG_BLOCK: u16 = 0x0302;
pub const TAG_BTREE: u16 = 0x0303;
pub const TAG_MROOT: u16 = 0x0304;
pub const TAG_MDIR: u16 = 0x0305;
pub const TAG_MTREE: u16 = 0x0306;
pub const TAG_UATTR: u16 = 0x0400;
pub const TAG_SATTR: u16 = 0x0500;
pub const TAG_CRC: u16 = 0x2000;
pub const TAG_FCRC: u16 = 0x2100;
pub const TAG_ALT: u16 = 0x4000;

/// Alt direction flag: greater-than orientation.
pub const TAG_ALT_GT: u16 = 0x2000;
/// Alt color flag: red-capable.
pub const TAG_ALT_RED: u16 = 0x1000;

/// A decoded 15-bit tag type.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Tag(pub u16);

/// Closed classification of the reserved tag ranges, computed once per
/// record at decode time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Null,
    SuperMagic,
    SuperConfig,
    Name,
    Struct,
    UAttr,
    SAttr,
    Crc,
    Fcrc,
    Alt,
    Other,
}

impl Tag {
    /// Raw 15-bit type value.
    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == TAG_NULL
    }

    /// Alt (branch) record?
    #[must_use]
    pub const fn is_alt(self) -> bool {
        self.0 & TAG_ALT != 0
    }

    /// Greater-than orientation of an alt record.
    #[must_use]
    pub const fn is_gt(self) -> bool {
        self.0 & TAG_ALT_GT != 0
    }

    /// Red-capable flag of an alt record.
    #[must_use]
    pub const fn is_red(self) -> bool {
        self.0 & TAG_ALT_RED != 0
    }

    /// The 12-bit key used for ordering comparisons during descent.
    #[must_use]
    pub const fn key(self) -> u16 {
        self.0 & 0x0fff
    }

    /// Checksum record carrying a stored checksum value. The decoder
    /// must not fold such a record's payload into the running checksum.
    #[must_use]
    pub const fn is_crc(self) -> bool {
        self.0 & 0xff00 == TAG_CRC
    }

    /// Anywhere in the checksum-family range (crc and fcrc variants).
    /// Records in this range never participate in trunk tracking.
    #[must_use]
    pub const fn in_cksum_range(self) -> bool {
        self.0 & 0xe000 == 0x2000
    }

    /// Name-kind record (branch/reg/dir names).
    #[must_use]
    pub const fn is_name(self) -> bool {
        self.0 & 0xff00 == TAG_NAME
    }

    #[must_use]
    pub fn kind(self) -> TagKind {
        let t = self.0;
        if t & TAG_ALT != 0 {
            TagKind::Alt
        } else if t == TAG_NULL {
            TagKind::Null
        } else if t == TAG_SUPERMAGIC {
            TagKind::SuperMagic
        } else if t == TAG_SUPERCONFIG {
            TagKind::SuperConfig
        } else if t & 0xff00 == TAG_NAME {
            TagKind::Name
        } else if t & 0xff00 == TAG_STRUCT {
            TagKind::Struct
        } else if t & 0xff00 == TAG_UATTR {
            TagKind::UAttr
        } else if t & 0xff00 == TAG_SATTR {
            TagKind::SAttr
        } else if t & 0xff00 == TAG_CRC {
            TagKind::Crc
        } else if t == TAG_FCRC {
            TagKind::Fcrc
        } else {
            TagKind::Other
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({:#06x})", self.0)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}", self.0)
    }
}

/// Human-readable rendering of a tag record, used by tracing events and
/// tests. `jump` is the backward offset for alt records, when known.
#[must_use]
pub fn tag_repr(tag: Tag, w: u32, size: u32, jump: Option<u32>) -> String {
    let t = tag.0;
    let w_part = |w: u32| if w != 0 { format!(" w{w}") } else { String::new() };
    match tag.kind() {
        TagKind::Null => format!(
            "null{}{}",
            w_part(w),
            if size != 0 {
                format!(" {size}")
            } else {
                String::new()
            }
        ),
        TagKind::SuperMagic => format!("supermagic{} {size}", w_part(w)),
        TagKind::SuperConfig => format!("superconfig{} {size}", w_part(w)),
        TagKind::Name => {
            let name = match t {
                TAG_BRANCH => "branch".to_owned(),
                TAG_REG => "reg".to_owned(),
                TAG_DIR => "dir".to_owned(),
                _ => format!("name 0x{:02x}", t & 0xff),
            };
            format!("{name}{} {size}", w_part(w))
        }
        TagKind::Struct => {
            let name = match t {
                TAG_INLINED => "inlined".to_owned(),
                TAG_BLOCK => "block".to_owned(),
                TAG_BTREE => "btree".to_owned(),
                TAG_MROOT => "mroot".to_owned(),
                TAG_MDIR => "mdir".to_owned(),
                TAG_MTREE => "mtree".to_owned(),
                _ => format!("struct 0x{:02x}", t & 0xff),
            };
            format!("{name}{} {size}", w_part(w))
        }
        TagKind::UAttr => format!("uattr 0x{:02x}{} {size}", t & 0xff, w_part(w)),
        TagKind::SAttr => format!("sattr 0x{:02x}{} {size}", t & 0xff, w_part(w)),
        TagKind::Crc => format!(
            "crc{}{} {size}",
            t & 0x1,
            if w > 0 {
                format!(" 0x{w:x}")
            } else {
                String::new()
            }
        ),
        TagKind::Fcrc => format!(
            "fcrc{} {size}",
            if w > 0 {
                format!(" 0x{w:x}")
            } else {
                String::new()
            }
        ),
        TagKind::Alt => format!(
            "alt{}{} 0x{:x} w{} {}",
            if tag.is_red() { "r" } else { "b" },
            if tag.is_gt() { "gt" } else { "le" },
            tag.key(),
            w,
            match jump {
                Some(j) => format!("-{j}"),
                None => format!("-{size}"),
            }
        ),
        TagKind::Other => format!("0x{t:04x} w{w} {size}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alt_flags() {
        let alt = Tag(TAG_ALT | TAG_ALT_GT | TAG_ALT_RED | 0x101);
        assert!(alt.is_alt());
        assert!(alt.is_gt());
        assert!(alt.is_red());
        assert_eq!(alt.key(), 0x101);
        assert_eq!(alt.kind(), TagKind::Alt);

        let alt = Tag(TAG_ALT | 0x303);
        assert!(alt.is_alt());
        assert!(!alt.is_gt());
        assert!(!alt.is_red());
    }

    #[test]
    fn cksum_ranges() {
        assert!(Tag(TAG_CRC).is_crc());
        assert!(Tag(TAG_CRC | 1).is_crc());
        assert!(!Tag(TAG_FCRC).is_crc());
        assert!(Tag(TAG_CRC).in_cksum_range());
        assert!(Tag(TAG_FCRC).in_cksum_range());
        assert!(!Tag(TAG_REG).in_cksum_range());
        assert!(!Tag(TAG_ALT | 0x101).in_cksum_range());
    }

    #[test]
    fn kinds() {
        assert_eq!(Tag(TAG_NULL).kind(), TagKind::Null);
        assert_eq!(Tag(TAG_SUPERMAGIC).kind(), TagKind::SuperMagic);
        assert_eq!(Tag(TAG_REG).kind(), TagKind::Name);
        assert_eq!(Tag(TAG_DIR).kind(), TagKind::Name);
        assert_eq!(Tag(TAG_MTREE).kind(), TagKind::Struct);
        assert_eq!(Tag(TAG_UATTR | 0x42).kind(), TagKind::UAttr);
        assert_eq!(Tag(TAG_FCRC).kind(), TagKind::Fcrc);
        assert_eq!(Tag(0x0700).kind(), TagKind::Other);
    }

    #[test]
    fn reprs() {
        assert_eq!(tag_repr(Tag(TAG_REG), 1, 3, None), "reg w1 3");
        assert_eq!(tag_repr(Tag(TAG_MDIR), 0, 2, None), "mdir 2");
        assert_eq!(
            tag_repr(Tag(TAG_ALT | TAG_ALT_RED | 0x101), 2, 0, Some(14)),
            "altrle 0x101 w2 -14"
        );
        assert_eq!(tag_repr(Tag(TAG_CRC), 0, 4, None), "crc0 4");
    }
}
