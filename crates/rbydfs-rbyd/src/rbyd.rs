//! Log scanning, copy selection, and point lookup.

use rbydfs_bd::Bd;
use rbydfs_error::Result;
use rbydfs_types::cksum::{crc32c, parity};
use rbydfs_types::encoding::{from_le32, from_tag};
use rbydfs_types::Tag;
use tracing::{debug, trace};

/// Compare two 32-bit revision counters with wraparound: `a` is newer
/// than or equal to `b` when their difference, taken mod 2^32, lands in
/// the forward half of the sequence space. So 0x00000000 is newer than
/// 0xffffffff.
#[must_use]
pub fn seq_newer(a: u32, b: u32) -> bool {
    a.wrapping_sub(b) & 0x8000_0000 == 0
}

/// Clamp a byte range to the buffer. Out-of-range folds and payload
/// reads behave as if the log simply ended.
fn seg(data: &[u8], start: usize, end: usize) -> &[u8] {
    let len = data.len();
    let start = start.min(len);
    &data[start..end.clamp(start, len)]
}

/// Color of an alt record, for rendering. Yellow is a red alt whose
/// following record in the log is also red.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum AltColor {
    #[default]
    Black,
    Red,
    Yellow,
}

/// One alt record visited during a lookup descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AltStep {
    /// Offset of the alt record itself.
    pub from_off: usize,
    /// Where the descent went next: the jump target when followed, the
    /// next record in the log when not.
    pub to_off: usize,
    pub followed: bool,
    pub color: AltColor,
}

/// Result of a point lookup: the first entry at or after the query
/// position, plus the alt records crossed to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RbydLookup<'a> {
    /// Past the last entry, or the node is a sentinel.
    pub done: bool,
    pub rid: i64,
    pub tag: Tag,
    pub weight: i64,
    /// Offset of the entry's tag header.
    pub off: usize,
    pub hdr_len: usize,
    pub data: &'a [u8],
    pub path: Vec<AltStep>,
}

impl RbydLookup<'_> {
    fn done_at<'a>(rid: i64) -> RbydLookup<'a> {
        RbydLookup {
            done: true,
            rid,
            tag: Tag(0),
            weight: 0,
            off: 0,
            hdr_len: 0,
            data: &[],
            path: Vec::new(),
        }
    }
}

/// One live entry yielded by [`Rbyd::iter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RbydEntry<'a> {
    pub rid: i64,
    pub tag: Tag,
    pub weight: i64,
    pub off: usize,
    pub hdr_len: usize,
    pub data: &'a [u8],
}

/// One decoded rbyd node: a block's bytes plus the location of the most
/// recently committed tree root within them.
///
/// A node that failed to decode (no committed state at all) has a zero
/// trunk and acts as an empty tree; see [`Rbyd::is_live`]. Corruption is
/// represented this way rather than as an error so that a damaged child
/// in a larger structure only damages its own subtree.
#[derive(Debug, Clone)]
pub struct Rbyd {
    pub block: u32,
    pub data: Vec<u8>,
    /// 32-bit revision counter from the block header.
    pub rev: u32,
    /// End of the last committed data, in bytes.
    pub eoff: u32,
    /// Offset of the committed root trunk, 0 if none.
    pub trunk: u32,
    /// Total weight (id count) of the committed tree.
    pub weight: u32,
    /// Blocks holding the losing copies of a redundant pair, in cyclic
    /// order after the winner.
    pub redund_blocks: Vec<u32>,
}

impl PartialEq for Rbyd {
    fn eq(&self, other: &Self) -> bool {
        self.block == other.block && self.trunk == other.trunk
    }
}

impl Eq for Rbyd {}

impl Rbyd {
    /// Scan a block's bytes for the newest committed state.
    ///
    /// With `trunk` set, trunk tracking stops advancing past that
    /// offset, so the first commit covering it pins the node to the
    /// chain containing it; this is how B-tree branches pin a child to
    /// the exact generation their pointer was written against. The
    /// commit record still has to check out.
    ///
    /// Never fails: a block with no valid commit decodes to a sentinel
    /// with `trunk == 0`.
    #[must_use]
    pub fn parse(block: u32, data: Vec<u8>, trunk: Option<u32>) -> Self {
        let target = trunk.unwrap_or(0) as usize;
        let rev = from_le32(&data);
        let mut crc = crc32c(seg(&data, 0, 4), 0);
        let mut eoff: usize = 0;
        let mut j: usize = 4;
        // committed state, pending chain, and the chain in progress
        let mut trunk_committed: usize = 0;
        let mut weight_committed: u32 = 0;
        let mut trunk_pending: usize = 0;
        let mut weight_complete: u32 = 0;
        let mut weight_building: u32 = 0;
        let mut in_trunk = false;
        let mut trunk_eoff: Option<usize> = None;

        while j < data.len() && (target == 0 || eoff <= target) {
            let (v, tag, w, size, d) = from_tag(&data[j..]);
            if v != parity(crc) {
                break;
            }
            crc = crc32c(seg(&data, j, j + d), crc);
            j += d;
            let size = size as usize;
            if !tag.is_alt() && j + size > data.len() {
                break;
            }

            if !tag.is_alt() {
                if !tag.is_crc() {
                    crc = crc32c(seg(&data, j, j + size), crc);
                } else {
                    // commit record: compare, never fold
                    let stored = from_le32(seg(&data, j, j + 4));
                    if crc != stored {
                        break;
                    }
                    eoff = trunk_eoff.unwrap_or(j + size);
                    trunk_committed = trunk_pending;
                    weight_committed = weight_complete;
                    trace!(
                        block,
                        off = j - d,
                        trunk = trunk_committed,
                        weight = weight_committed,
                        "commit"
                    );
                }
            }

            // trunk candidacy: checksum-family records never count, and
            // with a target we only track chains not yet past it
            if !tag.in_cksum_range() && (target == 0 || target >= j - d || in_trunk) {
                if !in_trunk {
                    in_trunk = true;
                    trunk_pending = j - d;
                    weight_building = 0;
                }
                weight_building = weight_building.wrapping_add(w);
                if !tag.is_alt() {
                    // a non-alt record ends the chain
                    in_trunk = false;
                    weight_complete = weight_building;
                    // remember where the targeted trunk's data ends; the
                    // next commit record pins eoff there
                    if target != 0 && j + size > target {
                        trunk_eoff = Some(j + size);
                    }
                }
            }

            if !tag.is_alt() {
                j += size;
            }
        }

        Self {
            block,
            rev,
            eoff: eoff as u32,
            trunk: trunk_committed as u32,
            weight: weight_committed,
            redund_blocks: Vec::new(),
            data,
        }
    }

    /// Read and decode a node from one or more redundant blocks, keeping
    /// the newest live copy.
    ///
    /// Copies are ranked live-before-dead, then by revision with
    /// wraparound, then by larger trunk on a revision tie. Losing blocks
    /// are recorded in [`Rbyd::redund_blocks`]. An empty block list
    /// yields a sentinel.
    pub fn fetch(bd: &dyn Bd, block_size: u32, blocks: &[u32], trunk: Option<u32>) -> Result<Self> {
        let mut rbyds = Vec::with_capacity(blocks.len());
        for &block in blocks {
            let data = bd.read_block(block_size, block)?;
            rbyds.push(Self::parse(block, data, trunk));
        }
        if rbyds.is_empty() {
            return Ok(Self::parse(0, Vec::new(), None));
        }

        let mut i = 0;
        for k in 1..rbyds.len() {
            let (cur, cand) = (&rbyds[i], &rbyds[k]);
            let newer = cand.is_live()
                && (!cur.is_live()
                    || (cand.rev != cur.rev && seq_newer(cand.rev, cur.rev))
                    || (cand.rev == cur.rev && cand.trunk > cur.trunk));
            if newer {
                i = k;
            }
        }

        let n = rbyds.len();
        let redund: Vec<u32> = (1..n).map(|k| rbyds[(i + k) % n].block).collect();
        let mut chosen = rbyds.swap_remove(i);
        chosen.redund_blocks = redund;
        if n > 1 {
            debug!(
                block = chosen.block,
                rev = chosen.rev,
                trunk = chosen.trunk,
                "selected newest copy"
            );
        }
        Ok(chosen)
    }

    /// Whether any committed state was found.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.trunk != 0
    }

    /// Render the node's address as `0xblock.trunk`, with redundant
    /// blocks braced in.
    #[must_use]
    pub fn addr(&self) -> String {
        if self.redund_blocks.is_empty() {
            format!("0x{:x}.{:x}", self.block, self.trunk)
        } else {
            let mut s = format!("0x{{{:x}", self.block);
            for b in &self.redund_blocks {
                s.push_str(&format!(",{b:x}"));
            }
            s.push_str(&format!("}}.{:x}", self.trunk));
            s
        }
    }

    fn alt_color(&self, alt: Tag, next_off: usize) -> AltColor {
        if !alt.is_red() {
            return AltColor::Black;
        }
        let (_, next, _, _, _) = from_tag(seg(&self.data, next_off, self.data.len()));
        if next.is_red() {
            AltColor::Yellow
        } else {
            AltColor::Red
        }
    }

    /// Find the first entry at or after `(rid, tag)` in entry order by
    /// descending the committed alt records.
    ///
    /// Returns `done` when the query lands past the last entry (or the
    /// node is a sentinel); the caller distinguishes "found exactly" by
    /// comparing the returned position.
    #[must_use]
    pub fn lookup(&self, rid: i64, tag: Tag) -> RbydLookup<'_> {
        if !self.is_live() {
            return RbydLookup::done_at(-1);
        }

        let key = i64::from(tag.key());
        let mut lower: i64 = -1;
        let mut upper: i64 = i64::from(self.weight);
        let mut path = Vec::new();
        let mut j = self.trunk as usize;

        // each step moves j; the cap only trips on garbage that cycles
        for _ in 0..=self.data.len() {
            let (_, alt, w, jump, d) = from_tag(seg(&self.data, j, self.data.len()));
            if alt.is_alt() {
                let w = i64::from(w);
                let follow = if alt.is_gt() {
                    (rid, key) > (upper - w - 1, i64::from(alt.key()))
                } else {
                    (rid, key) <= (lower + w, i64::from(alt.key()))
                };
                if follow {
                    if alt.is_gt() {
                        lower = upper - w - 1;
                    } else {
                        upper = lower + w + 1;
                    }
                    let to = j.saturating_sub(jump as usize);
                    let color = self.alt_color(alt, j + d);
                    path.push(AltStep {
                        from_off: j,
                        to_off: to,
                        followed: true,
                        color,
                    });
                    if to == j {
                        break;
                    }
                    j = to;
                } else {
                    if alt.is_gt() {
                        upper -= w;
                    } else {
                        lower += w;
                    }
                    let to = j + d;
                    let color = self.alt_color(alt, to);
                    path.push(AltStep {
                        from_off: j,
                        to_off: to,
                        followed: false,
                        color,
                    });
                    j = to;
                }
            } else {
                let found_rid = upper - 1;
                let weight = upper - lower - 1;
                let done = alt.is_null() || (found_rid, alt.0) < (rid, tag.0);
                let data = seg(&self.data, j + d, j + d + jump as usize);
                return RbydLookup {
                    done,
                    rid: found_rid,
                    tag: alt,
                    weight,
                    off: j,
                    hdr_len: d,
                    data,
                    path,
                };
            }
        }
        RbydLookup::done_at(-1)
    }

    /// Iterate all live entries in `(rid, tag)` order.
    #[must_use]
    pub fn iter(&self) -> Entries<'_> {
        Entries {
            rbyd: self,
            rid: -1,
            tag: 0,
            done: false,
        }
    }
}

/// Iterator over a node's live entries, driven by repeated lookups.
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    rbyd: &'a Rbyd,
    rid: i64,
    tag: u16,
    done: bool,
}

impl<'a> Iterator for Entries<'a> {
    type Item = RbydEntry<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let lk = self.rbyd.lookup(self.rid, Tag(self.tag.saturating_add(1)));
        if lk.done {
            self.done = true;
            return None;
        }
        self.rid = lk.rid;
        self.tag = lk.tag.0;
        Some(RbydEntry {
            rid: lk.rid,
            tag: lk.tag,
            weight: lk.weight,
            off: lk.off,
            hdr_len: lk.hdr_len,
            data: lk.data,
        })
    }
}
