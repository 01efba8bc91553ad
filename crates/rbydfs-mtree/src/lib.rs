//! Metadata-tree assembly.
//!
//! The filesystem's metadata is rooted at a redundant mroot pair
//! (blocks 0 and 1 by convention). The mroot may chain to further
//! mroots, and the last one may carry a direct mdir plus an mtree, a
//! B-tree whose entries reference the remaining mdirs. [`Mtree::assemble`]
//! chases the whole structure in one pass, recording every node it
//! fetched and the weights needed to render ids.
//!
//! A broken link anywhere marks the result corrupted (or simply yields
//! fewer mdirs) instead of failing: whatever was reachable is still
//! reported.

use rbydfs_bd::Bd;
use rbydfs_btree::btree_lookup;
use rbydfs_error::Result;
use rbydfs_rbyd::Rbyd;
use rbydfs_types::tag::{Tag, TAG_MDIR, TAG_MROOT, TAG_MTREE};
use rbydfs_types::{mdir_blocks, BtreePtr};
use tracing::{debug, warn};

/// Default mroot anchor blocks.
pub const DEFAULT_MROOTS: [u32; 2] = [0, 1];

/// One mdir discovered through the mtree, at its base metadata id.
#[derive(Debug, Clone)]
pub struct MdirRef {
    pub mid: i64,
    pub rbyd: Rbyd,
}

/// Everything reachable from the mroot anchor.
#[derive(Debug, Clone)]
pub struct Mtree {
    /// The mroot chain in order; the last element is the active mroot
    /// (possibly dead if the chain broke).
    pub chain: Vec<Rbyd>,
    /// Direct mdir hanging off the active mroot, if any.
    pub mdir: Option<Rbyd>,
    /// Root node of the mdir B-tree, if any.
    pub mtree: Option<Rbyd>,
    /// Total weight of the mtree per its pointer.
    pub mweight: u32,
    /// Largest weight seen in any metadata node, for id rendering.
    pub rweight: u32,
    /// Number of mroots fetched, including a dead chain end.
    pub mdepth: u32,
    /// Mdirs referenced by mtree entries, in id order.
    pub mdirs: Vec<MdirRef>,
    /// The mroot chain ended on a node with no committed state.
    pub corrupted: bool,
}

impl Mtree {
    /// Chase the metadata structure from `mroots` (the anchor pair),
    /// descending at most `depth` levels when given; each mroot in the
    /// chain counts as a level, as does each mtree level.
    pub fn assemble(
        bd: &dyn Bd,
        block_size: u32,
        mroots: &[u32],
        depth: Option<u32>,
    ) -> Result<Self> {
        let anchor: &[u32] = if mroots.is_empty() {
            &DEFAULT_MROOTS
        } else {
            mroots
        };

        let mut chain: Vec<Rbyd> = Vec::new();
        let mut rweight: u32 = 0;
        let mut corrupted = false;
        let mut mroot = Rbyd::fetch(bd, block_size, anchor, None)?;
        let mut mdepth: u32 = 1;
        loop {
            if !mroot.is_live() {
                warn!(block = mroot.block, "mroot chain broke");
                corrupted = true;
                break;
            }
            rweight = rweight.max(mroot.weight);

            if depth.is_some_and(|d| mdepth >= d) {
                break;
            }

            let lk = mroot.lookup(-1, Tag(TAG_MROOT));
            if lk.done || lk.rid != -1 || lk.tag != Tag(TAG_MROOT) {
                break;
            }
            let blocks = mdir_blocks(lk.data);
            let next = Rbyd::fetch(bd, block_size, &blocks, None)?;
            debug!(addr = %next.addr(), mdepth, "following mroot chain");
            chain.push(mroot);
            mroot = next;
            mdepth += 1;
        }

        // the active mroot carries the mdir and mtree references; a
        // dead chain end just reports done lookups
        let mut mdir = None;
        if depth.map_or(true, |d| mdepth < d) {
            let lk = mroot.lookup(-1, Tag(TAG_MDIR));
            if !lk.done && lk.rid == -1 && lk.tag == Tag(TAG_MDIR) {
                let blocks = mdir_blocks(lk.data);
                let m = Rbyd::fetch(bd, block_size, &blocks, None)?;
                if m.is_live() {
                    rweight = rweight.max(m.weight);
                }
                mdir = Some(m);
            }
        }

        let mut mtree = None;
        let mut mweight: u32 = 0;
        let mut mdirs: Vec<MdirRef> = Vec::new();
        if depth.map_or(true, |d| mdepth < d) {
            let lk = mroot.lookup(-1, Tag(TAG_MTREE));
            if !lk.done && lk.rid == -1 && lk.tag == Tag(TAG_MTREE) {
                let ptr = BtreePtr::parse(lk.data);
                let root = Rbyd::fetch(bd, block_size, &[ptr.block], Some(ptr.trunk))?;
                mweight = ptr.weight;

                let bt_depth = depth.map(|d| d - mdepth);
                let mut mid: i64 = -1;
                loop {
                    let blk = btree_lookup(&root, bd, block_size, mid + 1, bt_depth)?;
                    if blk.done {
                        break;
                    }
                    mid = blk.bid;
                    if !blk.rbyd.is_live() {
                        continue;
                    }

                    let within = depth.map_or(true, |d| mdepth + (blk.path.len() as u32) < d);
                    if !within {
                        continue;
                    }
                    if let Some(attr) = blk.attrs.iter().find(|a| a.tag == Tag(TAG_MDIR)) {
                        let blocks = mdir_blocks(&attr.data);
                        let m = Rbyd::fetch(bd, block_size, &blocks, None)?;
                        if m.is_live() {
                            rweight = rweight.max(m.weight);
                        }
                        mdirs.push(MdirRef {
                            mid: blk.bid - (blk.weight - 1),
                            rbyd: m,
                        });
                    }
                }
                mtree = Some(root);
            }
        }
        chain.push(mroot);

        Ok(Self {
            chain,
            mdir,
            mtree,
            mweight,
            rweight,
            mdepth,
            mdirs,
            corrupted,
        })
    }

    /// The mroot actually carrying the filesystem's references.
    #[must_use]
    pub fn active_mroot(&self) -> Option<&Rbyd> {
        self.chain.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbydfs_bd::RamBd;
    use rbydfs_harness::{btree_ptr_bytes, mdir_bytes, LogBuilder};
    use rbydfs_types::tag::{TAG_ALT, TAG_REG, TAG_SUPERMAGIC};

    const BLOCK_SIZE: u32 = 64;

    fn weighted_leaf(rev: u32, weight: u32, payload: &[u8]) -> Vec<u8> {
        let mut log = LogBuilder::new(rev);
        log.leaf(TAG_REG, weight, payload);
        log.commit();
        log.finish(BLOCK_SIZE as usize)
    }

    /// Full metadata layout:
    /// - blocks {0,1}: anchor mroot (supermagic + mroot link to {4,5})
    /// - blocks {4,5}: active mroot (mdir link to {6,7} + mtree at 10)
    /// - blocks {6,7}: direct mdir, weight 1
    /// - block 10: mtree root with two mdir entries
    /// - blocks 8, 9: mdirs referenced by the mtree, weights 3 and 2
    fn metadata_device() -> RamBd {
        let mut bd = RamBd::default();

        for (block, rev) in [(0u32, 1u32), (1, 2)] {
            let mut log = LogBuilder::new(rev);
            let magic = log.leaf(TAG_SUPERMAGIC, 0, b"littlefs");
            log.alt(TAG_ALT | TAG_SUPERMAGIC, 0, magic);
            log.leaf(TAG_MROOT, 0, &mdir_bytes(&[4, 5]));
            log.commit();
            bd.set_block(BLOCK_SIZE, block, &log.finish(BLOCK_SIZE as usize));
        }

        let mut log = LogBuilder::new(1);
        let mdir = log.leaf(TAG_MDIR, 0, &mdir_bytes(&[6, 7]));
        log.alt(TAG_ALT | TAG_MDIR, 0, mdir);
        log.leaf(TAG_MTREE, 0, &btree_ptr_bytes(2, 9, 10, 0));
        log.commit();
        bd.set_block(BLOCK_SIZE, 4, &log.finish(BLOCK_SIZE as usize));
        // block 5 left erased: the pair's dead copy

        bd.set_block(BLOCK_SIZE, 6, &weighted_leaf(1, 1, b"x"));
        // block 7 left erased

        let mut log = LogBuilder::new(1);
        let first = log.leaf(TAG_MDIR, 1, &mdir_bytes(&[8]));
        log.alt(TAG_ALT | TAG_MDIR, 1, first);
        log.leaf(TAG_MDIR, 1, &mdir_bytes(&[9]));
        log.commit();
        bd.set_block(BLOCK_SIZE, 10, &log.finish(BLOCK_SIZE as usize));

        bd.set_block(BLOCK_SIZE, 8, &weighted_leaf(1, 3, b"y"));
        bd.set_block(BLOCK_SIZE, 9, &weighted_leaf(1, 2, b"z"));

        bd
    }

    #[test]
    fn assembles_the_whole_structure() {
        let bd = metadata_device();
        let mt = Mtree::assemble(&bd, BLOCK_SIZE, &[0, 1], None).expect("assemble");

        assert!(!mt.corrupted);
        assert_eq!(mt.mdepth, 2);
        assert_eq!(mt.chain.len(), 2);
        // the anchor pair resolves to the newer copy
        assert_eq!(mt.chain[0].block, 1);
        assert_eq!(mt.chain[0].redund_blocks, vec![0]);
        // the second pair falls back to its only live copy
        assert_eq!(mt.chain[1].block, 4);
        assert_eq!(mt.chain[1].redund_blocks, vec![5]);
        assert_eq!(mt.active_mroot().map(|r| r.block), Some(4));

        let mdir = mt.mdir.as_ref().expect("mdir");
        assert!(mdir.is_live());
        assert_eq!((mdir.block, mdir.weight), (6, 1));

        let mtree = mt.mtree.as_ref().expect("mtree");
        assert_eq!((mtree.block, mtree.weight), (10, 2));
        assert_eq!(mt.mweight, 2);

        let mids: Vec<_> = mt
            .mdirs
            .iter()
            .map(|m| (m.mid, m.rbyd.block, m.rbyd.weight))
            .collect();
        assert_eq!(mids, vec![(0, 8, 3), (1, 9, 2)]);
        assert_eq!(mt.rweight, 3);
    }

    #[test]
    fn default_anchor_is_the_first_pair() {
        let bd = metadata_device();
        let mt = Mtree::assemble(&bd, BLOCK_SIZE, &[], None).expect("assemble");
        assert_eq!(mt.chain[0].block, 1);
        assert_eq!(mt.mdepth, 2);
    }

    #[test]
    fn depth_limits_cut_the_walk_short() {
        let bd = metadata_device();

        let mt = Mtree::assemble(&bd, BLOCK_SIZE, &[0, 1], Some(1)).expect("assemble");
        assert_eq!(mt.mdepth, 1);
        assert_eq!(mt.chain.len(), 1);
        assert!(mt.mdir.is_none());
        assert!(mt.mtree.is_none());

        let mt = Mtree::assemble(&bd, BLOCK_SIZE, &[0, 1], Some(2)).expect("assemble");
        assert_eq!(mt.mdepth, 2);
        assert!(mt.mdir.is_none());
        assert!(mt.mtree.is_none());

        // deep enough to open the mtree but not its mdirs
        let mt = Mtree::assemble(&bd, BLOCK_SIZE, &[0, 1], Some(3)).expect("assemble");
        assert!(mt.mdir.is_some());
        assert!(mt.mtree.is_some());
        assert!(mt.mdirs.is_empty());
        assert_eq!(mt.rweight, 1);
    }

    #[test]
    fn broken_chain_is_reported_not_fatal() {
        let mut bd = metadata_device();
        // wipe both blocks of the second mroot pair
        bd.set_block(BLOCK_SIZE, 4, &[0xff; BLOCK_SIZE as usize]);
        bd.set_block(BLOCK_SIZE, 5, &[0xff; BLOCK_SIZE as usize]);

        let mt = Mtree::assemble(&bd, BLOCK_SIZE, &[0, 1], None).expect("assemble");
        assert!(mt.corrupted);
        assert_eq!(mt.mdepth, 2);
        assert_eq!(mt.chain.len(), 2);
        assert!(!mt.chain[1].is_live());
        assert!(mt.mdir.is_none());
        assert!(mt.mtree.is_none());
    }

    #[test]
    fn mroot_without_links_stands_alone() {
        let mut bd = RamBd::default();
        bd.set_block(BLOCK_SIZE, 0, &weighted_leaf(1, 1, b"solo"));

        let mt = Mtree::assemble(&bd, BLOCK_SIZE, &[0], None).expect("assemble");
        assert!(!mt.corrupted);
        assert_eq!(mt.chain.len(), 1);
        assert_eq!(mt.mdepth, 1);
        assert!(mt.mdir.is_none());
        assert!(mt.mtree.is_none());
        assert_eq!(mt.rweight, 1);
    }

    #[test]
    fn corrupted_mtree_mdir_is_skipped() {
        let mut bd = metadata_device();
        bd.set_block(BLOCK_SIZE, 9, &[0xff; BLOCK_SIZE as usize]);

        let mt = Mtree::assemble(&bd, BLOCK_SIZE, &[0, 1], None).expect("assemble");
        let mids: Vec<_> = mt
            .mdirs
            .iter()
            .map(|m| (m.mid, m.rbyd.is_live()))
            .collect();
        assert_eq!(mids, vec![(0, true), (1, false)]);
        assert_eq!(mt.rweight, 3);
    }
}
