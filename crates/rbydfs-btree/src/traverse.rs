//! Positional descent through branch pointers.

use rbydfs_bd::Bd;
use rbydfs_error::Result;
use rbydfs_rbyd::Rbyd;
use rbydfs_types::tag::{Tag, TAG_BTREE};
use rbydfs_types::{tag_repr, BtreePtr};
use tracing::{trace, warn};

/// One attribute of a B-tree entry: a tag plus its payload, with the
/// record's location inside its node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BtreeAttr {
    pub tag: Tag,
    pub off: usize,
    pub hdr_len: usize,
    pub data: Vec<u8>,
}

/// One level of a descent: which node was visited and which of its
/// entries contained the queried position.
#[derive(Debug, Clone)]
pub struct BtreeLevel {
    /// Global position of the entry's last id.
    pub bid: i64,
    pub weight: i64,
    pub rbyd: Rbyd,
    pub rid: i64,
    pub attrs: Vec<BtreeAttr>,
}

/// Result of a B-tree lookup.
///
/// `done` means the position lies past the tree. A not-done result with
/// a dead `rbyd` and no attrs reports a corrupted child; its `bid` is
/// the last position covered by the broken branch, so resuming the walk
/// at `bid + 1` skips exactly that subtree.
#[derive(Debug, Clone)]
pub struct BtreeLookup {
    pub done: bool,
    pub bid: i64,
    pub weight: i64,
    pub rbyd: Rbyd,
    pub rid: i64,
    pub attrs: Vec<BtreeAttr>,
    pub path: Vec<BtreeLevel>,
}

/// Find the entry containing global position `bid`, starting from
/// `root`. `depth` limits how many levels to descend; `None` or
/// `Some(0)` is unlimited.
///
/// Every attribute of the entry at each level is collected, and child
/// nodes are fetched pinned to the trunk stored in their branch
/// pointer.
pub fn btree_lookup(
    root: &Rbyd,
    bd: &dyn Bd,
    block_size: u32,
    bid: i64,
    depth: Option<u32>,
) -> Result<BtreeLookup> {
    let mut rbyd = root.clone();
    let mut rid = bid;
    let mut level = 1u32;
    let mut path: Vec<BtreeLevel> = Vec::new();

    // a corrupted root is reported once, then the walk is done
    if !rbyd.is_live() {
        return Ok(BtreeLookup {
            done: bid > 0,
            bid,
            weight: 0,
            rbyd,
            rid: -1,
            attrs: Vec::new(),
            path,
        });
    }

    loop {
        // collect every attribute of the entry containing rid
        let mut attrs: Vec<BtreeAttr> = Vec::new();
        let mut branch: Option<Vec<u8>> = None;
        let mut rid_ = rid;
        let mut tag: u16 = 0;
        let mut weight: i64 = 0;
        let mut first = true;
        loop {
            let lk = rbyd.lookup(rid_, Tag(tag.saturating_add(1)));
            if lk.done || (!first && lk.rid != rid_) {
                break;
            }
            if first {
                rid_ = lk.rid;
                weight = lk.weight;
                first = false;
            }
            if lk.tag == Tag(TAG_BTREE) {
                branch = Some(lk.data.to_vec());
            }
            attrs.push(BtreeAttr {
                tag: lk.tag,
                off: lk.off,
                hdr_len: lk.hdr_len,
                data: lk.data.to_vec(),
            });
            tag = lk.tag.0;
        }

        if let Some(first) = attrs.first() {
            trace!(
                bid = bid + (rid_ - rid),
                rid = rid_,
                attr = %tag_repr(first.tag, weight as u32, first.data.len() as u32, None),
                "visiting entry"
            );
        }
        path.push(BtreeLevel {
            bid: bid + (rid_ - rid),
            weight,
            rbyd: rbyd.clone(),
            rid: rid_,
            attrs: attrs.clone(),
        });

        let descend = branch.take().filter(|_| match depth {
            None | Some(0) => true,
            Some(d) => level < d,
        });
        if let Some(data) = descend {
            let ptr = BtreePtr::parse(&data);
            trace!(
                block = ptr.block,
                trunk = ptr.trunk,
                weight = ptr.weight,
                "descending branch"
            );
            let child = Rbyd::fetch(bd, block_size, &[ptr.block], Some(ptr.trunk))?;
            if !child.is_live() {
                // report the broken subtree once, let the caller resume
                // past it
                warn!(block = ptr.block, trunk = ptr.trunk, "corrupted branch");
                return Ok(BtreeLookup {
                    done: false,
                    bid: bid + (rid_ - rid),
                    weight,
                    rbyd: child,
                    rid: -1,
                    attrs: Vec::new(),
                    path,
                });
            }
            rid -= rid_ - (weight - 1);
            rbyd = child;
            level += 1;
        } else {
            return Ok(BtreeLookup {
                done: attrs.is_empty(),
                bid: bid + (rid_ - rid),
                weight,
                rbyd,
                rid: rid_,
                attrs,
                path,
            });
        }
    }
}
