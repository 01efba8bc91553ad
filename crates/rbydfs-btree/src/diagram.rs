//! Diagram reconstruction across B-tree levels.
//!
//! Two views of the same walk: [`btree_tree`] composes every node's
//! internal alt-tree into one picture, vertically aligning each B-tree
//! level to its deepest node; [`btree_btree`] draws only the B-tree
//! skeleton, one edge per level of each entry's path. Both can collapse
//! inner positions onto the leaves they lead to, which is how the trees
//! are usually rendered.

use std::collections::{BTreeSet, HashMap};

use rbydfs_bd::Bd;
use rbydfs_error::Result;
use rbydfs_rbyd::{AltColor, RBranch, RPos, Rbyd};
use rbydfs_types::tag::{Tag, TAG_BTREE, TAG_NAME};

use crate::traverse::btree_lookup;

/// A position in B-tree space: global id, level, id within the node,
/// and the tag used as the label. Ids are left-leaning (an entry of
/// weight w sits at its first id) so positions order globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BPos {
    pub bid: i64,
    pub bd: i64,
    pub rid: i64,
    pub tag: Tag,
}

/// One rendered edge of a composed diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct BBranch {
    pub a: BPos,
    pub b: BPos,
    pub depth: i64,
    pub color: AltColor,
}

/// Compose the alt-trees of every node in the B-tree into one diagram.
///
/// With `inner` false, positions of inner (branch) records are remapped
/// onto the leaf node they lead to. Returns the edge set and the total
/// rendered depth.
pub fn btree_tree(
    root: &Rbyd,
    bd: &dyn Bd,
    block_size: u32,
    depth: Option<u32>,
    inner: bool,
) -> Result<(BTreeSet<BBranch>, i64)> {
    // first pass: deepest per-node shape at each level, for alignment
    let mut level_depths: HashMap<usize, u32> = HashMap::new();
    let mut bid: i64 = -1;
    loop {
        let lk = btree_lookup(root, bd, block_size, bid + 1, depth)?;
        if lk.done {
            break;
        }
        bid = lk.bid;
        for (d, level) in lk.path.iter().enumerate() {
            let (_, rdepth) = level.rbyd.tree();
            let aligned = level_depths.entry(d).or_insert(0);
            *aligned = (*aligned).max(rdepth);
        }
    }

    let mut tree: BTreeSet<BBranch> = BTreeSet::new();
    let mut bid: i64 = -1;
    loop {
        let lk = btree_lookup(root, bd, block_size, bid + 1, depth)?;
        if lk.done {
            break;
        }
        bid = lk.bid;

        let mut d_: i64 = 0;
        let mut leaf: Option<BPos> = None;
        for (d, level) in lk.path.iter().enumerate() {
            if level.attrs.is_empty() {
                continue;
            }
            let (rtree, rdepth) = level.rbyd.tree();

            // lean every position left so ids order globally
            let lean = |pos: RPos| RPos {
                rid: pos.rid - (level.rbyd.lookup(pos.rid, Tag(0)).weight - 1),
                tag: pos.tag,
            };
            let rtree: BTreeSet<RBranch> = rtree
                .into_iter()
                .map(|br| RBranch {
                    a: lean(br.a),
                    b: lean(br.b),
                    depth: br.depth,
                    color: br.color,
                })
                .collect();

            // connect the previous level's branch record to this node's
            // root
            if let Some(leaf_pos) = leaf {
                let (r_rid, r_tag) = match rtree.iter().min_by_key(|br| br.depth) {
                    Some(br) => (br.a.rid, br.a.tag),
                    None => (level.rid - (level.weight - 1), level.attrs[0].tag),
                };
                tree.insert(BBranch {
                    a: leaf_pos,
                    b: BPos {
                        bid: level.bid - level.rid + r_rid,
                        bd: d as i64,
                        rid: r_rid,
                        tag: r_tag,
                    },
                    depth: d_ - 1,
                    color: AltColor::Black,
                });
            }

            let aligned = i64::from(level_depths.get(&d).copied().unwrap_or(0));
            for br in &rtree {
                tree.insert(BBranch {
                    a: BPos {
                        bid: level.bid - level.rid + br.a.rid,
                        bd: d as i64,
                        rid: br.a.rid,
                        tag: br.a.tag,
                    },
                    b: BPos {
                        bid: level.bid - level.rid + br.b.rid,
                        bd: d as i64,
                        rid: br.b.rid,
                        tag: br.b.tag,
                    },
                    depth: i64::from(br.depth) + d_ + aligned - i64::from(rdepth),
                    color: br.color,
                });
            }

            d_ += aligned.max(1);
            leaf = Some(BPos {
                bid: level.bid - (level.weight - 1),
                bd: d as i64,
                rid: level.rid - (level.weight - 1),
                tag: Tag(TAG_BTREE),
            });
        }
    }

    if !inner {
        let b_depth = tree.iter().map(|br| br.a.bd + 1).max().unwrap_or(0);
        // positions carry adjusted bids, so key each edge by the
        // original bid of its target node before rewriting
        let mut keyed: BTreeSet<(i64, BBranch)> =
            tree.iter().map(|br| (br.b.bid - br.b.rid, *br)).collect();

        for level in (0..b_depth.saturating_sub(1)).rev() {
            // the highest edge into each leaf-level node roots it
            let mut roots: HashMap<i64, BBranch> = HashMap::new();
            for (key, br) in keyed.iter() {
                if br.b.bd == b_depth - 1 {
                    let r = roots.entry(*key).or_insert(*br);
                    if br.depth < r.depth {
                        *r = *br;
                    }
                }
            }

            let mut remapped = BTreeSet::new();
            for (key, mut br) in keyed {
                if br.a.bd == level {
                    if let Some(r) = roots.get(&br.a.bid) {
                        br.a = r.b;
                    }
                }
                if br.b.bd == level {
                    if let Some(r) = roots.get(&br.b.bid) {
                        br.b = r.b;
                    }
                }
                remapped.insert((key, br));
            }
            keyed = remapped;
        }

        tree = keyed.into_iter().map(|(_, br)| br).collect();
    }

    let t_depth = tree.iter().map(|br| br.depth + 1).max().unwrap_or(0);
    Ok((tree, t_depth))
}

/// Draw the B-tree skeleton: one edge per level of each entry's path,
/// all anchored at the tree's first entry.
///
/// With `inner` false, inner positions collapse onto their leaf entry
/// and labels prefer name tags found higher in the tree, since names
/// repeated lower down are vestigial.
pub fn btree_btree(
    root: &Rbyd,
    bd: &dyn Bd,
    block_size: u32,
    depth: Option<u32>,
    inner: bool,
) -> Result<(BTreeSet<BBranch>, i64)> {
    let mut tree: BTreeSet<BBranch> = BTreeSet::new();
    let mut entry_root: Option<BPos> = None;
    let mut leaf_map: HashMap<BPos, BPos> = HashMap::new();
    let mut bid: i64 = -1;
    loop {
        let lk = btree_lookup(root, bd, block_size, bid + 1, depth)?;
        if lk.done {
            break;
        }
        bid = lk.bid;

        let mut name: Option<Tag> = None;
        if !inner {
            for level in lk.path.iter().rev() {
                for attr in &level.attrs {
                    if attr.tag.0 & 0x7f00 == TAG_NAME {
                        name = Some(attr.tag);
                    }
                }
                // only the leftmost spine can carry this entry's name
                if level.rid - (level.weight - 1) != 0 {
                    break;
                }
            }
        }

        let mut a = entry_root;
        for (d, level) in lk.path.iter().enumerate() {
            if level.attrs.is_empty() {
                continue;
            }
            let mut b = BPos {
                bid: level.bid - (level.weight - 1),
                bd: d as i64,
                rid: level.rid - (level.weight - 1),
                tag: name.unwrap_or(level.attrs[0].tag),
            };

            if !inner {
                if !leaf_map.contains_key(&b) {
                    let Some(last) = lk.path.last() else {
                        continue;
                    };
                    if last.attrs.is_empty() {
                        continue;
                    }
                    leaf_map.insert(
                        b,
                        BPos {
                            bid: last.bid - (last.weight - 1),
                            bd: (lk.path.len() - 1) as i64,
                            rid: last.rid - (last.weight - 1),
                            tag: name.unwrap_or(last.attrs[0].tag),
                        },
                    );
                }
                let Some(&mapped) = leaf_map.get(&b) else {
                    continue;
                };
                b = mapped;
            }

            if entry_root.is_none() {
                entry_root = Some(b);
                a = Some(b);
            }
            tree.insert(BBranch {
                a: a.unwrap_or(b),
                b,
                depth: d as i64,
                color: AltColor::Black,
            });
            a = Some(b);
        }
    }

    let t_depth = tree.iter().map(|br| br.depth + 1).max().unwrap_or(0);
    Ok((tree, t_depth))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traverse::tests::two_level_tree;
    use rbydfs_bd::RamBd;
    use rbydfs_types::tag::TAG_REG;

    const BLOCK_SIZE: u32 = 64;

    fn pos(bid: i64, bd: i64, rid: i64, tag: u16) -> BPos {
        BPos {
            bid,
            bd,
            rid,
            tag: Tag(tag),
        }
    }

    fn black(a: BPos, b: BPos, depth: i64) -> BBranch {
        BBranch {
            a,
            b,
            depth,
            color: AltColor::Black,
        }
    }

    #[test]
    fn skeleton_collapses_onto_leaves() {
        let mut bd = RamBd::default();
        let root = two_level_tree(&mut bd);

        let (tree, depth) = btree_btree(&root, &bd, BLOCK_SIZE, None, false).expect("btree");
        assert_eq!(depth, 2);
        let expect: BTreeSet<_> = [
            black(pos(0, 1, 0, TAG_REG), pos(0, 1, 0, TAG_REG), 0),
            black(pos(0, 1, 0, TAG_REG), pos(0, 1, 0, TAG_REG), 1),
            black(pos(0, 1, 0, TAG_REG), pos(1, 1, 1, TAG_REG), 1),
            black(pos(0, 1, 0, TAG_REG), pos(2, 1, 0, TAG_REG), 0),
            black(pos(2, 1, 0, TAG_REG), pos(2, 1, 0, TAG_REG), 1),
            black(pos(2, 1, 0, TAG_REG), pos(3, 1, 1, TAG_REG), 1),
        ]
        .into_iter()
        .collect();
        assert_eq!(tree, expect);
    }

    #[test]
    fn skeleton_with_inner_positions() {
        let mut bd = RamBd::default();
        let root = two_level_tree(&mut bd);

        let (tree, depth) = btree_btree(&root, &bd, BLOCK_SIZE, None, true).expect("btree");
        assert_eq!(depth, 2);
        let expect: BTreeSet<_> = [
            black(pos(0, 0, 0, TAG_BTREE), pos(0, 0, 0, TAG_BTREE), 0),
            black(pos(0, 0, 0, TAG_BTREE), pos(0, 1, 0, TAG_REG), 1),
            black(pos(0, 0, 0, TAG_BTREE), pos(1, 1, 1, TAG_REG), 1),
            black(pos(0, 0, 0, TAG_BTREE), pos(2, 0, 2, TAG_BTREE), 0),
            black(pos(2, 0, 2, TAG_BTREE), pos(2, 1, 0, TAG_REG), 1),
            black(pos(2, 0, 2, TAG_BTREE), pos(3, 1, 1, TAG_REG), 1),
        ]
        .into_iter()
        .collect();
        assert_eq!(tree, expect);
    }

    #[test]
    fn composed_tree_with_inner_positions() {
        let mut bd = RamBd::default();
        let root = two_level_tree(&mut bd);

        let (tree, depth) = btree_tree(&root, &bd, BLOCK_SIZE, None, true).expect("tree");
        assert_eq!(depth, 3);
        let expect: BTreeSet<_> = [
            // the root node's own alt-tree
            black(pos(2, 0, 2, TAG_BTREE), pos(2, 0, 2, TAG_BTREE), 0),
            black(pos(2, 0, 2, TAG_BTREE), pos(0, 0, 0, TAG_BTREE), 0),
            // connections from branch records to child roots
            black(pos(0, 0, 0, TAG_BTREE), pos(1, 1, 1, TAG_REG), 1),
            black(pos(2, 0, 2, TAG_BTREE), pos(3, 1, 1, TAG_REG), 1),
            // each child's alt-tree
            black(pos(1, 1, 1, TAG_REG), pos(1, 1, 1, TAG_REG), 2),
            black(pos(1, 1, 1, TAG_REG), pos(0, 1, 0, TAG_REG), 2),
            black(pos(3, 1, 1, TAG_REG), pos(3, 1, 1, TAG_REG), 2),
            black(pos(3, 1, 1, TAG_REG), pos(2, 1, 0, TAG_REG), 2),
        ]
        .into_iter()
        .collect();
        assert_eq!(tree, expect);
    }

    #[test]
    fn composed_tree_collapses_onto_leaves() {
        let mut bd = RamBd::default();
        let root = two_level_tree(&mut bd);

        let (tree, depth) = btree_tree(&root, &bd, BLOCK_SIZE, None, false).expect("tree");
        assert_eq!(depth, 3);
        let expect: BTreeSet<_> = [
            black(pos(3, 1, 1, TAG_REG), pos(3, 1, 1, TAG_REG), 0),
            black(pos(3, 1, 1, TAG_REG), pos(1, 1, 1, TAG_REG), 0),
            black(pos(1, 1, 1, TAG_REG), pos(1, 1, 1, TAG_REG), 1),
            black(pos(3, 1, 1, TAG_REG), pos(3, 1, 1, TAG_REG), 1),
            black(pos(1, 1, 1, TAG_REG), pos(1, 1, 1, TAG_REG), 2),
            black(pos(1, 1, 1, TAG_REG), pos(0, 1, 0, TAG_REG), 2),
            black(pos(3, 1, 1, TAG_REG), pos(3, 1, 1, TAG_REG), 2),
            black(pos(3, 1, 1, TAG_REG), pos(2, 1, 0, TAG_REG), 2),
        ]
        .into_iter()
        .collect();
        assert_eq!(tree, expect);
    }

    #[test]
    fn corrupted_child_leaves_a_stub_in_the_skeleton() {
        let mut bd = RamBd::default();
        let root = two_level_tree(&mut bd);
        bd.set_block(BLOCK_SIZE, 2, &[0xff; BLOCK_SIZE as usize]);

        let (tree, depth) = btree_btree(&root, &bd, BLOCK_SIZE, None, false).expect("btree");
        assert_eq!(depth, 2);
        // the healthy child renders fully, the broken branch appears as
        // a single inner stub labeled by its branch record
        assert!(tree.contains(&black(
            pos(0, 1, 0, TAG_REG),
            pos(2, 0, 2, TAG_BTREE),
            0
        )));
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn depth_limited_skeleton_stays_at_the_root() {
        let mut bd = RamBd::default();
        let root = two_level_tree(&mut bd);

        let (tree, depth) = btree_btree(&root, &bd, BLOCK_SIZE, Some(1), false).expect("btree");
        assert_eq!(depth, 1);
        assert!(tree.iter().all(|br| br.b.bd == 0));
    }
}
