//! Tree-shape reconstruction for rendering.
//!
//! The on-disk tree only exists as alt records threaded through the log,
//! so the abstract shape is recovered by replaying a lookup for every
//! live entry and recording, per alt record, where the descent went when
//! the alt was followed and when it was not. Alt records seen from only
//! one side are vestigial (compaction leftovers) and are spliced out.
//! Branches are keyed by the entry each endpoint resolves to rather than
//! by log offset, so two nodes with the same logical shape render the
//! same tree.

use std::collections::{BTreeSet, HashMap};

use crate::rbyd::{AltColor, Rbyd};
use rbydfs_types::Tag;

/// A position in the rendered tree: the entry an alt resolves to when
/// every remaining alt is not followed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RPos {
    pub rid: i64,
    pub tag: Tag,
}

/// One rendered edge, from an alt's own position to a child position.
/// Self-edges mark the alt itself at its depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RBranch {
    pub a: RPos,
    pub b: RPos,
    pub depth: u32,
    pub color: AltColor,
}

#[derive(Debug, Default)]
struct AltEnds {
    followed: Option<usize>,
    not_followed: Option<usize>,
    color: AltColor,
}

#[derive(Debug, Clone, Copy)]
struct LiveAlt {
    followed: usize,
    not_followed: usize,
    color: AltColor,
}

const ROOT_POS: RPos = RPos {
    rid: -1,
    tag: Tag(0),
};

impl Rbyd {
    /// Recover the abstract tree shape: the set of rendered edges plus
    /// the total depth (levels including the leaf level). A sentinel or
    /// empty node yields an empty set and depth 0.
    #[must_use]
    pub fn tree(&self) -> (BTreeSet<RBranch>, u32) {
        // replay every lookup, collecting leaf offsets and alt endpoints
        let mut leaves: HashMap<usize, RPos> = HashMap::new();
        let mut alts: HashMap<usize, AltEnds> = HashMap::new();
        let mut rid: i64 = -1;
        let mut tag: u16 = 0;
        loop {
            let lk = self.lookup(rid, Tag(tag.saturating_add(1)));
            if lk.done {
                break;
            }
            leaves.insert(
                lk.off,
                RPos {
                    rid: lk.rid,
                    tag: lk.tag,
                },
            );
            for step in &lk.path {
                let ends = alts.entry(step.from_off).or_default();
                if step.followed {
                    ends.followed = Some(step.to_off);
                } else {
                    ends.not_followed = Some(step.to_off);
                }
                ends.color = step.color;
            }
            rid = lk.rid;
            tag = lk.tag.0;
        }

        // splice out alts seen from only one side
        let mut spliced: HashMap<usize, usize> = HashMap::new();
        let mut live: HashMap<usize, LiveAlt> = HashMap::new();
        for (off, ends) in alts {
            match (ends.followed, ends.not_followed) {
                (Some(followed), Some(not_followed)) => {
                    live.insert(
                        off,
                        LiveAlt {
                            followed,
                            not_followed,
                            color: ends.color,
                        },
                    );
                }
                (Some(to), None) | (None, Some(to)) => {
                    spliced.insert(off, to);
                }
                (None, None) => {}
            }
        }
        for alt in live.values_mut() {
            while let Some(&to) = spliced.get(&alt.followed) {
                alt.followed = to;
            }
            while let Some(&to) = spliced.get(&alt.not_followed) {
                alt.not_followed = to;
            }
        }

        // resolve each alt's own position by chasing not-followed edges
        // down to a leaf
        let mut positions: HashMap<usize, RPos> = HashMap::new();
        for &start in live.keys() {
            if positions.contains_key(&start) {
                continue;
            }
            let mut chain = Vec::new();
            let mut off = start;
            while let Some(alt) = live.get(&off) {
                if positions.contains_key(&off) || chain.contains(&off) {
                    break;
                }
                chain.push(off);
                off = alt.not_followed;
            }
            let pos = positions
                .get(&off)
                .or_else(|| leaves.get(&off))
                .copied()
                .unwrap_or(ROOT_POS);
            for c in chain {
                positions.insert(c, pos);
            }
        }

        // heights bottom-up; anything unresolved (cyclic garbage) stays
        // at height 0
        let mut heights: HashMap<usize, u32> = HashMap::new();
        loop {
            let mut progressed = false;
            for (&off, alt) in &live {
                if heights.contains_key(&off) {
                    continue;
                }
                let child = |c: usize| {
                    if live.contains_key(&c) {
                        heights.get(&c).copied()
                    } else {
                        Some(0)
                    }
                };
                if let (Some(hf), Some(hn)) = (child(alt.followed), child(alt.not_followed)) {
                    heights.insert(off, hf.max(hn) + 1);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }

        // alt levels plus one leaf level; a node with no alts has no
        // tree to draw at all
        let t_depth = live
            .keys()
            .map(|off| heights.get(off).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);

        let mut tree = BTreeSet::new();
        for (&off, alt) in &live {
            let height = heights.get(&off).copied().unwrap_or(0);
            let depth = t_depth - 1 - height.min(t_depth - 1);
            let pos = positions.get(&off).copied().unwrap_or(ROOT_POS);
            let target = positions
                .get(&alt.followed)
                .or_else(|| leaves.get(&alt.followed))
                .copied()
                .unwrap_or(ROOT_POS);
            tree.insert(RBranch {
                a: pos,
                b: pos,
                depth,
                color: alt.color,
            });
            tree.insert(RBranch {
                a: pos,
                b: target,
                depth,
                color: AltColor::Black,
            });
        }
        (tree, t_depth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rbydfs_harness::LogBuilder;
    use rbydfs_types::tag::{TAG_ALT, TAG_REG};

    const ALT_LE_REG: u16 = TAG_ALT | TAG_REG;

    fn reg(rid: i64) -> RPos {
        RPos {
            rid,
            tag: Tag(TAG_REG),
        }
    }

    fn black(a: RPos, b: RPos, depth: u32) -> RBranch {
        RBranch {
            a,
            b,
            depth,
            color: AltColor::Black,
        }
    }

    #[test]
    fn empty_and_single_entry_trees() {
        let rbyd = Rbyd::parse(0, vec![0xff; 16], None);
        assert_eq!(rbyd.tree(), (BTreeSet::new(), 0));

        let mut log = LogBuilder::new(1);
        log.leaf(TAG_REG, 1, b"abc");
        log.commit();
        let rbyd = Rbyd::parse(0, log.into_bytes(), None);
        // one leaf, no alts: nothing to draw
        assert_eq!(rbyd.tree(), (BTreeSet::new(), 0));
    }

    #[test]
    fn two_entry_tree() {
        let mut log = LogBuilder::new(1);
        let a = log.leaf(TAG_REG, 1, b"a");
        log.alt(ALT_LE_REG, 1, a);
        log.leaf(TAG_REG, 1, b"b");
        log.commit();
        let rbyd = Rbyd::parse(0, log.into_bytes(), None);

        let (tree, depth) = rbyd.tree();
        assert_eq!(depth, 2);
        let expect: BTreeSet<_> = [
            black(reg(1), reg(1), 0),
            black(reg(1), reg(0), 0),
        ]
        .into_iter()
        .collect();
        assert_eq!(tree, expect);
    }

    #[test]
    fn four_entry_balanced_tree() {
        let mut log = LogBuilder::new(1);
        let a = log.leaf(TAG_REG, 1, b"a");
        let left = log.alt(ALT_LE_REG, 1, a);
        log.leaf(TAG_REG, 1, b"b");
        let c = log.leaf(TAG_REG, 1, b"c");
        log.alt(ALT_LE_REG, 2, left);
        log.alt(ALT_LE_REG, 1, c);
        log.leaf(TAG_REG, 1, b"d");
        log.commit();
        let rbyd = Rbyd::parse(0, log.into_bytes(), None);

        let (tree, depth) = rbyd.tree();
        assert_eq!(depth, 3);
        let expect: BTreeSet<_> = [
            // root alt sits at rid 3, pointing left into the rid-1 subtree
            black(reg(3), reg(3), 0),
            black(reg(3), reg(1), 0),
            // left subtree alt
            black(reg(1), reg(1), 1),
            black(reg(1), reg(0), 1),
            // right subtree alt
            black(reg(3), reg(3), 1),
            black(reg(3), reg(2), 1),
        ]
        .into_iter()
        .collect();
        assert_eq!(tree, expect);
    }

    #[test]
    fn vestigial_alt_is_spliced_out() {
        let mut log = LogBuilder::new(1);
        let a = log.leaf(TAG_REG, 1, b"a");
        log.alt(ALT_LE_REG, 1, a);
        // weight-0 alt that no lookup ever follows
        log.alt(TAG_ALT, 0, a);
        log.leaf(TAG_REG, 1, b"b");
        log.commit();
        let rbyd = Rbyd::parse(0, log.into_bytes(), None);

        let (tree, depth) = rbyd.tree();
        assert_eq!(depth, 2);
        let expect: BTreeSet<_> = [
            black(reg(1), reg(1), 0),
            black(reg(1), reg(0), 0),
        ]
        .into_iter()
        .collect();
        assert_eq!(tree, expect);
    }

    #[test]
    fn tree_depth_grows_logarithmically() {
        // a balanced 8-entry shape: alts written bottom-up per pair,
        // then per quad, then the root
        let mut log = LogBuilder::new(1);
        let a0 = log.leaf(TAG_REG, 1, b"0");
        let p0 = log.alt(ALT_LE_REG, 1, a0);
        log.leaf(TAG_REG, 1, b"1");
        let a2 = log.leaf(TAG_REG, 1, b"2");
        let q0 = log.alt(ALT_LE_REG, 2, p0);
        log.alt(ALT_LE_REG, 1, a2);
        log.leaf(TAG_REG, 1, b"3");
        let a4 = log.leaf(TAG_REG, 1, b"4");
        let p2 = log.alt(ALT_LE_REG, 1, a4);
        log.leaf(TAG_REG, 1, b"5");
        let a6 = log.leaf(TAG_REG, 1, b"6");
        log.alt(ALT_LE_REG, 4, q0);
        log.alt(ALT_LE_REG, 2, p2);
        log.alt(ALT_LE_REG, 1, a6);
        log.leaf(TAG_REG, 1, b"7");
        log.commit();
        let rbyd = Rbyd::parse(0, log.into_bytes(), None);
        assert_eq!(rbyd.weight, 8);
        assert_eq!(
            rbyd.iter().map(|e| e.rid).collect::<Vec<_>>(),
            (0..8).collect::<Vec<_>>()
        );

        let (tree, depth) = rbyd.tree();
        // 3 alt levels plus the leaf level
        assert_eq!(depth, 4);
        assert_eq!(
            tree.iter().map(|b| b.depth).max(),
            Some(2)
        );
    }
}
