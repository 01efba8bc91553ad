//! B-tree traversal over rbyd nodes.
//!
//! A B-tree here is an rbyd whose entries may carry branch pointers to
//! child rbyds, each pinned to an exact generation by a stored trunk
//! offset. [`btree_lookup`] descends from a root to the entry holding a
//! global position, collecting every attribute along the way;
//! [`btree_tree`] and [`btree_btree`] walk all entries to rebuild
//! renderable diagrams, composing per-node shapes or just the B-tree
//! skeleton.
//!
//! A corrupted child never aborts a walk: the lookup reports it once as
//! a not-done result with a dead node, and iteration continues with the
//! next sibling.

mod diagram;
mod traverse;

pub use diagram::{btree_btree, btree_tree, BBranch, BPos};
pub use traverse::{btree_lookup, BtreeAttr, BtreeLevel, BtreeLookup};
