//! Rbyd node decoding and lookup.
//!
//! An rbyd is one physical append-only, checksum-protected, tagged log
//! backing a compacted red-black-ish tree. This crate recovers the most
//! recently committed state from raw block bytes ([`Rbyd::parse`] /
//! [`Rbyd::fetch`]), performs point lookups by descending the on-disk
//! alt-pointer records ([`Rbyd::lookup`]), iterates all live entries
//! ([`Rbyd::iter`]), and rebuilds the abstract tree shape for rendering
//! ([`Rbyd::tree`]).
//!
//! Corruption is a value here, never an error: a block with no committed
//! state parses to a sentinel node with a zero trunk, and lookups on it
//! report past-end immediately.

mod rbyd;
mod tree;

pub use rbyd::{seq_newer, AltColor, AltStep, Entries, Rbyd, RbydEntry, RbydLookup};
pub use tree::{RBranch, RPos};
