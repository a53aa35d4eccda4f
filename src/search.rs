//! Search paths (module D).
//!
//! Every public operation starts here: descend from the root through the
//! internal levels by repeated `upper_bound` over separator keys, then do
//! one final step into the deepest internal node to land on the leaf that
//! would hold the key if present.

use crate::error::Error;
use crate::key::Key;
use crate::node::{Header, InternalNode, LeafNode};
use crate::store::Store;

/// Index of the child that `key` would descend into, found by scanning the
/// node's separators (`entries[0..n-1]`) for the first one strictly greater
/// than `key`. When no separator beats `key`, this lands on `n-1`, the
/// catch-all last child — exactly the index `partition_point` returns when
/// nothing in the searched slice satisfies the predicate.
fn locate_child(node: &InternalNode, key: &Key) -> usize {
    node.separators().partition_point(|e| e.key <= *key)
}

/// Walks from `root_offset` down `height - 1` internal levels, following
/// `locate_child` at each one. Returns the offset of the internal node at
/// the level directly above the leaves — not a leaf itself.
pub fn search_index(store: &Store, header: &Header, key: &Key) -> Result<u64, Error> {
    let mut offset = header.root_offset;
    let mut height = header.height;
    while height > 1 {
        let node = InternalNode::read(store, offset)?;
        let idx = locate_child(&node, key);
        offset = node.entries[idx].child;
        height -= 1;
    }
    Ok(offset)
}

/// One descent step from a known deepest-internal offset into its leaf.
pub fn search_leaf_from(
    store: &Store,
    internal_off: u64,
    key: &Key,
) -> Result<(u64, LeafNode), Error> {
    let node = InternalNode::read(store, internal_off)?;
    let idx = locate_child(&node, key);
    let leaf_off = node.entries[idx].child;
    let leaf = LeafNode::read(store, leaf_off)?;
    Ok((leaf_off, leaf))
}

/// `search_leaf(key) = search_leaf(search_index(key), key)`.
pub fn search_leaf(store: &Store, header: &Header, key: &Key) -> Result<(u64, LeafNode), Error> {
    let internal_off = search_index(store, header, key)?;
    search_leaf_from(store, internal_off, key)
}

/// First index in `leaf.entries()` whose key is `>= key`.
pub fn leaf_lower_bound(leaf: &LeafNode, key: &Key) -> usize {
    leaf.entries().partition_point(|e| e.key < *key)
}

/// First index in `leaf.entries()` whose key is `> key`.
pub fn leaf_upper_bound(leaf: &LeafNode, key: &Key) -> usize {
    leaf.entries().partition_point(|e| e.key <= *key)
}

/// Point lookup: locate the leaf, then confirm an exact key match.
pub fn lookup(store: &Store, header: &Header, key: &Key) -> Result<Option<crate::key::Value>, Error> {
    let (_, leaf) = search_leaf(store, header, key)?;
    let idx = leaf_lower_bound(&leaf, key);
    if idx < leaf.n() && leaf.entries[idx].key == *key {
        Ok(Some(leaf.entries[idx].value))
    } else {
        Ok(None)
    }
}
