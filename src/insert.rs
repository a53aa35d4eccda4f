//! Insert engine (module E) plus the sibling/parent fixups (module G) that
//! splitting requires.
//!
//! Callers own the in-memory [`Header`]; every function here only mutates
//! it (bumping `slot`, counts, `height`, `root_offset`). Writing the header
//! block back to disk is the caller's job, done once after the whole
//! operation succeeds, matching the "header written last" ordering rule.

use tracing::{debug, trace};

use crate::error::Error;
use crate::key::{Key, Value};
use crate::node::{
    Header, InternalEntry, InternalNode, LeafEntry, LeafNode, NodeHeader, INTERNAL_NODE_SIZE,
    LEAF_NODE_SIZE, ORDER,
};
use crate::search::{leaf_lower_bound, leaf_upper_bound, search_leaf};
use crate::store::Store;

/// Inserts `(key, value)`. Fails with [`Error::Duplicate`] if `key` is
/// already present.
pub fn insert(store: &Store, header: &mut Header, key: Key, value: Value) -> Result<(), Error> {
    let (leaf_off, mut leaf) = search_leaf(store, header, &key)?;
    let idx = leaf_lower_bound(&leaf, &key);
    if idx < leaf.n() && leaf.entries[idx].key == key {
        return Err(Error::Duplicate);
    }

    if leaf.n() < ORDER {
        shift_insert_leaf(&mut leaf, idx, key, value);
        leaf.write(store, leaf_off)?;
        trace!(offset = leaf_off, n = leaf.n(), "leaf insert, no split");
        Ok(())
    } else {
        split_leaf_and_insert(store, header, leaf_off, leaf, idx, key, value)
    }
}

/// Overwrites the value of an existing key. Fails with [`Error::NotFound`]
/// if `key` is absent.
pub fn update(store: &Store, header: &Header, key: Key, value: Value) -> Result<(), Error> {
    let (leaf_off, mut leaf) = search_leaf(store, header, &key)?;
    let idx = leaf_lower_bound(&leaf, &key);
    if idx < leaf.n() && leaf.entries[idx].key == key {
        leaf.entries[idx].value = value;
        leaf.write(store, leaf_off)?;
        Ok(())
    } else {
        Err(Error::NotFound)
    }
}

fn shift_insert_leaf(leaf: &mut LeafNode, idx: usize, key: Key, value: Value) {
    let n = leaf.n();
    for i in (idx..n).rev() {
        leaf.entries[i + 1] = leaf.entries[i];
    }
    leaf.entries[idx] = LeafEntry { key, value };
    leaf.header.n = (n + 1) as u64;
}

/// Splits a full leaf, inserts the new record into whichever half it
/// belongs to, splices the new leaf into the `next`/`prev` chain, and
/// promotes the right half's first key into the parent.
fn split_leaf_and_insert(
    store: &Store,
    header: &mut Header,
    old_off: u64,
    mut old: LeafNode,
    ins_idx: usize,
    key: Key,
    value: Value,
) -> Result<(), Error> {
    let n = old.n();
    let point = n / 2;
    // Decide the side once, against the *unbumped* midpoint — mirrors the
    // original's `place_right = keycmp(key, leaf.children[point].key) > 0`,
    // which compares the new key against the pivot before `point` moves.
    // Re-testing `ins_idx` against the bumped `point` afterwards would
    // misroute the `ins_idx == point` boundary case into an undersized leaf.
    let place_right = ins_idx > point;
    let point = if place_right { point + 1 } else { point };

    let new_off = header.alloc(LEAF_NODE_SIZE as u64);
    header.leaf_node_num += 1;

    let mut right = LeafNode::empty(old.header.parent);
    let move_count = n - point;
    for i in 0..move_count {
        right.entries[i] = old.entries[point + i];
    }
    right.header.n = move_count as u64;
    old.header.n = point as u64;

    right.header.next = old.header.next;
    right.header.prev = old_off;
    old.header.next = new_off;
    if right.header.next != 0 {
        let mut next_header = NodeHeader::read(store, right.header.next)?;
        next_header.prev = new_off;
        next_header.write(store, right.header.next)?;
    }

    if place_right {
        shift_insert_leaf(&mut right, ins_idx - point, key, value);
    } else {
        shift_insert_leaf(&mut old, ins_idx, key, value);
    }

    old.write(store, old_off)?;
    right.write(store, new_off)?;

    let promoted = right.entries[0].key;
    debug!(old_off, new_off, promoted = %promoted, "leaf split");

    insert_key_to_index(store, header, old.header.parent, promoted, old_off, new_off)
}

/// Inserts `key` separating `old` (left) from `after` (right, newly
/// created) into the internal node at `off`. `off == 0` means there is no
/// internal root yet above `old`; a fresh two-child root is grown instead.
fn insert_key_to_index(
    store: &Store,
    header: &mut Header,
    off: u64,
    key: Key,
    old: u64,
    after: u64,
) -> Result<(), Error> {
    if off == 0 {
        let root_off = header.alloc(INTERNAL_NODE_SIZE as u64);
        header.internal_node_num += 1;
        header.height += 1;
        header.root_offset = root_off;

        let mut root = InternalNode::empty(0);
        root.header.n = 2;
        root.entries[0] = InternalEntry { key, child: old };
        root.entries[1] = InternalEntry {
            key: Key::default(),
            child: after,
        };
        root.write(store, root_off)?;

        set_parent(store, old, root_off)?;
        set_parent(store, after, root_off)?;
        debug!(root_off, height = header.height, "grew new root");
        return Ok(());
    }

    let node = InternalNode::read(store, off)?;
    let n = node.n();
    let mut entries: Vec<InternalEntry> = node.entries[..n].to_vec();
    let ins_idx = insert_separator(&mut entries, key, after);
    let new_len = n + 1;

    if new_len <= ORDER {
        let mut updated = node.clone();
        for (i, e) in entries.iter().enumerate() {
            updated.entries[i] = *e;
        }
        updated.header.n = new_len as u64;
        updated.write(store, off)?;
        return Ok(());
    }

    split_internal_and_write(store, header, off, node.header, entries, ins_idx, n)
}

/// Places `(key, after)` into `entries` (which currently holds the node's
/// separators/children, one entry short of the eventual length). Returns
/// the index the new entry landed at.
///
/// Mirrors the no-split internal insertion rule: find the first separator
/// (among all but the last entry) strictly greater than `key`, shift
/// everything from there right by one, and wire children so that the new
/// entry inherits what used to be its successor's child while the
/// successor's child becomes `after`.
fn insert_separator(entries: &mut Vec<InternalEntry>, key: Key, after: u64) -> usize {
    let l = entries.len();
    let mut idx = 0;
    while idx < l.saturating_sub(1) && entries[idx].key <= key {
        idx += 1;
    }
    let inherited_child = entries[idx].child;
    entries.insert(idx, InternalEntry {
        key,
        child: inherited_child,
    });
    entries[idx + 1].child = after;
    idx
}

fn split_internal_and_write(
    store: &Store,
    header: &mut Header,
    off: u64,
    old_header: NodeHeader,
    entries: Vec<InternalEntry>,
    ins_idx: usize,
    old_n: usize,
) -> Result<(), Error> {
    let len = entries.len();
    let mut point = (old_n.saturating_sub(1)) / 2;
    if ins_idx >= point {
        point += 1;
    }
    if point == 0 {
        point = 1;
    }
    if point >= len - 1 {
        point = len - 2;
    }

    let promoted = entries[point].key;

    let new_off = header.alloc(INTERNAL_NODE_SIZE as u64);
    header.internal_node_num += 1;

    let mut left = InternalNode {
        header: old_header,
        entries: [InternalEntry::default(); ORDER],
    };
    for i in 0..=point {
        left.entries[i] = entries[i];
    }
    left.header.n = (point + 1) as u64;

    let mut right = InternalNode::empty(old_header.parent);
    let right_len = len - (point + 1);
    for i in 0..right_len {
        right.entries[i] = entries[point + 1 + i];
    }
    right.header.n = right_len as u64;

    for e in right.entries[..right_len].iter() {
        set_parent(store, e.child, new_off)?;
    }

    left.write(store, off)?;
    right.write(store, new_off)?;

    debug!(off, new_off, promoted = %promoted, "internal split");

    insert_key_to_index(store, header, old_header.parent, promoted, off, new_off)
}

/// Header-only rewrite of a child's `parent` field — leaf or internal, it
/// does not matter, since both share the same common header layout.
fn set_parent(store: &Store, child_off: u64, new_parent: u64) -> Result<(), Error> {
    let mut h = NodeHeader::read(store, child_off)?;
    h.parent = new_parent;
    h.write(store, child_off)
}
