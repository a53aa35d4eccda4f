//! Delete engine (module F) plus the sibling/parent fixups (module G) that
//! rebalancing requires.
//!
//! Like `insert.rs`, every function here mutates the in-memory [`Header`]
//! only; the caller writes it back once the whole operation succeeds.

use tracing::{debug, trace};

use crate::error::Error;
use crate::key::Key;
use crate::node::{Header, InternalEntry, InternalNode, LeafNode, NodeHeader, ORDER};
use crate::search::{leaf_lower_bound, search_leaf};
use crate::store::Store;

/// Removes `key`. Fails with [`Error::NotFound`] if it is absent.
pub fn remove(store: &Store, header: &mut Header, key: &Key) -> Result<(), Error> {
    let (leaf_off, mut leaf) = search_leaf(store, header, key)?;
    let idx = leaf_lower_bound(&leaf, key);
    if idx >= leaf.n() || leaf.entries[idx].key != *key {
        return Err(Error::NotFound);
    }

    let n = leaf.n();
    for i in idx..n - 1 {
        leaf.entries[i] = leaf.entries[i + 1];
    }
    leaf.header.n = (n - 1) as u64;

    let min_n = min_leaf_occupancy(header);
    if leaf.n() >= min_n {
        leaf.write(store, leaf_off)?;
        trace!(offset = leaf_off, n = leaf.n(), "leaf delete, no rebalance");
        return Ok(());
    }

    rebalance_leaf(store, header, leaf_off, leaf)
}

fn min_leaf_occupancy(header: &Header) -> usize {
    if header.leaf_node_num == 1 {
        0
    } else {
        ORDER / 2
    }
}

fn min_internal_occupancy() -> usize {
    ORDER / 2
}

/// `leaf` is underfull. Try borrowing from a richer sibling before merging.
fn rebalance_leaf(
    store: &Store,
    header: &mut Header,
    off: u64,
    mut leaf: LeafNode,
) -> Result<(), Error> {
    let min_n = ORDER / 2;

    if leaf.header.prev != 0 {
        let mut left = LeafNode::read(store, leaf.header.prev)?;
        if left.n() > min_n {
            let old_min_key = leaf.entries[0].key;
            let moved = left.entries[left.n() - 1];
            left.header.n -= 1;

            for i in (0..leaf.n()).rev() {
                leaf.entries[i + 1] = leaf.entries[i];
            }
            leaf.entries[0] = moved;
            leaf.header.n += 1;

            left.write(store, leaf.header.prev)?;
            leaf.write(store, off)?;

            change_parent_child(store, header, leaf.header.parent, old_min_key, moved.key)?;
            debug!(off, from = leaf.header.prev, "leaf borrow-left");
            return Ok(());
        }
    }

    if leaf.header.next != 0 {
        let mut right = LeafNode::read(store, leaf.header.next)?;
        if right.n() > min_n {
            let moved = right.entries[0];
            for i in 0..right.n() - 1 {
                right.entries[i] = right.entries[i + 1];
            }
            right.header.n -= 1;

            leaf.entries[leaf.n()] = moved;
            leaf.header.n += 1;

            let lender_new_min = right.entries[0].key;
            right.write(store, leaf.header.next)?;
            leaf.write(store, off)?;

            change_parent_child(store, header, right.header.parent, moved.key, lender_new_min)?;
            debug!(off, from = leaf.header.next, "leaf borrow-right");
            return Ok(());
        }
    }

    merge_leaves(store, header, off, leaf)
}

/// No sibling has spare entries: merge `leaf` with a sibling and recurse
/// the separator removal up into the parent.
fn merge_leaves(store: &Store, header: &mut Header, off: u64, leaf: LeafNode) -> Result<(), Error> {
    let parent_off = leaf.header.parent;
    let parent = InternalNode::read(store, parent_off)?;
    let is_rightmost = parent.entries[parent.n() - 1].child == off;

    if is_rightmost {
        // Merge `leaf` into its left sibling.
        let left_off = leaf.header.prev;
        let mut left = LeafNode::read(store, left_off)?;
        let dropped_key = leaf.entries[0].key;

        let base = left.n();
        for i in 0..leaf.n() {
            left.entries[base + i] = leaf.entries[i];
        }
        left.header.n += leaf.header.n;
        left.header.next = leaf.header.next;
        if left.header.next != 0 {
            let mut next_header = NodeHeader::read(store, left.header.next)?;
            next_header.prev = left_off;
            next_header.write(store, left.header.next)?;
        }
        left.write(store, left_off)?;
        header.leaf_node_num -= 1;

        debug!(kept = left_off, removed = off, "leaf merge (into left sibling)");
        remove_from_index(store, header, parent_off, dropped_key)
    } else {
        // Merge `leaf`'s right sibling into `leaf`.
        let right_off = leaf.header.next;
        let right = LeafNode::read(store, right_off)?;
        let dropped_key = right.entries[0].key;

        let mut merged = leaf;
        let base = merged.n();
        for i in 0..right.n() {
            merged.entries[base + i] = right.entries[i];
        }
        merged.header.n += right.header.n;
        merged.header.next = right.header.next;
        if merged.header.next != 0 {
            let mut next_header = NodeHeader::read(store, merged.header.next)?;
            next_header.prev = off;
            next_header.write(store, merged.header.next)?;
        }
        merged.write(store, off)?;
        header.leaf_node_num -= 1;

        debug!(kept = off, removed = right_off, "leaf merge (right sibling absorbed)");
        remove_from_index(store, header, parent_off, dropped_key)
    }
}

/// Deletes the separator entry equal to `key` from the internal node at
/// `off`. When the deleted entry is not the last slot, the following
/// child pointer is copied into the vacated slot so the last slot keeps
/// its "no meaningful key" property. Then checks for root shrinkage or
/// underflow.
fn remove_from_index(store: &Store, header: &mut Header, off: u64, key: Key) -> Result<(), Error> {
    let mut node = InternalNode::read(store, off)?;
    let n = node.n();
    let idx = node.separators().iter().position(|e| e.key == key).expect(
        "separator being dropped must exist in its parent; callers only pass keys they just merged away",
    );

    // entries[idx].child is the surviving left participant of the merge and
    // must not move; only its separator is stale now, so the next slot's
    // key (if any) takes its place before the rest of the array shifts down
    // to cover the now-gone slot at idx + 1.
    if idx != n - 2 {
        node.entries[idx].key = node.entries[idx + 1].key;
    }
    for i in (idx + 1)..(n - 1) {
        node.entries[i] = node.entries[i + 1];
    }
    node.header.n = (n - 1) as u64;

    if off == header.root_offset {
        if node.n() == 1 && header.internal_node_num != 1 {
            let surviving_child = node.entries[0].child;
            header.internal_node_num -= 1;
            header.height -= 1;
            header.root_offset = surviving_child;
            debug!(old_root = off, new_root = surviving_child, "root shrink");
            // Root parent is intentionally left as-is; no caller reads it.
            return Ok(());
        }
        node.write(store, off)?;
        return Ok(());
    }

    let min_n = min_internal_occupancy();
    if node.n() >= min_n {
        node.write(store, off)?;
        return Ok(());
    }

    rebalance_internal(store, header, off, node)
}

/// `node` (internal, non-root) is underfull. Borrow from a parent-array
/// sibling, or merge, rotating/dropping the parent separator as needed.
fn rebalance_internal(
    store: &Store,
    header: &mut Header,
    off: u64,
    mut node: InternalNode,
) -> Result<(), Error> {
    let parent_off = node.header.parent;
    let parent = InternalNode::read(store, parent_off)?;
    let my_idx = parent
        .entries()
        .iter()
        .position(|e| e.child == off)
        .expect("internal node's parent must list it among its children");

    let min_n = min_internal_occupancy();

    if my_idx > 0 {
        let left_off = parent.entries[my_idx - 1].child;
        let mut left = InternalNode::read(store, left_off)?;
        if left.n() > min_n {
            // Rotate through the parent separator: the separator to the
            // left of `node` moves down to become node's new first
            // separator; left's last child's former separator moves up
            // to replace it.
            let separator = parent.entries[my_idx - 1].key;
            // left's former second-to-last separator becomes the new
            // boundary between left and node once left's last child moves
            // over; left's last entry itself carries no meaningful key
            // (it was left's own catchall).
            let new_separator = left.entries[left.n() - 2].key;
            let borrowed = left.entries[left.n() - 1];
            left.header.n -= 1;

            for i in (0..node.n()).rev() {
                node.entries[i + 1] = node.entries[i];
            }
            node.entries[0] = InternalEntry {
                key: separator,
                child: borrowed.child,
            };
            node.header.n += 1;

            set_parent(store, borrowed.child, off)?;

            left.write(store, left_off)?;
            node.write(store, off)?;
            change_parent_child(store, header, parent_off, separator, new_separator)?;
            debug!(off, from = left_off, "internal borrow-left");
            return Ok(());
        }
    }

    if my_idx + 1 < parent.n() {
        let right_off = parent.entries[my_idx + 1].child;
        let mut right = InternalNode::read(store, right_off)?;
        if right.n() > min_n {
            let separator = parent.entries[my_idx].key;
            let borrowed = right.entries[0];
            for i in 0..right.n() - 1 {
                right.entries[i] = right.entries[i + 1];
            }
            right.header.n -= 1;

            // node's old catchall slot becomes a real separator (the
            // rotated-down parent key), keeping its original child; the
            // borrowed grandchild becomes the new catchall.
            let old_catchall = node.n() - 1;
            let preserved_child = node.entries[old_catchall].child;
            node.entries[old_catchall] = InternalEntry {
                key: separator,
                child: preserved_child,
            };
            node.entries[node.n()] = InternalEntry {
                key: Key::default(),
                child: borrowed.child,
            };
            node.header.n += 1;

            set_parent(store, borrowed.child, off)?;

            let new_separator = right.entries[0].key;
            right.write(store, right_off)?;
            node.write(store, off)?;
            change_parent_child(store, header, parent_off, separator, new_separator)?;
            debug!(off, from = right_off, "internal borrow-right");
            return Ok(());
        }
    }

    merge_internal(store, header, off, node, parent_off, parent, my_idx)
}

fn merge_internal(
    store: &Store,
    header: &mut Header,
    off: u64,
    node: InternalNode,
    parent_off: u64,
    parent: InternalNode,
    my_idx: usize,
) -> Result<(), Error> {
    let is_rightmost = my_idx == parent.n() - 1;

    if is_rightmost {
        let left_off = parent.entries[my_idx - 1].child;
        let mut left = InternalNode::read(store, left_off)?;
        let dropped_key = parent.entries[my_idx - 1].key;

        let base = left.n();
        // left's old catchall slot borders node's subtree now, so the
        // dropped separator becomes its real key before node's own entries
        // (already correctly paired) are appended wholesale.
        left.entries[base - 1].key = dropped_key;
        for i in 0..node.n() {
            left.entries[base + i] = node.entries[i];
        }
        left.header.n += node.header.n;
        for e in node.entries[..node.n()].iter() {
            set_parent(store, e.child, left_off)?;
        }
        left.write(store, left_off)?;
        header.internal_node_num -= 1;

        debug!(kept = left_off, removed = off, "internal merge (into left sibling)");
        remove_from_index(store, header, parent_off, dropped_key)
    } else {
        let right_off = parent.entries[my_idx + 1].child;
        let right = InternalNode::read(store, right_off)?;
        let dropped_key = parent.entries[my_idx].key;

        let mut merged = node;
        let base = merged.n();
        merged.entries[base - 1].key = dropped_key;
        for i in 0..right.n() {
            merged.entries[base + i] = right.entries[i];
        }
        merged.header.n += right.header.n;
        for e in right.entries[..right.n()].iter() {
            set_parent(store, e.child, off)?;
        }
        merged.write(store, off)?;
        header.internal_node_num -= 1;

        debug!(kept = off, removed = right_off, "internal merge (right sibling absorbed)");
        remove_from_index(store, header, parent_off, dropped_key)
    }
}

/// Rewrites the parent entry whose key equals `old_key` to `new_key`. If
/// that entry is the parent's last separator, the change must propagate
/// one level further up (the parent's own separator in its parent may
/// itself need to move).
fn change_parent_child(
    store: &Store,
    header: &mut Header,
    parent_off: u64,
    old_key: Key,
    new_key: Key,
) -> Result<(), Error> {
    let mut parent = InternalNode::read(store, parent_off)?;
    let n = parent.n();
    match parent.separators().iter().position(|e| e.key == old_key) {
        Some(idx) => {
            parent.entries[idx].key = new_key;
            parent.write(store, parent_off)?;
            trace!(parent_off, idx, "parent separator rewritten");
            if idx == n - 2 && parent.header.parent != 0 {
                change_parent_child(store, header, parent.header.parent, old_key, new_key)
            } else {
                Ok(())
            }
        }
        // `old_key` borders no separator at this level: this node is the
        // leftmost-reaching subtree here, so the bordering separator (if
        // any) lives further up. Keep climbing without writing.
        None if parent.header.parent != 0 => {
            change_parent_child(store, header, parent.header.parent, old_key, new_key)
        }
        None => Ok(()),
    }
}

/// Header-only rewrite of a child's `parent` field.
fn set_parent(store: &Store, child_off: u64, new_parent: u64) -> Result<(), Error> {
    let mut h = NodeHeader::read(store, child_off)?;
    h.parent = new_parent;
    h.write(store, child_off)
}
