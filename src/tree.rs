//! Public API (spec.md §6): a reentrant handle over one on-disk tree.
//!
//! Unlike the original's single global tree pointer, every operation here
//! goes through an explicit [`Tree`] value that owns its [`Store`] and a
//! cached, in-memory [`Header`]. Mutating calls rewrite the header block
//! once, after every node write the operation needed has already happened
//! — children before parents, header last.

use std::path::Path;

use crate::delete;
use crate::error::Error;
use crate::insert;
use crate::key::{Key, Value};
use crate::node::{Header, InternalEntry, InternalNode, LeafNode, INTERNAL_NODE_SIZE, LEAF_NODE_SIZE};
use crate::search::{self, leaf_lower_bound};
use crate::store::Store;

pub struct Tree {
    store: Store,
    header: Header,
}

impl Tree {
    /// Opens the tree at `path`. A fresh empty tree is created if
    /// `force_empty` is set, the file does not exist or is empty, or the
    /// header cannot be read.
    pub fn open(path: impl AsRef<Path>, force_empty: bool) -> Result<Self, Error> {
        let store = Store::new(path);
        let header = if force_empty || !store.exists_nonempty() {
            Self::init_empty(&store)?
        } else {
            match Header::read(&store) {
                Ok(h) => h,
                Err(_) => Self::init_empty(&store)?,
            }
        };
        Ok(Tree { store, header })
    }

    fn init_empty(store: &Store) -> Result<Header, Error> {
        let mut header = Header::empty();
        header.height = 1;

        let root_off = header.alloc(INTERNAL_NODE_SIZE as u64);
        header.internal_node_num = 1;
        let leaf_off = header.alloc(LEAF_NODE_SIZE as u64);
        header.leaf_node_num = 1;
        header.root_offset = root_off;
        header.leaf_offset = leaf_off;

        let mut root = InternalNode::empty(0);
        root.header.n = 1;
        root.entries[0] = InternalEntry {
            key: Key::default(),
            child: leaf_off,
        };
        root.write(store, root_off)?;

        let leaf = LeafNode::empty(root_off);
        leaf.write(store, leaf_off)?;

        header.write(store)?;
        Ok(header)
    }

    /// Point lookup.
    pub fn search(&self, key: &Key) -> Result<Option<Value>, Error> {
        search::lookup(&self.store, &self.header, key)
    }

    /// Inserts `(key, value)`. Fails with [`Error::Duplicate`] if present.
    pub fn insert(&mut self, key: Key, value: Value) -> Result<(), Error> {
        insert::insert(&self.store, &mut self.header, key, value)?;
        self.header.write(&self.store)
    }

    /// Overwrites the value of an existing key.
    pub fn update(&mut self, key: Key, value: Value) -> Result<(), Error> {
        insert::update(&self.store, &self.header, key, value)
    }

    /// Removes `key`. Fails with [`Error::NotFound`] if absent.
    pub fn remove(&mut self, key: &Key) -> Result<(), Error> {
        delete::remove(&self.store, &mut self.header, key)?;
        self.header.write(&self.store)
    }

    /// A snapshot of the header block, for introspection/tooling.
    pub fn get_meta(&self) -> Header {
        self.header.clone()
    }

    /// Scans `[left, right]` via the leaf chain, collecting up to `max`
    /// `(key, value)` pairs into `out`. Returns the resume key — the first
    /// key excluded from this page — if the range continues beyond `max`.
    pub fn search_range(
        &self,
        left: &Key,
        right: &Key,
        max: usize,
        out: &mut Vec<(Key, Value)>,
    ) -> Result<Option<Key>, Error> {
        if right < left {
            return Err(Error::InvalidRange);
        }

        let (_, mut leaf) = search::search_leaf(&self.store, &self.header, left)?;
        let mut idx = leaf_lower_bound(&leaf, left);
        let mut count = 0usize;

        loop {
            if idx >= leaf.n() {
                if leaf.header.next == 0 {
                    return Ok(None);
                }
                leaf = LeafNode::read(&self.store, leaf.header.next)?;
                idx = 0;
                continue;
            }
            let entry = leaf.entries[idx];
            if entry.key > *right {
                return Ok(None);
            }
            if count >= max {
                return Ok(Some(entry.key));
            }
            out.push((entry.key, entry.value));
            count += 1;
            idx += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::ORDER;
    use std::collections::HashSet;

    fn tmp_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
        dir.path().join("index.bin")
    }

    fn value(age: i32) -> Value {
        Value::new("name", age, "mail@example.com")
    }

    // --- structural traversal, shared by several property checks ---
    //
    // A leaf is never spliced in as another leaf's `prev`: splits always
    // link the freshly allocated half in as the existing node's `next`, so
    // the very first leaf ever allocated (`header.leaf_offset`) stays the
    // globally leftmost leaf for the tree's whole lifetime.

    struct Walk {
        leaf_keys: Vec<Key>,
        internal_count: usize,
        leaf_count: usize,
    }

    fn walk(tree: &Tree) -> Walk {
        let header = tree.get_meta();
        Walk {
            leaf_keys: ordered_leaf_chain(tree),
            internal_count: header.internal_node_num as usize,
            leaf_count: header.leaf_node_num as usize,
        }
    }

    fn leaf_offsets(tree: &Tree) -> HashSet<u64> {
        let header = tree.get_meta();
        let mut set = HashSet::new();
        let mut off = header.leaf_offset;
        while off != 0 && set.insert(off) {
            let leaf = LeafNode::read(&tree.store, off).unwrap();
            off = leaf.header.next;
        }
        set
    }

    fn ordered_leaf_chain(tree: &Tree) -> Vec<Key> {
        let header = tree.get_meta();
        let mut keys = Vec::new();
        let mut off = header.leaf_offset;
        let mut seen = HashSet::new();
        while off != 0 && seen.insert(off) {
            let leaf = LeafNode::read(&tree.store, off).unwrap();
            for e in leaf.entries() {
                keys.push(e.key);
            }
            off = leaf.header.next;
        }
        keys
    }

    fn assert_strictly_ascending(keys: &[Key]) {
        for w in keys.windows(2) {
            assert!(w[0] < w[1], "leaf chain out of order: {} >= {}", w[0], w[1]);
        }
    }

    fn assert_occupancy_and_parents(tree: &Tree) {
        let header = tree.get_meta();
        let min_internal = ORDER / 2;
        let min_leaf = ORDER / 2;
        let leaves = leaf_offsets(tree);

        let mut stack = vec![header.root_offset];
        let mut internal_seen = 0usize;
        let mut leaf_seen = 0usize;

        while let Some(off) = stack.pop() {
            if leaves.contains(&off) {
                let leaf = LeafNode::read(&tree.store, off).unwrap();
                let floor = if header.leaf_node_num == 1 { 0 } else { min_leaf };
                assert!(leaf.n() >= floor && leaf.n() <= ORDER);
                leaf_seen += 1;
                continue;
            }

            let node = InternalNode::read(&tree.store, off).unwrap();
            let floor = if off == header.root_offset { 1 } else { min_internal };
            assert!(node.n() >= floor && node.n() <= ORDER);
            internal_seen += 1;
            for e in node.entries() {
                assert_child_parent(tree, e.child, off);
                stack.push(e.child);
            }
        }

        assert_eq!(internal_seen, header.internal_node_num as usize);
        assert_eq!(leaf_seen, header.leaf_node_num as usize);
    }

    fn assert_child_parent(tree: &Tree, child_off: u64, expected_parent: u64) {
        use crate::node::NodeHeader;
        let h = NodeHeader::read(&tree.store, child_off).unwrap();
        assert_eq!(h.parent, expected_parent);
    }

    #[test]
    fn empty_tree_search_misses() {
        let dir = tempfile::tempdir().unwrap();
        let tree = Tree::open(tmp_path(&dir), true).unwrap();
        assert_eq!(tree.search(&Key::new("42")).unwrap(), None);
    }

    #[test]
    fn insert_then_search_round_trips_and_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = Tree::open(tmp_path(&dir), true).unwrap();

        for i in 1..=5 {
            tree.insert(Key::new(&i.to_string()), value(i)).unwrap();
        }
        for i in 1..=5 {
            let v = tree.search(&Key::new(&i.to_string())).unwrap().unwrap();
            assert_eq!(v.age, i);
        }
        assert!(matches!(
            tree.insert(Key::new("3"), value(0)),
            Err(Error::Duplicate)
        ));

        let keys = ordered_leaf_chain(&tree);
        let expected: Vec<Key> = (1..=5).map(|i| Key::new(&i.to_string())).collect();
        assert_eq!(keys, expected);
        assert_strictly_ascending(&keys);
    }

    #[test]
    fn update_overwrites_without_touching_structure() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = Tree::open(tmp_path(&dir), true).unwrap();
        tree.insert(Key::new("1"), value(10)).unwrap();
        let before = tree.get_meta();

        tree.update(Key::new("1"), value(99)).unwrap();
        let after = tree.get_meta();

        assert_eq!(tree.search(&Key::new("1")).unwrap().unwrap().age, 99);
        assert_eq!(before.leaf_node_num, after.leaf_node_num);
        assert_eq!(before.height, after.height);
        assert!(matches!(
            tree.update(Key::new("missing"), value(0)),
            Err(Error::NotFound)
        ));
    }

    #[test]
    fn bulk_insert_triggers_splits_and_keeps_every_invariant() {
        crate::init_test_tracing();
        let dir = tempfile::tempdir().unwrap();
        let mut tree = Tree::open(tmp_path(&dir), true).unwrap();

        let total = ORDER * 5 + 3;
        for i in 0..total {
            tree.insert(Key::new(&format!("{:05}", i)), value(i as i32))
                .unwrap();
        }

        let keys = ordered_leaf_chain(&tree);
        assert_eq!(keys.len(), total);
        assert_strictly_ascending(&keys);
        assert_occupancy_and_parents(&tree);

        let w = walk(&tree);
        assert_eq!(w.leaf_keys.len(), total);
        assert!(w.internal_count >= 1);
        assert!(w.leaf_count >= 2);

        for i in 0..total {
            let v = tree.search(&Key::new(&format!("{:05}", i))).unwrap().unwrap();
            assert_eq!(v.age, i as i32);
        }
    }

    #[test]
    fn range_scan_paginates_with_resume_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut tree = Tree::open(tmp_path(&dir), true).unwrap();
        for i in 1..=20 {
            tree.insert(Key::new(&i.to_string()), value(i)).unwrap();
        }

        let mut out = Vec::new();
        let resume = tree
            .search_range(&Key::new("10"), &Key::new("19"), 5, &mut out)
            .unwrap();
        let got: Vec<String> = out.iter().map(|(k, _)| k.as_str().into_owned()).collect();
        assert_eq!(got, vec!["10", "11", "12", "13", "14"]);
        assert_eq!(resume, Some(Key::new("15")));
    }

    #[test]
    fn range_scan_rejects_inverted_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let tree = Tree::open(tmp_path(&dir), true).unwrap();
        let mut out = Vec::new();
        assert!(matches!(
            tree.search_range(&Key::new("9"), &Key::new("1"), 10, &mut out),
            Err(Error::InvalidRange)
        ));
    }

    #[test]
    fn borrow_from_richer_left_sibling_rewrites_separator() {
        crate::init_test_tracing();
        let dir = tempfile::tempdir().unwrap();
        let mut tree = Tree::open(tmp_path(&dir), true).unwrap();

        let total = ORDER * 2 + 4;
        for i in 0..total {
            tree.insert(Key::new(&format!("{:05}", i)), value(i as i32))
                .unwrap();
        }
        assert_occupancy_and_parents(&tree);

        // Deleting a handful of keys from one leaf without draining its
        // sibling below the minimum should trigger a borrow, not a merge.
        for i in 0..3 {
            tree.remove(&Key::new(&format!("{:05}", i))).unwrap();
        }
        assert_occupancy_and_parents(&tree);
        let keys = ordered_leaf_chain(&tree);
        assert_strictly_ascending(&keys);
    }

    #[test]
    fn delete_inverts_insert_back_to_the_empty_tree() {
        crate::init_test_tracing();
        let dir = tempfile::tempdir().unwrap();
        let mut tree = Tree::open(tmp_path(&dir), true).unwrap();

        let total = ORDER * 4;
        let keys: Vec<Key> = (0..total).map(|i| Key::new(&format!("{:05}", i))).collect();
        for k in &keys {
            tree.insert(*k, value(1)).unwrap();
        }
        assert_occupancy_and_parents(&tree);

        // Delete in reverse order to exercise merges on both edges.
        for k in keys.iter().rev() {
            tree.remove(k).unwrap();
        }

        let meta = tree.get_meta();
        assert_eq!(meta.height, 1);
        assert_eq!(meta.leaf_node_num, 1);
        for k in &keys {
            assert_eq!(tree.search(k).unwrap(), None);
        }
    }

    #[test]
    fn reopen_after_mutation_preserves_content_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = tmp_path(&dir);

        let total = ORDER * 2 + 7;
        {
            let mut tree = Tree::open(&path, true).unwrap();
            for i in 0..total {
                tree.insert(Key::new(&format!("{:05}", i)), value(i as i32))
                    .unwrap();
            }
            for i in 0..5 {
                tree.remove(&Key::new(&format!("{:05}", i))).unwrap();
            }
        }

        let tree = Tree::open(&path, false).unwrap();
        let keys = ordered_leaf_chain(&tree);
        assert_strictly_ascending(&keys);
        assert_eq!(keys.len(), total - 5);
        for i in 5..total {
            let v = tree.search(&Key::new(&format!("{:05}", i))).unwrap().unwrap();
            assert_eq!(v.age, i as i32);
        }
        for i in 0..5 {
            assert_eq!(tree.search(&Key::new(&format!("{:05}", i))).unwrap(), None);
        }
    }
}
