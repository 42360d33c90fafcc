//! Tree operations: create/open, point lookup, insert with splits, delete,
//! and forward cursors. One reader-writer lock per tree; lookups and scans
//! share it, inserts and deletes take it exclusively. Traversals pin one
//! page at a time.

use std::sync::Arc;

use eyre::{Result, WrapErr};
use parking_lot::RwLock;
use smallvec::SmallVec;

use crate::error::{db_err, ErrorCode};
use crate::storage::{
    Allocator, PageHeader, PageId, PageType, INVALID_PAGE_ID, PAGE_SIZE,
};

use super::interior::{InteriorNode, InteriorNodeMut};
use super::leaf::{LeafNode, LeafNodeMut, SearchResult, CELL_FIXED_SIZE, LEAF_HEADER_SIZE};
use super::MAX_DEPTH;

struct TreeState {
    root: PageId,
    key_size: u16,
}

/// Ordered map from byte-string keys to byte-string values.
pub struct BTree {
    alloc: Arc<Allocator>,
    state: RwLock<TreeState>,
}

impl BTree {
    /// Allocates a fresh root as an empty leaf.
    pub fn create(alloc: Arc<Allocator>) -> Result<BTree> {
        let root = {
            let mut guard = alloc.allocate()?;
            LeafNodeMut::init(guard.data_mut())?;
            guard.page_id()
        };
        Ok(BTree {
            alloc,
            state: RwLock::new(TreeState { root, key_size: 0 }),
        })
    }

    /// Attaches to an existing root. The separator width is recorded in
    /// internal nodes, so it is recovered from the root when present.
    pub fn open(alloc: Arc<Allocator>, root: PageId) -> Result<BTree> {
        let key_size = {
            let guard = alloc.pool().get(alloc.file(), root)?;
            let header = PageHeader::from_bytes(guard.data())?;
            match header.page_type() {
                Some(PageType::BtreeInternal) => {
                    InteriorNode::from_page(guard.data())?.key_size() as u16
                }
                _ => 0,
            }
        };
        Ok(BTree {
            alloc,
            state: RwLock::new(TreeState { root, key_size }),
        })
    }

    pub fn root_page(&self) -> PageId {
        self.state.read().root
    }

    pub fn allocator(&self) -> &Arc<Allocator> {
        &self.alloc
    }

    /// Point lookup; copies the value out of the leaf.
    pub fn find(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let state = self.state.read();
        let leaf_id = self.descend_to_leaf(state.root, key)?;
        drop(state);

        let guard = self.alloc.pool().get(self.alloc.file(), leaf_id)?;
        let leaf = LeafNode::from_page(guard.data())?;
        match leaf.find_key(key) {
            SearchResult::Found(idx) => Ok(Some(leaf.value_at(idx)?.to_vec())),
            SearchResult::NotFound(_) => Ok(None),
        }
    }

    /// Inserts a new key. Duplicate keys fail with `Constraint`; a cell
    /// that cannot fit even in an empty leaf fails with `Full`.
    pub fn insert(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let max_cell = PAGE_SIZE - LEAF_HEADER_SIZE - 2 - CELL_FIXED_SIZE;
        if key.len() + value.len() > max_cell {
            return Err(db_err(
                ErrorCode::Full,
                format!("cell of {} bytes exceeds page capacity", key.len() + value.len()),
            ));
        }

        let mut state = self.state.write();

        // Descend, recording the internal path for split propagation.
        let mut path: SmallVec<[PageId; MAX_DEPTH]> = SmallVec::new();
        let mut page_id = state.root;
        loop {
            let guard = self.alloc.pool().get(self.alloc.file(), page_id)?;
            let header = PageHeader::from_bytes(guard.data())?;
            match header.page_type() {
                Some(PageType::BtreeLeaf) => break,
                Some(PageType::BtreeInternal) => {
                    let node = InteriorNode::from_page(guard.data())?;
                    let (child, _) = node.find_child(key)?;
                    path.push(page_id);
                    page_id = child;
                }
                other => {
                    return Err(db_err(
                        ErrorCode::Corrupt,
                        format!("unexpected page type {:?} at page {}", other, page_id),
                    ))
                }
            }
        }

        // Fast path: room in the leaf.
        {
            let mut guard = self.alloc.pool().get(self.alloc.file(), page_id)?;
            let mut leaf = LeafNodeMut::from_page(guard.data_mut())?;
            if let SearchResult::Found(_) = leaf.find_key(key) {
                return Err(db_err(ErrorCode::Constraint, "duplicate key"));
            }
            if leaf.fits(key.len(), value.len()) {
                return leaf.insert_cell(key, value);
            }
        }

        // Split the leaf and propagate.
        let (separator, new_leaf) = self.split_leaf(page_id, key, value)?;
        if state.key_size == 0 {
            state.key_size = separator.len().clamp(1, u16::MAX as usize) as u16;
        }
        self.propagate_split(&mut state, path, page_id, separator, new_leaf)
            .wrap_err("propagating leaf split")
    }

    /// Removes a key. Returns false when it was not present.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        let state = self.state.write();
        let leaf_id = self.descend_to_leaf(state.root, key)?;

        let mut guard = self.alloc.pool().get(self.alloc.file(), leaf_id)?;
        let mut leaf = LeafNodeMut::from_page(guard.data_mut())?;
        match leaf.find_key(key) {
            SearchResult::Found(idx) => {
                leaf.delete_cell(idx)?;
                Ok(true)
            }
            SearchResult::NotFound(_) => Ok(false),
        }
    }

    /// Largest key in the tree, or `None` when empty. Descends the
    /// rightmost spine and walks the leaf chain backwards past empty
    /// leaves.
    pub fn last_key(&self) -> Result<Option<Vec<u8>>> {
        let state = self.state.read();
        let mut page_id = state.root;
        drop(state);

        loop {
            let guard = self.alloc.pool().get(self.alloc.file(), page_id)?;
            let header = PageHeader::from_bytes(guard.data())?;
            match header.page_type() {
                Some(PageType::BtreeInternal) => {
                    let node = InteriorNode::from_page(guard.data())?;
                    page_id = node.child_at(node.key_count())?;
                }
                Some(PageType::BtreeLeaf) => break,
                other => {
                    return Err(db_err(
                        ErrorCode::Corrupt,
                        format!("unexpected page type {:?} at page {}", other, page_id),
                    ))
                }
            }
        }

        loop {
            let guard = self.alloc.pool().get(self.alloc.file(), page_id)?;
            let leaf = LeafNode::from_page(guard.data())?;
            let count = leaf.key_count();
            if count > 0 {
                return Ok(Some(leaf.key_at(count - 1)?.to_vec()));
            }
            let prev = leaf.prev_leaf();
            if prev == INVALID_PAGE_ID {
                return Ok(None);
            }
            page_id = prev;
        }
    }

    /// Returns every page of the tree to the freelist. The tree handle is
    /// unusable afterwards.
    pub fn free_pages(&self) -> Result<()> {
        let state = self.state.write();
        let mut pending: Vec<PageId> = vec![state.root];

        while let Some(page_id) = pending.pop() {
            {
                let guard = self.alloc.pool().get(self.alloc.file(), page_id)?;
                let header = PageHeader::from_bytes(guard.data())?;
                if header.page_type() == Some(PageType::BtreeInternal) {
                    let node = InteriorNode::from_page(guard.data())?;
                    for i in 0..=node.key_count() {
                        pending.push(node.child_at(i)?);
                    }
                }
            }
            self.alloc.free_page(page_id)?;
        }
        Ok(())
    }

    /// Opens a forward cursor. `tree` is shared so scan state can own it.
    pub fn cursor(self: &Arc<BTree>) -> Cursor {
        Cursor {
            tree: Arc::clone(self),
            page: INVALID_PAGE_ID,
            slot: 0,
            valid: false,
        }
    }

    fn descend_to_leaf(&self, mut page_id: PageId, key: &[u8]) -> Result<PageId> {
        loop {
            let guard = self.alloc.pool().get(self.alloc.file(), page_id)?;
            let header = PageHeader::from_bytes(guard.data())?;
            match header.page_type() {
                Some(PageType::BtreeLeaf) => return Ok(page_id),
                Some(PageType::BtreeInternal) => {
                    let node = InteriorNode::from_page(guard.data())?;
                    let (child, _) = node.find_child(key)?;
                    page_id = child;
                }
                other => {
                    return Err(db_err(
                        ErrorCode::Corrupt,
                        format!("unexpected page type {:?} at page {}", other, page_id),
                    ))
                }
            }
        }
    }

    fn leftmost_leaf(&self, mut page_id: PageId) -> Result<PageId> {
        loop {
            let guard = self.alloc.pool().get(self.alloc.file(), page_id)?;
            let header = PageHeader::from_bytes(guard.data())?;
            match header.page_type() {
                Some(PageType::BtreeLeaf) => return Ok(page_id),
                Some(PageType::BtreeInternal) => {
                    page_id = InteriorNode::from_page(guard.data())?.child_at(0)?;
                }
                other => {
                    return Err(db_err(
                        ErrorCode::Corrupt,
                        format!("unexpected page type {:?} at page {}", other, page_id),
                    ))
                }
            }
        }
    }

    /// Splits a full leaf around the median. The separator is the first
    /// key of the new right sibling, and the leaf chain is relinked,
    /// including the old right neighbor's prev pointer.
    fn split_leaf(
        &self,
        page_id: PageId,
        new_key: &[u8],
        new_value: &[u8],
    ) -> Result<(Vec<u8>, PageId)> {
        let mut keys: Vec<Vec<u8>> = Vec::new();
        let mut values: Vec<Vec<u8>> = Vec::new();
        let (old_next, old_prev);
        {
            let guard = self.alloc.pool().get(self.alloc.file(), page_id)?;
            let leaf = LeafNode::from_page(guard.data())?;
            old_next = leaf.next_leaf();
            old_prev = leaf.prev_leaf();
            for i in 0..leaf.key_count() {
                keys.push(leaf.key_at(i)?.to_vec());
                values.push(leaf.value_at(i)?.to_vec());
            }
        }

        let pos = keys
            .iter()
            .position(|k| k.as_slice() > new_key)
            .unwrap_or(keys.len());
        keys.insert(pos, new_key.to_vec());
        values.insert(pos, new_value.to_vec());

        let mid = keys.len() / 2;
        let separator = keys[mid].clone();

        let new_leaf_id = {
            let mut guard = self.alloc.allocate()?;
            let new_id = guard.page_id();
            let mut right = LeafNodeMut::init(guard.data_mut())?;
            for i in mid..keys.len() {
                right.insert_cell(&keys[i], &values[i])?;
            }
            right.set_prev_leaf(page_id);
            right.set_next_leaf(old_next);
            new_id
        };

        {
            let mut guard = self.alloc.pool().get(self.alloc.file(), page_id)?;
            let mut left = LeafNodeMut::init(guard.data_mut())?;
            for i in 0..mid {
                left.insert_cell(&keys[i], &values[i])?;
            }
            left.set_prev_leaf(old_prev);
            left.set_next_leaf(new_leaf_id);
        }

        if old_next != INVALID_PAGE_ID {
            let mut guard = self.alloc.pool().get(self.alloc.file(), old_next)?;
            LeafNodeMut::from_page(guard.data_mut())?.set_prev_leaf(new_leaf_id);
        }

        Ok((separator, new_leaf_id))
    }

    /// Walks the recorded path upward inserting separators, splitting
    /// internal nodes as needed; grows a new root when the split reaches
    /// the top.
    fn propagate_split(
        &self,
        state: &mut TreeState,
        mut path: SmallVec<[PageId; MAX_DEPTH]>,
        mut left: PageId,
        mut separator: Vec<u8>,
        mut right: PageId,
    ) -> Result<()> {
        while let Some(parent_id) = path.pop() {
            {
                let mut guard = self.alloc.pool().get(self.alloc.file(), parent_id)?;
                let mut node = InteriorNodeMut::from_page(guard.data_mut())?;
                if node.has_room() {
                    return node.insert_separator(&separator, right);
                }
            }

            let (promoted, new_right) =
                self.split_interior(parent_id, &separator, right, state.key_size as usize)?;
            left = parent_id;
            separator = promoted;
            right = new_right;
        }

        // The root itself split: grow the tree by one level.
        let new_root = {
            let mut guard = self.alloc.allocate()?;
            let new_id = guard.page_id();
            let mut root =
                InteriorNodeMut::init(guard.data_mut(), state.key_size as usize, left)?;
            root.insert_separator(&separator, right)?;
            new_id
        };
        state.root = new_root;
        Ok(())
    }

    fn split_interior(
        &self,
        page_id: PageId,
        new_separator: &[u8],
        new_right_child: PageId,
        key_size: usize,
    ) -> Result<(Vec<u8>, PageId)> {
        let mut keys: Vec<Vec<u8>> = Vec::new();
        let mut children: Vec<PageId> = Vec::new();
        {
            let guard = self.alloc.pool().get(self.alloc.file(), page_id)?;
            let node = InteriorNode::from_page(guard.data())?;
            for i in 0..node.key_count() {
                keys.push(node.key_at(i)?.to_vec());
            }
            for i in 0..=node.key_count() {
                children.push(node.child_at(i)?);
            }
        }

        let mut padded = new_separator.to_vec();
        padded.resize(key_size, 0);
        let pos = keys
            .iter()
            .position(|k| k.as_slice() > padded.as_slice())
            .unwrap_or(keys.len());
        keys.insert(pos, padded);
        children.insert(pos + 1, new_right_child);

        let mid = keys.len() / 2;
        let promoted = keys[mid].clone();

        {
            let mut guard = self.alloc.pool().get(self.alloc.file(), page_id)?;
            let mut node = InteriorNodeMut::init(guard.data_mut(), key_size, children[0])?;
            for i in 0..mid {
                node.insert_separator(&keys[i], children[i + 1])?;
            }
        }

        let new_page = {
            let mut guard = self.alloc.allocate()?;
            let new_id = guard.page_id();
            let mut node =
                InteriorNodeMut::init(guard.data_mut(), key_size, children[mid + 1])?;
            for i in mid + 1..keys.len() {
                node.insert_separator(&keys[i], children[i + 1])?;
            }
            new_id
        };

        Ok((promoted, new_page))
    }
}

/// Forward-only cursor. Holds no page pin between steps; semantics under
/// concurrent modification are undefined.
pub struct Cursor {
    tree: Arc<BTree>,
    page: PageId,
    slot: usize,
    valid: bool,
}

impl Cursor {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Positions at the smallest key. Invalid on an empty tree.
    pub fn first(&mut self) -> Result<()> {
        let root = self.tree.root_page();
        let mut leaf_id = self.tree.leftmost_leaf(root)?;

        loop {
            let guard = self.tree.alloc.pool().get(self.tree.alloc.file(), leaf_id)?;
            let leaf = LeafNode::from_page(guard.data())?;
            if leaf.key_count() > 0 {
                self.page = leaf_id;
                self.slot = 0;
                self.valid = true;
                return Ok(());
            }
            let next = leaf.next_leaf();
            if next == INVALID_PAGE_ID {
                self.valid = false;
                return Ok(());
            }
            leaf_id = next;
        }
    }

    /// Positions at `key`, or at the first greater key. Returns whether
    /// the hit was exact; the cursor is invalid past the last key.
    pub fn seek(&mut self, key: &[u8]) -> Result<bool> {
        let root = self.tree.root_page();
        let leaf_id = self.tree.descend_to_leaf(root, key)?;

        let (slot, exact, count, next) = {
            let guard = self.tree.alloc.pool().get(self.tree.alloc.file(), leaf_id)?;
            let leaf = LeafNode::from_page(guard.data())?;
            let (slot, exact) = match leaf.find_key(key) {
                SearchResult::Found(idx) => (idx, true),
                SearchResult::NotFound(idx) => (idx, false),
            };
            (slot, exact, leaf.key_count(), leaf.next_leaf())
        };

        if slot < count {
            self.page = leaf_id;
            self.slot = slot;
            self.valid = true;
            return Ok(exact);
        }

        // Past the last cell of this leaf; continue down the chain.
        let mut leaf_id = next;
        while leaf_id != INVALID_PAGE_ID {
            let guard = self.tree.alloc.pool().get(self.tree.alloc.file(), leaf_id)?;
            let leaf = LeafNode::from_page(guard.data())?;
            if leaf.key_count() > 0 {
                self.page = leaf_id;
                self.slot = 0;
                self.valid = true;
                return Ok(false);
            }
            leaf_id = leaf.next_leaf();
        }

        self.valid = false;
        Ok(false)
    }

    /// Steps forward: within the page, then along the leaf chain.
    pub fn next(&mut self) -> Result<()> {
        if !self.valid {
            return Err(db_err(ErrorCode::Misuse, "next on invalid cursor"));
        }

        let (count, mut next) = {
            let guard = self.tree.alloc.pool().get(self.tree.alloc.file(), self.page)?;
            let leaf = LeafNode::from_page(guard.data())?;
            (leaf.key_count(), leaf.next_leaf())
        };

        if self.slot + 1 < count {
            self.slot += 1;
            return Ok(());
        }

        while next != INVALID_PAGE_ID {
            let guard = self.tree.alloc.pool().get(self.tree.alloc.file(), next)?;
            let leaf = LeafNode::from_page(guard.data())?;
            if leaf.key_count() > 0 {
                self.page = next;
                self.slot = 0;
                return Ok(());
            }
            next = leaf.next_leaf();
        }

        self.valid = false;
        Ok(())
    }

    pub fn key(&self) -> Result<Vec<u8>> {
        self.cell(|k, _| k.to_vec())
    }

    pub fn value(&self) -> Result<Vec<u8>> {
        self.cell(|_, v| v.to_vec())
    }

    pub fn entry(&self) -> Result<(Vec<u8>, Vec<u8>)> {
        self.cell(|k, v| (k.to_vec(), v.to_vec()))
    }

    fn cell<T>(&self, f: impl FnOnce(&[u8], &[u8]) -> T) -> Result<T> {
        if !self.valid {
            return Err(db_err(ErrorCode::Misuse, "cursor is not positioned"));
        }
        let guard = self.tree.alloc.pool().get(self.tree.alloc.file(), self.page)?;
        let leaf = LeafNode::from_page(guard.data())?;
        Ok(f(leaf.key_at(self.slot)?, leaf.value_at(self.slot)?))
    }
}
