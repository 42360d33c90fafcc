//! # B+Tree
//!
//! Ordered persistent map from byte-string keys to byte-string values,
//! with forward and seek-based cursors. All data lives in leaf pages;
//! internal nodes hold fixed-width separator keys and child pointers;
//! leaves are chained left-to-right for range scans.
//!
//! ## Leaf Page Layout
//!
//! ```text
//! +--------------------+
//! | PageHeader (32B)   |
//! +--------------------+
//! | key_count  u16     |
//! | next_leaf  u64     |  page id of the right sibling
//! | prev_leaf  u64     |  page id of the left sibling
//! +--------------------+
//! | cell offsets (u16) |  sorted by key, grows from low addresses
//! |        ...         |
//! |     free space     |
//! |        ...         |
//! | cells              |  allocated from the page tail
//! +--------------------+
//! ```
//!
//! A cell is `key_len u16, value_len u16, key bytes, value bytes`.
//! Deleting removes the offset only; cell bytes are reclaimed when the
//! page is rebuilt during a split.
//!
//! ## Internal Page Layout
//!
//! ```text
//! +--------------------+
//! | PageHeader (32B)   |
//! +--------------------+
//! | key_count u16      |
//! | key_size  u16      |  fixed separator width, set at first split
//! +--------------------+
//! | child0 u64         |
//! | key0, child1 u64   |  packed: child0, key0, child1, key1, ...
//! | key1, child2 u64   |
//! +--------------------+
//! ```
//!
//! Separators are padded or truncated to `key_size`; search keys are
//! compared as if zero-padded to the same width. `key_i` is the smallest
//! key reachable through `child_{i+1}`, so equal keys descend right.

mod interior;
mod leaf;
mod tree;

pub use interior::{InteriorNode, InteriorNodeMut, INTERIOR_HEADER_SIZE};
pub use leaf::{LeafNode, LeafNodeMut, SearchResult, CELL_FIXED_SIZE, LEAF_HEADER_SIZE};
pub use tree::{BTree, Cursor};

/// Soft bound on tree depth, used to size the insert path stack.
pub const MAX_DEPTH: usize = 32;
