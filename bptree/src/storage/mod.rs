//! Node-level storage for an on-disk B+Tree.
//!
//! # Layout
//!
//! Every node lives in one fixed-size block (`BLOCK_SIZE`, 4KB by default):
//!
//! - A 32-byte node header (kind, capacity, key count, field widths,
//!   checksum, leaf sibling links)
//! - `key_cap` fixed-width entry slots sorted by key
//!
//! Leaf values that do not fit their inline slot are written to a
//! [`varchar::VarcharStore`] and referenced from the slot.
//!
//! # Usage
//!
//! ```
//! use bptree::storage::btree::InternalNode;
//! use bptree::storage::{BLOCK_SIZE, BufferPool};
//!
//! let pool = BufferPool::new(4, BLOCK_SIZE);
//! let mut block = pool.lease_block_zeroed().expect("pool has free blocks");
//! let mut node = InternalNode::new(block.as_bytes_mut(), 8)?;
//!
//! node.put_kp(&42u64.to_be_bytes(), 7)?;
//! assert_eq!(node.find_ptr(&42u64.to_be_bytes())?, 7);
//! # Ok::<(), bptree::storage::btree::NodeError>(())
//! ```

pub mod btree;
pub mod buffer_pool;
pub mod page;
pub mod varchar;

pub use buffer_pool::BufferPool;
pub use page::{BLOCK_SIZE, Block, PageId};
pub use varchar::{MemoryVarchar, PagedVarchar, VarcharError, VarcharRef, VarcharStore};
