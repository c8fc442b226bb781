//! B+Tree node layer.
//!
//! This module packs, searches, inserts into and splits fixed-size node
//! buffers. Deciding when to split and rewiring parents is left to the
//! tree layer above.
//!
//! # Structure
//!
//! - Internal nodes: sorted keys with 64-bit child page ids
//! - Leaf nodes: sorted keys with values, duplicate keys allowed; values
//!   too large for the inline slot live in a [`VarcharStore`]
//!
//! # Usage
//!
//! ```
//! use bptree::storage::btree::{BTreeNode, LeafNode};
//! use bptree::storage::varchar::MemoryVarchar;
//!
//! let mut store = MemoryVarchar::new();
//! let mut buf = vec![0u8; 1024];
//! let mut leaf = LeafNode::new(&mut buf, 8, 8)?;
//!
//! leaf.put_kv(&mut store, &1u64.to_be_bytes(), b"short")?;
//! leaf.put_kv(&mut store, &2u64.to_be_bytes(), b"longer than eight bytes")?;
//!
//! assert_eq!(leaf.key_count(), 2);
//! assert_eq!(leaf.first_value(&store, &2u64.to_be_bytes())?, b"longer than eight bytes");
//! # Ok::<(), bptree::storage::btree::NodeError>(())
//! ```
//!
//! [`VarcharStore`]: crate::storage::varchar::VarcharStore

mod balance;
mod internal;
mod leaf;
mod meta;
mod node;

pub use internal::InternalNode;
pub use leaf::{LeafNode, LeafValue, MAX_VALUE_SIZE};
pub use meta::{
    HEADER_SIZE, NodeKind, NodeMeta, PTR_SIZE, VALUE_DESCRIPTOR_SIZE, compute_checksum,
};
pub use node::{BTreeNode, NodeError};
