//! Internal (routing) nodes: sorted `(key, child page id)` pairs.
//!
//! Entry slot layout: `key (key_size) | child (8 bytes, u64 LE)`.

use crate::storage::btree::meta::{NodeKind, NodeMeta, PTR_SIZE};
use crate::storage::btree::node::{BTreeNode, NodeError, RawNode};
use crate::storage::page::{PageId, read_u64, write_u64};

/// An internal B-tree node over a caller-owned buffer.
///
/// Keys are not deduplicated: routing keys may legitimately repeat at
/// tree boundaries, and a repeated key is inserted after its equals.
#[derive(Debug)]
pub struct InternalNode<'a> {
    node: RawNode<'a>,
}

impl<'a> InternalNode<'a> {
    /// Create an empty internal node, zeroing `buf`.
    pub fn new(buf: &'a mut [u8], key_size: usize) -> Result<Self, NodeError> {
        Ok(Self {
            node: RawNode::create(buf, NodeKind::Internal, key_size, PTR_SIZE)?,
        })
    }

    /// Re-open an internal node previously written to `buf`.
    pub fn open(buf: &'a mut [u8]) -> Result<Self, NodeError> {
        let node = RawNode::open(buf, NodeKind::Internal)?;
        if node.meta.value_size() != PTR_SIZE {
            return Err(NodeError::InvalidLayout("internal pointer width must be 8"));
        }
        Ok(Self { node })
    }
}

impl InternalNode<'_> {
    /// Child pointer of the first entry with exactly this key.
    pub fn find_ptr(&self, key: &[u8]) -> Result<PageId, NodeError> {
        let i = self.node.find(key)?.ok_or(NodeError::NotFound)?;
        Ok(self.ptr_at(i))
    }

    /// Child pointer at ordinal position `i`.
    pub fn ptr(&self, i: usize) -> Result<PageId, NodeError> {
        self.node.check_index(i)?;
        Ok(self.ptr_at(i))
    }

    /// Insert a `(key, child)` pair at its sorted position.
    pub fn put_kp(&mut self, key: &[u8], ptr: PageId) -> Result<(), NodeError> {
        let i = self.node.insert_slot(key)?;
        write_u64(self.node.payload_mut(i), 0, ptr);
        Ok(())
    }

    /// Remove the first entry with this key, returning its child pointer.
    pub fn remove_kp(&mut self, key: &[u8]) -> Result<PageId, NodeError> {
        let i = self.node.find(key)?.ok_or(NodeError::NotFound)?;
        let ptr = self.ptr_at(i);
        self.node.remove_slot(i)?;
        Ok(ptr)
    }

    /// Route a search key: the child of the last entry whose key is
    /// `<= key`. Fails with `NotFound` when every key is greater.
    pub fn child_for(&self, key: &[u8]) -> Result<PageId, NodeError> {
        self.node.check_key(key)?;
        match self.node.upper_bound(key) {
            0 => Err(NodeError::NotFound),
            i => Ok(self.ptr_at(i - 1)),
        }
    }

    /// True when another entry can be inserted.
    #[must_use]
    pub const fn fits_another(&self) -> bool {
        self.node.fits_another()
    }

    fn ptr_at(&self, i: usize) -> PageId {
        read_u64(self.node.payload(i), 0)
    }
}

impl BTreeNode for InternalNode<'_> {
    fn meta(&self) -> &NodeMeta {
        &self.node.meta
    }

    fn key(&self, i: usize) -> Result<&[u8], NodeError> {
        self.node.key(i)
    }

    fn has(&self, key: &[u8]) -> bool {
        self.node.has(key)
    }

    fn balance(&mut self, other: &mut Self) -> Result<(), NodeError> {
        self.node.balance_into(&mut other.node).map(|_| ())
    }

    fn seal(&mut self) {
        self.node.seal();
    }

    fn verify(&self) -> Result<(), NodeError> {
        self.node.verify()
    }
}
