//! Entry-slot machinery shared by internal and leaf nodes.
//!
//! Both node kinds are a header followed by `key_cap` fixed-width slots,
//! sorted by key. They differ only in what follows the key inside a slot,
//! so everything that only looks at keys lives here.

use crate::storage::btree::meta::{self, KEY_COUNT_OFFSET, NodeKind, NodeMeta};
use crate::storage::page::write_u16;
use crate::storage::varchar::VarcharError;

/// Capabilities every node kind exposes to the tree layer.
pub trait BTreeNode {
    /// Decoded header of the node.
    fn meta(&self) -> &NodeMeta;

    /// Key at ordinal position `i`.
    fn key(&self, i: usize) -> Result<&[u8], NodeError>;

    /// True iff an entry with exactly this key exists.
    fn has(&self, key: &[u8]) -> bool;

    /// Move the upper part of this node's entries into the empty `other`.
    fn balance(&mut self, other: &mut Self) -> Result<(), NodeError>;

    /// Store a checksum of the node's buffer in its header. Any later
    /// mutation leaves a stale checksum until the node is sealed again.
    fn seal(&mut self);

    /// Check the stored checksum, if any.
    fn verify(&self) -> Result<(), NodeError>;

    fn key_count(&self) -> usize {
        self.meta().key_count()
    }

    fn key_cap(&self) -> usize {
        self.meta().key_cap()
    }

    fn is_full(&self) -> bool {
        self.key_count() >= self.key_cap()
    }
}

/// A node view over a caller-owned buffer.
///
/// The cached `meta` and the header bytes are kept in sync on every write.
#[derive(Debug)]
pub(crate) struct RawNode<'a> {
    pub(crate) buf: &'a mut [u8],
    pub(crate) meta: NodeMeta,
}

impl<'a> RawNode<'a> {
    /// Lay out a fresh node. The buffer is zeroed first.
    pub(crate) fn create(
        buf: &'a mut [u8],
        kind: NodeKind,
        key_size: usize,
        value_size: usize,
    ) -> Result<Self, NodeError> {
        let meta = NodeMeta::compute(kind, buf.len(), key_size, value_size)?;
        buf.fill(0);
        meta.write(buf);
        Ok(Self { buf, meta })
    }

    /// Re-open a node previously written to `buf`.
    pub(crate) fn open(buf: &'a mut [u8], kind: NodeKind) -> Result<Self, NodeError> {
        let meta = NodeMeta::read(buf)?;
        if meta.kind() != kind {
            return Err(NodeError::WrongNodeType);
        }
        Ok(Self { buf, meta })
    }
}

impl RawNode<'_> {
    pub(crate) fn check_key(&self, key: &[u8]) -> Result<(), NodeError> {
        if key.len() == self.meta.key_size() {
            Ok(())
        } else {
            Err(NodeError::KeySize {
                expected: self.meta.key_size(),
                actual: key.len(),
            })
        }
    }

    pub(crate) const fn check_index(&self, index: usize) -> Result<(), NodeError> {
        if index < self.meta.key_count() {
            Ok(())
        } else {
            Err(NodeError::IndexOutOfRange {
                index,
                key_count: self.meta.key_count(),
            })
        }
    }

    pub(crate) fn key(&self, i: usize) -> Result<&[u8], NodeError> {
        self.check_index(i)?;
        Ok(self.key_at(i))
    }

    /// Key bytes of slot `i`. Callers guarantee `i < key_cap`.
    pub(crate) fn key_at(&self, i: usize) -> &[u8] {
        let offset = self.meta.entry_offset(i);
        &self.buf[offset..offset + self.meta.key_size()]
    }

    /// Bytes following the key in slot `i`.
    pub(crate) fn payload(&self, i: usize) -> &[u8] {
        let start = self.meta.entry_offset(i) + self.meta.key_size();
        let end = self.meta.entry_offset(i + 1);
        &self.buf[start..end]
    }

    pub(crate) fn payload_mut(&mut self, i: usize) -> &mut [u8] {
        let start = self.meta.entry_offset(i) + self.meta.key_size();
        let end = self.meta.entry_offset(i + 1);
        &mut self.buf[start..end]
    }

    /// Index of the first entry whose key is `>= key`.
    pub(crate) fn lower_bound(&self, key: &[u8]) -> usize {
        let (mut lo, mut hi) = (0, self.meta.key_count());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key_at(mid) < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Index of the first entry whose key is `> key`.
    pub(crate) fn upper_bound(&self, key: &[u8]) -> usize {
        let (mut lo, mut hi) = (0, self.meta.key_count());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key_at(mid) <= key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Position of the first entry with exactly this key.
    pub(crate) fn find(&self, key: &[u8]) -> Result<Option<usize>, NodeError> {
        self.check_key(key)?;
        let i = self.lower_bound(key);
        Ok((i < self.meta.key_count() && self.key_at(i) == key).then_some(i))
    }

    pub(crate) fn has(&self, key: &[u8]) -> bool {
        matches!(self.find(key), Ok(Some(_)))
    }

    pub(crate) const fn fits_another(&self) -> bool {
        self.meta.key_count() < self.meta.key_cap()
    }

    /// Open a zeroed slot for `key` after any entries with an equal key and
    /// write the key into it. The caller fills in the payload.
    pub(crate) fn insert_slot(&mut self, key: &[u8]) -> Result<usize, NodeError> {
        self.check_key(key)?;
        if !self.fits_another() {
            return Err(NodeError::Full);
        }

        let count = self.meta.key_count();
        let i = self.upper_bound(key);
        let start = self.meta.entry_offset(i);
        let end = self.meta.entry_offset(count);
        let width = self.meta.entry_width();

        self.buf.copy_within(start..end, start + width);
        self.buf[start..start + width].fill(0);
        self.buf[start..start + key.len()].copy_from_slice(key);
        self.set_key_count(count + 1);
        Ok(i)
    }

    /// Close the gap left by slot `i` and zero the freed tail slot.
    pub(crate) fn remove_slot(&mut self, i: usize) -> Result<(), NodeError> {
        self.check_index(i)?;
        let count = self.meta.key_count();
        let start = self.meta.entry_offset(i);
        let end = self.meta.entry_offset(count);
        let width = self.meta.entry_width();

        self.buf.copy_within(start + width..end, start);
        self.buf[end - width..end].fill(0);
        self.set_key_count(count - 1);
        Ok(())
    }

    pub(crate) fn set_key_count(&mut self, count: usize) {
        self.meta.set_key_count(count);
        #[allow(clippy::cast_possible_truncation)]
        write_u16(self.buf, KEY_COUNT_OFFSET, count as u16);
    }

    pub(crate) fn seal(&mut self) {
        meta::seal(self.buf);
    }

    pub(crate) fn verify(&self) -> Result<(), NodeError> {
        meta::verify(&*self.buf)
    }
}

/// Errors that can occur when working with B-tree nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    /// The buffer cannot host a single entry of the requested widths.
    TooSmall { len: usize, entry_width: usize },
    /// The requested widths or a stored header are not a valid layout.
    InvalidLayout(&'static str),
    /// The buffer holds the other kind of node.
    WrongNodeType,
    /// No room for another entry.
    Full,
    /// No entry has the requested key.
    NotFound,
    /// Ordinal position past the last entry.
    IndexOutOfRange { index: usize, key_count: usize },
    /// Key of the wrong width for this node.
    KeySize { expected: usize, actual: usize },
    /// Balance destination already holds entries.
    SiblingNotEmpty,
    /// Balance destination has different field widths.
    LayoutMismatch,
    /// Stored checksum does not match the buffer.
    ChecksumMismatch { expected: u32, actual: u32 },
    /// The overflow store failed.
    Varchar(VarcharError),
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooSmall { len, entry_width } => write!(
                f,
                "buffer of {len} bytes cannot hold one {entry_width}-byte entry"
            ),
            Self::InvalidLayout(reason) => write!(f, "invalid node layout: {reason}"),
            Self::WrongNodeType => write!(f, "wrong node type for operation"),
            Self::Full => write!(f, "node is full"),
            Self::NotFound => write!(f, "key not found"),
            Self::IndexOutOfRange { index, key_count } => {
                write!(f, "index {index} out of range for {key_count} keys")
            }
            Self::KeySize { expected, actual } => {
                write!(f, "key is {actual} bytes, node keys are {expected} bytes")
            }
            Self::SiblingNotEmpty => write!(f, "balance destination is not empty"),
            Self::LayoutMismatch => write!(f, "balance destination has a different layout"),
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch: expected {expected}, got {actual}")
            }
            Self::Varchar(e) => write!(f, "overflow store error: {e}"),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Varchar(e) => Some(e),
            _ => None,
        }
    }
}

impl From<VarcharError> for NodeError {
    fn from(e: VarcharError) -> Self {
        Self::Varchar(e)
    }
}
