//! Node header codec.
//!
//! Every node starts with a 32-byte little-endian header:
//!
//! ```text
//! offset  width  field
//!      0      1  kind (1 = internal, 2 = leaf)
//!      1      1  flags (reserved, zero)
//!      2      2  key_cap
//!      4      2  key_count
//!      6      2  key_size
//!      8      2  value_size (pointer width for internal nodes)
//!     10      2  reserved
//!     12      4  checksum (CRC32, 0 when unsealed)
//!     16      8  next sibling page id (leaf only, 0 = none)
//!     24      8  prev sibling page id (leaf only, 0 = none)
//! ```
//!
//! `key_cap` fixed-width entry slots follow the header with no padding.

use crate::storage::btree::NodeError;
use crate::storage::page::{read_u8, read_u16, read_u32, write_u8, write_u16, write_u32};

/// Size of the node header in bytes.
pub const HEADER_SIZE: usize = 32;

/// Width of a child pointer in an internal entry.
pub const PTR_SIZE: usize = 8;

/// Width of the per-entry value descriptor in a leaf entry.
pub const VALUE_DESCRIPTOR_SIZE: usize = 2;

const KIND_OFFSET: usize = 0;
const FLAGS_OFFSET: usize = 1;
const KEY_CAP_OFFSET: usize = 2;
pub(crate) const KEY_COUNT_OFFSET: usize = 4;
const KEY_SIZE_OFFSET: usize = 6;
const VALUE_SIZE_OFFSET: usize = 8;
const CHECKSUM_OFFSET: usize = 12;
pub(crate) const NEXT_SIBLING_OFFSET: usize = 16;
pub(crate) const PREV_SIBLING_OFFSET: usize = 24;

/// Node kind discriminant.
///
/// Zero is unused, so a zeroed buffer never opens as a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NodeKind {
    Internal = 1,
    Leaf = 2,
}

impl TryFrom<u8> for NodeKind {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Internal),
            2 => Ok(Self::Leaf),
            _ => Err(value),
        }
    }
}

impl NodeKind {
    /// Peek at the kind byte of a buffer.
    #[must_use]
    pub fn of(buf: &[u8]) -> Option<Self> {
        Self::try_from(*buf.first()?).ok()
    }

    /// Bytes one entry slot occupies for this kind.
    #[must_use]
    pub const fn entry_width(self, key_size: usize, value_size: usize) -> usize {
        match self {
            Self::Internal => key_size + value_size,
            Self::Leaf => key_size + VALUE_DESCRIPTOR_SIZE + value_size,
        }
    }
}

/// Decoded node header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeMeta {
    kind: NodeKind,
    key_cap: u16,
    key_count: u16,
    key_size: u16,
    value_size: u16,
}

impl NodeMeta {
    /// Compute the layout of a fresh node over a buffer of `buf_len` bytes.
    ///
    /// `key_cap = (buf_len - HEADER_SIZE) / entry_width`, clamped to what the
    /// u16 header field can hold.
    pub fn compute(
        kind: NodeKind,
        buf_len: usize,
        key_size: usize,
        value_size: usize,
    ) -> Result<Self, NodeError> {
        if key_size == 0 || value_size == 0 {
            return Err(NodeError::InvalidLayout("key and value widths must be non-zero"));
        }
        let key_size_u16 = u16::try_from(key_size)
            .map_err(|_| NodeError::InvalidLayout("key width does not fit the header"))?;
        let value_size_u16 = u16::try_from(value_size)
            .map_err(|_| NodeError::InvalidLayout("value width does not fit the header"))?;

        let entry_width = kind.entry_width(key_size, value_size);
        let key_cap = buf_len.saturating_sub(HEADER_SIZE) / entry_width;
        if key_cap < 1 {
            return Err(NodeError::TooSmall {
                len: buf_len,
                entry_width,
            });
        }

        Ok(Self {
            kind,
            key_cap: u16::try_from(key_cap).unwrap_or(u16::MAX),
            key_count: 0,
            key_size: key_size_u16,
            value_size: value_size_u16,
        })
    }

    /// Decode the header of a previously written buffer.
    ///
    /// Stored fields are trusted apart from a bounds check: the declared
    /// entry region must fit inside the buffer.
    pub fn read(buf: &[u8]) -> Result<Self, NodeError> {
        if buf.len() < HEADER_SIZE {
            return Err(NodeError::InvalidLayout("buffer shorter than node header"));
        }
        let kind = NodeKind::try_from(read_u8(buf, KIND_OFFSET))
            .map_err(|_| NodeError::InvalidLayout("unknown node kind"))?;

        let meta = Self {
            kind,
            key_cap: read_u16(buf, KEY_CAP_OFFSET),
            key_count: read_u16(buf, KEY_COUNT_OFFSET),
            key_size: read_u16(buf, KEY_SIZE_OFFSET),
            value_size: read_u16(buf, VALUE_SIZE_OFFSET),
        };

        if meta.key_size == 0 || meta.value_size == 0 {
            return Err(NodeError::InvalidLayout("key and value widths must be non-zero"));
        }
        if meta.key_cap == 0 || meta.key_count > meta.key_cap {
            return Err(NodeError::InvalidLayout("key count exceeds capacity"));
        }
        if meta.entry_offset(meta.key_cap()) > buf.len() {
            return Err(NodeError::InvalidLayout("entry region exceeds buffer"));
        }

        Ok(meta)
    }

    /// Encode the layout fields. Checksum and sibling fields are untouched.
    pub fn write(&self, buf: &mut [u8]) {
        write_u8(buf, KIND_OFFSET, self.kind as u8);
        write_u8(buf, FLAGS_OFFSET, 0);
        write_u16(buf, KEY_CAP_OFFSET, self.key_cap);
        write_u16(buf, KEY_COUNT_OFFSET, self.key_count);
        write_u16(buf, KEY_SIZE_OFFSET, self.key_size);
        write_u16(buf, VALUE_SIZE_OFFSET, self.value_size);
    }

    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    #[must_use]
    pub const fn key_cap(&self) -> usize {
        self.key_cap as usize
    }

    #[must_use]
    pub const fn key_count(&self) -> usize {
        self.key_count as usize
    }

    #[must_use]
    pub const fn key_size(&self) -> usize {
        self.key_size as usize
    }

    /// Inline value width for leaves, pointer width for internal nodes.
    #[must_use]
    pub const fn value_size(&self) -> usize {
        self.value_size as usize
    }

    #[must_use]
    pub const fn entry_width(&self) -> usize {
        self.kind.entry_width(self.key_size(), self.value_size())
    }

    /// Byte offset of entry slot `i`.
    #[must_use]
    pub const fn entry_offset(&self, i: usize) -> usize {
        HEADER_SIZE + i * self.entry_width()
    }

    /// True when both metas describe the same kind and field widths.
    #[must_use]
    pub fn same_shape(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.key_size == other.key_size
            && self.value_size == other.value_size
    }

    /// Only ever called with `count <= key_cap`.
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) const fn set_key_count(&mut self, count: usize) {
        self.key_count = count as u16;
    }
}

/// CRC32 of the whole buffer with the checksum field read as zero.
///
/// Fails with `InvalidLayout` for a buffer shorter than the node header.
pub fn compute_checksum(buf: &[u8]) -> Result<u32, NodeError> {
    if buf.len() < HEADER_SIZE {
        return Err(NodeError::InvalidLayout("buffer shorter than node header"));
    }
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf[..CHECKSUM_OFFSET]);
    hasher.update(&[0u8; 4]);
    hasher.update(&buf[CHECKSUM_OFFSET + 4..]);
    Ok(hasher.finalize())
}

/// Store the buffer's checksum in its header. Buffers shorter than the
/// header are left untouched; node buffers never are.
pub(crate) fn seal(buf: &mut [u8]) {
    if let Ok(checksum) = compute_checksum(buf) {
        write_u32(buf, CHECKSUM_OFFSET, checksum);
    }
}

/// Check a sealed buffer. An unsealed (zero) checksum always passes.
pub(crate) fn verify(buf: &[u8]) -> Result<(), NodeError> {
    let actual = compute_checksum(buf)?;
    let expected = read_u32(buf, CHECKSUM_OFFSET);
    if expected == 0 || expected == actual {
        Ok(())
    } else {
        Err(NodeError::ChecksumMismatch { expected, actual })
    }
}
