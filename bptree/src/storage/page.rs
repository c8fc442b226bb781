//! Block buffers and the fixed-width little-endian codec used by every
//! on-disk structure.
//!
//! Nodes never reinterpret memory as structs. Every header field and entry
//! slot is read and written through the offset + width helpers below.

use std::sync::Arc;

use crate::storage::buffer_pool::BufferPool;

/// Default block size in bytes (4KB). One block holds one node.
pub const BLOCK_SIZE: usize = 4096;

/// A page identifier (0-indexed block number). Zero doubles as "no page".
pub type PageId = u64;

/// Read a u8 at the given offset.
#[must_use]
pub fn read_u8(buf: &[u8], offset: usize) -> u8 {
    buf[offset]
}

/// Write a u8 at the given offset.
pub fn write_u8(buf: &mut [u8], offset: usize, value: u8) {
    buf[offset] = value;
}

/// Read a u16 (little-endian) at the given offset.
#[must_use]
pub fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

/// Write a u16 (little-endian) at the given offset.
pub fn write_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

/// Read a u32 (little-endian) at the given offset.
#[must_use]
pub fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Write a u32 (little-endian) at the given offset.
pub fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Read a u64 (little-endian) at the given offset.
#[must_use]
pub fn read_u64(buf: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Write a u64 (little-endian) at the given offset.
pub fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// A raw block buffer.
///
/// Blocks leased from a [`BufferPool`] go back to it when dropped.
pub struct Block {
    data: Option<Box<[u8]>>,
    pool: Option<Arc<BufferPool>>,
}

impl Block {
    /// Create a new zeroed block of `len` bytes that belongs to no pool.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            data: Some(vec![0u8; len].into_boxed_slice()),
            pool: None,
        }
    }

    /// Wrap a buffer leased from `pool`.
    pub(crate) const fn from_pool(data: Box<[u8]>, pool: Arc<BufferPool>) -> Self {
        Self {
            data: Some(data),
            pool: Some(pool),
        }
    }

    /// Get the raw block data.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    /// Get mutable access to the raw block data.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_deref_mut().unwrap_or_default()
    }

    /// Block length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    /// True for a zero-length block.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        if let (Some(data), Some(pool)) = (self.data.take(), self.pool.take()) {
            pool.return_buffer(data);
        }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes = self.as_bytes();
        f.debug_struct("Block")
            .field("len", &bytes.len())
            .field("first_16_bytes", &&bytes[..bytes.len().min(16)])
            .finish_non_exhaustive()
    }
}
