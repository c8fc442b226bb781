//! Overflow ("varchar") storage for leaf values that do not fit inline.
//!
//! A leaf slot that overflows holds only an 8-byte [`VarcharRef`]. The
//! bytes themselves live in a [`VarcharStore`].
//!
//! # Overflow Block Format (`PagedVarchar`)
//!
//! ```text
//! +--------+----------+----------+-----------+-----------+-------------+-----------+
//! | Kind   | Reserved | Checksum | Next Page | Chunk Len | Total Len   | Data...   |
//! | 1 byte | 3 bytes  | 4 bytes  | 8 bytes   | 4 bytes   | 4 bytes     | variable  |
//! +--------+----------+----------+-----------+-----------+-------------+-----------+
//! ```
//!
//! The checksum is a CRC32 of the chunk's data bytes. `Total Len` is the
//! full payload length and is repeated on every block of a chain.

#![allow(clippy::cast_possible_truncation)]

use std::collections::HashMap;
use std::sync::Arc;

use crate::storage::buffer_pool::BufferPool;
use crate::storage::page::{Block, PageId, read_u8, read_u32, read_u64, write_u8, write_u32, write_u64};

/// Kind byte stamped on every overflow block.
pub const OVERFLOW_KIND: u8 = 0x05;

/// Size of the overflow block header.
pub const OVERFLOW_HEADER_SIZE: usize = 24;

const CHECKSUM_OFFSET: usize = 4;
const NEXT_OFFSET: usize = 8;
const CHUNK_LEN_OFFSET: usize = 16;
const TOTAL_LEN_OFFSET: usize = 20;

/// Size of a reference as stored in a leaf slot.
pub const VARCHAR_REF_SIZE: usize = 8;

/// An opaque handle to a payload held by a [`VarcharStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarcharRef(pub u64);

impl VarcharRef {
    /// Serialize the reference as stored in a leaf slot.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; VARCHAR_REF_SIZE] {
        self.0.to_le_bytes()
    }

    /// Deserialize a reference from the first 8 bytes of a leaf slot.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let raw: [u8; VARCHAR_REF_SIZE] = bytes.get(..VARCHAR_REF_SIZE)?.try_into().ok()?;
        Some(Self(u64::from_le_bytes(raw)))
    }
}

impl std::fmt::Display for VarcharRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "varchar#{}", self.0)
    }
}

/// Companion storage for arbitrarily sized byte payloads.
///
/// Implementations may perform I/O; callers treat every call as
/// potentially blocking.
pub trait VarcharStore {
    /// Store a payload and return a reference to it.
    fn store(&mut self, bytes: &[u8]) -> Result<VarcharRef, VarcharError>;

    /// Fetch the payload behind a reference.
    fn fetch(&self, reference: VarcharRef) -> Result<Vec<u8>, VarcharError>;

    /// Release the payload behind a reference.
    fn free(&mut self, reference: VarcharRef) -> Result<(), VarcharError>;
}

/// Heap-backed varchar store.
#[derive(Debug, Default)]
pub struct MemoryVarchar {
    values: HashMap<u64, Vec<u8>>,
    next_id: u64,
}

impl MemoryVarchar {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live payloads.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl VarcharStore for MemoryVarchar {
    fn store(&mut self, bytes: &[u8]) -> Result<VarcharRef, VarcharError> {
        if bytes.is_empty() {
            return Err(VarcharError::EmptyValue);
        }
        // Zero is never handed out so a zeroed slot is never a live reference.
        self.next_id += 1;
        self.values.insert(self.next_id, bytes.to_vec());
        Ok(VarcharRef(self.next_id))
    }

    fn fetch(&self, reference: VarcharRef) -> Result<Vec<u8>, VarcharError> {
        self.values
            .get(&reference.0)
            .cloned()
            .ok_or(VarcharError::UnknownRef(reference))
    }

    fn free(&mut self, reference: VarcharRef) -> Result<(), VarcharError> {
        self.values
            .remove(&reference.0)
            .map(|_| ())
            .ok_or(VarcharError::UnknownRef(reference))
    }
}

/// Varchar store that chains payloads across overflow blocks leased from a
/// [`BufferPool`]. A reference is the page id of the first block.
#[derive(Debug)]
pub struct PagedVarchar {
    pool: Arc<BufferPool>,
    blocks: HashMap<PageId, Block>,
    next_page: PageId,
}

impl PagedVarchar {
    /// Create a store over `pool`.
    ///
    /// # Panics
    /// Panics if the pool's blocks cannot hold the overflow header plus one byte.
    #[must_use]
    pub fn new(pool: Arc<BufferPool>) -> Self {
        assert!(
            pool.block_size() > OVERFLOW_HEADER_SIZE,
            "Overflow blocks must be larger than the overflow header"
        );
        Self {
            pool,
            blocks: HashMap::new(),
            next_page: 1,
        }
    }

    /// Payload bytes carried by each overflow block.
    #[must_use]
    pub fn data_per_block(&self) -> usize {
        self.pool.block_size() - OVERFLOW_HEADER_SIZE
    }

    /// Number of overflow blocks currently held.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    fn block(&self, page: PageId) -> Result<&[u8], VarcharError> {
        self.blocks
            .get(&page)
            .map(Block::as_bytes)
            .ok_or(VarcharError::UnknownRef(VarcharRef(page)))
    }

    fn release_chain(&mut self, pages: &[PageId]) {
        for page in pages {
            self.blocks.remove(page);
        }
    }
}

impl VarcharStore for PagedVarchar {
    fn store(&mut self, bytes: &[u8]) -> Result<VarcharRef, VarcharError> {
        if bytes.is_empty() {
            return Err(VarcharError::EmptyValue);
        }
        let total_len = u32::try_from(bytes.len()).map_err(|_| VarcharError::LengthMismatch {
            expected: u32::MAX as usize,
            actual: bytes.len(),
        })?;

        let chunk_size = self.data_per_block();
        let mut pages = Vec::with_capacity(bytes.len().div_ceil(chunk_size));

        for chunk in bytes.chunks(chunk_size) {
            let Some(mut block) = self.pool.lease_block_zeroed() else {
                self.release_chain(&pages);
                return Err(VarcharError::PoolExhausted);
            };
            let buf = block.as_bytes_mut();
            write_u8(buf, 0, OVERFLOW_KIND);
            write_u32(buf, CHECKSUM_OFFSET, crc32fast::hash(chunk));
            write_u32(buf, CHUNK_LEN_OFFSET, chunk.len() as u32);
            write_u32(buf, TOTAL_LEN_OFFSET, total_len);
            buf[OVERFLOW_HEADER_SIZE..OVERFLOW_HEADER_SIZE + chunk.len()].copy_from_slice(chunk);

            let page = self.next_page;
            self.next_page += 1;
            self.blocks.insert(page, block);

            if let Some(prev_block) = pages.last().and_then(|prev| self.blocks.get_mut(prev)) {
                write_u64(prev_block.as_bytes_mut(), NEXT_OFFSET, page);
            }
            pages.push(page);
        }

        let first = pages[0];
        tracing::trace!(first_page = first, blocks = pages.len(), len = bytes.len(), "stored overflow value");
        Ok(VarcharRef(first))
    }

    fn fetch(&self, reference: VarcharRef) -> Result<Vec<u8>, VarcharError> {
        let first = self.block(reference.0)?;
        let total_len = read_u32(first, TOTAL_LEN_OFFSET) as usize;
        let mut result = Vec::with_capacity(total_len);
        let mut current = reference.0;
        let mut hops = 0;

        while current != 0 {
            hops += 1;
            if hops > self.blocks.len() {
                return Err(VarcharError::Corrupt {
                    page: current,
                    reason: "overflow chain loops",
                });
            }

            let buf = self.block(current)?;
            if read_u8(buf, 0) != OVERFLOW_KIND {
                return Err(VarcharError::Corrupt {
                    page: current,
                    reason: "not an overflow block",
                });
            }
            let chunk_len = read_u32(buf, CHUNK_LEN_OFFSET) as usize;
            let Some(chunk) = buf.get(OVERFLOW_HEADER_SIZE..OVERFLOW_HEADER_SIZE + chunk_len) else {
                return Err(VarcharError::Corrupt {
                    page: current,
                    reason: "chunk length exceeds block",
                });
            };
            if crc32fast::hash(chunk) != read_u32(buf, CHECKSUM_OFFSET) {
                return Err(VarcharError::Corrupt {
                    page: current,
                    reason: "chunk checksum mismatch",
                });
            }
            result.extend_from_slice(chunk);
            current = read_u64(buf, NEXT_OFFSET);
        }

        if result.len() != total_len {
            return Err(VarcharError::LengthMismatch {
                expected: total_len,
                actual: result.len(),
            });
        }

        Ok(result)
    }

    fn free(&mut self, reference: VarcharRef) -> Result<(), VarcharError> {
        // Validate the whole chain before releasing anything.
        self.fetch(reference)?;

        let mut current = reference.0;
        let mut freed = 0usize;
        while current != 0 {
            let next = match self.blocks.remove(&current) {
                Some(block) => read_u64(block.as_bytes(), NEXT_OFFSET),
                None => 0,
            };
            freed += 1;
            current = next;
        }
        tracing::trace!(first_page = reference.0, blocks = freed, "freed overflow value");
        Ok(())
    }
}

/// Errors that can occur during overflow operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarcharError {
    /// Empty value (overflow not needed).
    EmptyValue,
    /// The reference does not name a live payload.
    UnknownRef(VarcharRef),
    /// No buffer left to hold the payload.
    PoolExhausted,
    /// An overflow block failed validation.
    Corrupt { page: PageId, reason: &'static str },
    /// Length mismatch when reading.
    LengthMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for VarcharError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyValue => write!(f, "empty value cannot use overflow"),
            Self::UnknownRef(r) => write!(f, "unknown overflow reference {r}"),
            Self::PoolExhausted => write!(f, "buffer pool exhausted"),
            Self::Corrupt { page, reason } => {
                write!(f, "corrupt overflow block {page}: {reason}")
            }
            Self::LengthMismatch { expected, actual } => {
                write!(
                    f,
                    "overflow length mismatch: expected {expected}, got {actual}"
                )
            }
        }
    }
}

impl std::error::Error for VarcharError {}
