//! Buffer pool for pre-allocated block buffers.
//!
//! The pool is the buffer provider that node code runs against: it hands
//! out fixed-size blocks that are returned automatically when dropped.
//!
//! # Design
//!
//! - Pre-allocates all buffers at construction time
//! - Uses a free list (Vec) for O(1) lease/return
//! - Returns buffers automatically via RAII (Drop on `Block`)
//! - Thread-safe: uses Mutex for internal synchronization
//!
//! # Invariants
//!
//! - Pool capacity and block size are fixed after construction
//! - Free list size + leased count == capacity

use std::sync::{Arc, Mutex};

use crate::storage::page::Block;

/// A buffer pool that pre-allocates block buffers.
///
/// # Invariants
/// - `free_list.len() + leased_count == capacity`
/// - every buffer is `block_size` bytes
pub struct BufferPool {
    free_list: Mutex<Vec<Box<[u8]>>>,
    capacity: usize,
    block_size: usize,
}

impl BufferPool {
    /// Create a new buffer pool with `capacity` blocks of `block_size` bytes.
    ///
    /// # Panics
    /// Panics if capacity or block size is 0.
    #[must_use]
    pub fn new(capacity: usize, block_size: usize) -> Arc<Self> {
        assert!(capacity > 0, "Buffer pool capacity must be positive");
        assert!(block_size > 0, "Buffer pool block size must be positive");

        let free_list = (0..capacity)
            .map(|_| vec![0u8; block_size].into_boxed_slice())
            .collect();

        tracing::debug!(capacity, block_size, "buffer pool allocated");

        Arc::new(Self {
            free_list: Mutex::new(free_list),
            capacity,
            block_size,
        })
    }

    /// Lease a raw buffer. Contents may be stale.
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn lease(&self) -> Option<Box<[u8]>> {
        self.free_list.lock().expect("lock poisoned").pop()
    }

    /// Lease a zeroed raw buffer.
    pub fn lease_zeroed(&self) -> Option<Box<[u8]>> {
        let mut buffer = self.lease()?;
        buffer.fill(0);
        Some(buffer)
    }

    /// Lease a block whose contents may be stale (for re-opening a node
    /// that the caller is about to overwrite from storage).
    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    pub fn lease_block(self: &Arc<Self>) -> Option<Block> {
        let buffer = self.lease()?;
        Some(Block::from_pool(buffer, Arc::clone(self)))
    }

    /// Lease a zeroed block, ready for a fresh node.
    #[allow(clippy::disallowed_methods)] // Arc::clone is required for shared ownership
    pub fn lease_block_zeroed(self: &Arc<Self>) -> Option<Block> {
        let buffer = self.lease_zeroed()?;
        Some(Block::from_pool(buffer, Arc::clone(self)))
    }

    /// Return a buffer to the pool.
    ///
    /// # Panics
    /// Panics if the buffer has the wrong size or the pool is already full.
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn return_buffer(&self, buffer: Box<[u8]>) {
        assert_eq!(
            buffer.len(),
            self.block_size,
            "Buffer pool block size mismatch"
        );
        let mut free_list = self.free_list.lock().expect("lock poisoned");
        assert!(
            free_list.len() < self.capacity,
            "Buffer pool overflow: returning buffer to full pool"
        );
        free_list.push(buffer);
    }

    /// Get the number of available buffers.
    #[must_use]
    #[allow(clippy::expect_used)] // Mutex poisoning indicates unrecoverable state
    pub fn available(&self) -> usize {
        self.free_list.lock().expect("lock poisoned").len()
    }

    /// Get the total capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Size of every block handed out by this pool.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }
}

impl std::fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferPool")
            .field("capacity", &self.capacity)
            .field("block_size", &self.block_size)
            .finish_non_exhaustive()
    }
}
