//! Node split ("balance"), shared by both node kinds.
//!
//! The split point is chosen by position, then nudged to the nearest
//! boundary between distinct keys:
//!
//! 1. `mid = key_count / 2`; entries `[split, key_count)` move.
//! 2. If the keys either side of `mid` differ, `split = mid`.
//! 3. Otherwise `mid` falls inside a run of equal keys `[start, end)`.
//!    The run is kept whole: split at `start` (run moves) or `end` (run
//!    stays), whichever is nearer `mid`, preferring `end` on a tie. A
//!    boundary at either edge of the node is not a candidate.
//! 4. If every key is identical there is no boundary and nothing moves.
//!    The same holds for a node with fewer than two entries.
//!
//! Every key left in the source is therefore strictly less than the first
//! key of the destination.

use crate::storage::btree::node::{NodeError, RawNode};

/// Position of the first entry that moves to the sibling.
pub(crate) fn split_point(node: &RawNode<'_>) -> usize {
    let count = node.meta.key_count();
    if count < 2 {
        return count;
    }
    let mid = count / 2;
    if node.key_at(mid - 1) != node.key_at(mid) {
        return mid;
    }

    let run_key = node.key_at(mid);
    let start = node.lower_bound(run_key);
    let end = node.upper_bound(run_key);

    match (start > 0, end < count) {
        (true, true) if mid - start < end - mid => start,
        (_, true) => end,
        (true, false) => start,
        (false, false) => count,
    }
}

impl RawNode<'_> {
    /// Move the tail of this node past [`split_point`] into the empty
    /// `other`. Returns the number of entries moved.
    pub(crate) fn balance_into(&mut self, other: &mut RawNode<'_>) -> Result<usize, NodeError> {
        if !self.meta.same_shape(&other.meta) {
            return Err(NodeError::LayoutMismatch);
        }
        if other.meta.key_count() != 0 {
            return Err(NodeError::SiblingNotEmpty);
        }

        let count = self.meta.key_count();
        let split = split_point(self);
        let moved = count - split;
        if moved > other.meta.key_cap() {
            return Err(NodeError::Full);
        }

        let start = self.meta.entry_offset(split);
        let end = self.meta.entry_offset(count);
        let dest = other.meta.entry_offset(0);
        other.buf[dest..dest + (end - start)].copy_from_slice(&self.buf[start..end]);
        self.buf[start..end].fill(0);

        self.set_key_count(split);
        other.set_key_count(moved);

        tracing::debug!(
            kind = ?self.meta.kind(),
            kept = split,
            moved,
            "balanced node"
        );
        Ok(moved)
    }
}
