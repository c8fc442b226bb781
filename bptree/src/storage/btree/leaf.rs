//! Leaf (data) nodes: sorted `(key, value)` pairs with duplicate keys.
//!
//! Entry slot layout:
//!
//! ```text
//! +-----------------+-----------------+---------------------------+
//! | key (key_size)  | descriptor (2)  | value area (value_size)   |
//! +-----------------+-----------------+---------------------------+
//! ```
//!
//! The descriptor is a u16 (LE). Its high bit marks an overflow value, in
//! which case the value area starts with an 8-byte [`VarcharRef`]. Otherwise
//! the low 15 bits are the inline value length.

use crate::storage::btree::meta::{NEXT_SIBLING_OFFSET, NodeKind, NodeMeta, PREV_SIBLING_OFFSET};
use crate::storage::btree::node::{BTreeNode, NodeError, RawNode};
use crate::storage::page::{PageId, read_u16, read_u64, write_u16, write_u64};
use crate::storage::varchar::{VARCHAR_REF_SIZE, VarcharRef, VarcharStore};

const OVERFLOW_FLAG: u16 = 0x8000;
const INLINE_LEN_MASK: u16 = 0x7FFF;

/// Largest inline value slot the descriptor can describe.
pub const MAX_VALUE_SIZE: usize = INLINE_LEN_MASK as usize;

/// A leaf value slot as stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafValue<'n> {
    Inline(&'n [u8]),
    Overflow(VarcharRef),
}

const fn check_value_size(value_size: usize) -> Result<(), NodeError> {
    if value_size < VARCHAR_REF_SIZE {
        Err(NodeError::InvalidLayout("value width cannot hold an overflow reference"))
    } else if value_size > MAX_VALUE_SIZE {
        Err(NodeError::InvalidLayout("value width exceeds the descriptor range"))
    } else {
        Ok(())
    }
}

/// A leaf B-tree node over a caller-owned buffer.
#[derive(Debug)]
pub struct LeafNode<'a> {
    node: RawNode<'a>,
}

impl<'a> LeafNode<'a> {
    /// Create an empty leaf, zeroing `buf`.
    ///
    /// `value_size` must lie in `VARCHAR_REF_SIZE..=MAX_VALUE_SIZE` so that
    /// any slot can hold an overflow reference.
    pub fn new(buf: &'a mut [u8], key_size: usize, value_size: usize) -> Result<Self, NodeError> {
        check_value_size(value_size)?;
        Ok(Self {
            node: RawNode::create(buf, NodeKind::Leaf, key_size, value_size)?,
        })
    }

    /// Re-open a leaf previously written to `buf`.
    pub fn open(buf: &'a mut [u8]) -> Result<Self, NodeError> {
        let node = RawNode::open(buf, NodeKind::Leaf)?;
        check_value_size(node.meta.value_size())?;
        Ok(Self { node })
    }
}

impl LeafNode<'_> {
    /// True iff one more entry fits.
    #[must_use]
    pub const fn fits_another(&self) -> bool {
        self.node.fits_another()
    }

    /// Insert a `(key, value)` pair after any entries with an equal key.
    ///
    /// Values longer than the inline slot are written to `store` and the
    /// slot keeps the returned reference. Capacity is checked before the
    /// store is touched.
    pub fn put_kv<S: VarcharStore + ?Sized>(
        &mut self,
        store: &mut S,
        key: &[u8],
        value: &[u8],
    ) -> Result<(), NodeError> {
        self.node.check_key(key)?;
        if !self.fits_another() {
            return Err(NodeError::Full);
        }

        let overflow = if value.len() > self.node.meta.value_size() {
            Some(store.store(value)?)
        } else {
            None
        };

        let i = self.node.insert_slot(key)?;
        let slot = self.node.payload_mut(i);
        match overflow {
            Some(reference) => {
                write_u16(slot, 0, OVERFLOW_FLAG);
                slot[2..2 + VARCHAR_REF_SIZE].copy_from_slice(&reference.to_bytes());
            }
            None => {
                #[allow(clippy::cast_possible_truncation)]
                write_u16(slot, 0, value.len() as u16);
                slot[2..2 + value.len()].copy_from_slice(value);
            }
        }
        Ok(())
    }

    /// The stored value slot at ordinal position `i`.
    pub fn value_at(&self, i: usize) -> Result<LeafValue<'_>, NodeError> {
        self.node.check_index(i)?;
        let slot = self.node.payload(i);
        let descriptor = read_u16(slot, 0);
        let area = &slot[2..];

        if descriptor & OVERFLOW_FLAG != 0 {
            VarcharRef::from_bytes(area)
                .map(LeafValue::Overflow)
                .ok_or(NodeError::InvalidLayout("overflow slot too narrow for a reference"))
        } else {
            area.get(..usize::from(descriptor & INLINE_LEN_MASK))
                .map(LeafValue::Inline)
                .ok_or(NodeError::InvalidLayout("inline length exceeds value slot"))
        }
    }

    /// Value of the first entry with this key, resolved through `store`.
    pub fn first_value<S: VarcharStore + ?Sized>(
        &self,
        store: &S,
        key: &[u8],
    ) -> Result<Vec<u8>, NodeError> {
        let i = self.node.find(key)?.ok_or(NodeError::NotFound)?;
        self.resolve(store, i)
    }

    /// Every value stored under this key, in insertion order.
    pub fn values<S: VarcharStore + ?Sized>(
        &self,
        store: &S,
        key: &[u8],
    ) -> Result<Vec<Vec<u8>>, NodeError> {
        let start = self.node.find(key)?.ok_or(NodeError::NotFound)?;
        let end = self.node.upper_bound(key);
        (start..end).map(|i| self.resolve(store, i)).collect()
    }

    /// Remove the first entry with this key and return its value. An
    /// overflow payload is released from `store`.
    pub fn remove_first<S: VarcharStore + ?Sized>(
        &mut self,
        store: &mut S,
        key: &[u8],
    ) -> Result<Vec<u8>, NodeError> {
        let i = self.node.find(key)?.ok_or(NodeError::NotFound)?;
        let value = self.resolve(&*store, i)?;
        if let LeafValue::Overflow(reference) = self.value_at(i)? {
            store.free(reference)?;
        }
        self.node.remove_slot(i)?;
        Ok(value)
    }

    /// Page id of the next leaf in key order, if linked.
    #[must_use]
    pub fn next_sibling(&self) -> Option<PageId> {
        Some(read_u64(&*self.node.buf, NEXT_SIBLING_OFFSET)).filter(|&id| id != 0)
    }

    /// Page id of the previous leaf in key order, if linked.
    #[must_use]
    pub fn prev_sibling(&self) -> Option<PageId> {
        Some(read_u64(&*self.node.buf, PREV_SIBLING_OFFSET)).filter(|&id| id != 0)
    }

    pub fn set_next_sibling(&mut self, page: Option<PageId>) {
        write_u64(self.node.buf, NEXT_SIBLING_OFFSET, page.unwrap_or(0));
    }

    pub fn set_prev_sibling(&mut self, page: Option<PageId>) {
        write_u64(self.node.buf, PREV_SIBLING_OFFSET, page.unwrap_or(0));
    }

    fn resolve<S: VarcharStore + ?Sized>(&self, store: &S, i: usize) -> Result<Vec<u8>, NodeError> {
        match self.value_at(i)? {
            LeafValue::Inline(bytes) => Ok(bytes.to_vec()),
            LeafValue::Overflow(reference) => Ok(store.fetch(reference)?),
        }
    }
}

impl BTreeNode for LeafNode<'_> {
    fn meta(&self) -> &NodeMeta {
        &self.node.meta
    }

    fn key(&self, i: usize) -> Result<&[u8], NodeError> {
        self.node.key(i)
    }

    fn has(&self, key: &[u8]) -> bool {
        self.node.has(key)
    }

    /// Sibling links are left to the caller, which knows the page ids.
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::btree::meta::{HEADER_SIZE, VALUE_DESCRIPTOR_SIZE};
    use crate::storage::buffer_pool::BufferPool;
    use crate::storage::page::BLOCK_SIZE;
    use crate::storage::varchar::{MemoryVarchar, PagedVarchar, VarcharError};
    use crate::testing::{assert_sorted, assert_split, init_tracing, rand_key, rand_value, seeded_rng};

    const ENTRY: usize = 8 + VALUE_DESCRIPTOR_SIZE + 8;

    fn key(n: u64) -> [u8; 8] {
        n.to_be_bytes()
    }

    #[test]
    fn test_four_entry_scenario() {
        let mut store = MemoryVarchar::new();
        let mut n_buf = vec![0u8; HEADER_SIZE + 4 * ENTRY];
        let mut n = LeafNode::new(&mut n_buf, 8, 8).expect("layout");
        assert_eq!(n.key_cap(), 4);

        let kvs: Vec<([u8; 8], [u8; 8])> = (0..4u64).map(|i| (key(i * 10), key(i + 100))).collect();
        for (i, (k, v)) in kvs.iter().enumerate() {
            assert!(n.fits_another());
            n.put_kv(&mut store, k, v).expect("put");
            assert_eq!(n.fits_another(), i < 3);
        }
        assert_eq!(
            n.put_kv(&mut store, &key(99), &key(99)),
            Err(NodeError::Full)
        );

        let mut b_buf = vec![0u8; HEADER_SIZE + 4 * ENTRY];
        let mut b = LeafNode::new(&mut b_buf, 8, 8).expect("layout");
        n.balance(&mut b).expect("balance");

        assert_eq!(n.key_count(), 2);
        assert_eq!(b.key_count(), 2);
        assert_eq!(n.key(0).expect("key"), &kvs[0].0);
        assert_eq!(n.key(1).expect("key"), &kvs[1].0);
        assert_eq!(b.key(0).expect("key"), &kvs[2].0);
        assert_eq!(b.key(1).expect("key"), &kvs[3].0);
        for (k, v) in &kvs[..2] {
            assert_eq!(n.first_value(&store, k).expect("value"), v);
        }
        for (k, v) in &kvs[2..] {
            assert_eq!(b.first_value(&store, k).expect("value"), v);
            assert_eq!(n.first_value(&store, k), Err(NodeError::NotFound));
        }
        assert!(n.fits_another());
    }

    #[test]
    fn test_short_values_inline() {
        let mut store = MemoryVarchar::new();
        let mut buf = vec![0u8; 256];
        let mut n = LeafNode::new(&mut buf, 8, 8).expect("layout");
        n.put_kv(&mut store, &key(1), b"abc").expect("put");
        n.put_kv(&mut store, &key(2), b"").expect("put");

        assert_eq!(n.value_at(0), Ok(LeafValue::Inline(b"abc")));
        assert_eq!(n.first_value(&store, &key(2)).expect("value"), b"");
        assert!(store.is_empty());
    }

    #[test]
    fn test_large_values_overflow() {
        let mut store = MemoryVarchar::new();
        let mut buf = vec![0u8; 256];
        let mut n = LeafNode::new(&mut buf, 8, 8).expect("layout");
        let big = vec![0x5Au8; 300];
        n.put_kv(&mut store, &key(1), &big).expect("put");
        n.put_kv(&mut store, &key(2), b"inline").expect("put");

        assert!(matches!(n.value_at(0), Ok(LeafValue::Overflow(_))));
        assert_eq!(store.len(), 1);
        assert_eq!(n.first_value(&store, &key(1)).expect("value"), big);
        assert_eq!(n.first_value(&store, &key(2)).expect("value"), b"inline");
    }

    #[test]
    fn test_overflow_through_paged_store() {
        let pool = BufferPool::new(32, 256);
        let mut store = PagedVarchar::new(pool);
        let mut buf = vec![0u8; BLOCK_SIZE];
        let mut n = LeafNode::new(&mut buf, 8, 16).expect("layout");

        let big = rand_value(&mut seeded_rng(7), 2000);
        n.put_kv(&mut store, &key(7), &big).expect("put");
        assert!(store.block_count() > 1);
        assert_eq!(n.first_value(&store, &key(7)).expect("value"), big);

        assert_eq!(n.remove_first(&mut store, &key(7)).expect("remove"), big);
        assert_eq!(store.block_count(), 0);
        assert!(!n.has(&key(7)));
    }

    #[test]
    fn test_narrow_value_slot_rejected() {
        let mut buf = vec![0u8; 256];
        assert!(matches!(
            LeafNode::new(&mut buf, 8, 4),
            Err(NodeError::InvalidLayout(_))
        ));

        // A stored header with a narrow slot is rejected on open as well.
        drop(LeafNode::new(&mut buf, 8, 8).expect("layout"));
        buf[8] = 4;
        assert!(matches!(
            LeafNode::open(&mut buf),
            Err(NodeError::InvalidLayout(_))
        ));
    }

    #[test]
    fn test_value_one_past_slot_overflows() {
        let mut store = MemoryVarchar::new();
        let mut buf = vec![0u8; 256];
        let mut n = LeafNode::new(&mut buf, 8, 8).expect("layout");
        n.put_kv(&mut store, &key(1), b"12345678").expect("put");
        n.put_kv(&mut store, &key(2), b"123456789").expect("put");

        assert_eq!(n.value_at(0), Ok(LeafValue::Inline(b"12345678")));
        assert!(matches!(n.value_at(1), Ok(LeafValue::Overflow(_))));
        assert_eq!(store.len(), 1);
        assert_eq!(n.first_value(&store, &key(2)).expect("value"), b"123456789");
    }

    #[test]
    fn test_full_does_not_touch_store() {
        let mut store = MemoryVarchar::new();
        let mut buf = vec![0u8; HEADER_SIZE + ENTRY];
        let mut n = LeafNode::new(&mut buf, 8, 8).expect("layout");
        n.put_kv(&mut store, &key(1), b"v").expect("put");
        assert_eq!(
            n.put_kv(&mut store, &key(2), &[1u8; 64]),
            Err(NodeError::Full)
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_store_errors_propagate() {
        let pool = BufferPool::new(1, 64);
        let mut store = PagedVarchar::new(pool);
        let mut buf = vec![0u8; 256];
        let mut n = LeafNode::new(&mut buf, 8, 8).expect("layout");
        assert_eq!(
            n.put_kv(&mut store, &key(1), &[9u8; 500]),
            Err(NodeError::Varchar(VarcharError::PoolExhausted))
        );
        assert_eq!(n.key_count(), 0);
    }

    #[test]
    fn test_duplicate_keys() {
        let mut store = MemoryVarchar::new();
        let mut buf = vec![0u8; 512];
        let mut n = LeafNode::new(&mut buf, 8, 8).expect("layout");
        n.put_kv(&mut store, &key(5), b"first").expect("put");
        n.put_kv(&mut store, &key(1), b"other").expect("put");
        n.put_kv(&mut store, &key(5), b"second").expect("put");
        n.put_kv(&mut store, &key(5), b"a much longer third").expect("put");

        assert_eq!(n.key_count(), 4);
        assert_eq!(n.first_value(&store, &key(5)).expect("value"), b"first");
        assert_eq!(
            n.values(&store, &key(5)).expect("values"),
            vec![
                b"first".to_vec(),
                b"second".to_vec(),
                b"a much longer third".to_vec()
            ]
        );
        assert_eq!(n.values(&store, &key(3)), Err(NodeError::NotFound));

        assert_eq!(n.remove_first(&mut store, &key(5)).expect("remove"), b"first");
        assert_eq!(n.first_value(&store, &key(5)).expect("value"), b"second");
        assert_sorted(&n);
    }

    #[test]
    fn test_siblings() {
        let mut buf = vec![0u8; 256];
        let mut n = LeafNode::new(&mut buf, 8, 8).expect("layout");
        assert_eq!(n.next_sibling(), None);
        n.set_next_sibling(Some(42));
        n.set_prev_sibling(Some(7));
        drop(n);

        let mut n = LeafNode::open(&mut buf).expect("open");
        assert_eq!(n.next_sibling(), Some(42));
        assert_eq!(n.prev_sibling(), Some(7));
        n.set_next_sibling(None);
        assert_eq!(n.next_sibling(), None);
    }

    #[test]
    fn test_reopen_and_checksum() {
        let mut store = MemoryVarchar::new();
        let mut buf = vec![0u8; 512];
        {
            let mut n = LeafNode::new(&mut buf, 8, 8).expect("layout");
            n.put_kv(&mut store, &key(3), b"three").expect("put");
            n.seal();
        }
        {
            let n = LeafNode::open(&mut buf).expect("open");
            n.verify().expect("checksum");
            assert_eq!(n.first_value(&store, &key(3)).expect("value"), b"three");
        }

        buf[HEADER_SIZE + 12] ^= 0xFF;
        let n = LeafNode::open(&mut buf).expect("open");
        assert!(matches!(n.verify(), Err(NodeError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_invalid_value_width() {
        let mut buf = vec![0u8; 1 << 17];
        assert!(matches!(
            LeafNode::new(&mut buf, 8, MAX_VALUE_SIZE + 1),
            Err(NodeError::InvalidLayout(_))
        ));
    }

    #[test]
    fn test_balance_random() {
        init_tracing();
        let mut rng = seeded_rng(0x1EAF);
        let mut store = MemoryVarchar::new();
        for test in 0..30 {
            let size = (1027 + test * 16).min(BLOCK_SIZE);
            let mut n_buf = vec![0u8; size];
            let mut n = LeafNode::new(&mut n_buf, 8, 8).expect("layout");

            let mut kvs = Vec::with_capacity(n.key_cap() / 2);
            for _ in 0..n.key_cap() / 2 {
                if !n.fits_another() {
                    break;
                }
                let (k, v) = (rand_key(&mut rng), rand_value(&mut rng, 8));
                n.put_kv(&mut store, &k, &v).expect("put");
                assert!(n.has(&k));
                assert_eq!(n.first_value(&store, &k).expect("value"), v);
                kvs.push((k, v));
            }

            let mut b_buf = vec![0u8; size];
            let mut b = LeafNode::new(&mut b_buf, 8, 8).expect("layout");
            n.balance(&mut b).expect("balance");
            assert_eq!(n.key_count() + b.key_count(), kvs.len());

            for (k, v) in &kvs {
                assert!(n.has(k) || b.has(k), "lost key {k:?}");
                let holder = if n.has(k) { &n } else { &b };
                assert_eq!(holder.first_value(&store, k).expect("value"), *v);
            }
            assert_split(&n, &b);
            assert_sorted(&n);
            assert_sorted(&b);
        }
    }

    #[test]
    fn test_balance_pure_duplicate_key() {
        let mut rng = seeded_rng(0xD0B);
        let mut store = MemoryVarchar::new();
        for test in 0..30 {
            let size = (1027 + test * 16).min(BLOCK_SIZE);
            let mut n_buf = vec![0u8; size];
            let mut n = LeafNode::new(&mut n_buf, 8, 8).expect("layout");

            let only_key = rand_key(&mut rng);
            let mut values = Vec::new();
            while n.fits_another() && values.len() < n.key_cap() / 2 {
                let v = rand_value(&mut rng, 8);
                n.put_kv(&mut store, &only_key, &v).expect("put");
                values.push(v);
            }

            let mut b_buf = vec![0u8; size];
            let mut b = LeafNode::new(&mut b_buf, 8, 8).expect("layout");
            n.balance(&mut b).expect("balance");

            assert_eq!(n.key_count() + b.key_count(), values.len());
            assert!(n.has(&only_key) || b.has(&only_key));
            assert_split(&n, &b);

            let mut all = Vec::new();
            for node in [&n, &b] {
                if node.has(&only_key) {
                    all.extend(node.values(&store, &only_key).expect("values"));
                }
            }
            assert_eq!(all, values);
        }
    }

    #[test]
    fn test_balance_keeps_overflow_refs() {
        let mut store = MemoryVarchar::new();
        let mut n_buf = vec![0u8; 512];
        let mut n = LeafNode::new(&mut n_buf, 8, 8).expect("layout");
        let values: Vec<Vec<u8>> = (0..6u8).map(|i| vec![i; 20 + usize::from(i)]).collect();
        for (i, v) in (0u64..).zip(&values) {
            n.put_kv(&mut store, &key(i), v).expect("put");
        }

        let mut b_buf = vec![0u8; 512];
        let mut b = LeafNode::new(&mut b_buf, 8, 8).expect("layout");
        n.balance(&mut b).expect("balance");

        assert_eq!(store.len(), 6);
        for (i, v) in (0u64..).zip(&values) {
            let holder = if n.has(&key(i)) { &n } else { &b };
            assert_eq!(&holder.first_value(&store, &key(i)).expect("value"), v);
        }
    }
}
