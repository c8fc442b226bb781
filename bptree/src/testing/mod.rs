//! Shared helpers for node tests.

use std::sync::Once;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::btree::BTreeNode;
use crate::storage::page::PageId;

static TRACING: Once = Once::new();

/// Install a fmt subscriber once per test binary. `RUST_LOG` overrides the
/// default `bptree=debug` filter.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "bptree=debug".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Deterministic RNG so failures reproduce.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// A random 8-byte key.
pub fn rand_key(rng: &mut StdRng) -> [u8; 8] {
    rng.random()
}

/// A random non-zero child pointer.
pub fn rand_ptr(rng: &mut StdRng) -> PageId {
    rng.random_range(1..=PageId::MAX)
}

/// A random value of `len` bytes.
pub fn rand_value(rng: &mut StdRng, len: usize) -> Vec<u8> {
    let mut value = vec![0u8; len];
    rng.fill(&mut value[..]);
    value
}

/// Keys never decrease by position.
pub fn assert_sorted<N: BTreeNode>(node: &N) {
    for i in 1..node.key_count() {
        let prev = node.key(i - 1).expect("index below key_count");
        let next = node.key(i).expect("index below key_count");
        assert!(prev <= next, "keys out of order at {i}: {prev:?} > {next:?}");
    }
}

/// Every key left in `left` sorts strictly before the first key of `right`.
pub fn assert_split<N: BTreeNode>(left: &N, right: &N) {
    let Ok(first) = right.key(0) else {
        return;
    };
    for i in 0..left.key_count() {
        let key = left.key(i).expect("index below key_count");
        assert!(
            key < first,
            "key {key:?} at {i} is not below the sibling's first key {first:?}"
        );
    }
}
