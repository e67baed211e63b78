//! Property test for spec.md §8 invariant 5: a dedup window with capacity
//! `C` never reports more than `C` distinct keys as "seen" at any instant.

use std::net::Ipv4Addr;

use proptest::prelude::*;

use ripple_core::dedup::{DedupKey, WindowDedup};

fn key(i: u32) -> DedupKey {
    DedupKey {
        saddr: Ipv4Addr::from(i),
        sport: (i % 65536) as u16,
        dport: 80,
        classification: "synack".to_string(),
    }
}

proptest! {
    #[test]
    fn window_never_exceeds_its_capacity(
        capacity in 1usize..64,
        keys in prop::collection::vec(any::<u32>(), 0..500),
    ) {
        let mut window = WindowDedup::new(capacity);
        for k in keys {
            window.check_and_insert(key(k));
            prop_assert!(window.len() <= capacity);
        }
    }

    /// Re-inserting the same key while it's still in the window always
    /// reports a hit, never a fresh insert.
    #[test]
    fn repeated_key_within_capacity_is_always_a_duplicate(
        capacity in 2usize..64,
        repeats in 1usize..20,
    ) {
        let mut window = WindowDedup::new(capacity);
        let k = key(42);
        prop_assert!(!window.check_and_insert(k.clone()));
        for _ in 0..repeats {
            prop_assert!(window.check_and_insert(k.clone()));
        }
    }
}
