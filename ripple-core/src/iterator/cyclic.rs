//! Shuffled, shardable enumeration of the eligible target index space.
//!
//! See `spec.md` §4.1. A cyclic-group permutation over `Z*_p` (p the
//! smallest prime `>= target_space_size`) visits every element of the group
//! exactly once; we slice that single traversal into `shards * senders`
//! disjoint interleaved sub-streams without ever materializing the full
//! permutation.

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::primes::{find_primitive_root, mulmod, next_prime};
use crate::error::{Result, ScanError};

const MAX_ROOT_ATTEMPTS: u32 = 10_000;

/// Parameters shared by every (shard, sender) stream drawn from the same
/// target space and seed.
#[derive(Debug, Clone, Copy)]
pub struct CyclicGroup {
    pub prime: u64,
    pub primitive_root: u64,
    pub target_space_size: u64,
}

impl CyclicGroup {
    /// Build the group for a given target space, deterministically from a
    /// 64-bit seed (see `oracle::RunKey::derive_iterator_seed`).
    pub fn new(target_space_size: u64, seed: u64) -> Result<Self> {
        if target_space_size == 0 {
            return Err(ScanError::EmptyTargetSpace);
        }
        // p must satisfy p - 1 >= target_space_size so every index in
        // [0, target_space_size) has a corresponding group element; picking
        // p just ">= target_space_size" would silently drop the last index
        // whenever target_space_size itself happens to be prime.
        let prime = next_prime(target_space_size.saturating_add(1).max(2));
        let mut rng = StdRng::seed_from_u64(seed);
        let primitive_root = find_primitive_root(prime, &mut rng, MAX_ROOT_ATTEMPTS)
            .ok_or(ScanError::PrimitiveRootSearch(MAX_ROOT_ATTEMPTS))?;
        Ok(Self { prime, primitive_root, target_space_size })
    }

    /// Group order `p - 1`: the length of the single unsharded traversal.
    pub fn order(&self) -> u64 {
        self.prime - 1
    }

    /// Folds an arbitrary 64-bit seed into a valid starting element `x0 in
    /// [1, p-1]` for [`Self::stream`].
    pub fn seed_to_x0(&self, seed: u64) -> u64 {
        (seed % self.order()) + 1
    }

    /// Build the iterator for one `(shard, sender)` pair out of
    /// `total_shards * senders_per_shard` streams, starting from `x0`.
    ///
    /// Senders in excess of the cycle length are the caller's
    /// responsibility to avoid (see [`effective_senders_per_shard`]); this
    /// constructor trusts `shard < total_shards` and `sender < senders_per_shard`.
    pub fn stream(
        &self,
        x0: u64,
        shard: u32,
        total_shards: u32,
        sender: u32,
        senders_per_shard: u32,
    ) -> CyclicIterator {
        let n = self.order();
        let m = (total_shards as u64) * (senders_per_shard as u64);
        let k = shard as u64 + (total_shards as u64) * sender as u64;
        debug_assert!(k < m);

        // x = x0 * g^k mod p, h = g^m mod p.
        let x_start = mulmod(x0 % self.prime, pow_mod(self.primitive_root, k, self.prime), self.prime);
        let h = pow_mod(self.primitive_root, m, self.prime);

        let max_steps = if k >= n { 0 } else { (n - k - 1) / m + 1 };

        CyclicIterator {
            prime: self.prime,
            target_space_size: self.target_space_size,
            h,
            x: x_start,
            step: 0,
            max_steps,
        }
    }
}

/// The group order for a given target space size, without the cost of a
/// primitive-root search — useful when a caller only needs to clamp sender
/// counts via [`effective_senders_per_shard`] before building the real
/// (seeded) group.
pub fn group_order_for(target_space_size: u64) -> Result<u64> {
    if target_space_size == 0 {
        return Err(ScanError::EmptyTargetSpace);
    }
    Ok(next_prime(target_space_size.saturating_add(1).max(2)) - 1)
}

fn pow_mod(base: u64, exp: u64, m: u64) -> u64 {
    crate::iterator::primes::modpow(base, exp, m)
}

/// A single sender's view of the shuffled target index stream.
pub struct CyclicIterator {
    prime: u64,
    target_space_size: u64,
    h: u64,
    x: u64,
    step: u64,
    max_steps: u64,
}

impl CyclicIterator {
    /// Total count of group elements (valid + skipped) this stream will
    /// walk before exhausting its slice of the permutation.
    pub fn max_steps(&self) -> u64 {
        self.max_steps
    }
}

impl Iterator for CyclicIterator {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        while self.step < self.max_steps {
            let v = self.x;
            self.step += 1;
            self.x = mulmod(self.x, self.h, self.prime);
            if v >= 1 && v <= self.target_space_size {
                return Some(v - 1);
            }
        }
        None
    }
}

/// Clamp `senders_per_shard` down so that `total_shards * senders_per_shard`
/// never exceeds the group order, per spec.md §4.1's "tiny scans degrade to
/// a single sender" edge case.
pub fn effective_senders_per_shard(
    total_shards: u32,
    senders_per_shard: u32,
    group_order: u64,
) -> u32 {
    if senders_per_shard <= 1 {
        return senders_per_shard.max(1);
    }
    let max_total = group_order.max(1);
    let mut effective = senders_per_shard as u64;
    while (total_shards as u64) * effective > max_total && effective > 1 {
        effective -= 1;
    }
    effective.max(1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn collect_all(
        group: &CyclicGroup,
        x0: u64,
        total_shards: u32,
        senders_per_shard: u32,
    ) -> Vec<u64> {
        let mut all = Vec::new();
        for shard in 0..total_shards {
            for sender in 0..senders_per_shard {
                let it = group.stream(x0, shard, total_shards, sender, senders_per_shard);
                all.extend(it);
            }
        }
        all
    }

    #[test]
    fn unsharded_iterator_visits_every_target_exactly_once() {
        let group = CyclicGroup::new(6, 0xDEADBEEF).unwrap();
        let visited = collect_all(&group, 1, 1, 1);
        let set: HashSet<_> = visited.iter().copied().collect();
        assert_eq!(set.len(), 6);
        assert_eq!(set, (0..6).collect());
    }

    #[test]
    fn sharding_partitions_with_no_overlap_and_full_coverage() {
        let group = CyclicGroup::new(97, 12345).unwrap();
        let visited = collect_all(&group, 7, 4, 3);
        assert_eq!(visited.len(), 97, "every target visited exactly once");
        let set: HashSet<_> = visited.iter().copied().collect();
        assert_eq!(set.len(), 97);
        assert_eq!(set, (0..97).collect());
    }

    #[test]
    fn sharding_equivalence_matches_unsharded_run() {
        let group = CyclicGroup::new(251, 0xDEADBEEF).unwrap();
        let mut unsharded = collect_all(&group, 9, 1, 1);
        let mut sharded = collect_all(&group, 9, 4, 1);
        unsharded.sort_unstable();
        sharded.sort_unstable();
        assert_eq!(unsharded, sharded);
    }

    #[test]
    fn degrades_to_single_sender_for_tiny_scans() {
        assert_eq!(effective_senders_per_shard(4, 8, 3), 1);
        assert_eq!(effective_senders_per_shard(1, 8, 100), 8);
    }
}
