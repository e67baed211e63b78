//! Prime search and primitive-root discovery for the cyclic-group iterator.
//!
//! Every quantity here fits comfortably in `u64` — the largest group order
//! we ever need is bounded by `2^32 * 65536 ≈ 2^48` — so modular
//! multiplication widens to `u128` instead of reaching for a bignum crate.

use rand::Rng;

/// Deterministic witnesses that make Miller-Rabin exact for every `u64`.
const MR_WITNESSES: [u64; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

pub fn mulmod(a: u64, b: u64, m: u64) -> u64 {
    ((a as u128 * b as u128) % m as u128) as u64
}

pub fn modpow(mut base: u64, mut exp: u64, m: u64) -> u64 {
    if m == 1 {
        return 0;
    }
    let mut result: u64 = 1;
    base %= m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mulmod(result, base, m);
        }
        exp >>= 1;
        base = mulmod(base, base, m);
    }
    result
}

pub fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    for &p in &[2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
        if n == p {
            return true;
        }
        if n % p == 0 {
            return false;
        }
    }
    let mut d = n - 1;
    let mut r = 0u32;
    while d % 2 == 0 {
        d /= 2;
        r += 1;
    }
    'witness: for &a in &MR_WITNESSES {
        if a >= n {
            continue;
        }
        let mut x = modpow(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 0..r - 1 {
            x = mulmod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

/// Smallest prime `>= n`.
pub fn next_prime(n: u64) -> u64 {
    let mut candidate = n.max(2);
    if candidate % 2 == 0 {
        candidate += 1;
    }
    loop {
        if is_prime(candidate) {
            return candidate;
        }
        candidate += 2;
    }
}

/// Distinct prime factors of `n` (trial division up to `sqrt(n)`, with a
/// Miller-Rabin check on whatever cofactor survives).
pub fn distinct_prime_factors(mut n: u64) -> Vec<u64> {
    let mut factors = Vec::new();
    for p in [2u64, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37, 41, 43, 47] {
        if n % p == 0 {
            factors.push(p);
            while n % p == 0 {
                n /= p;
            }
        }
    }
    let mut d = 53u64;
    while d.saturating_mul(d) <= n && n > 1 {
        if n % d == 0 {
            factors.push(d);
            while n % d == 0 {
                n /= d;
            }
        }
        d += 2;
    }
    if n > 1 {
        factors.push(n);
    }
    factors
}

/// Find a primitive root of the multiplicative group mod `p` by random
/// sampling, bounded by `max_attempts`. `p` must be prime.
pub fn find_primitive_root<R: Rng>(p: u64, rng: &mut R, max_attempts: u32) -> Option<u64> {
    if p == 2 {
        return Some(1);
    }
    let n = p - 1;
    let factors = distinct_prime_factors(n);
    for _ in 0..max_attempts {
        let g = rng.gen_range(2..p);
        if is_primitive_root(g, p, n, &factors) {
            return Some(g);
        }
    }
    None
}

fn is_primitive_root(g: u64, p: u64, n: u64, factors: &[u64]) -> bool {
    factors.iter().all(|&q| modpow(g, n / q, p) != 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn next_prime_finds_smallest_prime_at_or_above() {
        assert_eq!(next_prime(0), 2);
        assert_eq!(next_prime(8), 11);
        assert_eq!(next_prime(11), 11);
        assert_eq!(next_prime(100), 101);
    }

    #[test]
    fn is_prime_agrees_with_known_values() {
        for p in [2u64, 3, 5, 7, 104729, 1_000_003] {
            assert!(is_prime(p), "{p} should be prime");
        }
        for c in [1u64, 4, 6, 8, 9, 100, 1_000_000] {
            assert!(!is_prime(c), "{c} should be composite");
        }
    }

    #[test]
    fn primitive_root_generates_full_group() {
        let p = 1_000_003u64; // prime
        let mut rng = StdRng::seed_from_u64(42);
        let g = find_primitive_root(p, &mut rng, 10_000).expect("root should be found");
        let n = p - 1;
        let mut seen = std::collections::HashSet::new();
        let mut x = 1u64;
        for _ in 0..n {
            seen.insert(x);
            x = mulmod(x, g, p);
        }
        assert_eq!(seen.len() as u64, n);
        assert_eq!(x, 1, "sequence should return to the start after the full order");
    }
}
