//! The allowed address set: "is address X allowed?" / "how many addresses
//! are allowed?" / the `index -> ip` bijection the sender uses to resolve
//! `dst_ip` from an iterator index (spec.md §1, §4.3 step 3).
//!
//! Concrete CIDR-range and explicit-list backends are provided so the
//! crate is runnable end to end; a deployment with its own address-space
//! bookkeeping can implement the same narrow contract instead.

use ipnet::Ipv4Net;
use std::net::Ipv4Addr;

use crate::error::{Result, ScanError};

/// A disjoint, sorted set of IPv4 addresses with O(log n) index lookup.
#[derive(Debug, Clone)]
pub enum AllowedSet {
    /// Sorted, disjoint inclusive `[start, end]` ranges plus a prefix-sum
    /// table over their lengths, built from allow/block CIDR lists.
    Ranges { ranges: Vec<(u32, u32)>, prefix: Vec<u64> },
    /// An explicit ordered list (`-I/--list-of-ips-file`); index is simply
    /// position in the file.
    Explicit(Vec<Ipv4Addr>),
}

impl AllowedSet {
    /// Build from an allow list and a block list of CIDR networks. An empty
    /// allow list means "all of IPv4" before blocklist subtraction.
    pub fn from_cidrs(allow: &[Ipv4Net], deny: &[Ipv4Net]) -> Result<Self> {
        let allow_ranges: Vec<(u32, u32)> = if allow.is_empty() {
            vec![(0, u32::MAX)]
        } else {
            merge_ranges(allow.iter().map(net_to_range).collect())
        };
        let deny_ranges = merge_ranges(deny.iter().map(net_to_range).collect());
        let ranges = subtract_ranges(allow_ranges, &deny_ranges);
        if ranges.is_empty() {
            return Err(ScanError::Config(
                "allowed address space is empty after applying the blocklist".into(),
            ));
        }
        let prefix = prefix_sums(&ranges);
        Ok(AllowedSet::Ranges { ranges, prefix })
    }

    pub fn from_explicit(ips: Vec<Ipv4Addr>) -> Result<Self> {
        if ips.is_empty() {
            return Err(ScanError::Config("explicit IP list is empty".into()));
        }
        Ok(AllowedSet::Explicit(ips))
    }

    pub fn count(&self) -> u64 {
        match self {
            AllowedSet::Ranges { prefix, .. } => *prefix.last().unwrap_or(&0),
            AllowedSet::Explicit(ips) => ips.len() as u64,
        }
    }

    pub fn index_to_ip(&self, index: u64) -> Option<Ipv4Addr> {
        match self {
            AllowedSet::Ranges { ranges, prefix } => {
                if index >= *prefix.last()? {
                    return None;
                }
                // `prefix[i]` holds the cumulative count *through* range i,
                // so the first `i` with `index < prefix[i]` is the range
                // containing `index`.
                let slot = match prefix.binary_search(&index) {
                    Ok(i) => i + 1,
                    Err(i) => i,
                };
                let (start, _end) = ranges[slot];
                let base_before = if slot == 0 { 0 } else { prefix[slot - 1] };
                let local_index = index - base_before;
                Some(Ipv4Addr::from((start as u64 + local_index) as u32))
            }
            AllowedSet::Explicit(ips) => ips.get(index as usize).copied(),
        }
    }

    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        match self {
            AllowedSet::Ranges { ranges, .. } => {
                let v = u32::from(ip);
                ranges
                    .binary_search_by(|(s, e)| {
                        if v < *s {
                            std::cmp::Ordering::Greater
                        } else if v > *e {
                            std::cmp::Ordering::Less
                        } else {
                            std::cmp::Ordering::Equal
                        }
                    })
                    .is_ok()
            }
            AllowedSet::Explicit(ips) => ips.contains(&ip),
        }
    }
}

fn net_to_range(net: &Ipv4Net) -> (u32, u32) {
    (u32::from(net.network()), u32::from(net.broadcast()))
}

fn merge_ranges(mut ranges: Vec<(u32, u32)>) -> Vec<(u32, u32)> {
    ranges.sort_unstable();
    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(ranges.len());
    for (s, e) in ranges {
        if let Some(last) = merged.last_mut() {
            if s <= last.1.saturating_add(1) {
                last.1 = last.1.max(e);
                continue;
            }
        }
        merged.push((s, e));
    }
    merged
}

/// Subtract `deny` ranges (already sorted/merged) from `allow` ranges
/// (already sorted/merged), returning sorted disjoint ranges.
fn subtract_ranges(allow: Vec<(u32, u32)>, deny: &[(u32, u32)]) -> Vec<(u32, u32)> {
    if deny.is_empty() {
        return allow;
    }
    let mut result = Vec::new();
    for (mut s, e) in allow {
        for &(ds, de) in deny {
            if de < s || ds > e {
                continue;
            }
            if ds > s {
                result.push((s, ds - 1));
            }
            if de >= e {
                s = e.saturating_add(1);
                break;
            }
            s = de.saturating_add(1);
        }
        if s <= e {
            result.push((s, e));
        }
    }
    result
}

fn prefix_sums(ranges: &[(u32, u32)]) -> Vec<u64> {
    let mut prefix = Vec::with_capacity(ranges.len());
    let mut total = 0u64;
    for &(s, e) in ranges {
        total += (e - s) as u64 + 1;
        prefix.push(total);
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;

    fn net(s: &str) -> Ipv4Net {
        s.parse().unwrap()
    }

    #[test]
    fn counts_and_maps_a_simple_cidr() {
        let set = AllowedSet::from_cidrs(&[net("10.0.0.0/30")], &[]).unwrap();
        assert_eq!(set.count(), 4);
        assert_eq!(set.index_to_ip(0), Some(Ipv4Addr::new(10, 0, 0, 0)));
        assert_eq!(set.index_to_ip(3), Some(Ipv4Addr::new(10, 0, 0, 3)));
        assert_eq!(set.index_to_ip(4), None);
    }

    #[test]
    fn blocklist_punches_a_hole_in_the_allow_range() {
        let set = AllowedSet::from_cidrs(
            &[net("10.0.0.0/29")], // 10.0.0.0 - 10.0.0.7 (8 addrs)
            &[net("10.0.0.2/31")], // removes .2 and .3
        )
        .unwrap();
        assert_eq!(set.count(), 6);
        assert!(!set.contains(Ipv4Addr::new(10, 0, 0, 2)));
        assert!(!set.contains(Ipv4Addr::new(10, 0, 0, 3)));
        assert!(set.contains(Ipv4Addr::new(10, 0, 0, 4)));
        // indices skip straight over the blocked hole
        assert_eq!(set.index_to_ip(0), Some(Ipv4Addr::new(10, 0, 0, 0)));
        assert_eq!(set.index_to_ip(1), Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(set.index_to_ip(2), Some(Ipv4Addr::new(10, 0, 0, 4)));
        assert_eq!(set.index_to_ip(5), Some(Ipv4Addr::new(10, 0, 0, 7)));
    }

    #[test]
    fn explicit_list_preserves_file_order() {
        let set = AllowedSet::from_explicit(vec![
            Ipv4Addr::new(1, 2, 3, 4),
            Ipv4Addr::new(9, 9, 9, 9),
        ])
        .unwrap();
        assert_eq!(set.count(), 2);
        assert_eq!(set.index_to_ip(1), Some(Ipv4Addr::new(9, 9, 9, 9)));
    }

    #[test]
    fn empty_after_full_block_is_an_error() {
        assert!(AllowedSet::from_cidrs(&[net("10.0.0.0/30")], &[net("10.0.0.0/30")]).is_err());
    }
}
