use std::net::Ipv4Addr;

use crate::error::{Result, ScanError};

const MAX_SOURCE_IPS: usize = 65_536;

/// Parses `-S/--source-ip`: a comma-separated list of individual addresses
/// and/or inclusive dash-ranges (`10.0.0.1,10.0.0.5-10.0.0.8`), used for
/// round-robin source address selection (spec.md §4.3 step 4).
pub fn parse_source_ips(spec: &str) -> Result<Vec<Ipv4Addr>> {
    let mut ips = Vec::new();
    for chunk in spec.split(',') {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = chunk.split_once('-') {
            let lo: Ipv4Addr = lo
                .trim()
                .parse()
                .map_err(|_| ScanError::Config(format!("invalid source IP range '{chunk}'")))?;
            let hi: Ipv4Addr = hi
                .trim()
                .parse()
                .map_err(|_| ScanError::Config(format!("invalid source IP range '{chunk}'")))?;
            let lo_u = u32::from(lo);
            let hi_u = u32::from(hi);
            if lo_u > hi_u {
                return Err(ScanError::Config(format!(
                    "source IP range '{chunk}' is backwards"
                )));
            }
            if (hi_u - lo_u + 1) as usize > MAX_SOURCE_IPS {
                return Err(ScanError::Config(format!(
                    "source IP range '{chunk}' exceeds the {MAX_SOURCE_IPS}-address limit"
                )));
            }
            for raw in lo_u..=hi_u {
                ips.push(Ipv4Addr::from(raw));
            }
        } else {
            let ip: Ipv4Addr = chunk
                .parse()
                .map_err(|_| ScanError::Config(format!("invalid source IP '{chunk}'")))?;
            ips.push(ip);
        }
    }
    if ips.is_empty() {
        return Err(ScanError::Config("source IP list is empty".into()));
    }
    Ok(ips)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_addresses_and_ranges() {
        let ips = parse_source_ips("10.0.0.1,10.0.0.5-10.0.0.7").unwrap();
        assert_eq!(
            ips,
            vec![
                Ipv4Addr::new(10, 0, 0, 1),
                Ipv4Addr::new(10, 0, 0, 5),
                Ipv4Addr::new(10, 0, 0, 6),
                Ipv4Addr::new(10, 0, 0, 7),
            ]
        );
    }

    #[test]
    fn rejects_backwards_range() {
        assert!(parse_source_ips("10.0.0.9-10.0.0.1").is_err());
    }
}
