use crate::error::{Result, ScanError};

/// Parses `-p/--target-ports`: a comma-separated list of ports and/or
/// inclusive ranges (`80,443,8000-8010`). Order is preserved and duplicates
/// are removed, since port order fixes the low bits of the target index
/// (`i = addr_index * |ports| + port_index`, spec.md §4.3).
pub fn parse_port_list(spec: &str) -> Result<Vec<u16>> {
    let mut ports = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for chunk in spec.split(',') {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        if let Some((lo, hi)) = chunk.split_once('-') {
            let lo: u16 = lo.trim().parse().map_err(|_| {
                ScanError::Config(format!("invalid port range '{chunk}'"))
            })?;
            let hi: u16 = hi.trim().parse().map_err(|_| {
                ScanError::Config(format!("invalid port range '{chunk}'"))
            })?;
            if lo > hi {
                return Err(ScanError::Config(format!(
                    "port range '{chunk}' is backwards"
                )));
            }
            for p in lo..=hi {
                if seen.insert(p) {
                    ports.push(p);
                }
            }
        } else {
            let p: u16 = chunk
                .parse()
                .map_err(|_| ScanError::Config(format!("invalid port '{chunk}'")))?;
            if seen.insert(p) {
                ports.push(p);
            }
        }
    }
    if ports.is_empty() {
        return Err(ScanError::Config("target port list is empty".into()));
    }
    Ok(ports)
}

/// Parses `-s/--source-port`: a single port or an inclusive range
/// (`40000` or `40000-50000`).
pub fn parse_port_range(spec: &str) -> Result<(u16, u16)> {
    if let Some((lo, hi)) = spec.split_once('-') {
        let lo: u16 = lo
            .trim()
            .parse()
            .map_err(|_| ScanError::Config(format!("invalid source port range '{spec}'")))?;
        let hi: u16 = hi
            .trim()
            .parse()
            .map_err(|_| ScanError::Config(format!("invalid source port range '{spec}'")))?;
        if lo > hi {
            return Err(ScanError::Config(format!(
                "source port range '{spec}' is backwards"
            )));
        }
        Ok((lo, hi))
    } else {
        let p: u16 = spec
            .trim()
            .parse()
            .map_err(|_| ScanError::Config(format!("invalid source port '{spec}'")))?;
        Ok((p, p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_list_and_ranges() {
        assert_eq!(parse_port_list("80,443,8000-8002").unwrap(), vec![80, 443, 8000, 8001, 8002]);
    }

    #[test]
    fn dedups_while_preserving_first_occurrence_order() {
        assert_eq!(parse_port_list("80,80,22").unwrap(), vec![80, 22]);
    }

    #[test]
    fn rejects_backwards_range() {
        assert!(parse_port_list("100-10").is_err());
    }

    #[test]
    fn source_port_single_and_range() {
        assert_eq!(parse_port_range("40000").unwrap(), (40000, 40000));
        assert_eq!(parse_port_range("40000-40010").unwrap(), (40000, 40010));
        assert!(parse_port_range("50-10").is_err());
    }
}
